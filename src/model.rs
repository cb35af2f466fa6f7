use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. Audit stamps only, never slot times.
pub type Ms = i64;

// ── Time of day ──────────────────────────────────────────────────

/// Wall-clock time of day as minutes since midnight.
///
/// The only parse/format boundary for "HH:MM AM/PM" strings. Everything
/// past the boundary compares plain integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeOfDay(u16);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeError(String);

impl fmt::Display for ParseTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid time {:?}: expected HH:MM AM/PM", self.0)
    }
}

impl std::error::Error for ParseTimeError {}

impl TimeOfDay {
    pub const MINUTES_PER_DAY: u16 = 24 * 60;

    pub fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if minute >= 60 {
            return None;
        }
        let minutes = hour.checked_mul(60)?.checked_add(minute)?;
        (minutes < Self::MINUTES_PER_DAY).then_some(Self(minutes))
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u16 {
        self.0 / 60
    }

    pub fn minute(self) -> u16 {
        self.0 % 60
    }

    /// Strict 12-hour form, e.g. `09:30 AM`. The suffix is case-insensitive.
    pub fn parse_12h(s: &str) -> Result<Self, ParseTimeError> {
        let err = || ParseTimeError(s.to_string());
        let trimmed = s.trim();
        let (clock, suffix) = trimmed.split_once(' ').ok_or_else(err)?;
        let (hour, minute) = split_hm(clock).ok_or_else(err)?;
        if !(1..=12).contains(&hour) {
            return Err(err());
        }
        let hour = match suffix.trim().to_ascii_uppercase().as_str() {
            "AM" => hour % 12,
            "PM" => hour % 12 + 12,
            _ => return Err(err()),
        };
        Self::from_hm(hour, minute).ok_or_else(err)
    }

    /// 24-hour `HH:MM`.
    pub fn parse_24h(s: &str) -> Result<Self, ParseTimeError> {
        let err = || ParseTimeError(s.to_string());
        let (hour, minute) = split_hm(s.trim()).ok_or_else(err)?;
        Self::from_hm(hour, minute).ok_or_else(err)
    }
}

/// `HH:MM` with exactly two minute digits and one or two hour digits.
fn split_hm(s: &str) -> Option<(u16, u16)> {
    let (h, m) = s.split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    if !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((h.parse().ok()?, m.parse().ok()?))
}

impl FromStr for TimeOfDay {
    type Err = ParseTimeError;

    /// Accepts either the 12-hour or the 24-hour form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().contains(' ') {
            Self::parse_12h(s)
        } else {
            Self::parse_24h(s)
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, m) = (self.hour(), self.minute());
        let suffix = if h < 12 { "AM" } else { "PM" };
        let h12 = match h % 12 {
            0 => 12,
            x => x,
        };
        write!(f, "{h12:02}:{m:02} {suffix}")
    }
}

/// Inclusive range of times in which slots may be published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatingWindow {
    pub open: TimeOfDay,
    pub close: TimeOfDay,
}

impl Default for OperatingWindow {
    fn default() -> Self {
        Self {
            open: TimeOfDay(7 * 60),
            close: TimeOfDay(19 * 60),
        }
    }
}

impl OperatingWindow {
    pub fn contains(&self, t: TimeOfDay) -> bool {
        self.open <= t && t <= self.close
    }
}

// ── Availability ─────────────────────────────────────────────────

/// A date + time pair pointing at one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotRef {
    pub date: NaiveDate,
    pub time: TimeOfDay,
}

impl SlotRef {
    pub fn new(date: NaiveDate, time: TimeOfDay) -> Self {
        Self { date, time }
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub time: TimeOfDay,
    pub is_booked: bool,
    /// The confirmed tour holding this slot, if booked.
    pub booked_by: Option<Ulid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateAvailability {
    pub date: NaiveDate,
    /// Sorted by `time`, unique by `time`.
    pub slots: Vec<TimeSlot>,
}

impl DateAvailability {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            slots: Vec::new(),
        }
    }

    pub fn slot(&self, time: TimeOfDay) -> Option<&TimeSlot> {
        self.slots
            .binary_search_by_key(&time, |s| s.time)
            .ok()
            .map(|i| &self.slots[i])
    }

    pub fn slot_mut(&mut self, time: TimeOfDay) -> Option<&mut TimeSlot> {
        self.slots
            .binary_search_by_key(&time, |s| s.time)
            .ok()
            .map(|i| &mut self.slots[i])
    }

    /// Insert a free slot keeping sort order. Returns false if `time` was already present.
    pub fn insert_free(&mut self, time: TimeOfDay) -> bool {
        match self.slots.binary_search_by_key(&time, |s| s.time) {
            Ok(_) => false,
            Err(pos) => {
                self.slots.insert(
                    pos,
                    TimeSlot {
                        time,
                        is_booked: false,
                        booked_by: None,
                    },
                );
                true
            }
        }
    }
}

/// Optional inclusive date bounds for listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|f| f <= date) && self.to.is_none_or(|t| date <= t)
    }
}

// ── Tour bookings ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TourStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl TourStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TourStatus::Pending => "pending",
            TourStatus::Confirmed => "confirmed",
            TourStatus::Completed => "completed",
            TourStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Some(TourStatus::Pending),
            "confirmed" => Some(TourStatus::Confirmed),
            "completed" => Some(TourStatus::Completed),
            "cancelled" | "canceled" => Some(TourStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TourStatus::Completed | TourStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingOption {
    Preferred,
    Alternate,
}

impl BookingOption {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingOption::Preferred => "preferred",
            BookingOption::Alternate => "alternate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "preferred" => Some(BookingOption::Preferred),
            "alternate" => Some(BookingOption::Alternate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TourBooking {
    pub id: Ulid,
    pub requester: Requester,
    pub child_name: String,
    pub notes: Option<String>,
    pub preferred: SlotRef,
    pub alternate: Option<SlotRef>,
    pub status: TourStatus,
    /// Set once on confirmation, never rewritten.
    pub confirmed: Option<SlotRef>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl TourBooking {
    pub fn option(&self, option: BookingOption) -> Option<SlotRef> {
        match option {
            BookingOption::Preferred => Some(self.preferred),
            BookingOption::Alternate => self.alternate,
        }
    }

    /// Whether this booking still lays claim to `slot` for listing purposes.
    pub fn references(&self, slot: &SlotRef) -> bool {
        match self.status {
            TourStatus::Pending => self.preferred == *slot || self.alternate.as_ref() == Some(slot),
            TourStatus::Confirmed => self.confirmed.as_ref() == Some(slot),
            TourStatus::Completed | TourStatus::Cancelled => false,
        }
    }
}

/// Input to tour submission. Times are raw strings; the engine parses them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TourRequest {
    pub requester: Requester,
    pub child_name: String,
    pub notes: Option<String>,
    pub preferred_date: NaiveDate,
    pub preferred_time: String,
    pub alternate_date: Option<NaiveDate>,
    pub alternate_time: Option<String>,
}

// ── Appointments ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Requested,
    Proposed,
    Confirmed,
    Rejected,
    Completed,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Requested,
        AppointmentStatus::Proposed,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Rejected,
        AppointmentStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Requested => "requested",
            AppointmentStatus::Proposed => "proposed",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Rejected => "rejected",
            AppointmentStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AppointmentStatus::Rejected | AppointmentStatus::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub parent_id: Ulid,
    pub student_id: Ulid,
    pub teacher_id: Ulid,
    pub topic: String,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub status: AppointmentStatus,
    /// Rejection explanation or counter-proposal note.
    pub reason: Option<String>,
    /// Present only while `status == Proposed`.
    pub proposed: Option<SlotRef>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentRequest {
    pub parent_id: Ulid,
    pub student_id: Ulid,
    pub teacher_id: Ulid,
    pub topic: String,
    pub date: NaiveDate,
    pub time: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppointmentFilter {
    pub teacher_id: Option<Ulid>,
    pub parent_id: Option<Ulid>,
    pub status: Option<AppointmentStatus>,
}

impl AppointmentFilter {
    pub fn matches(&self, a: &Appointment) -> bool {
        self.teacher_id.is_none_or(|t| t == a.teacher_id)
            && self.parent_id.is_none_or(|p| p == a.parent_id)
            && self.status.is_none_or(|s| s == a.status)
    }
}

// ── Actors ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actor {
    Admin,
    Teacher(Ulid),
    Parent(Ulid),
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Admin => write!(f, "admin"),
            Actor::Teacher(id) => write!(f, "teacher:{id}"),
            Actor::Parent(id) => write!(f, "parent:{id}"),
        }
    }
}

// ── WAL records ──────────────────────────────────────────────────

/// WAL record format. Flat, with record snapshots as the only nesting.
///
/// One event carries the full effect of one operation, so replay never
/// observes half an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// New free slots merged into a date. Only times not already present.
    AvailabilityPublished {
        date: NaiveDate,
        times: Vec<TimeOfDay>,
    },
    /// Full slot set of a date; written by compaction.
    SlotsRestored {
        date: NaiveDate,
        slots: Vec<TimeSlot>,
    },
    /// Inserts the booking as-is (also used by compaction).
    TourSubmitted {
        booking: TourBooking,
    },
    TourConfirmed {
        id: Ulid,
        slot: SlotRef,
        at: Ms,
    },
    TourCompleted {
        id: Ulid,
        at: Ms,
    },
    /// Cancels the booking and frees `released` in the same record.
    TourCancelled {
        id: Ulid,
        released: Option<SlotRef>,
        at: Ms,
    },
    /// Inserts the appointment as-is (also used by compaction).
    AppointmentRequested {
        appointment: Appointment,
    },
    AppointmentTransitioned {
        id: Ulid,
        status: AppointmentStatus,
        date: NaiveDate,
        time: TimeOfDay,
        reason: Option<String>,
        proposed: Option<SlotRef>,
        at: Ms,
    },
    AppointmentDeleted {
        id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub time: TimeOfDay,
    pub is_booked: bool,
    /// Not booked and not referenced by any pending/confirmed tour.
    pub is_free: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub slots: Vec<SlotInfo>,
}

impl DayAvailability {
    pub fn free_times(&self) -> impl Iterator<Item = TimeOfDay> + '_ {
        self.slots.iter().filter(|s| s.is_free).map(|s| s.time)
    }
}
