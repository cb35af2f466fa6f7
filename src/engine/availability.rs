use std::collections::{BTreeSet, HashSet};

use chrono::NaiveDate;

use crate::limits::*;
use crate::model::*;

use super::{apply_to_date, Engine, EngineError, Shared};

/// Parse and window-check a publish request. Returns the distinct times.
pub fn validate_publish_times<S: AsRef<str>>(
    times: &[S],
    window: &OperatingWindow,
) -> Result<BTreeSet<TimeOfDay>, EngineError> {
    if times.is_empty() {
        return Err(EngineError::Validation("at least one time is required".into()));
    }
    if times.len() > MAX_TIMES_PER_PUBLISH {
        return Err(EngineError::LimitExceeded("too many times in one publish"));
    }
    let mut parsed = BTreeSet::new();
    for raw in times {
        let t = TimeOfDay::parse_12h(raw.as_ref())
            .map_err(|e| EngineError::Validation(e.to_string()))?;
        if !window.contains(t) {
            return Err(EngineError::Validation(format!(
                "time {t} is outside the operating window {}-{}",
                window.open, window.close
            )));
        }
        parsed.insert(t);
    }
    Ok(parsed)
}

/// The compare half of the reserve compare-and-set. Caller holds the date's
/// write lock and applies `TourConfirmed` on success.
pub fn check_reservable(day: &DateAvailability, time: TimeOfDay) -> Result<(), EngineError> {
    match day.slot(time) {
        None => Err(EngineError::not_found("slot", SlotRef::new(day.date, time))),
        Some(slot) if slot.is_booked => Err(EngineError::Conflict(format!(
            "slot {} already booked",
            SlotRef::new(day.date, time)
        ))),
        Some(_) => Ok(()),
    }
}

impl Engine {
    /// Merge `times` into the date's slot set. Existing slots, booked or not,
    /// are left untouched; re-publishing a time is a no-op for that time.
    pub async fn publish_availability<S: AsRef<str>>(
        &self,
        date: NaiveDate,
        times: &[S],
    ) -> Result<Vec<TimeSlot>, EngineError> {
        let requested = validate_publish_times(times, &self.window)?;
        let _commit = self.begin_commit().await;

        if !self.dates.contains_key(&date) && self.dates.len() >= MAX_DATES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many published dates"));
        }
        let day = self.date_entry(date);
        let mut guard = day.write().await;

        let fresh: Vec<TimeOfDay> = requested
            .into_iter()
            .filter(|t| guard.slot(*t).is_none())
            .collect();
        if fresh.is_empty() {
            return Ok(guard.slots.clone());
        }
        if guard.slots.len() + fresh.len() > MAX_SLOTS_PER_DATE {
            return Err(EngineError::LimitExceeded("too many slots on date"));
        }

        let event = Event::AvailabilityPublished {
            date,
            times: fresh,
        };
        self.wal_append(&event).await?;
        apply_to_date(&mut guard, &event);
        tracing::debug!("published {date}: {} slots", guard.slots.len());
        Ok(guard.slots.clone())
    }

    /// Published dates in range with per-slot booked/free flags. A slot is
    /// free when it is not booked and no pending or confirmed tour names it.
    pub async fn list_availability(&self, range: DateRange) -> Vec<DayAvailability> {
        let mut days: Vec<(NaiveDate, Shared<DateAvailability>)> = self
            .dates
            .iter()
            .filter(|e| range.contains(*e.key()))
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        days.sort_by_key(|(d, _)| *d);

        let claimed = self.claimed_slots(&range).await;

        let mut out = Vec::with_capacity(days.len());
        for (date, day) in days {
            let guard = day.read().await;
            if guard.slots.is_empty() {
                continue;
            }
            let slots = guard
                .slots
                .iter()
                .map(|s| SlotInfo {
                    time: s.time,
                    is_booked: s.is_booked,
                    is_free: !s.is_booked && !claimed.contains(&SlotRef::new(date, s.time)),
                })
                .collect();
            out.push(DayAvailability { date, slots });
        }
        out
    }

    /// Slots named by pending tours (either option) or held by confirmed ones.
    async fn claimed_slots(&self, range: &DateRange) -> HashSet<SlotRef> {
        let tours: Vec<Shared<TourBooking>> = self.tours.iter().map(|e| e.value().clone()).collect();
        let mut claimed = HashSet::new();
        for b in tours {
            let guard = b.read().await;
            let candidates = [Some(guard.preferred), guard.alternate, guard.confirmed];
            for slot in candidates.into_iter().flatten() {
                if range.contains(slot.date) && guard.references(&slot) {
                    claimed.insert(slot);
                }
            }
        }
        claimed
    }

    /// Published and not booked. Pending tours do not count: submission is
    /// optimistic and the race is settled at confirmation.
    pub async fn is_slot_open(&self, slot: &SlotRef) -> bool {
        let Some(day) = self.get_date(&slot.date) else {
            return false;
        };
        let guard = day.read().await;
        guard.slot(slot.time).is_some_and(|s| !s.is_booked)
    }

    pub async fn get_slot(&self, slot: &SlotRef) -> Option<TimeSlot> {
        let day = self.get_date(&slot.date)?;
        let guard = day.read().await;
        guard.slot(slot.time).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day_with(times: &[&str]) -> DateAvailability {
        let mut d = DateAvailability::new(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        for t in times {
            d.insert_free(TimeOfDay::parse_12h(t).unwrap());
        }
        d
    }

    #[test]
    fn validate_rejects_empty() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            validate_publish_times(&empty, &OperatingWindow::default()),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn validate_rejects_out_of_window() {
        let w = OperatingWindow::default();
        for bad in ["06:59 AM", "07:30 PM", "12:00 AM"] {
            assert!(
                matches!(validate_publish_times(&[bad], &w), Err(EngineError::Validation(_))),
                "{bad} should be rejected"
            );
        }
        assert!(validate_publish_times(&["07:00 AM", "07:00 PM"], &w).is_ok());
    }

    #[test]
    fn validate_rejects_24h_form() {
        let w = OperatingWindow::default();
        assert!(matches!(
            validate_publish_times(&["14:00"], &w),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn validate_dedups_case_insensitively() {
        let w = OperatingWindow::default();
        let set = validate_publish_times(&["09:00 AM", "09:00 am", "9:00 AM"], &w).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn reservable_free_slot() {
        let d = day_with(&["09:00 AM"]);
        assert!(check_reservable(&d, TimeOfDay::parse_12h("09:00 AM").unwrap()).is_ok());
    }

    #[test]
    fn reservable_missing_slot_is_not_found() {
        let d = day_with(&["09:00 AM"]);
        let r = check_reservable(&d, TimeOfDay::parse_12h("10:00 AM").unwrap());
        assert!(matches!(r, Err(EngineError::NotFound { what: "slot", .. })));
    }

    #[test]
    fn reservable_booked_slot_is_conflict() {
        let mut d = day_with(&["09:00 AM"]);
        let t = TimeOfDay::parse_12h("09:00 AM").unwrap();
        d.slot_mut(t).unwrap().is_booked = true;
        assert!(matches!(check_reservable(&d, t), Err(EngineError::Conflict(_))));
    }
}
