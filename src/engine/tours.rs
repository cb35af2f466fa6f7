use std::sync::Arc;

use chrono::{DateTime, Duration};
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::{Notification, NotificationKind, NotificationPayload, Recipient};

use super::availability::check_reservable;
use super::{apply_to_date, apply_to_tour, Engine, EngineError};

/// Length of a guided tour, used by the sweeper to decide it has happened.
pub const TOUR_DURATION_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TourAction {
    Confirm,
    Complete,
    Cancel,
}

impl TourAction {
    pub fn target(self) -> TourStatus {
        match self {
            TourAction::Confirm => TourStatus::Confirmed,
            TourAction::Complete => TourStatus::Completed,
            TourAction::Cancel => TourStatus::Cancelled,
        }
    }
}

/// pending → confirmed → completed; pending|confirmed → cancelled.
pub fn tour_transition(from: TourStatus, action: TourAction) -> Result<TourStatus, EngineError> {
    use TourStatus::*;
    match (from, action) {
        (Pending, TourAction::Confirm)
        | (Confirmed, TourAction::Complete)
        | (Pending | Confirmed, TourAction::Cancel) => Ok(action.target()),
        _ => Err(EngineError::InvalidTransition {
            entity: "tour booking",
            from: from.as_str(),
            attempted: action.target().as_str(),
        }),
    }
}

fn require_text(field: &str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::Validation(format!("{field} is required")));
    }
    check_len(field, value)
}

fn check_len(field: &str, value: &str) -> Result<(), EngineError> {
    if value.len() > MAX_TEXT_LEN {
        return Err(EngineError::Validation(format!("{field} is too long")));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), EngineError> {
    require_text("email", email)?;
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
    if !valid || email.contains(char::is_whitespace) {
        return Err(EngineError::Validation(format!("invalid email: {email}")));
    }
    Ok(())
}

fn parse_slot(date: chrono::NaiveDate, time: &str) -> Result<SlotRef, EngineError> {
    let time = time
        .parse::<TimeOfDay>()
        .map_err(|e| EngineError::Validation(e.to_string()))?;
    Ok(SlotRef::new(date, time))
}

/// Field checks for a submission; no store access.
fn validate_request(req: &TourRequest) -> Result<(SlotRef, Option<SlotRef>), EngineError> {
    require_text("parent name", &req.requester.name)?;
    validate_email(&req.requester.email)?;
    if let Some(phone) = &req.requester.phone {
        check_len("phone", phone)?;
    }
    require_text("child name", &req.child_name)?;
    if let Some(notes) = &req.notes {
        check_len("notes", notes)?;
    }

    let preferred = parse_slot(req.preferred_date, &req.preferred_time)?;
    let alternate = match (req.alternate_date, req.alternate_time.as_deref()) {
        (None, None) => None,
        (Some(date), Some(time)) => Some(parse_slot(date, time)?),
        _ => {
            return Err(EngineError::Validation(
                "alternate date and time must be given together".into(),
            ));
        }
    };
    if alternate == Some(preferred) {
        return Err(EngineError::Validation(
            "alternate must differ from preferred by date or time".into(),
        ));
    }
    Ok((preferred, alternate))
}

impl Engine {
    /// Record a pending tour request. Nothing is held: both options only need
    /// to be open right now, and the race is settled by `confirm_tour`.
    pub async fn submit_tour(&self, req: TourRequest) -> Result<TourBooking, EngineError> {
        let (preferred, alternate) = validate_request(&req)?;
        let _commit = self.begin_commit().await;

        if self.tours.len() >= MAX_TOURS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many tour bookings"));
        }
        for slot in std::iter::once(preferred).chain(alternate) {
            if !self.is_slot_open(&slot).await {
                return Err(EngineError::SlotUnavailable(slot));
            }
        }

        let now = self.now_ms();
        let booking = TourBooking {
            id: Ulid::new(),
            requester: req.requester,
            child_name: req.child_name,
            notes: req.notes,
            preferred,
            alternate,
            status: TourStatus::Pending,
            confirmed: None,
            created_at: now,
            updated_at: now,
        };
        let event = Event::TourSubmitted {
            booking: booking.clone(),
        };
        self.wal_append(&event).await?;
        self.tours
            .insert(booking.id, Arc::new(RwLock::new(booking.clone())));
        tracing::info!("tour {} submitted for {preferred}", booking.id);
        Ok(booking)
    }

    /// Confirm one of the booking's options. Reserving the slot and
    /// confirming the booking are one WAL record under both write locks,
    /// so exactly one of any racing confirmations for a slot wins.
    pub async fn confirm_tour(&self, id: Ulid, option: BookingOption) -> Result<TourBooking, EngineError> {
        let _commit = self.begin_commit().await;
        let booking_arc = self.get_tour_arc(&id)?;
        let mut booking = booking_arc.write().await;
        tour_transition(booking.status, TourAction::Confirm)?;

        let slot = booking.option(option).ok_or_else(|| {
            EngineError::Validation(format!("booking {id} has no {} option", option.as_str()))
        })?;
        let day_arc = self
            .get_date(&slot.date)
            .ok_or_else(|| EngineError::not_found("slot", slot))?;
        let mut day = day_arc.write().await;

        if let Err(e) = check_reservable(&day, slot.time) {
            if let EngineError::Conflict(_) = e {
                metrics::counter!(crate::observability::SLOT_CONFLICTS_TOTAL).increment(1);
                tracing::info!("tour {id}: slot {slot} taken before confirmation");
                return Err(EngineError::SlotNoLongerAvailable(slot));
            }
            return Err(e);
        }

        let event = Event::TourConfirmed {
            id,
            slot,
            at: self.now_ms(),
        };
        self.wal_append(&event).await?;
        apply_to_date(&mut day, &event);
        apply_to_tour(&mut booking, &event);
        let confirmed = booking.clone();
        drop(day);
        drop(booking);

        metrics::counter!(crate::observability::TOURS_CONFIRMED_TOTAL).increment(1);
        tracing::info!("tour {id} confirmed for {slot} ({})", option.as_str());
        self.dispatch(Notification {
            kind: NotificationKind::TourConfirmed,
            recipient: Recipient::Email(confirmed.requester.email.clone()),
            payload: NotificationPayload {
                reference: id,
                date: slot.date,
                time: slot.time.to_string(),
                topic: Some(format!("Tour for {}", confirmed.child_name)),
                reason: None,
            },
        });
        Ok(confirmed)
    }

    pub async fn complete_tour(&self, id: Ulid) -> Result<TourBooking, EngineError> {
        let _commit = self.begin_commit().await;
        let booking_arc = self.get_tour_arc(&id)?;
        let mut booking = booking_arc.write().await;
        tour_transition(booking.status, TourAction::Complete)?;

        let event = Event::TourCompleted { id, at: self.now_ms() };
        self.wal_append(&event).await?;
        apply_to_tour(&mut booking, &event);
        tracing::info!("tour {id} completed");
        Ok(booking.clone())
    }

    /// Cancel a pending or confirmed tour. A confirmed tour's slot is freed
    /// by the same WAL record that cancels it.
    pub async fn cancel_tour(&self, id: Ulid) -> Result<TourBooking, EngineError> {
        let _commit = self.begin_commit().await;
        let booking_arc = self.get_tour_arc(&id)?;
        let mut booking = booking_arc.write().await;
        tour_transition(booking.status, TourAction::Cancel)?;

        let released = match booking.status {
            TourStatus::Confirmed => booking.confirmed,
            _ => None,
        };
        let day_arc = released.and_then(|slot| self.get_date(&slot.date));
        let mut day = match &day_arc {
            Some(d) => Some(d.write().await),
            None => None,
        };

        let event = Event::TourCancelled {
            id,
            released,
            at: self.now_ms(),
        };
        self.wal_append(&event).await?;
        if let Some(day) = day.as_mut() {
            apply_to_date(day, &event);
        }
        apply_to_tour(&mut booking, &event);
        match released {
            Some(slot) => tracing::info!("tour {id} cancelled, released {slot}"),
            None => tracing::info!("tour {id} cancelled"),
        }
        Ok(booking.clone())
    }

    /// Confirmed tours whose block ended at or before `now`. Dates and times
    /// are kindergarten wall clock; `now` is read on the same clock.
    pub async fn collect_finished_tours(&self, now: Ms) -> Vec<Ulid> {
        let Some(now) = DateTime::from_timestamp_millis(now).map(|d| d.naive_utc()) else {
            return Vec::new();
        };
        let tours: Vec<_> = self.tours.iter().map(|e| e.value().clone()).collect();
        let mut finished = Vec::new();
        for b in tours {
            let guard = b.read().await;
            if guard.status != TourStatus::Confirmed {
                continue;
            }
            let Some(slot) = guard.confirmed else { continue };
            let Some(start) = slot.date.and_hms_opt(
                u32::from(slot.time.hour()),
                u32::from(slot.time.minute()),
                0,
            ) else {
                continue;
            };
            if start + Duration::minutes(TOUR_DURATION_MINUTES) <= now {
                finished.push(guard.id);
            }
        }
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn request() -> TourRequest {
        TourRequest {
            requester: Requester {
                name: "Ana Pereira".into(),
                email: "ana@example.com".into(),
                phone: None,
            },
            child_name: "Leo".into(),
            notes: None,
            preferred_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            preferred_time: "09:00 AM".into(),
            alternate_date: None,
            alternate_time: None,
        }
    }

    #[test]
    fn transition_table_is_closed() {
        use TourStatus::*;
        let actions = [TourAction::Confirm, TourAction::Complete, TourAction::Cancel];
        let allowed = [
            (Pending, TourAction::Confirm),
            (Pending, TourAction::Cancel),
            (Confirmed, TourAction::Complete),
            (Confirmed, TourAction::Cancel),
        ];
        for from in [Pending, Confirmed, Completed, Cancelled] {
            for action in actions {
                let result = tour_transition(from, action);
                if allowed.contains(&(from, action)) {
                    assert_eq!(result.unwrap(), action.target());
                } else {
                    assert!(
                        matches!(result, Err(EngineError::InvalidTransition { .. })),
                        "{from:?} + {action:?} should be rejected"
                    );
                }
            }
        }
    }

    #[test]
    fn request_requires_contact_fields() {
        let mut r = request();
        r.requester.name = "  ".into();
        assert!(matches!(validate_request(&r), Err(EngineError::Validation(_))));

        let mut r = request();
        r.requester.email = "not-an-email".into();
        assert!(matches!(validate_request(&r), Err(EngineError::Validation(_))));

        let mut r = request();
        r.child_name = String::new();
        assert!(matches!(validate_request(&r), Err(EngineError::Validation(_))));
    }

    #[test]
    fn alternate_must_be_complete_and_distinct() {
        let mut r = request();
        r.alternate_date = r.preferred_date.succ_opt();
        assert!(matches!(validate_request(&r), Err(EngineError::Validation(_))));

        let mut r = request();
        r.alternate_date = Some(r.preferred_date);
        r.alternate_time = Some("09:00 am".into());
        assert!(matches!(validate_request(&r), Err(EngineError::Validation(_))));

        let mut r = request();
        r.alternate_date = Some(r.preferred_date);
        r.alternate_time = Some("09:30 AM".into());
        let (_, alt) = validate_request(&r).unwrap();
        assert_eq!(alt.unwrap().time.to_string(), "09:30 AM");
    }

    #[test]
    fn malformed_preferred_time_is_validation() {
        let mut r = request();
        r.preferred_time = "nine".into();
        assert!(matches!(validate_request(&r), Err(EngineError::Validation(_))));
    }
}
