use std::sync::Arc;

use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::{Notification, NotificationKind, NotificationPayload, Recipient};

use super::{apply_to_appointment, Engine, EngineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Confirm,
    Reject,
    Propose,
    Accept,
    Complete,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::Confirm,
        ActionKind::Reject,
        ActionKind::Propose,
        ActionKind::Accept,
        ActionKind::Complete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Confirm => "confirm",
            ActionKind::Reject => "reject",
            ActionKind::Propose => "propose",
            ActionKind::Accept => "accept",
            ActionKind::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str().eq_ignore_ascii_case(s))
    }

    /// The state this action leads to when it is allowed at all.
    pub fn target(self) -> AppointmentStatus {
        match self {
            ActionKind::Confirm | ActionKind::Accept => AppointmentStatus::Confirmed,
            ActionKind::Reject => AppointmentStatus::Rejected,
            ActionKind::Propose => AppointmentStatus::Proposed,
            ActionKind::Complete => AppointmentStatus::Completed,
        }
    }
}

/// A response to an appointment together with the payload it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppointmentAction {
    Confirm,
    /// Required non-empty when the teacher rejects; optional for the parent.
    Reject { reason: String },
    Propose {
        date: chrono::NaiveDate,
        time: String,
        reason: Option<String>,
    },
    Accept,
    Complete,
}

impl AppointmentAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            AppointmentAction::Confirm => ActionKind::Confirm,
            AppointmentAction::Reject { .. } => ActionKind::Reject,
            AppointmentAction::Propose { .. } => ActionKind::Propose,
            AppointmentAction::Accept => ActionKind::Accept,
            AppointmentAction::Complete => ActionKind::Complete,
        }
    }
}

/// Who on the appointment may fire a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Teacher,
    Parent,
    Either,
}

impl Party {
    fn admits(self, actor: Actor, appt: &Appointment) -> bool {
        let teacher = actor == Actor::Teacher(appt.teacher_id);
        let parent = actor == Actor::Parent(appt.parent_id);
        match self {
            Party::Teacher => teacher,
            Party::Parent => parent,
            Party::Either => teacher || parent,
        }
    }
}

use crate::model::AppointmentStatus as S;

const TRANSITIONS: &[(AppointmentStatus, ActionKind, Party)] = &[
    (S::Requested, ActionKind::Confirm, Party::Teacher),
    (S::Requested, ActionKind::Reject, Party::Teacher),
    (S::Requested, ActionKind::Propose, Party::Teacher),
    (S::Proposed, ActionKind::Accept, Party::Parent),
    (S::Proposed, ActionKind::Reject, Party::Either),
    (S::Confirmed, ActionKind::Complete, Party::Teacher),
];

/// The whole negotiation table. Anything not listed is an invalid transition.
pub fn transition(
    from: AppointmentStatus,
    action: ActionKind,
) -> Result<(AppointmentStatus, Party), EngineError> {
    TRANSITIONS
        .iter()
        .find(|(f, a, _)| *f == from && *a == action)
        .map(|(_, a, party)| (a.target(), *party))
        .ok_or(EngineError::InvalidTransition {
            entity: "appointment",
            from: from.as_str(),
            attempted: action.target().as_str(),
        })
}

fn require_topic(topic: &str) -> Result<(), EngineError> {
    if topic.trim().is_empty() {
        return Err(EngineError::Validation("topic is required".into()));
    }
    if topic.len() > MAX_TEXT_LEN {
        return Err(EngineError::Validation("topic is too long".into()));
    }
    Ok(())
}

fn clean_reason(reason: Option<&str>) -> Result<Option<String>, EngineError> {
    match reason.map(str::trim) {
        None | Some("") => Ok(None),
        Some(r) if r.len() > MAX_TEXT_LEN => Err(EngineError::Validation("reason is too long".into())),
        Some(r) => Ok(Some(r.to_string())),
    }
}

fn parse_time(raw: &str) -> Result<TimeOfDay, EngineError> {
    raw.parse::<TimeOfDay>()
        .map_err(|e| EngineError::Validation(e.to_string()))
}

/// The next record values for an allowed, authorized transition.
struct Outcome {
    date: chrono::NaiveDate,
    time: TimeOfDay,
    reason: Option<String>,
    proposed: Option<SlotRef>,
}

fn outcome(appt: &Appointment, actor: Actor, action: &AppointmentAction) -> Result<Outcome, EngineError> {
    let keep = Outcome {
        date: appt.date,
        time: appt.time,
        reason: appt.reason.clone(),
        proposed: None,
    };
    match action {
        AppointmentAction::Confirm | AppointmentAction::Complete => Ok(keep),
        AppointmentAction::Reject { reason } => {
            let reason = clean_reason(Some(reason.as_str()))?;
            if reason.is_none() && actor == Actor::Teacher(appt.teacher_id) {
                return Err(EngineError::Validation("a rejection needs a reason".into()));
            }
            Ok(Outcome { reason, ..keep })
        }
        AppointmentAction::Propose { date, time, reason } => {
            let slot = SlotRef::new(*date, parse_time(time)?);
            if slot == SlotRef::new(appt.date, appt.time) {
                return Err(EngineError::Validation(
                    "proposal must change the date or time".into(),
                ));
            }
            Ok(Outcome {
                reason: clean_reason(reason.as_deref())?.or(keep.reason),
                proposed: Some(slot),
                ..keep
            })
        }
        AppointmentAction::Accept => {
            let slot = appt.proposed.ok_or_else(|| {
                EngineError::Conflict(format!("appointment {} has no proposal to accept", appt.id))
            })?;
            Ok(Outcome {
                date: slot.date,
                time: slot.time,
                ..keep
            })
        }
    }
}

/// Who hears about a committed transition, if anyone.
fn notification_for(appt: &Appointment, actor: Actor, kind: ActionKind) -> Option<Notification> {
    let parent = Recipient::Parent(appt.parent_id);
    let teacher = Recipient::Teacher(appt.teacher_id);
    let (kind, recipient, slot) = match kind {
        ActionKind::Confirm => (NotificationKind::AppointmentConfirmed, parent, None),
        ActionKind::Accept => (NotificationKind::AppointmentConfirmed, teacher, None),
        ActionKind::Propose => (NotificationKind::AppointmentProposed, parent, appt.proposed),
        ActionKind::Reject if actor == Actor::Parent(appt.parent_id) => {
            (NotificationKind::AppointmentRejected, teacher, None)
        }
        ActionKind::Reject => (NotificationKind::AppointmentRejected, parent, None),
        ActionKind::Complete => return None,
    };
    let slot = slot.unwrap_or(SlotRef::new(appt.date, appt.time));
    Some(Notification {
        kind,
        recipient,
        payload: NotificationPayload {
            reference: appt.id,
            date: slot.date,
            time: slot.time.to_string(),
            topic: Some(appt.topic.clone()),
            reason: appt.reason.clone(),
        },
    })
}

impl Engine {
    /// Create a `requested` appointment. Only the referenced parent (or an
    /// admin on their behalf) may ask.
    pub async fn request_appointment(
        &self,
        actor: Actor,
        req: AppointmentRequest,
    ) -> Result<Appointment, EngineError> {
        if !matches!(actor, Actor::Admin) && actor != Actor::Parent(req.parent_id) {
            return Err(EngineError::Unauthorized(format!(
                "{actor} cannot request an appointment for parent {}",
                req.parent_id
            )));
        }
        require_topic(&req.topic)?;
        let time = parse_time(&req.time)?;

        let _commit = self.begin_commit().await;
        if self.appointments.len() >= MAX_APPOINTMENTS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many appointments"));
        }

        let now = self.now_ms();
        let appointment = Appointment {
            id: Ulid::new(),
            parent_id: req.parent_id,
            student_id: req.student_id,
            teacher_id: req.teacher_id,
            topic: req.topic.trim().to_string(),
            date: req.date,
            time,
            status: AppointmentStatus::Requested,
            reason: None,
            proposed: None,
            created_at: now,
            updated_at: now,
        };
        let event = Event::AppointmentRequested {
            appointment: appointment.clone(),
        };
        self.wal_append(&event).await?;
        self.appointments
            .insert(appointment.id, Arc::new(RwLock::new(appointment.clone())));
        tracing::info!(
            "appointment {} requested with teacher {} for {} {}",
            appointment.id,
            appointment.teacher_id,
            appointment.date,
            appointment.time
        );
        Ok(appointment)
    }

    /// Apply one negotiation step. With `expected` set, the step only goes
    /// through if the stored status still matches it.
    pub async fn respond_to_appointment(
        &self,
        id: Ulid,
        actor: Actor,
        action: AppointmentAction,
        expected: Option<AppointmentStatus>,
    ) -> Result<Appointment, EngineError> {
        let _commit = self.begin_commit().await;
        let appt_arc = self.get_appointment_arc(&id)?;
        let mut appt = appt_arc.write().await;

        if let Some(expected) = expected
            && expected != appt.status
        {
            return Err(EngineError::Conflict(format!(
                "appointment {id} is {}, not {}",
                appt.status.as_str(),
                expected.as_str()
            )));
        }

        let kind = action.kind();
        let (next, party) = transition(appt.status, kind)?;
        if !party.admits(actor, &appt) {
            return Err(EngineError::Unauthorized(format!(
                "{actor} cannot {} appointment {id}",
                kind.as_str()
            )));
        }
        let out = outcome(&appt, actor, &action)?;

        let event = Event::AppointmentTransitioned {
            id,
            status: next,
            date: out.date,
            time: out.time,
            reason: out.reason,
            proposed: out.proposed,
            at: self.now_ms(),
        };
        let from = appt.status;
        self.wal_append(&event).await?;
        apply_to_appointment(&mut appt, &event);
        let updated = appt.clone();
        drop(appt);

        metrics::counter!(crate::observability::APPOINTMENT_TRANSITIONS_TOTAL, "action" => kind.as_str())
            .increment(1);
        tracing::info!(
            "appointment {id}: {} -> {} by {actor}",
            from.as_str(),
            next.as_str()
        );
        if let Some(n) = notification_for(&updated, actor, kind) {
            self.dispatch(n);
        }
        Ok(updated)
    }

    /// Remove an appointment. Appointments hold no slot, so nothing else changes.
    pub async fn delete_appointment(&self, id: Ulid, actor: Actor) -> Result<(), EngineError> {
        let _commit = self.begin_commit().await;
        let appt_arc = self.get_appointment_arc(&id)?;
        let appt = appt_arc.write().await;
        let allowed = match actor {
            Actor::Admin => true,
            Actor::Teacher(t) => t == appt.teacher_id,
            Actor::Parent(p) => p == appt.parent_id,
        };
        if !allowed {
            return Err(EngineError::Unauthorized(format!(
                "{actor} cannot delete appointment {id}"
            )));
        }

        self.wal_append(&Event::AppointmentDeleted { id }).await?;
        self.appointments.remove(&id);
        drop(appt);
        tracing::info!("appointment {id} deleted by {actor}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn appt(status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Ulid::new(),
            parent_id: Ulid::new(),
            student_id: Ulid::new(),
            teacher_id: Ulid::new(),
            topic: "Reading".into(),
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            time: TimeOfDay::from_hm(14, 0).unwrap(),
            status,
            reason: None,
            proposed: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn reachable_states_match_the_table() {
        use AppointmentStatus::*;
        let expected = [
            (Requested, vec![Confirmed, Rejected, Proposed]),
            (Proposed, vec![Rejected, Confirmed]),
            (Confirmed, vec![Completed]),
            (Rejected, vec![]),
            (Completed, vec![]),
        ];
        for (from, mut want) in expected {
            let mut got: Vec<_> = ActionKind::ALL
                .into_iter()
                .filter_map(|a| transition(from, a).ok().map(|(to, _)| to))
                .collect();
            got.sort_by_key(|s| s.as_str());
            got.dedup();
            want.sort_by_key(|s| s.as_str());
            assert_eq!(got, want, "from {}", from.as_str());
        }
    }

    #[test]
    fn terminal_states_reject_everything() {
        for from in [AppointmentStatus::Rejected, AppointmentStatus::Completed] {
            assert!(from.is_terminal());
            for a in ActionKind::ALL {
                assert!(matches!(
                    transition(from, a),
                    Err(EngineError::InvalidTransition { .. })
                ));
            }
        }
    }

    #[test]
    fn reject_after_completed_names_both_states() {
        let err = transition(AppointmentStatus::Completed, ActionKind::Reject).unwrap_err();
        assert_eq!(err.to_string(), "invalid appointment transition: completed -> rejected");
    }

    #[test]
    fn parties() {
        let a = appt(AppointmentStatus::Proposed);
        let teacher = Actor::Teacher(a.teacher_id);
        let parent = Actor::Parent(a.parent_id);
        assert!(Party::Teacher.admits(teacher, &a));
        assert!(!Party::Teacher.admits(parent, &a));
        assert!(!Party::Teacher.admits(Actor::Admin, &a));
        assert!(!Party::Teacher.admits(Actor::Teacher(Ulid::new()), &a));
        assert!(Party::Parent.admits(parent, &a));
        assert!(Party::Either.admits(teacher, &a));
        assert!(Party::Either.admits(parent, &a));
    }

    #[test]
    fn teacher_reject_needs_reason_parent_does_not() {
        let a = appt(AppointmentStatus::Proposed);
        let empty = AppointmentAction::Reject { reason: "  ".into() };
        assert!(matches!(
            outcome(&a, Actor::Teacher(a.teacher_id), &empty),
            Err(EngineError::Validation(_))
        ));
        assert!(outcome(&a, Actor::Parent(a.parent_id), &empty).is_ok());
    }

    #[test]
    fn proposal_must_move_the_meeting() {
        let a = appt(AppointmentStatus::Requested);
        let same = AppointmentAction::Propose {
            date: a.date,
            time: "02:00 PM".into(),
            reason: None,
        };
        assert!(matches!(
            outcome(&a, Actor::Teacher(a.teacher_id), &same),
            Err(EngineError::Validation(_))
        ));

        let moved = AppointmentAction::Propose {
            date: a.date,
            time: "15:30".into(),
            reason: Some("clash".into()),
        };
        let out = outcome(&a, Actor::Teacher(a.teacher_id), &moved).unwrap();
        assert_eq!(out.proposed.unwrap().time, TimeOfDay::from_hm(15, 30).unwrap());
        assert_eq!(out.reason.as_deref(), Some("clash"));
        assert_eq!(out.time, a.time);
    }

    #[test]
    fn accept_copies_proposal() {
        let mut a = appt(AppointmentStatus::Proposed);
        let slot = SlotRef::new(NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(), TimeOfDay::from_hm(9, 0).unwrap());
        a.proposed = Some(slot);
        let out = outcome(&a, Actor::Parent(a.parent_id), &AppointmentAction::Accept).unwrap();
        assert_eq!((out.date, out.time), (slot.date, slot.time));
        assert_eq!(out.proposed, None);
    }

    #[test]
    fn notification_routing() {
        let a = appt(AppointmentStatus::Confirmed);
        let teacher = Actor::Teacher(a.teacher_id);
        let parent = Actor::Parent(a.parent_id);

        let n = notification_for(&a, teacher, ActionKind::Confirm).unwrap();
        assert_eq!(n.recipient, Recipient::Parent(a.parent_id));
        let n = notification_for(&a, parent, ActionKind::Accept).unwrap();
        assert_eq!(n.recipient, Recipient::Teacher(a.teacher_id));
        let n = notification_for(&a, parent, ActionKind::Reject).unwrap();
        assert_eq!(n.recipient, Recipient::Teacher(a.teacher_id));
        let n = notification_for(&a, teacher, ActionKind::Reject).unwrap();
        assert_eq!(n.kind, NotificationKind::AppointmentRejected);
        assert_eq!(n.recipient, Recipient::Parent(a.parent_id));
        assert!(notification_for(&a, teacher, ActionKind::Complete).is_none());
    }
}
