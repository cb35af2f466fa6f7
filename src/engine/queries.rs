use ulid::Ulid;

use crate::calendar;
use crate::model::*;

use super::{Engine, EngineError, Shared};

impl Engine {
    pub async fn get_tour(&self, id: &Ulid) -> Result<TourBooking, EngineError> {
        let b = self.get_tour_arc(id)?;
        let guard = b.read().await;
        Ok(guard.clone())
    }

    /// All tour bookings, oldest first, optionally narrowed to one status.
    pub async fn list_tours(&self, status: Option<TourStatus>) -> Vec<TourBooking> {
        let arcs: Vec<Shared<TourBooking>> = self.tours.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(arcs.len());
        for b in arcs {
            let guard = b.read().await;
            if status.is_none_or(|s| s == guard.status) {
                out.push(guard.clone());
            }
        }
        // ULIDs sort by creation time.
        out.sort_by_key(|b| b.id);
        out
    }

    pub async fn get_appointment(&self, id: &Ulid) -> Result<Appointment, EngineError> {
        let a = self.get_appointment_arc(id)?;
        let guard = a.read().await;
        Ok(guard.clone())
    }

    /// Appointments matching `filter`, ordered by meeting time then id.
    pub async fn list_appointments(&self, filter: AppointmentFilter) -> Vec<Appointment> {
        let arcs: Vec<Shared<Appointment>> =
            self.appointments.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for a in arcs {
            let guard = a.read().await;
            if filter.matches(&guard) {
                out.push(guard.clone());
            }
        }
        out.sort_by_key(|a| (a.date, a.time, a.id));
        out
    }

    /// iCalendar file with the teacher's confirmed and completed meetings.
    pub async fn export_teacher_calendar(&self, teacher_id: Ulid) -> String {
        let appointments = self
            .list_appointments(AppointmentFilter {
                teacher_id: Some(teacher_id),
                ..Default::default()
            })
            .await;
        let ics = calendar::export(&appointments);
        tracing::debug!(
            "exported calendar for teacher {teacher_id}: {} appointments considered",
            appointments.len()
        );
        ics
    }
}
