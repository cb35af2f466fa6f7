mod appointments;
mod availability;
mod error;
mod queries;
mod tours;

pub use appointments::{transition, ActionKind, AppointmentAction, Party};
pub use availability::{check_reservable, validate_publish_times};
pub use error::EngineError;
pub use tours::{tour_transition, TourAction, TOUR_DURATION_MINUTES};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock, RwLockReadGuard};
use ulid::Ulid;

use crate::clock::Clock;
use crate::model::*;
use crate::notify::{Notification, Notifier};
use crate::wal::Wal;

pub type Shared<T> = Arc<RwLock<T>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even on append error so partial bytes never leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        // Appends are always batched by the caller.
        WalCommand::Append { response, .. } => {
            let _ = response.send(Err(io::Error::other("append routed outside batch")));
        }
    }
}

/// Scheduling core for one kindergarten: published slots, tour bookings
/// and parent/teacher appointments.
pub struct Engine {
    pub(super) dates: DashMap<NaiveDate, Shared<DateAvailability>>,
    pub(super) tours: DashMap<Ulid, Shared<TourBooking>>,
    pub(super) appointments: DashMap<Ulid, Shared<Appointment>>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold this shared; compaction holds it exclusively so no
    /// commit can slip between the snapshot and the log swap. Always taken
    /// before any record lock.
    pub(super) commit_gate: RwLock<()>,
    pub(super) notifier: Arc<dyn Notifier>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) window: OperatingWindow,
}

// ── Event application (caller holds the record locks) ────

pub(super) fn apply_to_date(day: &mut DateAvailability, event: &Event) {
    match event {
        Event::AvailabilityPublished { times, .. } => {
            for t in times {
                day.insert_free(*t);
            }
        }
        Event::SlotsRestored { slots, .. } => {
            day.slots = slots.clone();
            day.slots.sort_by_key(|s| s.time);
        }
        Event::TourConfirmed { id, slot, .. } => {
            if let Some(s) = day.slot_mut(slot.time) {
                s.is_booked = true;
                s.booked_by = Some(*id);
            }
        }
        Event::TourCancelled {
            id,
            released: Some(slot),
            ..
        } => {
            if let Some(s) = day.slot_mut(slot.time)
                && s.booked_by == Some(*id)
            {
                s.is_booked = false;
                s.booked_by = None;
            }
        }
        _ => {}
    }
}

pub(super) fn apply_to_tour(booking: &mut TourBooking, event: &Event) {
    match event {
        Event::TourConfirmed { slot, at, .. } => {
            booking.status = TourStatus::Confirmed;
            booking.confirmed = Some(*slot);
            booking.updated_at = *at;
        }
        Event::TourCompleted { at, .. } => {
            booking.status = TourStatus::Completed;
            booking.updated_at = *at;
        }
        Event::TourCancelled { at, .. } => {
            booking.status = TourStatus::Cancelled;
            booking.updated_at = *at;
        }
        _ => {}
    }
}

pub(super) fn apply_to_appointment(appt: &mut Appointment, event: &Event) {
    if let Event::AppointmentTransitioned {
        status,
        date,
        time,
        reason,
        proposed,
        at,
        ..
    } = event
    {
        appt.status = *status;
        appt.date = *date;
        appt.time = *time;
        appt.reason = reason.clone();
        appt.proposed = *proposed;
        appt.updated_at = *at;
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        window: OperatingWindow,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            dates: DashMap::new(),
            tours: DashMap::new(),
            appointments: DashMap::new(),
            wal_tx,
            commit_gate: RwLock::new(()),
            notifier,
            clock,
            window,
        };

        // Sole owner of every Arc during replay, so try_write always succeeds
        // instantly. Never block here: this may run inside an async context.
        for event in &events {
            engine.replay_event(event);
        }
        tracing::debug!(
            "replayed {} events: {} dates, {} tours, {} appointments",
            events.len(),
            engine.dates.len(),
            engine.tours.len(),
            engine.appointments.len()
        );

        Ok(engine)
    }

    fn replay_event(&self, event: &Event) {
        match event {
            Event::AvailabilityPublished { date, .. } | Event::SlotsRestored { date, .. } => {
                let day = self.date_entry(*date);
                if let Ok(mut guard) = day.try_write() {
                    apply_to_date(&mut guard, event);
                }
            }
            Event::TourSubmitted { booking } => {
                self.tours
                    .insert(booking.id, Arc::new(RwLock::new(booking.clone())));
            }
            Event::TourConfirmed { id, slot, .. } => {
                self.replay_tour(id, event);
                self.replay_slot(slot.date, event);
            }
            Event::TourCancelled { id, released, .. } => {
                self.replay_tour(id, event);
                if let Some(slot) = released {
                    self.replay_slot(slot.date, event);
                }
            }
            Event::TourCompleted { id, .. } => self.replay_tour(id, event),
            Event::AppointmentRequested { appointment } => {
                self.appointments
                    .insert(appointment.id, Arc::new(RwLock::new(appointment.clone())));
            }
            Event::AppointmentTransitioned { id, .. } => {
                if let Some(appt) = self.appointments.get(id)
                    && let Ok(mut guard) = appt.try_write()
                {
                    apply_to_appointment(&mut guard, event);
                }
            }
            Event::AppointmentDeleted { id } => {
                self.appointments.remove(id);
            }
        }
    }

    fn replay_tour(&self, id: &Ulid, event: &Event) {
        if let Some(b) = self.tours.get(id)
            && let Ok(mut guard) = b.try_write()
        {
            apply_to_tour(&mut guard, event);
        }
    }

    fn replay_slot(&self, date: NaiveDate, event: &Event) {
        if let Some(d) = self.dates.get(&date)
            && let Ok(mut guard) = d.try_write()
        {
            apply_to_date(&mut guard, event);
        }
    }

    pub(super) fn date_entry(&self, date: NaiveDate) -> Shared<DateAvailability> {
        self.dates
            .entry(date)
            .or_insert_with(|| Arc::new(RwLock::new(DateAvailability::new(date))))
            .value()
            .clone()
    }

    pub fn get_date(&self, date: &NaiveDate) -> Option<Shared<DateAvailability>> {
        self.dates.get(date).map(|e| e.value().clone())
    }

    pub(super) fn get_tour_arc(&self, id: &Ulid) -> Result<Shared<TourBooking>, EngineError> {
        self.tours
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| EngineError::not_found("tour booking", id))
    }

    pub(super) fn get_appointment_arc(&self, id: &Ulid) -> Result<Shared<Appointment>, EngineError> {
        self.appointments
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| EngineError::not_found("appointment", id))
    }

    pub fn window(&self) -> OperatingWindow {
        self.window
    }

    /// Current instant on the injected clock.
    pub fn now_ms(&self) -> Ms {
        self.clock.now_ms()
    }

    /// Shared side of the commit gate. Take it before any record lock.
    pub(super) async fn begin_commit(&self) -> RwLockReadGuard<'_, ()> {
        self.commit_gate.read().await
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Best-effort delivery after a committed transition. Failure is logged
    /// and counted, never returned.
    pub(super) fn dispatch(&self, notification: Notification) {
        let kind = notification.kind.as_str();
        match self.notifier.notify(&notification) {
            Ok(()) => tracing::debug!("notified {} ({kind})", notification.recipient),
            Err(e) => {
                tracing::warn!(
                    "notification {kind} to {} for {} failed: {e}",
                    notification.recipient,
                    notification.payload.reference
                );
                metrics::counter!(crate::observability::NOTIFICATIONS_FAILED_TOTAL, "kind" => kind)
                    .increment(1);
            }
        }
    }

    /// Rewrite the WAL with the minimal events that recreate current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _exclusive = self.commit_gate.write().await;
        let mut events = Vec::new();

        let mut days: Vec<Shared<DateAvailability>> =
            self.dates.iter().map(|e| e.value().clone()).collect();
        let mut snapshot_days = Vec::with_capacity(days.len());
        for day in days.drain(..) {
            let guard = day.read().await;
            snapshot_days.push(guard.clone());
        }
        snapshot_days.sort_by_key(|d| d.date);
        events.extend(snapshot_days.into_iter().map(|d| Event::SlotsRestored {
            date: d.date,
            slots: d.slots,
        }));

        let tours: Vec<Shared<TourBooking>> = self.tours.iter().map(|e| e.value().clone()).collect();
        for b in tours {
            let booking = b.read().await.clone();
            events.push(Event::TourSubmitted { booking });
        }

        let appts: Vec<Shared<Appointment>> =
            self.appointments.iter().map(|e| e.value().clone()).collect();
        for a in appts {
            let appointment = a.read().await.clone();
            events.push(Event::AppointmentRequested { appointment });
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        tracing::info!("compacted WAL to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
