use std::fmt;

use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;
use ulid::Ulid;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    TourConfirmed,
    AppointmentConfirmed,
    AppointmentRejected,
    AppointmentProposed,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::TourConfirmed => "tour_confirmed",
            NotificationKind::AppointmentConfirmed => "appointment_confirmed",
            NotificationKind::AppointmentRejected => "appointment_rejected",
            NotificationKind::AppointmentProposed => "appointment_proposed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Recipient {
    Email(String),
    Parent(Ulid),
    Teacher(Ulid),
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Email(addr) => write!(f, "email:{addr}"),
            Recipient::Parent(id) => write!(f, "parent:{id}"),
            Recipient::Teacher(id) => write!(f, "teacher:{id}"),
        }
    }
}

/// What the message is about. Rendering it into an e-mail is someone else's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Booking or appointment id.
    pub reference: Ulid,
    pub date: NaiveDate,
    /// Canonical `HH:MM AM/PM`.
    pub time: String,
    pub topic: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient: Recipient,
    pub payload: NotificationPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyError(pub String);

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notification failed: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

/// Outbound notification seam. The engine calls this after a transition is
/// durable; an error here is logged and never undoes the transition.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Broadcast hub: per-recipient channels plus a firehose of everything.
pub struct NotifyHub {
    channels: DashMap<Recipient, broadcast::Sender<Notification>>,
    firehose: broadcast::Sender<Notification>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            firehose: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Subscribe to notifications for one recipient. Creates the channel if needed.
    pub fn subscribe(&self, recipient: Recipient) -> broadcast::Receiver<Notification> {
        let sender = self
            .channels
            .entry(recipient)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<Notification> {
        self.firehose.subscribe()
    }
}

impl Notifier for NotifyHub {
    /// No-op if nobody is listening.
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if let Some(sender) = self.channels.get(&notification.recipient) {
            let _ = sender.send(notification.clone());
        }
        let _ = self.firehose.send(notification.clone());
        Ok(())
    }
}

/// Drain the hub firehose and log each notification as JSON. Stands in for
/// the mail relay, which subscribes the same way.
pub async fn run_log_relay(mut rx: broadcast::Receiver<Notification>, tenant: String) {
    loop {
        match rx.recv().await {
            Ok(n) => match serde_json::to_string(&n) {
                Ok(json) => info!(tenant = %tenant, "notification {json}"),
                Err(e) => tracing::warn!("unserializable notification: {e}"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(tenant = %tenant, "notification relay lagged, skipped {skipped}");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(recipient: Recipient) -> Notification {
        Notification {
            kind: NotificationKind::TourConfirmed,
            recipient,
            payload: NotificationPayload {
                reference: Ulid::new(),
                date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
                time: "09:00 AM".into(),
                topic: None,
                reason: None,
            },
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let who = Recipient::Email("ana@example.com".into());
        let mut rx = hub.subscribe(who.clone());

        let n = sample(who);
        hub.notify(&n).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received, n);
    }

    #[tokio::test]
    async fn firehose_sees_every_recipient() {
        let hub = NotifyHub::new();
        let mut all = hub.subscribe_all();
        hub.notify(&sample(Recipient::Parent(Ulid::new()))).unwrap();
        hub.notify(&sample(Recipient::Teacher(Ulid::new()))).unwrap();
        assert!(matches!(all.recv().await.unwrap().recipient, Recipient::Parent(_)));
        assert!(matches!(all.recv().await.unwrap().recipient, Recipient::Teacher(_)));
    }

    #[tokio::test]
    async fn other_recipients_are_not_delivered() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(Recipient::Parent(Ulid::new()));
        hub.notify(&sample(Recipient::Parent(Ulid::new()))).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        assert!(hub.notify(&sample(Recipient::Email("x@y.z".into()))).is_ok());
    }

    #[test]
    fn payload_serializes_to_json() {
        let json = serde_json::to_value(sample(Recipient::Email("x@y.z".into()))).unwrap();
        assert_eq!(json["kind"], "tourConfirmed");
        assert_eq!(json["recipient"]["type"], "email");
        assert_eq!(json["payload"]["date"], "2025-02-01");
    }
}
