use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "kinderslot_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "kinderslot_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "kinderslot_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "kinderslot_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "kinderslot_connections_rejected_total";

/// Gauge: number of active tenants (loaded engines).
pub const TENANTS_ACTIVE: &str = "kinderslot_tenants_active";

/// Counter: logins whose user name is not a known actor.
pub const AUTH_FAILURES_TOTAL: &str = "kinderslot_auth_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "kinderslot_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "kinderslot_wal_flush_batch_size";

// ── Domain metrics ──────────────────────────────────────────────

/// Counter: tours moved to confirmed.
pub const TOURS_CONFIRMED_TOTAL: &str = "kinderslot_tours_confirmed_total";

/// Counter: confirms that lost the slot to another booking.
pub const SLOT_CONFLICTS_TOTAL: &str = "kinderslot_slot_conflicts_total";

/// Counter: appointment state changes. Labels: action.
pub const APPOINTMENT_TRANSITIONS_TOTAL: &str = "kinderslot_appointment_transitions_total";

/// Counter: notifications the notifier could not deliver. Labels: kind.
pub const NOTIFICATIONS_FAILED_TOTAL: &str = "kinderslot_notifications_failed_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::warn!("metrics exporter not installed: {e}"),
    }
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::PublishAvailability { .. } => "publish_availability",
        Command::SelectAvailability { .. } => "select_availability",
        Command::SubmitTour { .. } => "submit_tour",
        Command::ConfirmTour { .. } => "confirm_tour",
        Command::CompleteTour { .. } => "complete_tour",
        Command::CancelTour { .. } => "cancel_tour",
        Command::SelectTours { .. } => "select_tours",
        Command::RequestAppointment { .. } => "request_appointment",
        Command::RespondToAppointment { .. } => "respond_to_appointment",
        Command::DeleteAppointment { .. } => "delete_appointment",
        Command::SelectAppointments { .. } => "select_appointments",
        Command::ExportCalendar { .. } => "export_calendar",
    }
}
