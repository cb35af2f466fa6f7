use crate::model::SlotRef;

#[derive(Debug)]
pub enum EngineError {
    /// Malformed input. Nothing was mutated.
    Validation(String),
    /// The requested slot is not published or already booked (submission time).
    SlotUnavailable(SlotRef),
    /// Another booking was confirmed into the slot first (confirmation time).
    SlotNoLongerAvailable(SlotRef),
    /// Compare-and-set failed: slot already booked, or the caller's view is stale.
    Conflict(String),
    InvalidTransition {
        entity: &'static str,
        from: &'static str,
        attempted: &'static str,
    },
    NotFound {
        what: &'static str,
        key: String,
    },
    Unauthorized(String),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub(crate) fn not_found(what: &'static str, key: impl ToString) -> Self {
        EngineError::NotFound {
            what,
            key: key.to_string(),
        }
    }

    /// SQLSTATE reported to wire clients. Distinct per variant.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "22023",
            EngineError::SlotUnavailable(_) => "23P01",
            EngineError::SlotNoLongerAvailable(_) => "23505",
            EngineError::Conflict(_) => "40001",
            EngineError::InvalidTransition { .. } => "55000",
            EngineError::NotFound { .. } => "P0002",
            EngineError::Unauthorized(_) => "42501",
            EngineError::LimitExceeded(_) => "54000",
            EngineError::WalError(_) => "58030",
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::SlotUnavailable(_) => "slot_unavailable",
            EngineError::SlotNoLongerAvailable(_) => "slot_no_longer_available",
            EngineError::Conflict(_) => "conflict",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::NotFound { .. } => "not_found",
            EngineError::Unauthorized(_) => "unauthorized",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "validation error: {msg}"),
            EngineError::SlotUnavailable(slot) => write!(f, "slot unavailable: {slot}"),
            EngineError::SlotNoLongerAvailable(slot) => {
                write!(f, "slot no longer available: {slot}")
            }
            EngineError::Conflict(msg) => write!(f, "conflict: {msg}"),
            EngineError::InvalidTransition {
                entity,
                from,
                attempted,
            } => write!(f, "invalid {entity} transition: {from} -> {attempted}"),
            EngineError::NotFound { what, key } => write!(f, "{what} not found: {key}"),
            EngineError::Unauthorized(msg) => write!(f, "not authorized: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
