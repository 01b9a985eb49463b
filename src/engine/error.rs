use ulid::Ulid;

use crate::grid::SlotRange;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Off-grid, non-positive, or over-8-hour interval. Always distinct
    /// from a conflict: an invalid request is never "no conflict found".
    InvalidInterval(&'static str),
    /// Valid interval that overlaps an existing booking.
    Conflict { booking_id: Ulid, slots: SlotRange },
    NotFound(Ulid),
    AlreadyExists(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInterval(reason) => write!(f, "invalid time slot: {reason}"),
            EngineError::Conflict { slots, .. } => {
                write!(f, "Room is already booked during this time period ({slots})")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
