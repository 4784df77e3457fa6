use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("In-person slot on {date} at {} is already taken", .time.format("%H:%M"))]
    SlotTaken { date: NaiveDate, time: NaiveTime },
    #[error("Appointment {0} does not exist")]
    NotFound(Uuid),
    #[error("Appointment {id} has an unreadable row: {reason}")]
    CorruptRow { id: Uuid, reason: String },
    #[error("Database error: {0}")]
    Database(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulingError {
    #[error("Invalid appointment: {0}")]
    Validation(String),
    #[error("Invalid recurrence: {0}")]
    InvalidRecurrence(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a single appointment of a batch was not created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CreationFailure {
    #[error("Time conflict on {date} at {}", .time.format("%H:%M"))]
    Conflict { date: NaiveDate, time: NaiveTime },
    #[error("Unable to check for conflicts on {date} at {}: {source}", .time.format("%H:%M"))]
    Undetermined {
        date: NaiveDate,
        time: NaiveTime,
        source: StoreError,
    },
    #[error(transparent)]
    Store(StoreError),
    #[error("Unexpected error while creating appointment")]
    Unexpected,
}

impl CreationFailure {
    /// Slot taken, either seen by the pre-check or by the store's own constraint.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            CreationFailure::Conflict { .. } | CreationFailure::Store(StoreError::SlotTaken { .. })
        )
    }
}
