use thiserror::Error;

use crate::notifications::NotificationId;

pub type Result<T> = std::result::Result<T, ReminderError>;

/// Failures reported by a [`NotificationDispatcher`](crate::notifications::NotificationDispatcher).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("notification rejected: {0}")]
    Rejected(String),
    #[error("unknown notification `{0}`")]
    UnknownNotification(NotificationId),
    #[error("notification service unavailable: {0}")]
    Unavailable(String),
}

/// Failures reported by a [`RecordStore`](crate::store::RecordStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store contents are malformed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("medicine name must not be empty")]
    EmptyName,
    #[error("time of day `{0}` is not in HH:MM format")]
    InvalidTime(String),
    #[error("snooze time must be at least one minute")]
    InvalidSnooze,
    #[error("reminder instant is out of range")]
    OutOfRange,
}

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no medicine with id `{0}`")]
    UnknownMedicine(String),
    #[error("medicine `{0}` is already resolved for today")]
    NotPending(String),
}
