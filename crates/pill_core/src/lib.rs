pub mod actions;
pub mod clock;
pub mod error;
pub mod medicine;
pub mod notifications;
pub mod reconcile;
pub mod scheduler;
pub mod service;
pub mod store;

pub use crate::error::{DispatchError, ReminderError, Result, StoreError, ValidationError};
pub use crate::service::{ReminderService, ReminderServiceBuilder};
