use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

pub const REMINDER_SOUND: &str = "take_your_pills_notification";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(String);

impl NotificationId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Default,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub sound: String,
    pub priority: NotificationPriority,
    pub scheduled_for: NaiveDateTime,
}

impl NotificationRequest {
    pub fn primary(medicine_name: &str, at: NaiveDateTime) -> Self {
        Self {
            title: "Time to take your medicine!".to_string(),
            body: format!("Remember to take {medicine_name}"),
            sound: REMINDER_SOUND.to_string(),
            priority: NotificationPriority::High,
            scheduled_for: at,
        }
    }

    pub fn repeat(medicine_name: &str, ordinal: u32, at: NaiveDateTime) -> Self {
        Self {
            title: "Reminder: time to take your medicine!".to_string(),
            body: format!("{medicine_name} - Repeat reminder {ordinal}"),
            sound: REMINDER_SOUND.to_string(),
            priority: NotificationPriority::High,
            scheduled_for: at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmedNotification {
    pub id: NotificationId,
    pub request: NotificationRequest,
}

/// Platform notification adapters implement this trait. Every notification fires once
/// at its absolute instant.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn schedule(&self, request: NotificationRequest)
        -> Result<NotificationId, DispatchError>;
    async fn cancel(&self, id: &NotificationId) -> Result<(), DispatchError>;
    /// Cancels everything this application has armed.
    async fn cancel_all(&self) -> Result<(), DispatchError>;
    async fn list_all(&self) -> Result<Vec<ArmedNotification>, DispatchError>;
}

#[derive(Debug, Default)]
struct DispatcherState {
    next_id: u64,
    armed: Vec<ArmedNotification>,
    accept_remaining: Option<usize>,
    unavailable: bool,
}

/// Dispatcher that keeps armed notifications in memory. Supports failure injection.
#[derive(Debug, Default)]
pub struct InMemoryDispatcher {
    state: Mutex<DispatcherState>,
}

impl InMemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `count` more schedule requests, then reject every following one.
    pub fn fail_after(&self, count: usize) {
        self.state.lock().accept_remaining = Some(count);
    }

    /// While unavailable every call fails with [`DispatchError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    pub fn armed(&self) -> Vec<ArmedNotification> {
        self.state.lock().armed.clone()
    }

    pub fn armed_ids(&self) -> Vec<NotificationId> {
        self.state
            .lock()
            .armed
            .iter()
            .map(|armed| armed.id.clone())
            .collect()
    }

    /// Removes a notification as if the platform had delivered it.
    pub fn deliver(&self, id: &NotificationId) -> Option<ArmedNotification> {
        let mut state = self.state.lock();
        let index = state.armed.iter().position(|armed| &armed.id == id)?;
        Some(state.armed.remove(index))
    }

    fn check_available(state: &DispatcherState) -> Result<(), DispatchError> {
        if state.unavailable {
            return Err(DispatchError::Unavailable(
                "in-memory dispatcher switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for InMemoryDispatcher {
    async fn schedule(
        &self,
        request: NotificationRequest,
    ) -> Result<NotificationId, DispatchError> {
        let mut state = self.state.lock();
        Self::check_available(&state)?;
        if let Some(remaining) = state.accept_remaining.as_mut() {
            if *remaining == 0 {
                return Err(DispatchError::Rejected(
                    "notification permission revoked".to_string(),
                ));
            }
            *remaining -= 1;
        }
        state.next_id += 1;
        let id = NotificationId::new(format!("notification-{}", state.next_id));
        state.armed.push(ArmedNotification {
            id: id.clone(),
            request,
        });
        Ok(id)
    }

    async fn cancel(&self, id: &NotificationId) -> Result<(), DispatchError> {
        let mut state = self.state.lock();
        Self::check_available(&state)?;
        let index = state
            .armed
            .iter()
            .position(|armed| &armed.id == id)
            .ok_or_else(|| DispatchError::UnknownNotification(id.clone()))?;
        state.armed.remove(index);
        Ok(())
    }

    async fn cancel_all(&self) -> Result<(), DispatchError> {
        let mut state = self.state.lock();
        Self::check_available(&state)?;
        state.armed.clear();
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<ArmedNotification>, DispatchError> {
        let state = self.state.lock();
        Self::check_available(&state)?;
        Ok(state.armed.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn rejects_after_quota_and_reports_unknown_cancels() {
        let dispatcher = InMemoryDispatcher::new();
        dispatcher.fail_after(1);
        let first = dispatcher
            .schedule(NotificationRequest::primary("Iron", at(8)))
            .await
            .unwrap();
        let second = dispatcher
            .schedule(NotificationRequest::repeat("Iron", 1, at(9)))
            .await;
        assert!(matches!(second, Err(DispatchError::Rejected(_))));

        dispatcher.cancel(&first).await.unwrap();
        assert_eq!(
            dispatcher.cancel(&first).await,
            Err(DispatchError::UnknownNotification(first.clone()))
        );
    }

    #[test]
    fn repeat_content_names_the_ordinal() {
        let request = NotificationRequest::repeat("Vitamin D", 2, at(10));
        assert_eq!(request.body, "Vitamin D - Repeat reminder 2");
        assert_eq!(request.sound, REMINDER_SOUND);
        assert_eq!(request.priority, NotificationPriority::High);
    }
}
