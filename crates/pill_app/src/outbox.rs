use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Timelike};
use parking_lot::Mutex;
use pill_core::{
    clock::Clock,
    notifications::{ArmedNotification, NotificationDispatcher, NotificationId, NotificationRequest},
    DispatchError,
};
use tracing::info;
use uuid::Uuid;

/// Notification dispatcher backed by a JSON file. Notifications whose instant has
/// passed are delivered (logged and dropped) the next time the outbox is opened.
pub struct FileDispatcher {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl FileDispatcher {
    pub fn new(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            clock,
            lock: Mutex::new(()),
        }
    }

    /// Start of the current minute. Reminders are planned on whole minutes from an
    /// earlier clock reading, so one due in the current minute is still accepted.
    fn current_minute(&self) -> NaiveDateTime {
        let now = self.clock.now();
        now.with_second(0)
            .and_then(|minute| minute.with_nanosecond(0))
            .unwrap_or(now)
    }

    fn unavailable(err: impl std::fmt::Display) -> DispatchError {
        DispatchError::Unavailable(err.to_string())
    }

    fn load(&self) -> Result<Vec<ArmedNotification>, DispatchError> {
        let armed: Vec<ArmedNotification> = match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Vec::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(Self::unavailable)?,
            Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(Self::unavailable(err)),
        };

        let now = self.clock.now();
        let (due, waiting): (Vec<_>, Vec<_>) = armed
            .into_iter()
            .partition(|notification| notification.request.scheduled_for <= now);
        for notification in &due {
            info!(
                id = %notification.id,
                at = %notification.request.scheduled_for,
                "{}: {}",
                notification.request.title,
                notification.request.body
            );
        }
        Ok(waiting)
    }

    fn save(&self, armed: &[ArmedNotification]) -> Result<(), DispatchError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(Self::unavailable)?;
            }
        }
        let payload = serde_json::to_string_pretty(armed).map_err(Self::unavailable)?;
        fs::write(&self.path, payload).map_err(Self::unavailable)
    }
}

#[async_trait]
impl NotificationDispatcher for FileDispatcher {
    async fn schedule(
        &self,
        request: NotificationRequest,
    ) -> Result<NotificationId, DispatchError> {
        let _guard = self.lock.lock();
        if request.scheduled_for < self.current_minute() {
            return Err(DispatchError::Rejected(format!(
                "{} is in the past",
                request.scheduled_for
            )));
        }
        let mut armed = self.load()?;
        let id = NotificationId::new(Uuid::new_v4().to_string());
        armed.push(ArmedNotification {
            id: id.clone(),
            request,
        });
        self.save(&armed)?;
        Ok(id)
    }

    async fn cancel(&self, id: &NotificationId) -> Result<(), DispatchError> {
        let _guard = self.lock.lock();
        let mut armed = self.load()?;
        let before = armed.len();
        armed.retain(|notification| &notification.id != id);
        if armed.len() == before {
            self.save(&armed)?;
            return Err(DispatchError::UnknownNotification(id.clone()));
        }
        self.save(&armed)
    }

    async fn cancel_all(&self) -> Result<(), DispatchError> {
        let _guard = self.lock.lock();
        self.save(&[])
    }

    async fn list_all(&self) -> Result<Vec<ArmedNotification>, DispatchError> {
        let _guard = self.lock.lock();
        let armed = self.load()?;
        self.save(&armed)?;
        Ok(armed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use pill_core::clock::FixedClock;

    #[tokio::test]
    async fn delivers_due_notifications_and_forgets_them() {
        let temp = tempfile::tempdir().unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let clock = Arc::new(FixedClock::new(start));
        let outbox = FileDispatcher::new(temp.path().join("notifications.json"), clock.clone());

        let soon = outbox
            .schedule(NotificationRequest::primary("Iron", start + Duration::minutes(5)))
            .await
            .unwrap();
        let later = outbox
            .schedule(NotificationRequest::primary("Iron", start + Duration::hours(2)))
            .await
            .unwrap();
        assert!(matches!(
            outbox
                .schedule(NotificationRequest::primary("Iron", start - Duration::minutes(1)))
                .await,
            Err(DispatchError::Rejected(_))
        ));

        clock.advance(Duration::minutes(30));
        let remaining = outbox.list_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, later);
        assert_eq!(
            outbox.cancel(&soon).await,
            Err(DispatchError::UnknownNotification(soon.clone()))
        );

        outbox.cancel(&later).await.unwrap();
        assert!(outbox.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn accepts_a_reminder_due_in_the_current_minute() {
        let temp = tempfile::tempdir().unwrap();
        let minute = NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let clock = Arc::new(FixedClock::new(minute + Duration::milliseconds(300)));
        let outbox = FileDispatcher::new(temp.path().join("notifications.json"), clock.clone());

        outbox
            .schedule(NotificationRequest::primary("Iron", minute))
            .await
            .unwrap();
        outbox
            .schedule(NotificationRequest::repeat("Iron", 1, minute + Duration::minutes(10)))
            .await
            .unwrap();

        clock.advance(Duration::minutes(1));
        let remaining = outbox.list_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].request.scheduled_for, minute + Duration::minutes(10));
    }
}
