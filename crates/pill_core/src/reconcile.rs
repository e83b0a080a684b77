use chrono::NaiveDate;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::service::ReminderService;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub day: NaiveDate,
    pub rolled_over: bool,
    pub reset: Vec<String>,
}

pub fn is_new_day(marker: Option<NaiveDate>, today: NaiveDate) -> bool {
    marker != Some(today)
}

impl ReminderService {
    /// Makes every medicine taken on an earlier day due again. Runs at startup, once
    /// per calendar day.
    #[instrument(skip(self))]
    pub async fn reconcile_daily(&self) -> Result<ReconcileReport> {
        let _gate = self.gate.lock().await;
        let today = self.now().date();
        let marker = self.store.get_marker().await?;
        if !is_new_day(marker, today) {
            debug!(%today, "day already reconciled");
            return Ok(ReconcileReport {
                day: today,
                rolled_over: false,
                reset: Vec::new(),
            });
        }

        let mut reset = Vec::new();
        for mut medicine in self.store.get_all().await? {
            if !medicine.taken {
                continue;
            }
            // `rearm` persists the reset record.
            medicine.taken = false;
            let medicine = self.rearm(medicine, None).await?;
            reset.push(medicine.id);
        }

        self.store.set_marker(today).await?;
        info!(%today, previous = ?marker, reset = reset.len(), "reconciled new day");
        Ok(ReconcileReport {
            day: today,
            rolled_over: true,
            reset,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::FixedClock;
    use crate::error::ReminderError;
    use crate::medicine::Medicine;
    use crate::notifications::{InMemoryDispatcher, NotificationId};
    use crate::store::MemoryStore;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn medicine(id: &str, time: &str, taken: bool) -> Medicine {
        Medicine {
            id: id.to_string(),
            name: format!("Medicine {id}"),
            time: time.to_string(),
            repeat_interval: 0,
            max_repeats: 0,
            snooze_time: 10,
            taken,
            armed_notifications: Vec::new(),
        }
    }

    fn service(
        store: Arc<MemoryStore>,
        dispatcher: Arc<InMemoryDispatcher>,
        clock: Arc<FixedClock>,
    ) -> ReminderService {
        ReminderService::builder()
            .with_store(store)
            .with_dispatcher(dispatcher)
            .with_clock(clock)
            .with_cycles(1)
            .build()
    }

    #[test]
    fn new_day_detection() {
        assert!(is_new_day(None, day(2)));
        assert!(is_new_day(Some(day(1)), day(2)));
        assert!(!is_new_day(Some(day(2)), day(2)));
    }

    #[tokio::test]
    async fn rollover_resets_taken_medicines() {
        let store = Arc::new(
            MemoryStore::with_medicines(vec![
                medicine("a", "08:00", true),
                medicine("b", "20:00", true),
                medicine("c", "12:00", false),
            ])
            .with_marker(day(1)),
        );
        let dispatcher = Arc::new(InMemoryDispatcher::new());
        let clock = Arc::new(FixedClock::new(day(2).and_hms_opt(9, 0, 0).unwrap()));
        let service = service(store.clone(), dispatcher.clone(), clock);

        let report = service.reconcile_daily().await.unwrap();

        assert!(report.rolled_over);
        assert_eq!(report.reset, vec!["a".to_string(), "b".to_string()]);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.last_reset, Some(day(2)));
        assert!(snapshot.medicines.iter().all(|medicine| !medicine.taken));
        let instants: Vec<_> = dispatcher
            .armed()
            .into_iter()
            .map(|armed| armed.request.scheduled_for)
            .collect();
        assert_eq!(
            instants,
            vec![
                day(3).and_hms_opt(8, 0, 0).unwrap(),
                day(2).and_hms_opt(20, 0, 0).unwrap()
            ]
        );
        assert!(snapshot.medicines[2].armed_notifications.is_empty());
    }

    #[tokio::test]
    async fn second_run_on_the_same_day_is_a_no_op() {
        let store = Arc::new(MemoryStore::with_medicines(vec![medicine(
            "a", "08:00", true,
        )]));
        let dispatcher = Arc::new(InMemoryDispatcher::new());
        let clock = Arc::new(FixedClock::new(day(5).and_hms_opt(6, 0, 0).unwrap()));
        let service = service(store.clone(), dispatcher.clone(), clock);

        let first = service.reconcile_daily().await.unwrap();
        assert!(first.rolled_over);
        service.take("a").await.unwrap();

        let second = service.reconcile_daily().await.unwrap();
        assert!(!second.rolled_over);
        assert!(second.reset.is_empty());
        assert_eq!(store.snapshot().last_reset, Some(day(5)));
        assert!(store.snapshot().medicines[0].taken);
        assert!(dispatcher.armed().is_empty());
    }

    #[tokio::test]
    async fn marker_is_written_even_without_taken_medicines() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(day(7).and_hms_opt(0, 0, 0).unwrap()));
        let service = service(store.clone(), Arc::new(InMemoryDispatcher::new()), clock);

        let report = service.reconcile_daily().await.unwrap();
        assert!(report.rolled_over);
        assert!(report.reset.is_empty());
        assert_eq!(store.snapshot().last_reset, Some(day(7)));
    }

    #[tokio::test]
    async fn store_failure_leaves_the_marker_for_a_retry() {
        let store = Arc::new(
            MemoryStore::with_medicines(vec![medicine("a", "08:00", true)]).with_marker(day(1)),
        );
        let clock = Arc::new(FixedClock::new(day(2).and_hms_opt(6, 0, 0).unwrap()));
        let service = service(store.clone(), Arc::new(InMemoryDispatcher::new()), clock);

        store.set_unavailable(true);
        assert!(matches!(
            service.reconcile_daily().await,
            Err(ReminderError::Store(_))
        ));
        store.set_unavailable(false);
        assert_eq!(store.snapshot().last_reset, Some(day(1)));
        assert!(store.snapshot().medicines[0].taken);

        let retry = service.reconcile_daily().await.unwrap();
        assert!(retry.rolled_over);
        assert_eq!(retry.reset, vec!["a".to_string()]);
        assert_eq!(store.snapshot().last_reset, Some(day(2)));
    }

    #[tokio::test]
    async fn dispatch_failure_part_way_keeps_the_old_marker() {
        let mut stale = medicine("b", "20:00", true);
        stale.armed_notifications = vec![NotificationId::new("left-over")];
        let store = Arc::new(
            MemoryStore::with_medicines(vec![medicine("a", "08:00", true), stale])
                .with_marker(day(1)),
        );
        let dispatcher = Arc::new(InMemoryDispatcher::new());
        let clock = Arc::new(FixedClock::new(day(2).and_hms_opt(6, 0, 0).unwrap()));
        let service = service(store.clone(), dispatcher.clone(), clock);

        dispatcher.set_unavailable(true);
        assert!(matches!(
            service.reconcile_daily().await,
            Err(ReminderError::Dispatch(_))
        ));
        let snapshot = store.snapshot();
        assert_eq!(snapshot.last_reset, Some(day(1)));
        assert!(!snapshot.medicines[0].taken);
        assert!(snapshot.medicines[1].taken);

        dispatcher.set_unavailable(false);
        let retry = service.reconcile_daily().await.unwrap();
        assert_eq!(retry.reset, vec!["b".to_string()]);
        assert_eq!(store.snapshot().last_reset, Some(day(2)));
    }
}
