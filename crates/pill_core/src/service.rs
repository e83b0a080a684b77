use std::sync::Arc;

use chrono::NaiveDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{DispatchError, ReminderError, Result};
use crate::medicine::{Medicine, MedicineDraft};
use crate::notifications::{ArmedNotification, InMemoryDispatcher, NotificationDispatcher};
use crate::scheduler::{ReminderScheduler, DEFAULT_CYCLES};
use crate::store::{MemoryStore, RecordStore};

/// Owner of the pending notification set. Every operation that touches reminders or
/// records runs behind one gate, so concurrent callers are applied one at a time.
pub struct ReminderService {
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) scheduler: ReminderScheduler,
    pub(crate) cycles: u32,
    pub(crate) gate: Mutex<()>,
}

pub struct ReminderServiceBuilder {
    store: Option<Arc<dyn RecordStore>>,
    dispatcher: Option<Arc<dyn NotificationDispatcher>>,
    clock: Option<Arc<dyn Clock>>,
    cycles: u32,
}

impl Default for ReminderServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReminderServiceBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            dispatcher: None,
            clock: None,
            cycles: DEFAULT_CYCLES,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_cycles(mut self, cycles: u32) -> Self {
        self.cycles = cycles.max(1);
        self
    }

    /// Missing collaborators fall back to the in-memory store and dispatcher and the
    /// system clock.
    pub fn build(self) -> ReminderService {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn RecordStore>);
        let dispatcher = self.dispatcher.unwrap_or_else(|| {
            Arc::new(InMemoryDispatcher::new()) as Arc<dyn NotificationDispatcher>
        });
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        ReminderService {
            store,
            scheduler: ReminderScheduler::new(dispatcher, clock),
            cycles: self.cycles,
            gate: Mutex::new(()),
        }
    }
}

impl ReminderService {
    pub fn builder() -> ReminderServiceBuilder {
        ReminderServiceBuilder::new()
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn now(&self) -> NaiveDateTime {
        self.scheduler.now()
    }

    pub async fn medicines(&self) -> Result<Vec<Medicine>> {
        Ok(self.store.get_all().await?)
    }

    pub async fn medicine(&self, id: &str) -> Result<Medicine> {
        let medicines = self.store.get_all().await?;
        find(medicines, id)
    }

    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn add_medicine(&self, draft: MedicineDraft) -> Result<Medicine> {
        let medicine = draft.validate()?;
        let _gate = self.gate.lock().await;
        self.store.put(medicine.clone()).await?;
        let medicine = self.rearm(medicine, None).await?;
        info!(medicine = %medicine.id, time = %medicine.time, "medicine added");
        Ok(medicine)
    }

    #[instrument(skip(self))]
    pub async fn remove_medicine(&self, id: &str) -> Result<()> {
        let _gate = self.gate.lock().await;
        let mut medicine = find(self.store.get_all().await?, id)?;
        self.disarm(&mut medicine).await?;
        self.store.delete(id).await?;
        info!(medicine = %id, "medicine removed");
        Ok(())
    }

    pub async fn pending_notifications(&self) -> Result<Vec<ArmedNotification>> {
        Ok(self.scheduler.dispatcher().list_all().await?)
    }

    /// Tears down the pending notification set: cancels everything the application has
    /// armed and forgets every medicine's armed identifiers.
    #[instrument(skip(self))]
    pub async fn clear_all_notifications(&self) -> Result<()> {
        let _gate = self.gate.lock().await;
        self.scheduler.dispatcher().cancel_all().await?;
        for mut medicine in self.store.get_all().await? {
            if medicine.armed_notifications.is_empty() {
                continue;
            }
            medicine.armed_notifications.clear();
            self.store.put(medicine).await?;
        }
        info!("cleared all notifications");
        Ok(())
    }
}

impl ReminderService {
    /// Cancels the notifications armed for `medicine` and empties its armed set. Ids the
    /// dispatcher no longer knows have already been delivered.
    pub(crate) async fn disarm(&self, medicine: &mut Medicine) -> Result<()> {
        let dispatcher = self.scheduler.dispatcher();
        for id in &medicine.armed_notifications {
            match dispatcher.cancel(id).await {
                Ok(()) => debug!(medicine = %medicine.id, %id, "cancelled reminder"),
                Err(DispatchError::UnknownNotification(_)) => {
                    debug!(medicine = %medicine.id, %id, "reminder already delivered")
                }
                Err(err) => return Err(err.into()),
            }
        }
        medicine.armed_notifications.clear();
        Ok(())
    }

    pub(crate) async fn rearm(
        &self,
        mut medicine: Medicine,
        start_at: Option<NaiveDateTime>,
    ) -> Result<Medicine> {
        self.disarm(&mut medicine).await?;
        let outcome = self
            .scheduler
            .schedule(&medicine, start_at, self.cycles)
            .await?;
        if !outcome.is_complete() {
            warn!(
                medicine = %medicine.id,
                armed = outcome.armed.len(),
                planned = outcome.planned,
                "reminders only partially scheduled"
            );
        }
        medicine.armed_notifications = outcome.armed;
        self.store.put(medicine.clone()).await?;
        Ok(medicine)
    }

    pub(crate) async fn rearm_others(&self, except: &str) -> Result<()> {
        for medicine in self.store.get_all().await? {
            if medicine.id == except || !medicine.is_pending() {
                continue;
            }
            self.rearm(medicine, None).await?;
        }
        Ok(())
    }
}

pub(crate) fn find(medicines: Vec<Medicine>, id: &str) -> Result<Medicine> {
    medicines
        .into_iter()
        .find(|medicine| medicine.id == id)
        .ok_or_else(|| ReminderError::UnknownMedicine(id.to_string()))
}
