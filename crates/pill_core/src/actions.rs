use chrono::Duration;
use futures::future::join_all;
use tracing::{info, instrument};

use crate::error::{ReminderError, Result, ValidationError};
use crate::medicine::Medicine;
use crate::service::{find, ReminderService};

/// How the user resolved today's dose. Both outcomes mark the medicine as taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoseOutcome {
    Taken,
    Declined,
}

impl ReminderService {
    pub async fn take(&self, id: &str) -> Result<Medicine> {
        self.resolve(id, DoseOutcome::Taken).await
    }

    pub async fn wont_take(&self, id: &str) -> Result<Medicine> {
        self.resolve(id, DoseOutcome::Declined).await
    }

    #[instrument(skip(self))]
    async fn resolve(&self, id: &str, outcome: DoseOutcome) -> Result<Medicine> {
        let _gate = self.gate.lock().await;
        let mut medicine = find(self.store.get_all().await?, id)?;
        if medicine.taken {
            info!(medicine = %id, "medicine already resolved for today");
            return Ok(medicine);
        }

        self.disarm(&mut medicine).await?;
        medicine.taken = true;
        self.store.put(medicine.clone()).await?;
        self.rearm_others(id).await?;
        info!(medicine = %id, ?outcome, "dose resolved");
        Ok(medicine)
    }

    /// Restarts the medicine's cycle `minutes` from now, or after its configured snooze
    /// when no positive override is given. Other pending medicines are re-armed.
    #[instrument(skip(self))]
    pub async fn snooze(&self, id: &str, minutes: Option<u32>) -> Result<Medicine> {
        let _gate = self.gate.lock().await;
        let medicine = find(self.store.get_all().await?, id)?;
        if medicine.taken {
            return Err(ReminderError::NotPending(id.to_string()));
        }

        let minutes = minutes
            .filter(|minutes| *minutes > 0)
            .unwrap_or_else(|| medicine.snooze_minutes());
        let start_at = Duration::try_minutes(i64::from(minutes))
            .and_then(|delta| self.now().checked_add_signed(delta))
            .ok_or(ValidationError::OutOfRange)?;

        let medicine = self.rearm(medicine, Some(start_at)).await?;
        self.rearm_others(id).await?;
        info!(medicine = %id, minutes, %start_at, "reminder snoozed");
        Ok(medicine)
    }

    pub async fn take_all(&self) -> Result<Vec<Medicine>> {
        let pending = self.pending_ids().await?;
        let results = join_all(pending.iter().map(|id| self.take(id))).await;
        results.into_iter().collect()
    }

    pub async fn snooze_all(&self) -> Result<Vec<Medicine>> {
        let pending = self.pending_ids().await?;
        let results = join_all(pending.iter().map(|id| self.snooze(id, None))).await;
        results.into_iter().collect()
    }

    async fn pending_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .get_all()
            .await?
            .into_iter()
            .filter(Medicine::is_pending)
            .map(|medicine| medicine.id)
            .collect())
    }
}
