use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::ValidationError;
use crate::medicine::Medicine;
use crate::notifications::{NotificationDispatcher, NotificationId, NotificationRequest};

pub const DEFAULT_CYCLES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    Primary,
    Repeat(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedReminder {
    pub cycle: u32,
    pub kind: ReminderKind,
    pub at: NaiveDateTime,
}

impl PlannedReminder {
    fn request(&self, medicine: &Medicine) -> NotificationRequest {
        match self.kind {
            ReminderKind::Primary => NotificationRequest::primary(&medicine.name, self.at),
            ReminderKind::Repeat(ordinal) => {
                NotificationRequest::repeat(&medicine.name, ordinal, self.at)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleOutcome {
    pub armed: Vec<NotificationId>,
    pub planned: usize,
}

impl ScheduleOutcome {
    pub fn is_complete(&self) -> bool {
        self.armed.len() == self.planned
    }
}

// Today at the medicine's time, or tomorrow if that moment is not after `now`.
pub fn first_cycle_start(
    medicine: &Medicine,
    now: NaiveDateTime,
) -> Result<NaiveDateTime, ValidationError> {
    let today = now.date().and_time(medicine.time_of_day()?);
    if today > now {
        Ok(today)
    } else {
        today
            .checked_add_signed(Duration::days(1))
            .ok_or(ValidationError::OutOfRange)
    }
}

fn after_minutes(at: NaiveDateTime, minutes: i64) -> Result<NaiveDateTime, ValidationError> {
    Duration::try_minutes(minutes)
        .and_then(|delta| at.checked_add_signed(delta))
        .ok_or(ValidationError::OutOfRange)
}

/// Computes every reminder instant for `cycles` cycles, in arming order. Pure: the same
/// inputs always give the same plan. A bound of zero is treated as one.
pub fn plan_cycles(
    medicine: &Medicine,
    start_at: Option<NaiveDateTime>,
    cycles: u32,
    now: NaiveDateTime,
) -> Result<Vec<PlannedReminder>, ValidationError> {
    let first_start = first_cycle_start(medicine, now)?;
    let mut cycle_start = start_at.unwrap_or(first_start);
    let cycles = cycles.max(1);
    let mut plan = Vec::new();

    for cycle in 0..cycles {
        plan.push(PlannedReminder {
            cycle,
            kind: ReminderKind::Primary,
            at: cycle_start,
        });

        let mut last = cycle_start;
        if medicine.has_repeats() {
            let interval = i64::from(medicine.repeat_interval);
            for ordinal in 1..=medicine.max_repeats {
                let offset = interval
                    .checked_mul(i64::from(ordinal))
                    .ok_or(ValidationError::OutOfRange)?;
                last = after_minutes(cycle_start, offset)?;
                plan.push(PlannedReminder {
                    cycle,
                    kind: ReminderKind::Repeat(ordinal),
                    at: last,
                });
            }
        }

        if cycle + 1 < cycles {
            cycle_start = after_minutes(last, i64::from(medicine.snooze_minutes()))?;
        }
    }

    Ok(plan)
}

#[derive(Clone)]
pub struct ReminderScheduler {
    dispatcher: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
}

impl ReminderScheduler {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>, clock: Arc<dyn Clock>) -> Self {
        Self { dispatcher, clock }
    }

    pub fn dispatcher(&self) -> &Arc<dyn NotificationDispatcher> {
        &self.dispatcher
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    // Stops at the first dispatcher failure; nothing is retried or rolled back.
    pub async fn schedule(
        &self,
        medicine: &Medicine,
        start_at: Option<NaiveDateTime>,
        cycles: u32,
    ) -> Result<ScheduleOutcome, ValidationError> {
        let plan = plan_cycles(medicine, start_at, cycles, self.clock.now())?;
        let mut outcome = ScheduleOutcome {
            armed: Vec::with_capacity(plan.len()),
            planned: plan.len(),
        };

        for reminder in &plan {
            match self.dispatcher.schedule(reminder.request(medicine)).await {
                Ok(id) => {
                    debug!(medicine = %medicine.id, %id, at = %reminder.at, "armed reminder");
                    outcome.armed.push(id);
                }
                Err(err) => {
                    warn!(
                        medicine = %medicine.id,
                        %err,
                        armed = outcome.armed.len(),
                        planned = outcome.planned,
                        "stopped arming reminders"
                    );
                    break;
                }
            }
        }

        Ok(outcome)
    }
}
