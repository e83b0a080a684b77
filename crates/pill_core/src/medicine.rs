use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::notifications::NotificationId;

pub const DEFAULT_SNOOZE_MINUTES: u32 = 10;
pub const NEW_MEDICINE_SNOOZE_MINUTES: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Medicine {
    pub id: String,
    pub name: String,
    pub time: String,
    #[serde(default)]
    pub repeat_interval: u32,
    #[serde(default)]
    pub max_repeats: u32,
    #[serde(default = "default_snooze")]
    pub snooze_time: u32,
    #[serde(default)]
    pub taken: bool,
    /// Notifications currently armed on behalf of this medicine, in arming order.
    #[serde(default)]
    pub armed_notifications: Vec<NotificationId>,
}

fn default_snooze() -> u32 {
    DEFAULT_SNOOZE_MINUTES
}

impl Medicine {
    pub fn time_of_day(&self) -> Result<NaiveTime, ValidationError> {
        parse_time_of_day(&self.time)
    }

    pub fn has_repeats(&self) -> bool {
        self.repeat_interval > 0 && self.max_repeats > 0
    }

    pub fn snooze_minutes(&self) -> u32 {
        if self.snooze_time == 0 {
            DEFAULT_SNOOZE_MINUTES
        } else {
            self.snooze_time
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.taken
    }
}

/// Parses `H:MM` or `HH:MM` in the range 00:00..=23:59.
pub fn parse_time_of_day(input: &str) -> Result<NaiveTime, ValidationError> {
    let invalid = || ValidationError::InvalidTime(input.to_string());
    let trimmed = input.trim();
    let (hours, minutes) = trimmed.split_once(':').ok_or_else(invalid)?;
    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !digits(hours) || hours.len() > 2 || !digits(minutes) || minutes.len() != 2 {
        return Err(invalid());
    }
    let hours: u32 = hours.parse().map_err(|_| invalid())?;
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hours, minutes, 0).ok_or_else(invalid)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MedicineDraft {
    pub name: String,
    pub time: String,
    pub repeat_interval: Option<u32>,
    pub max_repeats: Option<u32>,
    pub snooze_time: Option<u32>,
}

impl MedicineDraft {
    pub fn new(name: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            time: time.into(),
            ..Self::default()
        }
    }

    pub fn with_repeats(mut self, interval: u32, max_repeats: u32) -> Self {
        self.repeat_interval = Some(interval);
        self.max_repeats = Some(max_repeats);
        self
    }

    pub fn with_snooze(mut self, minutes: u32) -> Self {
        self.snooze_time = Some(minutes);
        self
    }

    pub fn validate(self) -> Result<Medicine, ValidationError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let time = parse_time_of_day(&self.time)?;
        let snooze_time = match self.snooze_time {
            Some(0) => return Err(ValidationError::InvalidSnooze),
            Some(minutes) => minutes,
            None => NEW_MEDICINE_SNOOZE_MINUTES,
        };
        Ok(Medicine {
            id: Uuid::new_v4().to_string(),
            name,
            time: time.format("%H:%M").to_string(),
            repeat_interval: self.repeat_interval.unwrap_or(0),
            max_repeats: self.max_repeats.unwrap_or(0),
            snooze_time,
            taken: false,
            armed_notifications: Vec::new(),
        })
    }
}
