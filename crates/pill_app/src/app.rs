use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pill_core::{
    clock::{Clock, SystemClock},
    medicine::{Medicine, MedicineDraft},
    scheduler::DEFAULT_CYCLES,
    store::JsonFileStore,
    ReminderService,
};
use tracing::{debug, info};

use crate::outbox::FileDispatcher;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub(crate) data_dir: PathBuf,
    pub(crate) cycles: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("PILL_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(cycles) = std::env::var("PILL_CYCLES") {
            if let Ok(value) = cycles.trim().parse::<u32>() {
                if value > 0 {
                    config.cycles = value;
                }
            }
        }
        Ok(config)
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("medicines.json")
    }

    pub fn outbox_path(&self) -> PathBuf {
        self.data_dir.join("notifications.json")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("pill-data"),
            cycles: DEFAULT_CYCLES,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "pill_reminder",
    version,
    about = "Medicine reminders with repeat and snooze cycles"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Show medicines
    List,
    /// Add a medicine and arm its reminders
    Add {
        name: String,
        /// Time of day, HH:MM
        time: String,
        /// Minutes between repeat reminders
        #[arg(long)]
        interval: Option<u32>,
        /// Repeat reminders per cycle
        #[arg(long)]
        repeats: Option<u32>,
        /// Minutes before the next cycle starts
        #[arg(long)]
        snooze: Option<u32>,
    },
    /// Mark today's dose as taken
    Take { id: String },
    /// Mark today's dose as won't take
    Skip { id: String },
    /// Restart the reminder cycle later
    Snooze { id: String, minutes: Option<u32> },
    TakeAll,
    SnoozeAll,
    Remove { id: String },
    /// Show armed notifications
    Pending,
    /// Cancel every notification
    Clear,
}

pub fn build_service(config: &AppConfig) -> ReminderService {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    ReminderService::builder()
        .with_store(Arc::new(JsonFileStore::new(config.store_path())))
        .with_dispatcher(Arc::new(FileDispatcher::new(
            config.outbox_path(),
            clock.clone(),
        )))
        .with_clock(clock)
        .with_cycles(config.cycles)
        .build()
}

/// Runs one command. The daily reconciler always runs first.
pub async fn run(config: AppConfig, command: Command) -> Result<()> {
    let service = build_service(&config);
    execute(&service, command).await
}

pub async fn execute(service: &ReminderService, command: Command) -> Result<()> {
    let report = service
        .reconcile_daily()
        .await
        .context("daily reconciliation failed")?;
    if report.rolled_over {
        info!(day = %report.day, reset = report.reset.len(), "new day");
    }
    debug!(?command, "executing");

    match command {
        Command::List => {
            for medicine in service.medicines().await? {
                println!("{}", describe(&medicine));
            }
        }
        Command::Add {
            name,
            time,
            interval,
            repeats,
            snooze,
        } => {
            let draft = MedicineDraft {
                name,
                time,
                repeat_interval: interval,
                max_repeats: repeats,
                snooze_time: snooze,
            };
            let medicine = service
                .add_medicine(draft)
                .await
                .context("failed to save medicine")?;
            println!("added {}", describe(&medicine));
        }
        Command::Take { id } => {
            let medicine = service
                .take(&id)
                .await
                .context("failed to mark medicine as taken")?;
            println!("{} marked as taken", medicine.name);
        }
        Command::Skip { id } => {
            let medicine = service
                .wont_take(&id)
                .await
                .context("failed to mark medicine")?;
            println!("{} marked as won't take", medicine.name);
        }
        Command::Snooze { id, minutes } => {
            let medicine = service
                .snooze(&id, minutes)
                .await
                .context("failed to snooze medicine")?;
            let minutes = minutes
                .filter(|minutes| *minutes > 0)
                .unwrap_or_else(|| medicine.snooze_minutes());
            println!("{} snoozed for {minutes} minutes", medicine.name);
        }
        Command::TakeAll => {
            let taken = service
                .take_all()
                .await
                .context("failed to mark all medicines as taken")?;
            if taken.is_empty() {
                println!("no pending medicines to take");
            } else {
                println!("{} medicines marked as taken", taken.len());
            }
        }
        Command::SnoozeAll => {
            let snoozed = service
                .snooze_all()
                .await
                .context("failed to snooze all medicines")?;
            if snoozed.is_empty() {
                println!("no pending medicines to snooze");
            } else {
                println!("{} medicines snoozed", snoozed.len());
            }
        }
        Command::Remove { id } => {
            let medicine = service.medicine(&id).await?;
            service
                .remove_medicine(&id)
                .await
                .context("failed to remove medicine")?;
            println!("{} removed", medicine.name);
        }
        Command::Pending => {
            for armed in service.pending_notifications().await? {
                println!(
                    "{}  {}  {}",
                    armed.request.scheduled_for.format("%Y-%m-%d %H:%M"),
                    armed.id,
                    armed.request.body
                );
            }
        }
        Command::Clear => {
            service
                .clear_all_notifications()
                .await
                .context("failed to clear notifications")?;
            println!("all notifications cancelled");
        }
    }
    Ok(())
}

fn describe(medicine: &Medicine) -> String {
    let status = if medicine.taken { "Taken" } else { "Pending" };
    let mut line = format!(
        "{}  {}  {}  [{}]  snooze {} min",
        medicine.id,
        medicine.time,
        medicine.name,
        status,
        medicine.snooze_minutes()
    );
    if medicine.has_repeats() {
        line.push_str(&format!(
            "  repeats every {} min (max {})",
            medicine.repeat_interval, medicine.max_repeats
        ));
    }
    line
}
