//! # PM-Counter Coverage Reporter
//!
//! On a fixed interval, snapshots the watch set (clearing it unless
//! configured otherwise), reads one attribute per cell from Network
//! Configuration and logs a single summary: how many watched cells had
//! counters in the window, followed by one row per cell.
//!
//! At most one tick runs at a time: a tick that finds the previous one still
//! running is skipped. A tick starting more than the misfire grace after its
//! scheduled time is skipped too, but still advances the window. Each window
//! ends exactly one interval after the previous one, independent of when the
//! tick that closed it actually ran.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{debug, info, warn};

use super::watch_set::WatchSetTracker;
use crate::platform::{get_attributes_for_ids, Attribute, AttributeApi};

/// Default extra time a late tick is still allowed to run in.
pub const MISFIRE_GRACE: Duration = Duration::from_secs(60);

/// Placeholder for attribute values that could not be read.
pub const UNKNOWN: &str = "UNKNOWN";

/// Report schedule and content settings.
#[derive(Debug, Clone, Copy)]
pub struct ReportSettings {
    /// Time between ticks.
    pub interval: Duration,
    /// Attribute read for every cell.
    pub attribute: Attribute,
    /// Clear the watch set after each snapshot.
    pub clear_data: bool,
    /// How late a tick may start before it is dropped.
    pub misfire_grace: Duration,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            attribute: Attribute::OperationalState,
            clear_data: true,
            misfire_grace: MISFIRE_GRACE,
        }
    }
}

/// What a tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The summary that was logged.
    Reported(String),
    /// The previous tick was still running.
    Busy,
    /// The tick started too late and was dropped.
    Misfired,
}

#[derive(Debug, Clone, Copy)]
struct ReportWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::minutes(15))
}

/// Builds and logs coverage reports, optionally on a schedule.
pub struct ReportGenerator {
    tracker: Arc<WatchSetTracker>,
    attributes: Arc<dyn AttributeApi>,
    settings: ReportSettings,
    window: Mutex<ReportWindow>,
    running: tokio::sync::Mutex<()>,
    scheduler: tokio::sync::Mutex<Option<JobScheduler>>,
}

impl ReportGenerator {
    /// The first window starts now and ends one interval later.
    pub fn new(
        tracker: Arc<WatchSetTracker>,
        attributes: Arc<dyn AttributeApi>,
        settings: ReportSettings,
    ) -> Self {
        let start = Utc::now();
        Self {
            tracker,
            attributes,
            settings,
            window: Mutex::new(ReportWindow {
                start,
                end: start + to_chrono(settings.interval),
            }),
            running: tokio::sync::Mutex::new(()),
            scheduler: tokio::sync::Mutex::new(None),
        }
    }

    /// Start and end of the current reporting window.
    pub fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let w = *self.window.lock().unwrap_or_else(PoisonError::into_inner);
        (w.start, w.end)
    }

    /// Closes the current window and opens the next one, which ends one
    /// interval after the current end. Intervals that have fully elapsed by
    /// `now` are skipped. Returns the new end.
    fn advance_window(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let step = to_chrono(self.settings.interval);
        let mut w = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = w.end + step;
        while next <= now && step > chrono::Duration::zero() {
            next += step;
        }
        w.start = w.end;
        w.end = next;
        next
    }

    /// Snapshots the watch set and renders one row per cell, returning the
    /// rows and the number of cells with counters.
    pub async fn report_rows(&self) -> (Vec<String>, usize) {
        let snapshot = self.tracker.snapshot_and_maybe_reset(self.settings.clear_data);
        let observed = snapshot.values().filter(|observed| **observed).count();

        let ids: Vec<String> = snapshot.keys().cloned().collect();
        let readings =
            get_attributes_for_ids(self.attributes.as_ref(), &ids, self.settings.attribute).await;
        let failed = readings.iter().filter(|reading| reading.error.is_some()).count();
        if failed > 0 {
            warn!(failed, "Attribute reads failed, reporting {UNKNOWN} for those cells");
        }

        let rows = readings
            .into_iter()
            .map(|reading| {
                let collected = snapshot.get(&reading.id).copied().unwrap_or(false);
                format!(
                    "fdn={}; {}={}; countersCollected={}",
                    reading.id,
                    reading.attribute,
                    reading.value.as_deref().unwrap_or(UNKNOWN),
                    collected
                )
            })
            .collect();
        (rows, observed)
    }

    /// Runs the tick that closes the current window, starting at `now`.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> TickOutcome {
        let Ok(_running) = self.running.try_lock() else {
            warn!("Previous report is still running, skipping this one");
            return TickOutcome::Busy;
        };

        let (start, scheduled) = self.window();
        if now - scheduled > to_chrono(self.settings.misfire_grace) {
            warn!(
                scheduled = %scheduled,
                "Report run missed its schedule by more than the grace time, skipping"
            );
            self.advance_window(now);
            return TickOutcome::Misfired;
        }

        let (rows, observed) = self.report_rows().await;
        let table: String = rows.iter().map(|row| format!("{row}\n")).collect();
        let summary = format!(
            "Collected PM counters for {} out of {} NRCellDUs between {} and {} (UTC):\n{}",
            observed,
            rows.len(),
            start.format("%H:%M"),
            scheduled.format("%H:%M"),
            table
        );
        info!("{summary}");

        let next = self.advance_window(now);
        info!("Next report at {} (UTC)", next.format("%H:%M"));
        TickOutcome::Reported(summary)
    }

    /// Starts ticking every `interval`.
    pub async fn start_schedule(self: &Arc<Self>) -> Result<(), JobSchedulerError> {
        debug!("Starting report logging schedule.");
        let scheduler = JobScheduler::new().await?;
        let interval = self.settings.interval;

        let generator = Arc::clone(self);
        let job = Job::new_repeated_async(interval, move |_uuid, _scheduler| {
            let generator = Arc::clone(&generator);
            Box::pin(async move {
                generator.run_tick(Utc::now()).await;
            })
        })?;
        scheduler.add(job).await?;

        let start = Utc::now();
        *self.window.lock().unwrap_or_else(PoisonError::into_inner) = ReportWindow {
            start,
            end: start + to_chrono(interval),
        };
        scheduler.start().await?;
        info!(
            "Report scheduler started - next report at {} (UTC)",
            self.window().1.format("%H:%M")
        );

        *self.scheduler.lock().await = Some(scheduler);
        Ok(())
    }

    /// Stops future ticks. A tick already running finishes.
    pub async fn stop_schedule(&self) {
        if let Some(mut scheduler) = self.scheduler.lock().await.take() {
            if let Err(e) = scheduler.shutdown().await {
                warn!(error = %e, "Report scheduler did not shut down cleanly");
            }
        }
    }
}
