///! Scheduled task manager
///!
///! Runs the sietch updater on a fixed wall-clock grid
///! (e.g. every 15 minutes: xx:00, xx:15, xx:30, xx:45).

use super::sietch::SietchUpdater;
use chrono::{DateTime, Duration as ChronoDuration, SubsecRound, Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Upper bound for a single scheduled pass
const PASS_TIMEOUT: Duration = Duration::from_secs(300);

/// Configuration for scheduled tasks
#[derive(Debug, Clone)]
pub struct ScheduledTaskConfig {
    /// Interval between passes (in minutes)
    pub update_interval_minutes: u64,

    /// Perform one pass immediately on start
    pub perform_initial_update: bool,
}

impl Default for ScheduledTaskConfig {
    fn default() -> Self {
        Self {
            update_interval_minutes: 15,
            perform_initial_update: true,
        }
    }
}

/// Scheduled task manager
pub struct ScheduledTaskManager {
    config: ScheduledTaskConfig,
    updater: Arc<SietchUpdater>,
    task_handles: Vec<JoinHandle<()>>,
}

impl ScheduledTaskManager {
    pub fn new(config: ScheduledTaskConfig, updater: Arc<SietchUpdater>) -> Self {
        Self {
            config,
            updater,
            task_handles: Vec::new(),
        }
    }

    /// Start all scheduled tasks; a zero interval leaves the scheduler idle.
    pub fn start_all(&mut self) {
        if self.config.update_interval_minutes == 0 {
            tracing::info!("Scheduled scraping disabled (interval 0)");
            return;
        }

        let handle = self.start_update_task();
        self.task_handles.push(handle);

        tracing::info!(
            "Started {} scheduled tasks (scrape every {} min)",
            self.task_handles.len(),
            self.config.update_interval_minutes
        );
    }

    fn start_update_task(&self) -> JoinHandle<()> {
        let updater = self.updater.clone();
        let interval_minutes = self.config.update_interval_minutes;
        let perform_initial = self.config.perform_initial_update;

        tracing::info!(
            "Scheduling scrape task (interval: {} minutes, initial: {})",
            interval_minutes,
            perform_initial
        );

        tokio::spawn(async move {
            if perform_initial {
                tracing::info!("Performing initial scrape...");
                Self::run_update(&updater).await;
            }

            Self::update_loop(updater, interval_minutes).await;
        })
    }

    async fn update_loop(updater: Arc<SietchUpdater>, interval_minutes: u64) {
        loop {
            let now = Utc::now();
            let next_trigger = Self::calculate_next_update_time(now, interval_minutes);
            let sleep_duration = (next_trigger - now)
                .to_std()
                .unwrap_or(Duration::from_secs(60));

            tracing::info!(
                "Next scrape at: {} (in {:.1} min)",
                next_trigger.format("%Y-%m-%d %H:%M:%S UTC"),
                sleep_duration.as_secs_f64() / 60.0
            );

            tokio::time::sleep(sleep_duration).await;
            Self::run_update(&updater).await;
        }
    }

    /// Next multiple of `interval_minutes` counted from midnight UTC.
    fn calculate_next_update_time(now: DateTime<Utc>, interval_minutes: u64) -> DateTime<Utc> {
        let interval_secs = interval_minutes.max(1) as i64 * 60;
        let now = now.trunc_subsecs(0);
        let since_midnight = i64::from(now.num_seconds_from_midnight());
        let next = (since_midnight / interval_secs + 1) * interval_secs;

        now + ChronoDuration::seconds(next - since_midnight)
    }

    async fn run_update(updater: &Arc<SietchUpdater>) {
        match tokio::time::timeout(PASS_TIMEOUT, updater.update()).await {
            Ok(Ok(result)) => tracing::info!(
                "Scheduled scrape completed: {} servers at {}",
                result.servers.len(),
                result.observed_at
            ),
            Ok(Err(e)) => tracing::error!("Scheduled scrape failed: {}", e),
            Err(_) => tracing::error!(
                "Scheduled scrape timed out after {} seconds",
                PASS_TIMEOUT.as_secs()
            ),
        }
    }

    /// Gracefully shutdown all tasks
    pub fn shutdown(self) {
        tracing::info!("Shutting down scheduled task manager...");

        for handle in self.task_handles {
            handle.abort();
        }

        tracing::info!("All scheduled tasks stopped");
    }
}
