//! Background session cleanup
//!
//! A long-lived task that periodically deletes expired sessions from the
//! store. It never touches request handling: a sweep is one
//! `delete_expired` call, and a failed sweep is logged and retried on the
//! next tick.
//!
//! ```ignore
//! let handle = CleanupScheduler::new(repo, CleanupSchedule::from_config(&config.session.cleanup)).spawn();
//! // ... serve requests ...
//! handle.stop().await;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::CleanupConfig;
use crate::db::repositories::SessionRepository;

/// Shortest interval a configured schedule may use
pub const MIN_CLEANUP_INTERVAL: Duration = Duration::from_secs(1);

/// Timing of the cleanup scheduler, fixed for its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupSchedule {
    /// When false the scheduler exits as soon as it starts
    pub enabled: bool,
    /// Wait between successive sweeps
    pub interval: Duration,
    /// Wait before the first sweep
    pub initial_delay: Duration,
}

impl CleanupSchedule {
    /// Schedule for the `session.cleanup` configuration section.
    ///
    /// The interval is raised to at least [`MIN_CLEANUP_INTERVAL`].
    pub fn from_config(config: &CleanupConfig) -> Self {
        Self {
            enabled: config.enabled,
            interval: config.interval().max(MIN_CLEANUP_INTERVAL),
            initial_delay: config.initial_delay(),
        }
    }
}

/// Sweep counters, for observability only
#[derive(Debug, Default)]
pub struct CleanupStats {
    sweeps: AtomicU64,
    failures: AtomicU64,
    removed: AtomicU64,
}

impl CleanupStats {
    /// Sweeps attempted, failed ones included
    pub fn sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    /// Sweeps that ended in a store error
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Total sessions deleted across all sweeps
    pub fn removed(&self) -> u64 {
        self.removed.load(Ordering::Relaxed)
    }
}

/// Periodic expired-session sweeper
pub struct CleanupScheduler {
    session_repo: Arc<dyn SessionRepository>,
    schedule: CleanupSchedule,
    stats: Arc<CleanupStats>,
}

impl CleanupScheduler {
    /// Create a scheduler sweeping `session_repo`. Nothing runs until
    /// [`CleanupScheduler::spawn`] or [`CleanupScheduler::run`].
    pub fn new(session_repo: Arc<dyn SessionRepository>, schedule: CleanupSchedule) -> Self {
        Self {
            session_repo,
            schedule,
            stats: Arc::new(CleanupStats::default()),
        }
    }

    /// Counters shared with the running scheduler
    pub fn stats(&self) -> Arc<CleanupStats> {
        Arc::clone(&self.stats)
    }

    /// Run the scheduler on its own task.
    ///
    /// Dropping the returned handle detaches the task; it then keeps sweeping
    /// until the runtime shuts down.
    pub fn spawn(self) -> CleanupHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let stats = self.stats();
        let task = tokio::spawn(self.run(stop_rx));

        CleanupHandle {
            stop_tx,
            task,
            stats,
        }
    }

    /// Run the sweep loop until `stop` turns true.
    ///
    /// Waits wake immediately on stop. A sweep already in progress is always
    /// allowed to finish.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        if !self.schedule.enabled {
            tracing::info!("Session cleanup is disabled");
            return;
        }

        tracing::info!(
            "Session cleanup scheduled every {:?} (first run in {:?})",
            self.schedule.interval,
            self.schedule.initial_delay
        );

        if wait_or_stop(self.schedule.initial_delay, &mut stop).await {
            tracing::info!("Session cleanup stopped before first sweep");
            return;
        }

        loop {
            if *stop.borrow() {
                break;
            }

            self.sweep().await;

            if wait_or_stop(self.schedule.interval, &mut stop).await {
                break;
            }
        }

        tracing::info!(
            "Session cleanup stopped after {} sweep(s)",
            self.stats.sweeps()
        );
    }

    async fn sweep(&self) {
        self.stats.sweeps.fetch_add(1, Ordering::Relaxed);

        match self.session_repo.delete_expired().await {
            Ok(count) => {
                self.stats.removed.fetch_add(count, Ordering::Relaxed);
                if count > 0 {
                    tracing::info!("Session cleanup removed {} expired session(s)", count);
                } else {
                    tracing::debug!("Session cleanup: no expired sessions");
                }

                if tracing::enabled!(tracing::Level::DEBUG) {
                    match self.session_repo.count().await {
                        Ok(remaining) => tracing::debug!("Session store holds {} session(s)", remaining),
                        Err(e) => tracing::debug!("Failed to count sessions: {:#}", e),
                    }
                }
            }
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Session cleanup failed, retrying next interval: {:#}", e);
            }
        }
    }
}

/// Sleep for `duration` unless a stop is requested first.
///
/// Returns true if the scheduler should stop.
async fn wait_or_stop(duration: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    if *stop.borrow() {
        return true;
    }

    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = stop.changed() => match changed {
                Ok(()) if *stop.borrow() => return true,
                Ok(()) => continue,
                // Handle dropped: nobody can stop us any more
                Err(_) => {
                    (&mut sleep).await;
                    return false;
                }
            },
        }
    }
}

/// Handle to a spawned [`CleanupScheduler`]
pub struct CleanupHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    stats: Arc<CleanupStats>,
}

impl CleanupHandle {
    /// Sweep counters of the running scheduler
    pub fn stats(&self) -> &CleanupStats {
        &self.stats
    }

    /// Whether the scheduler task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the scheduler to stop and wait for it to exit.
    ///
    /// If a sweep is running, it completes first.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("Session cleanup task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::testing::InstrumentedRepository;
    use crate::models::Session;
    use tokio::time::{sleep, timeout, Instant};

    fn schedule(enabled: bool, initial_delay_ms: u64, interval_ms: u64) -> CleanupSchedule {
        CleanupSchedule {
            enabled,
            interval: Duration::from_millis(interval_ms),
            initial_delay: Duration::from_millis(initial_delay_ms),
        }
    }

    fn spawn(repo: &InstrumentedRepository, schedule: CleanupSchedule) -> CleanupHandle {
        CleanupScheduler::new(Arc::new(repo.clone()), schedule).spawn()
    }

    async fn stop_promptly(handle: CleanupHandle) {
        timeout(Duration::from_secs(2), handle.stop())
            .await
            .expect("scheduler did not stop");
    }

    #[test]
    fn test_schedule_from_config() {
        let config = CleanupConfig {
            enabled: false,
            interval_secs: 3600,
            initial_delay_secs: 15,
        };

        let schedule = CleanupSchedule::from_config(&config);

        assert!(!schedule.enabled);
        assert_eq!(schedule.interval, Duration::from_secs(3600));
        assert_eq!(schedule.initial_delay, Duration::from_secs(15));
    }

    #[test]
    fn test_schedule_from_config_never_busy_polls() {
        let config = CleanupConfig {
            enabled: true,
            interval_secs: 0,
            initial_delay_secs: 0,
        };

        let schedule = CleanupSchedule::from_config(&config);

        assert_eq!(schedule.interval, MIN_CLEANUP_INTERVAL);
        assert_eq!(schedule.initial_delay, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_zero_interval_config_sweeps_once_per_second() {
        let repo = InstrumentedRepository::new();
        let config = CleanupConfig {
            enabled: true,
            interval_secs: 0,
            initial_delay_secs: 0,
        };
        let handle = spawn(&repo, CleanupSchedule::from_config(&config));

        sleep(Duration::from_millis(300)).await;

        assert_eq!(repo.sweep_calls(), 1);
        stop_promptly(handle).await;
    }

    #[tokio::test]
    async fn test_disabled_scheduler_never_sweeps() {
        let repo = InstrumentedRepository::new();
        let handle = spawn(&repo, schedule(false, 0, 100));

        sleep(Duration::from_millis(250)).await;

        assert_eq!(repo.sweep_calls(), 0);
        assert!(handle.is_finished());
        stop_promptly(handle).await;
    }

    #[tokio::test]
    async fn test_enabled_scheduler_sweeps_after_initial_delay() {
        let repo = InstrumentedRepository::new();
        let handle = spawn(&repo, schedule(true, 50, 100));

        sleep(Duration::from_millis(300)).await;

        assert!(repo.sweep_calls() >= 1);
        assert!(handle.stats().sweeps() >= 1);
        assert_eq!(handle.stats().failures(), 0);
        stop_promptly(handle).await;
    }

    #[tokio::test]
    async fn test_no_sweep_before_initial_delay() {
        let repo = InstrumentedRepository::new();
        let handle = spawn(&repo, schedule(true, 500, 100));

        sleep(Duration::from_millis(100)).await;

        assert_eq!(repo.sweep_calls(), 0);
        stop_promptly(handle).await;
    }

    #[tokio::test]
    async fn test_failing_store_does_not_stop_scheduler() {
        let repo = InstrumentedRepository::failing();
        let handle = spawn(&repo, schedule(true, 10, 30));

        sleep(Duration::from_millis(300)).await;

        assert!(!handle.is_finished());
        assert!(repo.sweep_calls() > 1);
        assert_eq!(handle.stats().failures(), handle.stats().sweeps());
        stop_promptly(handle).await;
    }

    #[tokio::test]
    async fn test_scheduler_recovers_after_store_failure() {
        let repo = InstrumentedRepository::failing();
        repo.set_failing(false);
        repo.add(&Session::new(1, -1)).await.unwrap();
        repo.set_failing(true);

        let handle = spawn(&repo, schedule(true, 10, 30));
        sleep(Duration::from_millis(100)).await;
        assert!(handle.stats().failures() >= 1);

        repo.set_failing(false);
        sleep(Duration::from_millis(150)).await;

        assert_eq!(handle.stats().removed(), 1);
        assert_eq!(repo.count().await.unwrap(), 0);
        stop_promptly(handle).await;
    }

    #[tokio::test]
    async fn test_stop_during_initial_delay_prevents_sweeps() {
        let repo = InstrumentedRepository::new();
        let handle = spawn(&repo, schedule(true, 200, 100));

        let started = Instant::now();
        stop_promptly(handle).await;

        assert!(started.elapsed() < Duration::from_millis(150));
        sleep(Duration::from_millis(300)).await;
        assert_eq!(repo.sweep_calls(), 0);
    }

    #[tokio::test]
    async fn test_stop_wakes_interval_wait() {
        let repo = InstrumentedRepository::new();
        let handle = spawn(&repo, schedule(true, 0, 60 * 60 * 1000));

        sleep(Duration::from_millis(50)).await;
        assert_eq!(repo.sweep_calls(), 1);

        let started = Instant::now();
        stop_promptly(handle).await;
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(repo.sweep_calls(), 1);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_sessions() {
        let repo = InstrumentedRepository::new();
        let valid = Session::new(1, 30);
        repo.add(&valid).await.unwrap();
        repo.add(&Session::new(2, -1)).await.unwrap();
        repo.add(&Session::new(3, 0)).await.unwrap();

        let handle = spawn(&repo, schedule(true, 0, 60 * 60 * 1000));
        sleep(Duration::from_millis(50)).await;

        assert_eq!(handle.stats().removed(), 2);
        assert!(repo.exists(&valid.id).await.unwrap());
        stop_promptly(handle).await;
    }

    #[tokio::test]
    async fn test_run_with_external_stop_channel() {
        let repo = InstrumentedRepository::new();
        let scheduler = CleanupScheduler::new(Arc::new(repo.clone()), schedule(true, 0, 20));
        let stats = scheduler.stats();
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(scheduler.run(stop_rx));
        sleep(Duration::from_millis(100)).await;
        stop_tx.send(true).unwrap();
        timeout(Duration::from_secs(2), task)
            .await
            .expect("scheduler did not stop")
            .unwrap();

        let sweeps = stats.sweeps();
        assert!(sweeps >= 2);
        sleep(Duration::from_millis(60)).await;
        assert_eq!(stats.sweeps(), sweeps);
    }

    #[tokio::test]
    async fn test_dropped_handle_keeps_sweeping() {
        let repo = InstrumentedRepository::new();
        drop(spawn(&repo, schedule(true, 0, 20)));

        sleep(Duration::from_millis(100)).await;
        assert!(repo.sweep_calls() >= 2);
    }
}
