//! Fixed-period host loop driving a [`Scheduler`] on a tokio runtime.
//!
//! The scheduler itself never blocks or spawns; this loop owns it and calls
//! [`Scheduler::tick`] once per period until told to stop.  Other tasks
//! reach the scheduler through a [`SchedulerHandle`] taken before the loop
//! starts.
//!
//! ```rust,no_run
//! use robocmd_core::Scheduler;
//! use robocmd_runtime::{RuntimeConfig, TickLoop};
//!
//! # async fn demo() -> Result<(), robocmd_core::SchedulerError> {
//! let config = RuntimeConfig::default();
//! let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
//! let mut tick_loop = TickLoop::from_config(Scheduler::new(), &config);
//! let handle = tick_loop.scheduler().handle();
//! # let _ = (handle, stop_tx);
//! let stats = tick_loop.run(stop_rx).await?;
//! println!("ran {} ticks", stats.ticks);
//! # Ok(())
//! # }
//! ```

use std::time::{Duration, Instant};

use robocmd_core::{Scheduler, SchedulerError, SchedulerHandle};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::RuntimeConfig;

/// Counters reported when [`TickLoop::run`] returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    /// Ticks whose work took longer than the period.
    pub overruns: u64,
}

pub struct TickLoop {
    scheduler: Scheduler,
    period: Duration,
    warn_on_overrun: bool,
    tick_limit: Option<u64>,
}

impl TickLoop {
    pub fn new(scheduler: Scheduler, period: Duration) -> Self {
        Self {
            scheduler,
            period: period.max(Duration::from_millis(1)),
            warn_on_overrun: true,
            tick_limit: None,
        }
    }

    pub fn from_config(scheduler: Scheduler, config: &RuntimeConfig) -> Self {
        let mut tick_loop = Self::new(scheduler, config.tick_period());
        tick_loop.warn_on_overrun = config.warn_on_overrun;
        tick_loop
    }

    /// Stop after `limit` ticks from the start of each [`run`](Self::run).
    pub fn with_tick_limit(mut self, limit: u64) -> Self {
        self.tick_limit = Some(limit);
        self
    }

    pub fn with_overrun_warnings(mut self, warn: bool) -> Self {
        self.warn_on_overrun = warn;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.scheduler.handle()
    }

    pub fn into_scheduler(self) -> Scheduler {
        self.scheduler
    }

    /// Tick the scheduler every period until `shutdown` reads `true`, its
    /// sender is dropped, or the tick limit is reached.
    ///
    /// Missed periods are skipped rather than replayed in a burst.
    ///
    /// # Errors
    ///
    /// Stops at the first tick that returns an error and hands it back.
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<LoopStats, SchedulerError> {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats = LoopStats::default();

        info!(period_ms = self.period.as_millis() as u64, "tick loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            if self.tick_limit.is_some_and(|limit| stats.ticks >= limit) {
                break;
            }

            tokio::select! {
                biased;

                // ── Shutdown ─────────────────────────────────────────────────
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }

                // ── Period elapsed ───────────────────────────────────────────
                _ = interval.tick() => {}
            }

            let started = Instant::now();
            if let Err(err) = self.scheduler.tick() {
                error!(error = %err, tick = self.scheduler.tick_count(), "tick failed");
                return Err(err);
            }
            stats.ticks += 1;

            let elapsed = started.elapsed();
            if elapsed > self.period {
                stats.overruns += 1;
                if self.warn_on_overrun {
                    warn!(
                        elapsed_us = elapsed.as_micros() as u64,
                        period_us = self.period.as_micros() as u64,
                        "tick overran its period"
                    );
                }
            }
        }

        info!(ticks = stats.ticks, overruns = stats.overruns, "tick loop stopped");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use robocmd_core::{Command, InstantCommand, Subsystem, SubsystemId};

    use super::*;

    fn fast_loop(scheduler: Scheduler) -> TickLoop {
        TickLoop::new(scheduler, Duration::from_millis(1)).with_overrun_warnings(false)
    }

    #[tokio::test]
    async fn stops_after_tick_limit() {
        let (_stop_tx, stop_rx) = watch::channel(false);
        let mut tick_loop = fast_loop(Scheduler::new()).with_tick_limit(5);
        let stats = tick_loop.run(stop_rx).await.unwrap();
        assert_eq!(stats.ticks, 5);
        assert_eq!(tick_loop.scheduler().tick_count(), 5);
    }

    #[tokio::test]
    async fn raised_shutdown_runs_no_ticks() {
        let (stop_tx, stop_rx) = watch::channel(false);
        stop_tx.send(true).unwrap();
        let mut tick_loop = fast_loop(Scheduler::new());
        let stats = tick_loop.run(stop_rx).await.unwrap();
        assert_eq!(stats, LoopStats::default());
    }

    #[tokio::test]
    async fn dropped_shutdown_sender_ends_loop() {
        let (stop_tx, stop_rx) = watch::channel(false);
        drop(stop_tx);
        let mut tick_loop = fast_loop(Scheduler::new());
        let stats = tick_loop.run(stop_rx).await.unwrap();
        assert_eq!(stats.ticks, 0);
    }

    #[tokio::test]
    async fn shutdown_from_another_task() {
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let _ = stop_tx.send(true);
        });
        let mut tick_loop = fast_loop(Scheduler::new());
        let stats = tick_loop.run(stop_rx).await.unwrap();
        assert!(stats.ticks > 0);
        assert_eq!(tick_loop.scheduler().tick_count(), stats.ticks);
    }

    #[tokio::test]
    async fn handle_starts_command_from_spawned_task() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let mut scheduler = Scheduler::new();
        let cmd = scheduler
            .add_command(InstantCommand::command("Fire", move || {
                flag.store(true, Ordering::SeqCst);
            }))
            .unwrap();

        let (_stop_tx, stop_rx) = watch::channel(false);
        let mut tick_loop = fast_loop(scheduler).with_tick_limit(10);
        let handle = tick_loop.handle();
        tokio::spawn(async move { handle.start(cmd) }).await.unwrap().unwrap();

        tick_loop.run(stop_rx).await.unwrap();
        assert!(fired.load(Ordering::SeqCst));
        assert!(!tick_loop.scheduler().is_running(cmd));
    }

    struct Sluggish(Arc<AtomicUsize>);

    impl Subsystem for Sluggish {
        fn periodic(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(3));
        }
    }

    #[tokio::test]
    async fn slow_ticks_count_as_overruns() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler.register_subsystem("Sluggish", Sluggish(calls.clone()));

        let (_stop_tx, stop_rx) = watch::channel(false);
        let mut tick_loop = fast_loop(scheduler).with_tick_limit(3);
        let stats = tick_loop.run(stop_rx).await.unwrap();
        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.overruns, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    struct BadDefault;

    impl Subsystem for BadDefault {
        fn init_default_command(&mut self, _id: SubsystemId) -> Option<Command> {
            // Does not require its own subsystem.
            Some(Command::new("Stray", InstantCommand::new()))
        }
    }

    #[tokio::test]
    async fn tick_error_stops_the_loop() {
        let mut scheduler = Scheduler::new();
        scheduler.register_subsystem("Bad", BadDefault);

        let (_stop_tx, stop_rx) = watch::channel(false);
        let mut tick_loop = fast_loop(scheduler).with_tick_limit(10);
        let err = tick_loop.run(stop_rx).await.unwrap_err();
        assert!(matches!(err, SchedulerError::DefaultMissingRequirement { .. }));
        assert_eq!(tick_loop.into_scheduler().tick_count(), 1);
    }

    #[test]
    fn config_sets_period_and_warnings() {
        let config = RuntimeConfig {
            tick_period_ms: 5,
            warn_on_overrun: false,
            ..RuntimeConfig::default()
        };
        let tick_loop = TickLoop::from_config(Scheduler::new(), &config);
        assert_eq!(tick_loop.period(), Duration::from_millis(5));
        assert!(!tick_loop.warn_on_overrun);
    }
}
