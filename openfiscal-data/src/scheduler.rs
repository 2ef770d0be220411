//! Timer loop driving recurring synchronisation.

use std::time::Duration;

use log::info;
use tokio::time::{Interval, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::coordinator::IngestionCoordinator;

const HOUR: Duration = Duration::from_secs(60 * 60);

/// Cadence of each source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Period between rate-table synchronisations.
    pub rates_every: Duration,
    /// Period between regime-table checks.
    pub regimes_every: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            rates_every: HOUR.saturating_mul(24 * 7),
            regimes_every: HOUR.saturating_mul(24),
        }
    }
}

impl Schedule {
    /// Override the rate-table period.
    #[must_use]
    pub const fn with_rates_every(mut self, period: Duration) -> Self {
        self.rates_every = period;
        self
    }

    /// Override the regime-table period.
    #[must_use]
    pub const fn with_regimes_every(mut self, period: Duration) -> Self {
        self.regimes_every = period;
        self
    }
}

/// Counts of pipeline runs started by a [`Scheduler`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Rate pipeline runs.
    pub rate_runs: usize,
    /// Regime pipeline runs.
    pub regime_runs: usize,
}

/// Runs each pipeline on its own interval until cancelled.
///
/// Both intervals tick immediately, so a freshly started scheduler
/// synchronises once at start-up. Ticks missed while a pipeline is still
/// running are skipped rather than replayed.
pub struct Scheduler<'a> {
    coordinator: IngestionCoordinator<'a>,
    schedule: Schedule,
}

impl<'a> Scheduler<'a> {
    /// Drive `coordinator` on `schedule`.
    #[must_use]
    pub const fn new(coordinator: IngestionCoordinator<'a>, schedule: Schedule) -> Self {
        Self {
            coordinator,
            schedule,
        }
    }

    /// Loop until `cancel` fires, returning how many runs were started.
    pub async fn run(&self, cancel: &CancellationToken) -> SchedulerStats {
        let mut rates = ticker(self.schedule.rates_every);
        let mut regimes = ticker(self.schedule.regimes_every);
        let mut stats = SchedulerStats::default();
        info!(
            "Scheduler started: rates every {:?}, regimes every {:?}",
            self.schedule.rates_every, self.schedule.regimes_every
        );
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = rates.tick() => {
                    stats.rate_runs = stats.rate_runs.saturating_add(1);
                    let outcome = self.coordinator.run_rates(cancel).await;
                    info!("Scheduled rate synchronisation: {outcome}");
                }
                _ = regimes.tick() => {
                    stats.regime_runs = stats.regime_runs.saturating_add(1);
                    let outcome = self.coordinator.run_regimes(cancel).await;
                    info!("Scheduled regime synchronisation: {outcome}");
                }
            }
        }
        info!("Scheduler stopped");
        stats
    }
}

fn ticker(period: Duration) -> Interval {
    let mut timer = interval(period.max(Duration::from_millis(1)));
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}
