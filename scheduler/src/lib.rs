//! Cadence-driven runner for the reconciliation jobs.
//!
//! Jobs only expose a "run one batch" entry point; this crate owns the
//! timing. Each registered job gets its own tokio task, so a slow batch in
//! one job never delays another.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use common::error::Res;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval, sleep};

/// A periodic batch worker. One invocation drives one batch to completion;
/// state lives in the store, never in the job.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run_once(&self) -> Res<()>;
}

#[derive(Debug, Clone, Copy)]
pub enum Cadence {
    /// Fixed interval between run starts.
    Every(Duration),
    /// Once per day at the given UTC hour.
    DailyAt { hour: u32, minute: u32 },
}

/// Owns the spawned job loops. Dropping the scheduler aborts nothing; keep
/// it alive for the lifetime of the process.
pub struct Scheduler {
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            handles: Vec::new(),
        }
    }

    pub fn register(&mut self, job: Arc<dyn Job>, cadence: Cadence) {
        let handle = tokio::spawn(async move {
            match cadence {
                Cadence::Every(period) => run_interval(job, period).await,
                Cadence::DailyAt { hour, minute } => run_daily(job, hour, minute).await,
            }
        });
        self.handles.push(handle);
    }

    pub fn job_count(&self) -> usize {
        self.handles.len()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_interval(job: Arc<dyn Job>, period: Duration) {
    let mut ticker = interval(period);
    loop {
        ticker.tick().await;
        run_and_log(&job).await;
    }
}

async fn run_daily(job: Arc<dyn Job>, hour: u32, minute: u32) {
    loop {
        let now = Utc::now();
        let next = next_daily_execution(now, hour, minute);
        let wait = next.signed_duration_since(now);
        if wait.num_seconds() > 0 {
            log::info!(
                "job {} scheduled for {} UTC",
                job.name(),
                next.format("%Y-%m-%d %H:%M:%S")
            );
            sleep(Duration::from_secs(wait.num_seconds() as u64)).await;
        }
        run_and_log(&job).await;
    }
}

async fn run_and_log(job: &Arc<dyn Job>) {
    log::info!("job {} starting", job.name());
    match job.run_once().await {
        Ok(()) => log::info!("job {} finished", job.name()),
        // an interrupted batch is safe: state-gated queries re-find the
        // remaining rows on the next run
        Err(e) => log::error!("job {} failed: {}", job.name(), e),
    }
}

/// Next occurrence of `hour:minute` UTC, today if still ahead, tomorrow
/// otherwise.
fn next_daily_execution(now: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
    let today = now
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .expect("valid daily execution time");
    let today_dt = Utc.from_utc_datetime(&today);

    if today_dt <= now {
        let tomorrow = (now.date_naive() + chrono::Duration::days(1))
            .and_hms_opt(hour, minute, 0)
            .expect("valid daily execution time");
        Utc.from_utc_datetime(&tomorrow)
    } else {
        today_dt
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn next_daily_execution_later_today() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let next = next_daily_execution(now, 15, 0);
        assert_eq!(next.hour(), 15);
        assert_eq!(next.day(), 1);
    }

    #[test]
    fn next_daily_execution_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 16, 30, 0).unwrap();
        let next = next_daily_execution(now, 15, 0);
        assert_eq!(next.hour(), 15);
        assert_eq!(next.day(), 2);
    }

    #[tokio::test]
    async fn registered_jobs_are_tracked() {
        struct Noop;

        #[async_trait]
        impl Job for Noop {
            fn name(&self) -> &'static str {
                "noop"
            }
            async fn run_once(&self) -> Res<()> {
                Ok(())
            }
        }

        let mut scheduler = Scheduler::new();
        scheduler.register(Arc::new(Noop), Cadence::Every(Duration::from_secs(3600)));
        assert_eq!(scheduler.job_count(), 1);
    }
}
