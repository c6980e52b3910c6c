use crate::config::Schedule;
use async_trait::async_trait;
use log::{error, info};
use std::time::Duration;
use tokio::sync::watch;

/// One unit of scheduled work.
#[async_trait]
pub trait Job {
    async fn run(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Elapsed,
    Shutdown,
}

#[async_trait]
pub trait Sleeper {
    async fn sleep(&self, duration: Duration) -> Wake;
}

/// Sleeps on the tokio timer and wakes early once `true` is published on
/// the shutdown channel.
pub struct TokioSleeper {
    shutdown: watch::Receiver<bool>,
}

impl TokioSleeper {
    pub fn new(shutdown: watch::Receiver<bool>) -> Self {
        Self { shutdown }
    }
}

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) -> Wake {
        // a dropped sender disables the shutdown branch
        tokio::select! {
            () = tokio::time::sleep(duration) => Wake::Elapsed,
            true = stop_requested(self.shutdown.clone()) => Wake::Shutdown,
        }
    }
}

async fn stop_requested(mut shutdown: watch::Receiver<bool>) -> bool {
    shutdown.wait_for(|stop| *stop).await.is_ok()
}

/// Runs a job every `interval`, without drift correction: the next sleep
/// starts when the previous run finishes.
pub struct Scheduler<S> {
    schedule: Schedule,
    sleeper: S,
}

impl<S: Sleeper + Sync> Scheduler<S> {
    pub fn new(schedule: Schedule, sleeper: S) -> Self {
        Self { schedule, sleeper }
    }

    pub async fn run<J: Job + Sync + ?Sized>(&self, job: &J) {
        let interval = self.schedule.interval;
        info!(
            "running every {}{}",
            humantime_serde::re::humantime::format_duration(interval),
            if self.schedule.run_at_start {
                ", starting now"
            } else {
                ""
            }
        );

        if self.schedule.run_at_start {
            run_cycle(job).await;
        }
        loop {
            if let Ok(delta) = chrono::Duration::from_std(interval) {
                let next = chrono::Local::now() + delta;
                info!("next run at {}", next.format("%Y-%m-%d %H:%M:%S"));
            }
            if self.sleeper.sleep(interval).await == Wake::Shutdown {
                info!("scheduler stopped");
                return;
            }
            run_cycle(job).await;
        }
    }
}

/// A failed cycle is not retried; the next scheduled cycle is the retry.
async fn run_cycle<J: Job + Sync + ?Sized>(job: &J) {
    if let Err(e) = job.run().await {
        error!("cleanup cycle failed: {e:#}");
    }
}
