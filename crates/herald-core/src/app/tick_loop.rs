//! TickLoop - 一定間隔で dispatch サイクルを起動する
//!
//! - 既定では分の境界に合わせて 60 秒ごとに発火
//! - サイクル同士の排他はしない（前のサイクルが終わっていなくても次を起動）
//! - `shutdown_and_join()` は新しいサイクルの起動を止め、実行中のサイクルを待つ

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Timelike, Utc};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::dispatcher::Dispatcher;
use super::report::CycleReport;
use crate::domain::{Bucket, floor_to_minute_utc};

const MAX_CLOCK_SKEW_SECS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickConfig {
    pub interval: Duration,
    /// Delay the first tick to the next minute boundary of the dispatcher's clock.
    pub align_to_minute: bool,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            align_to_minute: true,
        }
    }
}

/// Tick loop handle.
/// - `shutdown_tx` を drop するとループが止まる
/// - `shutdown_and_join()` で実行中サイクルの終了まで待てる
pub struct TickLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl TickLoop {
    pub fn spawn(dispatcher: Arc<Dispatcher>, config: TickConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(tick_loop(dispatcher, config, shutdown_rx));
        Self { shutdown_tx, join }
    }

    /// Stops starting new cycles. In-flight cycles keep running.
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(e) = self.join.await {
            error!(error = %e, "tick loop task failed");
        }
    }
}

/// Time left until the next whole minute, zero when `now` sits on one.
pub fn delay_to_next_minute(now: DateTime<Utc>) -> Duration {
    let into_minute =
        Duration::from_secs(u64::from(now.second())) + Duration::from_nanos(u64::from(now.nanosecond()));
    if into_minute.is_zero() {
        Duration::ZERO
    } else {
        Duration::from_secs(60).saturating_sub(into_minute)
    }
}

/// Maps scheduled tick instants onto wall-clock minutes.
///
/// A tick's bucket comes from when it was scheduled to fire, not from the
/// clock reading when the cycle starts. A tick that fires a few
/// milliseconds before the wall-clock minute still sweeps that minute.
struct TickSchedule {
    start: Instant,
    first_wall: DateTime<Utc>,
}

impl TickSchedule {
    fn new(start: Instant, now: DateTime<Utc>, first: Duration) -> Self {
        let first_wall = TimeDelta::from_std(first)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now);
        Self { start, first_wall }
    }

    fn wall_time(&self, tick: Instant) -> DateTime<Utc> {
        TimeDelta::from_std(tick.saturating_duration_since(self.start))
            .ok()
            .and_then(|d| self.first_wall.checked_add_signed(d))
            .unwrap_or(self.first_wall)
    }

    fn bucket(&self, tick: Instant) -> Bucket {
        floor_to_minute_utc(self.wall_time(tick))
    }
}

async fn tick_loop(
    dispatcher: Arc<Dispatcher>,
    config: TickConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let now = dispatcher.clock().now();
    let first = if config.align_to_minute {
        delay_to_next_minute(now)
    } else {
        Duration::ZERO
    };
    let start = Instant::now() + first;
    let schedule = TickSchedule::new(start, now, first);
    let mut ticker = tokio::time::interval_at(start, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(first_tick_in = ?first, interval = ?config.interval, "tick loop started");

    let mut cycles: JoinSet<CycleReport> = JoinSet::new();
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            tick = ticker.tick() => {
                let scheduled = schedule.wall_time(tick);
                let skew = dispatcher.clock().now().signed_duration_since(scheduled);
                if skew.num_seconds().abs() >= MAX_CLOCK_SKEW_SECS {
                    warn!(skew_ms = skew.num_milliseconds(), "wall clock drifted from the tick schedule");
                }
                let bucket = schedule.bucket(tick);
                let d = Arc::clone(&dispatcher);
                cycles.spawn(async move { d.run_cycle_for(bucket).await });
                debug!(%bucket, in_flight = cycles.len(), "cycle started");
            }
            Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                reap(joined);
            }
        }
    }

    info!(in_flight = cycles.len(), "tick loop stopping; waiting for in-flight cycles");
    while let Some(joined) = cycles.join_next().await {
        reap(joined);
    }
    info!("tick loop stopped");
}

fn reap(joined: Result<CycleReport, tokio::task::JoinError>) {
    match joined {
        Ok(report) => debug!(
            bucket = %report.bucket,
            discovered = report.counts.discovered,
            query_failed = report.query_failed,
            "cycle reaped"
        ),
        Err(e) => error!(error = %e, "dispatch cycle panicked"),
    }
}
