//! Real-time driver — advances an [`EventHost`] clock with tokio.
//!
//! Uses `tokio::time::interval` so the loop sleeps between ticks. Each tick
//! advances the host by the wall time elapsed since the previous one, which
//! fires due timers and timed-out idle requests. The host is single-threaded,
//! so run this on a current-thread runtime or inside a `LocalSet`.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use crate::host::{EventHost, Host};

/// Drive `host` until `done` returns true. Returns the number of ticks.
pub async fn run_realtime<F>(host: &EventHost, tick: Duration, mut done: F) -> u64
where
    F: FnMut() -> bool,
{
    tracing::info!("⏰ Driver started (tick every {}ms)", tick.as_millis());

    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();
    let mut ticks = 0u64;

    loop {
        interval.tick().await;
        let now = Instant::now();
        host.advance(now.saturating_duration_since(last));
        last = now;
        ticks += 1;

        if done() {
            tracing::info!(
                "⏰ Driver stopped after {} ticks at t={}ms",
                ticks,
                host.now().as_millis()
            );
            return ticks;
        }
    }
}

/// Drive `host` for a fixed amount of wall time.
pub async fn run_for(host: &EventHost, tick: Duration, total: Duration) -> u64 {
    let deadline = Instant::now() + total;
    run_realtime(host, tick, move || Instant::now() >= deadline).await
}
