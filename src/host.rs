//! Host loop driving the helper from the daemon
//!
//! The simulated service only moves forward when advanced, and the helper
//! only reaps when `idle()` is called. This loop does both on a fixed tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::audio::SimulatedSoundService;
use crate::helper::SoundHelper;

pub type SharedHelper = Arc<Mutex<SoundHelper<SimulatedSoundService>>>;

/// Advance the service clock and run `idle()` whenever the helper asks for
/// it. Runs until the task is dropped.
pub async fn run_host_loop(helper: SharedHelper, interval: Duration) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = Instant::now();

    loop {
        ticker.tick().await;
        let now = Instant::now();
        let elapsed = now - last;
        last = now;

        let mut guard = helper.lock().await;
        guard.service_mut().advance(elapsed);
        if guard.needs_idle() {
            let report = guard.idle();
            debug!("Host loop reaped: {:?}", report);
        }
    }
}
