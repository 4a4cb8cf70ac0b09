use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Output slots allocated when `channels` is zero.
pub const DEFAULT_CHANNELS: usize = 4;

/// Configuration for a [`SoundHelper`](super::SoundHelper)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperConfig {
    /// Number of output slots (0 = default of 4)
    pub channels: usize,

    /// How long `shutdown` waits for outstanding sessions to drain
    pub shutdown_timeout_ms: u64,

    /// Host loop tick used by the daemon
    pub idle_interval_ms: u64,

    /// Pause sampled sounds by zeroing their playback rate when the channel
    /// reports one, instead of pausing the command queue
    pub rate_pause: bool,
}

impl HelperConfig {
    pub fn slot_count(&self) -> usize {
        if self.channels == 0 {
            DEFAULT_CHANNELS
        } else {
            self.channels
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms.max(1))
    }
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            channels: DEFAULT_CHANNELS,
            shutdown_timeout_ms: 1000,
            idle_interval_ms: 10,
            rate_pause: true,
        }
    }
}
