//! Simulation and client tuning knobs.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. `SimConfig::from_json` parses and validates in one go.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::automaton::GridSnapshot;
use crate::error::ConfigError;

/// Backlog bounds for the step loop's pacing controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermarks {
    /// Backlog at or above which the loop slows down.
    pub high: usize,
    /// Backlog at or below which the loop speeds up again.
    pub low: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub unthrottled: Watermarks,
    pub throttled: Watermarks,
    /// Delay adjustment per step, in milliseconds.
    pub step_ms: u64,
    /// Delay the loop starts with and returns to on stop.
    pub default_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        PacingConfig {
            unthrottled: Watermarks { high: 100, low: 10 },
            throttled: Watermarks { high: 5, low: 1 },
            step_ms: 1,
            default_delay_ms: 0,
            max_delay_ms: 1_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Whether the display may skip frames (refreshed on a timer instead of per frame).
    pub skip_frames: bool,
    /// Period of the refresh loop, and of the apply loop when frames are not skipped.
    pub refresh_period_ms: u64,
    /// Upper bound for the apply loop's adaptive sleep.
    pub max_update_delay_ms: u64,
    /// Inbox backlog above which the apply loop shortens its sleep.
    pub speedup_threshold: usize,
    /// Inbox backlog above which the retrieval loop backs off while skipping frames.
    pub retrieval_backlog_limit: usize,
    /// Inbox backlog at which the retrieval loop backs off while showing every frame.
    pub unskipped_backlog_limit: usize,
    /// Sleep between polls when the service had nothing new.
    pub poll_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            skip_frames: true,
            refresh_period_ms: 100,
            max_update_delay_ms: 33,
            speedup_threshold: 2,
            retrieval_backlog_limit: 100,
            unskipped_backlog_limit: 5,
            poll_interval_ms: 1,
        }
    }
}

impl ClientConfig {
    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.refresh_period_ms)
    }

    pub fn max_update_delay(&self) -> Duration {
        Duration::from_millis(self.max_update_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub grid_width: i32,
    pub grid_height: i32,
    /// Rayon pool size for cell evaluation. 0 = available parallelism.
    pub worker_threads: usize,
    /// When false every generation is a full sweep.
    pub incremental: bool,
    pub pacing: PacingConfig,
    pub client: ClientConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            grid_width: 500,
            grid_height: 500,
            worker_threads: 0,
            incremental: true,
            pacing: PacingConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_width <= 0 || self.grid_height <= 0 {
            return Err(ConfigError::Invalid("grid dimensions must be positive"));
        }
        if GridSnapshot::cell_count(self.grid_width, self.grid_height).is_err() {
            return Err(ConfigError::Invalid("grid is too large"));
        }
        for marks in [self.pacing.unthrottled, self.pacing.throttled] {
            if marks.low > marks.high {
                return Err(ConfigError::Invalid(
                    "low watermark must not exceed high watermark",
                ));
            }
        }
        if self.pacing.default_delay_ms > self.pacing.max_delay_ms {
            return Err(ConfigError::Invalid(
                "default step delay must not exceed the maximum",
            ));
        }
        Ok(())
    }

    /// Resolved worker count for the evaluation pool.
    pub fn worker_count(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.worker_threads
        }
    }
}
