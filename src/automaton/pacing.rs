//! Backlog feedback controller for the step loop.
//!
//! The only input is the frame backlog (and whether the consumer asked for
//! throttling); the only output is how long to wait before the next step.

use std::time::Duration;

use crate::config::{PacingConfig, Watermarks};

#[derive(Clone, Debug)]
pub struct PacingController {
    config: PacingConfig,
    throttled: bool,
    delay_ms: u64,
}

impl PacingController {
    pub fn new(config: PacingConfig) -> Self {
        let delay_ms = config.default_delay_ms;
        PacingController {
            config,
            throttled: false,
            delay_ms,
        }
    }

    pub fn set_throttled(&mut self, throttled: bool) {
        self.throttled = throttled;
    }

    pub fn is_throttled(&self) -> bool {
        self.throttled
    }

    fn watermarks(&self) -> Watermarks {
        if self.throttled {
            self.config.throttled
        } else {
            self.config.unthrottled
        }
    }

    /// Feed the current backlog, get the delay before the next step.
    pub fn adjust(&mut self, backlog: usize) -> Duration {
        let marks = self.watermarks();
        if backlog >= marks.high {
            self.delay_ms = (self.delay_ms + self.config.step_ms).min(self.config.max_delay_ms);
        } else if backlog <= marks.low {
            self.delay_ms = self.delay_ms.saturating_sub(self.config.step_ms);
        }
        self.delay()
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Back to the default delay, unthrottled.
    pub fn reset(&mut self) {
        self.delay_ms = self.config.default_delay_ms;
        self.throttled = false;
    }
}
