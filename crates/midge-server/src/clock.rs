//! Host clock.

use std::time::Instant;

use midge_core::Clock;

/// Milliseconds since process start; the POSIX stand-in for an embedded
/// millisecond counter. Wraps after ~49 days, which entry timestamps
/// tolerate by being opaque.
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn timestamp(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }
}
