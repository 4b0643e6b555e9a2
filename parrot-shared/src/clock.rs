//! Microsecond time source used by capture and replay.

use std::thread;
use std::time::{Duration, Instant};

/// Monotonic microsecond clock plus a blocking delay.
///
/// Capture and replay only ever talk to time through this trait, which is
/// what lets the tests run them against a virtual clock.
pub trait Clock {
    /// Microseconds since some fixed epoch. Never goes backwards.
    fn now_us(&self) -> u64;

    /// Blocks the caller for at least `us` microseconds.
    fn delay_us(&mut self, us: u64);
}

/// How much of a delay is left to a spin wait instead of `thread::sleep`.
///
/// The OS routinely oversleeps by tens to hundreds of microseconds, which is
/// enough to smear IR pulse timing. Sleeping short and spinning the tail
/// keeps the wakeup close to the deadline without burning a whole window of
/// CPU.
const SPIN_TAIL_US: u64 = 250;

/// Wall-clock implementation backed by [`Instant`].
pub struct StdClock {
    epoch: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        StdClock {
            epoch: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        StdClock::new()
    }
}

impl Clock for StdClock {
    fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    fn delay_us(&mut self, us: u64) {
        let deadline = self.now_us() + us;
        if us > SPIN_TAIL_US {
            thread::sleep(Duration::from_micros(us - SPIN_TAIL_US));
        }
        while self.now_us() < deadline {
            std::hint::spin_loop();
        }
    }
}
