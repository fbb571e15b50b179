//! Time source for polling loops
//!
//! Every busy-wait in this crate goes through a [`Clock`] so that tests can
//! simulate elapsed time without really sleeping.

use std::time::Instant;

use crate::os_specific;

pub trait Clock {
    /// Monotonic time in microseconds since an arbitrary origin
    fn now_us(&self) -> u64;
    /// Block for (at least) the given number of microseconds
    fn sleep_us(&self, micros: u64);
}

/// Wall clock backed by [`Instant`] and a real thread sleep
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    fn sleep_us(&self, micros: u64) {
        os_specific::sleep(micros)
    }
}

/// Outcome of [`poll_until`] when the condition never became true
#[derive(Debug, PartialEq, Eq)]
pub struct PollTimeout {
    pub waited_us: u64,
}

/// Poll `done` every `interval_us` until it returns true or `timeout_us` elapsed
///
/// The condition is always evaluated at least once, and once more after the
/// deadline passed, so a condition that becomes true during the last sleep is
/// not reported as a timeout.
pub fn poll_until<E, F>(
    clock: &dyn Clock,
    timeout_us: u64,
    interval_us: u64,
    mut done: F,
) -> Result<Result<(), PollTimeout>, E>
where
    F: FnMut() -> Result<bool, E>,
{
    let start = clock.now_us();
    loop {
        if done()? {
            return Ok(Ok(()));
        }
        let waited_us = clock.now_us().saturating_sub(start);
        if waited_us >= timeout_us {
            return Ok(Err(PollTimeout { waited_us }));
        }
        clock.sleep_us(interval_us.min(timeout_us - waited_us).max(1));
    }
}
