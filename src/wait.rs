//! Bounded polling with a fixed backoff
//!
//! A [`Poller`] is consulted after every failed check and decides whether
//! another check may run. It is bounded either by attempt count (link
//! handshake) or by elapsed time (storage enumeration).

use embedded_hal_async::delay::DelayNs;

/// Monotonic millisecond clock, counted from boot
pub trait Clock {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Attempts(u32),
    Deadline { started_ms: u64, timeout_ms: u64 },
}

#[derive(Debug, Clone, Copy)]
pub struct Poller {
    bound: Bound,
    interval_ms: u32,
    failures: u32,
}

impl Poller {
    /// Allow at most `max` checks in total
    pub fn attempts(max: u32, interval_ms: u32) -> Self {
        Self {
            bound: Bound::Attempts(max),
            interval_ms,
            failures: 0,
        }
    }

    /// Allow checks until `timeout_ms` has elapsed since `now_ms`
    pub fn timeout(timeout_ms: u64, interval_ms: u32, now_ms: u64) -> Self {
        Self {
            bound: Bound::Deadline {
                started_ms: now_ms,
                timeout_ms,
            },
            interval_ms,
            failures: 0,
        }
    }

    /// Failed checks recorded so far
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failed check. Sleeps for the interval and returns `true` if
    /// another check is allowed; returns `false` once the bound is spent.
    pub async fn retry<D: DelayNs, C: Clock>(&mut self, delay: &mut D, clock: &C) -> bool {
        self.failures += 1;
        match self.bound {
            Bound::Attempts(max) => {
                if self.failures >= max {
                    return false;
                }
                delay.delay_ms(self.interval_ms).await;
                true
            }
            Bound::Deadline {
                started_ms,
                timeout_ms,
            } => {
                delay.delay_ms(self.interval_ms).await;
                clock.now_ms().saturating_sub(started_ms) < timeout_ms
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeClock;
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn attempts_bound_skips_sleep_after_last_failure() {
        let clock = FakeClock::default();
        let mut delay = clock.delay();
        let mut poller = Poller::attempts(3, 600);

        assert!(block_on(poller.retry(&mut delay, &clock)));
        assert!(block_on(poller.retry(&mut delay, &clock)));
        assert!(!block_on(poller.retry(&mut delay, &clock)));
        assert_eq!(poller.failures(), 3);
        assert_eq!(clock.now_ms(), 1_200);
    }

    #[test]
    fn deadline_bound_stops_after_timeout() {
        let clock = FakeClock::default();
        clock.advance_ms(1_000);
        let mut delay = clock.delay();
        let mut poller = Poller::timeout(4_000, 150, clock.now_ms());

        let mut checks = 1;
        while block_on(poller.retry(&mut delay, &clock)) {
            checks += 1;
        }
        // 150ms apart within a 4s window: checks at 0, 150, ..., 3900
        assert_eq!(checks, 27);
        assert_eq!(clock.now_ms(), 1_000 + 27 * 150);
    }
}
