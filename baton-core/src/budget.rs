/*!
Execution budget arithmetic and the clock it runs against.
*/

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

/// Source of wall-clock time
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
///
/// Clones share the same time, so a test can keep one handle and give the
/// other to a relay.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward by `secs` seconds
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Outcome of a budget check that did not end the epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    /// No ceiling is configured
    Unlimited,
    /// At least the threshold remains; carries the remaining time
    Remaining(Duration),
    /// A hand-off was triggered; the epoch is over
    HandedOff,
}

/// Execution budget of one epoch, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    ceiling: Duration,
    threshold: Duration,
    epoch_start: DateTime<Utc>,
}

fn whole_seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

impl Budget {
    /// A budget of `ceiling_secs` (0 = unlimited) that forces a hand-off
    /// once less than `threshold_secs` remain
    pub fn new(ceiling_secs: u64, threshold_secs: u64, epoch_start: DateTime<Utc>) -> Self {
        Self {
            ceiling: whole_seconds(ceiling_secs),
            threshold: whole_seconds(threshold_secs),
            epoch_start,
        }
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn is_unlimited(&self) -> bool {
        self.ceiling <= Duration::zero()
    }

    /// Time spent in the epoch so far
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        now - self.epoch_start
    }

    /// Time left before the ceiling, or `None` if unlimited
    ///
    /// Negative once the ceiling has been overrun.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.is_unlimited() {
            return None;
        }
        let elapsed = self.elapsed(now);
        let remaining = self.ceiling.checked_sub(&elapsed).unwrap_or(
            if elapsed < Duration::zero() {
                Duration::MAX
            } else {
                Duration::MIN
            },
        );
        Some(remaining)
    }

    /// Whether less than the threshold remains
    pub fn must_hand_off(&self, now: DateTime<Utc>) -> bool {
        self.remaining(now)
            .is_some_and(|remaining| remaining < self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_hand_off_when_slack_below_threshold() {
        let budget = Budget::new(10, 5, start());

        assert!(budget.must_hand_off(start() + Duration::seconds(6)));
        assert!(!budget.must_hand_off(start() + Duration::seconds(4)));
    }

    #[test]
    fn test_exact_threshold_is_enough() {
        let budget = Budget::new(10, 5, start());
        let now = start() + Duration::seconds(5);

        assert_eq!(budget.remaining(now), Some(Duration::seconds(5)));
        assert!(!budget.must_hand_off(now));
    }

    #[test]
    fn test_zero_ceiling_is_unlimited() {
        let budget = Budget::new(0, 5, start());

        assert!(budget.is_unlimited());
        assert_eq!(budget.remaining(start() + Duration::days(365)), None);
        assert!(!budget.must_hand_off(start() + Duration::days(365)));
    }

    #[test]
    fn test_remaining_goes_negative_after_overrun() {
        let budget = Budget::new(10, 0, start());

        assert_eq!(
            budget.remaining(start() + Duration::seconds(15)),
            Some(Duration::seconds(-5))
        );
    }

    #[test]
    fn test_huge_ceiling_saturates() {
        let budget = Budget::new(u64::MAX, 5, start());

        assert!(!budget.is_unlimited());
        assert!(!budget.must_hand_off(start() + Duration::days(10_000)));
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(start());
        let handle = clock.clone();

        handle.advance_secs(30);

        assert_eq!(clock.now(), start() + Duration::seconds(30));
    }
}
