//! Absolute attempt deadlines.
//!
//! A deadline is derived from the attempt's persisted `started_at`, never from
//! the moment a page was (re)loaded, so resuming an attempt cannot extend it.

use chrono::{DateTime, Duration, Utc};

/// Fixed end instant of a timed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started_at: DateTime<Utc>,
    limit: Duration,
}

impl Deadline {
    /// Returns `None` for untimed sets (`time_limit_minutes == None`).
    #[must_use]
    pub fn for_attempt(started_at: DateTime<Utc>, time_limit_minutes: Option<u32>) -> Option<Self> {
        time_limit_minutes.map(|minutes| Self {
            started_at,
            limit: Duration::minutes(i64::from(minutes)),
        })
    }

    /// `started_at + time_limit`.
    #[must_use]
    pub fn at(&self) -> DateTime<Utc> {
        self.started_at + self.limit
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn limit(&self) -> Duration {
        self.limit
    }

    #[must_use]
    pub fn limit_seconds(&self) -> u32 {
        u32::try_from(self.limit.num_seconds()).unwrap_or(u32::MAX)
    }

    /// Time left at `now`, never negative.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        let left = self.at().signed_duration_since(now);
        if left < Duration::zero() {
            Duration::zero()
        } else {
            left
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.at()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn untimed_sets_have_no_deadline() {
        assert!(Deadline::for_attempt(fixed_now(), None).is_none());
    }

    #[test]
    fn deadline_is_anchored_to_start_not_to_reload() {
        let started = fixed_now();
        let first = Deadline::for_attempt(started, Some(20)).unwrap();

        // A reload five minutes later recomputes from the same persisted start.
        let reload_now = started + Duration::minutes(5);
        let reloaded = Deadline::for_attempt(started, Some(20)).unwrap();

        assert_eq!(first.at(), reloaded.at());
        assert_eq!(reloaded.at(), started + Duration::milliseconds(20 * 60_000));
        assert_ne!(reloaded.at(), reload_now + Duration::minutes(20));
        assert_eq!(reloaded.remaining(reload_now), Duration::minutes(15));
    }

    #[test]
    fn remaining_clamps_at_zero() {
        let d = Deadline::for_attempt(fixed_now(), Some(1)).unwrap();
        let late = fixed_now() + Duration::minutes(3);
        assert_eq!(d.remaining(late), Duration::zero());
        assert!(d.is_expired(late));
        assert!(d.is_expired(d.at()));
        assert!(!d.is_expired(d.at() - Duration::milliseconds(1)));
        assert_eq!(d.limit_seconds(), 60);
    }
}
