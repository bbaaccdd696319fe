use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};

/// Number of consecutive active days ending today, or ending yesterday when
/// today has no activity yet.
#[must_use]
pub fn current_streak(active_days: &[NaiveDate], today: NaiveDate) -> u32 {
    let days: BTreeSet<NaiveDate> = active_days.iter().copied().collect();

    let mut cursor = if days.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };

    let mut streak = 0_u32;
    while days.contains(&cursor) {
        streak = streak.saturating_add(1);
        cursor -= Duration::days(1);
    }
    streak
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn counts_consecutive_days_through_today() {
        assert_eq!(current_streak(&[d(10), d(9), d(8), d(5)], d(10)), 3);
    }

    #[test]
    fn yesterday_keeps_streak_alive() {
        assert_eq!(current_streak(&[d(9), d(8)], d(10)), 2);
    }

    #[test]
    fn gap_breaks_streak() {
        assert_eq!(current_streak(&[d(7)], d(10)), 0);
        assert_eq!(current_streak(&[], d(10)), 0);
    }
}
