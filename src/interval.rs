//! Interval arithmetic shared by bucket refills.
//!
//! [`Limit`](crate::Limit) guarantees a non-zero refill interval for every
//! bucket. Both helpers still accept a zero `interval`: it counts no whole
//! intervals and places no boundary after `start`.

use std::time::Duration;

use crate::Timestamp;

/// Counts how many whole `interval`s fit between `start` and `end`.
///
/// The distance is taken as an absolute value so the order of the two
/// instants does not matter. Partial intervals are not counted, and a zero
/// `interval` counts as none.
pub fn interval_count(start: Timestamp, end: Timestamp, interval: Duration) -> u64 {
    if interval.is_zero() {
        return 0;
    }
    let elapsed = start.abs_diff(end).as_nanos();
    // elapsed fits in u64 nanos, so the quotient does too
    (elapsed / interval.as_nanos()) as u64
}

/// Returns the earliest instant `start + k * interval` (k >= 0) that is
/// strictly after `end`.
///
/// With a zero `interval` there is no such instant and `start` is returned.
pub fn next_after(start: Timestamp, end: Timestamp, interval: Duration) -> Timestamp {
    let candidate = start + intervals(interval_count(start, end, interval), interval);
    if candidate > end {
        candidate
    } else {
        candidate + interval
    }
}

/// `count * interval`, saturating at [`Duration::MAX`].
pub(crate) fn intervals(count: u64, interval: Duration) -> Duration {
    u32::try_from(count)
        .ok()
        .and_then(|count| interval.checked_mul(count))
        .unwrap_or_else(|| {
            let nanos = interval.as_nanos().saturating_mul(u128::from(count));
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT: Duration = Duration::from_secs(1);

    #[test]
    fn counts_whole_intervals() {
        let origin = Timestamp::from_secs(100);
        let half = Duration::from_millis(500);

        assert_eq!(0, interval_count(origin, origin, UNIT));
        assert_eq!(0, interval_count(origin, origin + half, UNIT));
        assert_eq!(3, interval_count(origin, origin + UNIT * 3, UNIT));
        assert_eq!(3, interval_count(origin, origin + UNIT * 3 + half, UNIT));
        // either order
        assert_eq!(3, interval_count(origin + UNIT * 3 + half, origin, UNIT));
    }

    #[test]
    fn next_boundary_after() {
        let origin = Timestamp::from_secs(100);
        let reset1_half = origin + Duration::from_millis(1_500);

        assert_eq!(origin + UNIT * 2, next_after(origin, reset1_half, UNIT));
        // a boundary equal to `end` is not strictly after it
        assert_eq!(origin + UNIT * 3, next_after(origin, origin + UNIT * 2, UNIT));
        assert_eq!(origin + UNIT, next_after(origin, origin, UNIT));
    }

    #[test]
    fn zero_interval_is_total() {
        let origin = Timestamp::from_secs(100);
        let later = origin + UNIT * 5;

        assert_eq!(0, interval_count(origin, later, Duration::ZERO));
        assert_eq!(0, interval_count(later, origin, Duration::ZERO));
        assert_eq!(0, interval_count(origin, origin, Duration::ZERO));
        assert_eq!(origin, next_after(origin, later, Duration::ZERO));
        assert_eq!(Duration::ZERO, intervals(7, Duration::ZERO));
    }

    #[test]
    fn intervals_saturate() {
        assert_eq!(Duration::from_secs(6), intervals(3, Duration::from_secs(2)));
        assert_eq!(
            Duration::from_nanos(u64::MAX),
            intervals(u64::MAX, Duration::from_secs(1))
        );
    }
}
