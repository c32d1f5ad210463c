use std::fmt::{Debug, Display};
use std::ops::Add;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// An instant measured in nanoseconds since the origin of the clock that
/// produced it.
///
/// Timestamps from different clocks are not comparable unless the clocks share
/// an origin (clones of the same [`StdClock`] do).
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The clock origin.
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Converts a duration since the clock origin, saturating at `u64::MAX`
    /// nanoseconds (roughly 584 years).
    pub fn from_duration(since_origin: Duration) -> Self {
        Self(duration_to_nanos(since_origin))
    }

    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Time elapsed since the clock origin.
    pub const fn as_duration(&self) -> Duration {
        Duration::from_nanos(self.0)
    }

    /// The absolute distance between two instants, regardless of order.
    pub const fn abs_diff(self, other: Timestamp) -> Duration {
        Duration::from_nanos(self.0.abs_diff(other.0))
    }

    pub fn saturating_add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(duration_to_nanos(rhs)))
    }
}

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl From<Duration> for Timestamp {
    fn from(since_origin: Duration) -> Self {
        Self::from_duration(since_origin)
    }
}

impl From<Timestamp> for Duration {
    fn from(ts: Timestamp) -> Duration {
        ts.as_duration()
    }
}

impl Debug for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Timestamp({:?})", self.as_duration())
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.as_duration(), f)
    }
}

/// Trait for monotonic clock implementations used by buckets and registries.
///
/// Implementations must provide monotonic time that never goes backwards. A
/// bucket relies on this when it reconciles refills: a timestamp earlier than
/// the previous one produces an incorrect refill credit.
pub trait Clock {
    /// Returns the current time since an arbitrary, fixed origin.
    fn now(&self) -> Timestamp;
}

/// Standard clock implementation using [`std::time::Instant`].
///
/// The origin is captured at construction. Clones share the origin, so a
/// registry can hand copies of its clock to every bucket it creates.
///
/// # Examples
///
/// ```rust
/// use tollgate::{Bucket, Limit, StdClock};
/// use std::num::NonZeroU32;
///
/// let limit = Limit::per_second(NonZeroU32::new(100).unwrap());
/// let clock = StdClock::default();
/// let bucket = Bucket::with_clock(limit, clock);
/// assert!(bucket.draw(1));
/// ```
#[derive(Clone)]
pub struct StdClock {
    origin: std::time::Instant,
}

impl Default for StdClock {
    fn default() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

impl Clock for StdClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_duration(self.origin.elapsed())
    }
}

/// High-precision clock implementation using the `quanta` crate.
///
/// Requires the "quanta" feature to be enabled.
#[cfg(feature = "quanta")]
#[derive(Clone)]
pub struct QuantaClock {
    origin: quanta::Instant,
}

#[cfg(feature = "quanta")]
impl Default for QuantaClock {
    fn default() -> Self {
        Self::new(quanta::Clock::new())
    }
}

#[cfg(feature = "quanta")]
impl QuantaClock {
    /// Creates a new `QuantaClock` from a `quanta::Clock` instance.
    pub fn new(clock: quanta::Clock) -> Self {
        let origin = clock.now();
        Self { origin }
    }
}

#[cfg(feature = "quanta")]
impl Clock for QuantaClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_duration(self.origin.elapsed())
    }
}

/// Tokio-compatible clock implementation using [`tokio::time::Instant`].
///
/// Follows tokio's paused test clock, which makes it handy for driving bucket
/// refills from `tokio::time::advance`. Requires the "tokio" feature.
#[cfg(feature = "tokio")]
#[derive(Clone)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

#[cfg(feature = "tokio")]
impl Default for TokioClock {
    fn default() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

#[cfg(feature = "tokio")]
impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_duration(self.origin.elapsed())
    }
}

/// High-performance clock using quanta's coarse timing.
///
/// Reads are cheaper than [`StdClock`] but only as fresh as quanta's upkeep
/// thread makes them. Requires the "quanta" feature to be enabled.
#[cfg(feature = "quanta")]
#[derive(Clone)]
pub struct FastClock {
    clock: quanta::Clock,
    origin: quanta::Instant,
}

#[cfg(feature = "quanta")]
impl Default for FastClock {
    fn default() -> Self {
        Self::new(quanta::Clock::new())
    }
}

#[cfg(feature = "quanta")]
impl FastClock {
    /// Creates a new `FastClock` from a `quanta::Clock` instance.
    ///
    /// **Important**: Ensure the clock's upkeep thread is running, otherwise
    /// buckets will not observe time passing and never refill.
    pub fn new(clock: quanta::Clock) -> Self {
        let origin = clock.recent();
        Self { clock, origin }
    }
}

#[cfg(feature = "quanta")]
impl Clock for FastClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_duration(self.clock.recent().saturating_duration_since(self.origin))
    }
}

/// Manual clock implementation for testing and simulation.
///
/// Time only moves when told to. It is thread-safe and can be shared across
/// threads behind an [`Arc`].
///
/// # Examples
///
/// ```rust
/// use tollgate::{Bucket, Limit, ManualClock};
/// use std::num::NonZeroU32;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let limit = Limit::per_second_and_burst(
///     NonZeroU32::new(5).unwrap(),
///     NonZeroU32::new(10).unwrap(),
/// );
/// let clock = Arc::new(ManualClock::default());
/// let bucket = Bucket::with_clock(limit, Arc::clone(&clock));
///
/// assert!(bucket.draw(10));
/// assert!(!bucket.can_draw(1));
///
/// // one refill interval later, `rate` tokens are back
/// clock.advance(Duration::from_secs(1));
/// assert_eq!(5, bucket.tokens());
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// Creates a new manual clock starting at the specified time.
    pub fn new(now: Timestamp) -> Self {
        Self {
            nanos: AtomicU64::new(now.as_nanos()),
        }
    }

    /// Sets the current time to the specified value.
    pub fn set(&self, now: Timestamp) {
        self.nanos.store(now.as_nanos(), Ordering::Release);
    }

    /// Advances the current time by the specified duration.
    pub fn advance(&self, delta: Duration) {
        let delta = duration_to_nanos(delta);
        // fetch_update never fails with a closure that always returns Some
        let _ = self
            .nanos
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |nanos| {
                Some(nanos.saturating_add(delta))
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.nanos.load(Ordering::Acquire))
    }
}

impl Clock for &ManualClock {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

impl Clock for Arc<ManualClock> {
    fn now(&self) -> Timestamp {
        self.as_ref().now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_arithmetic() {
        let t = Timestamp::from_secs(2);
        assert_eq!(Timestamp::from_millis(2_500), t + Duration::from_millis(500));
        assert_eq!(Duration::from_secs(1), t.abs_diff(Timestamp::from_secs(3)));
        assert_eq!(Duration::from_secs(1), Timestamp::from_secs(3).abs_diff(t));
        assert_eq!(
            Timestamp::from_nanos(u64::MAX),
            Timestamp::from_nanos(u64::MAX - 1) + Duration::from_secs(1)
        );
    }

    #[test]
    fn display_timestamp() {
        assert_eq!("1.5s", Timestamp::from_millis(1_500).to_string());
    }

    #[test]
    fn manual_clock() {
        let clock = ManualClock::default();
        assert_eq!(Timestamp::ZERO, clock.now());
        clock.advance(Duration::from_millis(250));
        assert_eq!(Timestamp::from_millis(250), clock.now());
        clock.set(Timestamp::from_secs(10));
        assert_eq!(Timestamp::from_secs(10), (&clock).now());
    }

    #[test]
    fn std_clock_clones_share_origin() {
        let clock = StdClock::default();
        let copy = clock.clone();
        let a = clock.now();
        let b = copy.now();
        assert!(b >= a);
    }

    #[cfg(feature = "tokio")]
    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_paused_time() {
        let clock = TokioClock::default();
        assert_eq!(Timestamp::ZERO, clock.now());
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(Timestamp::from_secs(3), clock.now());
    }
}
