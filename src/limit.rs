use std::num::NonZeroU32;
use std::time::Duration;

use crate::LimitError;

const SECOND: Duration = Duration::from_secs(1);
const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Configuration shared by every bucket built from it.
///
/// A limit credits `rate` tokens once per `refill` interval, never holding
/// more than `burst` tokens. Buckets start full, so `burst` is also the amount
/// of work that can be done at once before the rate kicks in.
///
/// # Examples
///
/// ```rust
/// use tollgate::Limit;
/// use std::num::NonZeroU32;
/// use std::time::Duration;
///
/// // 5 requests per second, bursts of up to 20
/// let limit = Limit::per_second_and_burst(
///     NonZeroU32::new(5).unwrap(),
///     NonZeroU32::new(20).unwrap()
/// );
/// assert_eq!(limit.refill(), Duration::from_secs(1));
///
/// // 1 request every 10 seconds, bursts of 3
/// let limit = Limit::new(
///     NonZeroU32::new(1).unwrap(),
///     NonZeroU32::new(3).unwrap(),
///     Duration::from_secs(10),
/// ).unwrap();
/// assert_eq!(limit.burst(), 3);
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "LimitConfig"))]
pub struct Limit {
    rate: NonZeroU32,
    burst: NonZeroU32,
    refill: Duration,
}

impl std::fmt::Debug for Limit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Limit(rate={}, burst={}, refill={:?})",
            self.rate, self.burst, self.refill
        )
    }
}

impl Limit {
    /// Creates a limit crediting `rate` tokens every `refill`, capped at `burst`.
    ///
    /// Fails with [`LimitError::ZeroRefill`] if `refill` is zero.
    pub const fn new(
        rate: NonZeroU32,
        burst: NonZeroU32,
        refill: Duration,
    ) -> Result<Self, LimitError> {
        if refill.is_zero() {
            return Err(LimitError::ZeroRefill);
        }
        Ok(Self {
            rate,
            burst,
            refill,
        })
    }

    /// `rate` tokens every second. The burst capacity equals the rate.
    ///
    /// ```rust
    /// use tollgate::Limit;
    /// use std::num::NonZeroU32;
    ///
    /// let limit = Limit::per_second(NonZeroU32::new(100).unwrap());
    /// assert_eq!(limit.rate(), 100);
    /// assert_eq!(limit.burst(), 100);
    /// ```
    pub const fn per_second(rate: NonZeroU32) -> Self {
        Self::per_second_and_burst(rate, rate)
    }

    /// `rate` tokens every second with a custom burst capacity.
    pub const fn per_second_and_burst(rate: NonZeroU32, burst: NonZeroU32) -> Self {
        Self {
            rate,
            burst,
            refill: SECOND,
        }
    }

    /// `rate` tokens every minute. The burst capacity equals the rate.
    ///
    /// Unlike a smoothly refilling bucket, the whole `rate` is credited at
    /// once when each minute elapses.
    pub const fn per_minute(rate: NonZeroU32) -> Self {
        Self {
            rate,
            burst: rate,
            refill: MINUTE,
        }
    }

    /// `rate` tokens every hour. The burst capacity equals the rate.
    pub const fn per_hour(rate: NonZeroU32) -> Self {
        Self {
            rate,
            burst: rate,
            refill: HOUR,
        }
    }

    /// Sets a custom burst capacity for this limit.
    pub const fn with_burst(mut self, burst: NonZeroU32) -> Self {
        self.burst = burst;
        self
    }

    /// Sets a custom refill interval for this limit.
    ///
    /// Fails with [`LimitError::ZeroRefill`] if `refill` is zero.
    pub const fn with_refill(self, refill: Duration) -> Result<Self, LimitError> {
        Self::new(self.rate, self.burst, refill)
    }

    /// Tokens credited per refill interval.
    pub const fn rate(&self) -> i64 {
        self.rate.get() as i64
    }

    /// Maximum number of tokens a bucket can hold.
    pub const fn burst(&self) -> i64 {
        self.burst.get() as i64
    }

    /// Interval between two refills.
    pub const fn refill(&self) -> Duration {
        self.refill
    }
}

/// The deserialisable form of a [`Limit`].
///
/// ```json
/// { "rate": 5, "burst": 20, "refill_millis": 1000 }
/// ```
///
/// `burst` defaults to `rate` when omitted.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, serde::Deserialize)]
pub struct LimitConfig {
    pub rate: u32,
    #[serde(default)]
    pub burst: Option<u32>,
    pub refill_millis: u64,
}

#[cfg(feature = "serde")]
impl TryFrom<LimitConfig> for Limit {
    type Error = LimitError;

    fn try_from(config: LimitConfig) -> Result<Self, Self::Error> {
        let rate = NonZeroU32::new(config.rate).ok_or(LimitError::ZeroRate)?;
        let burst = match config.burst {
            Some(burst) => NonZeroU32::new(burst).ok_or(LimitError::ZeroBurst)?,
            None => rate,
        };
        Limit::new(rate, burst, Duration::from_millis(config.refill_millis))
    }
}

#[cfg(test)]
mod tests {
    use nonzero_ext::nonzero;

    use super::*;

    #[test]
    fn builders() {
        let limit = Limit::per_minute(nonzero!(30u32)).with_burst(nonzero!(45u32));
        assert_eq!(30, limit.rate());
        assert_eq!(45, limit.burst());
        assert_eq!(Duration::from_secs(60), limit.refill());

        let limit = Limit::per_hour(nonzero!(3600u32));
        assert_eq!(3600, limit.burst());
        assert_eq!(Duration::from_secs(3600), limit.refill());

        let limit = limit.with_refill(Duration::from_millis(250)).unwrap();
        assert_eq!(Duration::from_millis(250), limit.refill());
        assert_eq!(3600, limit.rate());
    }

    #[test]
    fn zero_refill_is_rejected() {
        assert_eq!(
            Err(LimitError::ZeroRefill),
            Limit::new(nonzero!(1u32), nonzero!(1u32), Duration::ZERO)
        );
        assert_eq!(
            Err(LimitError::ZeroRefill),
            Limit::per_second(nonzero!(1u32)).with_refill(Duration::ZERO)
        );
    }

    #[test]
    fn debug_format() {
        let limit = Limit::per_second_and_burst(nonzero!(5u32), nonzero!(20u32));
        assert_eq!("Limit(rate=5, burst=20, refill=1s)", format!("{limit:?}"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialize() {
        let limit: Limit =
            serde_json::from_str(r#"{ "rate": 5, "burst": 20, "refill_millis": 1000 }"#).unwrap();
        assert_eq!(
            Limit::per_second_and_burst(nonzero!(5u32), nonzero!(20u32)),
            limit
        );

        let limit: Limit = serde_json::from_str(r#"{ "rate": 7, "refill_millis": 500 }"#).unwrap();
        assert_eq!(7, limit.burst());
        assert_eq!(Duration::from_millis(500), limit.refill());

        let err = serde_json::from_str::<Limit>(r#"{ "rate": 0, "refill_millis": 500 }"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("refill rate must be at least one token"), "{err}");

        let err = serde_json::from_str::<Limit>(r#"{ "rate": 1, "refill_millis": 0 }"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("refill interval"), "{err}");
    }
}
