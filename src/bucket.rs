use std::fmt::{Debug, Formatter};

use likely_stable::unlikely;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::interval::{interval_count, intervals, next_after};
use crate::{Clock, Limit, StdClock, Timestamp};

/// A thread-safe token bucket that refills in whole intervals.
///
/// The bucket starts full, holding `burst` tokens. Every time a refill
/// interval elapses, `rate` tokens are credited, up to `burst`. Refills are not
/// driven by a timer. Each operation first works out how many intervals passed
/// since the last one and credits them, so an idle bucket costs nothing.
///
/// Every operation comes in two forms: one reading the bucket's clock, and an
/// `*_at` form taking an explicit timestamp. The timestamps passed to a bucket
/// must not go backwards from one call to the next. Out-of-order timestamps are
/// not detected, they simply yield a wrong refill credit.
///
/// # Type Parameters
///
/// - `C`: Clock implementation (default: [`StdClock`])
///
/// # Examples
///
/// ```rust
/// use tollgate::{Bucket, Limit, Timestamp};
/// use std::num::NonZeroU32;
///
/// let limit = Limit::per_second_and_burst(
///     NonZeroU32::new(5).unwrap(),
///     NonZeroU32::new(20).unwrap()
/// );
/// let bucket = Bucket::new(limit);
///
/// let t0 = Timestamp::from_secs(1);
/// assert!(bucket.draw_at(t0, 15));
/// assert_eq!(5, bucket.tokens_at(t0));
///
/// // a second later one refill of 5 tokens has been credited
/// let t1 = Timestamp::from_secs(2);
/// assert_eq!(10, bucket.tokens_at(t1));
/// assert!(!bucket.draw_at(t1, 11));
/// ```
pub struct Bucket<C = StdClock> {
    state: RwLock<BucketState>,
    clock: C,
    limit: Limit,
}

/// The mutable half of a bucket, guarded by its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BucketState {
    tokens: i64,
    /// Instant up to which refills have been credited, `None` until the
    /// first operation anchors the bucket.
    last_update: Option<Timestamp>,
}

impl BucketState {
    fn full(limit: &Limit) -> Self {
        Self {
            tokens: limit.burst(),
            last_update: None,
        }
    }

    /// Credits the refills that elapsed between the last update and `now`.
    fn refill(&mut self, limit: &Limit, now: Timestamp) {
        let burst = limit.burst();
        let last_update = match self.last_update {
            // full: nothing to credit, re-anchor on this request
            Some(_) if self.tokens == burst => {
                self.last_update = Some(now);
                return;
            }
            Some(last_update) => last_update,
            None => {
                self.last_update = Some(now);
                return;
            }
        };

        let elapsed = interval_count(last_update, now, limit.refill());
        if elapsed > 0 {
            // advance by whole intervals so refills stay in phase with the anchor
            self.last_update = Some(last_update + intervals(elapsed, limit.refill()));
            let credit = i64::try_from(elapsed)
                .unwrap_or(i64::MAX)
                .saturating_mul(limit.rate());
            self.tokens = self.tokens.saturating_add(credit);
            trace!(intervals = elapsed, credit, tokens = self.tokens, "refilled bucket");
        }

        if self.tokens >= burst {
            self.tokens = burst;
            self.last_update = Some(now);
        }
    }

    /// Balance at `at` if nothing touches the bucket until then.
    fn infer(&self, limit: &Limit, at: Timestamp) -> i64 {
        let Some(last_update) = self.last_update else {
            return self.tokens.min(limit.burst());
        };
        if at <= last_update {
            return self.tokens.min(limit.burst());
        }
        let elapsed = interval_count(last_update, at, limit.refill());
        let credit = i64::try_from(elapsed)
            .unwrap_or(i64::MAX)
            .saturating_mul(limit.rate());
        self.tokens.saturating_add(credit).min(limit.burst())
    }
}

impl Bucket<StdClock> {
    /// Creates a full bucket enforcing `limit`, timed by a [`StdClock`].
    pub fn new(limit: Limit) -> Self {
        Self::with_clock(limit, StdClock::default())
    }
}

impl<C: Clock> Bucket<C> {
    /// Creates a full bucket with a custom clock implementation.
    ///
    /// Use this when you need a specific timing source, such as `ManualClock`
    /// for testing or a clock shared with a [`Registry`](crate::Registry).
    pub fn with_clock(limit: Limit, clock: C) -> Self {
        Self {
            state: RwLock::new(BucketState::full(&limit)),
            clock,
            limit,
        }
    }

    /// Returns the limit this bucket enforces.
    pub fn limit(&self) -> &Limit {
        &self.limit
    }

    /// Returns the clock used by the operations without an explicit timestamp.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Runs `f` on the freshly refilled state, under the write lock.
    fn with_refilled<R>(&self, now: Timestamp, f: impl FnOnce(&mut BucketState) -> R) -> R {
        let mut state = self.state.write();
        state.refill(&self.limit, now);
        f(&mut state)
    }

    /// Returns whether `n` tokens could be drawn right now.
    pub fn can_draw(&self, n: u32) -> bool {
        self.can_draw_at(self.clock.now(), n)
    }

    /// Returns whether `n` tokens could be drawn at `now`.
    ///
    /// Nothing is drawn, but pending refills are credited.
    pub fn can_draw_at(&self, now: Timestamp, n: u32) -> bool {
        self.with_refilled(now, |state| state.tokens >= i64::from(n))
    }

    /// Draws `n` tokens if that many are available.
    ///
    /// Returns `false` and leaves the balance untouched otherwise.
    pub fn draw(&self, n: u32) -> bool {
        self.draw_at(self.clock.now(), n)
    }

    /// Draws `n` tokens at `now` if that many are available.
    ///
    /// Returns `false` and leaves the balance untouched otherwise.
    pub fn draw_at(&self, now: Timestamp, n: u32) -> bool {
        let n = i64::from(n);
        self.with_refilled(now, |state| {
            if state.tokens < n {
                return false;
            }
            state.tokens -= n;
            true
        })
    }

    /// Draws as many tokens as possible, up to `n`, returning how many were drawn.
    pub fn draw_max(&self, n: u32) -> u32 {
        self.draw_max_at(self.clock.now(), n)
    }

    /// Draws as many tokens as possible at `now`, up to `n`, returning how
    /// many were drawn.
    ///
    /// An overdrawn bucket yields zero.
    pub fn draw_max_at(&self, now: Timestamp, n: u32) -> u32 {
        self.with_refilled(now, |state| {
            if unlikely(state.tokens <= 0) {
                return 0;
            }
            let drawn = state.tokens.min(i64::from(n));
            state.tokens -= drawn;
            // drawn <= n
            drawn as u32
        })
    }

    /// Draws `n` tokens regardless of the balance and returns the balance
    /// left, which may be negative.
    ///
    /// An overdrawn bucket recovers through ordinary refills only, so a large
    /// overdraft keeps it empty for as many intervals as it takes to pay off.
    pub fn force_draw(&self, n: i64) -> i64 {
        self.force_draw_at(self.clock.now(), n)
    }

    /// Draws `n` tokens at `now` regardless of the balance and returns the
    /// balance left, which may be negative.
    pub fn force_draw_at(&self, now: Timestamp, n: i64) -> i64 {
        self.with_refilled(now, |state| {
            state.tokens = state.tokens.saturating_sub(n);
            if state.tokens < 0 {
                debug!(tokens = state.tokens, drawn = n, "bucket overdrawn");
            }
            state.tokens
        })
    }

    /// Overwrites the balance with `tokens`.
    pub fn set_tokens(&self, tokens: i64) {
        self.set_tokens_at(self.clock.now(), tokens)
    }

    /// Credits refills up to `now`, then overwrites the balance with `tokens`.
    ///
    /// The balance may be set above `burst` or below zero. The next refill
    /// clamps an oversized balance back to `burst`.
    pub fn set_tokens_at(&self, now: Timestamp, tokens: i64) {
        self.with_refilled(now, |state| state.tokens = tokens)
    }

    /// Returns the current balance.
    ///
    /// May be negative if the bucket was overdrawn with
    /// [`force_draw`](Self::force_draw) or [`set_tokens`](Self::set_tokens).
    pub fn tokens(&self) -> i64 {
        self.tokens_at(self.clock.now())
    }

    /// Returns the balance at `now`.
    ///
    /// May be negative if the bucket was overdrawn.
    pub fn tokens_at(&self, now: Timestamp) -> i64 {
        self.with_refilled(now, |state| state.tokens)
    }

    /// Returns how many tokens can be drawn right now; zero when overdrawn.
    pub fn remaining(&self) -> u64 {
        self.remaining_at(self.clock.now())
    }

    /// Returns how many tokens can be drawn at `now`; zero when overdrawn.
    pub fn remaining_at(&self, now: Timestamp) -> u64 {
        u64::try_from(self.tokens_at(now)).unwrap_or(0)
    }

    /// Forecasts the balance at `at`, assuming nothing draws from, resets or
    /// sets the bucket in the meantime.
    ///
    /// Unlike every other operation this one does not credit refills into the
    /// bucket, so it takes only a shared lock and may be called with any
    /// timestamp.
    pub fn infer_tokens_at(&self, at: Timestamp) -> i64 {
        self.state.read().infer(&self.limit, at)
    }

    /// Returns the next instant at which a refill will be credited.
    pub fn next_refill(&self) -> Timestamp {
        self.next_refill_at(self.clock.now())
    }

    /// Returns the first refill boundary strictly after `now`.
    ///
    /// A full bucket is anchored at `now`, so its next refill is one whole
    /// interval away.
    pub fn next_refill_at(&self, now: Timestamp) -> Timestamp {
        self.with_refilled(now, |state| {
            let anchor = state.last_update.unwrap_or(now);
            next_after(anchor, now, self.limit.refill())
        })
    }

    /// Refills the bucket to `burst` and anchors it at the current time.
    pub fn reset(&self) {
        self.reset_at(self.clock.now())
    }

    /// Refills the bucket to `burst` and anchors it at `now`.
    pub fn reset_at(&self, now: Timestamp) {
        let mut state = self.state.write();
        state.tokens = self.limit.burst();
        state.last_update = Some(now);
    }

    /// Returns whether the bucket is full, meaning it holds as much as a
    /// freshly created one.
    pub fn is_reset(&self) -> bool {
        self.is_reset_at(self.clock.now())
    }

    /// Returns whether the bucket is full at `now`.
    pub fn is_reset_at(&self, now: Timestamp) -> bool {
        self.with_refilled(now, |state| state.tokens == self.limit.burst())
    }
}

impl<C> Debug for Bucket<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = *self.state.read();
        f.debug_struct("Bucket")
            .field("limit", &self.limit)
            .field("tokens", &state.tokens)
            .field("last_update", &state.last_update)
            .finish()
    }
}
