use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::{Bucket, Clock, Limit, StdClock, Timestamp};

/// A concurrent set of buckets keyed by identity, such as a client address.
///
/// A bucket is created lazily, full and with the registry's [`Limit`], the
/// first time an identity is seen. Every bucket operation is available here
/// keyed by identity and simply forwards to that bucket.
///
/// Buckets are never dropped on their own. Call [`purge`](Self::purge) now
/// and then to sweep out the ones that have refilled completely and carry no
/// information anymore.
///
/// The map is sharded, so lookups for different identities rarely contend.
/// Each bucket keeps its own lock, and the map's lock is released before a
/// bucket is touched.
///
/// # Examples
///
/// ```rust
/// use tollgate::{Limit, Registry};
/// use std::num::NonZeroU32;
///
/// let registry = Registry::new(Limit::per_second_and_burst(
///     NonZeroU32::new(1).unwrap(),
///     NonZeroU32::new(3).unwrap(),
/// ));
///
/// for _ in 0..3 {
///     assert!(registry.draw("10.0.0.1", 1));
/// }
/// assert!(!registry.draw("10.0.0.1", 1));
/// // other identities are unaffected
/// assert!(registry.draw("10.0.0.2", 1));
/// ```
pub struct Registry<C = StdClock> {
    buckets: DashMap<String, Arc<Bucket<C>>>,
    limit: Limit,
    clock: C,
}

impl Registry<StdClock> {
    /// Creates an empty registry whose buckets enforce `limit`.
    pub fn new(limit: Limit) -> Self {
        Self::with_clock(limit, StdClock::default())
    }
}

impl<C: Clock + Clone> Registry<C> {
    /// Creates an empty registry whose buckets share `clock`.
    pub fn with_clock(limit: Limit, clock: C) -> Self {
        Self {
            buckets: DashMap::new(),
            limit,
            clock,
        }
    }

    /// The limit given to every bucket this registry creates.
    pub fn limit(&self) -> &Limit {
        &self.limit
    }

    /// The clock shared by every bucket this registry creates.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Number of tracked identities.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no identity is tracked.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Whether `id` currently has a bucket. Unlike every other keyed
    /// operation, this never creates one.
    pub fn contains(&self, id: &str) -> bool {
        self.buckets.contains_key(id)
    }

    /// Builds a full bucket with this registry's limit and clock, without
    /// registering it. Pair with [`set`](Self::set).
    pub fn new_bucket(&self) -> Bucket<C> {
        Bucket::with_clock(self.limit, self.clock.clone())
    }

    /// Returns the bucket for `id`, creating it if necessary.
    ///
    /// Concurrent calls for an unseen identity agree on a single bucket.
    /// [`purge`](Self::purge) never removes a bucket while a handle to it is
    /// alive. After [`delete`](Self::delete) or [`set`](Self::set) the handle
    /// stays usable but is detached: the next lookup of `id` sees another bucket.
    pub fn get(&self, id: &str) -> Arc<Bucket<C>> {
        if let Some(bucket) = self.buckets.get(id) {
            return Arc::clone(bucket.value());
        }
        let bucket = self.buckets.entry(id.to_owned()).or_insert_with(|| {
            trace!(id, "creating bucket");
            Arc::new(self.new_bucket())
        });
        Arc::clone(bucket.value())
    }

    /// Registers `bucket` under `id`, replacing any existing one.
    pub fn set(&self, id: impl Into<String>, bucket: Bucket<C>) {
        self.buckets.insert(id.into(), Arc::new(bucket));
    }

    /// Forgets the bucket for `id`, if any.
    pub fn delete(&self, id: &str) {
        self.buckets.remove(id);
    }

    /// Returns whether `n` tokens could be drawn for `id`.
    pub fn can_draw(&self, id: &str, n: u32) -> bool {
        self.get(id).can_draw(n)
    }

    /// Returns whether `n` tokens could be drawn for `id` at `now`.
    pub fn can_draw_at(&self, id: &str, now: Timestamp, n: u32) -> bool {
        self.get(id).can_draw_at(now, n)
    }

    /// Draws `n` tokens for `id` if that many are available.
    pub fn draw(&self, id: &str, n: u32) -> bool {
        self.get(id).draw(n)
    }

    /// Draws `n` tokens for `id` at `now` if that many are available.
    pub fn draw_at(&self, id: &str, now: Timestamp, n: u32) -> bool {
        self.get(id).draw_at(now, n)
    }

    /// Draws up to `n` tokens for `id`, returning how many were drawn.
    pub fn draw_max(&self, id: &str, n: u32) -> u32 {
        self.get(id).draw_max(n)
    }

    /// Draws up to `n` tokens for `id` at `now`, returning how many were drawn.
    pub fn draw_max_at(&self, id: &str, now: Timestamp, n: u32) -> u32 {
        self.get(id).draw_max_at(now, n)
    }

    /// Draws `n` tokens for `id` unconditionally, returning the balance left.
    ///
    /// Meant for punishing abuse, such as a failed login, where the draw must
    /// land even if a concurrent check already let the request through.
    pub fn force_draw(&self, id: &str, n: i64) -> i64 {
        self.get(id).force_draw(n)
    }

    /// Draws `n` tokens for `id` at `now` unconditionally, returning the balance left.
    pub fn force_draw_at(&self, id: &str, now: Timestamp, n: i64) -> i64 {
        self.get(id).force_draw_at(now, n)
    }

    /// Overwrites the balance of `id`.
    pub fn set_tokens(&self, id: &str, tokens: i64) {
        self.get(id).set_tokens(tokens)
    }

    /// Overwrites the balance of `id` after crediting refills up to `now`.
    pub fn set_tokens_at(&self, id: &str, now: Timestamp, tokens: i64) {
        self.get(id).set_tokens_at(now, tokens)
    }

    /// Balance for `id`, negative when overdrawn.
    pub fn tokens(&self, id: &str) -> i64 {
        self.get(id).tokens()
    }

    /// Balance for `id` at `now`, negative when overdrawn.
    pub fn tokens_at(&self, id: &str, now: Timestamp) -> i64 {
        self.get(id).tokens_at(now)
    }

    /// Tokens `id` can draw, zero when overdrawn.
    pub fn remaining(&self, id: &str) -> u64 {
        self.get(id).remaining()
    }

    /// Tokens `id` can draw at `now`, zero when overdrawn.
    pub fn remaining_at(&self, id: &str, now: Timestamp) -> u64 {
        self.get(id).remaining_at(now)
    }

    /// Forecasts the balance of `id` at `at` without touching the bucket.
    pub fn infer_tokens_at(&self, id: &str, at: Timestamp) -> i64 {
        self.get(id).infer_tokens_at(at)
    }

    /// Next instant at which `id` is credited a refill.
    pub fn next_refill(&self, id: &str) -> Timestamp {
        self.get(id).next_refill()
    }

    /// First refill boundary of `id` strictly after `now`.
    pub fn next_refill_at(&self, id: &str, now: Timestamp) -> Timestamp {
        self.get(id).next_refill_at(now)
    }

    /// Refills the bucket of `id` to its burst capacity.
    pub fn reset(&self, id: &str) {
        self.get(id).reset()
    }

    /// Refills the bucket of `id` to its burst capacity, anchored at `now`.
    pub fn reset_at(&self, id: &str, now: Timestamp) {
        self.get(id).reset_at(now)
    }

    /// Whether the bucket of `id` is full. A never-seen identity is.
    pub fn is_reset(&self, id: &str) -> bool {
        self.get(id).is_reset()
    }

    /// Whether the bucket of `id` is full at `now`.
    pub fn is_reset_at(&self, id: &str, now: Timestamp) -> bool {
        self.get(id).is_reset_at(now)
    }

    /// Removes every bucket that is full right now, returning how many were
    /// removed.
    ///
    /// Buckets with a live handle are kept, full or not: a keyed operation
    /// holds one between its lookup and its draw, and removing the bucket in
    /// that window would lose the draw. Each bucket is judged against its own
    /// clock while its shard is write-locked, so [`get`](Self::get) cannot
    /// hand out a new handle halfway through. Bucket locks are only ever taken
    /// after a shard lock here, never the other way around.
    ///
    /// There is no `purge_at`: a bucket drawn from after the given timestamp
    /// would see time go backwards.
    pub fn purge(&self) -> usize {
        let mut removed = 0;
        self.buckets.retain(|_, bucket| {
            if Arc::strong_count(bucket) == 1 && bucket.is_reset() {
                removed += 1;
                false
            } else {
                true
            }
        });
        debug!(removed, remaining = self.buckets.len(), "purged full buckets");
        removed
    }
}

impl<C> std::fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("limit", &self.limit)
            .field("buckets", &self.buckets.len())
            .finish()
    }
}
