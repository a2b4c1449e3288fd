//! The distributed state machine: lifecycle, role locking, bounded `put`,
//! blocking/non-blocking `get`, graceful `close`, counters, and `unblock`.
//!
//! Every operation maps directly onto the protocol in the design
//! document: a role lock is a 1-permit semaphore list, acquired with a
//! blocking tail-pop and released with an unconditional head-push; the
//! `not_full` permit is both a backpressure gate for producers and a
//! condition re-asserted by both roles through [`PressureQueue::assert_not_full`].

use crate::error::{PressureError, Role};
use crate::keys::{QueueKeys, DEFAULT_PREFIX};
use crate::store::{Store, PERMIT};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How often an unblockable wait re-polls the store, checking the local
/// `unblock` latch between rounds.
const UNBLOCK_POLL_SECS: f64 = 1.0;

fn client_uid() -> String {
	let host = gethostname::gethostname().to_string_lossy().into_owned();
	format!("{host}_pid{}", std::process::id())
}

/// Tracks the remaining time budget for a blocking operation. `None`
/// means "no deadline, block forever" (the caller passed `timeout == 0`).
#[derive(Clone, Copy)]
struct Deadline {
	at: Option<Instant>,
}

impl Deadline {
	fn new(timeout_secs: f64) -> Self {
		if timeout_secs > 0.0 {
			Self {
				at: Some(Instant::now() + Duration::from_secs_f64(timeout_secs)),
			}
		} else {
			Self { at: None }
		}
	}

	/// Seconds to pass to a one-shot `BRPOP` (`0.0` means block forever),
	/// or `Err(())` if the deadline has already elapsed.
	fn remaining_secs(self) -> Result<f64, ()> {
		match self.at {
			None => Ok(0.0),
			Some(at) => {
				let now = Instant::now();
				if now >= at {
					Err(())
				} else {
					Ok((at - now).as_secs_f64())
				}
			}
		}
	}
}

struct Inner {
	store: Store,
	name: String,
	keys: QueueKeys,
	client_uid: String,
	bound: Mutex<Option<u64>>,
	closed_cache: AtomicBool,
	unblock: AtomicBool,
	allow_unblocking_default: bool,
}

/// A handle to one distributed queue. Cheaply `Clone`-able: clones share
/// the same cached state, client identity, and `unblock` latch, so a
/// background task (e.g. the buffered wrapper's drainer) can hold its own
/// clone while still reacting to `unblock()` called from elsewhere in the
/// same process.
#[derive(Clone)]
pub struct PressureQueue(Arc<Inner>);

impl PressureQueue {
	/// Connects using the default key prefix (`__pressure__`).
	///
	/// # Errors
	/// Returns an error if the Redis URL is invalid or unreachable.
	pub async fn connect(redis_url: &str, name: impl Into<String>) -> Result<Self, PressureError> {
		Self::connect_with_prefix(redis_url, DEFAULT_PREFIX, name).await
	}

	/// # Errors
	/// Returns an error if the Redis URL is invalid or unreachable.
	pub async fn connect_with_prefix(redis_url: &str, prefix: &str, name: impl Into<String>) -> Result<Self, PressureError> {
		let store = Store::new(redis_url)?;
		Self::from_store(store, prefix, name).await
	}

	/// Builds a handle atop an already-connected [`Store`], e.g. one
	/// shared with other queues in the same process.
	///
	/// # Errors
	/// Returns an error if the initial cache-priming reads fail.
	pub async fn from_store(store: Store, prefix: &str, name: impl Into<String>) -> Result<Self, PressureError> {
		let name = name.into();
		let keys = QueueKeys::new(prefix, &name);

		let raw_bound = store.get_int(keys.bound.clone()).await?;
		let bound = raw_bound.and_then(|b| if b == 0 { None } else { Some(b.max(0) as u64) });
		let closed = store.exists(keys.closed.clone()).await?;

		Ok(Self(Arc::new(Inner {
			store,
			name,
			keys,
			client_uid: client_uid(),
			bound: Mutex::new(bound),
			closed_cache: AtomicBool::new(closed),
			unblock: AtomicBool::new(false),
			allow_unblocking_default: false,
		})))
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.0.name
	}

	#[must_use]
	pub fn client_uid(&self) -> &str {
		&self.0.client_uid
	}

	/// Atomically sets `bound` iff absent, then initialises the three
	/// 1-permit semaphores.
	///
	/// # Errors
	/// Returns [`PressureError::AlreadyExists`] if the queue was already
	/// created.
	pub async fn create(&self, bound: Option<u64>) -> Result<(), PressureError> {
		let int_bound = bound.map_or(0_i64, |b| i64::try_from(b).unwrap_or(i64::MAX));
		let created = self.0.store.set_nx(self.0.keys.bound.clone(), int_bound).await?;
		if !created {
			return Err(PressureError::AlreadyExists(self.0.name.clone()));
		}

		*self.0.bound.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = bound;

		let n = self.0.store.lpush(self.0.keys.producer_free.clone(), vec![PERMIT.to_vec()]).await?;
		debug_assert_eq!(n, 1, "producer_free must hold exactly one permit after create");
		let n = self.0.store.lpush(self.0.keys.consumer_free.clone(), vec![PERMIT.to_vec()]).await?;
		debug_assert_eq!(n, 1, "consumer_free must hold exactly one permit after create");
		let n = self.0.store.lpush(self.0.keys.not_full.clone(), vec![PERMIT.to_vec()]).await?;
		debug_assert_eq!(n, 1, "not_full must hold exactly one permit after create");

		debug!(queue = %self.0.name, ?bound, "queue created");
		Ok(())
	}

	/// Always re-reads from the store; the cache is not authoritative.
	///
	/// # Errors
	/// Returns an error if the store is unreachable.
	pub async fn exists(&self) -> Result<bool, PressureError> {
		self.0.store.exists(self.0.keys.bound.clone()).await
	}

	async fn require_exists(&self) -> Result<(), PressureError> {
		if self.exists().await? {
			Ok(())
		} else {
			Err(PressureError::DoesNotExist(self.0.name.clone()))
		}
	}

	/// # Errors
	/// Returns [`PressureError::DoesNotExist`] if the queue has been deleted.
	pub async fn qsize(&self) -> Result<u64, PressureError> {
		self.require_exists().await?;
		let len = self.0.store.llen(self.0.keys.queue.clone()).await?;
		Ok(len.max(0) as u64)
	}

	/// Once observed `true`, stays cached for the lifetime of this handle.
	///
	/// # Errors
	/// Returns [`PressureError::DoesNotExist`] if the queue has been deleted.
	pub async fn closed(&self) -> Result<bool, PressureError> {
		self.require_exists().await?;
		if self.0.closed_cache.load(Ordering::Acquire) {
			return Ok(true);
		}
		let closed = self.0.store.exists(self.0.keys.closed.clone()).await?;
		if closed {
			self.0.closed_cache.store(true, Ordering::Release);
		}
		Ok(closed)
	}

	/// Sets the local latch; the next unblockable wait on this handle
	/// aborts with [`PressureError::Unblocked`] within one poll round.
	pub fn unblock(&self) {
		self.0.unblock.store(true, Ordering::Release);
	}

	pub(crate) fn cached_bound(&self) -> Option<u64> {
		*self.0.bound.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	/// Head-push then trim to length 1 — an idempotent assertion that
	/// slack exists. Exposed crate-internally so wrappers (e.g. the
	/// reliable queue's `confirm`) can re-assert backpressure after
	/// freeing capacity outside the core `put`/`get` protocol.
	pub(crate) async fn assert_not_full(&self) -> Result<(), PressureError> {
		self.0.store.lpush(self.0.keys.not_full.clone(), vec![PERMIT.to_vec()]).await?;
		self.0.store.ltrim(self.0.keys.not_full.clone(), 0, 0).await?;
		Ok(())
	}

	/// Blocking tail-pop of `keys`, honouring `deadline` and, if
	/// `allow_unblocking`, the local unblock latch. `Ok(None)` means the
	/// deadline elapsed with nothing available.
	async fn blocking_pop(&self, keys: Vec<String>, deadline: Deadline, allow_unblocking: bool) -> Result<Option<(String, Vec<u8>)>, PressureError> {
		if !allow_unblocking {
			let Ok(timeout) = deadline.remaining_secs() else {
				return Ok(None);
			};
			return self.0.store.brpop(keys, timeout).await;
		}

		loop {
			if self.0.unblock.swap(false, Ordering::AcqRel) {
				return Err(PressureError::Unblocked(self.0.name.clone()));
			}

			if deadline.remaining_secs().is_err() {
				return Ok(None);
			}

			if let Some(result) = self.0.store.brpop(keys.clone(), UNBLOCK_POLL_SECS).await? {
				return Ok(Some(result));
			}
		}
	}

	// ---- producer protocol -------------------------------------------------

	/// Appends `payload`. When `block` is `false` this is equivalent to
	/// [`PressureQueue::put_nowait`].
	///
	/// # Errors
	/// [`PressureError::DoesNotExist`], [`PressureError::Closed`],
	/// [`PressureError::Full`] (non-blocking, bounded, no slack),
	/// [`PressureError::InUse`] (non-blocking, role held elsewhere),
	/// [`PressureError::Unblocked`], or [`PressureError::TimedOut`].
	pub async fn put(&self, payload: impl Into<Vec<u8>>, block: bool, timeout_secs: f64, allow_unblocking: Option<bool>, allow_overfilling: bool) -> Result<(), PressureError> {
		self.require_exists().await?;
		if block {
			self.put_blocking(payload.into(), timeout_secs, allow_unblocking, allow_overfilling).await
		} else {
			self.put_nowait(payload, allow_overfilling).await
		}
	}

	async fn put_blocking(&self, payload: Vec<u8>, timeout_secs: f64, allow_unblocking: Option<bool>, allow_overfilling: bool) -> Result<(), PressureError> {
		let allow_unblocking = allow_unblocking.unwrap_or(self.0.allow_unblocking_default);
		let deadline = Deadline::new(timeout_secs);

		let acquired = self.blocking_pop(vec![self.0.keys.producer_free.clone()], deadline, allow_unblocking).await?;
		if acquired.is_none() {
			return Err(PressureError::TimedOut(self.0.name.clone()));
		}

		let result = self.put_under_producer_lock(payload, deadline, allow_unblocking, allow_overfilling).await;
		self.release_role(&self.0.keys.producer_free, Role::Producer).await;
		result
	}

	async fn put_under_producer_lock(&self, payload: Vec<u8>, deadline: Deadline, allow_unblocking: bool, allow_overfilling: bool) -> Result<(), PressureError> {
		self.0.store.set_string(self.0.keys.producer.clone(), self.0.client_uid.clone()).await?;

		if self.0.store.exists(self.0.keys.closed.clone()).await? {
			self.0.closed_cache.store(true, Ordering::Release);
			return Err(PressureError::Closed(self.0.name.clone()));
		}

		let bound = self.cached_bound();
		if bound.is_some() && !allow_overfilling {
			let acquired = self.blocking_pop(vec![self.0.keys.not_full.clone()], deadline, allow_unblocking).await?;
			if acquired.is_none() {
				return Err(PressureError::TimedOut(self.0.name.clone()));
			}
		}

		self.enqueue(payload, bound).await
	}

	async fn enqueue(&self, payload: Vec<u8>, bound: Option<u64>) -> Result<(), PressureError> {
		let payload_len = payload.len() as i64;
		let new_length = self.0.store.lpush(self.0.keys.queue.clone(), vec![payload]).await?;

		if let Some(bound) = bound {
			if new_length < i64::try_from(bound).unwrap_or(i64::MAX) {
				self.assert_not_full().await?;
			}
		}

		self.0.store.incr_by(self.0.keys.produced_messages.clone(), 1).await?;
		self.0.store.incr_by(self.0.keys.produced_bytes.clone(), payload_len).await?;
		Ok(())
	}

	/// Non-blocking `put`.
	///
	/// # Errors
	/// [`PressureError::DoesNotExist`], [`PressureError::InUse`],
	/// [`PressureError::Closed`], or [`PressureError::Full`].
	pub async fn put_nowait(&self, payload: impl Into<Vec<u8>>, allow_overfilling: bool) -> Result<(), PressureError> {
		self.require_exists().await?;
		let payload = payload.into();

		let acquired = self.0.store.rpop(self.0.keys.producer_free.clone()).await?;
		if acquired.is_none() {
			return Err(self.in_use_error(Role::Producer).await?);
		}

		let result = self.put_nowait_under_lock(payload, allow_overfilling).await;
		self.release_role(&self.0.keys.producer_free, Role::Producer).await;
		result
	}

	async fn put_nowait_under_lock(&self, payload: Vec<u8>, allow_overfilling: bool) -> Result<(), PressureError> {
		self.0.store.set_string(self.0.keys.producer.clone(), self.0.client_uid.clone()).await?;

		if self.0.store.exists(self.0.keys.closed.clone()).await? {
			self.0.closed_cache.store(true, Ordering::Release);
			return Err(PressureError::Closed(self.0.name.clone()));
		}

		let bound = self.cached_bound();
		if bound.is_some() && !allow_overfilling {
			let permit = self.0.store.rpop(self.0.keys.not_full.clone()).await?;
			if permit.is_none() {
				return Err(PressureError::Full(self.0.name.clone()));
			}
		}

		self.enqueue(payload, bound).await
	}

	// ---- consumer protocol -------------------------------------------------

	/// Consumes and returns one payload. When `block` is `false` this is
	/// equivalent to [`PressureQueue::get_nowait`].
	///
	/// # Errors
	/// Same kinds as [`PressureQueue::put`].
	pub async fn get(&self, block: bool, timeout_secs: f64, allow_unblocking: Option<bool>) -> Result<Option<Vec<u8>>, PressureError> {
		self.require_exists().await?;
		if block {
			self.get_blocking(timeout_secs, allow_unblocking).await.map(Some)
		} else {
			self.get_nowait().await
		}
	}

	async fn get_blocking(&self, timeout_secs: f64, allow_unblocking: Option<bool>) -> Result<Vec<u8>, PressureError> {
		let allow_unblocking = allow_unblocking.unwrap_or(self.0.allow_unblocking_default);
		let deadline = Deadline::new(timeout_secs);

		let acquired = self.blocking_pop(vec![self.0.keys.consumer_free.clone()], deadline, allow_unblocking).await?;
		if acquired.is_none() {
			return Err(PressureError::TimedOut(self.0.name.clone()));
		}

		let result = self.get_under_consumer_lock(deadline, allow_unblocking).await;
		self.release_role(&self.0.keys.consumer_free, Role::Consumer).await;
		result
	}

	async fn get_under_consumer_lock(&self, deadline: Deadline, allow_unblocking: bool) -> Result<Vec<u8>, PressureError> {
		self.0.store.set_string(self.0.keys.consumer.clone(), self.0.client_uid.clone()).await?;

		let closed_now = self.0.store.exists(self.0.keys.closed.clone()).await?;
		if closed_now {
			self.0.closed_cache.store(true, Ordering::Release);
			let empty = !self.0.store.exists(self.0.keys.queue.clone()).await?;
			if empty {
				return Err(PressureError::Closed(self.0.name.clone()));
			}

			// Drains a remaining element; this succeeds immediately.
			// Counters and `not_full` are intentionally not touched here.
			let popped = self.blocking_pop(vec![self.0.keys.queue.clone()], deadline, allow_unblocking).await?;
			return popped.map(|(_, value)| value).ok_or_else(|| PressureError::TimedOut(self.0.name.clone()));
		}

		let woken = self.blocking_pop(vec![self.0.keys.queue.clone(), self.0.keys.closed.clone()], deadline, allow_unblocking).await?;
		let Some((key, value)) = woken else {
			return Err(PressureError::TimedOut(self.0.name.clone()));
		};

		if key == self.0.keys.closed {
			self.0.closed_cache.store(true, Ordering::Release);
			return Err(PressureError::Closed(self.0.name.clone()));
		}

		self.assert_not_full().await?;
		self.0.store.incr_by(self.0.keys.consumed_messages.clone(), 1).await?;
		self.0.store.incr_by(self.0.keys.consumed_bytes.clone(), value.len() as i64).await?;
		Ok(value)
	}

	/// Non-blocking `get`. Returns `Ok(None)` when the queue is empty and
	/// not closed.
	///
	/// # Errors
	/// [`PressureError::DoesNotExist`], [`PressureError::InUse`], or
	/// [`PressureError::Closed`] (empty and closed).
	pub async fn get_nowait(&self) -> Result<Option<Vec<u8>>, PressureError> {
		self.require_exists().await?;

		let acquired = self.0.store.rpop(self.0.keys.consumer_free.clone()).await?;
		if acquired.is_none() {
			return Err(self.in_use_error(Role::Consumer).await?);
		}

		let result = self.get_nowait_under_lock().await;
		self.release_role(&self.0.keys.consumer_free, Role::Consumer).await;
		result
	}

	async fn get_nowait_under_lock(&self) -> Result<Option<Vec<u8>>, PressureError> {
		self.0.store.set_string(self.0.keys.consumer.clone(), self.0.client_uid.clone()).await?;
		let popped = self.0.store.rpop(self.0.keys.queue.clone()).await?;

		// Re-asserting even when nothing was popped is a harmless
		// inefficiency inherited from the source protocol.
		self.assert_not_full().await?;

		if let Some(value) = popped {
			self.0.store.incr_by(self.0.keys.consumed_messages.clone(), 1).await?;
			self.0.store.incr_by(self.0.keys.consumed_bytes.clone(), value.len() as i64).await?;
			Ok(Some(value))
		} else if self.0.store.exists(self.0.keys.closed.clone()).await? {
			self.0.closed_cache.store(true, Ordering::Release);
			Err(PressureError::Closed(self.0.name.clone()))
		} else {
			Ok(None)
		}
	}

	/// Returns the head element without removing it. Takes the consumer
	/// lock.
	///
	/// # Errors
	/// [`PressureError::DoesNotExist`], [`PressureError::InUse`], or
	/// [`PressureError::Closed`] (empty and closed).
	pub async fn peek_reverse_nowait(&self) -> Result<Option<Vec<u8>>, PressureError> {
		self.require_exists().await?;

		let acquired = self.0.store.rpop(self.0.keys.consumer_free.clone()).await?;
		if acquired.is_none() {
			return Err(self.in_use_error(Role::Consumer).await?);
		}

		let result = self.peek_under_lock().await;
		self.release_role(&self.0.keys.consumer_free, Role::Consumer).await;
		result
	}

	async fn peek_under_lock(&self) -> Result<Option<Vec<u8>>, PressureError> {
		self.0.store.set_string(self.0.keys.consumer.clone(), self.0.client_uid.clone()).await?;
		let mut head = self.0.store.lrange(self.0.keys.queue.clone(), 0, 0).await?;
		if head.is_empty() {
			if self.0.store.exists(self.0.keys.closed.clone()).await? {
				self.0.closed_cache.store(true, Ordering::Release);
				return Err(PressureError::Closed(self.0.name.clone()));
			}
			return Ok(None);
		}
		Ok(Some(head.remove(0)))
	}

	// ---- close / delete -----------------------------------------------------

	/// Under the producer lock: asserts the `closed` sentinel by pushing
	/// two permits, so one currently-blocked consumer wakes on it while a
	/// later existence check still finds it present.
	///
	/// # Errors
	/// [`PressureError::DoesNotExist`] or [`PressureError::Closed`] (the
	/// queue was already closed).
	pub async fn close(&self) -> Result<(), PressureError> {
		self.require_exists().await?;

		let acquired = self.blocking_pop(vec![self.0.keys.producer_free.clone()], Deadline::new(0.0), false).await?;
		debug_assert!(acquired.is_some(), "unbounded wait cannot time out");

		let result = self.close_under_lock().await;
		self.release_role(&self.0.keys.producer_free, Role::Producer).await;
		result
	}

	async fn close_under_lock(&self) -> Result<(), PressureError> {
		self.0.store.set_string(self.0.keys.producer.clone(), self.0.client_uid.clone()).await?;

		if self.0.store.exists(self.0.keys.closed.clone()).await? {
			self.0.closed_cache.store(true, Ordering::Release);
			return Err(PressureError::Closed(self.0.name.clone()));
		}

		self.0.store.lpush(self.0.keys.closed.clone(), vec![PERMIT.to_vec(), PERMIT.to_vec()]).await?;
		self.0.closed_cache.store(true, Ordering::Release);
		debug!(queue = %self.0.name, "queue closed");
		Ok(())
	}

	/// Tears down the queue. Ordered so that any peer blocked in the
	/// producer or consumer protocol wakes and then observes
	/// [`PressureError::DoesNotExist`].
	///
	/// # Errors
	/// [`PressureError::DoesNotExist`] if already deleted.
	pub async fn delete(&self) -> Result<(), PressureError> {
		self.require_exists().await?;

		self.0.store.del(vec![self.0.keys.bound.clone()]).await?;
		self.0.store.lpush(self.0.keys.not_full.clone(), vec![PERMIT.to_vec()]).await?;
		self.0.store.lpush(self.0.keys.closed.clone(), vec![PERMIT.to_vec(), PERMIT.to_vec()]).await?;

		self.0.store.brpop(vec![self.0.keys.producer_free.clone()], 0.0).await?;
		self.0.store.del(vec![self.0.keys.producer.clone(), self.0.keys.producer_free.clone()]).await?;

		self.0.store.brpop(vec![self.0.keys.consumer_free.clone()], 0.0).await?;
		self.0.store.del(vec![self.0.keys.consumer.clone(), self.0.keys.consumer_free.clone()]).await?;

		self.0
			.store
			.del(vec![
				self.0.keys.not_full.clone(),
				self.0.keys.closed.clone(),
				self.0.keys.produced_messages.clone(),
				self.0.keys.produced_bytes.clone(),
				self.0.keys.consumed_messages.clone(),
				self.0.keys.consumed_bytes.clone(),
				self.0.keys.queue.clone(),
			])
			.await?;

		debug!(queue = %self.0.name, "queue deleted");
		Ok(())
	}

	// ---- iteration -----------------------------------------------------------

	/// An async-iteration helper: `next()` yields successive payloads,
	/// translating a [`PressureError::Closed`] into a normal end of
	/// sequence rather than an error.
	#[must_use]
	pub fn iter(&self) -> Iter<'_> {
		Iter { queue: self }
	}

	// ---- shared helpers -------------------------------------------------------

	async fn release_role(&self, free_key: &str, role: Role) {
		if let Err(e) = self.0.store.lpush(free_key.to_string(), vec![PERMIT.to_vec()]).await {
			warn!(queue = %self.0.name, %role, error = %e, "failed to release role lock");
		}
	}

	async fn in_use_error(&self, role: Role) -> Result<PressureError, PressureError> {
		let holder_key = match role {
			Role::Producer => &self.0.keys.producer,
			Role::Consumer => &self.0.keys.consumer,
		};
		let user = self.0.store.get_string(holder_key.clone()).await?.unwrap_or_default();
		Ok(PressureError::InUse {
			name: self.0.name.clone(),
			user,
			role,
		})
	}
}

/// Async iteration over a [`PressureQueue`]'s payloads, produced by
/// [`PressureQueue::iter`].
pub struct Iter<'a> {
	queue: &'a PressureQueue,
}

impl Iter<'_> {
	/// Returns the next payload, or `None` once the queue is drained and
	/// closed.
	///
	/// # Errors
	/// Any [`PressureError`] other than `Closed`, which instead ends the
	/// sequence.
	pub async fn next(&self) -> Option<Result<Vec<u8>, PressureError>> {
		match self.queue.get(true, 0.0, Some(true)).await {
			Ok(payload) => payload.map(Ok),
			Err(PressureError::Closed(_)) => None,
			Err(e) => Some(Err(e)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn redis_url() -> String {
		std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string())
	}

	async fn fresh_queue(name: &str) -> PressureQueue {
		let queue = PressureQueue::connect_with_prefix(&redis_url(), "pressure_test", name).await.expect("connect");
		let _ = queue.delete().await;
		queue
	}

	#[tokio::test]
	async fn create_then_exists_and_empty() {
		let queue = fresh_queue("p1").await;
		queue.create(None).await.expect("create");
		assert!(queue.exists().await.expect("exists"));
		assert_eq!(queue.qsize().await.expect("qsize"), 0);
		queue.delete().await.expect("delete");
	}

	#[tokio::test]
	async fn create_twice_fails_already_exists() {
		let queue = fresh_queue("p2").await;
		queue.create(None).await.expect("create");
		let err = queue.create(None).await.expect_err("second create must fail");
		assert!(matches!(err, PressureError::AlreadyExists(_)));
		queue.delete().await.expect("delete");
	}

	#[tokio::test]
	async fn single_client_fifo() {
		let queue = fresh_queue("p3").await;
		queue.create(None).await.expect("create");

		queue.put(b"hello".to_vec(), true, 0.0, None, false).await.expect("put hello");
		queue.put(b"world".to_vec(), true, 0.0, None, false).await.expect("put world");

		let first = queue.get(true, 0.0, None).await.expect("get 1").expect("some");
		let second = queue.get(true, 0.0, None).await.expect("get 2").expect("some");

		assert_eq!(first, b"hello");
		assert_eq!(second, b"world");
		assert_eq!(queue.qsize().await.expect("qsize"), 0);
		queue.delete().await.expect("delete");
	}

	#[tokio::test]
	async fn nonblocking_full_bounded() {
		let queue = fresh_queue("p4").await;
		queue.create(Some(1)).await.expect("create");

		queue.put_nowait(b"x".to_vec(), false).await.expect("first put ok");
		let err = queue.put_nowait(b"y".to_vec(), false).await.expect_err("second put must be full");
		assert!(matches!(err, PressureError::Full(_)));
		queue.delete().await.expect("delete");
	}

	#[tokio::test]
	async fn close_drains_then_closed() {
		let queue = fresh_queue("p5").await;
		queue.create(None).await.expect("create");

		queue.put(b"p".to_vec(), true, 0.0, None, false).await.expect("put p");
		queue.put(b"q".to_vec(), true, 0.0, None, false).await.expect("put q");
		queue.close().await.expect("close");

		assert_eq!(queue.get(true, 0.0, None).await.expect("get p").expect("some"), b"p");
		assert_eq!(queue.get(true, 0.0, None).await.expect("get q").expect("some"), b"q");

		let err = queue.get(true, 0.0, None).await.expect_err("must be closed now");
		assert!(matches!(err, PressureError::Closed(_)));
		queue.delete().await.expect("delete");
	}

	#[tokio::test]
	async fn put_after_close_fails() {
		let queue = fresh_queue("p6").await;
		queue.create(None).await.expect("create");
		queue.close().await.expect("close");

		let err = queue.put(b"late".to_vec(), true, 0.0, None, false).await.expect_err("put after close must fail");
		assert!(matches!(err, PressureError::Closed(_)));
		queue.delete().await.expect("delete");
	}

	#[tokio::test]
	async fn role_lock_reports_in_use() {
		let queue = fresh_queue("p7").await;
		queue.create(None).await.expect("create");

		let consumer = queue.clone();
		let blocker = tokio::spawn(async move { consumer.get(true, 0.0, None).await });

		// Give the blocker time to acquire consumer_free before we probe.
		tokio::time::sleep(Duration::from_millis(200)).await;

		let err = queue.get_nowait().await.expect_err("role already held");
		assert!(matches!(err, PressureError::InUse { role: Role::Consumer, .. }));

		queue.put(b"v".to_vec(), true, 0.0, None, false).await.expect("put v");
		let got = blocker.await.expect("join").expect("get").expect("some");
		assert_eq!(got, b"v");

		queue.delete().await.expect("delete");
	}

	#[tokio::test]
	async fn unblock_aborts_blocking_get() {
		let queue = fresh_queue("p8").await;
		queue.create(None).await.expect("create");

		let waiter = queue.clone();
		let handle = tokio::spawn(async move { waiter.get(true, 0.0, Some(true)).await });

		tokio::time::sleep(Duration::from_millis(200)).await;
		queue.unblock();

		let err = handle.await.expect("join").expect_err("must unblock");
		assert!(matches!(err, PressureError::Unblocked(_)));

		queue.delete().await.expect("delete");
	}

	#[tokio::test]
	async fn bounded_blocking_put_waits_for_slack() {
		let queue = fresh_queue("p9").await;
		queue.create(Some(2)).await.expect("create");

		queue.put(b"a".to_vec(), true, 0.0, None, false).await.expect("put a");
		queue.put(b"b".to_vec(), true, 0.0, None, false).await.expect("put b");

		let producer = queue.clone();
		let blocked_put = tokio::spawn(async move { producer.put(b"c".to_vec(), true, 0.0, None, false).await });

		tokio::time::sleep(Duration::from_millis(200)).await;
		let got = queue.get(true, 0.0, None).await.expect("get a").expect("some");
		assert_eq!(got, b"a");

		blocked_put.await.expect("join").expect("put c");
		assert_eq!(queue.qsize().await.expect("qsize"), 2);

		queue.delete().await.expect("delete");
	}

	#[tokio::test]
	async fn delete_then_operations_fail() {
		let queue = fresh_queue("p10").await;
		queue.create(None).await.expect("create");
		queue.delete().await.expect("delete");

		let err = queue.qsize().await.expect_err("must not exist");
		assert!(matches!(err, PressureError::DoesNotExist(_)));
	}
}
