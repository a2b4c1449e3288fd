//! A `PressureQueue` wrapper guaranteeing at-least-once delivery: an
//! element moved out of the queue lands in a `:processing` sidecar list
//! until [`ReliableQueue::confirm`] removes it, so a crashed consumer's
//! in-flight element is recoverable by the next consumer that connects.

use crate::error::PressureError;
use crate::keys::QueueKeys;
use crate::queue::PressureQueue;
use crate::store::Store;
use tokio::sync::Mutex;

const PROCESSING_SUFFIX: &str = "processing";

/// Wraps a [`PressureQueue`], adding a single-slot `:processing` sidecar
/// list. After [`ReliableQueue::get`], the caller must call
/// [`ReliableQueue::confirm`] once the element is durably processed;
/// until then the element remains visible in the sidecar list for
/// recovery by a subsequent consumer.
///
/// `get`/`confirm` bypass the core's role-lock/closed/counter protocol
/// entirely and operate straight on the queue's underlying list, the
/// same way the wrapped protocol's own reliable variant overrides `get`
/// rather than layering on top of it.
pub struct ReliableQueue {
	raw: PressureQueue,
	store: Store,
	queue_key: String,
	processing_key: String,
	/// The most recently returned element, tracked so the `next()`
	/// iteration helper can auto-confirm it before fetching another.
	last: Mutex<Option<Vec<u8>>>,
}

impl ReliableQueue {
	#[must_use]
	pub fn new(raw: PressureQueue, store: Store, keys: &QueueKeys) -> Self {
		let processing_key = format!("{}:{PROCESSING_SUFFIX}", keys.queue);
		Self {
			raw,
			store,
			queue_key: keys.queue.clone(),
			processing_key,
			last: Mutex::new(None),
		}
	}

	/// Sum of the main list and the `:processing` sidecar list.
	///
	/// # Errors
	/// Returns an error if the underlying queue does not exist or the
	/// store is unreachable.
	pub async fn qsize(&self) -> Result<u64, PressureError> {
		let main = self.raw.qsize().await?;
		let processing = self.store.llen(self.processing_key.clone()).await?;
		Ok(main + processing.max(0) as u64)
	}

	/// Returns a previously in-flight element if one exists (recovery
	/// path). Otherwise, the blocking variant atomically moves one
	/// element from the queue straight into `:processing` via
	/// `BRPOPLPUSH`, so a crash between the pop and the move is
	/// impossible; the non-blocking variant is a plain tail-pop with no
	/// move, matching the wrapped protocol's own distinction.
	///
	/// # Errors
	/// Returns an error if the store is unreachable.
	pub async fn get(&self, block: bool, timeout_secs: f64) -> Result<Option<Vec<u8>>, PressureError> {
		if let Some(item) = self.store.rpop(self.processing_key.clone()).await? {
			self.store.lpush(self.processing_key.clone(), vec![item.clone()]).await?;
			return Ok(Some(item));
		}

		if block {
			self.store.brpoplpush(self.queue_key.clone(), self.processing_key.clone(), timeout_secs).await
		} else {
			self.store.rpop(self.queue_key.clone()).await
		}
	}

	/// Marks `element` as fully processed, removing it from the
	/// `:processing` sidecar list and re-asserting backpressure slack if
	/// the combined size has dropped back under the queue's bound.
	///
	/// # Errors
	/// Returns an error if the store is unreachable.
	pub async fn confirm(&self, element: &[u8]) -> Result<(), PressureError> {
		self.store.lrem(self.processing_key.clone(), 1, element.to_vec()).await?;

		if let Some(bound) = self.raw.cached_bound() {
			if self.qsize().await? < bound {
				self.raw.assert_not_full().await?;
			}
		}

		Ok(())
	}

	/// Confirms the previously returned element (if any), then fetches
	/// the next one — the generator-with-auto-confirm idiom from the
	/// wrapped protocol.
	///
	/// # Errors
	/// Any error [`ReliableQueue::get`] or [`ReliableQueue::confirm`] can
	/// return.
	pub async fn next(&self) -> Result<Option<Vec<u8>>, PressureError> {
		let mut last = self.last.lock().await;
		if let Some(prev) = last.take() {
			self.confirm(&prev).await?;
		}

		let item = self.get(true, 0.0).await?;
		*last = item.clone();
		Ok(item)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn redis_url() -> String {
		std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string())
	}

	async fn fresh(name: &str) -> (PressureQueue, Store, QueueKeys) {
		fresh_with_bound(name, None).await
	}

	async fn fresh_with_bound(name: &str, bound: Option<u64>) -> (PressureQueue, Store, QueueKeys) {
		let store = Store::new(&redis_url()).expect("store");
		let keys = QueueKeys::new("pressure_test", name);
		let raw = PressureQueue::connect_with_prefix(&redis_url(), "pressure_test", name).await.expect("connect");
		let _ = raw.delete().await;
		raw.create(bound).await.expect("create");
		(raw, store, keys)
	}

	#[tokio::test]
	async fn get_then_confirm_clears_processing() {
		let (raw, store, keys) = fresh("rel1").await;
		raw.put(b"payload".to_vec(), true, 0.0, None, false).await.expect("put");

		let reliable = ReliableQueue::new(raw.clone(), store, &keys);
		let got = reliable.get(true, 0.0).await.expect("get").expect("some");
		assert_eq!(got, b"payload");
		assert_eq!(reliable.qsize().await.expect("qsize"), 1);

		reliable.confirm(&got).await.expect("confirm");
		assert_eq!(reliable.qsize().await.expect("qsize"), 0);

		raw.delete().await.expect("delete");
	}

	#[tokio::test]
	async fn unconfirmed_element_is_recoverable() {
		let (raw, store, keys) = fresh("rel2").await;
		raw.put(b"crash-me".to_vec(), true, 0.0, None, false).await.expect("put");

		let reliable = ReliableQueue::new(raw.clone(), store, &keys);
		let first = reliable.get(true, 0.0).await.expect("get").expect("some");
		assert_eq!(first, b"crash-me");

		// Simulate a new consumer reconnecting without confirming.
		let recovered = reliable.get(true, 0.0).await.expect("get again").expect("some");
		assert_eq!(recovered, b"crash-me");

		reliable.confirm(&recovered).await.expect("confirm");
		raw.delete().await.expect("delete");
	}

	#[tokio::test]
	async fn confirm_restores_not_full_permit_for_bounded_queue() {
		let (raw, store, keys) = fresh_with_bound("rel4", Some(1)).await;
		raw.put_nowait(b"a".to_vec(), false).await.expect("put a");

		let reliable = ReliableQueue::new(raw.clone(), store, &keys);
		let got = reliable.get(true, 0.0).await.expect("get").expect("some");
		assert_eq!(got, b"a");

		let err = raw.put_nowait(b"b".to_vec(), false).await.expect_err("still full while in flight");
		assert!(matches!(err, PressureError::Full(_)));

		reliable.confirm(&got).await.expect("confirm");
		raw.put_nowait(b"b".to_vec(), false).await.expect("slack restored after confirm");

		raw.delete().await.expect("delete");
	}

	#[tokio::test]
	async fn nonblocking_get_does_not_move_into_processing() {
		let (raw, store, keys) = fresh("rel3").await;
		raw.put(b"plain".to_vec(), true, 0.0, None, false).await.expect("put");

		let reliable = ReliableQueue::new(raw.clone(), store, &keys);
		let got = reliable.get(false, 0.0).await.expect("get").expect("some");
		assert_eq!(got, b"plain");

		// Nothing was moved into :processing, so qsize reflects just the
		// main queue — which is now empty — not a phantom processing entry.
		assert_eq!(reliable.qsize().await.expect("qsize"), 0);

		raw.delete().await.expect("delete");
	}
}
