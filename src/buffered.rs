//! A `PressureQueue` wrapper that drains into a local bounded channel in
//! the background, so a consumer never blocks on the network round trip
//! to Redis for each element.

use crate::queue::PressureQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Wraps a [`PressureQueue`] with a background drainer feeding a bounded
/// local channel. On any error from the underlying queue (including the
/// queue closing), the drainer exits silently and the channel closes —
/// `recv()` then returns `None`, same as any other closed `mpsc` channel.
pub struct BufferedQueue {
	receiver: tokio::sync::Mutex<mpsc::Receiver<Vec<u8>>>,
	buffered: Arc<AtomicUsize>,
	drainer: JoinHandle<()>,
}

impl BufferedQueue {
	/// Spawns the background drainer immediately.
	#[must_use]
	pub fn new(raw: PressureQueue, buffer_size: usize) -> Self {
		let (tx, rx) = mpsc::channel(buffer_size.max(1));
		let buffered = Arc::new(AtomicUsize::new(0));
		let drainer = tokio::spawn(Self::listen(raw, tx, Arc::clone(&buffered)));

		Self {
			receiver: tokio::sync::Mutex::new(rx),
			buffered,
			drainer,
		}
	}

	async fn listen(raw: PressureQueue, tx: mpsc::Sender<Vec<u8>>, buffered: Arc<AtomicUsize>) {
		loop {
			let item = match raw.get(true, 0.0, Some(true)).await {
				Ok(item) => item,
				Err(e) => {
					debug!(queue = %raw.name(), error = %e, "buffered drainer stopping");
					return;
				}
			};
			let Some(item) = item else {
				return;
			};

			buffered.fetch_add(1, Ordering::AcqRel);
			if tx.send(item).await.is_err() {
				return;
			}
			buffered.fetch_sub(1, Ordering::AcqRel);
		}
	}

	/// Receives the next buffered element, or `None` once the source
	/// queue has closed (or deleted) and the buffer is drained.
	pub async fn get(&self) -> Option<Vec<u8>> {
		self.receiver.lock().await.recv().await
	}

	/// Approximate number of elements currently sitting in the local
	/// buffer (not yet received by the caller).
	#[must_use]
	pub fn buffered(&self) -> usize {
		self.buffered.load(Ordering::Acquire)
	}
}

impl Drop for BufferedQueue {
	fn drop(&mut self) {
		self.drainer.abort();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn redis_url() -> String {
		std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string())
	}

	#[tokio::test]
	async fn drains_produced_items_in_order() {
		let raw = PressureQueue::connect_with_prefix(&redis_url(), "pressure_test", "buf1").await.expect("connect");
		let _ = raw.delete().await;
		raw.create(None).await.expect("create");

		raw.put(b"one".to_vec(), true, 0.0, None, false).await.expect("put one");
		raw.put(b"two".to_vec(), true, 0.0, None, false).await.expect("put two");

		let buffered = BufferedQueue::new(raw.clone(), 8);
		assert_eq!(buffered.get().await, Some(b"one".to_vec()));
		assert_eq!(buffered.get().await, Some(b"two".to_vec()));

		raw.delete().await.expect("delete");
	}

	#[tokio::test]
	async fn closed_queue_ends_the_buffer() {
		let raw = PressureQueue::connect_with_prefix(&redis_url(), "pressure_test", "buf2").await.expect("connect");
		let _ = raw.delete().await;
		raw.create(None).await.expect("create");
		raw.close().await.expect("close");

		let buffered = BufferedQueue::new(raw.clone(), 8);
		assert_eq!(buffered.get().await, None);

		raw.delete().await.expect("delete");
	}
}
