use crate::config::Config as WorkerConfig;
use crate::error::PressureError as WorkerPoolError;
use crate::queue::PressureQueue;
use crate::worker::{PayloadResult, PayloadStatus, Worker};
use prometheus::{Counter, Gauge, Registry};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A single-consumer pool: exactly one [`PressureQueue::get`] loop feeds
/// `num_workers` processing tasks round-robin. This is not multi-consumer
/// fan-out against the queue itself — only one role-lock holder ever
/// exists, matching the at-most-one-consumer invariant.
pub struct WorkerPool {
	config: WorkerConfig,
	queue: Arc<PressureQueue>,
	registry: Registry,
	active_workers: Counter,
	queue_size: Gauge,
	task_counter: Counter,
	error_counter: Counter,
}

impl WorkerPool {
	pub fn new(queue: PressureQueue, config: WorkerConfig, registry: Registry) -> Result<Self, WorkerPoolError> {
		let active_workers = Counter::new("worker_pool_active_workers", "Number of active workers")?;
		let queue_size = Gauge::new("worker_pool_queue_size", "Current queue size")?;
		let task_counter = Counter::new("worker_pool_tasks_processed", "Total payloads processed")?;
		let error_counter = Counter::new("worker_pool_task_errors", "Total payload processing errors")?;

		registry.register(Box::new(active_workers.clone()))?;
		registry.register(Box::new(queue_size.clone()))?;
		registry.register(Box::new(task_counter.clone()))?;
		registry.register(Box::new(error_counter.clone()))?;

		Ok(Self {
			config,
			queue: Arc::new(queue),
			registry,
			active_workers,
			queue_size,
			task_counter,
			error_counter,
		})
	}

	#[must_use]
	pub fn registry(&self) -> &Registry {
		&self.registry
	}

	pub async fn start(&self) -> Result<(), WorkerPoolError> {
		let (result_tx, mut result_rx) = mpsc::channel(100);
		let mut payload_txs = Vec::with_capacity(self.config.num_workers);

		for id in 0..self.config.num_workers {
			let (payload_tx, payload_rx) = mpsc::channel(1);
			let worker = Worker::new(id, self.config.clone());
			let worker_result_tx = result_tx.clone();

			tokio::spawn(async move {
				let _ = worker.run(payload_rx, worker_result_tx).await;
			});

			payload_txs.push(payload_tx);
			self.active_workers.inc();
		}
		drop(result_tx);

		let dispatch_queue = Arc::clone(&self.queue);
		tokio::spawn(async move {
			let mut next_worker = 0usize;
			loop {
				let payload = match dispatch_queue.get(true, 0.0, Some(true)).await {
					Ok(payload) => payload,
					Err(e) => {
						tracing::debug!(queue = %dispatch_queue.name(), error = %e, "worker pool dispatcher stopping");
						return;
					}
				};
				let Some(payload) = payload else {
					return;
				};

				let tx = &payload_txs[next_worker % payload_txs.len()];
				if tx.send(payload).await.is_err() {
					return;
				}
				next_worker = next_worker.wrapping_add(1);
			}
		});

		while let Some(result) = result_rx.recv().await {
			self.handle_payload_result(result).await;
		}

		Ok(())
	}

	async fn handle_payload_result(&self, result: PayloadResult) {
		self.task_counter.inc();

		if let Ok(size) = self.queue.qsize().await {
			self.queue_size.set(size as f64);
		}

		match result.status {
			PayloadStatus::Success => {}
			PayloadStatus::Failed { error } => {
				self.error_counter.inc();
				tracing::warn!(worker = result.worker_id, %error, "payload processing failed");
			}
			PayloadStatus::TimedOut => {
				self.error_counter.inc();
				tracing::warn!(worker = result.worker_id, "payload processing timed out");
			}
		}
	}
}
