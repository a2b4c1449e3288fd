use crate::config::Config as WorkerConfig;
use crate::error::PressureError as WorkerError;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub enum PayloadStatus {
	Success,
	Failed { error: String },
	TimedOut,
}

#[derive(Debug, Clone)]
pub struct PayloadResult {
	pub worker_id: usize,
	pub payload_len: usize,
	pub status: PayloadStatus,
	pub execution_time: Duration,
	pub completed_at: SystemTime,
}

/// One processing slot in a [`crate::pool::WorkerPool`]. Receives payloads
/// dequeued by the pool's single consumer loop and reports a
/// [`PayloadResult`] for each, subject to `config.task_timeout`.
pub struct Worker {
	id: usize,
	config: WorkerConfig,
}

impl Worker {
	#[must_use]
	pub fn new(id: usize, config: WorkerConfig) -> Self {
		Self { id, config }
	}

	pub async fn run(&self, mut payload_rx: mpsc::Receiver<Vec<u8>>, result_tx: mpsc::Sender<PayloadResult>) -> Result<(), WorkerError> {
		while let Some(payload) = payload_rx.recv().await {
			let start_time = SystemTime::now();
			let payload_len = payload.len();

			let status = tokio::select! {
				() = sleep(self.config.task_timeout) => PayloadStatus::TimedOut,
				result = self.process(&payload) => match result {
					Ok(()) => PayloadStatus::Success,
					Err(e) => PayloadStatus::Failed { error: e.to_string() },
				},
			};

			let result = PayloadResult {
				worker_id: self.id,
				payload_len,
				status,
				execution_time: start_time.elapsed()?,
				completed_at: SystemTime::now(),
			};

			if result_tx.send(result).await.is_err() {
				return Err(WorkerError::Internal("result channel closed".to_string()));
			}
		}

		Ok(())
	}

	async fn process(&self, payload: &[u8]) -> Result<(), WorkerError> {
		// Actual payload handling is supplied by the embedding application;
		// this is a placeholder that simulates work proportional to size.
		tracing::debug!(worker = self.id, bytes = payload.len(), "processing payload");
		sleep(Duration::from_millis(1)).await;
		Ok(())
	}
}
