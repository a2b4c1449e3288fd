use pressure_queue::config::Config;
use pressure_queue::pool::WorkerPool;
use pressure_queue::queue::PressureQueue;
use prometheus::Registry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt::init();

	let config = Config::new();
	let registry = Registry::new();

	let queue = PressureQueue::connect_with_prefix(&config.redis_url, &config.prefix, "jobs").await?;
	if !queue.exists().await? {
		queue.create(Some(1000)).await?;
	}

	let pool = WorkerPool::new(queue, config, registry)?;
	pool.start().await?;

	Ok(())
}
