use pressure_queue::queue::PressureQueue;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt::init();

	let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
	let queue = PressureQueue::connect(&redis_url, "demo").await?;

	if !queue.exists().await? {
		queue.create(Some(16)).await?;
	}

	queue.put(b"hello".to_vec(), true, 0.0, None, false).await?;
	queue.put(b"world".to_vec(), true, 0.0, None, false).await?;

	while let Some(payload) = queue.get(true, 1.0, None).await? {
		println!("got {} bytes: {:?}", payload.len(), String::from_utf8_lossy(&payload));
		if queue.qsize().await? == 0 {
			break;
		}
	}

	Ok(())
}
