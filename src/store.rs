//! Thin capability surface over a `redis::Connection`.
//!
//! Every method here maps to exactly one of the primitives enumerated in
//! the external-interfaces contract: atomic set-if-absent, list
//! push/pop/length/range/trim/remove, blocking pop over one or more keys
//! with a timeout, and counter increment. `PressureQueue` never talks to
//! `redis` directly — it only ever calls through `Store`.

use crate::error::PressureError;
use redis::{Client, Commands};
use std::sync::{Arc, Mutex};

/// The value pushed onto a semaphore list to represent one permit.
pub const PERMIT: &[u8] = b"0";

#[derive(Clone)]
pub struct Store {
	conn: Arc<Mutex<redis::Connection>>,
}

impl Store {
	/// # Errors
	/// Returns an error if the Redis URL is invalid or the connection
	/// cannot be established.
	pub fn new(redis_url: &str) -> Result<Self, PressureError> {
		let client = Client::open(redis_url)?;
		let conn = client.get_connection()?;
		Ok(Self { conn: Arc::new(Mutex::new(conn)) })
	}

	async fn with_conn<F, T>(&self, f: F) -> Result<T, PressureError>
	where
		F: FnOnce(&mut redis::Connection) -> redis::RedisResult<T> + Send + 'static,
		T: Send + 'static,
	{
		let conn = Arc::clone(&self.conn);
		tokio::task::spawn_blocking(move || {
			let mut guard = conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
			f(&mut guard)
		})
		.await
		.map_err(|e| PressureError::Internal(format!("redis task panicked: {e}")))?
		.map_err(PressureError::from)
	}

	pub async fn set_nx(&self, key: String, value: i64) -> Result<bool, PressureError> {
		self.with_conn(move |conn| conn.set_nx(key, value)).await
	}

	pub async fn get_int(&self, key: String) -> Result<Option<i64>, PressureError> {
		self.with_conn(move |conn| conn.get(key)).await
	}

	pub async fn get_string(&self, key: String) -> Result<Option<String>, PressureError> {
		self.with_conn(move |conn| conn.get(key)).await
	}

	pub async fn set_string(&self, key: String, value: String) -> Result<(), PressureError> {
		self.with_conn(move |conn| conn.set(key, value)).await
	}

	pub async fn exists(&self, key: String) -> Result<bool, PressureError> {
		self.with_conn(move |conn| conn.exists(key)).await
	}

	pub async fn del(&self, keys: Vec<String>) -> Result<(), PressureError> {
		self.with_conn(move |conn| conn.del(keys)).await
	}

	pub async fn incr_by(&self, key: String, delta: i64) -> Result<(), PressureError> {
		self.with_conn(move |conn| conn.incr(key, delta)).await
	}

	/// Head-push one or more byte strings, returning the list's new length.
	pub async fn lpush(&self, key: String, items: Vec<Vec<u8>>) -> Result<i64, PressureError> {
		self.with_conn(move |conn| conn.lpush(key, items)).await
	}

	/// Tail-pop one element, non-blocking.
	pub async fn rpop(&self, key: String) -> Result<Option<Vec<u8>>, PressureError> {
		self.with_conn(move |conn| conn.rpop(key, None)).await
	}

	pub async fn llen(&self, key: String) -> Result<i64, PressureError> {
		self.with_conn(move |conn| conn.llen(key)).await
	}

	pub async fn lrange(&self, key: String, start: isize, stop: isize) -> Result<Vec<Vec<u8>>, PressureError> {
		self.with_conn(move |conn| conn.lrange(key, start, stop)).await
	}

	pub async fn ltrim(&self, key: String, start: isize, stop: isize) -> Result<(), PressureError> {
		self.with_conn(move |conn| conn.ltrim(key, start, stop)).await
	}

	pub async fn lrem(&self, key: String, count: isize, value: Vec<u8>) -> Result<(), PressureError> {
		self.with_conn(move |conn| conn.lrem(key, count, value)).await
	}

	/// Blocking tail-pop of the first non-empty key in `keys`. Returns the
	/// key that woke and the popped value, or `None` if `timeout_secs`
	/// elapsed with nothing available. `timeout_secs == 0.0` blocks
	/// indefinitely, matching `BRPOP`'s own zero-timeout convention.
	pub async fn brpop(&self, keys: Vec<String>, timeout_secs: f64) -> Result<Option<(String, Vec<u8>)>, PressureError> {
		self.with_conn(move |conn| conn.brpop(keys, timeout_secs)).await
	}

	/// Atomic tail-pop from `src` + head-push into `dst`, blocking on `src`.
	pub async fn brpoplpush(&self, src: String, dst: String, timeout_secs: f64) -> Result<Option<Vec<u8>>, PressureError> {
		self.with_conn(move |conn| conn.brpoplpush(src, dst, timeout_secs)).await
	}
}
