use std::num::TryFromIntError;
use std::time::SystemTimeError;
use thiserror::Error;

/// The role a client was holding when an `InUse` conflict was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	Producer,
	Consumer,
}

impl std::fmt::Display for Role {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Producer => write!(f, "producer"),
			Self::Consumer => write!(f, "consumer"),
		}
	}
}

#[derive(Error, Debug)]
pub enum PressureError {
	#[error("queue '{0}' already exists")]
	AlreadyExists(String),

	#[error("queue '{0}' does not exist")]
	DoesNotExist(String),

	#[error("queue '{0}' is closed")]
	Closed(String),

	#[error("queue '{0}' is full")]
	Full(String),

	#[error("{role} '{user}' has a lock on queue '{name}'")]
	InUse { name: String, user: String, role: Role },

	#[error("operation on queue '{0}' was unblocked")]
	Unblocked(String),

	#[error("operation on queue '{0}' timed out")]
	TimedOut(String),

	#[error("redis error: {0}")]
	Redis(#[from] redis::RedisError),

	#[error("prometheus error: {0}")]
	Prometheus(#[from] prometheus::Error),

	#[error("json error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("conversion error: {0}")]
	Conversion(String),

	#[error("internal error: {0}")]
	Internal(String),
}

impl From<SystemTimeError> for PressureError {
	fn from(error: SystemTimeError) -> Self {
		Self::Internal(format!("system time error: {error}"))
	}
}

impl From<TryFromIntError> for PressureError {
	fn from(error: TryFromIntError) -> Self {
		Self::Conversion(format!("integer conversion error: {error}"))
	}
}
