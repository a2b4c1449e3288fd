use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Parser, Clone, Debug, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
pub struct Config {
	#[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1/", help = "Redis connection URL")]
	pub redis_url: String,

	#[arg(long, env = "PRESSURE_QUEUE_PREFIX", default_value = "__pressure__", help = "Key prefix shared by all queues")]
	pub prefix: String,

	#[arg(long, env = "WORKER_POOL_SIZE", default_value = "4", help = "Number of worker tasks processing dequeued payloads")]
	pub num_workers: usize,

	#[arg(
        long,
        env = "TASK_TIMEOUT_SECS",
        default_value = "300",
        value_parser = parse_duration,
        help = "Per-payload processing timeout in seconds"
    )]
	pub task_timeout: Duration,

	#[arg(
        long,
        env = "UNBLOCK_POLL_INTERVAL_SECS",
        default_value = "1",
        value_parser = parse_duration,
        help = "How often an unblockable wait re-polls the store"
    )]
	pub unblock_poll_interval: Duration,
}

impl Config {
	pub fn new() -> Self {
		Self::parse()
	}

	pub fn default() -> Self {
		Self {
			redis_url: "redis://127.0.0.1/".to_string(),
			prefix: "__pressure__".to_string(),
			num_workers: 4,
			task_timeout: Duration::from_secs(300),
			unblock_poll_interval: Duration::from_secs(1),
		}
	}

	#[cfg(test)]
	pub fn test() -> Self {
		Self {
			redis_url: "redis://127.0.0.1/".to_string(),
			prefix: "pressure_test".to_string(),
			num_workers: 1,
			task_timeout: Duration::from_secs(5),
			unblock_poll_interval: Duration::from_millis(100),
		}
	}
}

fn parse_duration(s: &str) -> Result<Duration, std::num::ParseIntError> {
	s.parse::<u64>().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_config() {
		let config = Config::default();
		assert_eq!(config.redis_url, "redis://127.0.0.1/");
		assert_eq!(config.prefix, "__pressure__");
		assert_eq!(config.num_workers, 4);
		assert_eq!(config.task_timeout, Duration::from_secs(300));
		assert_eq!(config.unblock_poll_interval, Duration::from_secs(1));
	}

	#[test]
	fn test_parse_duration() {
		assert_eq!(parse_duration("60").unwrap(), Duration::from_secs(60));
		assert!(parse_duration("invalid").is_err());
	}

	#[test]
	fn test_config_parser() {
		let args = vec![
			"program",
			"--redis-url",
			"redis://example/",
			"--prefix",
			"myapp",
			"--num-workers",
			"8",
			"--task-timeout-secs",
			"600",
			"--unblock-poll-interval-secs",
			"2",
		];

		let config = Config::try_parse_from(args).unwrap();
		assert_eq!(config.redis_url, "redis://example/");
		assert_eq!(config.prefix, "myapp");
		assert_eq!(config.num_workers, 8);
		assert_eq!(config.task_timeout, Duration::from_secs(600));
		assert_eq!(config.unblock_poll_interval, Duration::from_secs(2));
	}
}
