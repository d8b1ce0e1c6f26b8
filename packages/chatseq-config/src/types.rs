use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	#[serde(default)]
	pub sequence: Sequence,
	#[serde(default)]
	pub reconcile: Reconcile,
	#[serde(default)]
	pub indexing: Indexing,
	#[serde(default)]
	pub worker: Worker,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub limits: Limits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	#[serde(default)]
	pub redis: Redis,
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Redis {
	/// Optional. When absent the counters live in process memory, which is only safe for a
	/// single API process.
	pub url: Option<String>,
	#[serde(default = "default_redis_op_timeout_ms")]
	pub op_timeout_ms: u64,
}
impl Default for Redis {
	fn default() -> Self {
		Self { url: None, op_timeout_ms: default_redis_op_timeout_ms() }
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Sequence {
	/// Extra attempts a creation gets after its number collided with a stored row.
	pub conflict_retries: u32,
}
impl Default for Sequence {
	fn default() -> Self {
		Self { conflict_retries: 2 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Reconcile {
	pub delay_seconds: u64,
	pub sweep_interval_seconds: u64,
	pub max_attempts: u32,
}
impl Default for Reconcile {
	fn default() -> Self {
		Self { delay_seconds: 300, sweep_interval_seconds: 3_600, max_attempts: 3 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Indexing {
	pub max_attempts: u32,
}
impl Default for Indexing {
	fn default() -> Self {
		Self { max_attempts: 5 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Worker {
	pub concurrency: u32,
	pub poll_interval_ms: u64,
	pub lease_seconds: i64,
	pub base_backoff_ms: i64,
	pub max_backoff_ms: i64,
}
impl Default for Worker {
	fn default() -> Self {
		Self {
			concurrency: 4,
			poll_interval_ms: 500,
			lease_seconds: 30,
			base_backoff_ms: 500,
			max_backoff_ms: 30_000,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Search {
	pub max_results: u32,
}
impl Default for Search {
	fn default() -> Self {
		Self { max_results: 100 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
	pub max_body_chars: u32,
	pub max_name_chars: u32,
	pub max_per_page: u32,
}
impl Default for Limits {
	fn default() -> Self {
		Self { max_body_chars: 5_000, max_name_chars: 255, max_per_page: 100 }
	}
}

fn default_redis_op_timeout_ms() -> u64 {
	1_000
}
