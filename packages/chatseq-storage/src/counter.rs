use std::{future::Future, time::Duration};

use redis::{Script, aio::ConnectionManager};

use crate::{Error, Result};

// Raises KEYS[1] to ARGV[1] and never lowers it. Returns the resulting value.
const RAISE_SCRIPT: &str = r"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
local target = tonumber(ARGV[1])
if target > current then
	redis.call('SET', KEYS[1], target)
	return target
end
return current
";

/// Redis-backed sequence counters. Every call is bounded by the configured operation timeout so
/// an unreachable server surfaces as an error instead of stalling the caller.
#[derive(Clone)]
pub struct RedisCounterStore {
	manager: ConnectionManager,
	op_timeout_ms: u64,
	raise: Script,
}
impl RedisCounterStore {
	pub async fn connect(cfg: &chatseq_config::Redis, url: &str) -> Result<Self> {
		let client = redis::Client::open(url)?;
		let op_timeout_ms = cfg.op_timeout_ms;
		let manager = tokio::time::timeout(
			Duration::from_millis(op_timeout_ms),
			ConnectionManager::new(client),
		)
		.await
		.map_err(|_| Error::CounterTimeout(op_timeout_ms))??;

		Ok(Self { manager, op_timeout_ms, raise: Script::new(RAISE_SCRIPT) })
	}

	/// Atomically increments `key` and returns the new value. A missing key counts from zero.
	pub async fn increment(&self, key: &str) -> Result<i64> {
		let mut conn = self.manager.clone();

		self.bounded(redis::cmd("INCR").arg(key).query_async::<i64>(&mut conn)).await
	}

	/// Sets `key` to zero unless it already exists. Returns whether the key was created.
	pub async fn init(&self, key: &str) -> Result<bool> {
		let mut conn = self.manager.clone();
		let mut set_nx = redis::cmd("SET");

		set_nx.arg(key).arg(0).arg("NX");

		let reply = self.bounded(set_nx.query_async::<Option<String>>(&mut conn)).await?;

		Ok(reply.is_some())
	}

	pub async fn get(&self, key: &str) -> Result<Option<i64>> {
		let mut conn = self.manager.clone();

		self.bounded(redis::cmd("GET").arg(key).query_async::<Option<i64>>(&mut conn)).await
	}

	/// Raises `key` to at least `value`. Returns the value the key holds afterwards.
	pub async fn raise(&self, key: &str, value: i64) -> Result<i64> {
		let mut conn = self.manager.clone();
		let mut invocation = self.raise.key(key);

		invocation.arg(value);

		self.bounded(invocation.invoke_async::<i64>(&mut conn)).await
	}

	async fn bounded<T, F>(&self, fut: F) -> Result<T>
	where
		F: Future<Output = redis::RedisResult<T>>,
	{
		match tokio::time::timeout(Duration::from_millis(self.op_timeout_ms), fut).await {
			Ok(result) => Ok(result?),
			Err(_) => Err(Error::CounterTimeout(self.op_timeout_ms)),
		}
	}
}
