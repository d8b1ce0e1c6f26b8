//! Counter store selection and the in-process [`CounterStore`] implementations.

use std::sync::{Arc, Mutex};

use ahash::AHashMap;

use chatseq_storage::counter::RedisCounterStore;

use crate::{BoxFuture, CounterStore, Error, Result};

/// Picks the counter store for this process.
///
/// No URL selects in-process counters. A Redis server that cannot be reached at startup yields an
/// [`UnavailableCounterStore`], so numbering runs on the durable fallback instead of failing.
pub async fn connect_counter_store(cfg: &chatseq_config::Redis) -> Arc<dyn CounterStore> {
	let Some(url) = cfg.url.as_deref() else {
		tracing::warn!("No counter store configured. Counting in process memory.");

		return Arc::new(MemoryCounterStore::new());
	};

	match RedisCounterStore::connect(cfg, url).await {
		Ok(store) => Arc::new(store),
		Err(err) => {
			tracing::error!(
				error = %err,
				"Counter store unreachable. Sequence numbers will come from Postgres."
			);

			Arc::new(UnavailableCounterStore::new(err.to_string()))
		},
	}
}

/// Counters held in process memory. Correct only while a single process allocates numbers.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
	counters: Mutex<AHashMap<String, i64>>,
}
impl MemoryCounterStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Drops every counter, as a flushed cache would.
	pub fn clear(&self) {
		self.counters.lock().unwrap_or_else(|err| err.into_inner()).clear();
	}

	fn with<T>(&self, f: impl FnOnce(&mut AHashMap<String, i64>) -> T) -> T {
		let mut counters = self.counters.lock().unwrap_or_else(|err| err.into_inner());

		f(&mut counters)
	}
}
impl CounterStore for MemoryCounterStore {
	fn increment<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<i64>> {
		let value = self.with(|counters| {
			let slot = counters.entry(key.to_string()).or_insert(0);

			*slot += 1;

			*slot
		});

		Box::pin(async move { Ok(value) })
	}

	fn init<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>> {
		let created = self.with(|counters| {
			if counters.contains_key(key) {
				return false;
			}

			counters.insert(key.to_string(), 0);

			true
		});

		Box::pin(async move { Ok(created) })
	}

	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<i64>>> {
		let value = self.with(|counters| counters.get(key).copied());

		Box::pin(async move { Ok(value) })
	}

	fn raise<'a>(&'a self, key: &'a str, value: i64) -> BoxFuture<'a, Result<i64>> {
		let current = self.with(|counters| {
			let slot = counters.entry(key.to_string()).or_insert(0);

			*slot = (*slot).max(value);

			*slot
		});

		Box::pin(async move { Ok(current) })
	}

	fn is_shared(&self) -> bool {
		false
	}
}

/// Stand-in used when the counter store cannot be reached. Every call fails, which sends the
/// allocator down its durable fallback.
#[derive(Debug, Clone)]
pub struct UnavailableCounterStore {
	reason: String,
}
impl UnavailableCounterStore {
	pub fn new(reason: impl Into<String>) -> Self {
		Self { reason: reason.into() }
	}

	fn fail<T>(&self) -> Result<T> {
		Err(Error::CounterStoreUnavailable { message: self.reason.clone() })
	}
}
impl CounterStore for UnavailableCounterStore {
	fn increment<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<i64>> {
		Box::pin(async move { self.fail() })
	}

	fn init<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { self.fail() })
	}

	fn get<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<Option<i64>>> {
		Box::pin(async move { self.fail() })
	}

	fn raise<'a>(&'a self, _key: &'a str, _value: i64) -> BoxFuture<'a, Result<i64>> {
		Box::pin(async move { self.fail() })
	}
}
