//! Sequence allocation and the background consistency machinery around it.
//!
//! Children of an application (chats) and of a chat (messages) are numbered from a fast counter
//! store. Denormalized counts and the message search index are derived state that background
//! jobs bring back in line with Postgres.

pub mod allocator;
pub mod counter;
pub mod create;
pub mod events;
pub mod indexing;
pub mod read;
pub mod reconcile;
pub mod rfc3339;
pub mod search;

mod error;

pub use allocator::{Allocation, AllocationPath};
pub use counter::{MemoryCounterStore, UnavailableCounterStore, connect_counter_store};
pub use create::{CreateApplicationRequest, CreateMessageRequest, UpdateApplicationRequest};
pub use error::{Error, Result};
pub use events::CreationEvent;
pub use indexing::{DeadIndexingJob, IndexOutcome};
pub use read::{ApplicationView, ChatView, MessageView, PageRequest, Paged};
pub use reconcile::ReconcileOutcome;
pub use search::{SearchHit, SearchResponse};

use std::{future::Future, pin::Pin, sync::Arc};

use chatseq_config::Config;
use chatseq_storage::{
	counter::RedisCounterStore,
	db::Db,
	qdrant::{MessageDocument, QdrantStore, ScoredDocument},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Atomic integer store that hands out sequence numbers.
///
/// Every failure is reported as [`Error::CounterStoreUnavailable`].
pub trait CounterStore
where
	Self: Send + Sync,
{
	/// Increments `key` and returns the new value. A missing key counts from zero.
	fn increment<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<i64>>;

	/// Sets `key` to zero when absent. Returns whether the key was created.
	fn init<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>>;

	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<i64>>>;

	/// Raises `key` to at least `value` and returns the resulting value. Never lowers a counter.
	fn raise<'a>(&'a self, key: &'a str, value: i64) -> BoxFuture<'a, Result<i64>>;

	/// Whether every process sees the same counters.
	fn is_shared(&self) -> bool {
		true
	}
}

/// Full-text index over message bodies. Answers across every chat.
pub trait SearchIndex
where
	Self: Send + Sync,
{
	/// Inserts or replaces the document stored under its message id.
	fn upsert<'a>(
		&'a self,
		doc: &'a MessageDocument,
	) -> BoxFuture<'a, chatseq_storage::Result<()>>;

	fn query<'a>(
		&'a self,
		text: &'a str,
		limit: u64,
	) -> BoxFuture<'a, chatseq_storage::Result<Vec<ScoredDocument>>>;
}

pub struct ChatService {
	pub cfg: Config,
	pub db: Db,
	pub counters: Arc<dyn CounterStore>,
	pub index: Arc<dyn SearchIndex>,
}
impl ChatService {
	pub fn new(
		cfg: Config,
		db: Db,
		counters: Arc<dyn CounterStore>,
		index: Arc<dyn SearchIndex>,
	) -> Self {
		Self { cfg, db, counters, index }
	}
}

impl CounterStore for RedisCounterStore {
	fn increment<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<i64>> {
		Box::pin(async move { Ok(RedisCounterStore::increment(self, key).await?) })
	}

	fn init<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { Ok(RedisCounterStore::init(self, key).await?) })
	}

	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<i64>>> {
		Box::pin(async move { Ok(RedisCounterStore::get(self, key).await?) })
	}

	fn raise<'a>(&'a self, key: &'a str, value: i64) -> BoxFuture<'a, Result<i64>> {
		Box::pin(async move { Ok(RedisCounterStore::raise(self, key, value).await?) })
	}
}

impl SearchIndex for QdrantStore {
	fn upsert<'a>(
		&'a self,
		doc: &'a MessageDocument,
	) -> BoxFuture<'a, chatseq_storage::Result<()>> {
		Box::pin(self.upsert_message(doc))
	}

	fn query<'a>(
		&'a self,
		text: &'a str,
		limit: u64,
	) -> BoxFuture<'a, chatseq_storage::Result<Vec<ScoredDocument>>> {
		Box::pin(self.query_messages(text, limit))
	}
}
