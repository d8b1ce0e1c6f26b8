use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use chatseq_storage::{models::IndexingOutboxEntry, outbox, qdrant::MessageDocument, queries};

use crate::{ChatService, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
	Indexed,
	/// The message is not visible in Postgres. Nothing to index and nothing to retry.
	Skipped,
}

/// Indexing job the worker gave up on.
#[derive(Debug, Clone, Serialize)]
pub struct DeadIndexingJob {
	pub outbox_id: Uuid,
	pub message_id: Uuid,
	pub attempts: i32,
	pub last_error: Option<String>,
	#[serde(with = "crate::rfc3339")]
	pub updated_at: OffsetDateTime,
}
impl From<IndexingOutboxEntry> for DeadIndexingJob {
	fn from(entry: IndexingOutboxEntry) -> Self {
		Self {
			outbox_id: entry.outbox_id,
			message_id: entry.message_id,
			attempts: entry.attempts,
			last_error: entry.last_error,
			updated_at: entry.updated_at,
		}
	}
}

impl ChatService {
	/// Loads `message_id` and writes it to the search index.
	pub async fn index_message(&self, message_id: Uuid) -> Result<IndexOutcome> {
		let message = queries::fetch_message(&self.db, message_id)
			.await
			.map_err(|err| Error::IndexingFailed { message: err.to_string(), retryable: true })?;
		let Some(message) = message else {
			tracing::info!(%message_id, "Message not found. Skipping indexing.");

			return Ok(IndexOutcome::Skipped);
		};

		self.index_document(&MessageDocument::from(&message)).await?;

		Ok(IndexOutcome::Indexed)
	}

	/// Upserts `doc` under its message id. Repeated calls leave a single document.
	pub async fn index_document(&self, doc: &MessageDocument) -> Result<()> {
		self.index
			.upsert(doc)
			.await
			.map_err(|err| Error::IndexingFailed { message: err.to_string(), retryable: true })
	}

	/// Most recently abandoned indexing jobs first.
	pub async fn dead_indexing_jobs(&self, limit: i64) -> Result<Vec<DeadIndexingJob>> {
		let jobs = outbox::list_dead_indexing_jobs(&self.db, limit).await?;

		Ok(jobs.into_iter().map(DeadIndexingJob::from).collect())
	}
}
