//! Durable job queues. Rows move `PENDING -> CLAIMED -> DONE`, or back to `FAILED` with a
//! backoff, or to `DEAD` once the worker gives up. A claim is a lease: an expired `CLAIMED` row
//! is handed out again, so delivery is at-least-once.

use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	db::Db,
	models::{IndexingOutboxEntry, JobStatus, ReconcileOutboxEntry, Scope},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queue {
	Indexing,
	Reconcile,
}
impl Queue {
	fn table(self) -> &'static str {
		match self {
			Self::Indexing => "indexing_outbox",
			Self::Reconcile => "reconcile_outbox",
		}
	}
}

pub async fn enqueue_indexing<'e, E>(
	executor: E,
	message_id: Uuid,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO indexing_outbox (outbox_id, message_id, status, attempts, available_at, created_at, updated_at)
VALUES ($1,$2,'PENDING',0,$3,$3,$3)",
	)
	.bind(Uuid::new_v4())
	.bind(message_id)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

/// Schedules a reconciliation of `scope` at `available_at`. A pending job for the same scope
/// absorbs the request and keeps the earlier of the two run times.
pub async fn schedule_reconcile<'e, E>(
	executor: E,
	scope: Scope,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO reconcile_outbox (outbox_id, scope_kind, scope_id, status, attempts, available_at, created_at, updated_at)
VALUES ($1,$2,$3,'PENDING',0,$4,$5,$5)
ON CONFLICT (scope_kind, scope_id) WHERE status = 'PENDING'
DO UPDATE SET
	available_at = LEAST(reconcile_outbox.available_at, EXCLUDED.available_at),
	updated_at = EXCLUDED.updated_at",
	)
	.bind(Uuid::new_v4())
	.bind(scope.kind())
	.bind(scope.id())
	.bind(available_at)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

/// Schedules an immediate reconciliation for every application and every chat. Returns the
/// number of scopes touched.
pub async fn schedule_sweep(db: &Db, now: OffsetDateTime) -> Result<u64> {
	let mut touched = 0;

	for (kind, source) in [
		("application", "SELECT application_id FROM applications"),
		("chat", "SELECT chat_id FROM chats"),
	] {
		let sql = format!(
			"\
INSERT INTO reconcile_outbox (outbox_id, scope_kind, scope_id, status, attempts, available_at, created_at, updated_at)
SELECT gen_random_uuid(), $1, ids.scope_id, 'PENDING', 0, $2, $2, $2
FROM ({source}) AS ids (scope_id)
ON CONFLICT (scope_kind, scope_id) WHERE status = 'PENDING'
DO UPDATE SET
	available_at = LEAST(reconcile_outbox.available_at, EXCLUDED.available_at),
	updated_at = EXCLUDED.updated_at"
		);
		let result = sqlx::query(&sql).bind(kind).bind(now).execute(&db.pool).await?;

		touched += result.rows_affected();
	}

	Ok(touched)
}

/// Leases the next due indexing job. Taking over a job whose lease expired counts as an attempt.
pub async fn claim_next_indexing_job(
	db: &Db,
	now: OffsetDateTime,
	lease_seconds: i64,
) -> Result<Option<IndexingOutboxEntry>> {
	let mut tx = db.pool.begin().await?;
	let row = sqlx::query_as::<_, IndexingOutboxEntry>(
		"\
SELECT
	outbox_id,
	message_id,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at
FROM indexing_outbox
WHERE status IN ('PENDING','FAILED','CLAIMED') AND available_at <= $1
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let job = match row {
		Some(mut job) => {
			let lease_until = now + time::Duration::seconds(lease_seconds);

			if job.status == JobStatus::Claimed.as_str() {
				job.attempts = job.attempts.saturating_add(1);
			}

			claim(&mut *tx, Queue::Indexing, job.outbox_id, job.attempts, lease_until, now).await?;

			job.status = JobStatus::Claimed.as_str().to_string();
			job.available_at = lease_until;
			job.updated_at = now;

			Some(job)
		},
		None => None,
	};

	tx.commit().await?;

	Ok(job)
}

/// Leases the next due reconciliation job, counting expired leases like
/// [`claim_next_indexing_job`].
pub async fn claim_next_reconcile_job(
	db: &Db,
	now: OffsetDateTime,
	lease_seconds: i64,
) -> Result<Option<ReconcileOutboxEntry>> {
	let mut tx = db.pool.begin().await?;
	let row = sqlx::query_as::<_, ReconcileOutboxEntry>(
		"\
SELECT
	outbox_id,
	scope_kind,
	scope_id,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at
FROM reconcile_outbox
WHERE status IN ('PENDING','FAILED','CLAIMED') AND available_at <= $1
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let job = match row {
		Some(mut job) => {
			let lease_until = now + time::Duration::seconds(lease_seconds);

			if job.status == JobStatus::Claimed.as_str() {
				job.attempts = job.attempts.saturating_add(1);
			}

			claim(&mut *tx, Queue::Reconcile, job.outbox_id, job.attempts, lease_until, now).await?;

			job.status = JobStatus::Claimed.as_str().to_string();
			job.available_at = lease_until;
			job.updated_at = now;

			Some(job)
		},
		None => None,
	};

	tx.commit().await?;

	Ok(job)
}

pub async fn mark_done(db: &Db, queue: Queue, outbox_id: Uuid, now: OffsetDateTime) -> Result<()> {
	let sql = format!(
		"UPDATE {} SET status = 'DONE', updated_at = $1 WHERE outbox_id = $2",
		queue.table()
	);

	sqlx::query(&sql).bind(now).bind(outbox_id).execute(&db.pool).await?;

	Ok(())
}

pub async fn mark_failed(
	db: &Db,
	queue: Queue,
	outbox_id: Uuid,
	attempts: i32,
	error_text: &str,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<()> {
	let sql = format!(
		"\
UPDATE {}
SET status = 'FAILED',
	attempts = $1,
	last_error = $2,
	available_at = $3,
	updated_at = $4
WHERE outbox_id = $5",
		queue.table()
	);

	sqlx::query(&sql)
		.bind(attempts)
		.bind(error_text)
		.bind(available_at)
		.bind(now)
		.bind(outbox_id)
		.execute(&db.pool)
		.await?;

	Ok(())
}

pub async fn mark_dead(
	db: &Db,
	queue: Queue,
	outbox_id: Uuid,
	attempts: i32,
	error_text: &str,
	now: OffsetDateTime,
) -> Result<()> {
	let sql = format!(
		"\
UPDATE {}
SET status = 'DEAD',
	attempts = $1,
	last_error = $2,
	updated_at = $3
WHERE outbox_id = $4",
		queue.table()
	);

	sqlx::query(&sql)
		.bind(attempts)
		.bind(error_text)
		.bind(now)
		.bind(outbox_id)
		.execute(&db.pool)
		.await?;

	Ok(())
}

pub async fn list_dead_indexing_jobs(db: &Db, limit: i64) -> Result<Vec<IndexingOutboxEntry>> {
	let rows = sqlx::query_as::<_, IndexingOutboxEntry>(
		"\
SELECT
	outbox_id,
	message_id,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at
FROM indexing_outbox
WHERE status = 'DEAD'
ORDER BY updated_at DESC
LIMIT $1",
	)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn fetch_indexing_jobs_for_message(
	db: &Db,
	message_id: Uuid,
) -> Result<Vec<IndexingOutboxEntry>> {
	let rows = sqlx::query_as::<_, IndexingOutboxEntry>(
		"\
SELECT
	outbox_id,
	message_id,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at
FROM indexing_outbox
WHERE message_id = $1
ORDER BY created_at ASC",
	)
	.bind(message_id)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn fetch_reconcile_jobs_for_scope(
	db: &Db,
	scope: Scope,
) -> Result<Vec<ReconcileOutboxEntry>> {
	let rows = sqlx::query_as::<_, ReconcileOutboxEntry>(
		"\
SELECT
	outbox_id,
	scope_kind,
	scope_id,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at
FROM reconcile_outbox
WHERE scope_kind = $1 AND scope_id = $2
ORDER BY created_at ASC",
	)
	.bind(scope.kind())
	.bind(scope.id())
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

async fn claim<'e, E>(
	executor: E,
	queue: Queue,
	outbox_id: Uuid,
	attempts: i32,
	lease_until: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
UPDATE {}
SET status = 'CLAIMED', attempts = $1, available_at = $2, updated_at = $3
WHERE outbox_id = $4",
		queue.table()
	);

	sqlx::query(&sql)
		.bind(attempts)
		.bind(lease_until)
		.bind(now)
		.bind(outbox_id)
		.execute(executor)
		.await?;

	Ok(())
}
