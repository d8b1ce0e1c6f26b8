use std::{sync::Arc, time::Duration as StdDuration};

use time::{Duration, OffsetDateTime};
use tokio::{
	task::JoinSet,
	time::{self as tokio_time, MissedTickBehavior},
};
use uuid::Uuid;

use chatseq_service::{ChatService, IndexOutcome};
use chatseq_storage::outbox::{self, Queue};

use crate::Result;

const MAX_OUTBOX_ERROR_CHARS: usize = 1_024;
const MAX_BACKOFF_DOUBLINGS: u32 = 6;
const SECRET_KEYS: [&str; 4] = ["password", "secret", "token", "api_key"];
const LEASE_EXPIRED: &str = "Lease expired before the job finished.";

/// Runs `worker.concurrency` job loops plus the periodic sweep until one of them dies.
pub async fn run_worker(service: Arc<ChatService>) -> color_eyre::Result<()> {
	let mut tasks = JoinSet::new();

	tasks.spawn(run_sweeper(service.clone()));

	for slot in 0..service.cfg.worker.concurrency {
		tasks.spawn(run_job_loop(service.clone(), slot));
	}

	tracing::info!(concurrency = service.cfg.worker.concurrency, "Worker started.");

	while let Some(joined) = tasks.join_next().await {
		joined?;
	}

	Ok(())
}

/// Claims and runs the next due indexing job. Returns whether a job was claimed.
pub async fn process_indexing_once(service: &ChatService) -> Result<bool> {
	let now = OffsetDateTime::now_utc();
	let Some(job) =
		outbox::claim_next_indexing_job(&service.db, now, service.cfg.worker.lease_seconds).await?
	else {
		return Ok(false);
	};
	let subject = job.message_id.to_string();
	let max_attempts = service.cfg.indexing.max_attempts;

	if bury_expired(service, Queue::Indexing, job.outbox_id, &subject, job.attempts, max_attempts)
		.await?
	{
		return Ok(true);
	}

	match service.index_message(job.message_id).await {
		Ok(IndexOutcome::Indexed | IndexOutcome::Skipped) => {
			let now = OffsetDateTime::now_utc();

			outbox::mark_done(&service.db, Queue::Indexing, job.outbox_id, now).await?;
		},
		Err(err) => {
			let failure = JobFailure {
				queue: Queue::Indexing,
				outbox_id: job.outbox_id,
				subject: &subject,
				attempts: job.attempts,
				max_attempts,
				retryable: err.is_retryable(),
				error: err.to_string(),
			};

			record_failure(service, failure).await?;
		},
	}

	Ok(true)
}

/// Claims and runs the next due reconciliation job. Returns whether a job was claimed.
pub async fn process_reconcile_once(service: &ChatService) -> Result<bool> {
	let now = OffsetDateTime::now_utc();
	let Some(job) =
		outbox::claim_next_reconcile_job(&service.db, now, service.cfg.worker.lease_seconds).await?
	else {
		return Ok(false);
	};
	let subject = format!("{}:{}", job.scope_kind, job.scope_id);
	let max_attempts = service.cfg.reconcile.max_attempts;

	if bury_expired(service, Queue::Reconcile, job.outbox_id, &subject, job.attempts, max_attempts)
		.await?
	{
		return Ok(true);
	}

	let result = match job.scope() {
		Some(scope) => service
			.reconcile(scope)
			.await
			.map(|_| ())
			.map_err(|err| (err.is_retryable(), err.to_string())),
		None => Err((false, format!("Unknown scope kind {:?}.", job.scope_kind))),
	};

	match result {
		Ok(()) => {
			let now = OffsetDateTime::now_utc();

			outbox::mark_done(&service.db, Queue::Reconcile, job.outbox_id, now).await?;
		},
		Err((retryable, error)) => {
			let failure = JobFailure {
				queue: Queue::Reconcile,
				outbox_id: job.outbox_id,
				subject: &subject,
				attempts: job.attempts,
				max_attempts,
				retryable,
				error,
			};

			record_failure(service, failure).await?;
		},
	}

	Ok(true)
}

struct JobFailure<'a> {
	queue: Queue,
	outbox_id: Uuid,
	subject: &'a str,
	/// Attempts recorded before this one.
	attempts: i32,
	max_attempts: u32,
	retryable: bool,
	error: String,
}

async fn run_job_loop(service: Arc<ChatService>, slot: u32) {
	let idle = StdDuration::from_millis(service.cfg.worker.poll_interval_ms);

	loop {
		let mut busy = false;

		match process_indexing_once(&service).await {
			Ok(claimed) => busy |= claimed,
			Err(err) => tracing::error!(slot, error = %err, "Indexing queue processing failed."),
		}
		match process_reconcile_once(&service).await {
			Ok(claimed) => busy |= claimed,
			Err(err) => tracing::error!(slot, error = %err, "Reconcile queue processing failed."),
		}

		if !busy {
			tokio_time::sleep(idle).await;
		}
	}
}

async fn run_sweeper(service: Arc<ChatService>) {
	let period = StdDuration::from_secs(service.cfg.reconcile.sweep_interval_seconds);
	let mut ticker = tokio_time::interval(period);

	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		ticker.tick().await;

		if let Err(err) = service.sweep().await {
			tracing::error!(error = %err, "Reconciliation sweep failed.");
		}
	}
}

/// Marks a job dead instead of running it once its expired leases have used up every attempt.
/// Returns whether the job was buried.
async fn bury_expired(
	service: &ChatService,
	queue: Queue,
	outbox_id: Uuid,
	subject: &str,
	attempts: i32,
	max_attempts: u32,
) -> Result<bool> {
	if attempts < i32::try_from(max_attempts).unwrap_or(i32::MAX) {
		return Ok(false);
	}

	let now = OffsetDateTime::now_utc();

	outbox::mark_dead(&service.db, queue, outbox_id, attempts, LEASE_EXPIRED, now).await?;

	tracing::error!(
		queue = ?queue,
		outbox_id = %outbox_id,
		subject,
		attempts,
		"Job lease kept expiring. Giving up."
	);

	Ok(true)
}

async fn record_failure(service: &ChatService, failure: JobFailure<'_>) -> Result<()> {
	let attempts = failure.attempts.saturating_add(1);
	let max_attempts = i32::try_from(failure.max_attempts).unwrap_or(i32::MAX);
	let error_text = sanitize_outbox_error(&failure.error);
	let now = OffsetDateTime::now_utc();

	if !failure.retryable || attempts >= max_attempts {
		outbox::mark_dead(&service.db, failure.queue, failure.outbox_id, attempts, &error_text, now)
			.await?;

		tracing::error!(
			queue = ?failure.queue,
			outbox_id = %failure.outbox_id,
			subject = failure.subject,
			attempts,
			error = %error_text,
			"Job failed permanently."
		);

		return Ok(());
	}

	let backoff = backoff_for_attempt(
		attempts,
		service.cfg.worker.base_backoff_ms,
		service.cfg.worker.max_backoff_ms,
	);

	outbox::mark_failed(
		&service.db,
		failure.queue,
		failure.outbox_id,
		attempts,
		&error_text,
		now + backoff,
		now,
	)
	.await?;

	tracing::warn!(
		queue = ?failure.queue,
		outbox_id = %failure.outbox_id,
		subject = failure.subject,
		attempts,
		backoff_ms = backoff.whole_milliseconds() as i64,
		error = %error_text,
		"Job failed. Retrying after backoff."
	);

	Ok(())
}

/// Redacts bearer tokens and `key=value` style secrets, then truncates.
fn sanitize_outbox_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		if let Some(sep) = ['=', ':'].into_iter().find(|sep| raw.contains(*sep))
			&& SECRET_KEYS.iter().any(|key| lowered.contains(key))
		{
			let prefix = raw.split(sep).next().unwrap_or(raw);

			word = format!("{prefix}{sep}[REDACTED]");
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_OUTBOX_ERROR_CHARS {
		out = out.chars().take(MAX_OUTBOX_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}

/// `base * 2^(attempt - 1)`, capped at `max_ms`.
fn backoff_for_attempt(attempt: i32, base_ms: i64, max_ms: i64) -> Duration {
	let exp = attempt.max(1).unsigned_abs().saturating_sub(1).min(MAX_BACKOFF_DOUBLINGS);
	let delay = base_ms.saturating_mul(1_i64 << exp).min(max_ms);

	Duration::milliseconds(delay)
}
