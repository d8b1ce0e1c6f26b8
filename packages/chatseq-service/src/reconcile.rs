//! Copies live counter values into the denormalized count columns.

use serde::Serialize;
use time::OffsetDateTime;

use chatseq_storage::{models::Scope, outbox, queries};

use crate::{ChatService, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
	/// Count written to the parent row.
	pub count: i64,
	/// The counter key was missing and had to be seeded from Postgres.
	pub reseeded: bool,
	/// The parent row still exists and received the count.
	pub applied: bool,
}

impl ChatService {
	/// Writes the scope's live count into its parent row.
	///
	/// The count is read fresh on every run, so running twice yields the same column value. A
	/// missing key (flushed store) is re-seeded from the largest stored number and the stored row
	/// count is written instead. Counters private to this process never saw numbers handed out by
	/// other processes, so with such a store the stored row count is always written.
	pub async fn reconcile(&self, scope: Scope) -> Result<ReconcileOutcome> {
		let key = scope.counter_key();
		let live = self.counters.get(&key).await.map_err(reconcile_failed)?;
		let reseeded = live.is_none();

		if reseeded {
			let max = queries::max_child_number(&self.db, scope).await?;

			self.counters.raise(&key, max).await.map_err(reconcile_failed)?;
		}

		let count = match live {
			Some(count) if self.counters.is_shared() => count,
			_ => queries::count_children(&self.db, scope).await?,
		};
		let applied =
			queries::set_child_count(&self.db, scope, count, OffsetDateTime::now_utc()).await?;

		tracing::debug!(scope = %scope, count, reseeded, applied, "Scope reconciled.");

		Ok(ReconcileOutcome { count, reseeded, applied })
	}

	/// Schedules an immediate reconciliation of every application and chat. Returns the number of
	/// scopes scheduled.
	pub async fn sweep(&self) -> Result<u64> {
		let scheduled = outbox::schedule_sweep(&self.db, OffsetDateTime::now_utc()).await?;

		tracing::info!(scheduled, "Reconciliation sweep scheduled.");

		Ok(scheduled)
	}
}

fn reconcile_failed(err: Error) -> Error {
	Error::ReconciliationFailed { message: err.to_string() }
}
