use chatseq_storage::{models::Scope, queries};

use crate::{ChatService, Result};

/// How a number was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationPath {
	/// Atomic increment in the counter store. Unique across concurrent callers.
	Counter,
	/// Durable maximum plus one. Concurrent callers on the same scope can receive the same number;
	/// the unique index on `(parent, number)` rejects all but one of them.
	Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
	pub number: i64,
	pub path: AllocationPath,
}

impl ChatService {
	/// Returns the next child number for `scope`.
	pub async fn allocate(&self, scope: Scope) -> Result<Allocation> {
		match self.counters.increment(&scope.counter_key()).await {
			Ok(number) => Ok(Allocation { number, path: AllocationPath::Counter }),
			Err(err) => {
				tracing::warn!(
					scope = %scope,
					error = %err,
					"Counter store unavailable. Allocating from the durable maximum."
				);

				let max = queries::max_child_number(&self.db, scope).await?;

				Ok(Allocation { number: max + 1, path: AllocationPath::Fallback })
			},
		}
	}

	/// Raises the scope's counter to the largest stored number so the next increment cannot
	/// collide with an existing row. Returns the counter value afterwards.
	pub async fn resync(&self, scope: Scope) -> Result<i64> {
		let max = queries::max_child_number(&self.db, scope).await?;
		let value = self.counters.raise(&scope.counter_key(), max).await?;

		tracing::info!(scope = %scope, durable_max = max, counter = value, "Counter resynced.");

		Ok(value)
	}
}
