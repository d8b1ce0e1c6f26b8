//! Side effects of a committed creation. They run after the row is durable and never fail the
//! creation itself: the periodic sweep and job redelivery cover anything dropped here.

use chatseq_storage::{models::Scope, outbox};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{ChatService, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationEvent {
	ApplicationCreated { application_id: Uuid },
	ChatCreated { application_id: Uuid, chat_id: Uuid },
	MessageCreated { chat_id: Uuid, message_id: Uuid },
}
impl CreationEvent {
	pub fn name(self) -> &'static str {
		match self {
			Self::ApplicationCreated { .. } => "application_created",
			Self::ChatCreated { .. } => "chat_created",
			Self::MessageCreated { .. } => "message_created",
		}
	}
}

impl ChatService {
	/// Runs every effect of `event`. Returns how many of them failed.
	pub async fn dispatch(&self, event: CreationEvent) -> usize {
		let now = OffsetDateTime::now_utc();
		let results = match event {
			CreationEvent::ApplicationCreated { application_id } =>
				vec![("init_counter", self.init_counter(Scope::Application(application_id)).await)],
			CreationEvent::ChatCreated { application_id, chat_id } => vec![
				("init_counter", self.init_counter(Scope::Chat(chat_id)).await),
				(
					"schedule_reconcile",
					self.schedule_delayed_reconcile(Scope::Application(application_id), now).await,
				),
			],
			CreationEvent::MessageCreated { chat_id, message_id } => vec![
				(
					"schedule_reconcile",
					self.schedule_delayed_reconcile(Scope::Chat(chat_id), now).await,
				),
				("enqueue_indexing", self.enqueue_index(message_id, now).await),
			],
		};
		let mut failed = 0;

		for (effect, result) in results {
			if let Err(err) = result {
				failed += 1;

				tracing::warn!(
					event = event.name(),
					effect,
					error = %err,
					"Post-commit effect failed."
				);
			}
		}

		failed
	}

	/// Queues `message_id` for indexing.
	pub async fn enqueue_index(&self, message_id: Uuid, now: OffsetDateTime) -> Result<()> {
		outbox::enqueue_indexing(&self.db.pool, message_id, now).await?;

		Ok(())
	}

	async fn init_counter(&self, scope: Scope) -> Result<()> {
		self.counters.init(&scope.counter_key()).await?;

		Ok(())
	}

	async fn schedule_delayed_reconcile(&self, scope: Scope, now: OffsetDateTime) -> Result<()> {
		let delay_seconds = i64::try_from(self.cfg.reconcile.delay_seconds).unwrap_or(i64::MAX);
		let delay = Duration::seconds(delay_seconds);

		outbox::schedule_reconcile(&self.db.pool, scope, now.saturating_add(delay), now).await?;

		Ok(())
	}
}
