use std::future::Future;

use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use chatseq_storage::{
	models::{Application, Chat, Message, Scope},
	queries,
};

use crate::{
	Allocation, AllocationPath, ApplicationView, ChatService, ChatView, CreationEvent, Error,
	MessageView, Result,
};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateApplicationRequest {
	pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateApplicationRequest {
	pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMessageRequest {
	pub body: String,
}

impl ChatService {
	pub async fn create_application(
		&self,
		req: CreateApplicationRequest,
	) -> Result<ApplicationView> {
		let name = self.validate_name(&req.name)?;
		let now = OffsetDateTime::now_utc();
		let app = Application {
			application_id: Uuid::new_v4(),
			token: Uuid::new_v4().simple().to_string(),
			name,
			chat_count: 0,
			created_at: now,
			updated_at: now,
		};

		queries::insert_application(&self.db.pool, &app).await.map_err(|err| match err {
			chatseq_storage::Error::Conflict(message) => Error::Storage { message },
			err => err.into(),
		})?;

		tracing::info!(application_id = %app.application_id, "Application created.");

		self.dispatch(CreationEvent::ApplicationCreated { application_id: app.application_id })
			.await;

		Ok(app.into())
	}

	pub async fn update_application(
		&self,
		token: &str,
		req: UpdateApplicationRequest,
	) -> Result<ApplicationView> {
		let name = self.validate_name(&req.name)?;
		let now = OffsetDateTime::now_utc();
		let app = queries::update_application_name(&self.db, token, &name, now)
			.await?
			.ok_or_else(|| Error::NotFound { message: "Application not found.".to_string() })?;

		Ok(app.into())
	}

	pub async fn create_chat(&self, token: &str) -> Result<ChatView> {
		let app = &self.resolve_application(token).await?;
		let scope = Scope::Application(app.application_id);
		let chat = self
			.insert_numbered(scope, move |allocation| self.store_chat(app, allocation))
			.await?;

		tracing::info!(
			application_id = %chat.application_id,
			number = chat.number,
			"Chat created."
		);

		self.dispatch(CreationEvent::ChatCreated {
			application_id: chat.application_id,
			chat_id: chat.chat_id,
		})
		.await;

		Ok(chat.into())
	}

	pub async fn create_message(
		&self,
		token: &str,
		chat_number: i64,
		req: CreateMessageRequest,
	) -> Result<MessageView> {
		self.validate_body(&req.body)?;

		let app = self.resolve_application(token).await?;
		let chat = &self.resolve_chat(&app, chat_number).await?;
		let scope = Scope::Chat(chat.chat_id);
		let body = req.body.as_str();
		let message = self
			.insert_numbered(scope, move |allocation| self.store_message(chat, allocation, body))
			.await?;

		tracing::info!(chat_id = %message.chat_id, number = message.number, "Message created.");

		self.dispatch(CreationEvent::MessageCreated {
			chat_id: message.chat_id,
			message_id: message.message_id,
		})
		.await;

		Ok(message.into())
	}

	/// Persists a chat under an already allocated number. A stored chat with the same number
	/// surfaces as [`Error::SequenceConflict`].
	pub async fn store_chat(&self, app: &Application, allocation: Allocation) -> Result<Chat> {
		let now = OffsetDateTime::now_utc();
		let chat = Chat {
			chat_id: Uuid::new_v4(),
			application_id: app.application_id,
			number: allocation.number,
			message_count: 0,
			created_at: now,
			updated_at: now,
		};

		queries::insert_chat(&self.db.pool, &chat).await?;

		Ok(chat)
	}

	/// Persists a message under an already allocated number. A stored message with the same
	/// number surfaces as [`Error::SequenceConflict`].
	pub async fn store_message(
		&self,
		chat: &Chat,
		allocation: Allocation,
		body: &str,
	) -> Result<Message> {
		let now = OffsetDateTime::now_utc();
		let message = Message {
			message_id: Uuid::new_v4(),
			chat_id: chat.chat_id,
			number: allocation.number,
			body: body.to_string(),
			created_at: now,
			updated_at: now,
		};

		queries::insert_message(&self.db.pool, &message).await?;

		Ok(message)
	}

	/// Allocates a number and stores the child under it.
	///
	/// A collision on the counter path means the counter fell behind the stored rows, so the
	/// counter is resynced and the insert retried up to `sequence.conflict_retries` times. A
	/// collision on the fallback path is returned to the caller as is.
	async fn insert_numbered<T, F, Fut>(&self, scope: Scope, mut store: F) -> Result<T>
	where
		F: FnMut(Allocation) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let retries = self.cfg.sequence.conflict_retries;
		let mut attempt = 0;

		loop {
			let allocation = self.allocate(scope).await?;
			let message = match store(allocation).await {
				Ok(value) => return Ok(value),
				Err(Error::SequenceConflict { message }) => message,
				Err(err) => return Err(err),
			};

			tracing::warn!(
				scope = %scope,
				number = allocation.number,
				path = ?allocation.path,
				attempt,
				"Allocated number is already taken."
			);

			if allocation.path == AllocationPath::Fallback {
				return Err(Error::SequenceConflict { message });
			}
			if let Err(err) = self.resync(scope).await {
				tracing::warn!(scope = %scope, error = %err, "Counter resync failed.");
			}
			if attempt >= retries {
				return Err(Error::SequenceConflict { message });
			}

			attempt += 1;
		}
	}

	fn validate_name(&self, raw: &str) -> Result<String> {
		let name = raw.trim();

		if name.is_empty() {
			return Err(Error::InvalidRequest { message: "name must not be blank.".to_string() });
		}
		if name.chars().count() > self.cfg.limits.max_name_chars as usize {
			return Err(Error::InvalidRequest {
				message: format!(
					"name must be at most {} characters.",
					self.cfg.limits.max_name_chars
				),
			});
		}

		Ok(name.to_string())
	}

	fn validate_body(&self, body: &str) -> Result<()> {
		if body.trim().is_empty() {
			return Err(Error::InvalidRequest { message: "body must not be blank.".to_string() });
		}
		if body.chars().count() > self.cfg.limits.max_body_chars as usize {
			return Err(Error::InvalidRequest {
				message: format!(
					"body must be at most {} characters.",
					self.cfg.limits.max_body_chars
				),
			});
		}

		Ok(())
	}
}
