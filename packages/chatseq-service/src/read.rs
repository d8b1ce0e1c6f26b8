use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use chatseq_storage::{
	models::{Application, Chat, Message},
	queries,
};

use crate::{ChatService, Error, Result};

const DEFAULT_PER_PAGE: u32 = 50;

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationView {
	pub token: String,
	pub name: String,
	pub chat_count: i64,
	#[serde(with = "crate::rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::rfc3339")]
	pub updated_at: OffsetDateTime,
}
impl From<Application> for ApplicationView {
	fn from(app: Application) -> Self {
		Self {
			token: app.token,
			name: app.name,
			chat_count: app.chat_count,
			created_at: app.created_at,
			updated_at: app.updated_at,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatView {
	pub number: i64,
	pub message_count: i64,
	#[serde(with = "crate::rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::rfc3339")]
	pub updated_at: OffsetDateTime,
}
impl From<Chat> for ChatView {
	fn from(chat: Chat) -> Self {
		Self {
			number: chat.number,
			message_count: chat.message_count,
			created_at: chat.created_at,
			updated_at: chat.updated_at,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
	pub number: i64,
	pub body: String,
	#[serde(with = "crate::rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::rfc3339")]
	pub updated_at: OffsetDateTime,
}
impl From<Message> for MessageView {
	fn from(message: Message) -> Self {
		Self {
			number: message.number,
			body: message.body,
			created_at: message.created_at,
			updated_at: message.updated_at,
		}
	}
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
	pub page: Option<u32>,
	pub per_page: Option<u32>,
}
impl PageRequest {
	/// Resolves `(page, per_page)`. `per_page` is clamped to `max_per_page`.
	pub fn resolve(self, max_per_page: u32) -> Result<(u32, u32)> {
		let page = self.page.unwrap_or(1);
		let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE).min(max_per_page);

		if page == 0 {
			return Err(Error::InvalidRequest { message: "page must be at least 1.".to_string() });
		}
		if per_page == 0 {
			return Err(Error::InvalidRequest {
				message: "per_page must be at least 1.".to_string(),
			});
		}

		Ok((page, per_page))
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct Paged<T> {
	pub items: Vec<T>,
	pub page: u32,
	pub per_page: u32,
}

impl ChatService {
	pub async fn get_application(&self, token: &str) -> Result<ApplicationView> {
		Ok(self.resolve_application(token).await?.into())
	}

	pub async fn list_chats(&self, token: &str, page: PageRequest) -> Result<Paged<ChatView>> {
		let (page, per_page) = page.resolve(self.cfg.limits.max_per_page)?;
		let app = self.resolve_application(token).await?;
		let (limit, offset) = limit_offset(page, per_page);
		let chats = queries::list_chats(&self.db, app.application_id, limit, offset).await?;

		Ok(Paged { items: chats.into_iter().map(ChatView::from).collect(), page, per_page })
	}

	pub async fn get_chat(&self, token: &str, number: i64) -> Result<ChatView> {
		let app = self.resolve_application(token).await?;

		Ok(self.resolve_chat(&app, number).await?.into())
	}

	pub async fn list_messages(
		&self,
		token: &str,
		chat_number: i64,
		page: PageRequest,
	) -> Result<Paged<MessageView>> {
		let (page, per_page) = page.resolve(self.cfg.limits.max_per_page)?;
		let app = self.resolve_application(token).await?;
		let chat = self.resolve_chat(&app, chat_number).await?;
		let (limit, offset) = limit_offset(page, per_page);
		let messages = queries::list_messages(&self.db, chat.chat_id, limit, offset).await?;

		Ok(Paged { items: messages.into_iter().map(MessageView::from).collect(), page, per_page })
	}

	pub async fn get_message(
		&self,
		token: &str,
		chat_number: i64,
		number: i64,
	) -> Result<MessageView> {
		let app = self.resolve_application(token).await?;
		let chat = self.resolve_chat(&app, chat_number).await?;
		let message = queries::fetch_message_by_number(&self.db, chat.chat_id, number)
			.await?
			.ok_or_else(|| Error::NotFound {
				message: format!("Message {number} not found in chat {chat_number}."),
			})?;

		Ok(message.into())
	}

	pub(crate) async fn resolve_application(&self, token: &str) -> Result<Application> {
		queries::fetch_application_by_token(&self.db, token)
			.await?
			.ok_or_else(|| Error::NotFound { message: "Application not found.".to_string() })
	}

	pub(crate) async fn resolve_chat(&self, app: &Application, number: i64) -> Result<Chat> {
		queries::fetch_chat_by_number(&self.db, app.application_id, number)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("Chat {number} not found.") })
	}
}

fn limit_offset(page: u32, per_page: u32) -> (i64, i64) {
	let limit = i64::from(per_page);

	(limit, i64::from(page - 1) * limit)
}
