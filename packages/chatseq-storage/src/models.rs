use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Application {
	pub application_id: Uuid,
	pub token: String,
	pub name: String,
	pub chat_count: i64,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Chat {
	pub chat_id: Uuid,
	pub application_id: Uuid,
	pub number: i64,
	pub message_count: i64,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Message {
	pub message_id: Uuid,
	pub chat_id: Uuid,
	pub number: i64,
	pub body: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// Parent whose child collection is numbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
	/// Numbers the chats of an application.
	Application(Uuid),
	/// Numbers the messages of a chat.
	Chat(Uuid),
}
impl Scope {
	pub fn parse(kind: &str, id: Uuid) -> Option<Self> {
		match kind {
			"application" => Some(Self::Application(id)),
			"chat" => Some(Self::Chat(id)),
			_ => None,
		}
	}

	pub fn kind(self) -> &'static str {
		match self {
			Self::Application(_) => "application",
			Self::Chat(_) => "chat",
		}
	}

	pub fn id(self) -> Uuid {
		match self {
			Self::Application(id) | Self::Chat(id) => id,
		}
	}

	/// Fast-store key in `scope-kind:scope-id:counter-name` form.
	pub fn counter_key(self) -> String {
		match self {
			Self::Application(id) => format!("app:{id}:chat_counter"),
			Self::Chat(id) => format!("chat:{id}:message_counter"),
		}
	}
}
impl std::fmt::Display for Scope {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}:{}", self.kind(), self.id())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
	Pending,
	Claimed,
	Done,
	Failed,
	Dead,
}
impl JobStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "PENDING",
			Self::Claimed => "CLAIMED",
			Self::Done => "DONE",
			Self::Failed => "FAILED",
			Self::Dead => "DEAD",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"PENDING" => Some(Self::Pending),
			"CLAIMED" => Some(Self::Claimed),
			"DONE" => Some(Self::Done),
			"FAILED" => Some(Self::Failed),
			"DEAD" => Some(Self::Dead),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IndexingOutboxEntry {
	pub outbox_id: Uuid,
	pub message_id: Uuid,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReconcileOutboxEntry {
	pub outbox_id: Uuid,
	pub scope_kind: String,
	pub scope_id: Uuid,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
impl ReconcileOutboxEntry {
	pub fn scope(&self) -> Option<Scope> {
		Scope::parse(&self.scope_kind, self.scope_id)
	}
}
