use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, Result,
	db::Db,
	models::{Application, Chat, Message, Scope},
};

pub async fn insert_application<'e, E>(executor: E, app: &Application) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO applications (application_id, token, name, chat_count, created_at, updated_at)
VALUES ($1,$2,$3,$4,$5,$6)",
	)
	.bind(app.application_id)
	.bind(app.token.as_str())
	.bind(app.name.as_str())
	.bind(app.chat_count)
	.bind(app.created_at)
	.bind(app.updated_at)
	.execute(executor)
	.await
	.map_err(|err| Error::from_insert(err, "Application token"))?;

	Ok(())
}

pub async fn fetch_application_by_token(db: &Db, token: &str) -> Result<Option<Application>> {
	let app = sqlx::query_as::<_, Application>(
		"\
SELECT application_id, token, name, chat_count, created_at, updated_at
FROM applications
WHERE token = $1",
	)
	.bind(token)
	.fetch_optional(&db.pool)
	.await?;

	Ok(app)
}

pub async fn update_application_name(
	db: &Db,
	token: &str,
	name: &str,
	now: OffsetDateTime,
) -> Result<Option<Application>> {
	let app = sqlx::query_as::<_, Application>(
		"\
UPDATE applications
SET name = $1, updated_at = $2
WHERE token = $3
RETURNING application_id, token, name, chat_count, created_at, updated_at",
	)
	.bind(name)
	.bind(now)
	.bind(token)
	.fetch_optional(&db.pool)
	.await?;

	Ok(app)
}

pub async fn insert_chat<'e, E>(executor: E, chat: &Chat) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO chats (chat_id, application_id, number, message_count, created_at, updated_at)
VALUES ($1,$2,$3,$4,$5,$6)",
	)
	.bind(chat.chat_id)
	.bind(chat.application_id)
	.bind(chat.number)
	.bind(chat.message_count)
	.bind(chat.created_at)
	.bind(chat.updated_at)
	.execute(executor)
	.await
	.map_err(|err| Error::from_insert(err, &format!("Chat number {}", chat.number)))?;

	Ok(())
}

pub async fn fetch_chat_by_number(
	db: &Db,
	application_id: Uuid,
	number: i64,
) -> Result<Option<Chat>> {
	let chat = sqlx::query_as::<_, Chat>(
		"\
SELECT chat_id, application_id, number, message_count, created_at, updated_at
FROM chats
WHERE application_id = $1 AND number = $2",
	)
	.bind(application_id)
	.bind(number)
	.fetch_optional(&db.pool)
	.await?;

	Ok(chat)
}

pub async fn list_chats(
	db: &Db,
	application_id: Uuid,
	limit: i64,
	offset: i64,
) -> Result<Vec<Chat>> {
	let chats = sqlx::query_as::<_, Chat>(
		"\
SELECT chat_id, application_id, number, message_count, created_at, updated_at
FROM chats
WHERE application_id = $1
ORDER BY number ASC
LIMIT $2 OFFSET $3",
	)
	.bind(application_id)
	.bind(limit)
	.bind(offset)
	.fetch_all(&db.pool)
	.await?;

	Ok(chats)
}

pub async fn insert_message<'e, E>(executor: E, message: &Message) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO messages (message_id, chat_id, number, body, created_at, updated_at)
VALUES ($1,$2,$3,$4,$5,$6)",
	)
	.bind(message.message_id)
	.bind(message.chat_id)
	.bind(message.number)
	.bind(message.body.as_str())
	.bind(message.created_at)
	.bind(message.updated_at)
	.execute(executor)
	.await
	.map_err(|err| Error::from_insert(err, &format!("Message number {}", message.number)))?;

	Ok(())
}

pub async fn fetch_message(db: &Db, message_id: Uuid) -> Result<Option<Message>> {
	let message = sqlx::query_as::<_, Message>(
		"\
SELECT message_id, chat_id, number, body, created_at, updated_at
FROM messages
WHERE message_id = $1",
	)
	.bind(message_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(message)
}

pub async fn fetch_message_by_number(
	db: &Db,
	chat_id: Uuid,
	number: i64,
) -> Result<Option<Message>> {
	let message = sqlx::query_as::<_, Message>(
		"\
SELECT message_id, chat_id, number, body, created_at, updated_at
FROM messages
WHERE chat_id = $1 AND number = $2",
	)
	.bind(chat_id)
	.bind(number)
	.fetch_optional(&db.pool)
	.await?;

	Ok(message)
}

pub async fn list_messages(
	db: &Db,
	chat_id: Uuid,
	limit: i64,
	offset: i64,
) -> Result<Vec<Message>> {
	let messages = sqlx::query_as::<_, Message>(
		"\
SELECT message_id, chat_id, number, body, created_at, updated_at
FROM messages
WHERE chat_id = $1
ORDER BY number ASC
LIMIT $2 OFFSET $3",
	)
	.bind(chat_id)
	.bind(limit)
	.bind(offset)
	.fetch_all(&db.pool)
	.await?;

	Ok(messages)
}

/// Largest number issued under `scope`, or zero when the scope has no children yet.
pub async fn max_child_number(db: &Db, scope: Scope) -> Result<i64> {
	let sql = match scope {
		Scope::Application(_) =>
			"SELECT COALESCE(MAX(number), 0)::bigint FROM chats WHERE application_id = $1",
		Scope::Chat(_) => "SELECT COALESCE(MAX(number), 0)::bigint FROM messages WHERE chat_id = $1",
	};
	let max: i64 = sqlx::query_scalar(sql).bind(scope.id()).fetch_one(&db.pool).await?;

	Ok(max)
}

pub async fn count_children(db: &Db, scope: Scope) -> Result<i64> {
	let sql = match scope {
		Scope::Application(_) => "SELECT COUNT(*)::bigint FROM chats WHERE application_id = $1",
		Scope::Chat(_) => "SELECT COUNT(*)::bigint FROM messages WHERE chat_id = $1",
	};
	let count: i64 = sqlx::query_scalar(sql).bind(scope.id()).fetch_one(&db.pool).await?;

	Ok(count)
}

/// Writes the denormalized count column of the scope's parent row without touching anything
/// else. Returns `false` when the parent row no longer exists.
pub async fn set_child_count(
	db: &Db,
	scope: Scope,
	count: i64,
	now: OffsetDateTime,
) -> Result<bool> {
	let sql = match scope {
		Scope::Application(_) =>
			"UPDATE applications SET chat_count = $1, updated_at = $2 WHERE application_id = $3",
		Scope::Chat(_) =>
			"UPDATE chats SET message_count = $1, updated_at = $2 WHERE chat_id = $3",
	};
	let result =
		sqlx::query(sql).bind(count).bind(now).bind(scope.id()).execute(&db.pool).await?;

	Ok(result.rows_affected() > 0)
}

/// Reads the denormalized count column of the scope's parent row.
pub async fn fetch_child_count(db: &Db, scope: Scope) -> Result<Option<i64>> {
	let sql = match scope {
		Scope::Application(_) => "SELECT chat_count FROM applications WHERE application_id = $1",
		Scope::Chat(_) => "SELECT message_count FROM chats WHERE chat_id = $1",
	};
	let count: Option<i64> =
		sqlx::query_scalar(sql).bind(scope.id()).fetch_optional(&db.pool).await?;

	Ok(count)
}
