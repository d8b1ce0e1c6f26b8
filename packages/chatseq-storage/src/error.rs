#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Conflict: {0}")]
	Conflict(String),
	#[error(transparent)]
	Redis(#[from] redis::RedisError),
	#[error("Counter store timed out after {0} ms.")]
	CounterTimeout(u64),
	#[error("Search index {0:?} does not exist.")]
	IndexNotFound(String),
	#[error(transparent)]
	Qdrant(#[from] Box<qdrant_client::QdrantError>),
}
impl Error {
	/// Maps a unique-constraint violation to [`Error::Conflict`]. Other errors pass through.
	pub fn from_insert(err: sqlx::Error, what: &str) -> Self {
		if let sqlx::Error::Database(db_err) = &err
			&& db_err.is_unique_violation()
		{
			return Self::Conflict(format!("{what} already exists."));
		}

		Self::Sqlx(err)
	}
}
impl From<qdrant_client::QdrantError> for Error {
	fn from(err: qdrant_client::QdrantError) -> Self {
		Self::Qdrant(Box::new(err))
	}
}
