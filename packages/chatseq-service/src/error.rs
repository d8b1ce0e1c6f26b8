pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Invalid query: {message}")]
	InvalidQuery { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	/// A stored row already holds the allocated number. The caller may retry the request.
	#[error("Sequence conflict: {message}")]
	SequenceConflict { message: String },
	#[error("Counter store unavailable: {message}")]
	CounterStoreUnavailable { message: String },
	#[error("Reconciliation failed: {message}")]
	ReconciliationFailed { message: String },
	#[error("Indexing failed: {message}")]
	IndexingFailed { message: String, retryable: bool },
	#[error("Search unavailable: {message}")]
	SearchUnavailable { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl Error {
	/// Whether a background job hitting this error should be delivered again.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::IndexingFailed { retryable, .. } => *retryable,
			Self::InvalidRequest { .. } | Self::InvalidQuery { .. } | Self::NotFound { .. } =>
				false,
			_ => true,
		}
	}
}
impl From<chatseq_storage::Error> for Error {
	fn from(err: chatseq_storage::Error) -> Self {
		match err {
			chatseq_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			chatseq_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			chatseq_storage::Error::NotFound(message) => Self::NotFound { message },
			chatseq_storage::Error::Conflict(message) => Self::SequenceConflict { message },
			err @ (chatseq_storage::Error::Redis(_) | chatseq_storage::Error::CounterTimeout(_)) =>
				Self::CounterStoreUnavailable { message: err.to_string() },
			err @ (chatseq_storage::Error::IndexNotFound(_) | chatseq_storage::Error::Qdrant(_)) =>
				Self::SearchUnavailable { message: err.to_string() },
		}
	}
}
