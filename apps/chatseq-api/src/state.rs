use std::sync::Arc;

use chatseq_service::{ChatService, connect_counter_store};
use chatseq_storage::{db::Db, qdrant::QdrantStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<ChatService>,
}
impl AppState {
	pub async fn new(config: chatseq_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let counters = connect_counter_store(&config.storage.redis).await;
		let index = Arc::new(QdrantStore::new(&config.storage.qdrant)?);
		let service = ChatService::new(config, db, counters, index);

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: ChatService) -> Self {
		Self { service: Arc::new(service) }
	}
}
