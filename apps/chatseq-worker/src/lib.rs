pub mod worker;

mod error;

pub use error::{Error, Result};

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use chatseq_service::{ChatService, connect_counter_store};
use chatseq_storage::{db::Db, qdrant::QdrantStore};

#[derive(Debug, Parser)]
#[command(
	version = chatseq_cli::VERSION,
	rename_all = "kebab",
	styles = chatseq_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = chatseq_config::load(&args.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let qdrant = QdrantStore::new(&config.storage.qdrant)?;

	match qdrant.ensure_collection().await {
		Ok(true) => tracing::info!(
			collection = %config.storage.qdrant.collection,
			"Search collection created."
		),
		Ok(false) => {},
		Err(err) => tracing::warn!(
			error = %err,
			"Search collection check failed. Indexing jobs will retry until it is reachable."
		),
	}

	let counters = connect_counter_store(&config.storage.redis).await;
	let service = ChatService::new(config, db, counters, Arc::new(qdrant));

	worker::run_worker(Arc::new(service)).await
}
