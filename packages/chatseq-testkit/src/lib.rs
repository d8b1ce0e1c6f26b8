//! Disposable infrastructure for integration tests.
//!
//! A [`TestDatabase`] creates a Postgres database with a random name and remembers every Qdrant
//! collection named through it. [`TestDatabase::cleanup`] removes all of it; dropping the value
//! without cleaning up does the same on a helper thread. Redis tests share one server and only
//! need [`env_redis_url`] plus keys of their own.

mod error;

pub use error::{Error, Result};

use std::{env, mem, str::FromStr, sync::Mutex, thread, time::Duration};

use qdrant_client::Qdrant;
use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use tokio::{runtime::Builder, time};
use uuid::Uuid;

const PG_DSN_VAR: &str = "CHATSEQ_PG_DSN";
const QDRANT_URL_VAR: &str = "CHATSEQ_QDRANT_URL";
const REDIS_URL_VAR: &str = "CHATSEQ_REDIS_URL";
const MAINTENANCE_DATABASES: [&str; 2] = ["postgres", "template1"];
const QDRANT_DELETE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TestDatabase {
	dsn: String,
	teardown: Option<Teardown>,
	collections: Mutex<Vec<String>>,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("Failed to parse {PG_DSN_VAR}: {err}.")))?;
		let maintenance = Maintenance::connect(&base).await?;
		let database = format!("chatseq_test_{}", Uuid::new_v4().simple());

		maintenance.create_database(&database).await?;

		Ok(Self {
			dsn: base.database(&database).to_url_lossy().to_string(),
			teardown: Some(Teardown { database, maintenance, collections: Vec::new() }),
			collections: Mutex::new(Vec::new()),
		})
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	/// Returns a collection name unique to this database and schedules it for deletion.
	pub fn collection_name(&self, prefix: &str) -> String {
		let suffix =
			self.teardown.as_ref().map_or("detached", |teardown| teardown.database.as_str());
		let collection = format!("{prefix}_{suffix}");
		let mut collections = self.collections.lock().unwrap_or_else(|err| err.into_inner());

		if !collections.contains(&collection) {
			collections.push(collection.clone());
		}

		collection
	}

	pub async fn cleanup(mut self) -> Result<()> {
		match self.take_teardown() {
			Some(teardown) => teardown.run().await,
			None => Ok(()),
		}
	}

	fn take_teardown(&mut self) -> Option<Teardown> {
		let mut teardown = self.teardown.take()?;
		let collections = self.collections.get_mut().unwrap_or_else(|err| err.into_inner());

		teardown.collections = mem::take(collections);

		Some(teardown)
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if let Some(teardown) = self.take_teardown() {
			teardown.run_detached();
		}
	}
}

pub fn env_dsn() -> Option<String> {
	env::var(PG_DSN_VAR).ok()
}

pub fn env_qdrant_url() -> Option<String> {
	env::var(QDRANT_URL_VAR).ok()
}

pub fn env_redis_url() -> Option<String> {
	env::var(REDIS_URL_VAR).ok()
}

/// Connection settings for a database that always exists, used to create and drop test
/// databases.
struct Maintenance {
	options: PgConnectOptions,
}
impl Maintenance {
	async fn connect(base: &PgConnectOptions) -> Result<Self> {
		let mut failures = Vec::new();

		for database in MAINTENANCE_DATABASES {
			let options = base.clone().database(database);

			match PgConnection::connect_with(&options).await {
				Ok(conn) => {
					let _ = conn.close().await;

					return Ok(Self { options });
				},
				Err(err) => failures.push(format!("{database}: {err}")),
			}
		}

		Err(Error::Message(format!(
			"No maintenance database accepted a connection ({}).",
			failures.join("; ")
		)))
	}

	async fn open(&self) -> Result<PgConnection> {
		PgConnection::connect_with(&self.options).await.map_err(|err| {
			Error::Message(format!("Failed to open a maintenance connection: {err}."))
		})
	}

	async fn create_database(&self, database: &str) -> Result<()> {
		let mut conn = self.open().await?;

		conn.execute(format!(r#"CREATE DATABASE "{database}""#).as_str())
			.await
			.map_err(|err| Error::Message(format!("Failed to create {database}: {err}.")))?;

		Ok(())
	}

	async fn drop_database(&self, database: &str) -> Result<()> {
		let mut conn = self.open().await?;

		// Pools from the test may still hold sessions open.
		let terminated = sqlx::query(
			"\
SELECT pg_terminate_backend(pid)
FROM pg_stat_activity
WHERE datname = $1 AND pid <> pg_backend_pid()",
		)
		.bind(database)
		.execute(&mut conn)
		.await;

		if let Err(err) = terminated {
			eprintln!("Could not end sessions on {database}: {err}.");
		}

		conn.execute(format!(r#"DROP DATABASE IF EXISTS "{database}""#).as_str())
			.await
			.map_err(|err| Error::Message(format!("Failed to drop {database}: {err}.")))?;

		Ok(())
	}
}

/// Everything a [`TestDatabase`] has to remove once the test is over.
struct Teardown {
	database: String,
	maintenance: Maintenance,
	collections: Vec<String>,
}
impl Teardown {
	async fn run(self) -> Result<()> {
		if !self.collections.is_empty() {
			delete_collections(&self.collections).await;
		}

		self.maintenance.drop_database(&self.database).await
	}

	/// Runs the teardown to completion on a thread with its own runtime, since the caller may
	/// already be inside one.
	fn run_detached(self) {
		let worker = thread::spawn(move || {
			let runtime = match Builder::new_current_thread().enable_all().build() {
				Ok(runtime) => runtime,
				Err(err) => {
					eprintln!("Test database teardown could not start a runtime: {err}.");

					return;
				},
			};

			if let Err(err) = runtime.block_on(self.run()) {
				eprintln!("Test database teardown failed: {err}.");
			}
		});

		if worker.join().is_err() {
			eprintln!("Test database teardown panicked.");
		}
	}
}

/// Best effort. A collection that cannot be deleted is reported and left behind.
async fn delete_collections(collections: &[String]) {
	let Some(url) = env_qdrant_url() else {
		eprintln!(
			"Leaving {} Qdrant collection(s); set {QDRANT_URL_VAR} to delete them.",
			collections.len()
		);

		return;
	};
	let client = match Qdrant::from_url(&url).build() {
		Ok(client) => client,
		Err(err) => {
			eprintln!("Failed to build a Qdrant client for teardown: {err}.");

			return;
		},
	};

	for collection in collections {
		let outcome =
			time::timeout(QDRANT_DELETE_TIMEOUT, client.delete_collection(collection.clone()))
				.await;

		match outcome {
			Ok(Ok(_)) => {},
			Ok(Err(err)) => eprintln!("Failed to delete Qdrant collection {collection:?}: {err}."),
			Err(_) => eprintln!("Timed out deleting Qdrant collection {collection:?}."),
		}
	}
}
