use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use chatseq_service::{ChatService, MemoryCounterStore};
use chatseq_storage::{
	db::Db,
	qdrant::{MessageDocument, QdrantStore},
};

use super::{message, seed_chat, test_config, test_db};

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CHATSEQ_PG_DSN and CHATSEQ_QDRANT_URL to run."]
async fn indexing_twice_leaves_one_point_and_search_is_chat_scoped() {
	let Some(test_db) = test_db().await else {
		eprintln!(
			"Skipping indexing_twice_leaves_one_point_and_search_is_chat_scoped; set CHATSEQ_PG_DSN to run."
		);

		return;
	};
	if chatseq_testkit::env_qdrant_url().is_none() {
		eprintln!(
			"Skipping indexing_twice_leaves_one_point_and_search_is_chat_scoped; set CHATSEQ_QDRANT_URL to run."
		);

		return;
	}

	let collection = test_db.collection_name("chatseq_messages");
	let cfg = test_config(test_db.dsn(), &collection);
	let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let store = QdrantStore::new(&cfg.storage.qdrant).expect("Failed to build Qdrant client.");

	assert!(store.ensure_collection().await.expect("Failed to create collection."));
	assert!(!store.ensure_collection().await.expect("Failed to check collection."));

	let service =
		ChatService::new(cfg, db, Arc::new(MemoryCounterStore::new()), Arc::new(store));
	let token = seed_chat(&service).await;
	let created = service
		.create_message(&token, 1, message("The shipment left the warehouse."))
		.await
		.expect("create");
	let message_ids: Vec<Uuid> = sqlx::query_scalar("SELECT message_id FROM messages")
		.fetch_all(&service.db.pool)
		.await
		.expect("Failed to list messages.");

	for message_id in &message_ids {
		service.index_message(*message_id).await.expect("index");
		service.index_message(*message_id).await.expect("re-index");
	}

	// A document from another chat that matches the same query.
	service
		.index_document(&MessageDocument {
			message_id: Uuid::new_v4(),
			chat_id: Uuid::new_v4(),
			number: 1,
			body: "Another shipment elsewhere.".to_string(),
			created_at: OffsetDateTime::now_utc(),
		})
		.await
		.expect("index");

	let response = service.search(&token, 1, "shipment").await.expect("search");

	assert_eq!(response.total, 1);
	assert_eq!(response.results[0].number, created.number);
	assert_eq!(
		response.results[0].highlight.as_deref(),
		Some("The <mark>shipment</mark> left the warehouse.")
	);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CHATSEQ_PG_DSN and CHATSEQ_QDRANT_URL to run."]
async fn missing_collection_reports_search_unavailable() {
	let Some(test_db) = test_db().await else {
		eprintln!("Skipping missing_collection_reports_search_unavailable; set CHATSEQ_PG_DSN to run.");

		return;
	};
	if chatseq_testkit::env_qdrant_url().is_none() {
		eprintln!(
			"Skipping missing_collection_reports_search_unavailable; set CHATSEQ_QDRANT_URL to run."
		);

		return;
	}

	let collection = test_db.collection_name("chatseq_missing");
	let cfg = test_config(test_db.dsn(), &collection);
	let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect to Postgres.");
	let store = QdrantStore::new(&cfg.storage.qdrant).expect("Failed to build Qdrant client.");
	let service =
		ChatService::new(cfg, db, Arc::new(MemoryCounterStore::new()), Arc::new(store));
	let err = service.search_chat(Uuid::new_v4(), "anything").await.expect_err("search");

	assert!(
		matches!(err, chatseq_service::Error::SearchUnavailable { .. }),
		"unexpected error: {err:?}"
	);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
