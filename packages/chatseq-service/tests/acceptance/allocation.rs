use std::{collections::BTreeSet, sync::Arc};

use chatseq_service::{
	Allocation, AllocationPath, CounterStore, Error, MemoryCounterStore, UnavailableCounterStore,
};
use chatseq_storage::{models::Scope, queries};

use super::{NullIndex, build_service, message, seed_chat, test_db};

#[tokio::test]
#[ignore = "Requires external Postgres. Set CHATSEQ_PG_DSN to run."]
async fn chats_are_numbered_per_application() {
	let Some(test_db) = test_db().await else {
		eprintln!("Skipping chats_are_numbered_per_application; set CHATSEQ_PG_DSN to run.");

		return;
	};
	let service =
		build_service(&test_db, Arc::new(MemoryCounterStore::new()), Arc::new(NullIndex)).await;
	let token = seed_chat(&service).await;

	assert_eq!(service.create_chat(&token).await.expect("create").number, 2);
	assert_eq!(service.create_chat(&token).await.expect("create").number, 3);

	let other = seed_chat(&service).await;

	assert_ne!(token, other);
	assert_eq!(token.len(), 32);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "Requires external Postgres. Set CHATSEQ_PG_DSN to run."]
async fn concurrent_message_creation_yields_one_to_fifty() {
	let Some(test_db) = test_db().await else {
		eprintln!(
			"Skipping concurrent_message_creation_yields_one_to_fifty; set CHATSEQ_PG_DSN to run."
		);

		return;
	};
	let service = Arc::new(
		build_service(&test_db, Arc::new(MemoryCounterStore::new()), Arc::new(NullIndex)).await,
	);
	let token = Arc::new(seed_chat(&service).await);
	let mut handles = Vec::new();

	for idx in 0..50 {
		let service = service.clone();
		let token = token.clone();

		handles.push(tokio::spawn(async move {
			service.create_message(&token, 1, message(&format!("message {idx}"))).await
		}));
	}

	let mut numbers = BTreeSet::new();

	for handle in handles {
		let created = handle.await.expect("Task panicked.").expect("Failed to create message.");

		assert!(numbers.insert(created.number));
	}

	assert_eq!(numbers, (1..=50).collect::<BTreeSet<_>>());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CHATSEQ_PG_DSN to run."]
async fn fallback_collision_is_reported_as_conflict() {
	let Some(test_db) = test_db().await else {
		eprintln!(
			"Skipping fallback_collision_is_reported_as_conflict; set CHATSEQ_PG_DSN to run."
		);

		return;
	};
	let seeding =
		build_service(&test_db, Arc::new(MemoryCounterStore::new()), Arc::new(NullIndex)).await;
	let token = seed_chat(&seeding).await;
	let service = build_service(
		&test_db,
		Arc::new(UnavailableCounterStore::new("connection refused")),
		Arc::new(NullIndex),
	)
	.await;
	let app = queries::fetch_application_by_token(&service.db, &token)
		.await
		.expect("fetch")
		.expect("Application should exist.");
	let chat = queries::fetch_chat_by_number(&service.db, app.application_id, 1)
		.await
		.expect("fetch")
		.expect("Chat should exist.");
	let scope = Scope::Chat(chat.chat_id);
	// Two creations read the durable maximum before either inserts.
	let first = service.allocate(scope).await.expect("allocate");
	let second = service.allocate(scope).await.expect("allocate");

	assert_eq!(first, Allocation { number: 1, path: AllocationPath::Fallback });
	assert_eq!(second, first);

	service.store_message(&chat, first, "first").await.expect("First insert should win.");

	let err = service
		.store_message(&chat, second, "second")
		.await
		.expect_err("Expected the duplicate number to be rejected.");

	assert!(matches!(err, Error::SequenceConflict { .. }), "unexpected error: {err:?}");

	// The public creation path still works sequentially while degraded.
	let created = service.create_message(&token, 1, message("third")).await.expect("create");

	assert_eq!(created.number, 2);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "Requires external Postgres. Set CHATSEQ_PG_DSN to run."]
async fn concurrent_fallback_never_accepts_duplicates() {
	let Some(test_db) = test_db().await else {
		eprintln!(
			"Skipping concurrent_fallback_never_accepts_duplicates; set CHATSEQ_PG_DSN to run."
		);

		return;
	};
	let seeding =
		build_service(&test_db, Arc::new(MemoryCounterStore::new()), Arc::new(NullIndex)).await;
	let token = Arc::new(seed_chat(&seeding).await);
	let service = Arc::new(
		build_service(
			&test_db,
			Arc::new(UnavailableCounterStore::new("connection refused")),
			Arc::new(NullIndex),
		)
		.await,
	);
	let mut handles = Vec::new();

	for idx in 0..10 {
		let service = service.clone();
		let token = token.clone();

		handles.push(tokio::spawn(async move {
			service.create_message(&token, 1, message(&format!("message {idx}"))).await
		}));
	}

	let mut accepted = BTreeSet::new();

	for handle in handles {
		match handle.await.expect("Task panicked.") {
			Ok(created) => assert!(accepted.insert(created.number), "duplicate accepted"),
			Err(Error::SequenceConflict { .. }) => {},
			Err(err) => panic!("unexpected error: {err:?}"),
		}
	}

	assert!(!accepted.is_empty());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CHATSEQ_PG_DSN to run."]
async fn lost_counter_is_resynced_on_collision() {
	let Some(test_db) = test_db().await else {
		eprintln!("Skipping lost_counter_is_resynced_on_collision; set CHATSEQ_PG_DSN to run.");

		return;
	};
	let counters = Arc::new(MemoryCounterStore::new());
	let service = build_service(&test_db, counters.clone(), Arc::new(NullIndex)).await;
	let token = seed_chat(&service).await;

	for body in ["one", "two"] {
		service.create_message(&token, 1, message(body)).await.expect("create");
	}

	// A flushed cache restarts every counter at zero.
	counters.clear();

	let created = service.create_message(&token, 1, message("three")).await.expect("create");

	assert_eq!(created.number, 3);

	let app = queries::fetch_application_by_token(&service.db, &token)
		.await
		.expect("fetch")
		.expect("Application should exist.");
	let chat = queries::fetch_chat_by_number(&service.db, app.application_id, 1)
		.await
		.expect("fetch")
		.expect("Chat should exist.");

	assert_eq!(
		counters.get(&Scope::Chat(chat.chat_id).counter_key()).await.expect("get"),
		Some(3)
	);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
