use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use chatseq_service::{CounterStore, IndexOutcome, MemoryCounterStore};
use chatseq_storage::{models::Scope, outbox, queries};

use super::{NullIndex, build_service, message, seed_chat, test_db};

async fn chat_scope(service: &chatseq_service::ChatService, token: &str) -> Scope {
	let app = queries::fetch_application_by_token(&service.db, token)
		.await
		.expect("fetch")
		.expect("Application should exist.");
	let chat = queries::fetch_chat_by_number(&service.db, app.application_id, 1)
		.await
		.expect("fetch")
		.expect("Chat should exist.");

	Scope::Chat(chat.chat_id)
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CHATSEQ_PG_DSN to run."]
async fn reconcile_twice_writes_the_same_count() {
	let Some(test_db) = test_db().await else {
		eprintln!("Skipping reconcile_twice_writes_the_same_count; set CHATSEQ_PG_DSN to run.");

		return;
	};
	let service =
		build_service(&test_db, Arc::new(MemoryCounterStore::new()), Arc::new(NullIndex)).await;
	let token = seed_chat(&service).await;

	for body in ["a", "b", "c"] {
		service.create_message(&token, 1, message(body)).await.expect("create");
	}

	let scope = chat_scope(&service, &token).await;
	let first = service.reconcile(scope).await.expect("reconcile");
	let second = service.reconcile(scope).await.expect("reconcile");

	assert_eq!(first.count, 3);
	assert_eq!(first, second);
	assert_eq!(queries::fetch_child_count(&service.db, scope).await.expect("fetch"), Some(3));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CHATSEQ_PG_DSN to run."]
async fn creation_schedules_a_delayed_reconcile_that_a_sweep_pulls_forward() {
	let Some(test_db) = test_db().await else {
		eprintln!(
			"Skipping creation_schedules_a_delayed_reconcile_that_a_sweep_pulls_forward; set CHATSEQ_PG_DSN to run."
		);

		return;
	};
	let service =
		build_service(&test_db, Arc::new(MemoryCounterStore::new()), Arc::new(NullIndex)).await;
	let token = seed_chat(&service).await;

	service.create_message(&token, 1, message("hello")).await.expect("create");

	let scope = chat_scope(&service, &token).await;
	let jobs = outbox::fetch_reconcile_jobs_for_scope(&service.db, scope).await.expect("fetch");

	assert_eq!(jobs.len(), 1);
	assert!(jobs[0].available_at > OffsetDateTime::now_utc() + Duration::minutes(4));
	assert_eq!(service.get_chat(&token, 1).await.expect("get").message_count, 0);

	service.sweep().await.expect("Failed to sweep.");

	// Drain every due job the way a worker would.
	let now = OffsetDateTime::now_utc();

	while let Some(job) =
		outbox::claim_next_reconcile_job(&service.db, now, 30).await.expect("claim")
	{
		let job_scope = job.scope().expect("Job scope should parse.");

		service.reconcile(job_scope).await.expect("reconcile");
		outbox::mark_done(&service.db, outbox::Queue::Reconcile, job.outbox_id, now)
			.await
			.expect("mark done");
	}

	assert_eq!(service.get_chat(&token, 1).await.expect("get").message_count, 1);
	assert_eq!(service.get_application(&token).await.expect("get").chat_count, 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CHATSEQ_PG_DSN to run."]
async fn reconcile_reseeds_a_flushed_counter() {
	let Some(test_db) = test_db().await else {
		eprintln!("Skipping reconcile_reseeds_a_flushed_counter; set CHATSEQ_PG_DSN to run.");

		return;
	};
	let counters = Arc::new(MemoryCounterStore::new());
	let service = build_service(&test_db, counters.clone(), Arc::new(NullIndex)).await;
	let token = seed_chat(&service).await;

	for body in ["a", "b"] {
		service.create_message(&token, 1, message(body)).await.expect("create");
	}

	let scope = chat_scope(&service, &token).await;

	counters.clear();

	let outcome = service.reconcile(scope).await.expect("reconcile");

	assert!(outcome.reseeded);
	assert_eq!(outcome.count, 2);
	assert_eq!(counters.get(&scope.counter_key()).await.expect("get"), Some(2));
	assert_eq!(service.allocate(scope).await.expect("allocate").number, 3);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CHATSEQ_PG_DSN to run."]
async fn reconcile_with_process_local_counters_counts_stored_rows() {
	let Some(test_db) = test_db().await else {
		eprintln!(
			"Skipping reconcile_with_process_local_counters_counts_stored_rows; set CHATSEQ_PG_DSN to run."
		);

		return;
	};
	let api =
		build_service(&test_db, Arc::new(MemoryCounterStore::new()), Arc::new(NullIndex)).await;
	let worker =
		build_service(&test_db, Arc::new(MemoryCounterStore::new()), Arc::new(NullIndex)).await;
	let token = seed_chat(&api).await;

	for body in ["a", "b", "c"] {
		api.create_message(&token, 1, message(body)).await.expect("create");
	}

	let scope = chat_scope(&api, &token).await;

	assert_eq!(worker.reconcile(scope).await.expect("reconcile").count, 3);

	for body in ["d", "e"] {
		api.create_message(&token, 1, message(body)).await.expect("create");
	}

	let outcome = worker.reconcile(scope).await.expect("reconcile");

	assert_eq!(outcome.count, 5);
	assert!(!outcome.reseeded);
	assert_eq!(queries::fetch_child_count(&api.db, scope).await.expect("fetch"), Some(5));
	assert_eq!(api.get_chat(&token, 1).await.expect("get").message_count, 5);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CHATSEQ_PG_DSN to run."]
async fn message_creation_enqueues_indexing_and_missing_messages_are_skipped() {
	let Some(test_db) = test_db().await else {
		eprintln!(
			"Skipping message_creation_enqueues_indexing_and_missing_messages_are_skipped; set CHATSEQ_PG_DSN to run."
		);

		return;
	};
	let service =
		build_service(&test_db, Arc::new(MemoryCounterStore::new()), Arc::new(NullIndex)).await;
	let token = seed_chat(&service).await;

	service.create_message(&token, 1, message("hello")).await.expect("create");

	let job = outbox::claim_next_indexing_job(&service.db, OffsetDateTime::now_utc(), 30)
		.await
		.expect("claim")
		.expect("Expected an indexing job.");

	assert_eq!(service.index_message(job.message_id).await.expect("index"), IndexOutcome::Indexed);
	assert_eq!(
		service.index_message(Uuid::new_v4()).await.expect("index"),
		IndexOutcome::Skipped
	);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
