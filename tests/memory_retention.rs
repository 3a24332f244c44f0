// tests/memory_retention.rs
// Memory round-trips, retention windows, and conversation cascade

mod test_helpers;

use std::sync::Arc;

use chrono::{Duration, Utc};

use tutor_engine::error::EngineError;
use tutor_engine::memory::{
    MemoryStore, RetentionManager, Role, Scope, TextChunker, TurnMessage,
};
use tutor_engine::testing::{InMemoryIndex, MockEmbeddings, ScriptedGenerator};

fn store_with_index() -> (Arc<MemoryStore>, Arc<InMemoryIndex>) {
    let index = Arc::new(InMemoryIndex::new());
    let embeddings = Arc::new(MockEmbeddings::new(test_helpers::DIM));
    let chunker = TextChunker::new(500, 50).expect("valid chunker");
    let store = Arc::new(MemoryStore::new(index.clone(), embeddings, chunker));
    (store, index)
}

#[tokio::test]
async fn test_turn_pair_round_trips_in_order() {
    let (store, _index) = store_with_index();
    let scope = Scope::conversation("u1", "c1");
    let at = Utc::now();

    store
        .store(
            &scope,
            &[
                TurnMessage::new(Role::User, "what is osmosis?", at),
                TurnMessage::new(Role::Assistant, "diffusion across a membrane", at),
            ],
        )
        .await;

    let records = store.query_recent(&scope, 10).await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].role, Role::User);
    assert_eq!(records[0].content, "what is osmosis?");
    assert_eq!(records[1].role, Role::Assistant);
}

#[tokio::test]
async fn test_duplicate_store_does_not_duplicate_records() {
    let (store, index) = store_with_index();
    let scope = Scope::conversation("u1", "c1");
    let at = Utc::now();
    let turn = [TurnMessage::new(Role::User, "same content", at)];

    store.store(&scope, &turn).await;
    store.store(&scope, &turn).await;

    assert_eq!(index.len(), 1, "identical writes re-upsert the same point");
}

#[tokio::test]
async fn test_retention_prunes_oldest_beyond_window() {
    let (store, _index) = store_with_index();
    let retention = RetentionManager::new(store.clone(), 4);
    let scope = Scope::conversation("u1", "c1");
    let base = Utc::now();

    for i in 0..8i64 {
        store
            .store(
                &scope,
                &[TurnMessage::new(
                    Role::User,
                    format!("message number {}", i),
                    base + Duration::seconds(i),
                )],
            )
            .await;
    }

    let pruned = retention.prune(&scope).await;
    assert_eq!(pruned, 4);

    let remaining = store.scope_records(&scope).await;
    assert_eq!(remaining.len(), 4);
    // The survivors are the newest records, still in chronological order.
    let contents: Vec<&str> = remaining.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(
        contents,
        vec![
            "message number 4",
            "message number 5",
            "message number 6",
            "message number 7"
        ]
    );
}

#[tokio::test]
async fn test_prune_is_idempotent() {
    let (store, _index) = store_with_index();
    let retention = RetentionManager::new(store.clone(), 2);
    let scope = Scope::conversation("u1", "c1");
    let base = Utc::now();

    for i in 0..5i64 {
        store
            .store(
                &scope,
                &[TurnMessage::new(
                    Role::User,
                    format!("entry {}", i),
                    base + Duration::seconds(i),
                )],
            )
            .await;
    }

    assert_eq!(retention.prune(&scope).await, 3);
    assert_eq!(retention.prune(&scope).await, 0);
    assert_eq!(store.scope_records(&scope).await.len(), 2);
}

#[tokio::test]
async fn test_retention_leaves_other_scopes_alone() {
    let (store, _index) = store_with_index();
    let retention = RetentionManager::new(store.clone(), 1);
    let base = Utc::now();

    let pruned_scope = Scope::conversation("u1", "c1");
    let other_scope = Scope::conversation("u1", "c2");
    for i in 0..3i64 {
        let at = base + Duration::seconds(i);
        store
            .store(&pruned_scope, &[TurnMessage::new(Role::User, format!("a{}", i), at)])
            .await;
        store
            .store(&other_scope, &[TurnMessage::new(Role::User, format!("b{}", i), at)])
            .await;
    }

    retention.prune(&pruned_scope).await;

    assert_eq!(store.scope_records(&pruned_scope).await.len(), 1);
    assert_eq!(store.scope_records(&other_scope).await.len(), 3);
}

#[tokio::test]
async fn test_user_scope_spans_conversations() {
    let (store, _index) = store_with_index();
    let at = Utc::now();

    store
        .store(
            &Scope::conversation("u1", "c1"),
            &[TurnMessage::new(Role::User, "algebra question", at)],
        )
        .await;
    store
        .store(
            &Scope::conversation("u1", "c2"),
            &[TurnMessage::new(Role::User, "chemistry question", at)],
        )
        .await;
    store
        .store(
            &Scope::conversation("other", "c3"),
            &[TurnMessage::new(Role::User, "someone else entirely", at)],
        )
        .await;

    let all = store.scope_records(&Scope::user("u1")).await;
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|r| r.user_id == "u1"));
}

#[tokio::test]
async fn test_similarity_query_prefers_matching_content() {
    let (store, _index) = store_with_index();
    let at = Utc::now();

    store
        .store(
            &Scope::conversation("u1", "c1"),
            &[
                TurnMessage::new(Role::User, "photosynthesis in green plants", at),
                TurnMessage::new(Role::User, "zzzz qqqq xxxx", at),
            ],
        )
        .await;

    let hits = store
        .query_similar(&Scope::user("u1"), "photosynthesis in green plants", 1)
        .await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "photosynthesis in green plants");
    assert!(hits[0].score.is_some());
}

#[tokio::test]
async fn test_delete_conversation_cascades_everywhere() {
    let engine = test_helpers::engine_with(ScriptedGenerator::new(&["answer"])).await;

    let kept = engine
        .state
        .chat
        .send_message("u1", None, "thread to keep")
        .await
        .expect("kept turn");
    let doomed = engine
        .state
        .chat
        .send_message("u1", None, "thread to delete")
        .await
        .expect("doomed turn");

    engine
        .state
        .registry
        .delete(&doomed.conversation_id, "u1")
        .await
        .expect("delete");

    // Rows, listing and memory records for the deleted conversation are gone.
    let lookup = engine
        .state
        .registry
        .get(&doomed.conversation_id, "u1")
        .await;
    assert!(matches!(lookup, Err(EngineError::NotFound(_))));

    let remaining = engine.state.registry.list("u1").await.expect("list");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, kept.conversation_id);

    let records = engine.index.records();
    assert!(records
        .iter()
        .all(|r| r.conversation_id.as_deref() != Some(doomed.conversation_id.as_str())));
    assert!(records
        .iter()
        .any(|r| r.conversation_id.as_deref() == Some(kept.conversation_id.as_str())));
}

#[tokio::test]
async fn test_foreign_delete_is_rejected_and_changes_nothing() {
    let engine = test_helpers::engine_with(ScriptedGenerator::new(&["answer"])).await;

    let owned = engine
        .state
        .chat
        .send_message("alice", None, "private thread")
        .await
        .expect("turn");

    let result = engine
        .state
        .registry
        .delete(&owned.conversation_id, "mallory")
        .await;
    assert!(matches!(result, Err(EngineError::Unauthorized(_))));

    let count = engine
        .state
        .registry
        .message_count(&owned.conversation_id)
        .await
        .expect("count");
    assert_eq!(count, 2);
    assert!(!engine.index.is_empty());
}
