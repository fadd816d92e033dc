//! Integration tests for `PgEventStore`.
//!
//! They run against the `PostgreSQL` behind `DATABASE_URL` and return early
//! when it is unset. Every test creates its own tables.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use eventloom_core::aggregate::Aggregate;
use eventloom_core::error::DomainError;
use eventloom_core::event::EventRecord;
use eventloom_core::repository::{EventSaver, EventStore};
use eventloom_event_store::{
    JsonEventSerializer, PgEventStore, PgSnapshotStore, Snapshot, SnapshotStore, StoreConfig,
};
use eventloom_test_support::FixedClock;
use eventloom_test_support::fixtures::{
    Account, AccountEvent, Deposited, Opened, Withdrawn, account_builder, deposited, opened,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

/// Connects to `DATABASE_URL`, or returns `None` when it is unset.
async fn test_pool() -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping PostgreSQL test");
        return None;
    };
    Some(
        PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .unwrap(),
    )
}

fn unique_table(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

fn events_config() -> StoreConfig {
    StoreConfig::new(&unique_table("events")).unwrap()
}

async fn store(pool: PgPool, config: StoreConfig) -> PgEventStore<AccountEvent> {
    let store = PgEventStore::new(
        pool,
        config,
        Arc::new(
            JsonEventSerializer::new()
                .register::<Opened>()
                .register::<Deposited>()
                .register::<Withdrawn>(),
        ),
    );
    store.ensure_schema().await.unwrap();
    store
}

fn records(events: Vec<AccountEvent>) -> Vec<EventRecord<AccountEvent>> {
    let at = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
    events
        .into_iter()
        .map(|event| EventRecord::new(event, at))
        .collect()
}

// --- load_stream ---

#[tokio::test]
async fn test_load_stream_returns_empty_vec_for_unknown_stream() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = store(pool, events_config()).await;

    let loaded = store.load_stream(&Uuid::new_v4()).await.unwrap();

    assert!(loaded.is_empty());
}

// --- save_events + load_stream round-trip ---

#[tokio::test]
async fn test_saved_events_load_back_in_order() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = store(pool, events_config()).await;
    let stream_id = Uuid::new_v4();
    let first = records(vec![opened("jane")]);
    let second = records(vec![deposited(5), deposited(7)]);

    store.save_events(&stream_id, 0, &first).await.unwrap();
    store.save_events(&stream_id, 1, &second).await.unwrap();

    let loaded = store.load_stream(&stream_id).await.unwrap();
    let mut expected = first;
    expected.extend(second);
    assert_eq!(loaded, expected);
}

#[tokio::test]
async fn test_rows_carry_tag_and_version() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = store(pool.clone(), events_config()).await;
    let stream_id = Uuid::new_v4();

    store
        .save_events(&stream_id, 0, &records(vec![opened("jane"), deposited(1)]))
        .await
        .unwrap();

    let sql = format!(
        "SELECT version, event_name FROM {} WHERE stream_id = $1 ORDER BY version",
        store.config().events_table.quoted()
    );
    let rows: Vec<(i64, String)> = sqlx::query_as(&sql)
        .bind(stream_id)
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(
        rows,
        vec![
            (1, "account.opened".to_owned()),
            (2, "account.deposited".to_owned()),
        ]
    );
}

// --- stream isolation ---

#[tokio::test]
async fn test_stream_isolation() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = store(pool, events_config()).await;
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    store.save_events(&a, 0, &records(vec![opened("a")])).await.unwrap();
    store.save_events(&b, 0, &records(vec![opened("b")])).await.unwrap();

    assert_eq!(store.load_stream(&a).await.unwrap(), records(vec![opened("a")]));
    assert_eq!(store.load_stream(&b).await.unwrap(), records(vec![opened("b")]));
}

// --- concurrency ---

#[tokio::test]
async fn test_concurrency_conflict_on_taken_version() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = store(pool, events_config()).await;
    let stream_id = Uuid::new_v4();
    store
        .save_events(&stream_id, 0, &records(vec![opened("jane"), deposited(1)]))
        .await
        .unwrap();

    let result = store
        .save_events(&stream_id, 1, &records(vec![deposited(2)]))
        .await;

    match result {
        Err(DomainError::ConcurrencyConflict {
            aggregate_id,
            expected,
            actual,
        }) => {
            assert_eq!(aggregate_id, stream_id.to_string());
            assert_eq!(expected, 1);
            assert_eq!(actual, 2);
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
    assert_eq!(store.load_stream(&stream_id).await.unwrap().len(), 2);
}

// --- unknown-event recovery ---

#[tokio::test]
async fn test_unregistered_tag_loads_as_placeholder() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = store(pool.clone(), events_config()).await;
    let stream_id = Uuid::new_v4();
    store
        .save_events(&stream_id, 0, &records(vec![opened("jane")]))
        .await
        .unwrap();
    let sql = format!(
        "INSERT INTO {} (id, stream_id, version, event_name, payload, occurred_on) \
         VALUES ($1, $2, 2, 'account.frozen', $3, NOW())",
        store.config().events_table.quoted()
    );
    sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(stream_id)
        .bind(b"{}".to_vec())
        .execute(&pool)
        .await
        .unwrap();

    let loaded = store.load_stream(&stream_id).await.unwrap();

    assert_eq!(loaded.len(), 2);
    assert!(loaded[1].event.is_unknown());
    assert_eq!(loaded[1].event_type, "account.frozen");
}

// --- saver with snapshots ---

fn snapshot_config() -> StoreConfig {
    events_config()
        .with_snapshots(&unique_table("accounts"))
        .unwrap()
}

fn snapshotting_manager(
    store: &PgEventStore<AccountEvent>,
) -> eventloom_core::AggregateManager<Account, Uuid, AccountEvent> {
    account_builder::<Uuid, ()>()
        .with_clock(Arc::new(FixedClock::reference()))
        .with_store({
            let store = store.clone();
            move |()| Arc::new(store.clone()) as Arc<dyn EventStore<Uuid, AccountEvent>>
        })
        .with_saver({
            let store = store.clone();
            move |()| Arc::new(store.clone()) as Arc<dyn EventSaver<Account, Uuid, AccountEvent>>
        })
        .build(&())
}

#[tokio::test]
async fn test_saver_writes_events_and_snapshot_together() {
    // Arrange
    let Some(pool) = test_pool().await else {
        return;
    };
    let config = snapshot_config();
    let store = store(pool.clone(), config.clone()).await;
    let manager = snapshotting_manager(&store);
    let id = Uuid::new_v4();
    let mut aggregate: Aggregate<Account, Uuid, AccountEvent> = manager.create(id);
    aggregate.apply(opened("jane"));
    aggregate.apply(deposited(40));

    // Act
    let saved = manager.save(aggregate).await.unwrap();

    // Assert
    assert_eq!(saved.version(), 2);
    let snapshots = PgSnapshotStore::new(pool, config.snapshot_table.unwrap());
    let snapshot: Option<Snapshot<Uuid, Account>> = snapshots.find_by_id(&id).await.unwrap();
    let snapshot = snapshot.unwrap();
    assert_eq!(snapshot.version, 2);
    assert_eq!(snapshot.state, saved.state().clone());
    assert_eq!(snapshot.updated_at, FixedClock::reference().0);
    let reloaded = manager.load(id).await.unwrap();
    assert_eq!(reloaded.state(), saved.state());
}

#[tokio::test]
async fn test_conflicting_save_leaves_events_and_snapshot_untouched() {
    // Arrange
    let Some(pool) = test_pool().await else {
        return;
    };
    let config = snapshot_config();
    let store = store(pool.clone(), config.clone()).await;
    let manager = snapshotting_manager(&store);
    let id = Uuid::new_v4();
    let mut seed = manager.create(id);
    seed.apply(opened("jane"));
    manager.save(seed).await.unwrap();
    let mut first = manager.load(id).await.unwrap();
    let mut second = manager.load(id).await.unwrap();
    first.apply(deposited(1));
    second.apply(deposited(2));
    manager.save(first).await.unwrap();

    // Act
    let err = manager.save(second).await.unwrap_err();

    // Assert
    assert!(err.is_conflict());
    assert_eq!(store.load_stream(&id).await.unwrap().len(), 2);
    let snapshots = PgSnapshotStore::new(pool, config.snapshot_table.unwrap());
    let snapshot: Option<Snapshot<Uuid, Account>> = snapshots.find_by_id(&id).await.unwrap();
    let snapshot = snapshot.unwrap();
    assert_eq!(snapshot.version, 2);
    assert_eq!(snapshot.state.balance, 1);
}

#[tokio::test]
async fn test_snapshot_upsert_keeps_later_version() {
    // Arrange
    let Some(pool) = test_pool().await else {
        return;
    };
    let config = snapshot_config();
    store(pool.clone(), config.clone()).await;
    let snapshots = PgSnapshotStore::new(pool, config.snapshot_table.unwrap());
    let id = Uuid::new_v4();
    let newer = Account {
        owner: "jane".to_owned(),
        balance: 40,
    };
    snapshots.upsert(&id, 3, &newer).await.unwrap();

    // Act
    snapshots
        .upsert(
            &id,
            2,
            &Account {
                owner: "jane".to_owned(),
                balance: 1,
            },
        )
        .await
        .unwrap();

    // Assert
    let snapshot: Option<Snapshot<Uuid, Account>> = snapshots.find_by_id(&id).await.unwrap();
    let snapshot = snapshot.unwrap();
    assert_eq!(snapshot.version, 3);
    assert_eq!(snapshot.state, newer);
}
