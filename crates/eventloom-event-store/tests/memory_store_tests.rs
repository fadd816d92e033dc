//! The engine running against the in-memory store.

use std::sync::Arc;

use eventloom_core::repository::{EventSaver, EventStore};
use eventloom_core::{AggregateManager, DomainError};
use eventloom_event_store::{
    InMemoryEventStore, InMemorySnapshotStore, JsonEventSerializer, Snapshot, SnapshotStore,
};
use eventloom_test_support::fixtures::{
    Account, AccountEvent, Deposited, Opened, Withdrawn, account_builder, deposited, opened,
    withdrawn,
};

struct Backend {
    events: InMemoryEventStore<u64, AccountEvent>,
    snapshots: InMemorySnapshotStore<u64>,
}

impl Backend {
    fn new() -> Self {
        let snapshots = InMemorySnapshotStore::new();
        let events = InMemoryEventStore::new(Arc::new(
            JsonEventSerializer::new()
                .register::<Opened>()
                .register::<Deposited>()
                .register::<Withdrawn>(),
        ))
        .with_snapshots(snapshots.clone());
        Self { events, snapshots }
    }
}

fn manager(backend: &Backend) -> AggregateManager<Account, u64, AccountEvent> {
    account_builder::<u64, Backend>()
        .with_store(|backend: &Backend| {
            Arc::new(backend.events.clone()) as Arc<dyn EventStore<u64, AccountEvent>>
        })
        .with_saver(|backend: &Backend| {
            Arc::new(backend.events.clone()) as Arc<dyn EventSaver<Account, u64, AccountEvent>>
        })
        .build(backend)
}

#[tokio::test]
async fn test_saved_state_survives_reload() {
    // Arrange
    let backend = Backend::new();
    let manager = manager(&backend);
    let mut aggregate = manager.create(1);
    aggregate.apply(opened("jane"));
    aggregate.apply(deposited(50));
    aggregate.apply(withdrawn(20));
    let before = aggregate.state().clone();

    // Act
    let saved = manager.save(aggregate).await.unwrap();
    let reloaded = manager.load(1).await.unwrap();

    // Assert
    assert_eq!(saved.state(), &before);
    assert_eq!(reloaded.state(), &before);
    assert_eq!(reloaded.version(), 3);
    assert_eq!(reloaded.expected_version(), 3);
}

#[tokio::test]
async fn test_save_writes_snapshot_of_new_state() {
    let backend = Backend::new();
    let manager = manager(&backend);
    let mut aggregate = manager.create(3);
    aggregate.apply(opened("jane"));
    let aggregate = manager.save(aggregate).await.unwrap();
    let mut aggregate = manager.load(*aggregate.id()).await.unwrap();
    aggregate.apply(deposited(9));
    manager.save(aggregate).await.unwrap();

    let snapshot: Option<Snapshot<u64, Account>> = backend.snapshots.find_by_id(&3).await.unwrap();

    let snapshot = snapshot.unwrap();
    assert_eq!(snapshot.version, 2);
    assert_eq!(
        snapshot.state,
        Account {
            owner: "jane".to_owned(),
            balance: 9,
        }
    );
}

#[tokio::test]
async fn test_second_writer_from_same_version_conflicts() {
    // Arrange
    let backend = Backend::new();
    let manager = manager(&backend);
    let mut seed = manager.create(1);
    seed.apply(opened("jane"));
    manager.save(seed).await.unwrap();
    let mut first = manager.load(1).await.unwrap();
    let mut second = manager.load(1).await.unwrap();
    first.apply(deposited(1));
    second.apply(deposited(2));

    // Act
    let first = manager.save(first).await.unwrap();
    let err = manager.save(second).await.unwrap_err();

    // Assert
    assert_eq!(first.version(), 2);
    assert!(err.is_conflict());
    let (error, second) = err.into_parts();
    assert!(matches!(
        error,
        DomainError::ConcurrencyConflict {
            expected: 1,
            actual: 2,
            ..
        }
    ));
    assert_eq!(second.uncommitted_events().len(), 1);
    let snapshot: Option<Snapshot<u64, Account>> = backend.snapshots.find_by_id(&1).await.unwrap();
    assert_eq!(snapshot.unwrap().state.balance, 1);
}

#[tokio::test]
async fn test_reload_after_conflict_then_retry_succeeds() {
    let backend = Backend::new();
    let manager = manager(&backend);
    let mut stale = manager.create(1);
    stale.apply(opened("jane"));
    let mut winner = manager.create(1);
    winner.apply(opened("john"));
    manager.save(winner).await.unwrap();
    assert!(manager.save(stale).await.is_err());

    let mut fresh = manager.load(1).await.unwrap();
    fresh.apply(deposited(4));
    let saved = manager.save(fresh).await.unwrap();

    assert_eq!(saved.version(), 2);
    assert_eq!(saved.state().owner, "john");
    assert_eq!(saved.state().balance, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_leave_snapshot_at_stream_version() {
    // Arrange
    let backend = Backend::new();
    let manager = manager(&backend);
    let mut seed = manager.create(1);
    seed.apply(opened("jane"));
    manager.save(seed).await.unwrap();

    // Act
    let writers: Vec<_> = (1..=8)
        .map(|amount| {
            let manager = manager.clone();
            tokio::spawn(async move {
                loop {
                    let mut aggregate = manager.load(1).await.unwrap();
                    aggregate.apply(deposited(amount));
                    match manager.save(aggregate).await {
                        Ok(_) => break,
                        Err(err) if err.is_conflict() => tokio::task::yield_now().await,
                        Err(err) => panic!("unexpected save error: {err}"),
                    }
                }
            })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap();
    }

    // Assert
    let reloaded = manager.load(1).await.unwrap();
    let snapshot: Option<Snapshot<u64, Account>> = backend.snapshots.find_by_id(&1).await.unwrap();
    let snapshot = snapshot.unwrap();
    assert_eq!(reloaded.version(), 9);
    assert_eq!(reloaded.state().balance, 36);
    assert_eq!(snapshot.version, reloaded.version());
    assert_eq!(&snapshot.state, reloaded.state());
}

#[tokio::test]
async fn test_older_save_does_not_replace_newer_snapshot() {
    // Arrange
    let backend = Backend::new();
    let manager = manager(&backend);
    let mut aggregate = manager.create(2);
    aggregate.apply(opened("jane"));
    aggregate.apply(deposited(1));
    manager.save(aggregate).await.unwrap();
    backend
        .snapshots
        .upsert(
            &2,
            5,
            &Account {
                owner: "jane".to_owned(),
                balance: 500,
            },
        )
        .await
        .unwrap();

    // Act
    let mut aggregate = manager.load(2).await.unwrap();
    aggregate.apply(deposited(100));
    manager.save(aggregate).await.unwrap();

    // Assert
    let snapshot: Option<Snapshot<u64, Account>> = backend.snapshots.find_by_id(&2).await.unwrap();
    let snapshot = snapshot.unwrap();
    assert_eq!(snapshot.version, 5);
    assert_eq!(snapshot.state.balance, 500);
}
