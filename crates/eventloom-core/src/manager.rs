//! Aggregate manager: the create / load / save facade.

use std::fmt;
use std::sync::Arc;

use crate::aggregate::{Aggregate, AggregateId, Applier, Creator};
use crate::clock::Clock;
use crate::error::DomainError;
use crate::event::DomainEvent;
use crate::repository::{EventLoader, EventSaver};
use crate::stream::EventStream;
use crate::validation::Validator;

/// What [`AggregateManager::save`] does with an aggregate whose validator
/// reports messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvalidStatePolicy {
    /// Save anyway. Gating on validity is left to the caller.
    #[default]
    Persist,
    /// Refuse with `DomainError::Validation` without touching the store.
    Reject,
}

/// Fully resolved configuration of one aggregate kind.
pub struct AggregateOptions<S, Id, E> {
    /// Initial state for an identity.
    pub creator: Creator<S, Id>,
    /// Event fold function.
    pub applier: Applier<S, E>,
    /// State validator.
    pub validator: Validator<S>,
    /// Source of committed streams.
    pub loader: Arc<dyn EventLoader<Id, E>>,
    /// Sink for uncommitted events.
    pub saver: Arc<dyn EventSaver<S, Id, E>>,
    /// Clock stamping appended events.
    pub clock: Arc<dyn Clock>,
    /// Save behavior for invalid state.
    pub invalid_state_policy: InvalidStatePolicy,
}

impl<S, Id, E> Clone for AggregateOptions<S, Id, E> {
    fn clone(&self) -> Self {
        Self {
            creator: Arc::clone(&self.creator),
            applier: Arc::clone(&self.applier),
            validator: Arc::clone(&self.validator),
            loader: Arc::clone(&self.loader),
            saver: Arc::clone(&self.saver),
            clock: Arc::clone(&self.clock),
            invalid_state_policy: self.invalid_state_policy,
        }
    }
}

/// A failed save. Hands back the aggregate untouched, with its uncommitted
/// events, so the caller can retry or reload.
pub struct SaveError<S, Id, E> {
    source: DomainError,
    aggregate: Aggregate<S, Id, E>,
}

impl<S, Id, E> SaveError<S, Id, E> {
    /// The underlying error.
    pub fn error(&self) -> &DomainError {
        &self.source
    }

    /// The aggregate that failed to save.
    pub fn aggregate(&self) -> &Aggregate<S, Id, E> {
        &self.aggregate
    }

    /// Splits into the error and the aggregate.
    pub fn into_parts(self) -> (DomainError, Aggregate<S, Id, E>) {
        (self.source, self.aggregate)
    }

    /// Returns `true` if another writer claimed one of the versions.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self.source, DomainError::ConcurrencyConflict { .. })
    }
}

impl<S, Id, E> fmt::Debug for SaveError<S, Id, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveError")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl<S, Id, E> fmt::Display for SaveError<S, Id, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to save aggregate: {}", self.source)
    }
}

impl<S, Id, E> std::error::Error for SaveError<S, Id, E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl<S, Id, E> From<SaveError<S, Id, E>> for DomainError {
    fn from(err: SaveError<S, Id, E>) -> Self {
        err.source
    }
}

/// Creates, loads and saves aggregates of one kind.
///
/// Every call returns a fresh [`Aggregate`]; there is no identity map and no
/// cache, so every load replays from the first event.
pub struct AggregateManager<S, Id, E> {
    options: AggregateOptions<S, Id, E>,
}

impl<S, Id, E> AggregateManager<S, Id, E>
where
    S: Send + Sync + 'static,
    Id: AggregateId,
    E: DomainEvent,
{
    /// Creates a manager from resolved options.
    #[must_use]
    pub fn new(options: AggregateOptions<S, Id, E>) -> Self {
        Self { options }
    }

    /// The options this manager runs with.
    #[must_use]
    pub fn options(&self) -> &AggregateOptions<S, Id, E> {
        &self.options
    }

    /// Creates a new aggregate with no history.
    pub fn create(&self, id: Id) -> Aggregate<S, Id, E> {
        self.rebuild(EventStream::empty(id))
    }

    /// Loads and replays the aggregate's committed history. An identity
    /// with no events yields a fresh aggregate.
    ///
    /// # Errors
    ///
    /// Returns whatever error the loader reports.
    #[tracing::instrument(skip_all, fields(aggregate_id = %id))]
    pub async fn load(&self, id: Id) -> Result<Aggregate<S, Id, E>, DomainError> {
        let stream = self.options.loader.load(&id).await?;
        let aggregate = self.rebuild(stream);
        tracing::debug!(version = aggregate.version(), "aggregate loaded");
        Ok(aggregate)
    }

    /// Persists the aggregate's uncommitted events and returns a new
    /// aggregate rebuilt from the refreshed stream.
    ///
    /// Without uncommitted events this returns `aggregate` as is and never
    /// calls the saver.
    ///
    /// # Errors
    ///
    /// Returns a [`SaveError`] carrying the original aggregate if the saver
    /// fails (for instance with `DomainError::ConcurrencyConflict`) or if
    /// the state is invalid under [`InvalidStatePolicy::Reject`]. Nothing is
    /// retried.
    #[tracing::instrument(
        skip_all,
        fields(
            aggregate_id = %aggregate.id(),
            version = aggregate.version(),
            expected_version = aggregate.expected_version()
        )
    )]
    pub async fn save(
        &self,
        aggregate: Aggregate<S, Id, E>,
    ) -> Result<Aggregate<S, Id, E>, SaveError<S, Id, E>> {
        if !aggregate.has_uncommitted_changes() {
            tracing::debug!("nothing to save");
            return Ok(aggregate);
        }

        if self.options.invalid_state_policy == InvalidStatePolicy::Reject {
            let messages = aggregate.messages();
            if !messages.is_empty() {
                tracing::debug!(messages = messages.len(), "rejecting invalid aggregate");
                return Err(SaveError {
                    source: DomainError::Validation(messages),
                    aggregate,
                });
            }
        }

        match self.options.saver.save(&aggregate).await {
            Ok(stream) => {
                let saved = self.rebuild(stream);
                tracing::debug!(version = saved.version(), "aggregate saved");
                Ok(saved)
            }
            Err(source) => {
                tracing::warn!(error = %source, "aggregate save failed");
                Err(SaveError { source, aggregate })
            }
        }
    }

    fn rebuild(&self, stream: EventStream<Id, E>) -> Aggregate<S, Id, E> {
        let state = (self.options.creator)(stream.id());
        Aggregate::replay(
            state,
            stream.with_clock(Arc::clone(&self.options.clock)),
            Arc::clone(&self.options.applier),
            Arc::clone(&self.options.validator),
        )
    }
}

impl<S, Id, E> Clone for AggregateManager<S, Id, E> {
    fn clone(&self) -> Self {
        Self {
            options: self.options.clone(),
        }
    }
}

impl<S, Id, E> fmt::Debug for AggregateManager<S, Id, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateManager")
            .field("invalid_state_policy", &self.options.invalid_state_policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::builder::AggregateBuilder;
    use crate::event::fixtures::{Renamed, TestEvent, TestState, renamed};

    /// Saver that counts calls and fails with a conflict while `fail` holds.
    #[derive(Default)]
    struct FlakySaver {
        calls: AtomicUsize,
        fail: Mutex<bool>,
    }

    #[async_trait]
    impl EventSaver<TestState, u32, TestEvent> for FlakySaver {
        async fn save(
            &self,
            aggregate: &Aggregate<TestState, u32, TestEvent>,
        ) -> Result<EventStream<u32, TestEvent>, DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if *self.fail.lock().unwrap() {
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_id: aggregate.id().to_string(),
                    expected: aggregate.version(),
                    actual: aggregate.version() + 1,
                });
            }
            Ok(aggregate.stream().commit())
        }
    }

    fn manager_with(
        saver: Arc<FlakySaver>,
        policy: InvalidStatePolicy,
    ) -> AggregateManager<TestState, u32, TestEvent> {
        let builder: AggregateBuilder<TestState, u32, TestEvent> =
            AggregateBuilder::new(|id: &u32| TestState {
                id: *id,
                ..TestState::default()
            });
        builder
            .with_applier(|s: &mut TestState, e: &Renamed| s.name.clone_from(&e.name))
            .with_rule(|s| !s.name.is_empty(), "Name required")
            .with_invalid_state_policy(policy)
            .with_saver(move |()| Arc::clone(&saver) as Arc<dyn EventSaver<TestState, u32, TestEvent>>)
            .build(&())
    }

    #[test]
    fn test_create_starts_from_creator_state() {
        let manager = manager_with(Arc::default(), InvalidStatePolicy::Persist);

        let aggregate = manager.create(5);

        assert_eq!(aggregate.state().id, 5);
        assert_eq!(aggregate.version(), 0);
        assert!(!aggregate.has_uncommitted_changes());
    }

    #[tokio::test]
    async fn test_save_without_changes_skips_saver() {
        // Arrange
        let saver = Arc::new(FlakySaver::default());
        let manager = manager_with(Arc::clone(&saver), InvalidStatePolicy::Persist);
        let aggregate = manager.create(1);

        // Act
        let saved = manager.save(aggregate).await.unwrap();

        // Assert
        assert_eq!(saver.calls.load(Ordering::SeqCst), 0);
        assert_eq!(saved.version(), 0);
    }

    #[tokio::test]
    async fn test_save_rebuilds_new_aggregate_with_advanced_version() {
        // Arrange
        let saver = Arc::new(FlakySaver::default());
        let manager = manager_with(Arc::clone(&saver), InvalidStatePolicy::Persist);
        let mut aggregate = manager.create(1);
        aggregate.apply(renamed("a"));
        aggregate.apply(renamed("b"));
        let before = aggregate.state().clone();

        // Act
        let saved = manager.save(aggregate).await.unwrap();

        // Assert
        assert_eq!(saver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(saved.version(), 2);
        assert_eq!(saved.expected_version(), 2);
        assert_eq!(saved.state(), &before);
    }

    #[tokio::test]
    async fn test_failed_save_hands_back_uncommitted_events() {
        // Arrange
        let saver = Arc::new(FlakySaver::default());
        *saver.fail.lock().unwrap() = true;
        let manager = manager_with(Arc::clone(&saver), InvalidStatePolicy::Persist);
        let mut aggregate = manager.create(1);
        aggregate.apply(renamed("a"));

        // Act
        let err = manager.save(aggregate).await.unwrap_err();

        // Assert
        assert!(err.is_conflict());
        let (_, aggregate) = err.into_parts();
        assert_eq!(aggregate.uncommitted_events().len(), 1);

        // Retrying the same instance succeeds once the conflict is gone.
        *saver.fail.lock().unwrap() = false;
        let saved = manager.save(aggregate).await.unwrap();
        assert_eq!(saved.version(), 1);
        assert_eq!(saver.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_persist_policy_saves_invalid_state() {
        let saver = Arc::new(FlakySaver::default());
        let manager = manager_with(Arc::clone(&saver), InvalidStatePolicy::Persist);
        let mut aggregate = manager.create(1);
        aggregate.apply(renamed(""));
        assert!(!aggregate.is_valid());

        let saved = manager.save(aggregate).await.unwrap();

        assert_eq!(saved.version(), 1);
        assert!(!saved.is_valid());
    }

    #[tokio::test]
    async fn test_reject_policy_refuses_invalid_state_without_store_call() {
        // Arrange
        let saver = Arc::new(FlakySaver::default());
        let manager = manager_with(Arc::clone(&saver), InvalidStatePolicy::Reject);
        let mut aggregate = manager.create(1);
        aggregate.apply(renamed(""));

        // Act
        let err = manager.save(aggregate).await.unwrap_err();

        // Assert
        assert_eq!(saver.calls.load(Ordering::SeqCst), 0);
        match err.error() {
            DomainError::Validation(messages) => {
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].as_str(), "Name required");
            }
            other => panic!("expected Validation, got {other:?}"),
        }
        assert_eq!(err.aggregate().uncommitted_events().len(), 1);
    }

    #[tokio::test]
    async fn test_save_error_converts_into_domain_error() {
        async fn save_and_report(
            manager: &AggregateManager<TestState, u32, TestEvent>,
        ) -> Result<i64, DomainError> {
            let mut aggregate = manager.create(1);
            aggregate.apply(renamed("a"));
            let saved = manager.save(aggregate).await?;
            Ok(saved.version())
        }
        let saver = Arc::new(FlakySaver::default());
        *saver.fail.lock().unwrap() = true;
        let manager = manager_with(saver, InvalidStatePolicy::Persist);

        let result = save_and_report(&manager).await;

        assert!(matches!(
            result,
            Err(DomainError::ConcurrencyConflict { .. })
        ));
    }
}
