//! Aggregate builder: collects appliers, rules and storage overrides, then
//! resolves them against a context into an [`AggregateManager`].
//!
//! Overrides are factories taking `&C`, so a per-operation handle (a pool,
//! a transaction scope, a tenant) can be pulled in every time
//! [`AggregateBuilder::build`] runs. The builder itself is built once at
//! startup and shared.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::aggregate::{AggregateId, Applier, Creator};
use crate::clock::{Clock, SystemClock};
use crate::event::{DomainEvent, EventKind, EventRecord, StreamEvent, UnknownEvent};
use crate::manager::{AggregateManager, AggregateOptions, InvalidStatePolicy};
use crate::repository::{
    EventLoader, EventSaver, EventStore, InMemorySaver, SeededLoader, StoreLoader, StoreSaver,
};
use crate::validation::{ValidationRule, Validator, rule_validator};

type Handler<S, E> = Arc<dyn Fn(&mut S, &E) + Send + Sync>;
type UnknownHandler<S> = Arc<dyn Fn(&mut S, &UnknownEvent) + Send + Sync>;
type Factory<C, T> = Box<dyn Fn(&C) -> T + Send + Sync>;
type ApplierFactory<C, S, E> = Box<dyn Fn(&C, EventHandlers<S, E>) -> Applier<S, E> + Send + Sync>;
type ValidatorFactory<C, S> = Box<dyn Fn(&C, &[ValidationRule<S>]) -> Validator<S> + Send + Sync>;

/// Dispatch table from event type tag to applier.
pub struct EventHandlers<S, E> {
    handlers: HashMap<&'static str, Handler<S, E>>,
    unknown: Option<UnknownHandler<S>>,
}

impl<S, E> EventHandlers<S, E>
where
    S: 'static,
    E: DomainEvent,
{
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            unknown: None,
        }
    }

    /// Registers the applier for `K`, replacing any earlier one.
    pub fn register<K>(&mut self, apply: impl Fn(&mut S, &K) + Send + Sync + 'static)
    where
        K: EventKind<E>,
    {
        let handler: Handler<S, E> = Arc::new(move |state: &mut S, event: &E| {
            if let Some(payload) = K::from_event(event) {
                apply(state, payload);
            }
        });
        self.handlers.insert(K::EVENT_TYPE, handler);
    }

    /// Registers the applier for unknown-event placeholders.
    pub fn register_unknown(
        &mut self,
        apply: impl Fn(&mut S, &UnknownEvent) + Send + Sync + 'static,
    ) {
        self.unknown = Some(Arc::new(apply));
    }

    /// Returns `true` if a handler is registered for `event_type`.
    #[must_use]
    pub fn handles(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    /// Applies `event` to `state`. Unregistered kinds and unhandled
    /// placeholders leave the state untouched.
    pub fn dispatch(&self, state: &mut S, event: &StreamEvent<E>) {
        match event {
            StreamEvent::Domain(domain) => {
                if let Some(handler) = self.handlers.get(domain.event_type()) {
                    handler(state, domain);
                }
            }
            StreamEvent::Unknown(unknown) => {
                if let Some(handler) = &self.unknown {
                    handler(state, unknown);
                }
            }
        }
    }

    /// Turns the table into an [`Applier`].
    #[must_use]
    pub fn into_applier(self) -> Applier<S, E> {
        Arc::new(move |state: &mut S, event: &StreamEvent<E>| {
            self.dispatch(state, event);
        })
    }
}

impl<S: 'static, E: DomainEvent> Default for EventHandlers<S, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, E> Clone for EventHandlers<S, E> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
            unknown: self.unknown.clone(),
        }
    }
}

impl<S, E> fmt::Debug for EventHandlers<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&&'static str> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("EventHandlers")
            .field("kinds", &kinds)
            .field("handles_unknown", &self.unknown.is_some())
            .finish()
    }
}

/// Fluent configuration of one aggregate kind.
///
/// `C` is the context handed to [`AggregateBuilder::build`]; use `()` when
/// no override needs one.
pub struct AggregateBuilder<S, Id, E, C = ()> {
    creator: Creator<S, Id>,
    creator_factory: Option<Factory<C, Creator<S, Id>>>,
    handlers: EventHandlers<S, E>,
    rules: Vec<ValidationRule<S>>,
    seeded: Option<Vec<E>>,
    applier_factory: Option<ApplierFactory<C, S, E>>,
    validator_factory: Option<ValidatorFactory<C, S>>,
    store: Option<Factory<C, Arc<dyn EventStore<Id, E>>>>,
    loader: Option<Factory<C, Arc<dyn EventLoader<Id, E>>>>,
    saver: Option<Factory<C, Arc<dyn EventSaver<S, Id, E>>>>,
    clock: Arc<dyn Clock>,
    invalid_state_policy: InvalidStatePolicy,
}

impl<S, Id, E, C> AggregateBuilder<S, Id, E, C>
where
    S: Send + Sync + 'static,
    Id: AggregateId,
    E: DomainEvent,
    C: 'static,
{
    /// Starts a builder whose initial state comes from `creator`.
    pub fn new(creator: impl Fn(&Id) -> S + Send + Sync + 'static) -> Self {
        Self {
            creator: Arc::new(creator),
            creator_factory: None,
            handlers: EventHandlers::new(),
            rules: Vec::new(),
            seeded: None,
            applier_factory: None,
            validator_factory: None,
            store: None,
            loader: None,
            saver: None,
            clock: Arc::new(SystemClock),
            invalid_state_policy: InvalidStatePolicy::default(),
        }
    }

    /// Starts a builder whose every aggregate begins as a clone of
    /// `initial`.
    pub fn from_initial(initial: S) -> Self
    where
        S: Clone,
    {
        Self::new(move |_| initial.clone())
    }

    /// Registers the applier for event kind `K`.
    #[must_use]
    pub fn with_applier<K>(mut self, apply: impl Fn(&mut S, &K) + Send + Sync + 'static) -> Self
    where
        K: EventKind<E>,
    {
        self.handlers.register(apply);
        self
    }

    /// Registers the applier for unknown-event placeholders met during
    /// replay. Without one they are skipped.
    #[must_use]
    pub fn with_unknown_applier(
        mut self,
        apply: impl Fn(&mut S, &UnknownEvent) + Send + Sync + 'static,
    ) -> Self {
        self.handlers.register_unknown(apply);
        self
    }

    /// Adds a rule. The rule fails, emitting `message`, when `predicate`
    /// returns `false`.
    #[must_use]
    pub fn with_rule(
        mut self,
        predicate: impl Fn(&S) -> bool + Send + Sync + 'static,
        message: impl Into<String>,
    ) -> Self {
        self.rules.push(ValidationRule::new(predicate, message));
        self
    }

    /// Seeds the loader with a fixed committed history. The events are
    /// stamped with the builder's clock each time the options are resolved.
    /// Replaces any loader set earlier.
    #[must_use]
    pub fn with_events(mut self, events: impl IntoIterator<Item = E>) -> Self {
        self.seeded = Some(events.into_iter().collect());
        self.loader = None;
        self
    }

    /// Overrides the creator, resolved against the context at build time.
    #[must_use]
    pub fn with_creator(
        mut self,
        factory: impl Fn(&C) -> Creator<S, Id> + Send + Sync + 'static,
    ) -> Self {
        self.creator_factory = Some(Box::new(factory));
        self
    }

    /// Overrides the applier. The factory receives the registered dispatch
    /// table so it can wrap it.
    #[must_use]
    pub fn with_applier_factory(
        mut self,
        factory: impl Fn(&C, EventHandlers<S, E>) -> Applier<S, E> + Send + Sync + 'static,
    ) -> Self {
        self.applier_factory = Some(Box::new(factory));
        self
    }

    /// Overrides the validator. The factory receives the registered rules.
    #[must_use]
    pub fn with_validator_factory(
        mut self,
        factory: impl Fn(&C, &[ValidationRule<S>]) -> Validator<S> + Send + Sync + 'static,
    ) -> Self {
        self.validator_factory = Some(Box::new(factory));
        self
    }

    /// Uses `factory`'s store for both loading and saving unless a more
    /// specific loader or saver is configured.
    #[must_use]
    pub fn with_store(
        mut self,
        factory: impl Fn(&C) -> Arc<dyn EventStore<Id, E>> + Send + Sync + 'static,
    ) -> Self {
        self.store = Some(Box::new(factory));
        self
    }

    /// Overrides the loader.
    #[must_use]
    pub fn with_loader(
        mut self,
        factory: impl Fn(&C) -> Arc<dyn EventLoader<Id, E>> + Send + Sync + 'static,
    ) -> Self {
        self.loader = Some(Box::new(factory));
        self.seeded = None;
        self
    }

    /// Overrides the saver.
    #[must_use]
    pub fn with_saver(
        mut self,
        factory: impl Fn(&C) -> Arc<dyn EventSaver<S, Id, E>> + Send + Sync + 'static,
    ) -> Self {
        self.saver = Some(Box::new(factory));
        self
    }

    /// Replaces the clock used to stamp appended events.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Chooses what `save` does with an aggregate that fails validation.
    #[must_use]
    pub fn with_invalid_state_policy(mut self, policy: InvalidStatePolicy) -> Self {
        self.invalid_state_policy = policy;
        self
    }

    /// Resolves every factory against `ctx` and returns the options.
    pub fn options(&self, ctx: &C) -> AggregateOptions<S, Id, E> {
        let creator = match &self.creator_factory {
            Some(factory) => factory(ctx),
            None => Arc::clone(&self.creator),
        };
        let applier = match &self.applier_factory {
            Some(factory) => factory(ctx, self.handlers.clone()),
            None => self.handlers.clone().into_applier(),
        };
        let validator = match &self.validator_factory {
            Some(factory) => factory(ctx, &self.rules),
            None => rule_validator(&self.rules),
        };

        let store = self.store.as_ref().map(|factory| factory(ctx));
        let loader: Arc<dyn EventLoader<Id, E>> = match (&self.loader, &self.seeded, &store) {
            (Some(factory), _, _) => factory(ctx),
            (None, Some(events), _) => {
                let now = self.clock.now();
                let records = events
                    .iter()
                    .map(|event| EventRecord::new(event.clone(), now))
                    .collect();
                Arc::new(SeededLoader::new(records))
            }
            (None, None, Some(store)) => Arc::new(StoreLoader::new(Arc::clone(store))),
            (None, None, None) => Arc::new(SeededLoader::new(Vec::new())),
        };
        let saver: Arc<dyn EventSaver<S, Id, E>> = match (&self.saver, store) {
            (Some(factory), _) => factory(ctx),
            (None, Some(store)) => Arc::new(StoreSaver::new(store)),
            (None, None) => Arc::new(InMemorySaver),
        };

        AggregateOptions {
            creator,
            applier,
            validator,
            loader,
            saver,
            clock: Arc::clone(&self.clock),
            invalid_state_policy: self.invalid_state_policy,
        }
    }

    /// Builds a manager for one logical operation.
    pub fn build(&self, ctx: &C) -> AggregateManager<S, Id, E> {
        AggregateManager::new(self.options(ctx))
    }
}

impl<S, Id, E, C> fmt::Debug for AggregateBuilder<S, Id, E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateBuilder")
            .field("handlers", &self.handlers)
            .field("rules", &self.rules)
            .field("invalid_state_policy", &self.invalid_state_policy)
            .finish_non_exhaustive()
    }
}
