//! Domain event abstractions.
//!
//! Every aggregate declares its events as one closed enum. Each variant wraps
//! a payload type that knows its own stable tag (`EventKind::EVENT_TYPE`), so
//! appliers and serializers can be registered per payload while dispatch
//! stays a plain `match` on the enum.

use chrono::{DateTime, Utc};

/// Trait implemented by an aggregate's event enum.
pub trait DomainEvent: Clone + Send + Sync + std::fmt::Debug + 'static {
    /// Returns the stable type tag of the variant (used for storage and
    /// applier dispatch).
    fn event_type(&self) -> &'static str;
}

/// A single event payload that lives inside the event enum `E`.
pub trait EventKind<E>: Sized + Send + Sync + 'static {
    /// Stable type tag written next to the payload in storage.
    const EVENT_TYPE: &'static str;

    /// Borrows the payload if `event` is this kind.
    fn from_event(event: &E) -> Option<&Self>;

    /// Wraps the payload into the event enum.
    fn into_event(self) -> E;
}

/// Placeholder for a stored event whose tag could not be resolved or whose
/// payload could not be decoded. Carries the original tag and raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEvent {
    /// The tag found in storage.
    pub event_type: String,
    /// The raw stored payload.
    pub payload: Vec<u8>,
}

/// What an applier sees while folding a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent<E> {
    /// A decoded event of the aggregate's own enum.
    Domain(E),
    /// An unresolved historical event.
    Unknown(UnknownEvent),
}

impl<E: DomainEvent> StreamEvent<E> {
    /// Returns the type tag of the wrapped event.
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::Domain(event) => event.event_type(),
            Self::Unknown(unknown) => &unknown.event_type,
        }
    }

    /// Returns the decoded event, if this is not a placeholder.
    #[must_use]
    pub fn as_domain(&self) -> Option<&E> {
        match self {
            Self::Domain(event) => Some(event),
            Self::Unknown(_) => None,
        }
    }

    /// Returns `true` for unknown-event placeholders.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

/// Stream membership wrapper created when an event is appended.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord<E> {
    /// The wrapped event.
    pub event: StreamEvent<E>,
    /// Type tag of the wrapped event.
    pub event_type: String,
    /// When the event was appended to its stream.
    pub occurred_on: DateTime<Utc>,
}

impl<E: DomainEvent> EventRecord<E> {
    /// Wraps a freshly raised domain event.
    #[must_use]
    pub fn new(event: E, occurred_on: DateTime<Utc>) -> Self {
        Self {
            event_type: event.event_type().to_owned(),
            event: StreamEvent::Domain(event),
            occurred_on,
        }
    }

    /// Wraps a placeholder for an undecodable stored event.
    #[must_use]
    pub fn unknown(unknown: UnknownEvent, occurred_on: DateTime<Utc>) -> Self {
        Self {
            event_type: unknown.event_type.clone(),
            event: StreamEvent::Unknown(unknown),
            occurred_on,
        }
    }
}

/// Declares an aggregate's event enum together with its `DomainEvent` impl,
/// one `EventKind` impl per payload type and `From<payload>` conversions.
/// Each payload type may appear in only one variant.
///
/// ```
/// use eventloom_core::domain_events;
///
/// #[derive(Debug, Clone, PartialEq)]
/// pub struct Opened {
///     pub owner: String,
/// }
///
/// domain_events! {
///     #[derive(Debug, Clone, PartialEq)]
///     pub enum AccountEvent {
///         Opened(Opened) => "account.opened",
///     }
/// }
///
/// use eventloom_core::event::{DomainEvent, EventKind};
/// let event = Opened { owner: "jane".into() }.into_event();
/// assert_eq!(event.event_type(), "account.opened");
/// ```
#[macro_export]
macro_rules! domain_events {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident($payload:ty) => $tag:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant($payload),
            )+
        }

        impl $crate::event::DomainEvent for $name {
            fn event_type(&self) -> &'static str {
                match self {
                    $( Self::$variant(_) => $tag, )+
                }
            }
        }

        $(
            impl $crate::event::EventKind<$name> for $payload {
                const EVENT_TYPE: &'static str = $tag;

                #[allow(unreachable_patterns)]
                fn from_event(event: &$name) -> ::core::option::Option<&Self> {
                    match event {
                        $name::$variant(inner) => ::core::option::Option::Some(inner),
                        _ => ::core::option::Option::None,
                    }
                }

                fn into_event(self) -> $name {
                    $name::$variant(self)
                }
            }

            impl ::core::convert::From<$payload> for $name {
                fn from(payload: $payload) -> Self {
                    $name::$variant(payload)
                }
            }
        )+
    };
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Small event family shared by this crate's unit tests.

    #[derive(Debug, Clone, PartialEq)]
    pub struct Renamed {
        pub name: String,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct Tagged {
        pub tag: String,
    }

    domain_events! {
        #[derive(Debug, Clone, PartialEq)]
        pub enum TestEvent {
            Renamed(Renamed) => "test.renamed",
            Tagged(Tagged) => "test.tagged",
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct TestState {
        pub id: u32,
        pub name: String,
        pub tags: Vec<String>,
        pub unknown_seen: usize,
    }

    pub fn renamed(name: &str) -> TestEvent {
        TestEvent::Renamed(Renamed {
            name: name.to_owned(),
        })
    }

    pub fn tagged(tag: &str) -> TestEvent {
        TestEvent::Tagged(Tagged { tag: tag.to_owned() })
    }
}
