//! Event payload serialization keyed by event type tag.

use std::collections::HashMap;
use std::fmt;

use eventloom_core::error::DomainError;
use eventloom_core::event::{DomainEvent, EventKind};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Turns events into stored payload bytes and back.
pub trait EventSerializer<E>: Send + Sync {
    /// Encodes `event`'s payload.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the event's kind cannot be
    /// encoded.
    fn serialize(&self, event: &E) -> Result<Vec<u8>, DomainError>;

    /// Decodes a payload stored under `event_type`. Returns `None` if the
    /// tag is not recognized or the payload does not decode.
    fn deserialize(&self, event_type: &str, payload: &[u8]) -> Option<E>;
}

type Encode<E> = fn(&E) -> Option<serde_json::Result<Vec<u8>>>;
type Decode<E> = fn(&[u8]) -> serde_json::Result<E>;

struct Codec<E> {
    encode: Encode<E>,
    decode: Decode<E>,
}

/// JSON serializer driven by a registry of event kinds.
///
/// Only registered kinds are written or read: encoding an unregistered kind
/// fails, and decoding an unregistered tag yields `None` so the row turns into
/// an unknown-event placeholder.
pub struct JsonEventSerializer<E> {
    codecs: HashMap<&'static str, Codec<E>>,
}

impl<E: DomainEvent> JsonEventSerializer<E> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Registers the payload type `K` under its event type tag.
    #[must_use]
    pub fn register<K>(mut self) -> Self
    where
        K: EventKind<E> + Serialize + DeserializeOwned,
    {
        self.codecs.insert(
            K::EVENT_TYPE,
            Codec {
                encode: encode_kind::<K, E>,
                decode: decode_kind::<K, E>,
            },
        );
        self
    }

    /// Returns `true` if `event_type` has a registered codec.
    #[must_use]
    pub fn is_registered(&self, event_type: &str) -> bool {
        self.codecs.contains_key(event_type)
    }
}

fn encode_kind<K, E>(event: &E) -> Option<serde_json::Result<Vec<u8>>>
where
    K: EventKind<E> + Serialize,
{
    K::from_event(event).map(serde_json::to_vec)
}

fn decode_kind<K, E>(payload: &[u8]) -> serde_json::Result<E>
where
    K: EventKind<E> + DeserializeOwned,
{
    serde_json::from_slice::<K>(payload).map(K::into_event)
}

impl<E: DomainEvent> Default for JsonEventSerializer<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for JsonEventSerializer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&&'static str> = self.codecs.keys().collect();
        kinds.sort();
        f.debug_struct("JsonEventSerializer")
            .field("kinds", &kinds)
            .finish()
    }
}

impl<E: DomainEvent> EventSerializer<E> for JsonEventSerializer<E> {
    fn serialize(&self, event: &E) -> Result<Vec<u8>, DomainError> {
        let tag = event.event_type();
        let codec = self.codecs.get(tag).ok_or_else(|| {
            DomainError::Serialization(format!("no codec registered for event type {tag}"))
        })?;
        match (codec.encode)(event) {
            Some(Ok(bytes)) => Ok(bytes),
            Some(Err(err)) => Err(DomainError::Serialization(format!(
                "failed to encode {tag}: {err}"
            ))),
            None => Err(DomainError::Serialization(format!(
                "codec for {tag} does not match the event variant"
            ))),
        }
    }

    fn deserialize(&self, event_type: &str, payload: &[u8]) -> Option<E> {
        let codec = self.codecs.get(event_type)?;
        match (codec.decode)(payload) {
            Ok(event) => Some(event),
            Err(err) => {
                tracing::debug!(event_type, error = %err, "payload did not decode");
                None
            }
        }
    }
}
