//! Mapping between event records and persisted rows.

use chrono::{DateTime, Utc};
use eventloom_core::error::DomainError;
use eventloom_core::event::{DomainEvent, EventRecord, StreamEvent, UnknownEvent};
use uuid::Uuid;

use crate::serializer::EventSerializer;

/// One stored event row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEvent<Id> {
    /// Surrogate key, unrelated to ordering.
    pub id: Uuid,
    pub stream_id: Id,
    /// Position in the stream, starting at 1.
    pub version: i64,
    pub event_name: String,
    pub payload: Vec<u8>,
    pub occurred_on: DateTime<Utc>,
}

/// Encodes `records` as rows following `from_version`.
///
/// Every record is encoded before anything is written, so an encoding
/// failure leaves the store untouched. Placeholders keep their original tag
/// and bytes.
///
/// # Errors
///
/// Returns `DomainError::Serialization` if any record fails to encode.
pub fn encode_records<Id: Clone, E>(
    serializer: &dyn EventSerializer<E>,
    stream_id: &Id,
    from_version: i64,
    records: &[EventRecord<E>],
) -> Result<Vec<PersistedEvent<Id>>, DomainError> {
    let mut version = from_version;
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        version += 1;
        let payload = match &record.event {
            StreamEvent::Domain(event) => serializer.serialize(event)?,
            StreamEvent::Unknown(unknown) => unknown.payload.clone(),
        };
        rows.push(PersistedEvent {
            id: Uuid::new_v4(),
            stream_id: stream_id.clone(),
            version,
            event_name: record.event_type.clone(),
            payload,
            occurred_on: record.occurred_on,
        });
    }
    Ok(rows)
}

/// Decodes a row. A tag or payload the serializer cannot resolve becomes an
/// [`UnknownEvent`] so that replay can continue.
pub fn decode_row<Id: std::fmt::Display, E: DomainEvent>(
    serializer: &dyn EventSerializer<E>,
    row: PersistedEvent<Id>,
) -> EventRecord<E> {
    match serializer.deserialize(&row.event_name, &row.payload) {
        Some(event) => EventRecord {
            event: StreamEvent::Domain(event),
            event_type: row.event_name,
            occurred_on: row.occurred_on,
        },
        None => {
            tracing::warn!(
                stream_id = %row.stream_id,
                version = row.version,
                event_name = %row.event_name,
                "substituting unknown event placeholder"
            );
            EventRecord::unknown(
                UnknownEvent {
                    event_type: row.event_name,
                    payload: row.payload,
                },
                row.occurred_on,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use eventloom_test_support::FixedClock;
    use eventloom_test_support::fixtures::{AccountEvent, Deposited, Opened, deposited, opened};

    use super::*;
    use crate::serializer::JsonEventSerializer;

    fn serializer() -> JsonEventSerializer<AccountEvent> {
        JsonEventSerializer::new()
            .register::<Opened>()
            .register::<Deposited>()
    }

    fn row(version: i64, event_name: &str, payload: &[u8]) -> PersistedEvent<u64> {
        PersistedEvent {
            id: Uuid::new_v4(),
            stream_id: 1,
            version,
            event_name: event_name.to_owned(),
            payload: payload.to_vec(),
            occurred_on: FixedClock::reference().0,
        }
    }

    #[test]
    fn test_encode_numbers_rows_after_from_version() {
        // Arrange
        let at = FixedClock::reference().0;
        let records = vec![
            EventRecord::new(opened("jane"), at),
            EventRecord::new(deposited(5), at),
        ];

        // Act
        let rows = encode_records(&serializer(), &7_u64, 3, &records).unwrap();

        // Assert
        let versions: Vec<i64> = rows.iter().map(|r| r.version).collect();
        assert_eq!(versions, vec![4, 5]);
        assert_eq!(rows[0].event_name, "account.opened");
        assert_eq!(rows[1].payload, br#"{"amount":5}"#.to_vec());
        assert!(rows.iter().all(|r| r.stream_id == 7 && r.occurred_on == at));
        assert_ne!(rows[0].id, rows[1].id);
    }

    #[test]
    fn test_encode_keeps_placeholder_bytes() {
        let record = EventRecord::<AccountEvent>::unknown(
            UnknownEvent {
                event_type: "account.frozen".to_owned(),
                payload: b"raw".to_vec(),
            },
            FixedClock::reference().0,
        );

        let rows = encode_records(&serializer(), &1_u64, 0, &[record]).unwrap();

        assert_eq!(rows[0].event_name, "account.frozen");
        assert_eq!(rows[0].payload, b"raw".to_vec());
    }

    #[test]
    fn test_decode_known_row() {
        let record = decode_row(&serializer(), row(1, "account.opened", br#"{"owner":"jane"}"#));

        assert_eq!(record.event.as_domain(), Some(&opened("jane")));
        assert_eq!(record.event_type, "account.opened");
    }

    #[test]
    fn test_unknown_tag_becomes_placeholder() {
        let record = decode_row(&serializer(), row(2, "account.frozen", b"{}"));

        match record.event {
            StreamEvent::Unknown(unknown) => {
                assert_eq!(unknown.event_type, "account.frozen");
                assert_eq!(unknown.payload, b"{}".to_vec());
            }
            StreamEvent::Domain(event) => panic!("expected placeholder, got {event:?}"),
        }
    }

    #[test]
    fn test_undecodable_payload_becomes_placeholder() {
        let record = decode_row(&serializer(), row(3, "account.deposited", b"not json"));

        assert!(record.event.is_unknown());
        assert_eq!(record.event_type, "account.deposited");
    }
}
