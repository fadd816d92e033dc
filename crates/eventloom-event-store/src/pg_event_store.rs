//! `PostgreSQL` implementation of the `EventStore` trait.

use std::sync::Arc;

use async_trait::async_trait;
use eventloom_core::aggregate::Aggregate;
use eventloom_core::error::DomainError;
use eventloom_core::event::{DomainEvent, EventRecord};
use eventloom_core::repository::{EventSaver, EventStore};
use eventloom_core::stream::EventStream;
use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use uuid::Uuid;

use crate::codec::{PersistedEvent, decode_row, encode_records};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::schema;
use crate::serializer::EventSerializer;
use crate::snapshot::upsert_snapshot_row;

/// PostgreSQL-backed event store for one aggregate kind.
///
/// Each aggregate kind gets its own events table. All rows of one save go
/// in a single transaction, together with the state snapshot when the
/// configuration names a snapshot table.
pub struct PgEventStore<E> {
    pool: PgPool,
    config: StoreConfig,
    serializer: Arc<dyn EventSerializer<E>>,
}

impl<E: DomainEvent> PgEventStore<E> {
    /// Creates a new `PgEventStore`.
    #[must_use]
    pub fn new(pool: PgPool, config: StoreConfig, serializer: Arc<dyn EventSerializer<E>>) -> Self {
        Self {
            pool,
            config,
            serializer,
        }
    }

    /// The table configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Creates the configured tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if any statement fails.
    #[tracing::instrument(skip(self), fields(events_table = %self.config.events_table))]
    pub async fn ensure_schema(&self) -> Result<(), DomainError> {
        let mut statements = schema::create_events_table(&self.config.events_table);
        if let Some(table) = &self.config.snapshot_table {
            statements.push(schema::create_snapshot_table(table));
        }
        for statement in &statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(StoreError::from)?;
        }
        Ok(())
    }

    async fn load_rows(&self, stream_id: Uuid) -> Result<Vec<PersistedEvent<Uuid>>, StoreError> {
        let sql = format!(
            "SELECT id, stream_id, version, event_name, payload, occurred_on FROM {} \
             WHERE stream_id = $1 ORDER BY version ASC",
            self.config.events_table.quoted()
        );
        let rows = sqlx::query(&sql)
            .bind(stream_id)
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(PersistedEvent {
                id: row.try_get("id")?,
                stream_id: row.try_get("stream_id")?,
                version: row.try_get("version")?,
                event_name: row.try_get("event_name")?,
                payload: row.try_get("payload")?,
                occurred_on: row.try_get("occurred_on")?,
            });
        }
        Ok(out)
    }

    async fn insert_rows(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rows: Vec<PersistedEvent<Uuid>>,
    ) -> Result<(), sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {} (id, stream_id, version, event_name, payload, occurred_on) ",
            self.config.events_table.quoted()
        ));
        qb.push_values(rows, |mut b, row| {
            b.push_bind(row.id);
            b.push_bind(row.stream_id);
            b.push_bind(row.version);
            b.push_bind(row.event_name);
            b.push_bind(row.payload);
            b.push_bind(row.occurred_on);
        });
        qb.build().execute(&mut **tx).await?;
        Ok(())
    }

    async fn current_version(&self, stream_id: Uuid) -> Result<i64, StoreError> {
        let sql = format!(
            "SELECT COALESCE(MAX(version), 0) AS version FROM {} WHERE stream_id = $1",
            self.config.events_table.quoted()
        );
        let row = sqlx::query(&sql)
            .bind(stream_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("version")?)
    }

    /// Writes `new_events` and, when given, the snapshot in one transaction.
    async fn append(
        &self,
        stream_id: Uuid,
        from_version: i64,
        new_events: &[EventRecord<E>],
        snapshot: Option<(i64, serde_json::Value)>,
    ) -> Result<Vec<EventRecord<E>>, DomainError> {
        if new_events.is_empty() {
            return Ok(Vec::new());
        }
        let rows = encode_records(self.serializer.as_ref(), &stream_id, from_version, new_events)?;

        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        match self.insert_rows(&mut tx, rows).await {
            Ok(()) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                drop(tx);
                let actual = self.current_version(stream_id).await?;
                tracing::debug!(%stream_id, from_version, actual, "version already taken");
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_id: stream_id.to_string(),
                    expected: from_version,
                    actual,
                });
            }
            Err(err) => return Err(StoreError::from(err).into()),
        }

        if let (Some(table), Some((version, state))) = (&self.config.snapshot_table, snapshot) {
            upsert_snapshot_row(
                &mut *tx,
                table,
                stream_id,
                version,
                state,
                new_events[new_events.len() - 1].occurred_on,
            )
            .await?;
        }

        tx.commit().await.map_err(StoreError::from)?;
        Ok(new_events.to_vec())
    }
}

impl<E> Clone for PgEventStore<E> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            config: self.config.clone(),
            serializer: Arc::clone(&self.serializer),
        }
    }
}

impl<E> std::fmt::Debug for PgEventStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgEventStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<E: DomainEvent> EventStore<Uuid, E> for PgEventStore<E> {
    #[tracing::instrument(skip_all, fields(stream_id = %stream_id))]
    async fn load_stream(&self, stream_id: &Uuid) -> Result<Vec<EventRecord<E>>, DomainError> {
        let rows = self.load_rows(*stream_id).await?;
        tracing::debug!(count = rows.len(), "rows loaded");
        Ok(rows
            .into_iter()
            .map(|row| decode_row(self.serializer.as_ref(), row))
            .collect())
    }

    #[tracing::instrument(
        skip_all,
        fields(stream_id = %stream_id, from_version = from_version, count = new_events.len())
    )]
    async fn save_events(
        &self,
        stream_id: &Uuid,
        from_version: i64,
        new_events: &[EventRecord<E>],
    ) -> Result<Vec<EventRecord<E>>, DomainError> {
        self.append(*stream_id, from_version, new_events, None).await
    }
}

#[async_trait]
impl<S, E> EventSaver<S, Uuid, E> for PgEventStore<E>
where
    S: Serialize + Send + Sync + 'static,
    E: DomainEvent,
{
    #[tracing::instrument(
        skip_all,
        fields(stream_id = %aggregate.id(), from_version = aggregate.version())
    )]
    async fn save(
        &self,
        aggregate: &Aggregate<S, Uuid, E>,
    ) -> Result<EventStream<Uuid, E>, DomainError> {
        let stream = aggregate.stream();
        let snapshot = match &self.config.snapshot_table {
            Some(_) => Some((
                aggregate.expected_version(),
                serde_json::to_value(aggregate.state()).map_err(StoreError::from)?,
            )),
            None => None,
        };
        let saved = self
            .append(*stream.id(), stream.version(), stream.uncommitted_events(), snapshot)
            .await?;
        let mut committed = stream.committed_events().to_vec();
        committed.extend(saved);
        Ok(EventStream::from_committed(*stream.id(), committed))
    }
}
