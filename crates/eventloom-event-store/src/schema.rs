//! Event store database schema.

use crate::config::TableName;

/// Statements creating an events table and its indexes.
#[must_use]
pub fn create_events_table(table: &TableName) -> Vec<String> {
    let name = table.quoted();
    let bare = table.as_str();
    vec![
        format!(
            r"
CREATE TABLE IF NOT EXISTS {name} (
    id          UUID PRIMARY KEY,
    stream_id   UUID NOT NULL,
    version     BIGINT NOT NULL CHECK (version >= 1),
    event_name  TEXT NOT NULL,
    payload     BYTEA NOT NULL,
    occurred_on TIMESTAMPTZ NOT NULL,
    CONSTRAINT {bare}_stream_version_key UNIQUE (stream_id, version)
)"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_{bare}_stream_id ON {name} (stream_id)"),
    ]
}

/// Statement creating a snapshot table.
#[must_use]
pub fn create_snapshot_table(table: &TableName) -> String {
    let name = table.quoted();
    format!(
        r"
CREATE TABLE IF NOT EXISTS {name} (
    aggregate_id UUID PRIMARY KEY,
    version      BIGINT NOT NULL,
    state        JSONB NOT NULL,
    updated_at   TIMESTAMPTZ NOT NULL
)"
    )
}
