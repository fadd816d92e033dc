//! Store configuration: table names per aggregate kind.

use std::fmt;

use eventloom_core::error::DomainError;

const MAX_IDENTIFIER_LEN: usize = 63;

/// A table name that is safe to interpolate into SQL.
///
/// Accepts ASCII letters, digits and underscores, starting with a letter or
/// underscore, at most 63 bytes (the Postgres identifier limit).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    /// Validates `name`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidConfiguration` if `name` is not a plain
    /// identifier.
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        let mut chars = name.chars();
        let starts_well = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !starts_well || !rest_ok || name.len() > MAX_IDENTIFIER_LEN {
            return Err(DomainError::InvalidConfiguration(format!(
                "invalid table name: {name:?}"
            )));
        }
        Ok(Self(name))
    }

    /// The bare name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name as a double-quoted SQL identifier.
    #[must_use]
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where one aggregate kind keeps its events and, optionally, its state
/// snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub events_table: TableName,
    pub snapshot_table: Option<TableName>,
}

impl StoreConfig {
    /// Configures an events table without snapshots.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidConfiguration` for an invalid name.
    pub fn new(events_table: &str) -> Result<Self, DomainError> {
        Ok(Self {
            events_table: TableName::new(events_table)?,
            snapshot_table: None,
        })
    }

    /// Also writes a state snapshot to `snapshot_table` on every save.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidConfiguration` for an invalid name.
    pub fn with_snapshots(mut self, snapshot_table: &str) -> Result<Self, DomainError> {
        self.snapshot_table = Some(TableName::new(snapshot_table)?);
        Ok(self)
    }
}
