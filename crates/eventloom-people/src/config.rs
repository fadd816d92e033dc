//! Demo configuration read from the environment.

use eventloom_event_store::StoreConfig;

use crate::error::AppError;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_EVENTS_TABLE: &str = "person_events";
const DEFAULT_SNAPSHOT_TABLE: &str = "people";

/// Settings for the `people-demo` binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub store: StoreConfig,
}

impl DemoConfig {
    /// Reads `DATABASE_URL` (required), `EVENTLOOM_MAX_CONNECTIONS`,
    /// `EVENTLOOM_EVENTS_TABLE` and `EVENTLOOM_SNAPSHOT_TABLE`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is missing or invalid.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`DemoConfig::from_env`] with variables resolved by `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| AppError::Config("DATABASE_URL must be set".to_owned()))?;
        let max_connections = match lookup("EVENTLOOM_MAX_CONNECTIONS") {
            Some(raw) => raw.parse().map_err(|e| {
                AppError::Config(format!("EVENTLOOM_MAX_CONNECTIONS must be a valid u32: {e}"))
            })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        let events_table =
            lookup("EVENTLOOM_EVENTS_TABLE").unwrap_or_else(|| DEFAULT_EVENTS_TABLE.to_owned());
        let snapshot_table =
            lookup("EVENTLOOM_SNAPSHOT_TABLE").unwrap_or_else(|| DEFAULT_SNAPSHOT_TABLE.to_owned());
        let store = StoreConfig::new(&events_table)
            .and_then(|config| config.with_snapshots(&snapshot_table))
            .map_err(|e| AppError::Config(e.to_string()))?;

        Ok(Self {
            database_url,
            max_connections,
            store,
        })
    }
}
