//! People demo entry point: records a few name and email changes against
//! `PostgreSQL`, then prints what replay and the snapshot table report.

use std::sync::Arc;

use eventloom_event_store::PgEventStore;
use eventloom_people::application::command_handlers::{handle_change_email, handle_change_name};
use eventloom_people::application::context::{PeopleContext, people_builder, person_serializer};
use eventloom_people::application::query_handlers::{get_person_by_id, list_people};
use eventloom_people::config::DemoConfig;
use eventloom_people::domain::commands::{ChangeEmail, ChangeName};
use eventloom_people::error::AppError;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Eventloom people demo");

    let config = DemoConfig::from_env()?;

    // Create database connection pool.
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    PgEventStore::new(pool.clone(), config.store.clone(), Arc::new(person_serializer()))
        .ensure_schema()
        .await?;

    let builder = people_builder();
    let ctx = PeopleContext::postgres(pool, config.store)?;
    let manager = builder.build(&ctx);

    let jane = Uuid::now_v7();
    handle_change_name(
        &ChangeName {
            person_id: jane,
            firstname: "Jane".to_owned(),
            lastname: "Doe".to_owned(),
        },
        &manager,
    )
    .await?;
    let version = handle_change_email(
        &ChangeEmail {
            person_id: jane,
            email: "jane@example.com".to_owned(),
        },
        &manager,
    )
    .await?;
    tracing::info!(person_id = %jane, version, "person recorded");

    if let Some(view) = get_person_by_id(jane, &manager).await? {
        tracing::info!(
            person_id = %view.person_id,
            firstname = %view.firstname,
            lastname = %view.lastname,
            version = view.version,
            "replayed person"
        );
    }

    let people = list_people(ctx.snapshots.as_ref()).await?;
    tracing::info!(count = people.len(), "people in snapshot table");

    Ok(())
}
