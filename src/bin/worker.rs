use futures::future::join_all;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::env;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use teamdesk::config::Config;
use teamdesk::db;
use teamdesk::entities::{user, User};
use teamdesk::recruitment::monitor::monitor_responses;

/// Runs the email monitor for every user with a connected calendar. Users are
/// processed concurrently; one user's failure does not affect the others.
async fn monitor_all(db: &DatabaseConnection, http: &reqwest::Client, config: &Config) {
    let users = match User::find()
        .filter(user::Column::CalendarCredentials.is_not_null())
        .all(db)
        .await
    {
        Ok(users) => users,
        Err(e) => {
            error!(?e, "failed to load users with calendar credentials");
            return;
        }
    };
    info!("Monitoring replies for {} users", users.len());

    let runs = users.iter().map(|u| async move {
        match monitor_responses(db, http, config, u).await {
            Ok(scheduled) => scheduled,
            Err(e) => {
                warn!(user_id = %u.id, "email monitoring failed: {}", e);
                0
            }
        }
    });
    let total: usize = join_all(runs).await.into_iter().sum();
    info!("Email monitoring pass finished, {} interviews scheduled", total);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    let run_once = env::args().any(|a| a == "--monitor-once");

    let db_conn = db::connect(&config.database_url).await?;
    let http = reqwest::Client::new();

    if run_once {
        monitor_all(&db_conn, &http, &config).await;
        return Ok(());
    }

    info!("Worker starting; monitoring replies every {} seconds", config.monitor_interval_secs);
    let mut ticker = interval(Duration::from_secs(config.monitor_interval_secs.max(1)));
    loop {
        ticker.tick().await;
        monitor_all(&db_conn, &http, &config).await;
    }
}
