use std::time::Duration;

use cpl_config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

/// Duration after which idle connections of a lazy pool are closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connects to the configured database with an eagerly opened pool.
pub async fn connect_to_database(
    config: &PgConnectionConfig,
    min_connections: u32,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    let options: PgConnectOptions = config.with_db();

    let pool = PgPoolOptions::new()
        .min_connections(min_connections)
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Creates a lazily connected pool with automatic idle connection cleanup.
///
/// Returns immediately without establishing any connection. Connections are opened when the
/// first query runs and closed again after being idle for [`IDLE_TIMEOUT`], which suits an
/// index that is written in short bursts whenever the host mutates a page.
pub fn create_lazy_pool(config: &PgConnectionConfig, max_connections: u32) -> PgPool {
    let options: PgConnectOptions = config.with_db();

    PgPoolOptions::new()
        .min_connections(0)
        .max_connections(max_connections)
        .idle_timeout(Some(IDLE_TIMEOUT))
        .connect_lazy_with(options)
}
