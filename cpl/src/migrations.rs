use cpl_config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::{
    Executor,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use tracing::info;

use crate::error::CplResult;

/// Applies the index migrations in the `cpl` schema.
///
/// The schema is created when missing and set as the search path, so the `_sqlx_migrations`
/// bookkeeping table lands next to the index instead of in `public`.
pub async fn apply_cpl_migrations(connection_config: &PgConnectionConfig) -> CplResult<()> {
    let options: PgConnectOptions = connection_config.with_db();

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("create schema if not exists cpl;").await?;
                conn.execute("set search_path = 'cpl';").await?;

                Ok(())
            })
        })
        .connect_with(options)
        .await?;

    info!("applying created pages index migrations");

    let migrator = sqlx::migrate!("./migrations");
    migrator.run(&pool).await?;
    pool.close().await;

    info!("created pages index migrations successfully applied");

    Ok(())
}
