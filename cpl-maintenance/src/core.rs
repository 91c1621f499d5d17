use cpl::eligibility::EligibilityFilter;
use cpl::migrations::apply_cpl_migrations;
use cpl::query::CreatedPagesQuery;
use cpl::recompute::{RecomputeOutcome, populate_if_empty, recompute};
use cpl::source::base::ContentSource;
use cpl::source::postgres::PostgresContentSource;
use cpl::store::postgres::PostgresIndexStore;
use cpl::types::Pagination;
use cpl_config::shared::MaintenanceConfig;
use cpl_postgres::{connect_to_database, create_lazy_pool};
use tracing::info;

use crate::error::MaintenanceResult;

/// Connections used by the recompute. Candidates are read through its single transaction.
const RECOMPUTE_POOL_CONNECTIONS: u32 = 1;

/// Connections used when listing pages.
const LIST_POOL_CONNECTIONS: u32 = 2;

/// A maintenance task on the created pages index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    Migrate,
    Recompute,
    Populate,
    List {
        name: String,
        pagination: Option<Pagination>,
    },
}

pub async fn run_task(config: MaintenanceConfig, task: Task) -> MaintenanceResult<()> {
    match task {
        Task::Migrate => {
            apply_cpl_migrations(&config.database).await?;
        }
        Task::Recompute => rebuild_index(&config, false).await?,
        Task::Populate => rebuild_index(&config, true).await?,
        Task::List { name, pagination } => {
            let pool = create_lazy_pool(&config.database, LIST_POOL_CONNECTIONS);
            let query = CreatedPagesQuery::new(PostgresIndexStore::new(pool.clone()));
            let source = PostgresContentSource::new(pool.clone(), &config.index.source_schema);

            let rows = query.list_created_rows(&name, pagination).await?;

            for row in rows {
                let title = match source.page_status(row.page).await? {
                    Some(status) => status.title.to_string(),
                    None => format!("#{}", row.page),
                };
                println!("{}\t{}\t{}", row.timestamp.to_rfc3339(), row.page, title);
            }

            pool.close().await;
        }
    }

    Ok(())
}

async fn rebuild_index(config: &MaintenanceConfig, only_if_empty: bool) -> MaintenanceResult<()> {
    let pool = connect_to_database(
        &config.database,
        RECOMPUTE_POOL_CONNECTIONS,
        RECOMPUTE_POOL_CONNECTIONS,
    )
    .await?;
    let store = PostgresIndexStore::new(pool.clone()).with_read_only(config.index.read_only);
    let source = PostgresContentSource::new(pool.clone(), &config.index.source_schema);
    let filter = EligibilityFilter::from(&config.index);

    let outcome = if only_if_empty {
        populate_if_empty(&store, &source, &filter).await
    } else {
        recompute(&store, &source, &filter).await
    };
    pool.close().await;

    report_outcome(&outcome?);

    Ok(())
}

fn report_outcome(outcome: &RecomputeOutcome) {
    match outcome {
        RecomputeOutcome::Skipped => info!("index is read-only, nothing was recomputed"),
        RecomputeOutcome::AlreadyPopulated => info!("index already populated, nothing to do"),
        RecomputeOutcome::Completed(summary) => info!(
            pages = summary.pages,
            inserted = summary.inserted,
            ambiguous = summary.ambiguous,
            "recalculated created pages index"
        ),
    }
}
