use chrono::{DateTime, Utc};
use sqlx::postgres::PgQueryResult;
use sqlx::{Connection, PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, warn};

use crate::error::{CplError, CplResult};
use crate::failpoints::{INDEX_TRANSACTION_COMMIT, cpl_fail_point};
use crate::store::base::{IndexStore, IndexTransaction};
use crate::types::{Actor, ActorName, IndexRow, PageId, Pagination, UserId};

/// Rows bound per statement by [`IndexTransaction::insert_many_if_absent`].
///
/// Each row binds four parameters and Postgres accepts at most 65535 per statement.
const INSERT_BATCH_SIZE: usize = 1000;

type CreatedPageRow = (i64, i64, String, DateTime<Utc>);

fn into_index_row((page_id, creator_id, creator_name, created_at): CreatedPageRow) -> IndexRow {
    IndexRow::new(
        PageId::new(page_id),
        Actor {
            id: UserId::new(creator_id),
            name: ActorName::new(&creator_name),
        },
        created_at,
    )
}

/// Releases `savepoint` when `result` succeeded and rolls back to it otherwise.
///
/// Handler writes run inside a savepoint, so a write rejected by the server, for example
/// because the transaction is read-only, leaves a shared transaction usable by the host.
async fn finish_savepoint(
    savepoint: Transaction<'_, Postgres>,
    result: Result<PgQueryResult, sqlx::Error>,
) -> CplResult<PgQueryResult> {
    match result {
        Ok(result) => {
            savepoint.commit().await?;

            Ok(result)
        }
        Err(err) => {
            if let Err(rollback_err) = savepoint.rollback().await {
                warn!(error = %rollback_err, "failed to roll back to index write savepoint");
            }

            Err(CplError::from(err))
        }
    }
}

/// Index store backed by the `cpl.created_pages` table.
///
/// The table must have been created with [`crate::migrations::apply_cpl_migrations`].
#[derive(Debug, Clone)]
pub struct PostgresIndexStore {
    pool: PgPool,
    read_only: bool,
}

impl PostgresIndexStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            read_only: false,
        }
    }

    /// Marks the store read-only regardless of the state reported by the server.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl IndexStore for PostgresIndexStore {
    type Transaction = PostgresIndexTransaction;

    async fn begin(&self) -> CplResult<Self::Transaction> {
        let transaction = self.pool.begin().await?;

        Ok(PostgresIndexTransaction::from_transaction(transaction))
    }

    async fn is_read_only(&self) -> CplResult<bool> {
        if self.read_only {
            return Ok(true);
        }

        let server_read_only: bool = sqlx::query_scalar(
            r#"
            select pg_is_in_recovery()
                or current_setting('default_transaction_read_only') = 'on'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(server_read_only)
    }

    async fn created_page(&self, page: PageId) -> CplResult<Option<IndexRow>> {
        let row: Option<CreatedPageRow> = sqlx::query_as(
            r#"
            select page_id, creator_id, creator_name, created_at
            from cpl.created_pages
            where page_id = $1
            "#,
        )
        .bind(page.into_inner())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(into_index_row))
    }

    async fn list_created_pages(
        &self,
        creator: &ActorName,
        pagination: Option<Pagination>,
    ) -> CplResult<Vec<IndexRow>> {
        // A null limit returns every row.
        let (offset, limit) = match pagination {
            Some(Pagination { offset, limit }) => (
                i64::try_from(offset).unwrap_or(i64::MAX),
                Some(i64::try_from(limit).unwrap_or(i64::MAX)),
            ),
            None => (0, None),
        };

        let rows: Vec<CreatedPageRow> = sqlx::query_as(
            r#"
            select page_id, creator_id, creator_name, created_at
            from cpl.created_pages
            where creator_name = $1
            order by created_at desc, page_id desc
            limit $2 offset $3
            "#,
        )
        .bind(creator.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(into_index_row).collect())
    }

    async fn count(&self) -> CplResult<u64> {
        let count: i64 = sqlx::query_scalar("select count(*) from cpl.created_pages")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    async fn rows(&self) -> CplResult<Vec<IndexRow>> {
        let rows: Vec<CreatedPageRow> = sqlx::query_as(
            r#"
            select page_id, creator_id, creator_name, created_at
            from cpl.created_pages
            order by page_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(into_index_row).collect())
    }
}

/// Write transaction on `cpl.created_pages`.
pub struct PostgresIndexTransaction {
    transaction: Transaction<'static, Postgres>,
}

impl PostgresIndexTransaction {
    /// Wraps an already open transaction, so index writes can share it with the host's own
    /// writes.
    pub fn from_transaction(transaction: Transaction<'static, Postgres>) -> Self {
        Self { transaction }
    }

    /// Returns the underlying transaction.
    pub fn transaction(&mut self) -> &mut Transaction<'static, Postgres> {
        &mut self.transaction
    }
}

impl IndexTransaction for PostgresIndexTransaction {
    async fn lock_exclusive(&mut self) -> CplResult<()> {
        // Conflicts with itself and with the row exclusive lock taken by every write, while
        // plain reads keep going.
        sqlx::query("lock table cpl.created_pages in share row exclusive mode")
            .execute(&mut *self.transaction)
            .await?;

        Ok(())
    }

    async fn upsert(&mut self, row: &IndexRow) -> CplResult<()> {
        let mut savepoint = Connection::begin(&mut *self.transaction).await?;
        let result = sqlx::query(
            r#"
            insert into cpl.created_pages (page_id, creator_id, creator_name, created_at)
            values ($1, $2, $3, $4)
            on conflict (page_id) do update
            set creator_id = excluded.creator_id,
                creator_name = excluded.creator_name,
                created_at = excluded.created_at
            "#,
        )
        .bind(row.page.into_inner())
        .bind(row.creator.id.into_inner())
        .bind(row.creator.name.as_str())
        .bind(row.timestamp)
        .execute(&mut *savepoint)
        .await;
        finish_savepoint(savepoint, result).await?;

        Ok(())
    }

    async fn insert_if_absent(&mut self, row: &IndexRow) -> CplResult<bool> {
        let mut savepoint = Connection::begin(&mut *self.transaction).await?;
        let result = sqlx::query(
            r#"
            insert into cpl.created_pages (page_id, creator_id, creator_name, created_at)
            values ($1, $2, $3, $4)
            on conflict (page_id) do nothing
            "#,
        )
        .bind(row.page.into_inner())
        .bind(row.creator.id.into_inner())
        .bind(row.creator.name.as_str())
        .bind(row.timestamp)
        .execute(&mut *savepoint)
        .await;
        let result = finish_savepoint(savepoint, result).await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_many_if_absent(&mut self, rows: &[IndexRow]) -> CplResult<u64> {
        let mut inserted = 0;
        for chunk in rows.chunks(INSERT_BATCH_SIZE) {
            let mut builder = QueryBuilder::<Postgres>::new(
                "insert into cpl.created_pages (page_id, creator_id, creator_name, created_at) ",
            );
            builder.push_values(chunk, |mut values, row| {
                values
                    .push_bind(row.page.into_inner())
                    .push_bind(row.creator.id.into_inner())
                    .push_bind(row.creator.name.as_str().to_owned())
                    .push_bind(row.timestamp);
            });
            builder.push(" on conflict (page_id) do nothing");

            let result = builder.build().execute(&mut *self.transaction).await?;
            inserted += result.rows_affected();

            debug!(
                batch = chunk.len(),
                inserted = result.rows_affected(),
                "inserted created pages batch"
            );
        }

        Ok(inserted)
    }

    async fn delete_page(&mut self, page: PageId) -> CplResult<bool> {
        let mut savepoint = Connection::begin(&mut *self.transaction).await?;
        let result = sqlx::query("delete from cpl.created_pages where page_id = $1")
            .bind(page.into_inner())
            .execute(&mut *savepoint)
            .await;
        let result = finish_savepoint(savepoint, result).await?;

        Ok(result.rows_affected() > 0)
    }

    async fn reassign_creator(&mut self, old: &ActorName, new: &Actor) -> CplResult<u64> {
        let mut savepoint = Connection::begin(&mut *self.transaction).await?;
        let result = sqlx::query(
            r#"
            update cpl.created_pages
            set creator_id = $2, creator_name = $3
            where creator_name = $1
            "#,
        )
        .bind(old.as_str())
        .bind(new.id.into_inner())
        .bind(new.name.as_str())
        .execute(&mut *savepoint)
        .await;
        let result = finish_savepoint(savepoint, result).await?;

        Ok(result.rows_affected())
    }

    async fn delete_creator(&mut self, creator: &ActorName) -> CplResult<u64> {
        let mut savepoint = Connection::begin(&mut *self.transaction).await?;
        let result = sqlx::query("delete from cpl.created_pages where creator_name = $1")
            .bind(creator.as_str())
            .execute(&mut *savepoint)
            .await;
        let result = finish_savepoint(savepoint, result).await?;

        Ok(result.rows_affected())
    }

    async fn clear(&mut self) -> CplResult<u64> {
        // Truncate would take an access exclusive lock and block readers until commit.
        let result = sqlx::query("delete from cpl.created_pages")
            .execute(&mut *self.transaction)
            .await?;

        Ok(result.rows_affected())
    }

    async fn commit(self) -> CplResult<()> {
        cpl_fail_point(INDEX_TRANSACTION_COMMIT)?;

        self.transaction.commit().await?;

        Ok(())
    }

    async fn rollback(self) -> CplResult<()> {
        self.transaction.rollback().await?;

        Ok(())
    }
}
