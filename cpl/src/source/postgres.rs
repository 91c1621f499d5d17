use std::sync::Arc;

use chrono::{DateTime, Utc};
use pg_escape::quote_identifier;
use sqlx::{PgExecutor, PgPool};

use crate::error::CplResult;
use crate::source::base::{ContentSource, PageStatus, TransactionalContentSource};
use crate::store::postgres::PostgresIndexTransaction;
use crate::types::{Actor, ActorName, Namespace, PageId, Revision, RevisionId, Title, UserId};

type RevisionRow = (i64, i64, i64, String, DateTime<Utc>);

fn into_revision((rev_id, rev_page, rev_user, rev_user_text, rev_timestamp): RevisionRow) -> Revision {
    Revision {
        id: RevisionId::new(rev_id),
        page: PageId::new(rev_page),
        author: Actor {
            id: UserId::new(rev_user),
            name: ActorName::new(&rev_user_text),
        },
        timestamp: rev_timestamp,
    }
}

/// Statements against the host tables, rendered once for the configured schema.
#[derive(Debug)]
struct Statements {
    page_status: String,
    first_revision: String,
    first_revision_candidates: String,
}

impl Statements {
    fn new(schema: &str) -> Self {
        let schema = quote_identifier(schema);

        // A parent id of zero marks a root revision, like a missing one.
        let page_status = format!(
            r#"
            select page_namespace, page_title, page_is_redirect
            from {schema}.page
            where page_id = $1
            "#
        );
        let first_revision = format!(
            r#"
            select rev_id, rev_page, rev_user, rev_user_text, rev_timestamp
            from {schema}.revision
            where rev_page = $1
            order by coalesce(rev_parent_id, 0) <> 0, rev_timestamp, rev_id
            limit 1
            "#
        );
        let first_revision_candidates = format!(
            r#"
            select r.rev_id, r.rev_page, r.rev_user, r.rev_user_text, r.rev_timestamp
            from {schema}.revision r
            join {schema}.page p on p.page_id = r.rev_page
            where p.page_namespace = any($1)
              and not p.page_is_redirect
              and (
                coalesce(r.rev_parent_id, 0) = 0
                or not exists (
                    select 1
                    from {schema}.revision root
                    where root.rev_page = r.rev_page
                      and coalesce(root.rev_parent_id, 0) = 0
                )
              )
            order by r.rev_page, r.rev_timestamp, r.rev_id
            "#
        );

        Self {
            page_status,
            first_revision,
            first_revision_candidates,
        }
    }
}

/// Content source reading the host's `page` and `revision` tables.
///
/// Expected columns:
/// - `page(page_id bigint, page_namespace int, page_title text, page_is_redirect boolean)`
/// - `revision(rev_id bigint, rev_page bigint, rev_parent_id bigint, rev_timestamp timestamptz,
///   rev_user bigint, rev_user_text text)`
#[derive(Debug, Clone)]
pub struct PostgresContentSource {
    pool: PgPool,
    statements: Arc<Statements>,
}

impl PostgresContentSource {
    pub fn new(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            statements: Arc::new(Statements::new(schema)),
        }
    }

    async fn fetch_candidates<'c, E>(
        &self,
        executor: E,
        content_namespaces: &[Namespace],
    ) -> CplResult<Vec<Revision>>
    where
        E: PgExecutor<'c>,
    {
        let namespaces: Vec<i32> = content_namespaces
            .iter()
            .map(|namespace| namespace.into_inner())
            .collect();

        let rows: Vec<RevisionRow> = sqlx::query_as(&self.statements.first_revision_candidates)
            .bind(namespaces)
            .fetch_all(executor)
            .await?;

        Ok(rows.into_iter().map(into_revision).collect())
    }
}

impl ContentSource for PostgresContentSource {
    async fn page_status(&self, page: PageId) -> CplResult<Option<PageStatus>> {
        let row: Option<(i32, String, bool)> = sqlx::query_as(&self.statements.page_status)
            .bind(page.into_inner())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(namespace, title, is_redirect)| PageStatus {
            page,
            title: Title::new(Namespace::new(namespace), &title),
            is_redirect,
        }))
    }

    async fn first_revision(&self, page: PageId) -> CplResult<Option<Revision>> {
        let row: Option<RevisionRow> = sqlx::query_as(&self.statements.first_revision)
            .bind(page.into_inner())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(into_revision))
    }

    async fn first_revision_candidates(
        &self,
        content_namespaces: &[Namespace],
    ) -> CplResult<Vec<Revision>> {
        self.fetch_candidates(&self.pool, content_namespaces).await
    }
}

/// Reads through the index transaction when the host tables share the index database.
impl TransactionalContentSource<PostgresIndexTransaction> for PostgresContentSource {
    async fn first_revision_candidates_in(
        &self,
        transaction: &mut PostgresIndexTransaction,
        content_namespaces: &[Namespace],
    ) -> CplResult<Vec<Revision>> {
        self.fetch_candidates(&mut **transaction.transaction(), content_namespaces)
            .await
    }
}
