use chrono::{DateTime, Utc};
use cpl_postgres::sqlx::test_utils::PgDatabase;
use sqlx::PgPool;

use crate::migrations::apply_cpl_migrations;
use crate::types::{Actor, PageId, RevisionId, Title};

/// Schema holding the host tables in test databases.
pub const TEST_SOURCE_SCHEMA: &str = "wiki";

/// Spawns an isolated database with the index migrations applied and empty host tables in
/// [`TEST_SOURCE_SCHEMA`].
///
/// # Panics
///
/// Panics if the database can't be created or migrated.
pub async fn spawn_database() -> PgDatabase {
    let database = PgDatabase::new().await;

    apply_cpl_migrations(&database.config)
        .await
        .expect("Failed to apply index migrations");

    for statement in [
        format!("create schema {TEST_SOURCE_SCHEMA}"),
        format!(
            r#"
            create table {TEST_SOURCE_SCHEMA}.page (
                page_id bigint primary key,
                page_namespace int not null,
                page_title text not null,
                page_is_redirect boolean not null default false
            )
            "#
        ),
        format!(
            r#"
            create table {TEST_SOURCE_SCHEMA}.revision (
                rev_id bigint primary key,
                rev_page bigint not null,
                rev_parent_id bigint,
                rev_timestamp timestamptz not null,
                rev_user bigint not null default 0,
                rev_user_text text not null
            )
            "#
        ),
    ] {
        sqlx::query(&statement)
            .execute(&database.pool)
            .await
            .expect("Failed to create host tables");
    }

    database
}

pub async fn insert_page(pool: &PgPool, page: PageId, title: &Title, is_redirect: bool) {
    sqlx::query(&format!(
        r#"
        insert into {TEST_SOURCE_SCHEMA}.page (page_id, page_namespace, page_title, page_is_redirect)
        values ($1, $2, $3, $4)
        "#
    ))
    .bind(page.into_inner())
    .bind(title.namespace.into_inner())
    .bind(&title.db_key)
    .bind(is_redirect)
    .execute(pool)
    .await
    .expect("Failed to insert page");
}

pub async fn insert_revision(
    pool: &PgPool,
    id: RevisionId,
    page: PageId,
    parent: Option<RevisionId>,
    author: &Actor,
    timestamp: DateTime<Utc>,
) {
    sqlx::query(&format!(
        r#"
        insert into {TEST_SOURCE_SCHEMA}.revision
            (rev_id, rev_page, rev_parent_id, rev_timestamp, rev_user, rev_user_text)
        values ($1, $2, $3, $4, $5, $6)
        "#
    ))
    .bind(id.into_inner())
    .bind(page.into_inner())
    .bind(parent.map(RevisionId::into_inner))
    .bind(timestamp)
    .bind(author.id.into_inner())
    .bind(author.name.as_str())
    .execute(pool)
    .await
    .expect("Failed to insert revision");
}

pub async fn delete_page(pool: &PgPool, page: PageId) {
    sqlx::query(&format!(
        "delete from {TEST_SOURCE_SCHEMA}.page where page_id = $1"
    ))
    .bind(page.into_inner())
    .execute(pool)
    .await
    .expect("Failed to delete page");
}
