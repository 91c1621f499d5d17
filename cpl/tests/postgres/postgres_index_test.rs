use cpl::eligibility::EligibilityFilter;
use cpl::events::{ContentEvent, PageSaved};
use cpl::maintainer::IndexMaintainer;
use cpl::query::CreatedPagesQuery;
use cpl::recompute::{RecomputeOutcome, RecomputeSummary, populate_if_empty, recompute};
use cpl::source::base::ContentSource;
use cpl::source::postgres::PostgresContentSource;
use cpl::store::base::{IndexStore, IndexTransaction};
use cpl::store::postgres::{PostgresIndexStore, PostgresIndexTransaction};
use cpl::test_utils::database::{
    TEST_SOURCE_SCHEMA, delete_page, insert_page, insert_revision, spawn_database,
};
use cpl::test_utils::wiki::at;
use cpl::types::{Actor, ActorName, IndexRow, Namespace, PageId, Pagination, RevisionId, Title};
use cpl::unit_of_work::UnitOfWork;
use cpl_postgres::connect_to_database;
use cpl_telemetry::tracing::init_test_tracing;
use sqlx::PgPool;

/// Creates a page whose revisions are authored by `authors` one second apart, the first one
/// being the root.
async fn write_history(
    pool: &PgPool,
    page: i64,
    title: &str,
    authors: &[&Actor],
    start: i64,
    is_redirect: bool,
) -> PageId {
    let page = PageId::new(page);
    insert_page(pool, page, &Title::main(title), is_redirect).await;

    let mut parent = None;
    for (offset, author) in authors.iter().enumerate() {
        let id = RevisionId::new(page.into_inner() * 100 + offset as i64);
        insert_revision(pool, id, page, parent, author, at(start + offset as i64)).await;
        parent = Some(id);
    }

    page
}

#[tokio::test(flavor = "multi_thread")]
async fn store_lists_rows_newest_first_with_pagination() {
    init_test_tracing();
    let database = spawn_database().await;
    let store = PostgresIndexStore::new(database.pool.clone());
    let u1 = Actor::user(1, "Some user");

    let mut transaction = store.begin().await.unwrap();
    for (page, secs) in [(1, 100), (2, 300), (3, 300), (4, 200)] {
        transaction
            .upsert(&IndexRow::new(PageId::new(page), u1.clone(), at(secs)))
            .await
            .unwrap();
    }
    transaction.commit().await.unwrap();

    let query = CreatedPagesQuery::new(store.clone());
    assert_eq!(
        query.list_created_pages("Some_user").await.unwrap(),
        vec![PageId::new(3), PageId::new(2), PageId::new(4), PageId::new(1)]
    );
    let window = query
        .list_created_pages_page("Some user", Pagination::new(1, 2))
        .await
        .unwrap();
    assert_eq!(
        window.iter().map(|row| row.page).collect::<Vec<_>>(),
        vec![PageId::new(2), PageId::new(4)]
    );
    assert_eq!(store.count().await.unwrap(), 4);
    assert!(!store.is_read_only().await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn transaction_writes_follow_conflict_rules() {
    init_test_tracing();
    let database = spawn_database().await;
    let store = PostgresIndexStore::new(database.pool.clone());
    let u1 = Actor::user(1, "U1");
    let u2 = Actor::user(2, "U2");

    let mut transaction = store.begin().await.unwrap();
    let first = IndexRow::new(PageId::new(1), u1.clone(), at(100));
    assert!(transaction.insert_if_absent(&first).await.unwrap());
    assert!(
        !transaction
            .insert_if_absent(&IndexRow::new(PageId::new(1), u2.clone(), at(50)))
            .await
            .unwrap()
    );
    let inserted = transaction
        .insert_many_if_absent(&[
            IndexRow::new(PageId::new(1), u2.clone(), at(50)),
            IndexRow::new(PageId::new(2), u1.clone(), at(200)),
        ])
        .await
        .unwrap();
    assert_eq!(inserted, 1);
    transaction.commit().await.unwrap();
    assert_eq!(store.created_page(PageId::new(1)).await.unwrap(), Some(first));

    let mut transaction = store.begin().await.unwrap();
    assert_eq!(
        transaction
            .reassign_creator(&ActorName::new("U1"), &u2)
            .await
            .unwrap(),
        2
    );
    assert!(transaction.delete_page(PageId::new(2)).await.unwrap());
    transaction.rollback().await.unwrap();
    assert_eq!(store.count().await.unwrap(), 2);

    let mut transaction = store.begin().await.unwrap();
    assert_eq!(
        transaction.delete_creator(&ActorName::new("U1")).await.unwrap(),
        2
    );
    transaction.commit().await.unwrap();
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn read_only_transactions_are_classified() {
    init_test_tracing();
    let database = spawn_database().await;

    let mut transaction = database.pool.begin().await.unwrap();
    sqlx::query("set transaction read only")
        .execute(&mut *transaction)
        .await
        .unwrap();
    let mut transaction = PostgresIndexTransaction::from_transaction(transaction);

    let err = transaction
        .upsert(&IndexRow::new(PageId::new(1), Actor::user(1, "U1"), at(100)))
        .await
        .unwrap_err();
    assert!(err.is_read_only());

    // The rejected write was rolled back to its savepoint.
    let alive: i32 = sqlx::query_scalar("select 1")
        .fetch_one(&mut **transaction.transaction())
        .await
        .unwrap();
    assert_eq!(alive, 1);
    transaction.commit().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn read_only_rejections_keep_a_shared_transaction_usable() {
    init_test_tracing();
    let database = spawn_database().await;
    let pool = &database.pool;
    let store = PostgresIndexStore::new(pool.clone());
    let source = PostgresContentSource::new(pool.clone(), TEST_SOURCE_SCHEMA);
    let maintainer = IndexMaintainer::new(store.clone(), source, EligibilityFilter::default());
    let u1 = Actor::user(1, "U1");
    let u2 = Actor::user(2, "U2");

    let page = write_history(pool, 1, "P1", &[&u1], 100, false).await;
    let saved = PageSaved {
        page,
        namespace: Namespace::MAIN,
        author: u1.clone(),
        timestamp: at(100),
        is_first_revision: true,
        is_redirect: false,
    };

    // The host opened a read-only transaction and lets the index write through it.
    let mut transaction = pool.begin().await.unwrap();
    sqlx::query("set transaction read only")
        .execute(&mut *transaction)
        .await
        .unwrap();
    let mut unit_of_work = UnitOfWork::new(PostgresIndexTransaction::from_transaction(transaction));

    for event in [
        ContentEvent::from(saved),
        ContentEvent::PageDeleted(page),
        ContentEvent::AuthorMerged {
            old: u1.clone(),
            new: u2.clone(),
        },
        ContentEvent::AuthorDeleted(u2.clone()),
    ] {
        maintainer.handle(&mut unit_of_work, &event).await.unwrap();
    }

    let host_read: i64 = sqlx::query_scalar(&format!(
        "select count(*) from {TEST_SOURCE_SCHEMA}.page"
    ))
    .fetch_one(&mut **unit_of_work.transaction().transaction())
    .await
    .unwrap();
    assert_eq!(host_read, 1);

    maintainer.commit(unit_of_work).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn content_source_reads_host_tables() {
    init_test_tracing();
    let database = spawn_database().await;
    let source = PostgresContentSource::new(database.pool.clone(), TEST_SOURCE_SCHEMA);
    let u1 = Actor::user(1, "U1");
    let u2 = Actor::user(2, "U2");

    let page = write_history(&database.pool, 4, "Page 4", &[&u2, &u1, &u1], 100, false).await;

    let status = source.page_status(page).await.unwrap().unwrap();
    assert_eq!(status.title, Title::main("Page 4"));
    assert_eq!(status.namespace(), Namespace::MAIN);
    assert!(!status.is_redirect);

    let first = source.first_revision(page).await.unwrap().unwrap();
    assert_eq!(first.author, u2);
    assert_eq!(first.timestamp, at(100));

    assert_eq!(source.page_status(PageId::new(99)).await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn recompute_rebuilds_from_host_tables() {
    init_test_tracing();
    let database = spawn_database().await;
    let pool = &database.pool;
    let store = PostgresIndexStore::new(pool.clone());
    let source = PostgresContentSource::new(pool.clone(), TEST_SOURCE_SCHEMA);
    let filter = EligibilityFilter::default();
    let u1 = Actor::user(1, "U1");
    let u2 = Actor::user(2, "U2");
    let u3 = Actor::user(3, "U3");

    let page_1 = write_history(pool, 1, "Page 1", &[&u1, &u2, &u3], 100, false).await;
    let page_4 = write_history(pool, 4, "Page 4", &[&u2, &u1, &u1], 200, false).await;
    write_history(pool, 7, "Redirect", &[&u3], 300, true).await;

    // Imported page without a root revision.
    let imported = PageId::new(8);
    insert_page(pool, imported, &Title::main("Imported"), false).await;
    insert_revision(pool, RevisionId::new(801), imported, Some(RevisionId::new(1)), &u3, at(50)).await;
    insert_revision(pool, RevisionId::new(802), imported, Some(RevisionId::new(801)), &u1, at(60)).await;

    let outcome = populate_if_empty(&store, &source, &filter).await.unwrap();
    assert_eq!(
        outcome,
        RecomputeOutcome::Completed(RecomputeSummary {
            candidates: 4,
            pages: 3,
            inserted: 3,
            ambiguous: 1,
        })
    );

    let creator = |page| {
        let store = store.clone();
        async move { store.created_page(page).await.unwrap().unwrap().creator }
    };
    assert_eq!(creator(page_1).await, u1);
    assert_eq!(creator(page_4).await, u2);
    assert_eq!(creator(imported).await, u3);

    let again = populate_if_empty(&store, &source, &filter).await.unwrap();
    assert_eq!(again, RecomputeOutcome::AlreadyPopulated);

    let read_only = store.clone().with_read_only(true);
    assert_eq!(
        recompute(&read_only, &source, &filter).await.unwrap(),
        RecomputeOutcome::Skipped
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn handlers_maintain_the_table() {
    init_test_tracing();
    let database = spawn_database().await;
    let pool = &database.pool;
    let store = PostgresIndexStore::new(pool.clone());
    let source = PostgresContentSource::new(pool.clone(), TEST_SOURCE_SCHEMA);
    let maintainer = IndexMaintainer::new(store.clone(), source, EligibilityFilter::default());
    let query = CreatedPagesQuery::new(store.clone());
    let u1 = Actor::user(1, "U1");
    let u2 = Actor::user(2, "U2");

    let page = write_history(pool, 1, "P1", &[&u1], 100, false).await;
    let saved = PageSaved {
        page,
        namespace: Namespace::MAIN,
        author: u1.clone(),
        timestamp: at(100),
        is_first_revision: true,
        is_redirect: false,
    };

    let apply = |event: ContentEvent| {
        let maintainer = maintainer.clone();
        async move {
            let mut unit_of_work = maintainer.begin().await.unwrap();
            maintainer.handle(&mut unit_of_work, &event).await.unwrap();
            maintainer.commit(unit_of_work).await.unwrap();
        }
    };

    apply(saved.into()).await;
    assert_eq!(query.list_created_pages("U1").await.unwrap(), vec![page]);

    apply(ContentEvent::PageDeleted(page)).await;
    assert!(query.list_created_pages("U1").await.unwrap().is_empty());

    apply(ContentEvent::PageUndeleted(page)).await;
    let row = query.created_page(page).await.unwrap().unwrap();
    assert_eq!(row.timestamp, at(100));

    apply(ContentEvent::AuthorMerged {
        old: u1.clone(),
        new: u2.clone(),
    })
    .await;
    assert!(query.list_created_pages("U1").await.unwrap().is_empty());
    assert_eq!(query.list_created_pages("U2").await.unwrap(), vec![page]);

    // A page gone from the host by the time the deferred update runs is skipped.
    delete_page(pool, page).await;
    apply(ContentEvent::PageUndeleted(page)).await;
    apply(ContentEvent::AuthorDeleted(u2.clone())).await;
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn recompute_runs_on_a_single_connection() {
    init_test_tracing();
    let database = spawn_database().await;
    let u1 = Actor::user(1, "U1");
    let u2 = Actor::user(2, "U2");
    let page = write_history(&database.pool, 1, "Page 1", &[&u1, &u2], 100, false).await;

    let pool = connect_to_database(&database.config, 1, 1).await.unwrap();
    let store = PostgresIndexStore::new(pool.clone());
    let source = PostgresContentSource::new(pool.clone(), TEST_SOURCE_SCHEMA);
    let filter = EligibilityFilter::default();

    let outcome = recompute(&store, &source, &filter).await.unwrap();
    assert_eq!(
        outcome,
        RecomputeOutcome::Completed(RecomputeSummary {
            candidates: 1,
            pages: 1,
            inserted: 1,
            ambiguous: 0,
        })
    );

    let again = populate_if_empty(&store, &source, &filter).await.unwrap();
    assert_eq!(again, RecomputeOutcome::AlreadyPopulated);
    assert_eq!(store.created_page(page).await.unwrap().unwrap().creator, u1);

    pool.close().await;
}
