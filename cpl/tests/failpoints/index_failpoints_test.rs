use cpl::error::ErrorKind;
use cpl::events::ContentEvent;
use cpl::failpoints::{INDEX_TRANSACTION_COMMIT, RECOMPUTE_BEFORE_COMMIT};
use cpl::recompute::{RecomputeOutcome, recompute};
use cpl::store::base::IndexStore;
use cpl::test_utils::failpoints::CustomFailScenario;
use cpl::test_utils::wiki::{TestWiki, at};
use cpl::types::{Actor, Title};
use cpl_telemetry::tracing::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn interrupted_recompute_keeps_previous_rows() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let u1 = Actor::user(1, "U1");
    wiki.create("Indexed", &u1, 100).await;
    wiki.source
        .create_page(Title::main("Unindexed"), u1.clone(), at(200), false)
        .await
        .unwrap();
    let before = wiki.store.rows().await.unwrap();

    let scenario = CustomFailScenario::setup(&[(RECOMPUTE_BEFORE_COMMIT, "return")]);
    let err = recompute(&wiki.store, &wiki.source, wiki.maintainer.filter())
        .await
        .unwrap_err();
    scenario.teardown();

    assert_eq!(err.kind(), ErrorKind::InjectedFailure);
    assert_eq!(wiki.store.rows().await.unwrap(), before);

    let outcome = wiki.recompute().await;
    assert!(matches!(outcome, RecomputeOutcome::Completed(summary) if summary.inserted == 2));
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_commit_is_returned_and_discards_writes() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let saved = wiki
        .source
        .create_page(Title::main("Article"), Actor::user(1, "U1"), at(100), false)
        .await
        .unwrap();

    let scenario = CustomFailScenario::setup(&[(INDEX_TRANSACTION_COMMIT, "return")]);
    let err = wiki.apply(saved).await.unwrap_err();
    scenario.teardown();

    assert_eq!(err.kind(), ErrorKind::InjectedFailure);
    assert_eq!(wiki.store.count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn read_only_rejection_at_commit_is_skipped() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let saved = wiki
        .source
        .create_page(Title::main("Article"), Actor::user(1, "U1"), at(100), false)
        .await
        .unwrap();

    let scenario = CustomFailScenario::setup(&[(INDEX_TRANSACTION_COMMIT, "return(read_only)")]);
    wiki.apply(saved).await.unwrap();
    scenario.teardown();

    assert_eq!(wiki.store.count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_deferred_update_does_not_fail_the_commit() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let u1 = Actor::user(1, "U1");
    let page = wiki.create("Article", &u1, 100).await;
    wiki.delete(page).await;
    wiki.source.undelete_page(page).await.unwrap();

    // The unit of work commits, the deferred update's own commit fails.
    let scenario = CustomFailScenario::setup(&[(INDEX_TRANSACTION_COMMIT, "1*off->return")]);
    wiki.apply(ContentEvent::PageUndeleted(page)).await.unwrap();
    scenario.teardown();

    assert_eq!(wiki.store.created_page(page).await.unwrap(), None);
}
