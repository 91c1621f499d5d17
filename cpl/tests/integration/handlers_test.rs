use cpl::error::ErrorKind;
use cpl::events::{ContentEvent, PageMoved, PageSaved};
use cpl::source::base::ContentSource;
use cpl::store::base::{IndexStore, IndexTransaction};
use cpl::test_utils::wiki::{TestWiki, assert_index_matches_wiki, at};
use cpl::types::{Actor, Namespace, PageId, Title};
use cpl::unit_of_work::DeferredUpdate;
use cpl_telemetry::tracing::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn created_page_survives_delete_undelete_rename_and_merge() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let u1 = Actor::user(1, "U1");
    let u2 = Actor::user(2, "U2");

    let p1 = wiki.create("P1", &u1, 100).await;
    assert_eq!(wiki.created_pages("U1").await, vec![p1]);

    wiki.delete(p1).await;
    assert_eq!(wiki.created_pages("U1").await, Vec::<PageId>::new());

    wiki.undelete(p1).await;
    assert_eq!(wiki.created_pages("U1").await, vec![p1]);
    let row = wiki.store.created_page(p1).await.unwrap().unwrap();
    assert_eq!(row.timestamp, at(100));

    wiki.rename(p1, "P2").await;
    assert_eq!(wiki.created_pages("U1").await, vec![p1]);
    assert_eq!(wiki.store.count().await.unwrap(), 1);
    let status = wiki.source.page_status(p1).await.unwrap().unwrap();
    assert_eq!(status.title, Title::main("P2"));

    wiki.merge_authors(&u1, &u2).await;
    assert_eq!(wiki.created_pages("U1").await, Vec::<PageId>::new());
    assert_eq!(wiki.created_pages("U2").await, vec![p1]);

    assert_index_matches_wiki(&wiki).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn later_revisions_do_not_change_the_creator() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let u1 = Actor::user(1, "U1");
    let u2 = Actor::user(2, "U2");

    let page = wiki.create("Article", &u1, 100).await;
    wiki.edit(page, &u2, 200, false).await;
    wiki.edit(page, &u1, 300, false).await;

    let row = wiki.store.created_page(page).await.unwrap().unwrap();
    assert_eq!(row.creator, u1);
    assert_eq!(row.timestamp, at(100));
    assert_eq!(wiki.created_pages("U2").await, Vec::<PageId>::new());
}

#[tokio::test(flavor = "multi_thread")]
async fn redirects_are_never_indexed() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let u1 = Actor::user(1, "U1");

    let redirect = wiki.create_redirect("Shortcut", &u1, 100).await;

    assert!(wiki.source.first_revision(redirect).await.unwrap().is_some());
    assert_eq!(wiki.store.created_page(redirect).await.unwrap(), None);
    assert_eq!(wiki.created_pages("U1").await, Vec::<PageId>::new());
}

#[tokio::test(flavor = "multi_thread")]
async fn pages_outside_content_namespaces_are_not_indexed() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let u1 = Actor::user(1, "U1");

    wiki.create_in(Title::new(Namespace::TALK, "Article"), &u1, 100, false)
        .await;
    wiki.create_in(Title::new(Namespace::TEMPLATE, "Infobox"), &u1, 200, false)
        .await;

    assert_eq!(wiki.store.count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn deleting_then_creating_does_not_resurrect_the_old_row() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let u1 = Actor::user(1, "U1");
    let u2 = Actor::user(2, "U2");

    let old = wiki.create("Article", &u1, 100).await;
    wiki.delete(old).await;
    let new = wiki.create("Article", &u2, 200).await;

    assert_ne!(old, new);
    assert_eq!(wiki.store.created_page(old).await.unwrap(), None);
    assert_eq!(wiki.created_pages("U1").await, Vec::<PageId>::new());
    assert_eq!(wiki.created_pages("U2").await, vec![new]);
    assert_index_matches_wiki(&wiki).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn deleting_an_unindexed_page_is_a_no_op() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let u1 = Actor::user(1, "U1");
    let page = wiki.create("Article", &u1, 100).await;

    wiki.apply(ContentEvent::PageDeleted(PageId::new(999)))
        .await
        .unwrap();

    assert_eq!(wiki.created_pages("U1").await, vec![page]);
}

#[tokio::test(flavor = "multi_thread")]
async fn undelete_is_applied_only_after_commit() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let u1 = Actor::user(1, "U1");
    let page = wiki.create("Article", &u1, 100).await;
    wiki.delete(page).await;
    wiki.source.undelete_page(page).await.unwrap();

    let mut unit_of_work = wiki.maintainer.begin().await.unwrap();
    wiki.maintainer
        .on_page_undeleted(&mut unit_of_work, page)
        .await
        .unwrap();

    assert_eq!(
        unit_of_work.deferred(),
        &[DeferredUpdate::RestoreCreation { page }]
    );
    assert_eq!(wiki.store.created_page(page).await.unwrap(), None);

    wiki.maintainer.commit(unit_of_work).await.unwrap();
    let row = wiki.store.created_page(page).await.unwrap().unwrap();
    assert_eq!(row.creator, u1);
    assert_eq!(row.timestamp, at(100));
}

#[tokio::test(flavor = "multi_thread")]
async fn rolled_back_undelete_never_runs() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let u1 = Actor::user(1, "U1");
    let page = wiki.create("Article", &u1, 100).await;
    wiki.delete(page).await;
    wiki.source.undelete_page(page).await.unwrap();

    let mut unit_of_work = wiki.maintainer.begin().await.unwrap();
    wiki.maintainer
        .on_page_undeleted(&mut unit_of_work, page)
        .await
        .unwrap();
    unit_of_work.rollback().await.unwrap();

    assert_eq!(wiki.store.created_page(page).await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn undelete_of_a_missing_page_is_skipped() {
    init_test_tracing();
    let wiki = TestWiki::new();

    wiki.apply(ContentEvent::PageUndeleted(PageId::new(42)))
        .await
        .unwrap();

    assert_eq!(wiki.store.count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn undelete_rechecks_current_eligibility() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let u1 = Actor::user(1, "U1");
    let page = wiki.create("Article", &u1, 100).await;

    // The page became a redirect before being deleted.
    wiki.edit(page, &u1, 200, true).await;
    wiki.delete(page).await;
    wiki.undelete(page).await;

    assert_eq!(wiki.store.created_page(page).await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn rename_is_a_no_op_for_the_index() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let u1 = Actor::user(1, "U1");
    let page = wiki.create("Before", &u1, 100).await;
    let before = wiki.store.rows().await.unwrap();

    let mut unit_of_work = wiki.maintainer.begin().await.unwrap();
    wiki.maintainer
        .on_page_renamed(
            &mut unit_of_work,
            &PageMoved {
                page,
                old_title: Title::main("Before"),
                new_title: Title::main("After"),
            },
        )
        .await
        .unwrap();
    wiki.maintainer.commit(unit_of_work).await.unwrap();

    assert_eq!(wiki.store.rows().await.unwrap(), before);
}

#[tokio::test(flavor = "multi_thread")]
async fn author_merge_rewrites_every_row_of_the_old_author() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let u1 = Actor::user(1, "U1");
    let u2 = Actor::user(2, "U2");
    let u3 = Actor::user(3, "U3");

    let a = wiki.create("A", &u1, 100).await;
    let b = wiki.create("B", &u2, 200).await;
    let c = wiki.create("C", &u1, 300).await;
    let d = wiki.create("D", &u3, 400).await;

    wiki.merge_authors(&u1, &u2).await;

    assert_eq!(wiki.created_pages("U2").await, vec![c, b, a]);
    assert_eq!(wiki.created_pages("U3").await, vec![d]);
    for page in [a, c] {
        let row = wiki.store.created_page(page).await.unwrap().unwrap();
        assert_eq!(row.creator, u2);
    }
    assert_index_matches_wiki(&wiki).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn author_deletion_removes_their_rows() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let u1 = Actor::user(1, "U1");
    let u2 = Actor::user(2, "U2");

    wiki.create("A", &u1, 100).await;
    let b = wiki.create("B", &u2, 200).await;
    wiki.create("C", &u1, 300).await;

    wiki.apply(ContentEvent::AuthorDeleted(u1.clone()))
        .await
        .unwrap();

    assert_eq!(wiki.created_pages("U1").await, Vec::<PageId>::new());
    assert_eq!(wiki.created_pages("U2").await, vec![b]);
}

#[tokio::test(flavor = "multi_thread")]
async fn anonymous_creators_are_indexed_by_name() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let anonymous = Actor::anonymous("192.0.2.7");

    let page = wiki.create("Article", &anonymous, 100).await;

    assert_eq!(wiki.created_pages("192.0.2.7").await, vec![page]);
}

#[tokio::test(flavor = "multi_thread")]
async fn read_only_store_skips_every_handler() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let u1 = Actor::user(1, "U1");
    let indexed = wiki.create("Indexed", &u1, 100).await;

    wiki.store.set_read_only(true).await;
    let skipped = wiki.create("Skipped", &u1, 200).await;
    wiki.delete(indexed).await;
    wiki.merge_authors(&u1, &Actor::user(2, "U2")).await;
    wiki.apply(ContentEvent::AuthorDeleted(u1.clone()))
        .await
        .unwrap();

    wiki.store.set_read_only(false).await;
    assert_eq!(wiki.store.created_page(skipped).await.unwrap(), None);
    assert!(wiki.store.created_page(indexed).await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn read_only_rejection_at_commit_is_tolerated() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let u1 = Actor::user(1, "U1");
    let saved = wiki
        .source
        .create_page(Title::main("Article"), u1.clone(), at(100), false)
        .await
        .unwrap();

    let mut unit_of_work = wiki.maintainer.begin().await.unwrap();
    wiki.maintainer
        .on_page_saved(&mut unit_of_work, &saved)
        .await
        .unwrap();
    wiki.store.set_read_only(true).await;

    wiki.maintainer.commit(unit_of_work).await.unwrap();

    wiki.store.set_read_only(false).await;
    assert_eq!(wiki.store.count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_transactions_leave_the_index_untouched() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let u1 = Actor::user(1, "U1");
    let saved = PageSaved {
        page: PageId::new(1),
        namespace: Namespace::MAIN,
        author: u1,
        timestamp: at(100),
        is_first_revision: true,
        is_redirect: false,
    };

    // A transaction that already wrote can't take the table lock.
    let mut unit_of_work = wiki.maintainer.begin().await.unwrap();
    wiki.maintainer
        .on_page_saved(&mut unit_of_work, &saved)
        .await
        .unwrap();
    let err = unit_of_work
        .transaction()
        .lock_exclusive()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
    unit_of_work.rollback().await.unwrap();
    assert_eq!(wiki.store.count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn several_events_share_one_unit_of_work() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let u1 = Actor::user(1, "U1");
    let first = wiki
        .source
        .create_page(Title::main("First"), u1.clone(), at(100), false)
        .await
        .unwrap();
    let second = wiki
        .source
        .create_page(Title::main("Second"), u1.clone(), at(200), false)
        .await
        .unwrap();
    wiki.source.delete_page(first.page).await.unwrap();

    let mut unit_of_work = wiki.maintainer.begin().await.unwrap();
    for event in [
        ContentEvent::from(first.clone()),
        ContentEvent::from(second.clone()),
        ContentEvent::PageDeleted(first.page),
    ] {
        wiki.maintainer
            .handle(&mut unit_of_work, &event)
            .await
            .unwrap();
    }
    wiki.maintainer.commit(unit_of_work).await.unwrap();

    assert_eq!(wiki.created_pages("U1").await, vec![second.page]);
    assert_index_matches_wiki(&wiki).await;
}

/// Only the redirect state at creation is checked. A page edited into a redirect later keeps
/// its row, and a redirect edited into an article stays unindexed.
#[tokio::test(flavor = "multi_thread")]
async fn later_redirect_transitions_are_not_observed() {
    init_test_tracing();
    let wiki = TestWiki::new();
    let u1 = Actor::user(1, "U1");

    let article = wiki.create("Article", &u1, 100).await;
    let redirect = wiki.create_redirect("Redirect", &u1, 200).await;

    wiki.edit(article, &u1, 300, true).await;
    wiki.edit(redirect, &u1, 400, false).await;

    assert!(wiki.store.created_page(article).await.unwrap().is_some());
    assert_eq!(wiki.store.created_page(redirect).await.unwrap(), None);
}
