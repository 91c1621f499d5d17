use chrono::{DateTime, Utc};

use crate::eligibility::EligibilityFilter;
use crate::error::CplResult;
use crate::events::ContentEvent;
use crate::maintainer::IndexMaintainer;
use crate::query::CreatedPagesQuery;
use crate::recompute::{RecomputeOutcome, recompute};
use crate::source::base::ContentSource;
use crate::source::memory::MemoryContentSource;
use crate::store::base::IndexStore;
use crate::store::memory::MemoryIndexStore;
use crate::types::{Actor, IndexRow, PageId, Title};

/// Returns the instant `secs` seconds after the Unix epoch.
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).expect("timestamp out of range")
}

/// An in-memory wiki wired to an index maintainer.
///
/// Every lifecycle operation changes the wiki first and then feeds the resulting event to the
/// maintainer in its own committed unit of work, the way a host would.
#[derive(Debug, Clone)]
pub struct TestWiki {
    pub source: MemoryContentSource,
    pub store: MemoryIndexStore,
    pub maintainer: IndexMaintainer<MemoryIndexStore, MemoryContentSource>,
    pub query: CreatedPagesQuery<MemoryIndexStore>,
}

impl TestWiki {
    pub fn new() -> Self {
        Self::with_filter(EligibilityFilter::default())
    }

    pub fn with_filter(filter: EligibilityFilter) -> Self {
        let source = MemoryContentSource::new();
        let store = MemoryIndexStore::new();
        let maintainer = IndexMaintainer::new(store.clone(), source.clone(), filter);
        let query = CreatedPagesQuery::new(store.clone());

        Self {
            source,
            store,
            maintainer,
            query,
        }
    }

    /// Handles `event` in a fresh unit of work and commits it.
    pub async fn apply(&self, event: impl Into<ContentEvent>) -> CplResult<()> {
        let event = event.into();
        let mut unit_of_work = self.maintainer.begin().await?;
        self.maintainer.handle(&mut unit_of_work, &event).await?;
        self.maintainer.commit(unit_of_work).await
    }

    pub async fn create(&self, title: &str, author: &Actor, secs: i64) -> PageId {
        self.create_in(Title::main(title), author, secs, false).await
    }

    pub async fn create_redirect(&self, title: &str, author: &Actor, secs: i64) -> PageId {
        self.create_in(Title::main(title), author, secs, true).await
    }

    pub async fn create_in(
        &self,
        title: Title,
        author: &Actor,
        secs: i64,
        is_redirect: bool,
    ) -> PageId {
        let saved = self
            .source
            .create_page(title, author.clone(), at(secs), is_redirect)
            .await
            .unwrap();
        let page = saved.page;
        self.apply(saved).await.unwrap();

        page
    }

    pub async fn edit(&self, page: PageId, author: &Actor, secs: i64, is_redirect: bool) {
        let saved = self
            .source
            .edit_page(page, author.clone(), at(secs), is_redirect)
            .await
            .unwrap();
        self.apply(saved).await.unwrap();
    }

    pub async fn delete(&self, page: PageId) {
        self.source.delete_page(page).await.unwrap();
        self.apply(ContentEvent::PageDeleted(page)).await.unwrap();
    }

    pub async fn undelete(&self, page: PageId) {
        self.source.undelete_page(page).await.unwrap();
        self.apply(ContentEvent::PageUndeleted(page)).await.unwrap();
    }

    pub async fn rename(&self, page: PageId, title: &str) {
        let moved = self
            .source
            .move_page(page, Title::main(title))
            .await
            .unwrap();
        self.apply(moved).await.unwrap();
    }

    pub async fn merge_authors(&self, old: &Actor, new: &Actor) {
        self.source.merge_authors(&old.name, new).await;
        self.apply(ContentEvent::AuthorMerged {
            old: old.clone(),
            new: new.clone(),
        })
        .await
        .unwrap();
    }

    pub async fn created_pages(&self, name: &str) -> Vec<PageId> {
        self.query.list_created_pages(name).await.unwrap()
    }

    pub async fn recompute(&self) -> RecomputeOutcome {
        recompute(&self.store, &self.source, self.maintainer.filter())
            .await
            .unwrap()
    }
}

impl Default for TestWiki {
    fn default() -> Self {
        Self::new()
    }
}

/// Rows the index must hold for the current state of `source`.
pub async fn expected_rows<C>(source: &C, pages: &[PageId], filter: &EligibilityFilter) -> Vec<IndexRow>
where
    C: ContentSource,
{
    let mut rows = Vec::new();
    for page in pages {
        let Some(status) = source.page_status(*page).await.unwrap() else {
            continue;
        };
        if !filter.is_eligible(status.namespace(), status.is_redirect) {
            continue;
        }
        if let Some(revision) = source.first_revision(*page).await.unwrap() {
            rows.push(IndexRow::from_revision(&revision));
        }
    }
    rows.sort_by_key(|row| row.page);

    rows
}

/// Asserts that the index holds exactly one row per existing eligible page of the wiki,
/// crediting the author and time of its creating revision.
pub async fn assert_index_matches_wiki(wiki: &TestWiki) {
    let pages = wiki.source.existing_pages().await;
    let expected = expected_rows(&wiki.source, &pages, wiki.maintainer.filter()).await;
    let actual = wiki.store.rows().await.unwrap();

    assert_eq!(actual, expected);
}
