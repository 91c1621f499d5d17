use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::bail;
use crate::error::{CplResult, ErrorKind};
use crate::events::{PageMoved, PageSaved};
use crate::source::base::{ContentSource, PageStatus, TransactionalContentSource};
use crate::store::base::IndexTransaction;
use crate::types::{Actor, ActorName, Namespace, PageId, Revision, RevisionId, Title};

#[derive(Debug, Clone)]
struct StoredRevision {
    id: RevisionId,
    parent: Option<RevisionId>,
    author: Actor,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredPage {
    title: Title,
    is_redirect: bool,
    revisions: Vec<StoredRevision>,
}

impl StoredPage {
    /// Revisions that may have created the page: the parentless ones, or every revision when
    /// the history has none.
    fn creation_candidates(&self) -> Vec<&StoredRevision> {
        let roots: Vec<_> = self
            .revisions
            .iter()
            .filter(|revision| revision.parent.is_none())
            .collect();

        if roots.is_empty() {
            self.revisions.iter().collect()
        } else {
            roots
        }
    }

    fn first_revision(&self, page: PageId) -> Option<Revision> {
        self.creation_candidates()
            .into_iter()
            .min_by_key(|revision| (revision.timestamp, revision.id))
            .map(|revision| to_revision(page, revision))
    }
}

fn to_revision(page: PageId, revision: &StoredRevision) -> Revision {
    Revision {
        id: revision.id,
        page,
        author: revision.author.clone(),
        timestamp: revision.timestamp,
    }
}

/// Inner state of [`MemoryContentSource`].
#[derive(Debug)]
struct Inner {
    pages: BTreeMap<PageId, StoredPage>,
    /// Deleted pages with their full history, restorable by undelete.
    archive: BTreeMap<PageId, StoredPage>,
    next_page_id: i64,
    next_revision_id: i64,
}

impl Inner {
    fn title_in_use(&self, title: &Title) -> bool {
        self.pages.values().any(|page| &page.title == title)
    }

    fn allocate_revision_id(&mut self) -> RevisionId {
        let id = RevisionId::new(self.next_revision_id);
        self.next_revision_id += 1;
        id
    }
}

/// In-memory wiki acting as the canonical page and revision history.
///
/// Besides answering [`ContentSource`] queries it performs the page lifecycle operations a host
/// would, returning the events the host emits so they can be fed to an
/// [`crate::maintainer::IndexMaintainer`].
#[derive(Debug, Clone)]
pub struct MemoryContentSource {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryContentSource {
    pub fn new() -> Self {
        let inner = Inner {
            pages: BTreeMap::new(),
            archive: BTreeMap::new(),
            next_page_id: 1,
            next_revision_id: 1,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Creates a page with a single parentless revision.
    pub async fn create_page(
        &self,
        title: Title,
        author: Actor,
        timestamp: DateTime<Utc>,
        is_redirect: bool,
    ) -> CplResult<PageSaved> {
        let mut inner = self.inner.lock().await;

        if inner.title_in_use(&title) {
            bail!(
                ErrorKind::InvalidState,
                "A page with this title already exists",
                format!("The title {title} is taken")
            );
        }

        let page = PageId::new(inner.next_page_id);
        inner.next_page_id += 1;
        let revision = StoredRevision {
            id: inner.allocate_revision_id(),
            parent: None,
            author: author.clone(),
            timestamp,
        };
        let namespace = title.namespace;
        inner.pages.insert(
            page,
            StoredPage {
                title,
                is_redirect,
                revisions: vec![revision],
            },
        );

        Ok(PageSaved {
            page,
            namespace,
            author,
            timestamp,
            is_first_revision: true,
            is_redirect,
        })
    }

    /// Appends a revision to an existing page. `is_redirect` is the redirect state of the new
    /// content.
    pub async fn edit_page(
        &self,
        page: PageId,
        author: Actor,
        timestamp: DateTime<Utc>,
        is_redirect: bool,
    ) -> CplResult<PageSaved> {
        let mut inner = self.inner.lock().await;

        let id = inner.allocate_revision_id();
        let Some(stored) = inner.pages.get_mut(&page) else {
            bail!(
                ErrorKind::InvalidData,
                "Page does not exist",
                format!("The page {page} can't be edited")
            );
        };

        let parent = stored.revisions.last().map(|revision| revision.id);
        stored.revisions.push(StoredRevision {
            id,
            parent,
            author: author.clone(),
            timestamp,
        });
        stored.is_redirect = is_redirect;

        Ok(PageSaved {
            page,
            namespace: stored.title.namespace,
            author,
            timestamp,
            is_first_revision: parent.is_none(),
            is_redirect,
        })
    }

    /// Moves `page` and its history to the archive.
    pub async fn delete_page(&self, page: PageId) -> CplResult<()> {
        let mut inner = self.inner.lock().await;

        let Some(stored) = inner.pages.remove(&page) else {
            bail!(
                ErrorKind::InvalidData,
                "Page does not exist",
                format!("The page {page} can't be deleted")
            );
        };
        inner.archive.insert(page, stored);

        Ok(())
    }

    /// Restores an archived page under its previous identity and title.
    pub async fn undelete_page(&self, page: PageId) -> CplResult<()> {
        let mut inner = self.inner.lock().await;

        let Some(stored) = inner.archive.get(&page) else {
            bail!(
                ErrorKind::InvalidData,
                "Page is not archived",
                format!("The page {page} can't be restored")
            );
        };
        if inner.title_in_use(&stored.title) {
            bail!(
                ErrorKind::InvalidState,
                "A page with this title already exists",
                format!("The page {page} can't be restored over {}", stored.title)
            );
        }

        if let Some(stored) = inner.archive.remove(&page) {
            inner.pages.insert(page, stored);
        }

        Ok(())
    }

    pub async fn move_page(&self, page: PageId, new_title: Title) -> CplResult<PageMoved> {
        let mut inner = self.inner.lock().await;

        if inner.title_in_use(&new_title) {
            bail!(
                ErrorKind::InvalidState,
                "A page with this title already exists",
                format!("The page {page} can't be moved to {new_title}")
            );
        }

        let Some(stored) = inner.pages.get_mut(&page) else {
            bail!(
                ErrorKind::InvalidData,
                "Page does not exist",
                format!("The page {page} can't be moved")
            );
        };
        let old_title = std::mem::replace(&mut stored.title, new_title.clone());

        Ok(PageMoved {
            page,
            old_title,
            new_title,
        })
    }

    /// Credits every revision of `old`, archived ones included, to `new`. Returns the number of
    /// rewritten revisions.
    pub async fn merge_authors(&self, old: &ActorName, new: &Actor) -> u64 {
        let mut inner = self.inner.lock().await;
        let inner = &mut *inner;

        let mut merged = 0;
        for stored in inner.pages.values_mut().chain(inner.archive.values_mut()) {
            for revision in stored
                .revisions
                .iter_mut()
                .filter(|revision| &revision.author.name == old)
            {
                revision.author = new.clone();
                merged += 1;
            }
        }

        merged
    }

    /// Registers a page without any revision, as imported from another wiki.
    pub async fn insert_page(
        &self,
        page: PageId,
        title: Title,
        is_redirect: bool,
    ) -> CplResult<()> {
        let mut inner = self.inner.lock().await;

        if inner.pages.contains_key(&page) || inner.archive.contains_key(&page) {
            bail!(
                ErrorKind::InvalidState,
                "Page already exists",
                format!("The page {page} is already known")
            );
        }

        inner.next_page_id = inner.next_page_id.max(page.into_inner() + 1);
        inner.pages.insert(
            page,
            StoredPage {
                title,
                is_redirect,
                revisions: Vec::new(),
            },
        );

        Ok(())
    }

    /// Adds a revision with an explicit id and parent to an existing page.
    ///
    /// Unlike [`MemoryContentSource::edit_page`] this can produce histories a live wiki never
    /// would, such as several parentless revisions.
    pub async fn insert_revision(
        &self,
        page: PageId,
        id: RevisionId,
        parent: Option<RevisionId>,
        author: Actor,
        timestamp: DateTime<Utc>,
    ) -> CplResult<()> {
        let mut inner = self.inner.lock().await;

        inner.next_revision_id = inner.next_revision_id.max(id.into_inner() + 1);
        let Some(stored) = inner.pages.get_mut(&page) else {
            bail!(
                ErrorKind::InvalidData,
                "Page does not exist",
                format!("A revision can't be added to page {page}")
            );
        };
        stored.revisions.push(StoredRevision {
            id,
            parent,
            author,
            timestamp,
        });

        Ok(())
    }

    /// Ids of every existing page.
    pub async fn existing_pages(&self) -> Vec<PageId> {
        let inner = self.inner.lock().await;

        inner.pages.keys().copied().collect()
    }

    /// Ids of every archived page.
    pub async fn archived_pages(&self) -> Vec<PageId> {
        let inner = self.inner.lock().await;

        inner.archive.keys().copied().collect()
    }
}

impl Default for MemoryContentSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentSource for MemoryContentSource {
    async fn page_status(&self, page: PageId) -> CplResult<Option<PageStatus>> {
        let inner = self.inner.lock().await;

        Ok(inner.pages.get(&page).map(|stored| PageStatus {
            page,
            title: stored.title.clone(),
            is_redirect: stored.is_redirect,
        }))
    }

    async fn first_revision(&self, page: PageId) -> CplResult<Option<Revision>> {
        let inner = self.inner.lock().await;

        Ok(inner
            .pages
            .get(&page)
            .and_then(|stored| stored.first_revision(page)))
    }

    async fn first_revision_candidates(
        &self,
        content_namespaces: &[Namespace],
    ) -> CplResult<Vec<Revision>> {
        let inner = self.inner.lock().await;

        let candidates = inner
            .pages
            .iter()
            .filter(|(_, stored)| {
                !stored.is_redirect && content_namespaces.contains(&stored.title.namespace)
            })
            .flat_map(|(page, stored)| {
                stored
                    .creation_candidates()
                    .into_iter()
                    .map(|revision| to_revision(*page, revision))
            })
            .collect();

        Ok(candidates)
    }
}

/// The simulated history lives outside any index store, so every transaction reads it alike.
impl<T> TransactionalContentSource<T> for MemoryContentSource
where
    T: IndexTransaction,
{
    async fn first_revision_candidates_in(
        &self,
        _transaction: &mut T,
        content_namespaces: &[Namespace],
    ) -> CplResult<Vec<Revision>> {
        self.first_revision_candidates(content_namespaces).await
    }
}
