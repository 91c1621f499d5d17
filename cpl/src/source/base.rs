use std::future::Future;

use crate::error::CplResult;
use crate::types::{Namespace, PageId, Revision, Title};

/// Current state of an existing page as reported by a [`ContentSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageStatus {
    pub page: PageId,
    pub title: Title,
    pub is_redirect: bool,
}

impl PageStatus {
    pub fn namespace(&self) -> Namespace {
        self.title.namespace
    }
}

/// Read access to the host's canonical page and revision history.
///
/// The index never writes through a [`ContentSource`]. Pages that were deleted are reported as
/// missing until they are restored.
pub trait ContentSource: Clone + Send + Sync + 'static {
    /// Returns the current status of `page`, or `None` when the page does not exist.
    fn page_status(&self, page: PageId)
    -> impl Future<Output = CplResult<Option<PageStatus>>> + Send;

    /// Returns the revision that created `page`.
    ///
    /// The creating revision is the earliest revision without a parent, ties broken by the
    /// lowest revision id. Pages whose history has no parentless revision fall back to their
    /// earliest revision.
    fn first_revision(&self, page: PageId)
    -> impl Future<Output = CplResult<Option<Revision>>> + Send;

    /// Returns the creating revision candidates of every existing non-redirect page in
    /// `content_namespaces`.
    ///
    /// A page yields one candidate per parentless revision, or all of its revisions when none
    /// of them is parentless. Choosing among candidates is left to the caller.
    fn first_revision_candidates(
        &self,
        content_namespaces: &[Namespace],
    ) -> impl Future<Output = CplResult<Vec<Revision>>> + Send;
}

/// A [`ContentSource`] that can read the creating revision candidates through an open index
/// transaction of type `T`.
///
/// A recompute reads the candidates while it holds the index table lock. Sources stored next to
/// the index read through that transaction, so the read and the rebuild share one snapshot and
/// one connection.
pub trait TransactionalContentSource<T>: ContentSource {
    /// Same as [`ContentSource::first_revision_candidates`], read within `transaction`.
    fn first_revision_candidates_in(
        &self,
        transaction: &mut T,
        content_namespaces: &[Namespace],
    ) -> impl Future<Output = CplResult<Vec<Revision>>> + Send;
}
