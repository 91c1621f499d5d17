//! Lifecycle events reported by the host for pages and authors.

use chrono::{DateTime, Utc};

use crate::types::{Actor, Namespace, PageId, Title};

/// A revision of a page was saved.
///
/// Only the save that creates the page (`is_first_revision`) is relevant to the index. The
/// redirect flag reflects the content of the saved revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSaved {
    pub page: PageId,
    pub namespace: Namespace,
    pub author: Actor,
    pub timestamp: DateTime<Utc>,
    pub is_first_revision: bool,
    pub is_redirect: bool,
}

/// A page was moved to a new title. Its [`PageId`] is unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMoved {
    pub page: PageId,
    pub old_title: Title,
    pub new_title: Title,
}

/// Every event a [`crate::maintainer::IndexMaintainer`] reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEvent {
    PageSaved(PageSaved),
    PageDeleted(PageId),
    PageUndeleted(PageId),
    PageMoved(PageMoved),
    AuthorMerged { old: Actor, new: Actor },
    AuthorDeleted(Actor),
}

impl ContentEvent {
    /// Returns the page the event is about, if it concerns a single page.
    pub fn page(&self) -> Option<PageId> {
        match self {
            ContentEvent::PageSaved(saved) => Some(saved.page),
            ContentEvent::PageDeleted(page) | ContentEvent::PageUndeleted(page) => Some(*page),
            ContentEvent::PageMoved(moved) => Some(moved.page),
            ContentEvent::AuthorMerged { .. } | ContentEvent::AuthorDeleted(_) => None,
        }
    }
}

impl From<PageSaved> for ContentEvent {
    fn from(event: PageSaved) -> Self {
        ContentEvent::PageSaved(event)
    }
}

impl From<PageMoved> for ContentEvent {
    fn from(event: PageMoved) -> Self {
        ContentEvent::PageMoved(event)
    }
}
