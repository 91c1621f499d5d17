//! Translation of content lifecycle events into index writes.
//!
//! Every handler receives the [`UnitOfWork`] it writes through. Handlers skip quietly when the
//! store is read-only, and a write the store rejects for that reason is tolerated with a
//! warning. Any other storage failure is returned to the caller, which is expected to roll the
//! unit of work back.

use metrics::counter;
use tracing::{debug, error, info, trace, warn};

use crate::eligibility::EligibilityFilter;
use crate::error::CplResult;
use crate::events::{ContentEvent, PageMoved, PageSaved};
use crate::metrics::{
    CPL_DEFERRED_UPDATE_FAILURES_TOTAL, CPL_DEFERRED_UPDATES_TOTAL, CPL_READ_ONLY_SKIPS_TOTAL,
    CPL_ROWS_DELETED_TOTAL, CPL_ROWS_REASSIGNED_TOTAL, CPL_ROWS_UPSERTED_TOTAL, HANDLER_LABEL,
};
use crate::source::base::ContentSource;
use crate::store::base::{IndexStore, IndexTransaction};
use crate::types::{Actor, IndexRow, PageId};
use crate::unit_of_work::{DeferredUpdate, UnitOfWork};

/// Turns a read-only rejection into `None` so the caller can carry on with a stale index.
fn tolerate_read_only<T>(handler: &'static str, result: CplResult<T>) -> CplResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_read_only() => {
            warn!(handler, error = %err, "index write rejected by read-only storage, skipping");
            counter!(CPL_READ_ONLY_SKIPS_TOTAL, HANDLER_LABEL => handler).increment(1);

            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Keeps the created pages index in sync with the content history.
#[derive(Debug, Clone)]
pub struct IndexMaintainer<S, C> {
    store: S,
    source: C,
    filter: EligibilityFilter,
}

impl<S, C> IndexMaintainer<S, C>
where
    S: IndexStore,
    C: ContentSource,
{
    pub fn new(store: S, source: C, filter: EligibilityFilter) -> Self {
        Self {
            store,
            source,
            filter,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn source(&self) -> &C {
        &self.source
    }

    pub fn filter(&self) -> &EligibilityFilter {
        &self.filter
    }

    /// Starts a unit of work on the index store.
    pub async fn begin(&self) -> CplResult<UnitOfWork<S::Transaction>> {
        let transaction = self.store.begin().await?;

        Ok(UnitOfWork::new(transaction))
    }

    /// Commits `unit_of_work` and then runs its deferred updates.
    ///
    /// Only the commit can fail. Deferred updates run once each, in their own transactions,
    /// and their failures are logged without being retried.
    pub async fn commit(&self, unit_of_work: UnitOfWork<S::Transaction>) -> CplResult<()> {
        let Some(deferred) = tolerate_read_only("commit", unit_of_work.commit().await)? else {
            return Ok(());
        };

        self.run_deferred(deferred).await;

        Ok(())
    }

    /// Runs updates deferred by a unit of work that the host committed itself.
    pub async fn run_deferred(&self, updates: Vec<DeferredUpdate>) {
        for update in updates {
            counter!(CPL_DEFERRED_UPDATES_TOTAL).increment(1);

            if let Err(err) = self.apply_deferred(&update).await {
                counter!(CPL_DEFERRED_UPDATE_FAILURES_TOTAL).increment(1);
                error!(?update, error = %err, "deferred index update failed");
            }
        }
    }

    /// Dispatches `event` to its handler.
    pub async fn handle(
        &self,
        unit_of_work: &mut UnitOfWork<S::Transaction>,
        event: &ContentEvent,
    ) -> CplResult<()> {
        match event {
            ContentEvent::PageSaved(saved) => self.on_page_saved(unit_of_work, saved).await,
            ContentEvent::PageDeleted(page) => self.on_page_deleted(unit_of_work, *page).await,
            ContentEvent::PageUndeleted(page) => {
                self.on_page_undeleted(unit_of_work, *page).await
            }
            ContentEvent::PageMoved(moved) => self.on_page_renamed(unit_of_work, moved).await,
            ContentEvent::AuthorMerged { old, new } => {
                self.on_author_merged(unit_of_work, old, new).await
            }
            ContentEvent::AuthorDeleted(author) => {
                self.on_author_deleted(unit_of_work, author).await
            }
        }
    }

    /// Records the creation of a page when `event` saved its first revision and the page is
    /// eligible at that moment.
    pub async fn on_page_saved(
        &self,
        unit_of_work: &mut UnitOfWork<S::Transaction>,
        event: &PageSaved,
    ) -> CplResult<()> {
        if !event.is_first_revision {
            trace!(page = %event.page, "ignoring save of a later revision");
            return Ok(());
        }

        if !self.filter.is_eligible(event.namespace, event.is_redirect) {
            debug!(
                page = %event.page,
                namespace = %event.namespace,
                is_redirect = event.is_redirect,
                "created page is not eligible for the index"
            );
            return Ok(());
        }

        if self.skip_read_only("page_saved").await? {
            return Ok(());
        }

        let row = IndexRow::new(event.page, event.author.clone(), event.timestamp);
        let result = unit_of_work.transaction().upsert(&row).await;
        if tolerate_read_only("page_saved", result)?.is_some() {
            counter!(CPL_ROWS_UPSERTED_TOTAL, HANDLER_LABEL => "page_saved").increment(1);
            debug!(page = %row.page, creator = %row.creator, "recorded created page");
        }

        Ok(())
    }

    /// Removes the row of a deleted page. Pages that were never indexed are ignored.
    pub async fn on_page_deleted(
        &self,
        unit_of_work: &mut UnitOfWork<S::Transaction>,
        page: PageId,
    ) -> CplResult<()> {
        if self.skip_read_only("page_deleted").await? {
            return Ok(());
        }

        let result = unit_of_work.transaction().delete_page(page).await;
        match tolerate_read_only("page_deleted", result)? {
            Some(true) => {
                counter!(CPL_ROWS_DELETED_TOTAL, HANDLER_LABEL => "page_deleted").increment(1);
                debug!(%page, "removed deleted page");
            }
            Some(false) => debug!(%page, "deleted page was not indexed"),
            None => {}
        }

        Ok(())
    }

    /// Queues the re-indexing of a restored page until `unit_of_work` commits.
    ///
    /// The restored page is read back from the content source at that point, so its current
    /// namespace and redirect state decide whether it is indexed.
    pub async fn on_page_undeleted(
        &self,
        unit_of_work: &mut UnitOfWork<S::Transaction>,
        page: PageId,
    ) -> CplResult<()> {
        if self.skip_read_only("page_undeleted").await? {
            return Ok(());
        }

        unit_of_work.defer(DeferredUpdate::RestoreCreation { page });
        debug!(%page, "deferred indexing of restored page");

        Ok(())
    }

    /// Rows are keyed by page id, which a move does not change.
    pub async fn on_page_renamed(
        &self,
        _unit_of_work: &mut UnitOfWork<S::Transaction>,
        event: &PageMoved,
    ) -> CplResult<()> {
        trace!(
            page = %event.page,
            old_title = %event.old_title,
            new_title = %event.new_title,
            "page moved, index row unchanged"
        );

        Ok(())
    }

    /// Credits every page created by `old` to `new`.
    pub async fn on_author_merged(
        &self,
        unit_of_work: &mut UnitOfWork<S::Transaction>,
        old: &Actor,
        new: &Actor,
    ) -> CplResult<()> {
        if self.skip_read_only("author_merged").await? {
            return Ok(());
        }

        let result = unit_of_work
            .transaction()
            .reassign_creator(&old.name, new)
            .await;
        if let Some(reassigned) = tolerate_read_only("author_merged", result)? {
            counter!(CPL_ROWS_REASSIGNED_TOTAL).increment(reassigned);
            info!(old = %old, new = %new, reassigned, "merged author in created pages index");
        }

        Ok(())
    }

    /// Drops every page created by `author` from the index.
    pub async fn on_author_deleted(
        &self,
        unit_of_work: &mut UnitOfWork<S::Transaction>,
        author: &Actor,
    ) -> CplResult<()> {
        if self.skip_read_only("author_deleted").await? {
            return Ok(());
        }

        let result = unit_of_work
            .transaction()
            .delete_creator(&author.name)
            .await;
        if let Some(deleted) = tolerate_read_only("author_deleted", result)? {
            counter!(CPL_ROWS_DELETED_TOTAL, HANDLER_LABEL => "author_deleted").increment(deleted);
            info!(author = %author, deleted, "removed deleted author from created pages index");
        }

        Ok(())
    }

    async fn skip_read_only(&self, handler: &'static str) -> CplResult<bool> {
        if !self.store.is_read_only().await? {
            return Ok(false);
        }

        debug!(handler, "index store is read-only, skipping");
        counter!(CPL_READ_ONLY_SKIPS_TOTAL, HANDLER_LABEL => handler).increment(1);

        Ok(true)
    }

    async fn apply_deferred(&self, update: &DeferredUpdate) -> CplResult<()> {
        match update {
            DeferredUpdate::RestoreCreation { page } => self.restore_creation(*page).await,
        }
    }

    async fn restore_creation(&self, page: PageId) -> CplResult<()> {
        if self.skip_read_only("page_undeleted").await? {
            return Ok(());
        }

        let Some(status) = self.source.page_status(page).await? else {
            debug!(%page, "restored page no longer exists");
            return Ok(());
        };

        let Some(revision) = self.source.first_revision(page).await? else {
            warn!(%page, title = %status.title, "restored page has no revisions");
            return Ok(());
        };

        if !self
            .filter
            .is_eligible(status.namespace(), status.is_redirect)
        {
            debug!(
                %page,
                namespace = %status.namespace(),
                is_redirect = status.is_redirect,
                "restored page is not eligible for the index"
            );
            return Ok(());
        }

        let row = IndexRow::from_revision(&revision);
        let mut transaction = self.store.begin().await?;
        let written = match tolerate_read_only("page_undeleted", transaction.upsert(&row).await)? {
            Some(()) => tolerate_read_only("page_undeleted", transaction.commit().await)?,
            None => {
                transaction.rollback().await?;
                None
            }
        };

        if written.is_some() {
            counter!(CPL_ROWS_UPSERTED_TOTAL, HANDLER_LABEL => "page_undeleted").increment(1);
            debug!(%page, creator = %row.creator, "restored created page");
        }

        Ok(())
    }
}
