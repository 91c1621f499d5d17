use crate::error::CplResult;
use crate::store::base::IndexTransaction;
use crate::types::PageId;

/// Work that must only happen after the enclosing [`UnitOfWork`] committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredUpdate {
    /// Re-index a restored page from its current status and first revision.
    RestoreCreation { page: PageId },
}

/// An index transaction together with the updates to run once it commits.
///
/// Handlers receive the unit of work explicitly and write through its transaction. Updates
/// that depend on committed state are queued with [`UnitOfWork::defer`] and handed back by
/// [`UnitOfWork::commit`]. A rollback drops them.
#[derive(Debug)]
pub struct UnitOfWork<T> {
    transaction: T,
    deferred: Vec<DeferredUpdate>,
}

impl<T> UnitOfWork<T>
where
    T: IndexTransaction,
{
    pub fn new(transaction: T) -> Self {
        Self {
            transaction,
            deferred: Vec::new(),
        }
    }

    pub fn transaction(&mut self) -> &mut T {
        &mut self.transaction
    }

    pub fn defer(&mut self, update: DeferredUpdate) {
        if !self.deferred.contains(&update) {
            self.deferred.push(update);
        }
    }

    pub fn deferred(&self) -> &[DeferredUpdate] {
        &self.deferred
    }

    /// Commits the transaction and returns the queued updates in registration order.
    pub async fn commit(self) -> CplResult<Vec<DeferredUpdate>> {
        self.transaction.commit().await?;

        Ok(self.deferred)
    }

    pub async fn rollback(self) -> CplResult<()> {
        self.transaction.rollback().await
    }
}
