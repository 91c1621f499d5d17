use std::future::Future;

use crate::error::CplResult;
use crate::types::{Actor, ActorName, IndexRow, PageId, Pagination};

/// Storage of the created pages index.
///
/// [`IndexStore`] implementations own the index rows and hand out [`IndexTransaction`]s for
/// writes. Reads outside of a transaction only see committed data.
///
/// Implementations must be cheap to clone and safe to share between tasks.
pub trait IndexStore: Clone + Send + Sync + 'static {
    type Transaction: IndexTransaction;

    /// Starts a new write transaction.
    fn begin(&self) -> impl Future<Output = CplResult<Self::Transaction>> + Send;

    /// Returns `true` when writes are currently rejected, either because the store was
    /// configured read-only or because the underlying storage is in read-only mode.
    fn is_read_only(&self) -> impl Future<Output = CplResult<bool>> + Send;

    /// Returns the committed row of `page`, if any.
    fn created_page(&self, page: PageId)
    -> impl Future<Output = CplResult<Option<IndexRow>>> + Send;

    /// Returns the rows created by `creator`, newest first with ties ordered by descending
    /// page id.
    fn list_created_pages(
        &self,
        creator: &ActorName,
        pagination: Option<Pagination>,
    ) -> impl Future<Output = CplResult<Vec<IndexRow>>> + Send;

    /// Returns the number of committed rows.
    fn count(&self) -> impl Future<Output = CplResult<u64>> + Send;

    /// Returns every committed row ordered by page id.
    fn rows(&self) -> impl Future<Output = CplResult<Vec<IndexRow>>> + Send;
}

/// A write transaction on an [`IndexStore`].
///
/// Writes are only visible to other readers after [`IndexTransaction::commit`]. Dropping a
/// transaction without committing discards its writes.
pub trait IndexTransaction: Send {
    /// Blocks concurrent writers of the index table until this transaction ends.
    fn lock_exclusive(&mut self) -> impl Future<Output = CplResult<()>> + Send;

    /// Inserts `row`, replacing any existing row of the same page.
    fn upsert(&mut self, row: &IndexRow) -> impl Future<Output = CplResult<()>> + Send;

    /// Inserts `row` unless a row of the same page exists. Returns whether it was inserted.
    fn insert_if_absent(&mut self, row: &IndexRow)
    -> impl Future<Output = CplResult<bool>> + Send;

    /// Inserts every row of `rows` that has no counterpart yet and returns how many were
    /// inserted.
    fn insert_many_if_absent(
        &mut self,
        rows: &[IndexRow],
    ) -> impl Future<Output = CplResult<u64>> + Send {
        async move {
            let mut inserted = 0;
            for row in rows {
                if self.insert_if_absent(row).await? {
                    inserted += 1;
                }
            }

            Ok(inserted)
        }
    }

    /// Deletes the row of `page`. Returns whether a row existed.
    fn delete_page(&mut self, page: PageId) -> impl Future<Output = CplResult<bool>> + Send;

    /// Credits every row created by `old` to `new` and returns the number of rewritten rows.
    fn reassign_creator(
        &mut self,
        old: &ActorName,
        new: &Actor,
    ) -> impl Future<Output = CplResult<u64>> + Send;

    /// Deletes every row created by `creator` and returns the number of deleted rows.
    fn delete_creator(&mut self, creator: &ActorName)
    -> impl Future<Output = CplResult<u64>> + Send;

    /// Deletes every row and returns the number of deleted rows.
    fn clear(&mut self) -> impl Future<Output = CplResult<u64>> + Send;

    fn commit(self) -> impl Future<Output = CplResult<()>> + Send;

    fn rollback(self) -> impl Future<Output = CplResult<()>> + Send;
}
