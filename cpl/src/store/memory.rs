use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::bail;
use crate::error::{CplResult, ErrorKind};
use crate::failpoints::{INDEX_TRANSACTION_COMMIT, cpl_fail_point};
use crate::store::base::{IndexStore, IndexTransaction};
use crate::types::{Actor, ActorName, IndexRow, PageId, Pagination};

/// A write recorded by a [`MemoryIndexTransaction`] and replayed on commit.
#[derive(Debug, Clone)]
enum Operation {
    Upsert(IndexRow),
    InsertIfAbsent(IndexRow),
    DeletePage(PageId),
    ReassignCreator { old: ActorName, new: Actor },
    DeleteCreator(ActorName),
    Clear,
}

impl Operation {
    /// Applies the operation to `rows` and returns the number of affected rows.
    fn apply(&self, rows: &mut BTreeMap<PageId, IndexRow>) -> u64 {
        match self {
            Operation::Upsert(row) => {
                rows.insert(row.page, row.clone());
                1
            }
            Operation::InsertIfAbsent(row) => {
                if rows.contains_key(&row.page) {
                    return 0;
                }
                rows.insert(row.page, row.clone());
                1
            }
            Operation::DeletePage(page) => rows.remove(page).map_or(0, |_| 1),
            Operation::ReassignCreator { old, new } => {
                let mut affected = 0;
                for row in rows.values_mut().filter(|row| &row.creator.name == old) {
                    row.creator = new.clone();
                    affected += 1;
                }
                affected
            }
            Operation::DeleteCreator(creator) => {
                let before = rows.len();
                rows.retain(|_, row| &row.creator.name != creator);
                (before - rows.len()) as u64
            }
            Operation::Clear => {
                let affected = rows.len() as u64;
                rows.clear();
                affected
            }
        }
    }
}

/// Inner state of [`MemoryIndexStore`].
#[derive(Debug)]
struct Inner {
    /// Committed rows keyed by page.
    rows: BTreeMap<PageId, IndexRow>,
    /// Writes and commits fail with [`ErrorKind::ReadOnlyStorage`] while set.
    read_only: bool,
}

/// In-memory storage for the created pages index.
///
/// Every transaction works on a snapshot of the committed rows taken when it starts and keeps
/// a log of its writes. Committing replays the log against the rows committed at that time in
/// one step, so concurrent transactions behave like row-level last writer wins.
///
/// Writers share the table lock while [`IndexTransaction::lock_exclusive`] takes it exclusively,
/// which keeps handlers out while a recompute rewrites the table.
#[derive(Debug, Clone)]
pub struct MemoryIndexStore {
    inner: Arc<Mutex<Inner>>,
    table_lock: Arc<RwLock<()>>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        let inner = Inner {
            rows: BTreeMap::new(),
            read_only: false,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
            table_lock: Arc::new(RwLock::new(())),
        }
    }

    /// Switches the store in or out of read-only mode, like a database failing over to a
    /// replica.
    pub async fn set_read_only(&self, read_only: bool) {
        let mut inner = self.inner.lock().await;
        inner.read_only = read_only;
    }
}

impl Default for MemoryIndexStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexStore for MemoryIndexStore {
    type Transaction = MemoryIndexTransaction;

    async fn begin(&self) -> CplResult<Self::Transaction> {
        let inner = self.inner.lock().await;

        Ok(MemoryIndexTransaction {
            inner: self.inner.clone(),
            table_lock: self.table_lock.clone(),
            view: inner.rows.clone(),
            operations: Vec::new(),
            guard: TableGuard::None,
        })
    }

    async fn is_read_only(&self) -> CplResult<bool> {
        let inner = self.inner.lock().await;

        Ok(inner.read_only)
    }

    async fn created_page(&self, page: PageId) -> CplResult<Option<IndexRow>> {
        let inner = self.inner.lock().await;

        Ok(inner.rows.get(&page).cloned())
    }

    async fn list_created_pages(
        &self,
        creator: &ActorName,
        pagination: Option<Pagination>,
    ) -> CplResult<Vec<IndexRow>> {
        let inner = self.inner.lock().await;

        let mut rows: Vec<IndexRow> = inner
            .rows
            .values()
            .filter(|row| &row.creator.name == creator)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.page.cmp(&a.page))
        });

        let rows = match pagination {
            Some(Pagination { offset, limit }) => rows
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect(),
            None => rows,
        };

        Ok(rows)
    }

    async fn count(&self) -> CplResult<u64> {
        let inner = self.inner.lock().await;

        Ok(inner.rows.len() as u64)
    }

    async fn rows(&self) -> CplResult<Vec<IndexRow>> {
        let inner = self.inner.lock().await;

        Ok(inner.rows.values().cloned().collect())
    }
}

/// Share of the table lock held by a [`MemoryIndexTransaction`].
#[derive(Debug)]
enum TableGuard {
    None,
    Shared(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Exclusive(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

/// Write transaction of a [`MemoryIndexStore`].
#[derive(Debug)]
pub struct MemoryIndexTransaction {
    inner: Arc<Mutex<Inner>>,
    table_lock: Arc<RwLock<()>>,
    /// Committed rows at begin with this transaction's writes applied.
    view: BTreeMap<PageId, IndexRow>,
    operations: Vec<Operation>,
    guard: TableGuard,
}

impl MemoryIndexTransaction {
    async fn ensure_writable(&self) -> CplResult<()> {
        let inner = self.inner.lock().await;
        if inner.read_only {
            bail!(
                ErrorKind::ReadOnlyStorage,
                "The index store is in read-only mode"
            );
        }

        Ok(())
    }

    async fn write(&mut self, operation: Operation) -> CplResult<u64> {
        self.ensure_writable().await?;

        if matches!(self.guard, TableGuard::None) {
            let guard = self.table_lock.clone().read_owned().await;
            self.guard = TableGuard::Shared(guard);
        }

        let affected = operation.apply(&mut self.view);
        self.operations.push(operation);

        Ok(affected)
    }
}

impl IndexTransaction for MemoryIndexTransaction {
    async fn lock_exclusive(&mut self) -> CplResult<()> {
        match self.guard {
            TableGuard::Exclusive(_) => return Ok(()),
            TableGuard::Shared(_) => {
                bail!(
                    ErrorKind::InvalidState,
                    "The table lock must be taken before the first write of a transaction"
                );
            }
            TableGuard::None => {}
        }

        let guard = self.table_lock.clone().write_owned().await;
        self.guard = TableGuard::Exclusive(guard);

        // Writers that committed while we waited must be visible to us.
        let inner = self.inner.lock().await;
        self.view = inner.rows.clone();

        Ok(())
    }

    async fn upsert(&mut self, row: &IndexRow) -> CplResult<()> {
        self.write(Operation::Upsert(row.clone())).await?;

        Ok(())
    }

    async fn insert_if_absent(&mut self, row: &IndexRow) -> CplResult<bool> {
        let affected = self.write(Operation::InsertIfAbsent(row.clone())).await?;

        Ok(affected > 0)
    }

    async fn delete_page(&mut self, page: PageId) -> CplResult<bool> {
        let affected = self.write(Operation::DeletePage(page)).await?;

        Ok(affected > 0)
    }

    async fn reassign_creator(&mut self, old: &ActorName, new: &Actor) -> CplResult<u64> {
        self.write(Operation::ReassignCreator {
            old: old.clone(),
            new: new.clone(),
        })
        .await
    }

    async fn delete_creator(&mut self, creator: &ActorName) -> CplResult<u64> {
        self.write(Operation::DeleteCreator(creator.clone())).await
    }

    async fn clear(&mut self) -> CplResult<u64> {
        self.write(Operation::Clear).await
    }

    async fn commit(self) -> CplResult<()> {
        cpl_fail_point(INDEX_TRANSACTION_COMMIT)?;

        let mut inner = self.inner.lock().await;
        if self.operations.is_empty() {
            return Ok(());
        }

        if inner.read_only {
            bail!(
                ErrorKind::ReadOnlyStorage,
                "The index store is in read-only mode"
            );
        }

        let mut rows = inner.rows.clone();
        for operation in &self.operations {
            operation.apply(&mut rows);
        }
        inner.rows = rows;

        Ok(())
    }

    async fn rollback(self) -> CplResult<()> {
        Ok(())
    }
}
