use crate::error::CplResult;
use crate::store::base::IndexStore;
use crate::types::{ActorName, IndexRow, PageId, Pagination};

/// Read-only lookups on the created pages index.
#[derive(Debug, Clone)]
pub struct CreatedPagesQuery<S> {
    store: S,
}

impl<S> CreatedPagesQuery<S>
where
    S: IndexStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the pages created by `name`, newest first.
    ///
    /// Pages created at the same instant are ordered by descending page id. An author without
    /// pages, or unknown to the host, yields an empty list.
    pub async fn list_created_pages(&self, name: &str) -> CplResult<Vec<PageId>> {
        let rows = self.list_created_rows(name, None).await?;

        Ok(rows.into_iter().map(|row| row.page).collect())
    }

    /// Returns one page of the rows of [`CreatedPagesQuery::list_created_pages`].
    pub async fn list_created_pages_page(
        &self,
        name: &str,
        pagination: Pagination,
    ) -> CplResult<Vec<IndexRow>> {
        self.list_created_rows(name, Some(pagination)).await
    }

    /// Returns the rows of the pages created by `name`, newest first, optionally windowed.
    pub async fn list_created_rows(
        &self,
        name: &str,
        pagination: Option<Pagination>,
    ) -> CplResult<Vec<IndexRow>> {
        self.store
            .list_created_pages(&ActorName::new(name), pagination)
            .await
    }

    pub async fn created_page(&self, page: PageId) -> CplResult<Option<IndexRow>> {
        self.store.created_page(page).await
    }
}
