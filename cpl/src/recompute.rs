//! Rebuild of the whole index from the content history.
//!
//! A recompute runs in a single transaction that holds the table's exclusive write lock: the
//! table is cleared, the creating revision of every eligible page is selected from the
//! source's candidates and inserted, and the transaction commits. The candidates are read
//! through the same transaction, so a rebuild needs a single connection. A failure at any
//! point before the commit leaves the previous rows untouched.

use std::collections::BTreeMap;

use metrics::{counter, gauge};
use tracing::{Instrument, info, warn};

use crate::eligibility::EligibilityFilter;
use crate::error::CplResult;
use crate::failpoints::{RECOMPUTE_BEFORE_COMMIT, cpl_fail_point};
use crate::metrics::{CPL_RECOMPUTE_AMBIGUOUS_PAGES, CPL_RECOMPUTE_ROWS, CPL_RECOMPUTE_RUNS_TOTAL};
use crate::source::base::TransactionalContentSource;
use crate::store::base::{IndexStore, IndexTransaction};
use crate::types::{IndexRow, PageId, Revision};

/// Counters describing a completed recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecomputeSummary {
    /// Candidate revisions returned by the source.
    pub candidates: u64,
    /// Distinct pages among the candidates.
    pub pages: u64,
    /// Rows written to the index.
    pub inserted: u64,
    /// Pages with more than one candidate.
    pub ambiguous: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeOutcome {
    /// The store is read-only and was left as is.
    Skipped,
    /// The index already had rows and was left as is.
    AlreadyPopulated,
    Completed(RecomputeSummary),
}

/// The creating revision chosen for every page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FirstRevisionSelection {
    /// One row per page, ordered by page id.
    pub rows: Vec<IndexRow>,
    /// Pages that had several candidates, ordered by page id.
    pub ambiguous: Vec<PageId>,
}

/// Picks one creating revision per page: the earliest, ties broken by the lowest revision id.
pub fn select_first_revisions<I>(candidates: I) -> FirstRevisionSelection
where
    I: IntoIterator<Item = Revision>,
{
    let mut chosen: BTreeMap<PageId, (Revision, usize)> = BTreeMap::new();
    for candidate in candidates {
        match chosen.get_mut(&candidate.page) {
            Some((current, seen)) => {
                if current.id != candidate.id {
                    *seen += 1;
                }
                if candidate.creation_order() < current.creation_order() {
                    *current = candidate;
                }
            }
            None => {
                chosen.insert(candidate.page, (candidate, 1));
            }
        }
    }

    let mut selection = FirstRevisionSelection::default();
    for (page, (revision, seen)) in chosen {
        if seen > 1 {
            selection.ambiguous.push(page);
        }
        selection.rows.push(IndexRow::from_revision(&revision));
    }

    selection
}

/// Rebuilds the index from `source`.
///
/// Running it again without changes in the source leaves the index identical.
pub async fn recompute<S, C>(
    store: &S,
    source: &C,
    filter: &EligibilityFilter,
) -> CplResult<RecomputeOutcome>
where
    S: IndexStore,
    C: TransactionalContentSource<S::Transaction>,
{
    let span = tracing::info_span!(
        "recompute",
        content_namespaces = ?filter.content_namespaces()
    );

    recompute_inner(store, source, filter).instrument(span).await
}

/// Rebuilds the index only when it has no rows yet.
pub async fn populate_if_empty<S, C>(
    store: &S,
    source: &C,
    filter: &EligibilityFilter,
) -> CplResult<RecomputeOutcome>
where
    S: IndexStore,
    C: TransactionalContentSource<S::Transaction>,
{
    let rows = store.count().await?;
    if rows > 0 {
        info!(rows, "created pages index is already populated");
        return Ok(RecomputeOutcome::AlreadyPopulated);
    }

    recompute(store, source, filter).await
}

async fn recompute_inner<S, C>(
    store: &S,
    source: &C,
    filter: &EligibilityFilter,
) -> CplResult<RecomputeOutcome>
where
    S: IndexStore,
    C: TransactionalContentSource<S::Transaction>,
{
    if store.is_read_only().await? {
        warn!("index store is read-only, skipping recompute");
        return Ok(RecomputeOutcome::Skipped);
    }

    info!("recomputing created pages index");

    let mut transaction = store.begin().await?;
    let summary = match rebuild(&mut transaction, source, filter).await {
        Ok(summary) => summary,
        Err(err) => {
            if let Err(rollback_err) = transaction.rollback().await {
                warn!(error = %rollback_err, "failed to roll back recompute");
            }

            if err.is_read_only() {
                warn!(error = %err, "recompute rejected by read-only storage, skipping");
                return Ok(RecomputeOutcome::Skipped);
            }

            return Err(err);
        }
    };

    if let Err(err) = transaction.commit().await {
        if err.is_read_only() {
            warn!(error = %err, "recompute commit rejected by read-only storage, skipping");
            return Ok(RecomputeOutcome::Skipped);
        }

        return Err(err);
    }

    counter!(CPL_RECOMPUTE_RUNS_TOTAL).increment(1);
    gauge!(CPL_RECOMPUTE_ROWS).set(summary.inserted as f64);
    gauge!(CPL_RECOMPUTE_AMBIGUOUS_PAGES).set(summary.ambiguous as f64);

    info!(
        candidates = summary.candidates,
        pages = summary.pages,
        inserted = summary.inserted,
        ambiguous = summary.ambiguous,
        "created pages index recomputed"
    );

    Ok(RecomputeOutcome::Completed(summary))
}

async fn rebuild<T, C>(
    transaction: &mut T,
    source: &C,
    filter: &EligibilityFilter,
) -> CplResult<RecomputeSummary>
where
    T: IndexTransaction,
    C: TransactionalContentSource<T>,
{
    transaction.lock_exclusive().await?;

    let cleared = transaction.clear().await?;
    info!(cleared, "cleared created pages index");

    let candidates = source
        .first_revision_candidates_in(transaction, &filter.content_namespaces())
        .await?;
    let candidate_count = candidates.len() as u64;

    let selection = select_first_revisions(candidates);
    for page in &selection.ambiguous {
        warn!(%page, "page has several candidate creating revisions, keeping the earliest");
    }

    let inserted = transaction.insert_many_if_absent(&selection.rows).await?;

    cpl_fail_point(RECOMPUTE_BEFORE_COMMIT)?;

    Ok(RecomputeSummary {
        candidates: candidate_count,
        pages: selection.rows.len() as u64,
        inserted,
        ambiguous: selection.ambiguous.len() as u64,
    })
}
