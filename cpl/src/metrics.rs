//! Metric names emitted while maintaining the created pages index.

/// Label for the handler that produced a metric.
pub const HANDLER_LABEL: &str = "handler";

/// Counter for rows written by handlers and deferred updates.
pub const CPL_ROWS_UPSERTED_TOTAL: &str = "cpl_rows_upserted_total";

/// Counter for rows removed by handlers.
pub const CPL_ROWS_DELETED_TOTAL: &str = "cpl_rows_deleted_total";

/// Counter for rows credited to another author.
pub const CPL_ROWS_REASSIGNED_TOTAL: &str = "cpl_rows_reassigned_total";

/// Counter for writes skipped because the store was read-only.
pub const CPL_READ_ONLY_SKIPS_TOTAL: &str = "cpl_read_only_skips_total";

/// Counter for deferred updates run after a commit.
pub const CPL_DEFERRED_UPDATES_TOTAL: &str = "cpl_deferred_updates_total";

/// Counter for deferred updates that failed. They are never retried.
pub const CPL_DEFERRED_UPDATE_FAILURES_TOTAL: &str = "cpl_deferred_update_failures_total";

/// Counter for completed recomputes.
pub const CPL_RECOMPUTE_RUNS_TOTAL: &str = "cpl_recompute_runs_total";

/// Gauge for the number of rows left by the last recompute.
pub const CPL_RECOMPUTE_ROWS: &str = "cpl_recompute_rows";

/// Gauge for the number of pages with an ambiguous creating revision seen by the last
/// recompute.
pub const CPL_RECOMPUTE_AMBIGUOUS_PAGES: &str = "cpl_recompute_ambiguous_pages";
