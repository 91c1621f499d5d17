//! Derived index of "which user created which page, and when".
//!
//! The index holds one row per existing page in a content namespace that is not a redirect,
//! keyed by the page's stable id and recording the author and time of its creating revision.
//! [`maintainer::IndexMaintainer`] keeps it in sync with lifecycle events of the host,
//! [`recompute::recompute`] rebuilds it from the full history and
//! [`query::CreatedPagesQuery`] serves the per-author listing.

pub mod eligibility;
pub mod error;
pub mod events;
pub mod failpoints;
mod macros;
pub mod maintainer;
pub mod metrics;
pub mod migrations;
pub mod query;
pub mod recompute;
pub mod source;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod unit_of_work;
