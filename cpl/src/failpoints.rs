use fail::fail_point;

use crate::bail;
use crate::error::{CplResult, ErrorKind};

/// Fires after the recompute job cleared and refilled the table, right before it commits.
pub const RECOMPUTE_BEFORE_COMMIT: &str = "recompute.before_commit";

/// Fires when an index transaction is about to commit.
pub const INDEX_TRANSACTION_COMMIT: &str = "index_transaction.commit";

/// Evaluates the failpoint `name`, turning a triggered `return` action into an error.
///
/// The action parameter selects the error kind: `read_only` raises
/// [`ErrorKind::ReadOnlyStorage`], anything else raises an injected failure.
pub fn cpl_fail_point(name: &str) -> CplResult<()> {
    fail_point!(name, |parameter| {
        let error_kind = match parameter.as_deref() {
            Some("read_only") => ErrorKind::ReadOnlyStorage,
            _ => ErrorKind::InjectedFailure,
        };

        bail!(
            error_kind,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
