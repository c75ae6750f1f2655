//! Pattern scanner
//!
//! Walks the keyspace with SCAN until the cursor comes back to 0. KEYS is
//! never used so a large keyspace does not block the server. Other clients
//! may mutate the keyspace meanwhile, so the result is a best-effort
//! snapshot: keys can be reported twice by the server (deduplicated here)
//! and keys added during the scan may be missing.

use std::collections::BTreeSet;
use std::ops::ControlFlow;

use thiserror::Error;
use tracing::debug;

use crate::client::{ControlPlane, Session};
use crate::utils::OperationError;

/// Running totals reported after each SCAN page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanProgress {
    pub pages: usize,
    /// Keys returned by the server, duplicates included
    pub keys_seen: usize,
    pub unique_keys: usize,
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Failed(#[from] OperationError),

    #[error("scan cancelled after {} keys", .partial.len())]
    Cancelled { partial: Vec<String> },
}

/// Collect every key matching `pattern`, deduplicated and sorted
pub fn scan_keys<C: ControlPlane>(
    session: &mut Session<C>,
    pattern: &str,
) -> Result<Vec<String>, ScanError> {
    scan_keys_with(session, pattern, |_| ControlFlow::Continue(()))
}

/// Like [`scan_keys`], calling `observer` after every page
///
/// Returning `ControlFlow::Break` from the observer stops the scan before
/// the next round trip.
pub fn scan_keys_with<C, F>(
    session: &mut Session<C>,
    pattern: &str,
    mut observer: F,
) -> Result<Vec<String>, ScanError>
where
    C: ControlPlane,
    F: FnMut(&ScanProgress) -> ControlFlow<()>,
{
    let mut keys = BTreeSet::new();
    let mut progress = ScanProgress::default();

    for page in session.scan(pattern) {
        let page = page?;
        progress.pages += 1;
        progress.keys_seen += page.len();
        keys.extend(page);
        progress.unique_keys = keys.len();

        if observer(&progress).is_break() {
            debug!("Scan for '{}' cancelled after {} pages", pattern, progress.pages);
            return Err(ScanError::Cancelled {
                partial: keys.into_iter().collect(),
            });
        }
    }

    debug!(
        "Scan for '{}' finished: {} pages, {} keys ({} duplicates)",
        pattern,
        progress.pages,
        progress.unique_keys,
        progress.keys_seen - progress.unique_keys
    );

    Ok(keys.into_iter().collect())
}
