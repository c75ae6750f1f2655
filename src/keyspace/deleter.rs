//! Batched deletion
//!
//! Keys are deleted in consecutive chunks, one DEL per chunk, so a single
//! call never carries an unbounded payload. Deletion is not atomic across
//! chunks: when chunk N fails, chunks 1..N-1 stay deleted and the error
//! reports how many keys were removed before the failure.

use std::ops::ControlFlow;

use thiserror::Error;
use tracing::{debug, warn};

use crate::client::{ControlPlane, Session};
use crate::utils::OperationError;

/// Keys per DEL call
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Running totals reported after each chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkProgress {
    pub chunks_completed: usize,
    pub total_chunks: usize,
    /// Keys sent in completed chunks
    pub keys_processed: usize,
    /// Keys the server reported as removed
    pub deleted: u64,
}

/// Why a batched delete stopped early
#[derive(Error, Debug)]
pub enum BatchStop {
    #[error(transparent)]
    Failed(#[from] OperationError),

    #[error("cancelled by user")]
    Cancelled,
}

#[derive(Error, Debug)]
#[error(
    "stopped after {chunks_completed} of {total_chunks} chunks ({deleted} keys deleted): {stop}"
)]
pub struct BatchDeleteError {
    pub deleted: u64,
    pub chunks_completed: usize,
    pub total_chunks: usize,
    pub stop: BatchStop,
}

/// Delete `keys` in chunks of at most `chunk_size`; returns keys deleted
pub fn delete_batched<C, S>(
    session: &mut Session<C>,
    keys: &[S],
    chunk_size: usize,
) -> Result<u64, BatchDeleteError>
where
    C: ControlPlane,
    S: AsRef<str>,
{
    delete_batched_with(session, keys, chunk_size, |_| ControlFlow::Continue(()))
}

/// Like [`delete_batched`], calling `observer` after every chunk
///
/// Returning `ControlFlow::Break` stops before the next chunk is sent; a
/// chunk already in flight always completes.
pub fn delete_batched_with<C, S, F>(
    session: &mut Session<C>,
    keys: &[S],
    chunk_size: usize,
    mut observer: F,
) -> Result<u64, BatchDeleteError>
where
    C: ControlPlane,
    S: AsRef<str>,
    F: FnMut(&ChunkProgress) -> ControlFlow<()>,
{
    let chunk_size = chunk_size.max(1);
    let mut progress = ChunkProgress {
        total_chunks: keys.len().div_ceil(chunk_size),
        ..Default::default()
    };

    for chunk in keys.chunks(chunk_size) {
        match session.delete_many(chunk) {
            Ok(count) => {
                progress.chunks_completed += 1;
                progress.keys_processed += chunk.len();
                progress.deleted += count;
            }
            Err(e) => {
                warn!(
                    "Chunk {}/{} failed after {} keys deleted: {}",
                    progress.chunks_completed + 1,
                    progress.total_chunks,
                    progress.deleted,
                    e
                );
                return Err(BatchDeleteError {
                    deleted: progress.deleted,
                    chunks_completed: progress.chunks_completed,
                    total_chunks: progress.total_chunks,
                    stop: BatchStop::Failed(e),
                });
            }
        }

        let more = progress.chunks_completed < progress.total_chunks;
        if observer(&progress).is_break() && more {
            debug!(
                "Batched delete cancelled after {}/{} chunks",
                progress.chunks_completed, progress.total_chunks
            );
            return Err(BatchDeleteError {
                deleted: progress.deleted,
                chunks_completed: progress.chunks_completed,
                total_chunks: progress.total_chunks,
                stop: BatchStop::Cancelled,
            });
        }
    }

    debug!(
        "Batched delete finished: {} of {} keys deleted in {} chunks",
        progress.deleted,
        keys.len(),
        progress.chunks_completed
    );
    Ok(progress.deleted)
}
