//! Operations offered once connected
//!
//! Each operation prompts for its own input, reports its outcome on the
//! console and returns an error only for failures the caller should render
//! (server/transport errors, a mismatched confirmation, end of input).

use std::io::{BufRead, Write};
use std::ops::ControlFlow;

use tracing::{info, warn};

use crate::client::{ControlPlane, Session};
use crate::keyspace::{
    delete_batched_with, scan_keys_with, BatchStop, ScanError, DEFAULT_CHUNK_SIZE,
};
use crate::utils::{ConfirmationMismatch, InterruptFlag, Result};

use super::console::Console;

/// Token typed to confirm a pattern delete
pub const DELETE_TOKEN: &str = "DELETE";

/// Keys shown before asking to confirm a pattern delete
const PREVIEW_KEYS: usize = 10;

/// Exact, case-sensitive comparison of a typed confirmation
pub fn confirm(input: &str, expected: &str) -> std::result::Result<(), ConfirmationMismatch> {
    if input == expected {
        Ok(())
    } else {
        Err(ConfirmationMismatch {
            expected: expected.to_string(),
        })
    }
}

fn ask_key<R: BufRead, W: Write>(console: &mut Console<R, W>, prompt: &str) -> Result<Option<String>> {
    let key = console.ask_trimmed(prompt)?;
    if key.is_empty() {
        writeln!(console.out(), "-> Operation cancelled (no key provided).")?;
        return Ok(None);
    }
    Ok(Some(key))
}

fn print_keys<W: Write>(out: &mut W, keys: &[String]) -> std::io::Result<()> {
    for (i, key) in keys.iter().enumerate() {
        writeln!(out, "   {}) {}", i + 1, key)?;
    }
    Ok(())
}

pub fn list_all_keys<C, R, W>(
    session: &mut Session<C>,
    console: &mut Console<R, W>,
    interrupt: &InterruptFlag,
) -> Result<()>
where
    C: ControlPlane,
    R: BufRead,
    W: Write,
{
    let Some(keys) = scan_with_spinner(session, console, interrupt, "*")? else {
        return Ok(());
    };

    if keys.is_empty() {
        writeln!(console.out(), "-> (empty database)")?;
    } else {
        writeln!(console.out(), "-> Found {} keys:", keys.len())?;
        print_keys(console.out(), &keys)?;
    }
    Ok(())
}

pub fn delete_key<C, R, W>(session: &mut Session<C>, console: &mut Console<R, W>) -> Result<()>
where
    C: ControlPlane,
    R: BufRead,
    W: Write,
{
    let Some(key) = ask_key(console, "Enter the key to delete: ")? else {
        return Ok(());
    };

    let pb = console.spinner(format!("Deleting key '{}'...", key));
    let result = session.delete(&key);
    pb.finish_and_clear();

    if result? > 0 {
        console.success(&format!("Key '{}' was deleted.", key))?;
    } else {
        console.warn(&format!("Key '{}' not found.", key))?;
    }
    Ok(())
}

pub fn flush_database<C, R, W>(session: &mut Session<C>, console: &mut Console<R, W>) -> Result<()>
where
    C: ControlPlane,
    R: BufRead,
    W: Write,
{
    let name = session.display_name().to_string();
    let typed = console.ask(&format!(
        "DANGER! This will delete all keys in {}. Type '{}' to confirm: ",
        name, name
    ))?;
    confirm(&typed, &name)?;

    let pb = console.spinner(format!("Flushing database for {}...", name));
    let result = session.flush_database();
    pb.finish_and_clear();
    result?;

    warn!("Database flushed on {}", name);
    console.success("Database has been flushed.")?;
    Ok(())
}

pub fn get_value<C, R, W>(session: &mut Session<C>, console: &mut Console<R, W>) -> Result<()>
where
    C: ControlPlane,
    R: BufRead,
    W: Write,
{
    let Some(key) = ask_key(console, "Enter key to get value: ")? else {
        return Ok(());
    };

    let pb = console.spinner(format!("Fetching value for '{}'...", key));
    let result = session.get(&key);
    pb.finish_and_clear();

    match result? {
        Some(value) => writeln!(console.out(), "-> Value: \"{}\"", value)?,
        None => writeln!(console.out(), "-> (nil) - Key does not exist.")?,
    }
    Ok(())
}

pub fn set_value<C, R, W>(session: &mut Session<C>, console: &mut Console<R, W>) -> Result<()>
where
    C: ControlPlane,
    R: BufRead,
    W: Write,
{
    let Some(key) = ask_key(console, "Enter the new key: ")? else {
        return Ok(());
    };
    let value = console.ask(&format!("Enter the value for '{}': ", key))?;

    let pb = console.spinner(format!("Setting key '{}'...", key));
    let result = session.set(&key, &value);
    pb.finish_and_clear();
    result?;

    console.success(&format!("OK - Key '{}' set.", key))?;
    Ok(())
}

fn ask_pattern<R: BufRead, W: Write>(console: &mut Console<R, W>) -> Result<Option<String>> {
    let pattern = console.ask_trimmed("Enter the key pattern (e.g. user:*): ")?;
    if pattern.is_empty() {
        writeln!(console.out(), "-> Operation cancelled (no pattern provided).")?;
        return Ok(None);
    }
    Ok(Some(pattern))
}

/// Interruptible scan behind a spinner; `None` when cancelled
fn scan_with_spinner<C, R, W>(
    session: &mut Session<C>,
    console: &mut Console<R, W>,
    interrupt: &InterruptFlag,
    pattern: &str,
) -> Result<Option<Vec<String>>>
where
    C: ControlPlane,
    R: BufRead,
    W: Write,
{
    let pb = console.spinner(format!("Scanning keys matching '{}'...", pattern));
    let result = {
        let guard = interrupt.begin_operation();
        scan_keys_with(session, pattern, |progress| {
            pb.set_message(format!(
                "Scanning keys matching '{}'... {} found",
                pattern, progress.unique_keys
            ));
            if guard.is_cancelled() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
    };
    pb.finish_and_clear();

    match result {
        Ok(keys) => Ok(Some(keys)),
        Err(ScanError::Cancelled { partial }) => {
            console.warn(&format!(
                "Scan cancelled after {} matching keys.",
                partial.len()
            ))?;
            Ok(None)
        }
        Err(ScanError::Failed(e)) => Err(e.into()),
    }
}

pub fn scan_pattern<C, R, W>(
    session: &mut Session<C>,
    console: &mut Console<R, W>,
    interrupt: &InterruptFlag,
) -> Result<()>
where
    C: ControlPlane,
    R: BufRead,
    W: Write,
{
    let Some(pattern) = ask_pattern(console)? else {
        return Ok(());
    };
    let Some(keys) = scan_with_spinner(session, console, interrupt, &pattern)? else {
        return Ok(());
    };

    if keys.is_empty() {
        writeln!(console.out(), "-> No keys match '{}'.", pattern)?;
    } else {
        writeln!(console.out(), "-> Found {} keys matching '{}':", keys.len(), pattern)?;
        print_keys(console.out(), &keys)?;
    }
    Ok(())
}

pub fn delete_pattern<C, R, W>(
    session: &mut Session<C>,
    console: &mut Console<R, W>,
    interrupt: &InterruptFlag,
) -> Result<()>
where
    C: ControlPlane,
    R: BufRead,
    W: Write,
{
    let Some(pattern) = ask_pattern(console)? else {
        return Ok(());
    };
    let Some(keys) = scan_with_spinner(session, console, interrupt, &pattern)? else {
        return Ok(());
    };

    if keys.is_empty() {
        writeln!(console.out(), "-> No keys match '{}'. Nothing to delete.", pattern)?;
        return Ok(());
    }

    writeln!(console.out(), "-> {} keys match '{}':", keys.len(), pattern)?;
    print_keys(console.out(), &keys[..keys.len().min(PREVIEW_KEYS)])?;
    if keys.len() > PREVIEW_KEYS {
        writeln!(console.out(), "   ... and {} more", keys.len() - PREVIEW_KEYS)?;
    }

    let typed = console.ask(&format!(
        "DANGER! This will delete {} keys from {}. Type '{}' to confirm: ",
        keys.len(),
        session.display_name(),
        DELETE_TOKEN
    ))?;
    confirm(&typed, DELETE_TOKEN)?;

    let total = keys.len();
    let pb = console.spinner(format!("Deleting {} keys...", total));
    let result = {
        let guard = interrupt.begin_operation();
        delete_batched_with(session, &keys, DEFAULT_CHUNK_SIZE, |progress| {
            pb.set_message(format!(
                "Deleting keys... {}/{} processed (chunk {}/{})",
                progress.keys_processed, total, progress.chunks_completed, progress.total_chunks
            ));
            if guard.is_cancelled() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
    };
    pb.finish_and_clear();

    match result {
        Ok(deleted) => {
            info!("Deleted {} keys matching '{}' on {}", deleted, pattern, session.display_name());
            console.success(&format!("Deleted {} keys matching '{}'.", deleted, pattern))?;
        }
        Err(e) => match e.stop {
            BatchStop::Cancelled => {
                console.warn(&format!(
                    "Deletion cancelled after {} of {} chunks. {} keys were deleted.",
                    e.chunks_completed, e.total_chunks, e.deleted
                ))?;
            }
            BatchStop::Failed(ref cause) => {
                console.failure(&format!(
                    "Deletion stopped at chunk {} of {}: {}",
                    e.chunks_completed + 1,
                    e.total_chunks,
                    cause
                ))?;
                console.warn(&format!(
                    "{} keys were deleted before the failure; deletion is not atomic.",
                    e.deleted
                ))?;
            }
        },
    }
    Ok(())
}
