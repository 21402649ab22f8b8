//! Shared utility functions for the tether crate.

use std::fmt::Display;
use std::sync::mpsc;
use std::time::Duration;

/// Run `op`, and run it a second time if the first attempt fails with an
/// error that `retryable` accepts. The second result is returned as-is.
pub fn retry_once<T, E, F, R>(what: &str, mut op: F, retryable: R) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Result<T, E>,
    R: Fn(&E) -> bool,
{
    match op() {
        Ok(value) => Ok(value),
        Err(err) if retryable(&err) => {
            tracing::debug!("{} failed ({}), retrying once", what, err);
            op()
        }
        Err(err) => Err(err),
    }
}

/// Run `f` on a worker thread and wait at most `timeout` for its result.
///
/// On timeout the worker is left to finish in the background, so `f` must
/// not hold anything the caller needs back. A worker that panics yields
/// `RecvTimeoutError::Disconnected`.
pub fn run_with_timeout<T, F>(timeout: Duration, f: F) -> Result<T, mpsc::RecvTimeoutError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        // Receiver may already be gone after a timeout.
        let _ = tx.send(f());
    });
    rx.recv_timeout(timeout)
}

/// Abbreviate a commit hash for display.
pub fn short_hash(hash: &str) -> &str {
    let end = hash
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(hash.len());
    &hash[..end]
}

/// Truncate a single line for display, appending "..." when shortened.
pub fn truncate_line(line: &str, max_chars: usize) -> String {
    let truncated: String = line.chars().take(max_chars).collect();
    if truncated.len() < line.len() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}
