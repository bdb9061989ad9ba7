//! Deadline supervision for execution attempts.
//!
//! Runs a thunk on a worker thread and blocks on a channel with a
//! wall-clock deadline. A timed-out worker is abandoned, not killed: the
//! supervisor stops waiting, the worker keeps its thread until the
//! interpreter's step budget aborts it cooperatively. Callers sizing
//! concurrency limits must count abandoned workers as leaked until then.
//! A worker panic disconnects the channel and is reported as a worker
//! failure; it never crosses into the host.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Why the supervisor returned no result.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorError {
    /// The deadline elapsed first; the worker was abandoned.
    Timeout(Duration),
    /// The worker terminated without producing a result.
    Worker(String),
}

/// Run `thunk` under `deadline`. Returns the thunk's result if it finishes
/// first, otherwise a classified supervisor error. Concurrent calls share
/// no state and require no ordering.
pub fn supervise<T, F>(deadline: Duration, thunk: F) -> Result<T, SupervisorError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let start = Instant::now();

    let spawned = thread::Builder::new()
        .name("quizforge-attempt".to_string())
        .spawn(move || {
            // The receiver may be gone after a timeout; nothing to do then.
            let _ = tx.send(thunk());
        });
    if let Err(e) = spawned {
        return Err(SupervisorError::Worker(format!("cannot spawn worker: {}", e)));
    }

    match rx.recv_timeout(deadline) {
        Ok(result) => Ok(result),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(SupervisorError::Timeout(start.elapsed())),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(SupervisorError::Worker(
            "worker terminated without a result".to_string(),
        )),
    }
}
