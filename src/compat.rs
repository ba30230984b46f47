//! Fail-fast interface with the single-integer results of the `asmcovtrace` C library.
//!
//! Any unexpected error prints `asmcovtrace: <error>` to stderr and exits the whole
//! program with status 1. Prefer [`Command`] and [`TracedProcess`](crate::TracedProcess)
//! when the caller must survive tracing errors.

use std::process;

use tracing::error;

use crate::cmd::Command;
use crate::error::Error;
use crate::tracer::{self, Pid, SignalPolicy};


/// Exit status of the calling program after a fatal tracing error.
pub const FATAL_STATUS: i32 = 1;

/// Launch `path` with `argv` as a tracee, returning its PID without waiting.
///
/// The returned PID is not reaped on drop. Step it with [`next()`] until it terminates.
pub fn open<P, A>(path: P, argv: impl IntoIterator<Item = A>) -> Pid
where
    P: Into<Vec<u8>>,
    A: Into<Vec<u8>>,
{
    let spawned = Command::new(path, argv).and_then(|cmd| cmd.spawn());

    match spawned {
        Ok(tracee) => tracee.into_pid(),
        Err(err) => fatal(&err),
    }
}

/// Single-step the tracee `pid`, returning its instruction pointer before the step.
///
/// Once the tracee exits, returns its exit status instead. If it was killed or vanished,
/// returns `0`. The caller must not step `pid` again after any of these. Signals that
/// stop the tracee are suppressed.
pub fn next(pid: Pid) -> u64 {
    match tracer::step_pid(pid, SignalPolicy::Suppress) {
        Ok(step) => step.into_raw(),
        Err(err) => fatal(&err),
    }
}

pub(crate) fn fatal(err: &Error) -> ! {
    error!(%err, "fatal tracing error");
    eprintln!("asmcovtrace: {}", err);
    process::exit(FATAL_STATUS)
}
