//! Single-instruction tracing of a child process, for assembly coverage tools.
//!
//! Launch a program with [`Command::spawn()`] (or [`open()`]), then call
//! [`TracedProcess::step()`] until it reports termination. Each step yields the address
//! of the instruction the tracee was about to execute.
//!
//! The [`compat`] module and the `asmcovtrace_*` C symbols in [`ffi`] keep the
//! fail-fast, single-integer interface of the `asmcovtrace` C library.

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("asmcovtrace supports only x86_64 and aarch64");

#[macro_use]
pub mod error;

pub mod cmd;
pub mod compat;
pub mod ffi;
pub mod tracer;

#[cfg(target_arch = "aarch64")]
mod aarch64;

#[cfg(target_arch = "x86_64")]
mod x86;

pub use cmd::Command;
pub use error::{Error, Result};
pub use nix::sys::signal::Signal;
pub use tracer::{Pid, SignalPolicy, Step, Steps, TracedProcess};

/// Launch `path` with argument vector `argv` as a tracee of the calling thread.
///
/// Shorthand for [`Command::new()`] followed by [`Command::spawn()`].
pub fn open<P, A>(path: P, argv: impl IntoIterator<Item = A>) -> Result<TracedProcess>
where
    P: Into<Vec<u8>>,
    A: Into<Vec<u8>>,
{
    Command::new(path, argv)?.spawn()
}
