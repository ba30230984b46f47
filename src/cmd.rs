use std::ffi::{CStr, CString};

use nix::{
    errno::Errno,
    sys::ptrace,
    unistd::{self, fork, ForkResult},
};
use tracing::info;

use crate::error::{Error, Result};
use crate::tracer::TracedProcess;


/// Prefix of the diagnostics written by a child that fails to become a tracee.
const CHILD_ERROR_PREFIX: &[u8] = b"asmcovtrace: ";

/// Exit status of a child that fails to become a tracee.
pub const CHILD_ERROR_STATUS: i32 = 1;

/// Program to launch as a single-stepped tracee.
///
/// The child is always started with an empty environment.
#[derive(Clone, Debug)]
pub struct Command {
    /// Path of the executable image passed to `execve()`.
    path: CString,

    /// Argument vector passed to `execve()`, `argv[0]` included.
    argv: Vec<CString>,
}

impl Command {
    pub fn new<P, A>(path: P, argv: impl IntoIterator<Item = A>) -> Result<Self>
    where
        P: Into<Vec<u8>>,
        A: Into<Vec<u8>>,
    {
        // Own NUL-terminated strings for the foreign exec call. This allocates, so it
        // must happen long before forking.
        let path = CString::new(path)?;
        let argv = argv
            .into_iter()
            .map(CString::new)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self { path, argv })
    }

    pub fn path(&self) -> &CStr {
        &self.path
    }

    pub fn argv(&self) -> &[CString] {
        &self.argv
    }

    /// Fork and exec the program as a tracee of the calling thread.
    ///
    /// The child requests `PTRACE_TRACEME` and then execs. The kernel stops it with a
    /// `SIGTRAP` once `execve()` succeeds, before any instruction of the new image runs,
    /// so the first [`TracedProcess::step()`] observes the program entry. If the child
    /// cannot set itself up, it reports why on stderr and exits with
    /// [`CHILD_ERROR_STATUS`], which the first step observes as an exit.
    ///
    /// The parent does not wait for the child.
    pub fn spawn(&self) -> Result<TracedProcess> {
        // Heap-allocates, must occur pre-fork.
        let argv = self.argv_ptrs();
        let envp: [*const libc::c_char; 1] = [std::ptr::null()];

        // SAFETY: the child branch only makes async-signal-safe calls before it either
        // execs or exits.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                exec_tracee(&self.path, &argv, &envp)
            },
            Ok(ForkResult::Parent { child }) => {
                info!(pid = child.as_raw(), path = ?self.path, "launched tracee");

                Ok(TracedProcess::new(child))
            },
            Err(source) => {
                let path = self.path.to_string_lossy().into_owned();

                Err(Error::Fork { path, source })
            },
        }
    }

    // Construct the NULL-terminated argument vector for `execve()`. The pointers borrow
    // from `self.argv`.
    fn argv_ptrs(&self) -> Vec<*const libc::c_char> {
        let mut argv: Vec<_> = self.argv
            .iter()
            .map(|s| s.as_ptr())
            .collect();
        argv.push(std::ptr::null());
        argv
    }
}

// Child branch of `Command::spawn()`. Never returns into the caller's logic.
//
// Nothing here may allocate: `?`, `format!()`, and the `nix` exec wrappers all can.
fn exec_tracee(
    path: &CStr,
    argv: &[*const libc::c_char],
    envp: &[*const libc::c_char],
) -> ! {
    if let Err(errno) = ptrace::traceme() {
        die(b"ptrace", None, errno);
    }

    // Use `libc::execve`, because the `nix` wrapper heap-allocates the argument array.
    unsafe {
        libc::execve(path.as_ptr(), argv.as_ptr(), envp.as_ptr());
    }

    die(b"exec", Some(path), Errno::last())
}

// Write `asmcovtrace: <op>[: <path>]: <errno description>` to stderr and exit.
fn die(op: &[u8], path: Option<&CStr>, errno: Errno) -> ! {
    let stderr = libc::STDERR_FILENO;

    let _ = unistd::write(stderr, CHILD_ERROR_PREFIX);
    let _ = unistd::write(stderr, op);
    if let Some(path) = path {
        let _ = unistd::write(stderr, b": ");
        let _ = unistd::write(stderr, path.to_bytes());
    }
    let _ = unistd::write(stderr, b": ");
    let _ = unistd::write(stderr, errno.desc().as_bytes());
    let _ = unistd::write(stderr, b"\n");

    // Skip `atexit` handlers and stdio flushes inherited from the parent.
    unsafe { libc::_exit(CHILD_ERROR_STATUS) }
}
