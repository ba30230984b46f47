//! Types for single-stepping traced processes and interpreting their state changes.

use std::marker::PhantomData;

use nix::sys::{
    ptrace,
    signal::{self, Signal},
    wait::{self, WaitPidFlag, WaitStatus},
};
use tracing::{debug, info, trace};

use crate::error::{Error, Result};

#[cfg(target_arch = "aarch64")]
use crate::aarch64 as arch;

#[cfg(target_arch = "x86_64")]
use crate::x86 as arch;

pub use nix::unistd::Pid;

/// Outcome of a single [step](TracedProcess::step()).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    /// The tracee was stopped about to execute the instruction at this address, and has
    /// been resumed for exactly one instruction.
    InstructionPointer(u64),

    /// The tracee terminated normally with this exit status.
    Exited(i32),

    /// The tracee was killed by a signal.
    Signaled { signal: Signal, core_dumped: bool },

    /// The tracee disappeared after it was seen to stop, but before it could be
    /// inspected or resumed.
    Vanished,
}

impl Step {
    /// True if the tracee can never be stepped again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Step::InstructionPointer(_))
    }

    pub fn instruction_pointer(&self) -> Option<u64> {
        match self {
            Step::InstructionPointer(ip) => Some(*ip),
            _ => None,
        }
    }

    /// Fold into the single-integer encoding of the `asmcovtrace` C library.
    ///
    /// The encoding is lossy: `0` is a valid address, a valid exit status, and the value
    /// for both `Signaled` and `Vanished`.
    pub fn into_raw(self) -> u64 {
        match self {
            Step::InstructionPointer(ip) => ip,
            Step::Exited(code) => u64::from(code as u8),
            Step::Signaled { .. } | Step::Vanished => 0,
        }
    }
}

/// What to do with a signal that stopped the tracee, other than the `SIGTRAP` of a
/// completed step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignalPolicy {
    /// Pass the signal back to the tracee on the next single-step. A faulting tracee
    /// then dies the way it would untraced.
    Deliver,

    /// Resume without the signal. A tracee stopped by a fault will retry the faulting
    /// instruction.
    Suppress,
}

impl Default for SignalPolicy {
    fn default() -> Self {
        SignalPolicy::Deliver
    }
}

impl SignalPolicy {
    fn pending(self, pid: Pid, signal: Signal) -> Option<Signal> {
        match self {
            SignalPolicy::Deliver => {
                debug!(pid = pid.as_raw(), ?signal, "delivering signal on single-step");
                Some(signal)
            },
            SignalPolicy::Suppress => {
                debug!(pid = pid.as_raw(), ?signal, "suppressing signal");
                None
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    // Stopped, or running towards its next stop.
    Live,

    // Seen to disappear, but not yet reaped.
    Vanished,

    // Termination status consumed by `wait(2)`.
    Reaped,
}

/// Process launched by [`Command::spawn()`](crate::Command::spawn()) and single-stepped
/// by its creator.
///
/// Dropping a process that has not terminated kills and reaps it.
///
/// Only the thread that launched the tracee is its tracer, so the handle is not `Send`.
#[derive(Debug)]
pub struct TracedProcess {
    pid: Pid,
    state: State,
    signals: SignalPolicy,

    #[doc(hidden)]
    _not_send: PhantomData<*const ()>,
}

impl TracedProcess {
    pub(crate) fn new(pid: Pid) -> Self {
        let state = State::Live;
        let signals = SignalPolicy::default();
        let _not_send = PhantomData;

        Self { pid, state, signals, _not_send }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// True once a step has reported termination or disappearance.
    pub fn is_terminated(&self) -> bool {
        self.state != State::Live
    }

    pub fn signal_policy(&self) -> SignalPolicy {
        self.signals
    }

    pub fn set_signal_policy(&mut self, signals: SignalPolicy) {
        self.signals = signals;
    }

    /// Wait for the tracee to stop, then resume it for exactly one instruction.
    ///
    /// Returns the address the tracee was stopped at, or how it terminated. After a
    /// terminal [`Step`], further calls fail with [`Error::Terminated`].
    pub fn step(&mut self) -> Result<Step> {
        if self.is_terminated() {
            return Err(Error::Terminated { pid: self.pid });
        }

        let step = step_pid(self.pid, self.signals)?;

        match step {
            Step::InstructionPointer(_) => {},
            Step::Vanished => {
                self.state = State::Vanished;
            },
            Step::Exited(_) | Step::Signaled { .. } => {
                info!(pid = self.pid.as_raw(), ?step, "tracee terminated");
                self.state = State::Reaped;
            },
        }

        Ok(step)
    }

    /// Iterate over steps until the tracee terminates.
    ///
    /// The terminal step, or the first error, is the last item yielded.
    pub fn steps(&mut self) -> Steps<'_> {
        Steps { process: self, failed: false }
    }

    /// Release the raw PID, giving up the kill-and-reap on drop.
    pub fn into_pid(self) -> Pid {
        let pid = self.pid;
        std::mem::forget(self);
        pid
    }
}

impl Drop for TracedProcess {
    fn drop(&mut self) {
        if self.state == State::Reaped {
            return;
        }

        debug!(pid = self.pid.as_raw(), state = ?self.state, "killing unterminated tracee");

        let _ = signal::kill(self.pid, Signal::SIGKILL);

        // A stop may already be queued ahead of the kill. Reap until terminated.
        loop {
            match wait::waitpid(self.pid, Some(WaitPidFlag::__WALL)) {
                Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    }
}

/// Iterator returned by [`TracedProcess::steps()`].
pub struct Steps<'a> {
    process: &'a mut TracedProcess,
    failed: bool,
}

impl Iterator for Steps<'_> {
    type Item = Result<Step>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.process.is_terminated() {
            return None;
        }

        let step = self.process.step();
        self.failed = step.is_err();

        Some(step)
    }
}

/// Wait for `pid` to change state and, if it stopped, single-step it.
///
/// Does not track whether `pid` is still a valid tracee.
pub(crate) fn step_pid(pid: Pid, signals: SignalPolicy) -> Result<Step> {
    // Only wait on `pid`, so independent tracees of this process never see each other's
    // state changes.
    let status = wait::waitpid(pid, Some(WaitPidFlag::__WALL))
        .map_err(|source| Error::Wait { pid, source })?;

    let pending = match status {
        WaitStatus::Exited(_pid, exit_code) => {
            return Ok(Step::Exited(exit_code));
        },
        WaitStatus::Signaled(_pid, signal, core_dumped) => {
            return Ok(Step::Signaled { signal, core_dumped });
        },
        // Completed single-step, or the post-`execve()` stop of a fresh tracee.
        WaitStatus::Stopped(_pid, Signal::SIGTRAP) => {
            None
        },
        WaitStatus::Stopped(_pid, signal) => {
            signals.pending(pid, signal)
        },
        // No ptrace options are ever set, so there are no event- or syscall-stops.
        WaitStatus::PtraceEvent(..) | WaitStatus::PtraceSyscall(_) => {
            internal_error!("unexpected ptrace-stop for tracee without options")
        },
        // Assume `!WNOHANG`, `!WCONTINUED`.
        WaitStatus::Continued(_) | WaitStatus::StillAlive => {
            internal_error!("unreachable `wait()` status")
        },
    };

    match single_step(pid, pending) {
        Ok(ip) => {
            Ok(Step::InstructionPointer(ip))
        },
        Err(err) if err.vanished() => {
            debug!(pid = pid.as_raw(), %err, "tracee vanished");
            Ok(Step::Vanished)
        },
        Err(err) => {
            Err(err)
        },
    }
}

// Read the instruction pointer of the stopped tracee, then resume it for one instruction.
fn single_step(pid: Pid, pending: Option<Signal>) -> Result<u64> {
    let regs = arch::registers(pid).map_err(|source| Error::Registers { pid, source })?;
    let ip = arch::instruction_pointer(&regs);

    ptrace::step(pid, pending).map_err(|source| Error::Step { pid, source })?;

    trace!(pid = pid.as_raw(), ip, "single-stepped tracee");

    Ok(ip)
}
