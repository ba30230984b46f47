use nix::sys::ptrace;

use crate::tracer::Pid;


/// Register state of a tracee.
pub type Registers = libc::user_regs_struct;

/// Read the full register snapshot of a stopped tracee.
pub(crate) fn registers(pid: Pid) -> nix::Result<Registers> {
    ptrace::getregs(pid)
}

pub(crate) fn instruction_pointer(regs: &Registers) -> u64 {
    regs.rip
}
