use nix::errno::Errno;

use crate::tracer::Pid;


#[cfg(target_os = "android")]
pub(crate) const PTRACE_GETREGSET: i32 = 0x4204;

#[cfg(not(target_os = "android"))]
pub(crate) const PTRACE_GETREGSET: u32 = 0x4204;

/// Linux constant defined in `include/uapi/linux/elf.h`.
const NT_PRSTATUS: i32 = 0x1;

/// Defined in [`arch/arm64/include/uapi/asm/ptrace.h`](https://android.googlesource.com/kernel/common/+/refs/heads/android-mainline/arch/arm64/include/uapi/asm/ptrace.h#88).
#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct user_pt_regs {
    pub regs: [u64; 31],
    pub sp: u64,
    pub pc: u64,
    pub pstate: u64
}

/// Register state of a tracee.
pub type Registers = user_pt_regs;

/// Read the full register snapshot of a stopped tracee.
pub(crate) fn registers(pid: Pid) -> nix::Result<Registers> {
    let mut data = std::mem::MaybeUninit::<Registers>::uninit();
    let mut rv = libc::iovec {
        iov_base: data.as_mut_ptr() as *mut libc::c_void,
        iov_len: std::mem::size_of::<Registers>(),
    };

    let res = unsafe {
        libc::ptrace(PTRACE_GETREGSET, pid.as_raw(), NT_PRSTATUS, &mut rv as *mut _ as *mut libc::c_void)
    };

    Errno::result(res)?;

    Ok(unsafe { data.assume_init() })
}

pub(crate) fn instruction_pointer(regs: &Registers) -> u64 {
    regs.pc
}
