//! C ABI of the `asmcovtrace` shared library.
//!
//! ```c
//! pid_t asmcovtrace_open(const char *path, char *const argv[]);
//! unsigned long long asmcovtrace_next(pid_t pid);
//! ```

use std::ffi::CStr;

use libc::{c_char, c_ulonglong, pid_t};
use crate::compat;
use crate::error::Error;
use crate::tracer::Pid;


/// Launch `path` as a tracee with the NULL-terminated argument vector `argv`.
///
/// # Safety
///
/// `path` must be a valid NUL-terminated string. `argv` must be NULL or a valid
/// NULL-terminated array of NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn asmcovtrace_open(path: *const c_char, argv: *const *const c_char) -> pid_t {
    if path.is_null() {
        compat::fatal(&Error::Null { function: "asmcovtrace_open", argument: "path" });
    }

    let path = CStr::from_ptr(path).to_bytes().to_vec();

    let mut args = vec![];
    if !argv.is_null() {
        let mut arg = argv;
        while !(*arg).is_null() {
            args.push(CStr::from_ptr(*arg).to_bytes().to_vec());
            arg = arg.add(1);
        }
    }

    compat::open(path, args).as_raw()
}

/// Single-step the tracee `pid`. See [`compat::next()`].
#[no_mangle]
pub extern "C" fn asmcovtrace_next(pid: pid_t) -> c_ulonglong {
    compat::next(Pid::from_raw(pid))
}
