use std::ffi::NulError;

use nix::errno::Errno;

use crate::tracer::Pid;


pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("fork: could not create tracee for `{path}`: {source} (errno {})", errno(.source))]
    Fork {
        path: String,
        source: nix::Error,
    },

    #[error("waitpid: could not wait on tracee = {pid}: {source} (errno {})", errno(.source))]
    Wait { pid: Pid, source: nix::Error },

    #[error("ptrace: could not read registers of tracee = {pid}: {source} (errno {})", errno(.source))]
    Registers { pid: Pid, source: nix::Error },

    #[error("ptrace: could not single-step tracee = {pid}: {source} (errno {})", errno(.source))]
    Step { pid: Pid, source: nix::Error },

    #[error("tracee = {pid} has already terminated")]
    Terminated { pid: Pid },

    #[error("{function}: `{argument}` is a null pointer")]
    Null {
        function: &'static str,
        argument: &'static str,
    },

    #[error("argument contains an interior NUL byte")]
    Nul(#[from] NulError),

    #[error("OS error: {0}")]
    OS(#[from] nix::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True if a tracee request failed because the tracee no longer exists.
    pub fn vanished(&self) -> bool {
        match self {
            Error::Registers { source, .. } | Error::Step { source, .. } =>
                *source == Errno::ESRCH,
            _ => false,
        }
    }
}

fn errno(err: &nix::Error) -> i32 {
    *err as i32
}

macro_rules! internal_error {
    ($msg: expr) => {
        return Err($crate::error::Error::Internal($msg.into()))
    };
}
