// src/exec/signal.rs

//! Termination signals and their delivery to process groups.

use std::fmt;
use std::io;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Term,
    Kill,
}

impl Signal {
    pub fn as_raw(self) -> libc::c_int {
        match self {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        }
    }

    pub fn from_raw(raw: libc::c_int) -> Option<Self> {
        match raw {
            libc::SIGTERM => Some(Signal::Term),
            libc::SIGKILL => Some(Signal::Kill),
            _ => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Term => f.write_str("SIGTERM"),
            Signal::Kill => f.write_str("SIGKILL"),
        }
    }
}

/// Send `signal` to the process group led by `pid`.
///
/// Children spawned by the command share the group (it was started with
/// `process_group(0)`), so they are signalled too. If the group is already
/// gone, the leader pid is signalled directly.
pub fn deliver(pid: u32, signal: Signal) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

    match kill(-pid, signal) {
        Err(err) if err.raw_os_error() == Some(libc::ESRCH) => {
            debug!(pid, %signal, "process group gone; signalling pid directly");
            kill(pid, signal)
        }
        other => other,
    }
}

fn kill(target: libc::pid_t, signal: Signal) -> io::Result<()> {
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(target, signal.as_raw()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
