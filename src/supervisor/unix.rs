//! Process-group signalling on Unix

use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command};

/// Put the child in a new process group led by itself
pub fn detach(command: &mut Command) {
    command.process_group(0);
}

/// Send SIGINT to the child's process group
pub fn interrupt(child: &Child) -> io::Result<()> {
    signal_group(child, libc::SIGINT)
}

/// Send SIGKILL to the child's process group
pub fn kill(child: &mut Child) -> io::Result<()> {
    signal_group(child, libc::SIGKILL)
}

fn signal_group(child: &Child, signal: libc::c_int) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(child.id())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: killpg has no memory-safety preconditions
    let rc = unsafe { libc::killpg(pgid, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
