//! Process-group handling on Windows

use std::io;
use std::os::windows::process::CommandExt;
use std::process::{Child, Command, Stdio};

const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

pub fn detach(command: &mut Command) {
    command.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

/// Ask the process tree to close
pub fn interrupt(child: &Child) -> io::Result<()> {
    taskkill(child.id(), false)
}

/// Terminate the whole process tree
pub fn kill(child: &mut Child) -> io::Result<()> {
    match taskkill(child.id(), true) {
        Ok(()) => Ok(()),
        // The tree is unreachable, at least take the direct child down
        Err(_) => child.kill(),
    }
}

fn taskkill(pid: u32, force: bool) -> io::Result<()> {
    let status = Command::new("taskkill")
        .args(taskkill_args(pid, force))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("taskkill exited with {status}"),
        ))
    }
}

fn taskkill_args(pid: u32, force: bool) -> Vec<String> {
    let mut args = vec!["/PID".to_string(), pid.to_string(), "/T".to_string()];
    if force {
        args.push("/F".to_string());
    }
    args
}
