//! Supervised external agent process
//!
//! The agent runs in its own process group so it can be interrupted
//! without touching the daemon. Stopping interrupts the group, waits out a
//! grace period, then kills whatever is left.

#[cfg_attr(unix, path = "unix.rs")]
#[cfg_attr(windows, path = "windows.rs")]
mod platform;

use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

/// Supervisor shared between the engine and shutdown handling
pub type SharedSupervisor = Arc<Mutex<Supervisor>>;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("agent command is empty")]
    EmptyCommand,

    #[error("failed to launch agent: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A running agent process
#[derive(Debug)]
pub struct SupervisedProcess {
    child: Child,
}

impl SupervisedProcess {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Interrupt the process group, wait up to `grace`, then kill it
    fn terminate(&mut self, grace: Duration) {
        const POLL: Duration = Duration::from_millis(50);

        if !self.is_running() {
            return;
        }

        let pid = self.pid();
        if let Err(e) = platform::interrupt(&self.child) {
            warn!(?e, pid, "failed to interrupt agent");
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if !self.is_running() {
                info!(pid, "agent exited after interrupt");
                return;
            }
            thread::sleep(POLL);
        }

        warn!(pid, grace_ms = grace.as_millis() as u64, "agent ignored interrupt, killing");
        if let Err(e) = platform::kill(&mut self.child) {
            warn!(?e, pid, "failed to kill agent");
        }
        if let Err(e) = self.child.wait() {
            warn!(?e, pid, "failed to reap agent");
        }
    }
}

/// Launches and stops the external agent
pub struct Supervisor {
    command: Vec<String>,
    grace: Duration,
    process: Option<SupervisedProcess>,
}

impl Supervisor {
    pub fn new(command: Vec<String>, grace: Duration) -> Self {
        Self {
            command,
            grace,
            process: None,
        }
    }

    pub fn shared(self) -> SharedSupervisor {
        Arc::new(Mutex::new(self))
    }

    /// Start the agent, or return the pid of the one already running
    pub fn launch(&mut self) -> Result<u32, SupervisorError> {
        if let Some(process) = self.process.as_mut() {
            if process.is_running() {
                debug!(pid = process.pid(), "agent already running");
                return Ok(process.pid());
            }
        }

        let (program, args) = self
            .command
            .split_first()
            .ok_or(SupervisorError::EmptyCommand)?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        platform::detach(&mut command);

        let child = command.spawn()?;
        let pid = child.id();
        info!(pid, program = %program, "agent launched");
        self.process = Some(SupervisedProcess { child });
        Ok(pid)
    }

    pub fn is_running(&mut self) -> bool {
        self.process.as_mut().is_some_and(SupervisedProcess::is_running)
    }

    /// Stop the agent. No-op when it was never started or already exited.
    ///
    /// Returns true if a running process was stopped.
    pub fn request_stop(&mut self) -> bool {
        let Some(mut process) = self.process.take() else {
            return false;
        };
        if !process.is_running() {
            return false;
        }
        process.terminate(self.grace);
        true
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.request_stop();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_stop_before_launch_is_noop() {
        let mut supervisor = Supervisor::new(sh("sleep 30"), Duration::from_millis(200));
        assert!(!supervisor.request_stop());
        assert!(!supervisor.is_running());
    }

    #[test]
    fn test_empty_command() {
        let mut supervisor = Supervisor::new(Vec::new(), Duration::from_millis(200));
        assert!(matches!(
            supervisor.launch(),
            Err(SupervisorError::EmptyCommand)
        ));
    }

    #[test]
    fn test_launch_is_idempotent() {
        let mut supervisor = Supervisor::new(sh("sleep 30"), Duration::from_millis(500));
        let first = supervisor.launch().unwrap();
        let second = supervisor.launch().unwrap();
        assert_eq!(first, second);
        assert!(supervisor.request_stop());
    }

    #[test]
    fn test_interrupt_stops_cooperative_process() {
        let mut supervisor = Supervisor::new(sh("sleep 30"), Duration::from_secs(2));
        supervisor.launch().unwrap();
        assert!(supervisor.is_running());

        let started = Instant::now();
        assert!(supervisor.request_stop());
        assert!(!supervisor.is_running());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_process_ignoring_interrupt_is_killed() {
        let mut supervisor =
            Supervisor::new(sh("trap '' INT; sleep 30"), Duration::from_millis(300));
        supervisor.launch().unwrap();
        // Give the shell time to install its trap
        thread::sleep(Duration::from_millis(100));

        assert!(supervisor.request_stop());
        assert!(!supervisor.is_running());
    }

    #[test]
    fn test_stop_after_exit_is_noop() {
        let mut supervisor = Supervisor::new(sh("exit 0"), Duration::from_millis(200));
        supervisor.launch().unwrap();
        thread::sleep(Duration::from_millis(200));

        assert!(!supervisor.request_stop());
        assert!(!supervisor.request_stop());
    }

    #[test]
    fn test_relaunch_after_exit() {
        let mut supervisor = Supervisor::new(sh("exit 0"), Duration::from_millis(200));
        let first = supervisor.launch().unwrap();
        thread::sleep(Duration::from_millis(200));
        let second = supervisor.launch().unwrap();
        assert_ne!(first, second);
    }
}
