//! Start/stop/liveness of the receiver as an external process.
//!
//! The PID file is the only record of a running receiver. Nothing is cached
//! in memory, so a restarted control panel still finds and controls a
//! receiver started by its predecessor. Only one control panel per PID file
//! is supported. Within one control panel, start, stop and liveness checks
//! run one at a time.

mod pid_file;

pub use pid_file::PidFile;

use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard, PoisonError};

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::{getpgid, getpgrp, Pid};
use tracing::{info, warn};

use crate::config::SupervisorCfg;

/// Program and arguments used to launch the receiver.
#[derive(Debug, Clone)]
pub struct ReceiverCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ReceiverCommand {
    /// The configured program, or this binary's own `receive` subcommand.
    pub fn resolve(cfg: &SupervisorCfg, config_path: Option<&str>) -> io::Result<Self> {
        if let Some(program) = &cfg.program {
            return Ok(Self {
                program: program.clone(),
                args: cfg.args.clone(),
            });
        }
        let mut args = Vec::new();
        if let Some(path) = config_path {
            args.push("--config".to_string());
            args.push(path.to_string());
        }
        args.push("receive".to_string());
        args.extend(cfg.args.iter().cloned());
        Ok(Self {
            program: std::env::current_exe()?,
            args,
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    #[error("Already running")]
    AlreadyRunning,
    #[error("Not running")]
    NotRunning,
    #[error("Error: failed to start receiver: {0}")]
    Spawn(#[source] io::Error),
    #[error("Error: pid file {}: {source}", .path.display())]
    PidFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Error: {0}")]
    Terminate(#[source] Errno),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Running(Pid),
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Started {
    pub pid: u32,
    pub port: u16,
}

impl fmt::Display for Started {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Started (PID: {}) on port {}", self.pid, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stopped {
    Graceful,
    Forced,
}

impl fmt::Display for Stopped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stopped::Graceful => f.write_str("Stopped"),
            Stopped::Forced => f.write_str("Force stopped"),
        }
    }
}

/// Signals `stop` sends: first the graceful one, then the forced fallback.
#[derive(Debug, Clone, Copy)]
pub struct Signaller {
    pub terminate: fn(Pid) -> nix::Result<()>,
    pub force: fn(Pid) -> nix::Result<()>,
}

impl Default for Signaller {
    fn default() -> Self {
        Self {
            terminate: terminate_group,
            force: |pid| kill(pid, Signal::SIGKILL),
        }
    }
}

pub struct Supervisor {
    pid_file: PidFile,
    command: ReceiverCommand,
    startup_log: PathBuf,
    receiver_port: u16,
    signaller: Signaller,
    // Held across check, act and record so the PID file always names the
    // child this panel last reported.
    control: Mutex<()>,
}

impl Supervisor {
    pub fn new(
        pid_file: PidFile,
        command: ReceiverCommand,
        startup_log: PathBuf,
        receiver_port: u16,
    ) -> Self {
        Self {
            pid_file,
            command,
            startup_log,
            receiver_port,
            signaller: Signaller::default(),
            control: Mutex::new(()),
        }
    }

    #[cfg(test)]
    pub fn with_signaller(mut self, signaller: Signaller) -> Self {
        self.signaller = signaller;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-derives liveness from the PID file. A file naming a dead (or
    /// unparsable) process is removed on the way.
    pub fn liveness(&self) -> Liveness {
        let _guard = self.lock();
        self.probe()
    }

    fn probe(&self) -> Liveness {
        let contents = match self.pid_file.read() {
            Ok(Some(contents)) => contents,
            Ok(None) => return Liveness::Stopped,
            Err(e) => {
                warn!(path = %self.pid_file.path().display(), error = %e, "pid file unreadable");
                return Liveness::Stopped;
            }
        };

        // 0 and negative ids address process groups, never a single receiver.
        let pid = match contents.trim().parse::<i32>() {
            Ok(raw) if raw > 0 => Pid::from_raw(raw),
            _ => {
                self.clear_stale(contents.trim());
                return Liveness::Stopped;
            }
        };

        match kill(pid, None) {
            Ok(()) | Err(Errno::EPERM) => Liveness::Running(pid),
            Err(_) => {
                self.clear_stale(contents.trim());
                Liveness::Stopped
            }
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.liveness(), Liveness::Running(_))
    }

    fn clear_stale(&self, recorded: &str) {
        info!(recorded, "removing stale pid file");
        if let Err(e) = self.pid_file.remove() {
            warn!(path = %self.pid_file.path().display(), error = %e, "stale pid file not removed");
        }
    }

    /// Spawns the receiver in its own process group with output appended to
    /// the startup log. Must be called from within a Tokio runtime: the child
    /// is reaped by a background task.
    pub fn start(&self) -> Result<Started, SupervisorError> {
        let _guard = self.lock();
        if let Liveness::Running(_) = self.probe() {
            return Err(SupervisorError::AlreadyRunning);
        }

        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.startup_log)
            .map_err(SupervisorError::Spawn)?;
        let stderr = stdout.try_clone().map_err(SupervisorError::Spawn)?;

        let mut cmd = std::process::Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .process_group(0);
        let mut child = tokio::process::Command::from(cmd)
            .spawn()
            .map_err(SupervisorError::Spawn)?;

        let pid = child.id().ok_or_else(|| {
            SupervisorError::Spawn(io::Error::other("receiver exited before it was recorded"))
        })?;

        if let Err(source) = self.pid_file.write(pid) {
            if let Err(e) = child.start_kill() {
                warn!(pid, error = %e, "unrecorded receiver not killed");
            }
            return Err(SupervisorError::PidFile {
                path: self.pid_file.path().to_path_buf(),
                source,
            });
        }

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => info!(pid, %status, "receiver exited"),
                Err(e) => warn!(pid, error = %e, "receiver wait failed"),
            }
        });

        info!(pid, program = %self.command.program.display(), "receiver started");
        Ok(Started {
            pid,
            port: self.receiver_port,
        })
    }

    /// SIGTERM to the receiver's process group, falling back to SIGKILL on
    /// the single pid when the group cannot be signalled.
    pub fn stop(&self) -> Result<Stopped, SupervisorError> {
        let _guard = self.lock();
        let Liveness::Running(pid) = self.probe() else {
            return Err(SupervisorError::NotRunning);
        };

        match (self.signaller.terminate)(pid) {
            Ok(()) => {
                self.remove_pid_file()?;
                info!(pid = pid.as_raw(), "receiver stopped");
                Ok(Stopped::Graceful)
            }
            Err(errno) => {
                warn!(pid = pid.as_raw(), %errno, "SIGTERM failed, sending SIGKILL");
                (self.signaller.force)(pid).map_err(SupervisorError::Terminate)?;
                self.remove_pid_file()?;
                info!(pid = pid.as_raw(), "receiver force stopped");
                Ok(Stopped::Forced)
            }
        }
    }

    fn remove_pid_file(&self) -> Result<(), SupervisorError> {
        self.pid_file
            .remove()
            .map_err(|source| SupervisorError::PidFile {
                path: self.pid_file.path().to_path_buf(),
                source,
            })
    }
}

fn terminate_group(pid: Pid) -> nix::Result<()> {
    let pgid = getpgid(Some(pid))?;
    // Never signal the group this control panel belongs to.
    if pgid == getpgrp() {
        return kill(pid, Signal::SIGTERM);
    }
    killpg(pgid, Signal::SIGTERM)
}
