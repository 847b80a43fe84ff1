//! Optional child process running the torrent daemon
//!
//! When a command is given on the command line, it is started alongside the
//! poller and the poller exits once it does.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::common::constants;

pub struct DaemonProcess {
    child: Child,
    program: String,
}

/// Start `command[0]` with the remaining elements as arguments
pub fn spawn(command: &[String]) -> Result<DaemonProcess> {
    let Some((program, args)) = command.split_first() else {
        bail!("Daemon command is empty");
    };

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn daemon '{program}'"))?;

    info!(program = %program, pid = ?child.id(), "Spawned torrent daemon");
    Ok(DaemonProcess {
        child,
        program: program.clone(),
    })
}

impl DaemonProcess {
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Resolve once the daemon has exited
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        self.child
            .wait()
            .await
            .with_context(|| format!("Failed to wait for daemon '{}'", self.program))
    }

    /// Ask the daemon to stop, killing it if it ignores the request
    pub async fn terminate(&mut self) -> Result<ExitStatus> {
        let grace = Duration::from_secs(constants::daemon::TERMINATE_GRACE_SECS);
        self.terminate_within(grace).await
    }

    async fn terminate_within(&mut self, grace: Duration) -> Result<ExitStatus> {
        if let Some(status) = self
            .child
            .try_wait()
            .context("Failed to poll daemon status")?
        {
            debug!(program = %self.program, ?status, "Daemon already exited");
            return Ok(status);
        }

        self.request_stop()?;

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => status.context("Failed to wait for daemon to exit"),
            Err(_) => {
                warn!(
                    program = %self.program,
                    grace_secs = grace.as_secs(),
                    "Daemon did not exit in time, killing it"
                );
                self.child
                    .kill()
                    .await
                    .context("Failed to kill daemon")?;
                self.wait().await
            }
        }
    }

    #[cfg(unix)]
    fn request_stop(&mut self) -> Result<()> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = i32::try_from(pid).context("Daemon pid out of range")?;
        debug!(program = %self.program, pid, "Sending SIGTERM to daemon");
        kill(Pid::from_raw(pid), Signal::SIGTERM).context("Failed to send SIGTERM to daemon")
    }

    #[cfg(not(unix))]
    fn request_stop(&mut self) -> Result<()> {
        self.child.start_kill().context("Failed to stop daemon")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(spawn(&[]).is_err());
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let err = spawn(&["/nonexistent/transmission-daemon".to_string()]).err().unwrap();
        assert!(format!("{err}").contains("/nonexistent/transmission-daemon"));
    }

    #[tokio::test]
    async fn test_wait_reports_exit_code() {
        let mut daemon = spawn(&sh("exit 3")).unwrap();
        assert_eq!(daemon.program(), "sh");
        let status = daemon.wait().await.unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_sends_sigterm() {
        use std::os::unix::process::ExitStatusExt;

        let mut daemon = spawn(&["sleep".to_string(), "30".to_string()]).unwrap();
        let status = daemon.terminate().await.unwrap();
        assert_eq!(status.signal(), Some(nix::libc::SIGTERM));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_kills_stubborn_daemon() {
        use std::os::unix::process::ExitStatusExt;

        let mut daemon = spawn(&sh("trap '' TERM; sleep 30")).unwrap();
        // Give the shell a moment to install the trap
        tokio::time::sleep(Duration::from_millis(200)).await;
        let status = daemon
            .terminate_within(Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(status.signal(), Some(nix::libc::SIGKILL));
    }

    #[tokio::test]
    async fn test_terminate_after_exit_returns_status() {
        let mut daemon = spawn(&sh("exit 0")).unwrap();
        let first = daemon.wait().await.unwrap();
        let second = daemon.terminate().await.unwrap();
        assert_eq!(first.code(), Some(0));
        assert_eq!(second.code(), Some(0));
    }
}
