//! Periodic refresh of the launcher icon from the daemon's torrent list

use std::future::Future;
use std::process::ExitStatus;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::common::constants;
use crate::config::Config;
use crate::daemon::{self, DaemonProcess};
use crate::launcher::{Launcher, QuicklistAction};
use crate::progress::{self, DownloadSummary};
use crate::rpc::{RpcError, RpcSettings, Torrent, TorrentProgress, TransmissionClient};

/// The daemon calls the poller depends on
pub trait TorrentSource {
    async fn torrent_list(&self) -> Result<Vec<Torrent>, RpcError>;
    async fn torrent_progress(&self, ids: &[i64]) -> Result<Vec<TorrentProgress>, RpcError>;
    async fn alt_speed_enabled(&self) -> Result<bool, RpcError>;
    async fn set_alt_speed_enabled(&self, enabled: bool) -> Result<(), RpcError>;
}

/// Where refreshed progress ends up
pub trait ProgressSink {
    async fn show(&self, summary: &DownloadSummary) -> Result<()>;
    async fn clear(&self) -> Result<()>;
    async fn set_turtle_mode(&self, enabled: Option<bool>) -> Result<()>;
}

impl TorrentSource for TransmissionClient {
    async fn torrent_list(&self) -> Result<Vec<Torrent>, RpcError> {
        TransmissionClient::torrent_list(self).await
    }

    async fn torrent_progress(&self, ids: &[i64]) -> Result<Vec<TorrentProgress>, RpcError> {
        TransmissionClient::torrent_progress(self, ids).await
    }

    async fn alt_speed_enabled(&self) -> Result<bool, RpcError> {
        TransmissionClient::alt_speed_enabled(self).await
    }

    async fn set_alt_speed_enabled(&self, enabled: bool) -> Result<(), RpcError> {
        TransmissionClient::set_alt_speed_enabled(self, enabled).await
    }
}

impl ProgressSink for Launcher {
    async fn show(&self, summary: &DownloadSummary) -> Result<()> {
        Launcher::show(self, summary).await
    }

    async fn clear(&self) -> Result<()> {
        Launcher::clear(self).await
    }

    async fn set_turtle_mode(&self, enabled: Option<bool>) -> Result<()> {
        Launcher::set_turtle_mode(self, enabled).await
    }
}

/// Why the poll loop stopped
#[derive(Debug)]
pub enum Outcome {
    /// The daemon stopped answering during a refresh
    ConnectionLost,
    /// The spawned daemon exited on its own
    DaemonExited(ExitStatus),
    /// SIGINT or SIGTERM
    Shutdown,
    /// Nothing was listening on the RPC port at startup
    Unreachable,
}

/// Process exit code for the way the poller stopped
///
/// A daemon killed by a signal has no exit code of its own and maps to 1.
pub fn exit_code(outcome: &Outcome) -> u8 {
    match outcome {
        Outcome::Shutdown => 0,
        Outcome::ConnectionLost | Outcome::Unreachable => 1,
        Outcome::DaemonExited(status) => status
            .code()
            .and_then(|code| u8::try_from(code).ok())
            .unwrap_or(1),
    }
}

/// What to do after a failed refresh or toggle
enum Flow {
    Continue,
    Stop,
    Fail(anyhow::Error),
}

/// Map an error from a refresh step onto the loop's exit semantics
///
/// Launcher (D-Bus) failures are fatal; RPC failures other than a lost connection
/// are only logged.
fn classify(err: anyhow::Error) -> Flow {
    match err.downcast_ref::<RpcError>() {
        Some(rpc_err) if rpc_err.is_connection_lost() => {
            error!(error = %rpc_err, "Lost connection to Transmission");
            Flow::Stop
        }
        Some(_) => {
            warn!(error = %format!("{err:#}"), "Transmission update failed");
            Flow::Continue
        }
        None => Flow::Fail(err),
    }
}

pub struct Poller<R, S> {
    rpc: R,
    sink: S,
    interval: Duration,
    turtle: bool,
}

impl<R: TorrentSource, S: ProgressSink> Poller<R, S> {
    pub fn new(rpc: R, sink: S, interval: Duration, turtle: bool) -> Self {
        Self {
            rpc,
            sink,
            interval,
            turtle,
        }
    }

    /// One update: list torrents, aggregate the downloading ones and push the result
    pub async fn refresh(&self) -> Result<DownloadSummary> {
        debug!("Fetching torrent list");
        let torrents = self
            .rpc
            .torrent_list()
            .await
            .context("Failed to list torrents")?;

        for torrent in &torrents {
            trace!(id = torrent.id, name = %torrent.name, status = ?torrent.status, "Torrent");
        }
        let ids = progress::downloading_ids(&torrents);
        debug!(
            downloading = ids.len(),
            total = torrents.len(),
            "Filtered downloading torrents"
        );

        let details = self
            .rpc
            .torrent_progress(&ids)
            .await
            .context("Failed to fetch torrent progress")?;
        for torrent in &details {
            debug!(
                id = torrent.id,
                name = %torrent.name,
                size = torrent.size_when_done,
                left = torrent.left_until_done,
                "Downloading torrent"
            );
        }
        let summary = progress::summarize(&details);

        info!(
            count = summary.count,
            progress = summary.progress(),
            "Downloading torrents"
        );
        self.sink.show(&summary).await?;

        if self.turtle {
            let enabled = self
                .rpc
                .alt_speed_enabled()
                .await
                .context("Failed to read alt-speed state")?;
            self.sink.set_turtle_mode(Some(enabled)).await?;
        }

        Ok(summary)
    }

    /// Flip alt-speed on the daemon and reflect the new value in the quicklist
    pub async fn toggle_turtle(&self) -> Result<bool> {
        let current = self
            .rpc
            .alt_speed_enabled()
            .await
            .context("Failed to read alt-speed state")?;
        let enabled = !current;
        self.rpc
            .set_alt_speed_enabled(enabled)
            .await
            .context("Failed to change alt-speed state")?;

        info!(enabled, "Toggled turtle mode");
        self.sink.set_turtle_mode(Some(enabled)).await?;
        Ok(enabled)
    }

    /// Poll until the connection drops, the daemon exits or `shutdown` resolves
    ///
    /// The first refresh happens immediately. The launcher is cleared before returning,
    /// including when a launcher failure ends the loop.
    pub async fn run(
        &self,
        mut actions: Option<UnboundedReceiver<QuicklistAction>>,
        mut daemon: Option<&mut DaemonProcess>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<Outcome> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.refresh().await {
                        match classify(err) {
                            Flow::Continue => {}
                            Flow::Stop => break Ok(Outcome::ConnectionLost),
                            Flow::Fail(err) => break Err(err),
                        }
                    }
                }
                Some(action) = next_action(&mut actions) => {
                    debug!(?action, "Quicklist action");
                    match action {
                        QuicklistAction::ToggleTurtle => {
                            if let Err(err) = self.toggle_turtle().await {
                                match classify(err) {
                                    Flow::Continue => {}
                                    Flow::Stop => break Ok(Outcome::ConnectionLost),
                                    Flow::Fail(err) => break Err(err),
                                }
                            }
                        }
                    }
                }
                status = wait_daemon(daemon.as_deref_mut()) => {
                    break status.map(|status| {
                        info!(?status, "Torrent daemon exited");
                        Outcome::DaemonExited(status)
                    });
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break Ok(Outcome::Shutdown);
                }
            }
        };

        if let Err(err) = self.sink.clear().await {
            warn!(error = %format!("{err:#}"), "Failed to clear launcher entry");
        }
        result
    }
}

async fn next_action(
    actions: &mut Option<UnboundedReceiver<QuicklistAction>>,
) -> Option<QuicklistAction> {
    match actions {
        Some(rx) => match rx.recv().await {
            Some(action) => Some(action),
            None => {
                // Menu is gone; stop polling the closed channel
                *actions = None;
                std::future::pending().await
            }
        },
        None => std::future::pending().await,
    }
}

async fn wait_daemon(daemon: Option<&mut DaemonProcess>) -> Result<ExitStatus> {
    match daemon {
        Some(daemon) => daemon.wait().await,
        None => std::future::pending().await,
    }
}

/// Probe the RPC endpoint until it answers
///
/// A refused connection is retried until `retry_for` elapses, which gives a freshly
/// spawned daemon time to open its RPC port. Any other error is returned at once.
pub async fn wait_for_daemon<R: TorrentSource>(rpc: &R, retry_for: Duration) -> Result<(), RpcError> {
    let deadline = Instant::now() + retry_for;
    let retry_delay = Duration::from_millis(constants::rpc::CONNECT_RETRY_MS);

    loop {
        match rpc.torrent_list().await {
            Ok(torrents) => {
                debug!(torrents = torrents.len(), "Transmission is reachable");
                return Ok(());
            }
            Err(err) if err.is_connection_refused() && Instant::now() + retry_delay <= deadline => {
                debug!("Transmission not accepting connections yet, retrying");
                tokio::time::sleep(retry_delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Wait for the RPC endpoint while watching the spawned daemon
///
/// Returns `None` once Transmission answers, or the outcome that ends the run
/// before polling starts: nothing listening, or the daemon exiting first.
async fn await_startup<R: TorrentSource>(
    rpc: &R,
    retry_for: Duration,
    daemon: Option<&mut DaemonProcess>,
) -> Result<Option<Outcome>> {
    let probe = tokio::select! {
        probe = wait_for_daemon(rpc, retry_for) => probe,
        status = wait_daemon(daemon) => {
            let status = status?;
            warn!(?status, "Torrent daemon exited before accepting connections");
            return Ok(Some(Outcome::DaemonExited(status)));
        }
    };

    match probe {
        Ok(()) => Ok(None),
        Err(err) if err.is_connection_refused() => Ok(Some(Outcome::Unreachable)),
        Err(err) => Err(err).context("Failed to query Transmission"),
    }
}

/// Connect, set up the launcher and poll until something ends the run
async fn supervise(config: &Config, mut daemon: Option<&mut DaemonProcess>) -> Result<Outcome> {
    let client = TransmissionClient::new(RpcSettings {
        url: config.rpc_url(),
        user: config.user.clone(),
        password: config.password.clone(),
        timeout: Duration::from_secs(constants::rpc::REQUEST_TIMEOUT_SECS),
    })
    .context("Failed to create Transmission RPC client")?;

    info!(
        url = %client.url(),
        user = ?config.user,
        "Connecting to Transmission"
    );

    let retry_for = if daemon.is_some() {
        config.connect_timeout()
    } else {
        Duration::ZERO
    };
    if let Some(outcome) = await_startup(&client, retry_for, daemon.as_deref_mut()).await? {
        return Ok(outcome);
    }

    let (actions_tx, actions_rx) = if config.turtle {
        let (tx, rx) = mpsc::unbounded_channel();
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    let launcher = Launcher::connect(&config.launcher, actions_tx)
        .await
        .context("Failed to set up launcher entry")?;

    let poller = Poller::new(client, launcher, config.update_interval(), config.turtle);
    poller.run(actions_rx, daemon, shutdown_signal()?).await
}

/// Entry point: wire the RPC client, launcher and optional daemon together
///
/// Returns the process exit code. A spawned daemon that is still running is
/// stopped on every path out, errors included.
pub async fn run_poller(config: Config) -> Result<u8> {
    let mut daemon = if config.spawn.is_empty() {
        None
    } else {
        Some(daemon::spawn(&config.spawn)?)
    };

    let result = supervise(&config, daemon.as_mut()).await;

    if let Some(daemon) = daemon.as_mut()
        && !matches!(result, Ok(Outcome::DaemonExited(_)))
    {
        match daemon.terminate().await {
            Ok(status) => debug!(program = daemon.program(), ?status, "Daemon stopped"),
            Err(err) => warn!(error = %format!("{err:#}"), "Failed to stop daemon"),
        }
    }

    let outcome = result?;
    match &outcome {
        Outcome::Unreachable => {
            eprintln!("Could not connect to Transmission at {}", config.rpc_url());
        }
        Outcome::ConnectionLost => eprintln!("Lost connection to Transmission, exiting"),
        Outcome::DaemonExited(status) => {
            let program = daemon.as_ref().map(|d| d.program()).unwrap_or_default();
            info!(program, ?status, "Daemon exited, stopping");
        }
        Outcome::Shutdown => {}
    }
    Ok(exit_code(&outcome))
}

#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    Ok(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    Ok(async {
        tokio::signal::ctrl_c().await.ok();
    })
}
