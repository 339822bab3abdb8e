//! The connection task and its handle.
//!
//! A single task owns the transport and the [`ConnectionState`]. Everyone
//! else observes the state through a `watch` channel and submits lines over
//! an `mpsc` channel, each with a oneshot acknowledgement.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use hookrelay_core::config::IrcConfig;

use super::backoff::ReconnectPolicy;
use super::error::{ConnError, SendError};
use super::framing::{self, LineReader, LineWriter};
use super::handshake::{self, register_and_join};
use super::message::{self, Message, validate_line};
use super::transport::{Connector, TcpConnector};

/// Commands waiting for the connection task beyond this block the sender.
const COMMAND_BUFFER: usize = 16;

const QUIT_MESSAGE: &str = "QUIT :hookrelay shutting down";

/// Upper bound on saying goodbye to a server that stopped reading.
const QUIT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long [`ConnectionHandle::close`] waits before aborting the task.
const CLOSE_GRACE: Duration = Duration::from_secs(10);

/// Lifecycle of the IRC connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Backoff,
}

impl ConnectionState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Backoff => "backoff",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct SendRequest {
    line: String,
    ack: oneshot::Sender<Result<(), SendError>>,
}

impl SendRequest {
    fn reply(self, result: Result<(), SendError>) {
        // The requester may have given up; nothing to do then.
        if self.ack.send(result).is_err() {
            debug!("Send acknowledgement dropped by requester");
        }
    }
}

/// Cloneable handle to the connection task.
#[derive(Clone)]
pub struct ConnectionHandle {
    state_rx: watch::Receiver<ConnectionState>,
    cmd_tx: mpsc::Sender<SendRequest>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ConnectionHandle {
    /// Write one protocol line (without CRLF) to the server.
    ///
    /// Returns once the line has been written and flushed.
    pub async fn send(&self, line: &str) -> Result<(), SendError> {
        validate_line(line)?;
        if self.cmd_tx.is_closed() {
            return Err(SendError::Closed);
        }
        if *self.state_rx.borrow() != ConnectionState::Ready {
            return Err(SendError::NotReady);
        }

        let (ack, ack_rx) = oneshot::channel();
        self.cmd_tx
            .send(SendRequest {
                line: line.to_owned(),
                ack,
            })
            .await
            .map_err(|_| SendError::Closed)?;
        ack_rx.await.map_err(|_| SendError::Closed)?
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Wait until the connection is `Ready`. Fails once the task has exited.
    pub async fn wait_ready(&self) -> Result<(), SendError> {
        let mut rx = self.state_rx.clone();
        rx.wait_for(|state| *state == ConnectionState::Ready)
            .await
            .map(|_| ())
            .map_err(|_| SendError::Closed)
    }

    /// Send `QUIT`, close the transport and wait for the task to exit.
    ///
    /// Idempotent; concurrent callers all return after the task is gone.
    /// A task that does not stop within a grace period is aborted.
    pub async fn close(&self) {
        self.shutdown_tx.send_replace(true);
        let mut task = self.task.lock().await;
        let Some(mut handle) = task.take() else {
            return;
        };
        match tokio::time::timeout(CLOSE_GRACE, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Connection task ended abnormally"),
            Err(_) => {
                warn!(
                    grace_secs = CLOSE_GRACE.as_secs(),
                    "Connection task did not stop in time, aborting"
                );
                handle.abort();
                // Only the cancellation error can come back now.
                let _ = handle.await;
            }
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Owns the state sender; publishes `Disconnected` however the task ends,
/// abort included.
struct StatePublisher(watch::Sender<ConnectionState>);

impl Deref for StatePublisher {
    type Target = watch::Sender<ConnectionState>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Drop for StatePublisher {
    fn drop(&mut self) {
        self.0.send_replace(ConnectionState::Disconnected);
    }
}

/// Validate the transport settings and start the connection task.
///
/// Network failures never surface here; the task retries them with backoff.
pub fn connect(
    config: &IrcConfig,
    policy: ReconnectPolicy,
) -> Result<ConnectionHandle, ConnError> {
    if config.channel.trim().is_empty() {
        return Err(ConnError::InvalidConfig("channel is empty".into()));
    }
    if config.nickname.trim().is_empty() {
        return Err(ConnError::InvalidConfig("nickname is empty".into()));
    }
    let connector = TcpConnector::new(config)?;
    Ok(ConnectionManager::new(connector, config.clone(), policy).start())
}

/// Owns one IRC connection, reconnecting it until shut down.
pub struct ConnectionManager<C> {
    connector: C,
    config: IrcConfig,
    policy: ReconnectPolicy,
}

impl<C: Connector> ConnectionManager<C> {
    pub const fn new(connector: C, config: IrcConfig, policy: ReconnectPolicy) -> Self {
        Self {
            connector,
            config,
            policy,
        }
    }

    /// Spawn the connection task.
    pub fn start(self) -> ConnectionHandle {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(self.run(StatePublisher(state_tx), cmd_rx, shutdown_rx));

        ConnectionHandle {
            state_rx,
            cmd_tx,
            shutdown_tx: Arc::new(shutdown_tx),
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    /// Connect, run the session, back off and repeat until shutdown.
    async fn run(
        self,
        state_tx: StatePublisher,
        mut cmd_rx: mpsc::Receiver<SendRequest>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let endpoint = self.connector.describe();
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            state_tx.send_replace(ConnectionState::Connecting);
            info!(endpoint = %endpoint, attempt, "Connecting to IRC server");

            let established = tokio::select! {
                result = self.establish(&state_tx) => result,
                _ = shutdown.changed() => break,
            };

            let result = match established {
                Ok((reader, mut writer, nick)) => {
                    state_tx.send_replace(ConnectionState::Ready);
                    info!(nick = %nick, channel = %self.config.channel, "IRC connection ready");

                    let connected_at = Instant::now();
                    let result = self
                        .session(reader, &mut writer, &nick, &state_tx, &mut cmd_rx, &mut shutdown)
                        .await;

                    // A long-lived session means the server is healthy again.
                    if connected_at.elapsed() >= self.policy.stable_after {
                        attempt = 0;
                    }
                    result
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => break,
                Err(e) => {
                    state_tx.send_replace(ConnectionState::Backoff);
                    reject_pending(&mut cmd_rx, &SendError::NotReady);

                    let delay = self.policy.jittered_delay(attempt);
                    warn!(
                        error = %e,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "IRC connection failed, reconnecting"
                    );
                    attempt = attempt.saturating_add(1);

                    if !backoff(delay, &mut cmd_rx, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        drop(state_tx);
        cmd_rx.close();
        reject_pending(&mut cmd_rx, &SendError::Closed);
        info!(endpoint = %endpoint, "Connection manager stopped");
    }

    /// Transport connect, registration and join, bounded by the handshake timeout.
    async fn establish(
        &self,
        state_tx: &watch::Sender<ConnectionState>,
    ) -> Result<(LineReader, LineWriter, String), ConnError> {
        let timeout = self.config.handshake_timeout();
        tokio::time::timeout(timeout, async {
            let stream = self.connector.connect().await?;
            state_tx.send_replace(ConnectionState::Authenticating);
            let (mut reader, mut writer) = framing::split(stream);
            let nick = register_and_join(&mut reader, &mut writer, &self.config).await?;
            Ok((reader, writer, nick))
        })
        .await
        .map_err(|_| ConnError::HandshakeTimeout(timeout))?
    }

    /// Serve an established session.
    ///
    /// `Ok` means shutdown was requested and `QUIT` sent; every `Err` is a
    /// reason to reconnect.
    async fn session(
        &self,
        mut reader: LineReader,
        writer: &mut LineWriter,
        nick: &str,
        state_tx: &watch::Sender<ConnectionState>,
        cmd_rx: &mut mpsc::Receiver<SendRequest>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), ConnError> {
        let interval = self.config.keepalive_interval();
        let timeout = self.config.keepalive_timeout();
        let write_timeout = self.config.write_timeout();
        let mut last_inbound = Instant::now();
        let mut ping_outstanding = false;

        loop {
            let deadline = last_inbound + if ping_outstanding { timeout } else { interval };

            tokio::select! {
                line = reader.read_line() => {
                    let Some(line) = line? else {
                        return Err(ConnError::Closed("server closed the connection".into()));
                    };
                    last_inbound = Instant::now();
                    ping_outstanding = false;
                    self.handle_inbound(&line, writer, nick).await?;
                }
                request = cmd_rx.recv() => {
                    let Some(request) = request else {
                        // Every handle is gone; nobody can submit lines anymore.
                        quit(writer).await;
                        return Ok(());
                    };
                    if let Err(e) = writer.send_within(&request.line, write_timeout).await {
                        state_tx.send_replace(ConnectionState::Disconnected);
                        request.reply(Err(SendError::Transport(e.to_string())));
                        return Err(ConnError::Io(e));
                    }
                    request.reply(Ok(()));
                }
                () = tokio::time::sleep_until(deadline) => {
                    if ping_outstanding {
                        return Err(ConnError::PingTimeout(timeout));
                    }
                    debug!("Inbound traffic idle, sending keepalive PING");
                    writer
                        .send_within(&format!("PING :{nick}"), write_timeout)
                        .await?;
                    ping_outstanding = true;
                }
                _ = shutdown.changed() => {
                    quit(writer).await;
                    return Ok(());
                }
            }
        }
    }

    async fn handle_inbound(
        &self,
        line: &str,
        writer: &mut LineWriter,
        nick: &str,
    ) -> Result<(), ConnError> {
        let Some(msg) = Message::parse(line) else {
            return Ok(());
        };
        match msg.command.as_str() {
            "PING" => {
                writer
                    .send_within(
                        &message::pong(msg.trailing().unwrap_or_default()),
                        self.config.write_timeout(),
                    )
                    .await?;
            }
            "ERROR" => return Err(handshake::server_error(&msg)),
            "KICK" if is_own_kick(&msg, nick, &self.config.channel) => {
                return Err(ConnError::ServerError(format!(
                    "kicked from {}: {}",
                    self.config.channel,
                    msg.params.get(2).map_or("", String::as_str)
                )));
            }
            _ => {}
        }
        Ok(())
    }
}

fn is_own_kick(msg: &Message, nick: &str, channel: &str) -> bool {
    msg.params.first().is_some_and(|c| c.eq_ignore_ascii_case(channel))
        && msg.params.get(1).is_some_and(|n| n.eq_ignore_ascii_case(nick))
}

async fn quit(writer: &mut LineWriter) {
    if let Err(e) = writer.send_within(QUIT_MESSAGE, QUIT_TIMEOUT).await {
        debug!(error = %e, "Failed to send QUIT");
        return;
    }
    match tokio::time::timeout(QUIT_TIMEOUT, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Failed to close transport"),
        Err(_) => debug!("Transport close timed out"),
    }
}

fn reject_pending(cmd_rx: &mut mpsc::Receiver<SendRequest>, error: &SendError) {
    while let Ok(request) = cmd_rx.try_recv() {
        request.reply(Err(error.clone()));
    }
}

/// Sleep for `delay`, rejecting sends meanwhile. `false` means stop.
async fn backoff(
    delay: Duration,
    cmd_rx: &mut mpsc::Receiver<SendRequest>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let wake_at = Instant::now() + delay;
    loop {
        tokio::select! {
            () = tokio::time::sleep_until(wake_at) => return true,
            _ = shutdown.changed() => return false,
            request = cmd_rx.recv() => match request {
                Some(request) => request.reply(Err(SendError::NotReady)),
                None => return false,
            },
        }
    }
}
