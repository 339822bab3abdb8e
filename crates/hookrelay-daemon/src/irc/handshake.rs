//! Registration and channel join.

use tracing::{debug, info};

use hookrelay_core::config::IrcConfig;

use super::error::ConnError;
use super::framing::{LineReader, LineWriter};
use super::message::{self, Message};

/// How many times `_` is appended to a nickname the server reports in use.
pub const MAX_NICK_RETRIES: usize = 3;

/// Numerics that mean the channel cannot be joined.
const JOIN_FAILURES: [&str; 6] = ["403", "405", "471", "473", "474", "475"];

/// Register with the server and join the configured channel.
///
/// Returns the nickname the server accepted. The caller bounds the whole
/// exchange with the handshake timeout.
pub async fn register_and_join(
    reader: &mut LineReader,
    writer: &mut LineWriter,
    config: &IrcConfig,
) -> Result<String, ConnError> {
    let nick = register(reader, writer, config).await?;
    join_channel(reader, writer, config, &nick).await?;
    Ok(nick)
}

async fn register(
    reader: &mut LineReader,
    writer: &mut LineWriter,
    config: &IrcConfig,
) -> Result<String, ConnError> {
    if let Some(password) = config.password.as_deref().filter(|p| !p.is_empty()) {
        writer.send(&format!("PASS {password}")).await?;
    }

    let mut nick = config.nickname.clone();
    let mut nick_retries = 0;
    writer.send(&format!("NICK {nick}")).await?;
    writer
        .send(&format!(
            "USER {} 0 * :{}",
            config.username(),
            config.realname
        ))
        .await?;

    loop {
        let msg = next_message(reader, "registration").await?;
        match msg.command.as_str() {
            "PING" => writer.send(&message::pong(msg.trailing().unwrap_or_default())).await?,
            "001" => {
                // The welcome numeric is addressed to the nick actually granted.
                if let Some(granted) = msg.params.first() {
                    nick.clone_from(granted);
                }
                info!(nick = %nick, "Registered with IRC server");
                return Ok(nick);
            }
            "433" => {
                if nick_retries >= MAX_NICK_RETRIES {
                    return Err(ConnError::NicknameInUse(nick));
                }
                nick_retries += 1;
                nick.push('_');
                debug!(nick = %nick, retry = nick_retries, "Nickname in use, trying alternate");
                writer.send(&format!("NICK {nick}")).await?;
            }
            "464" => {
                return Err(ConnError::ServerError(format!(
                    "password rejected: {}",
                    msg.trailing().unwrap_or_default()
                )));
            }
            "ERROR" => return Err(server_error(&msg)),
            _ => {}
        }
    }
}

async fn join_channel(
    reader: &mut LineReader,
    writer: &mut LineWriter,
    config: &IrcConfig,
    nick: &str,
) -> Result<(), ConnError> {
    let channel = config.channel.as_str();
    writer
        .send(&message::join(channel, config.channel_key.as_deref()))
        .await?;

    loop {
        let msg = next_message(reader, "channel join").await?;
        match msg.command.as_str() {
            "PING" => writer.send(&message::pong(msg.trailing().unwrap_or_default())).await?,
            "JOIN" if is_own_join(&msg, nick, channel) => {
                info!(channel = %channel, "Joined channel");
                return Ok(());
            }
            code if JOIN_FAILURES.contains(&code) => {
                return Err(ConnError::JoinRejected {
                    channel: channel.to_string(),
                    reason: format!("{code} {}", msg.trailing().unwrap_or_default()),
                });
            }
            "ERROR" => return Err(server_error(&msg)),
            _ => {}
        }
    }
}

async fn next_message(reader: &mut LineReader, phase: &str) -> Result<Message, ConnError> {
    loop {
        let line = reader
            .read_line()
            .await?
            .ok_or_else(|| ConnError::Closed(format!("server closed the connection during {phase}")))?;
        if let Some(msg) = Message::parse(&line) {
            return Ok(msg);
        }
        debug!(line = %line, "Ignoring unparseable line");
    }
}

fn is_own_join(msg: &Message, nick: &str, channel: &str) -> bool {
    msg.source_nick().is_some_and(|n| n.eq_ignore_ascii_case(nick))
        && msg
            .params
            .first()
            .is_some_and(|c| c.eq_ignore_ascii_case(channel))
}

pub fn server_error(msg: &Message) -> ConnError {
    ConnError::ServerError(msg.trailing().unwrap_or("ERROR").to_string())
}
