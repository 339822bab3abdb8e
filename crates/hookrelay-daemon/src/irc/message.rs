//! IRC line parsing and formatting (RFC 1459 framing, tags ignored).

use super::error::SendError;

/// Maximum length of a protocol line, including the trailing CRLF.
pub const MAX_LINE_BYTES: usize = 512;

/// A parsed server line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl Message {
    /// Parse one line (with or without the trailing CRLF).
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        // IRCv3 message tags carry nothing we need.
        if rest.starts_with('@') {
            rest = rest.split_once(' ')?.1.trim_start();
        }

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, tail) = stripped.split_once(' ')?;
            rest = tail.trim_start();
            Some(prefix.to_string())
        } else {
            None
        };

        let (command, mut tail) = match rest.split_once(' ') {
            Some((command, tail)) => (command, tail),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        loop {
            tail = tail.trim_start_matches(' ');
            if tail.is_empty() {
                break;
            }
            if let Some(trailing) = tail.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match tail.split_once(' ') {
                Some((param, next)) => {
                    params.push(param.to_string());
                    tail = next;
                }
                None => {
                    params.push(tail.to_string());
                    break;
                }
            }
        }

        Some(Self {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Nickname part of the prefix (`nick!user@host` → `nick`).
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .map(|p| p.split_once('!').map_or(p, |(nick, _)| nick))
    }

    /// Last parameter, usually the human-readable text.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }
}

/// Reject lines that would be split or truncated by the server.
pub fn validate_line(line: &str) -> Result<(), SendError> {
    if line.is_empty() {
        return Err(SendError::InvalidLine("empty line".into()));
    }
    if line.contains(['\r', '\n', '\0']) {
        return Err(SendError::InvalidLine(
            "line contains CR, LF or NUL".into(),
        ));
    }
    if line.len() + 2 > MAX_LINE_BYTES {
        return Err(SendError::InvalidLine(format!(
            "line is {} bytes, limit is {}",
            line.len(),
            MAX_LINE_BYTES - 2
        )));
    }
    Ok(())
}

pub fn privmsg(target: &str, text: &str) -> String {
    format!("PRIVMSG {target} :{text}")
}

pub fn join(channel: &str, key: Option<&str>) -> String {
    match key {
        Some(key) => format!("JOIN {channel} {key}"),
        None => format!("JOIN {channel}"),
    }
}

pub fn pong(token: &str) -> String {
    format!("PONG :{token}")
}
