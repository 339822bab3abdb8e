//! Splitting messages into protocol lines.

use hookrelay_core::OutboundMessage;

use crate::irc::message::{MAX_LINE_BYTES, privmsg};

/// Render a message as the `PRIVMSG` lines that carry it.
///
/// Blank logical lines are skipped. Text longer than `max_text_bytes` (or
/// than what fits in a 512-byte protocol line) is split on UTF-8 char
/// boundaries. The result is deterministic, so a line index recorded before
/// a failure still points at the same line on retry.
pub fn protocol_lines(message: &OutboundMessage, max_text_bytes: usize) -> Vec<String> {
    let channel = message.channel();
    // "PRIVMSG " + channel + " :" + text + CRLF
    let framing = "PRIVMSG ".len() + channel.len() + " :".len() + 2;
    let limit = max_text_bytes
        .min(MAX_LINE_BYTES.saturating_sub(framing))
        .max(1);

    message
        .lines()
        .filter(|line| !line.trim().is_empty())
        .flat_map(|line| split_utf8(line, limit))
        .map(|chunk| privmsg(channel, chunk))
        .collect()
}

fn split_utf8(text: &str, limit: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.len() > limit {
        let mut cut = limit;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            // A single char wider than the limit still has to go somewhere.
            cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (head, tail) = rest.split_at(cut);
        chunks.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_privmsg_per_logical_line() {
        let msg = OutboundMessage::new("#ci", "alice pushed main\nfix bug\nadd test");
        assert_eq!(
            protocol_lines(&msg, 400),
            vec![
                "PRIVMSG #ci :alice pushed main",
                "PRIVMSG #ci :fix bug",
                "PRIVMSG #ci :add test",
            ]
        );
    }

    #[test]
    fn blank_lines_are_skipped() {
        let msg = OutboundMessage::new("#ci", "a\n\n   \nb\n");
        assert_eq!(protocol_lines(&msg, 400), vec!["PRIVMSG #ci :a", "PRIVMSG #ci :b"]);
    }

    #[test]
    fn long_lines_are_split() {
        let msg = OutboundMessage::new("#ci", "x".repeat(25));
        assert_eq!(
            protocol_lines(&msg, 10),
            vec![
                "PRIVMSG #ci :xxxxxxxxxx",
                "PRIVMSG #ci :xxxxxxxxxx",
                "PRIVMSG #ci :xxxxx",
            ]
        );
    }

    #[test]
    fn splits_never_break_a_char() {
        // 'é' is two bytes; a 5-byte limit must cut after two of them.
        let chunks = split_utf8("ééééé", 5);
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
        assert!(chunks.iter().all(|c| c.len() <= 5));
    }

    #[test]
    fn oversized_char_is_emitted_alone() {
        assert_eq!(split_utf8("€a", 2), vec!["€", "a"]);
    }

    #[test]
    fn limit_respects_protocol_maximum() {
        let msg = OutboundMessage::new("#ci", "y".repeat(1000));
        let lines = protocol_lines(&msg, 10_000);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.len() + 2 <= MAX_LINE_BYTES));
    }
}
