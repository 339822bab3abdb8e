//! Outbound chat messages.

use std::time::SystemTime;

/// A normalized message bound for one channel.
///
/// `text` may span several logical lines separated by `\n`; each logical
/// line becomes at least one protocol line on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    channel: String,
    text: String,
    enqueued_at: SystemTime,
}

impl OutboundMessage {
    pub fn new(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            text: text.into(),
            enqueued_at: SystemTime::now(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub const fn enqueued_at(&self) -> SystemTime {
        self.enqueued_at
    }

    /// Logical lines of the message, in order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split('\n')
    }

    pub fn line_count(&self) -> usize {
        self.lines().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_message() {
        let msg = OutboundMessage::new("#ci", "hello");
        assert_eq!(msg.line_count(), 1);
        assert_eq!(msg.lines().collect::<Vec<_>>(), vec!["hello"]);
    }

    #[test]
    fn lines_preserve_order_and_empty_segments() {
        let msg = OutboundMessage::new("#ci", "a\n\nc");
        assert_eq!(msg.lines().collect::<Vec<_>>(), vec!["a", "", "c"]);
    }

    #[test]
    fn enqueued_at_is_not_in_the_future() {
        let msg = OutboundMessage::new("#ci", "x");
        assert!(msg.enqueued_at() <= SystemTime::now());
    }
}
