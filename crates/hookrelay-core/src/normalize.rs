//! Event normalization: turns validated events into chat text.
//!
//! The target protocol is line-oriented, so every interpolated field is
//! flattened to a single line. Only the template itself introduces `\n`.

use crate::event::{EventKind, InboundEvent};
use crate::message::OutboundMessage;

/// Renders [`InboundEvent`]s into [`OutboundMessage`]s for one channel.
#[derive(Debug, Clone)]
pub struct Normalizer {
    channel: String,
}

impl Normalizer {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn normalize(&self, event: &InboundEvent) -> OutboundMessage {
        OutboundMessage::new(self.channel.clone(), render(event))
    }
}

fn render(event: &InboundEvent) -> String {
    let actor = single_line(event.actor());
    match event.kind() {
        EventKind::Push => {
            let mut text = format!("{actor} pushed {}", single_line(event.git_ref()));
            if let Some(url) = event.compare_url().map(single_line).filter(|u| !u.is_empty()) {
                text.push(' ');
                text.push_str(&url);
            }
            for message in event.commit_messages() {
                text.push('\n');
                text.push_str(&single_line(message));
            }
            text
        }
        EventKind::PullRequest => {
            format!(
                "{actor} opened PR {}",
                single_line(event.pr_url().unwrap_or_default())
            )
        }
        EventKind::TagCreate => format!(
            "{actor} tagged {} {}",
            single_line(event.repository()),
            single_line(event.git_ref())
        ),
    }
}

/// Collapse a field to one line: line-break runs become a single space, other
/// control characters are dropped, surrounding whitespace is trimmed.
pub fn single_line(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_break = false;
    for c in value.chars() {
        if c == '\n' || c == '\r' {
            if !in_break {
                out.push(' ');
                in_break = true;
            }
            continue;
        }
        in_break = false;
        if c.is_control() && c != '\t' {
            continue;
        }
        out.push(if c == '\t' { ' ' } else { c });
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::new("#ci")
    }

    fn push(commits: &[&str]) -> InboundEvent {
        InboundEvent::push(
            "alice".into(),
            "octo/repo".into(),
            "refs/heads/main".into(),
            Some("https://x/compare".into()),
            commits.iter().map(ToString::to_string).collect(),
        )
    }

    #[test]
    fn push_scenario_renders_header_and_commits() {
        let msg = normalizer().normalize(&push(&["fix bug", "add test"]));
        assert_eq!(msg.channel(), "#ci");
        assert_eq!(
            msg.lines().collect::<Vec<_>>(),
            vec![
                "alice pushed refs/heads/main https://x/compare",
                "fix bug",
                "add test"
            ]
        );
    }

    #[test]
    fn push_line_count_is_commits_plus_one() {
        for n in 0..6 {
            let commits: Vec<String> = (0..n).map(|i| format!("commit {i}\n\nbody")).collect();
            let refs: Vec<&str> = commits.iter().map(String::as_str).collect();
            let msg = normalizer().normalize(&push(&refs));
            assert_eq!(msg.line_count(), n + 1, "n = {n}");
        }
    }

    #[test]
    fn multi_line_commit_messages_collapse() {
        let msg = normalizer().normalize(&push(&["subject\r\n\r\nbody line\nmore"]));
        assert_eq!(
            msg.lines().collect::<Vec<_>>(),
            vec![
                "alice pushed refs/heads/main https://x/compare",
                "subject body line more"
            ]
        );
    }

    #[test]
    fn push_without_compare_url_has_no_trailing_space() {
        let event = InboundEvent::push(
            "bob".into(),
            "octo/repo".into(),
            "refs/heads/dev".into(),
            None,
            Vec::new(),
        );
        assert_eq!(normalizer().normalize(&event).text(), "bob pushed refs/heads/dev");
    }

    #[test]
    fn pull_request_template() {
        let event = InboundEvent::pull_request(
            "carol".into(),
            "octo/repo".into(),
            "feature".into(),
            "https://x/pull/7".into(),
        );
        assert_eq!(
            normalizer().normalize(&event).text(),
            "carol opened PR https://x/pull/7"
        );
    }

    #[test]
    fn tag_template() {
        let event = InboundEvent::tag_create("dave".into(), "octo/repo".into(), "v1.2.0".into());
        assert_eq!(
            normalizer().normalize(&event).text(),
            "dave tagged octo/repo v1.2.0"
        );
    }

    #[test]
    fn injected_line_breaks_in_fields_are_flattened() {
        let event = InboundEvent::tag_create(
            "eve\r\nPRIVMSG #other :hi".into(),
            "octo/repo".into(),
            "v1\n".into(),
        );
        let msg = normalizer().normalize(&event);
        assert_eq!(msg.line_count(), 1);
        assert_eq!(msg.text(), "eve PRIVMSG #other :hi tagged octo/repo v1");
    }

    #[test]
    fn single_line_drops_controls() {
        assert_eq!(single_line("a\u{0}b\u{7}c"), "abc");
        assert_eq!(single_line("  tab\there  "), "tab here");
        assert_eq!(single_line("\n\n"), "");
    }
}
