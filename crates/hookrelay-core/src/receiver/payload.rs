//! Webhook payload validation.
//!
//! Tolerant reader: unknown fields are ignored, only the fields each event
//! kind needs are required.

use serde_json::Value;

use super::ValidationError;
use crate::event::InboundEvent;

/// Event type discriminator as delivered by the sender (`X-GitHub-Event`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTypeHint {
    Push,
    PullRequest,
    Create,
}

impl EventTypeHint {
    pub fn parse(hint: &str) -> Result<Self, ValidationError> {
        match hint.trim().to_ascii_lowercase().as_str() {
            "push" => Ok(Self::Push),
            "pull_request" => Ok(Self::PullRequest),
            "create" => Ok(Self::Create),
            other => Err(ValidationError::UnsupportedEventKind(other.to_string())),
        }
    }
}

/// Validate a raw payload for the given event type hint.
///
/// The hint is checked before the body is parsed, so unsupported kinds are
/// rejected even when the body is garbage.
pub fn receive(raw: &[u8], event_type: &str) -> Result<InboundEvent, ValidationError> {
    let hint = EventTypeHint::parse(event_type)?;
    let payload: Value = serde_json::from_slice(raw)
        .map_err(|e| ValidationError::MalformedPayload(format!("invalid JSON: {e}")))?;
    if !payload.is_object() {
        return Err(ValidationError::MalformedPayload(
            "payload must be a JSON object".into(),
        ));
    }

    match hint {
        EventTypeHint::Push => parse_push(&payload),
        EventTypeHint::PullRequest => parse_pull_request(&payload),
        EventTypeHint::Create => parse_create(&payload),
    }
}

fn parse_push(raw: &Value) -> Result<InboundEvent, ValidationError> {
    let actor = first_str(raw, &[&["sender", "login"], &["pusher", "name"]])
        .ok_or_else(|| missing("sender.login"))?;
    let repository = repository(raw)?;
    let git_ref = required_str(raw, &["ref"])?;
    let compare_url = optional_str(raw, &["compare"]);

    let commit_messages = match raw.get("commits") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(commits)) => commits
            .iter()
            .enumerate()
            .map(|(i, commit)| {
                commit
                    .get("message")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .ok_or_else(|| missing(&format!("commits[{i}].message")))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(ValidationError::MalformedPayload(
                "commits must be an array".into(),
            ));
        }
    };

    Ok(InboundEvent::push(
        actor,
        repository,
        git_ref,
        compare_url,
        commit_messages,
    ))
}

fn parse_pull_request(raw: &Value) -> Result<InboundEvent, ValidationError> {
    let action = required_str(raw, &["action"])?;
    if action != "opened" {
        return Err(ValidationError::UnsupportedEventKind(format!(
            "pull_request.{action}"
        )));
    }
    let actor = required_str(raw, &["sender", "login"])?;
    let repository = repository(raw)?;
    let pr_url = required_str(raw, &["pull_request", "html_url"])?;
    let git_ref = optional_str(raw, &["pull_request", "head", "ref"]).unwrap_or_default();

    Ok(InboundEvent::pull_request(actor, repository, git_ref, pr_url))
}

fn parse_create(raw: &Value) -> Result<InboundEvent, ValidationError> {
    let ref_type = required_str(raw, &["ref_type"])?;
    if ref_type != "tag" {
        return Err(ValidationError::UnsupportedEventKind(format!(
            "create.{ref_type}"
        )));
    }
    let actor = required_str(raw, &["sender", "login"])?;
    let repository = repository(raw)?;
    let git_ref = required_str(raw, &["ref"])?;

    Ok(InboundEvent::tag_create(actor, repository, git_ref))
}

fn repository(raw: &Value) -> Result<String, ValidationError> {
    first_str(
        raw,
        &[&["repository", "full_name"], &["repository", "name"]],
    )
    .ok_or_else(|| missing("repository.full_name"))
}

fn lookup<'a>(raw: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(raw, |value, key| value.get(key))
}

fn optional_str(raw: &Value, path: &[&str]) -> Option<String> {
    lookup(raw, path)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(String::from)
}

fn required_str(raw: &Value, path: &[&str]) -> Result<String, ValidationError> {
    optional_str(raw, path).ok_or_else(|| missing(&path.join(".")))
}

fn first_str(raw: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| optional_str(raw, path))
}

fn missing(field: &str) -> ValidationError {
    ValidationError::MalformedPayload(format!("missing required field '{field}'"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::event::EventKind;

    fn bytes(value: &Value) -> Vec<u8> {
        serde_json::to_vec(value).unwrap()
    }

    fn push_payload() -> Value {
        json!({
            "ref": "refs/heads/main",
            "compare": "https://x/compare",
            "repository": {"full_name": "octo/repo", "name": "repo"},
            "sender": {"login": "alice"},
            "pusher": {"name": "alice-pusher"},
            "commits": [{"message": "fix bug"}, {"message": "add test"}]
        })
    }

    #[test]
    fn push_is_parsed() {
        let event = receive(&bytes(&push_payload()), "push").unwrap();
        assert_eq!(event.kind(), EventKind::Push);
        assert_eq!(event.actor(), "alice");
        assert_eq!(event.repository(), "octo/repo");
        assert_eq!(event.git_ref(), "refs/heads/main");
        assert_eq!(event.compare_url(), Some("https://x/compare"));
        assert_eq!(event.commit_messages(), ["fix bug", "add test"]);
    }

    #[test]
    fn push_falls_back_to_pusher_and_repo_name() {
        let mut payload = push_payload();
        payload.as_object_mut().unwrap().remove("sender");
        payload["repository"].as_object_mut().unwrap().remove("full_name");
        let event = receive(&bytes(&payload), "push").unwrap();
        assert_eq!(event.actor(), "alice-pusher");
        assert_eq!(event.repository(), "repo");
    }

    #[test]
    fn push_without_commits_or_compare() {
        let payload = json!({
            "ref": "refs/heads/main",
            "repository": {"full_name": "octo/repo"},
            "sender": {"login": "alice"}
        });
        let event = receive(&bytes(&payload), "push").unwrap();
        assert!(event.commit_messages().is_empty());
        assert_eq!(event.compare_url(), None);
    }

    #[test]
    fn push_missing_ref_is_malformed() {
        let mut payload = push_payload();
        payload.as_object_mut().unwrap().remove("ref");
        assert!(matches!(
            receive(&bytes(&payload), "push"),
            Err(ValidationError::MalformedPayload(msg)) if msg.contains("ref")
        ));
    }

    #[test]
    fn push_with_non_array_commits_is_malformed() {
        let mut payload = push_payload();
        payload["commits"] = json!("nope");
        assert!(matches!(
            receive(&bytes(&payload), "push"),
            Err(ValidationError::MalformedPayload(_))
        ));
    }

    #[test]
    fn push_commit_without_message_is_malformed() {
        let mut payload = push_payload();
        payload["commits"] = json!([{"id": "abc"}]);
        assert!(matches!(
            receive(&bytes(&payload), "push"),
            Err(ValidationError::MalformedPayload(msg)) if msg.contains("commits[0].message")
        ));
    }

    #[test]
    fn opened_pull_request_is_parsed() {
        let payload = json!({
            "action": "opened",
            "sender": {"login": "carol"},
            "repository": {"full_name": "octo/repo"},
            "pull_request": {"html_url": "https://x/pull/7", "head": {"ref": "feature"}}
        });
        let event = receive(&bytes(&payload), "pull_request").unwrap();
        assert_eq!(event.kind(), EventKind::PullRequest);
        assert_eq!(event.pr_url(), Some("https://x/pull/7"));
        assert_eq!(event.git_ref(), "feature");
    }

    #[test]
    fn closed_pull_request_is_unsupported() {
        let payload = json!({
            "action": "closed",
            "sender": {"login": "carol"},
            "repository": {"full_name": "octo/repo"},
            "pull_request": {"html_url": "https://x/pull/7"}
        });
        assert_eq!(
            receive(&bytes(&payload), "pull_request"),
            Err(ValidationError::UnsupportedEventKind(
                "pull_request.closed".into()
            ))
        );
    }

    #[test]
    fn pull_request_without_url_is_malformed() {
        let payload = json!({
            "action": "opened",
            "sender": {"login": "carol"},
            "repository": {"full_name": "octo/repo"},
            "pull_request": {}
        });
        assert!(matches!(
            receive(&bytes(&payload), "pull_request"),
            Err(ValidationError::MalformedPayload(_))
        ));
    }

    #[test]
    fn tag_create_is_parsed() {
        let payload = json!({
            "ref": "v1.2.0",
            "ref_type": "tag",
            "sender": {"login": "dave"},
            "repository": {"full_name": "octo/repo"}
        });
        let event = receive(&bytes(&payload), "create").unwrap();
        assert_eq!(event.kind(), EventKind::TagCreate);
        assert_eq!(event.git_ref(), "v1.2.0");
    }

    #[test]
    fn branch_create_is_unsupported() {
        let payload = json!({
            "ref": "feature",
            "ref_type": "branch",
            "sender": {"login": "dave"},
            "repository": {"full_name": "octo/repo"}
        });
        assert_eq!(
            receive(&bytes(&payload), "create"),
            Err(ValidationError::UnsupportedEventKind("create.branch".into()))
        );
    }

    #[test]
    fn unsupported_kind_is_rejected_before_parsing() {
        assert_eq!(
            receive(b"not even json", "issue_comment"),
            Err(ValidationError::UnsupportedEventKind("issue_comment".into()))
        );
    }

    #[test]
    fn hint_is_case_insensitive() {
        assert_eq!(EventTypeHint::parse(" Push "), Ok(EventTypeHint::Push));
        assert_eq!(
            EventTypeHint::parse("PULL_REQUEST"),
            Ok(EventTypeHint::PullRequest)
        );
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(
            receive(b"{", "push"),
            Err(ValidationError::MalformedPayload(_))
        ));
        assert!(matches!(
            receive(b"[1,2]", "push"),
            Err(ValidationError::MalformedPayload(_))
        ));
    }
}
