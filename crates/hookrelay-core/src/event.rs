//! Validated inbound repository events.

use std::fmt;

/// The closed set of event kinds the relay forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Push,
    PullRequest,
    TagCreate,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::PullRequest => "pull_request",
            Self::TagCreate => "tag_create",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A repository event that passed validation.
///
/// Only the receiver constructs these; fields are read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    kind: EventKind,
    actor: String,
    repository: String,
    git_ref: String,
    compare_url: Option<String>,
    pr_url: Option<String>,
    commit_messages: Vec<String>,
}

impl InboundEvent {
    pub(crate) const fn push(
        actor: String,
        repository: String,
        git_ref: String,
        compare_url: Option<String>,
        commit_messages: Vec<String>,
    ) -> Self {
        Self {
            kind: EventKind::Push,
            actor,
            repository,
            git_ref,
            compare_url,
            pr_url: None,
            commit_messages,
        }
    }

    pub(crate) const fn pull_request(
        actor: String,
        repository: String,
        git_ref: String,
        pr_url: String,
    ) -> Self {
        Self {
            kind: EventKind::PullRequest,
            actor,
            repository,
            git_ref,
            compare_url: None,
            pr_url: Some(pr_url),
            commit_messages: Vec::new(),
        }
    }

    pub(crate) const fn tag_create(actor: String, repository: String, git_ref: String) -> Self {
        Self {
            kind: EventKind::TagCreate,
            actor,
            repository,
            git_ref,
            compare_url: None,
            pr_url: None,
            commit_messages: Vec::new(),
        }
    }

    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// The git ref (`refs/heads/main`, a tag name, or the PR head branch).
    pub fn git_ref(&self) -> &str {
        &self.git_ref
    }

    pub fn compare_url(&self) -> Option<&str> {
        self.compare_url.as_deref()
    }

    pub fn pr_url(&self) -> Option<&str> {
        self.pr_url.as_deref()
    }

    pub fn commit_messages(&self) -> &[String] {
        &self.commit_messages
    }
}
