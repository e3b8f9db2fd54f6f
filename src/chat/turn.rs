// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat turn data model
//!
//! A [`ChatTurn`] is one message in a conversation. Streaming replies are
//! held as a [`SharedTurn`] so the turn already sitting in history fills in
//! as chunks arrive. [`HistoryInput`] is the tagged append input: a bare
//! string, a batch of strings, or explicit [`TurnSeed`] values.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions, supplied per call and never stored in history
    System,
    /// End-user input
    User,
    /// Model output
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Token counts reported by the upstream API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Total tokens billed for the call
    pub total: u32,
    /// Tokens in the request
    pub input: u32,
    /// Tokens in the reply
    pub output: u32,
    /// Tokens spent on reasoning, when the API reports them
    pub output_reasoning: Option<u32>,
}

/// One web search result cited by a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebCitation {
    /// Source site name, absent when the API sent none or an empty string
    pub site: Option<String>,
    /// Source favicon URL, absent when the API sent none or an empty string
    pub icon: Option<String>,
    /// 1-based citation index referenced from the reply text
    pub index: u32,
    /// Result URL
    pub url: String,
    /// Result title
    pub title: String,
}

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// When the turn was created
    pub timestamp: DateTime<Utc>,
    /// Who produced the turn
    pub role: Role,
    /// Message text; absent while a streaming reply is still in flight
    pub content: Option<String>,
    /// Cached character count of `content`
    pub content_len: Option<usize>,
    /// Token usage, assistant turns only
    pub usage: Option<TokenUsage>,
    /// Web citations, assistant turns with search only
    pub citations: Option<Vec<WebCitation>>,
    /// Reasoning text, assistant turns in reasoning mode only
    pub reasoning: Option<String>,
}

impl ChatTurn {
    /// Create a turn with the given role and content.
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let content = content.into();
        let content_len = content.chars().count();
        Self {
            timestamp,
            role,
            content: Some(content),
            content_len: Some(content_len),
            usage: None,
            citations: None,
            reasoning: None,
        }
    }

    /// Create a user turn.
    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::User, content, timestamp)
    }

    /// Create an assistant turn.
    pub fn assistant(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::Assistant, content, timestamp)
    }

    /// Create a system turn.
    pub fn system(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::System, content, timestamp)
    }

    /// Character count of the content, zero when absent.
    pub fn char_len(&self) -> usize {
        self.content_len.unwrap_or(0)
    }
}

/// Shared handle to a turn that fills in while a reply streams.
///
/// The handle placed in history and the one returned to the caller point at
/// the same turn, so draining the reply stream updates the stored history
/// entry in place.
#[derive(Debug, Clone)]
pub struct SharedTurn {
    inner: Arc<Mutex<ChatTurn>>,
}

impl SharedTurn {
    /// Wrap a turn in a shared handle.
    pub fn new(turn: ChatTurn) -> Self {
        Self {
            inner: Arc::new(Mutex::new(turn)),
        }
    }

    /// Clone out the current state of the turn.
    pub fn snapshot(&self) -> ChatTurn {
        self.lock().clone()
    }

    /// Creation instant of the turn.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.lock().timestamp
    }

    /// Character count of the content so far, zero when absent.
    pub fn char_len(&self) -> usize {
        self.lock().char_len()
    }

    /// Current content, if any.
    pub fn content(&self) -> Option<String> {
        self.lock().content.clone()
    }

    /// Append a reply fragment and refresh the cached length.
    pub(crate) fn append_content(&self, fragment: &str) {
        let mut turn = self.lock();
        let content = turn.content.get_or_insert_with(String::new);
        content.push_str(fragment);
        turn.content_len = Some(turn.content.as_deref().unwrap_or("").chars().count());
    }

    /// Append a reasoning fragment.
    pub(crate) fn append_reasoning(&self, fragment: &str) {
        let mut turn = self.lock();
        turn.reasoning.get_or_insert_with(String::new).push_str(fragment);
    }

    /// Replace the token usage with the latest reported value.
    pub(crate) fn set_usage(&self, usage: TokenUsage) {
        self.lock().usage = Some(usage);
    }

    /// Keep the first non-absent citation list; later ones are ignored.
    pub(crate) fn merge_citations(&self, citations: Vec<WebCitation>) {
        let mut turn = self.lock();
        if turn.citations.is_none() {
            turn.citations = Some(citations);
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChatTurn> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Shared turn lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Explicit turn input for history appends.
///
/// Only the content is required; role defaults to user and the timestamp to
/// the store's clock at append time.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSeed {
    /// Message text
    pub content: String,
    /// Role, user when absent
    pub role: Option<Role>,
    /// Creation instant, append time when absent
    pub timestamp: Option<DateTime<Utc>>,
}

impl TurnSeed {
    /// Seed with content only.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role: None,
            timestamp: None,
        }
    }

    /// Set an explicit role.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Set an explicit timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Accepted shapes for a history append
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryInput {
    /// One user turn from a bare string
    Text(String),
    /// One user turn per string
    Texts(Vec<String>),
    /// Fully-specified turn seeds
    Seeds(Vec<TurnSeed>),
}

impl From<&str> for HistoryInput {
    fn from(text: &str) -> Self {
        HistoryInput::Text(text.to_string())
    }
}

impl From<String> for HistoryInput {
    fn from(text: String) -> Self {
        HistoryInput::Text(text)
    }
}

impl From<Vec<String>> for HistoryInput {
    fn from(texts: Vec<String>) -> Self {
        HistoryInput::Texts(texts)
    }
}

impl From<Vec<&str>> for HistoryInput {
    fn from(texts: Vec<&str>) -> Self {
        HistoryInput::Texts(texts.into_iter().map(String::from).collect())
    }
}

impl From<TurnSeed> for HistoryInput {
    fn from(seed: TurnSeed) -> Self {
        HistoryInput::Seeds(vec![seed])
    }
}

impl From<Vec<TurnSeed>> for HistoryInput {
    fn from(seeds: Vec<TurnSeed>) -> Self {
        HistoryInput::Seeds(seeds)
    }
}
