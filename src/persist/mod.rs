// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Persistence capability
//!
//! A completed chat call produces exactly one [`CompletionRecord`], handed
//! to the configured [`PersistenceSink`]. The record is drafted when the
//! request goes out and completed once the reply is fully known, which for
//! streaming calls is when the caller drains the reply stream.

pub mod memory;

pub use memory::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::turn::{ChatTurn, TokenUsage, WebCitation};
use crate::error::Result;
use crate::protocol::wire::WireMessage;

/// One completed request/reply exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    /// When the request was dispatched
    pub request_time: DateTime<Utc>,
    /// When the reply was fully known
    pub response_time: DateTime<Utc>,
    /// Messages sent, including any system message
    pub messages: Vec<WireMessage>,
    /// Full reply text
    pub reply: String,
    /// Reasoning text, reasoning mode only
    pub reasoning: Option<String>,
    /// Web citations, search mode only
    pub citations: Option<Vec<WebCitation>>,
    /// Token accounting; zeroed when the upstream omitted it
    pub usage: TokenUsage,
    /// Model that produced the reply
    pub model: String,
}

/// Request-time half of a [`CompletionRecord`]
#[derive(Debug, Clone)]
pub struct RecordDraft {
    /// When the request was dispatched
    pub request_time: DateTime<Utc>,
    /// Messages sent, including any system message
    pub messages: Vec<WireMessage>,
    /// Model the request was addressed to
    pub model: String,
}

impl RecordDraft {
    /// Complete the draft from the final reply turn.
    pub fn complete(&self, reply: &ChatTurn, response_time: DateTime<Utc>) -> CompletionRecord {
        CompletionRecord {
            request_time: self.request_time,
            response_time,
            messages: self.messages.clone(),
            reply: reply.content.clone().unwrap_or_default(),
            reasoning: reply.reasoning.clone(),
            citations: reply.citations.clone(),
            usage: reply.usage.unwrap_or_default(),
            model: self.model.clone(),
        }
    }
}

/// Accepts completed records, exactly one per chat call.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Append one record; failures propagate to the chat caller.
    async fn write(&self, record: &CompletionRecord) -> Result<()>;
}
