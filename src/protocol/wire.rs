// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Wire shapes for the DashScope text-generation endpoint
//!
//! Request bodies are built here exactly as the endpoint expects them;
//! responses decode tolerantly (optional fields default to absent) but a
//! choice without a message, or a search result without its index, url or
//! title, is a structural error surfaced at decode time.

use serde::{Deserialize, Serialize};

use crate::chat::turn::{ChatTurn, Role};

/// One message as sent to the endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Speaker role
    pub role: Role,
    /// Message text
    pub content: String,
}

impl WireMessage {
    /// Build a message from a role and text.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&ChatTurn> for WireMessage {
    fn from(turn: &ChatTurn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone().unwrap_or_default(),
        }
    }
}

/// Complete request body for one generation call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model name, e.g. `qwen-turbo-latest`
    pub model: String,
    /// Message list wrapper
    pub input: RequestInput,
    /// Sampling and feature toggles
    pub parameters: Parameters,
    /// Request incremental delivery over SSE
    pub stream: bool,
}

impl GenerationRequest {
    /// Build a non-streaming request with default parameters.
    pub fn new(model: impl Into<String>, messages: Vec<WireMessage>) -> Self {
        Self {
            model: model.into(),
            input: RequestInput { messages },
            parameters: Parameters::default(),
            stream: false,
        }
    }

    /// Toggle streaming delivery, keeping the body flag in sync.
    pub fn streaming(mut self, on: bool) -> Self {
        self.stream = on;
        self.parameters.incremental_output = on.then_some(true);
        self
    }
}

/// Request `input` wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestInput {
    /// Ordered message list; at most one system message, first
    pub messages: Vec<WireMessage>,
}

/// Request `parameters` block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameters {
    /// Always `message`; the endpoint's structured reply format
    pub result_format: String,
    /// Sampling temperature in [0, 2)
    pub temperature: f32,
    /// Repetition penalty in [-2, 2]
    pub presence_penalty: f32,
    /// Let the model consult web search
    pub enable_search: bool,
    /// Search tuning, present only when search is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_options: Option<SearchOptions>,
    /// Emit reasoning text before the reply
    pub enable_thinking: bool,
    /// Ask for delta chunks rather than cumulative ones, streaming only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incremental_output: Option<bool>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            result_format: "message".to_string(),
            temperature: 1.0,
            presence_penalty: 0.0,
            enable_search: false,
            search_options: None,
            enable_thinking: false,
            incremental_output: None,
        }
    }
}

/// Request `parameters.search_options` block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    pub enable_source: bool,
    pub enable_citation: bool,
    pub citation_format: String,
    pub forced_search: bool,
    pub search_strategy: String,
    pub prepend_search_result: bool,
    pub enable_search_extension: bool,
}

impl SearchOptions {
    /// Standard search tuning; only citation marking varies per call.
    pub fn with_citation(cite: bool) -> Self {
        Self {
            enable_source: true,
            enable_citation: cite,
            citation_format: "[ref_<number>]".to_string(),
            forced_search: false,
            search_strategy: "max".to_string(),
            prepend_search_result: false,
            enable_search_extension: true,
        }
    }
}

/// Complete response body, or one streamed chunk
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationResponse {
    /// Generated output, absent on some error bodies
    #[serde(default)]
    pub output: Option<Output>,
    /// Token accounting, absent on early stream chunks
    #[serde(default)]
    pub usage: Option<UsageBlock>,
    /// Upstream request id, useful in logs
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Response `output` block
#[derive(Debug, Clone, Deserialize)]
pub struct Output {
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Web search results, present only when search ran
    #[serde(default)]
    pub search_info: Option<SearchInfo>,
}

/// One generation choice; only the first is used
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Response message payload
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub role: Option<Role>,
    /// Reply text; absent on reasoning-only chunks, may be empty
    #[serde(default)]
    pub content: Option<String>,
    /// Reasoning text, reasoning mode only
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

/// Response `usage` block
#[derive(Debug, Clone, Deserialize)]
pub struct UsageBlock {
    pub total_tokens: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(default)]
    pub output_tokens_details: Option<TokenDetails>,
}

/// Response `usage.output_tokens_details` block
#[derive(Debug, Clone, Deserialize)]
pub struct TokenDetails {
    #[serde(default)]
    pub reasoning_tokens: Option<u32>,
}

/// Response `output.search_info` block
#[derive(Debug, Clone, Deserialize)]
pub struct SearchInfo {
    #[serde(default)]
    pub search_results: Vec<SearchResult>,
}

/// One web search result attached to a reply
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub site_name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    pub index: u32,
    pub url: String,
    pub title: String,
}
