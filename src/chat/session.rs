// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat session orchestration
//!
//! A [`ChatSession`] composes system text, trimmed history and the new user
//! turn into a request, dispatches it through the transport, and routes the
//! reply through the extractor (non-streaming) or the stream demultiplexer
//! (streaming). Completed exchanges go to the persistence sink exactly once.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::chat::history::{ConversationHistory, LimitOverride};
use crate::chat::turn::{ChatTurn, Role, SharedTurn};
use crate::clock::{Clock, SystemClock};
use crate::error::{ProtocolError, Result, ValidationError};
use crate::persist::{PersistenceSink, RecordDraft};
use crate::protocol::extract;
use crate::protocol::wire::{GenerationRequest, GenerationResponse, SearchOptions, WireMessage};
use crate::stream::{ReasoningStream, ReplyStream, StreamDemux};
use crate::transport::{Transport, TransportReply};

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Model name sent with every request
    #[serde(default = "default_model")]
    pub model: String,
    /// Session-level system text, prepended to every message list
    #[serde(default)]
    pub system: Option<String>,
    /// Sampling randomness in [0, 1]; scales temperature and presence penalty
    #[serde(default = "default_randomness")]
    pub randomness: f32,
    /// Default history character budget
    #[serde(default)]
    pub history_max_chars: Option<usize>,
    /// Default history age limit in whole seconds
    #[serde(default)]
    pub history_max_age_secs: Option<i64>,
}

fn default_model() -> String {
    "qwen-turbo-latest".to_string()
}

fn default_randomness() -> f32 {
    0.5
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            system: None,
            randomness: default_randomness(),
            history_max_chars: None,
            history_max_age_secs: None,
        }
    }
}

/// Per-call options for [`ChatSession::chat`]
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Conversation key; no history is read or written when absent
    pub conversation: Option<String>,
    /// Extra system text, concatenated after the session system text
    pub system: Option<String>,
    /// Let the model consult web search
    pub search: bool,
    /// Mark citations in the reply text; meaningful together with `search`
    pub cite: bool,
    /// Stream reasoning text before the reply; requires `stream`
    pub reasoning: bool,
    /// Stream the reply incrementally
    pub stream: bool,
    /// History character budget override for this call
    pub max_chars: LimitOverride<usize>,
    /// History age override for this call
    pub max_age: LimitOverride<Duration>,
}

impl ChatOptions {
    /// Options with everything off
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and write history under this conversation key
    pub fn with_conversation(mut self, key: impl Into<String>) -> Self {
        self.conversation = Some(key.into());
        self
    }

    /// Concatenate extra system text after the session-level system text
    pub fn with_system(mut self, text: impl Into<String>) -> Self {
        self.system = Some(text.into());
        self
    }

    /// Toggle web search augmentation
    pub fn with_search(mut self, on: bool) -> Self {
        self.search = on;
        self
    }

    /// Toggle citation marking in the reply text
    pub fn with_citations(mut self, on: bool) -> Self {
        self.cite = on;
        self
    }

    /// Toggle reasoning mode (requires streaming)
    pub fn with_reasoning(mut self, on: bool) -> Self {
        self.reasoning = on;
        self
    }

    /// Toggle incremental streaming delivery
    pub fn with_stream(mut self, on: bool) -> Self {
        self.stream = on;
        self
    }

    /// Override the history character budget for this call
    pub fn with_max_chars(mut self, limit: LimitOverride<usize>) -> Self {
        self.max_chars = limit;
        self
    }

    /// Override the history age limit for this call
    pub fn with_max_age(mut self, limit: LimitOverride<Duration>) -> Self {
        self.max_age = limit;
        self
    }
}

/// What a chat call produces, depending on the streaming flags
pub enum ChatOutcome {
    /// Non-streaming: the finished reply turn
    Complete(ChatTurn),
    /// Streaming: a filling reply turn plus the reply text stream
    Streaming {
        /// Reply turn that fills in as `text` is drained
        reply: SharedTurn,
        /// Reply text fragments
        text: ReplyStream,
    },
    /// Streaming with reasoning: drain `reasoning` before `text`
    Reasoning {
        /// Reply turn that fills in as the streams are drained
        reply: SharedTurn,
        /// Reply text fragments
        text: ReplyStream,
        /// Reasoning text fragments
        reasoning: ReasoningStream,
    },
}

impl std::fmt::Debug for ChatOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatOutcome::Complete(turn) => f.debug_tuple("Complete").field(turn).finish(),
            ChatOutcome::Streaming { reply, .. } => f
                .debug_struct("Streaming")
                .field("reply", reply)
                .finish_non_exhaustive(),
            ChatOutcome::Reasoning { reply, .. } => f
                .debug_struct("Reasoning")
                .field("reply", reply)
                .finish_non_exhaustive(),
        }
    }
}

/// Orchestrates chat calls against one model endpoint
pub struct ChatSession {
    transport: Arc<dyn Transport>,
    sink: Option<Arc<dyn PersistenceSink>>,
    clock: Arc<dyn Clock>,
    model: String,
    system: Option<String>,
    randomness: f32,
    history: ConversationHistory,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("model", &self.model)
            .field("system", &self.system)
            .field("randomness", &self.randomness)
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    /// Create a session over the given transport.
    ///
    /// Fails when the configured randomness is outside [0, 1].
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig) -> Result<Self> {
        if !(0.0..=1.0).contains(&config.randomness) {
            return Err(ValidationError::RandomnessRange(config.randomness).into());
        }
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let max_age = config.history_max_age_secs.map(Duration::seconds);
        Ok(Self {
            history: ConversationHistory::new(clock.clone(), config.history_max_chars, max_age),
            transport,
            sink: None,
            clock,
            model: config.model,
            system: config.system,
            randomness: config.randomness,
        })
    }

    /// Wire a persistence sink; one record per completed exchange
    pub fn with_sink(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace the clock (for testing)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.history.set_clock(clock.clone());
        self.clock = clock;
        self
    }

    /// Get the model name this session talks to
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Read access to the conversation history
    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Mutable access to the conversation history
    pub fn history_mut(&mut self) -> &mut ConversationHistory {
        &mut self.history
    }

    /// Send one chat turn and return the reply, streamed or complete.
    ///
    /// When a conversation key is given, the user turn is appended to
    /// history before dispatch; a failed call therefore still records what
    /// the user said. The reply turn is appended as soon as it exists and,
    /// for streaming calls, fills in while the caller drains the streams.
    pub async fn chat(&mut self, text: &str, opts: ChatOptions) -> Result<ChatOutcome> {
        if text.is_empty() {
            return Err(ValidationError::EmptyText.into());
        }
        if opts.reasoning && !opts.stream {
            return Err(ValidationError::ReasoningNeedsStream.into());
        }

        let system = match (&self.system, &opts.system) {
            (Some(base), Some(extra)) => Some(format!("{}{}", base, extra)),
            (Some(base), None) => Some(base.clone()),
            (None, Some(extra)) => Some(extra.clone()),
            (None, None) => None,
        };

        let now = self.clock.now();
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(WireMessage::new(Role::System, system));
        }
        if let Some(key) = &opts.conversation {
            let prior = self.history.get(key, opts.max_chars, opts.max_age, true);
            messages.extend(prior.iter().map(WireMessage::from));
        }
        messages.push(WireMessage::new(Role::User, text));

        if let Some(key) = &opts.conversation {
            self.history
                .push(key, SharedTurn::new(ChatTurn::user(text, now)));
        }

        let request = self.build_request(&opts, messages.clone());
        let draft = RecordDraft {
            request_time: now,
            messages,
            model: self.model.clone(),
        };

        tracing::debug!(
            "Dispatching chat request ({} message(s), streaming: {})",
            draft.messages.len(),
            opts.stream
        );
        let reply = self.transport.send(request).await?;

        match (opts.stream, reply) {
            (false, TransportReply::Json(body)) => {
                let response: GenerationResponse =
                    serde_json::from_value(body).map_err(ProtocolError::Json)?;
                let turn = extract::reply_record(&response, self.clock.now());
                if let Some(key) = &opts.conversation {
                    self.history.push(key, SharedTurn::new(turn.clone()));
                }
                if let Some(sink) = &self.sink {
                    let record = draft.complete(&turn, turn.timestamp);
                    sink.write(&record).await?;
                }
                Ok(ChatOutcome::Complete(turn))
            }
            (true, TransportReply::Lines(lines)) => {
                let demux =
                    StreamDemux::seed(lines, draft, self.sink.clone(), self.clock.clone()).await?;
                let reply_turn = demux.record();
                if let Some(key) = &opts.conversation {
                    self.history.push(key, reply_turn.clone());
                }
                let (text, reasoning) = demux.split();
                if opts.reasoning {
                    Ok(ChatOutcome::Reasoning {
                        reply: reply_turn,
                        text,
                        reasoning,
                    })
                } else {
                    Ok(ChatOutcome::Streaming {
                        reply: reply_turn,
                        text,
                    })
                }
            }
            _ => Err(ProtocolError::ModeMismatch.into()),
        }
    }

    /// Rewrite text for clarity, without history or streaming
    pub async fn polish(&mut self, text: &str) -> Result<ChatTurn> {
        let opts = ChatOptions::new().with_system(
            "Rewrite the following text to improve clarity and flow. \
             Keep the original language, meaning and factual content unchanged. \
             Reply with the rewritten text only.",
        );
        match self.chat(text, opts).await? {
            ChatOutcome::Complete(turn) => Ok(turn),
            ChatOutcome::Streaming { .. } | ChatOutcome::Reasoning { .. } => {
                Err(ProtocolError::ModeMismatch.into())
            }
        }
    }

    fn build_request(&self, opts: &ChatOptions, messages: Vec<WireMessage>) -> GenerationRequest {
        // The endpoint rejects a temperature of exactly 2.0.
        let temperature = {
            let scaled = self.randomness * 2.0;
            if scaled >= 2.0 {
                1.99
            } else {
                scaled
            }
        };

        let mut request = GenerationRequest::new(self.model.clone(), messages);
        request.parameters.temperature = temperature;
        request.parameters.presence_penalty = self.randomness * 4.0 - 2.0;
        request.parameters.enable_search = opts.search;
        if opts.search {
            request.parameters.search_options = Some(SearchOptions::with_citation(opts.cite));
        }
        request.parameters.enable_thinking = opts.reasoning;
        request.streaming(opts.stream)
    }
}
