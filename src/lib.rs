// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tongyi - chat session engine for the DashScope generation API.
//!
//! This crate wraps Alibaba's Qwen models behind a typed session API:
//! - `chat`: sessions, turns and bounded per-conversation history
//! - `protocol`: request/response wire types and tolerant extractors
//! - `transport`: HTTP dispatch, SSE line splitting and a scriptable mock
//! - `stream`: demultiplexing of one event stream into reply and reasoning
//! - `persist`: completion records and pluggable sinks
//!
//! The entry point is [`chat::ChatSession`]; everything else supports it.

pub mod chat;
pub mod clock;
pub mod error;
pub mod persist;
pub mod protocol;
pub mod stream;
pub mod transport;

pub use error::{Result, TongyiError};
