// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Transport capability
//!
//! The session dispatches requests through the [`Transport`] trait and gets
//! back either a complete JSON body or a lazy line stream, matching the
//! request's streaming flag. Endpoint, authentication and headers are
//! concerns of the concrete implementation.

pub mod dashscope;
pub mod mock;

pub use dashscope::*;
pub use mock::*;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;
use crate::protocol::wire::GenerationRequest;

/// Lazy stream of raw event lines from a live connection
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// What came back from a dispatch
pub enum TransportReply {
    /// Complete decoded body (non-streaming request)
    Json(serde_json::Value),
    /// Live line stream (streaming request)
    Lines(LineStream),
}

impl std::fmt::Debug for TransportReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportReply::Json(body) => f.debug_tuple("Json").field(body).finish(),
            TransportReply::Lines(_) => f.write_str("Lines(<stream>)"),
        }
    }
}

impl TransportReply {
    /// True for the streaming variant.
    pub fn is_streaming(&self) -> bool {
        matches!(self, TransportReply::Lines(_))
    }
}

/// Dispatches generation requests to an endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request; the reply variant must match `request.stream`.
    async fn send(&self, request: GenerationRequest) -> Result<TransportReply>;
}
