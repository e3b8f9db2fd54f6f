// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for Tongyi
//!
//! This module defines all error types used throughout the crate. Errors are
//! grouped by failure family and never retried or swallowed internally;
//! every failure propagates to the caller carrying its family.

use thiserror::Error;

/// Main error type for Tongyi operations
#[derive(Error, Debug)]
pub enum TongyiError {
    /// Caller input rejected before any network activity
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Upstream response that cannot be interpreted
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Reply stream pulled while reasoning output was still pending
    #[error("Must first exhaust the reasoning stream")]
    ReasoningPending,

    /// HTTP transport failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Persistence sink failure
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Input problems detected before dispatch
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Chat called with empty user text
    #[error("Chat text must not be empty")]
    EmptyText,

    /// Reasoning mode requested without streaming mode
    #[error("Reasoning mode requires streaming mode")]
    ReasoningNeedsStream,

    /// Randomness parameter outside its valid range at construction
    #[error("Randomness must be within [0, 1], got {0}")]
    RandomnessRange(f32),
}

/// Responses the upstream API sent in an unexpected shape
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Event stream ended without a single data line
    #[error("No data line found in response stream")]
    NoData,

    /// Body or chunk failed to decode into the expected shape
    #[error("Unexpected response shape: {0}")]
    Json(#[from] serde_json::Error),

    /// Requested streaming but got a complete body, or vice versa
    #[error("Transport reply does not match requested streaming mode")]
    ModeMismatch,
}

/// HTTP-level failures talking to the generation endpoint
#[derive(Error, Debug)]
pub enum TransportError {
    /// Request could not be sent or the connection failed mid-flight
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the endpoint
    #[error("API returned error status {status}: {body}")]
    Status { status: u16, body: String },

    /// Success status but an error code in the response body
    #[error("API error {code}: {message}")]
    Api { code: String, message: String },

    /// Success status with a body that is not JSON
    #[error("Unexpected content type: {0}")]
    ContentType(String),
}

/// Failure reported by a persistence sink
#[derive(Error, Debug)]
#[error("{message}")]
pub struct PersistenceError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PersistenceError {
    /// Create an error with a message only
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an underlying cause
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type alias for Tongyi operations
pub type Result<T> = std::result::Result<T, TongyiError>;
