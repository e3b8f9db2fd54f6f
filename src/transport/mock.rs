// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock transport for testing
//!
//! Provides a configurable mock implementation of the Transport trait that
//! can be used in unit tests without making real API calls. Replies are
//! scripted; the last script repeats once the queue is exhausted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Result, TransportError};
use crate::protocol::wire::GenerationRequest;
use crate::transport::{Transport, TransportReply};

/// A mock transport for testing
#[derive(Clone, Default)]
pub struct MockTransport {
    /// Scripted replies, consumed in order with the last one repeating
    replies: Arc<Mutex<Vec<MockReply>>>,
    /// Call counter
    call_count: Arc<AtomicUsize>,
    /// Recorded requests
    recorded_requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

/// A pre-configured reply for the mock transport
#[derive(Clone, Debug)]
pub enum MockReply {
    /// Complete JSON body
    Json(serde_json::Value),
    /// Raw event lines, replayed as a fresh stream per call
    Lines(Vec<String>),
    /// Dispatch failure with a status and body
    Fail { status: u16, body: String },
}

impl MockTransport {
    /// Create a mock transport with one default JSON reply
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(vec![MockReply::Json(default_body())])),
            call_count: Arc::new(AtomicUsize::new(0)),
            recorded_requests: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Set a single JSON reply
    pub fn with_json(self, body: serde_json::Value) -> Self {
        self.script(vec![MockReply::Json(body)])
    }

    /// Set a single line-stream reply
    pub fn with_lines(self, lines: Vec<&str>) -> Self {
        self.script(vec![MockReply::Lines(
            lines.into_iter().map(String::from).collect(),
        )])
    }

    /// Set a single failing reply
    pub fn with_failure(self, status: u16, body: impl Into<String>) -> Self {
        self.script(vec![MockReply::Fail {
            status,
            body: body.into(),
        }])
    }

    /// Queue multiple replies (returned in order, last one repeats)
    pub fn with_replies(self, replies: Vec<MockReply>) -> Self {
        self.script(replies)
    }

    fn script(self, scripted: Vec<MockReply>) -> Self {
        let mut replies = match self.replies.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Mock transport replies lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        *replies = scripted;
        drop(replies);
        self
    }

    /// Get the number of times send() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Get all recorded requests
    pub fn recorded_requests(&self) -> Vec<GenerationRequest> {
        self.recorded_requests.lock().unwrap().clone()
    }

    /// Get the last request made
    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.recorded_requests.lock().unwrap().last().cloned()
    }

    /// Reset call count and recorded requests
    pub fn reset(&self) {
        self.call_count.store(0, Ordering::SeqCst);
        self.recorded_requests.lock().unwrap().clear();
    }

    /// Get the next scripted reply
    fn next_reply(&self) -> MockReply {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst);
        let replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            MockReply::Json(default_body())
        } else {
            replies[count.min(replies.len() - 1)].clone()
        }
    }
}

/// A minimal well-formed generation body
fn default_body() -> serde_json::Value {
    serde_json::json!({
        "output": {
            "choices": [
                { "message": { "role": "assistant", "content": "Mock reply" } }
            ]
        },
        "usage": { "total_tokens": 30, "input_tokens": 10, "output_tokens": 20 },
        "request_id": "mock-request"
    })
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: GenerationRequest) -> Result<TransportReply> {
        self.recorded_requests.lock().unwrap().push(request);

        match self.next_reply() {
            MockReply::Json(body) => Ok(TransportReply::Json(body)),
            MockReply::Lines(lines) => Ok(TransportReply::Lines(Box::pin(tokio_stream::iter(
                lines.into_iter().map(Ok),
            )))),
            MockReply::Fail { status, body } => {
                Err(TransportError::Status { status, body }.into())
            }
        }
    }
}
