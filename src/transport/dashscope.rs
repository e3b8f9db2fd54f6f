// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! DashScope HTTP transport
//!
//! Talks to the Alibaba Cloud DashScope text-generation endpoint. Streaming
//! requests carry the `X-DashScope-SSE: enable` header and return the raw
//! event lines; non-streaming requests return the decoded JSON body after
//! content-type and error-code checks.

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use crate::error::{Result, TransportError};
use crate::protocol::wire::GenerationRequest;
use crate::transport::{LineStream, Transport, TransportReply};

const DASHSCOPE_API_URL: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generation";

/// Transport for the DashScope generation API
pub struct DashScopeTransport {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl DashScopeTransport {
    /// Create a transport with the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DASHSCOPE_API_URL.to_string(),
        }
    }

    /// Create a transport with a custom base URL (for testing)
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Transport for DashScopeTransport {
    async fn send(&self, request: GenerationRequest) -> Result<TransportReply> {
        let streaming = request.stream;
        tracing::debug!(
            "Dispatching generation request for model {} (streaming: {})",
            request.model,
            streaming
        );

        let mut builder = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json");
        if streaming {
            builder = builder.header("X-DashScope-SSE", "enable");
        }

        let response = builder
            .json(&request)
            .send()
            .await
            .map_err(TransportError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        if streaming {
            return Ok(TransportReply::Lines(split_lines(response.bytes_stream())));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.contains("application/json") {
            return Err(TransportError::ContentType(content_type).into());
        }

        let body: serde_json::Value = response.json().await.map_err(TransportError::Http)?;
        if let Some(code) = body.get("code").and_then(serde_json::Value::as_str) {
            let message = body
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(TransportError::Api {
                code: code.to_string(),
                message,
            }
            .into());
        }

        Ok(TransportReply::Json(body))
    }
}

/// Split a byte stream into lines, stripping a trailing `\r` per line.
///
/// Mid-stream connection errors surface as items; an unterminated trailing
/// fragment at end of stream is discarded.
fn split_lines<S, B>(bytes: S) -> LineStream
where
    S: Stream<Item = std::result::Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send,
{
    Box::pin(async_stream::stream! {
        let mut bytes = std::pin::pin!(bytes);
        let mut buffer = String::new();
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    buffer.push_str(&String::from_utf8_lossy(chunk.as_ref()));
                    while let Some(pos) = buffer.find('\n') {
                        let line = buffer[..pos].trim_end_matches('\r').to_string();
                        buffer.drain(..=pos);
                        yield Ok(line);
                    }
                }
                Err(err) => {
                    yield Err(TransportError::Http(err).into());
                    return;
                }
            }
        }
        if !buffer.trim().is_empty() {
            tracing::warn!("Discarding {} unterminated trailing byte(s)", buffer.len());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::turn::Role;
    use crate::protocol::wire::WireMessage;

    fn request() -> GenerationRequest {
        GenerationRequest::new("qwen-turbo-latest", vec![WireMessage::new(Role::User, "hi")])
    }

    async fn collect(mut lines: LineStream) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(line) = lines.next().await {
            out.push(line.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_split_lines_across_chunk_boundaries() {
        let chunks = futures::stream::iter(vec![
            Ok::<_, reqwest::Error>("data: {\"a\""),
            Ok(":1}\n\ndata: {\"b\":2}\r\n"),
            Ok("tail without newline"),
        ]);
        let lines = collect(split_lines(chunks)).await;
        assert_eq!(lines, vec!["data: {\"a\":1}", "", "data: {\"b\":2}"]);
    }

    #[tokio::test]
    async fn test_split_lines_empty_stream() {
        let chunks = futures::stream::iter(Vec::<std::result::Result<&str, reqwest::Error>>::new());
        let lines = collect(split_lines(chunks)).await;
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn test_non_streaming_success() {
        use wiremock::matchers::{header, method};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "output": { "choices": [ { "message": { "content": "hello" } } ] },
                "request_id": "r-1"
            })))
            .mount(&server)
            .await;

        let transport = DashScopeTransport::with_base_url("test-key", server.uri());
        let reply = transport.send(request()).await.unwrap();
        match reply {
            TransportReply::Json(body) => {
                assert_eq!(body["request_id"], "r-1");
            }
            TransportReply::Lines(_) => panic!("expected JSON reply"),
        }
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Throttling.RateQuota"))
            .mount(&server)
            .await;

        let transport = DashScopeTransport::with_base_url("test-key", server.uri());
        let err = transport.send(request()).await.unwrap_err();
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Throttling.RateQuota"));
    }

    #[tokio::test]
    async fn test_error_code_in_success_body() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "InvalidApiKey",
                "message": "Invalid API-key provided."
            })))
            .mount(&server)
            .await;

        let transport = DashScopeTransport::with_base_url("bad-key", server.uri());
        let err = transport.send(request()).await.unwrap_err();
        assert!(err.to_string().contains("InvalidApiKey"));
        assert!(err.to_string().contains("Invalid API-key provided."));
    }

    #[tokio::test]
    async fn test_unexpected_content_type() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html>gateway</html>", "text/html"))
            .mount(&server)
            .await;

        let transport = DashScopeTransport::with_base_url("test-key", server.uri());
        let err = transport.send(request()).await.unwrap_err();
        assert!(err.to_string().contains("text/html"));
    }

    #[tokio::test]
    async fn test_streaming_sends_sse_header_and_splits_lines() {
        use wiremock::matchers::{header, method};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("X-DashScope-SSE", "enable"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "id:1\nevent:result\ndata: {\"output\":{\"choices\":[{\"message\":{\"content\":\"par\"}}]}}\n\n",
            ))
            .mount(&server)
            .await;

        let transport = DashScopeTransport::with_base_url("test-key", server.uri());
        let reply = transport.send(request().streaming(true)).await.unwrap();
        match reply {
            TransportReply::Lines(lines) => {
                let lines = collect(lines).await;
                assert_eq!(lines.len(), 4);
                assert_eq!(lines[0], "id:1");
                assert!(lines[2].starts_with("data: {"));
            }
            TransportReply::Json(_) => panic!("expected line stream"),
        }
    }

    #[tokio::test]
    async fn test_streaming_error_status() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let transport = DashScopeTransport::with_base_url("test-key", server.uri());
        let err = transport.send(request().streaming(true)).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
