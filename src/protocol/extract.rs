// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Typed fragment extraction from decoded responses
//!
//! Pure functions over a [`GenerationResponse`], shared by the
//! non-streaming path (whole body) and the streaming path (one chunk at a
//! time). Absence is meaningful here: a chunk with no reply text is not the
//! same as one with an empty reply, except for reasoning text where empty
//! and absent both mean "no reasoning".

use chrono::{DateTime, Utc};

use crate::chat::turn::{ChatTurn, Role, TokenUsage, WebCitation};
use crate::protocol::wire::GenerationResponse;

/// Reply text of the first choice; absent when the chunk carries none.
///
/// An empty string on the wire is still a present value.
pub fn reply_text(response: &GenerationResponse) -> Option<&str> {
    response
        .output
        .as_ref()?
        .choices
        .first()?
        .message
        .content
        .as_deref()
}

/// Reasoning text of the first choice; empty and missing are both absent.
pub fn reasoning_text(response: &GenerationResponse) -> Option<&str> {
    response
        .output
        .as_ref()?
        .choices
        .first()?
        .message
        .reasoning_content
        .as_deref()
        .filter(|text| !text.is_empty())
}

/// Token counts, when the chunk reports them.
pub fn token_usage(response: &GenerationResponse) -> Option<TokenUsage> {
    let usage = response.usage.as_ref()?;
    Some(TokenUsage {
        total: usage.total_tokens,
        input: usage.input_tokens,
        output: usage.output_tokens,
        output_reasoning: usage
            .output_tokens_details
            .as_ref()
            .and_then(|details| details.reasoning_tokens),
    })
}

/// Web search citations, when the chunk carries a non-empty result list.
///
/// Empty-string site names and icons are normalized to absent.
pub fn web_citations(response: &GenerationResponse) -> Option<Vec<WebCitation>> {
    let results = &response.output.as_ref()?.search_info.as_ref()?.search_results;
    if results.is_empty() {
        return None;
    }
    Some(
        results
            .iter()
            .map(|result| WebCitation {
                site: result.site_name.clone().filter(|s| !s.is_empty()),
                icon: result.icon.clone().filter(|s| !s.is_empty()),
                index: result.index,
                url: result.url.clone(),
                title: result.title.clone(),
            })
            .collect(),
    )
}

/// Compose a whole assistant turn from one response.
///
/// Content length is cached only when reply text is present.
pub fn reply_record(response: &GenerationResponse, now: DateTime<Utc>) -> ChatTurn {
    let content = reply_text(response).map(String::from);
    let content_len = content.as_deref().map(|text| text.chars().count());
    ChatTurn {
        timestamp: now,
        role: Role::Assistant,
        content,
        content_len,
        usage: token_usage(response),
        citations: web_citations(response),
        reasoning: reasoning_text(response).map(String::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn decode(body: serde_json::Value) -> GenerationResponse {
        serde_json::from_value(body).unwrap()
    }

    fn full_response() -> GenerationResponse {
        decode(json!({
            "output": {
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": "Paris is the capital.",
                        "reasoning_content": "The question asks for a capital."
                    },
                    "finish_reason": "stop"
                }],
                "search_info": {
                    "search_results": [
                        {
                            "site_name": "Wikipedia",
                            "icon": "https://wikipedia.org/favicon.ico",
                            "index": 1,
                            "url": "https://en.wikipedia.org/wiki/Paris",
                            "title": "Paris"
                        },
                        {
                            "site_name": "",
                            "icon": "",
                            "index": 2,
                            "url": "https://example.com",
                            "title": "Example"
                        }
                    ]
                }
            },
            "usage": {
                "total_tokens": 40,
                "input_tokens": 12,
                "output_tokens": 28,
                "output_tokens_details": { "reasoning_tokens": 9 }
            }
        }))
    }

    #[test]
    fn test_reply_text_present() {
        assert_eq!(
            reply_text(&full_response()),
            Some("Paris is the capital.")
        );
    }

    #[test]
    fn test_reply_text_absent_on_reasoning_only_chunk() {
        let chunk = decode(json!({
            "output": {
                "choices": [{ "message": { "reasoning_content": "thinking" } }]
            }
        }));
        assert_eq!(reply_text(&chunk), None);
        assert_eq!(reasoning_text(&chunk), Some("thinking"));
    }

    #[test]
    fn test_reply_text_empty_is_present() {
        let chunk = decode(json!({
            "output": { "choices": [{ "message": { "content": "" } }] }
        }));
        assert_eq!(reply_text(&chunk), Some(""));
    }

    #[test]
    fn test_reply_text_absent_without_choices() {
        let chunk = decode(json!({ "output": { "choices": [] } }));
        assert_eq!(reply_text(&chunk), None);
        assert_eq!(reply_text(&decode(json!({}))), None);
    }

    #[test]
    fn test_reasoning_empty_is_absent() {
        let chunk = decode(json!({
            "output": {
                "choices": [{ "message": { "content": "x", "reasoning_content": "" } }]
            }
        }));
        assert_eq!(reasoning_text(&chunk), None);
    }

    #[test]
    fn test_token_usage_full() {
        let usage = token_usage(&full_response()).unwrap();
        assert_eq!(usage.total, 40);
        assert_eq!(usage.input, 12);
        assert_eq!(usage.output, 28);
        assert_eq!(usage.output_reasoning, Some(9));
    }

    #[test]
    fn test_token_usage_without_details() {
        let chunk = decode(json!({
            "usage": { "total_tokens": 5, "input_tokens": 3, "output_tokens": 2 }
        }));
        let usage = token_usage(&chunk).unwrap();
        assert_eq!(usage.output_reasoning, None);
    }

    #[test]
    fn test_token_usage_absent() {
        assert!(token_usage(&decode(json!({}))).is_none());
    }

    #[test]
    fn test_web_citations_normalize_empty_strings() {
        let citations = web_citations(&full_response()).unwrap();
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].site.as_deref(), Some("Wikipedia"));
        assert_eq!(citations[1].site, None);
        assert_eq!(citations[1].icon, None);
        assert_eq!(citations[1].url, "https://example.com");
    }

    #[test]
    fn test_web_citations_empty_list_is_absent() {
        let chunk = decode(json!({
            "output": { "choices": [], "search_info": { "search_results": [] } }
        }));
        assert!(web_citations(&chunk).is_none());
    }

    #[test]
    fn test_web_citations_absent_without_search_info() {
        let chunk = decode(json!({ "output": { "choices": [] } }));
        assert!(web_citations(&chunk).is_none());
    }

    #[test]
    fn test_full_record_matches_individual_extractors() {
        let response = full_response();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let record = reply_record(&response, now);

        assert_eq!(record.role, Role::Assistant);
        assert_eq!(record.timestamp, now);
        assert_eq!(record.content.as_deref(), reply_text(&response));
        assert_eq!(
            record.content_len,
            reply_text(&response).map(|t| t.chars().count())
        );
        assert_eq!(record.usage, token_usage(&response));
        assert_eq!(record.citations, web_citations(&response));
        assert_eq!(record.reasoning.as_deref(), reasoning_text(&response));
    }

    #[test]
    fn test_full_record_without_text_has_no_length() {
        let chunk = decode(json!({
            "output": {
                "choices": [{ "message": { "reasoning_content": "only thoughts" } }]
            }
        }));
        let record = reply_record(&chunk, Utc::now());
        assert_eq!(record.content, None);
        assert_eq!(record.content_len, None);
        assert_eq!(record.reasoning.as_deref(), Some("only thoughts"));
    }
}
