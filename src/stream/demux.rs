// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Stream demultiplexer
//!
//! Splits one live event-line stream into a reasoning-text stream and a
//! reply-text stream. Both handles pull from the same cursor behind an async
//! mutex; the reasoning stream must be exhausted before the reply stream
//! will produce anything, unless the seed chunk carried no reasoning at all.
//! When the source is exhausted the accumulated reply turn is completed and
//! handed to the persistence sink exactly once. A caller that stops pulling
//! forfeits that hand-off; partial streams are never persisted.

use std::pin::Pin;
use std::sync::Arc;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use tokio::sync::Mutex;

use crate::chat::turn::SharedTurn;
use crate::clock::Clock;
use crate::error::{ProtocolError, Result, TongyiError};
use crate::persist::{PersistenceSink, RecordDraft};
use crate::protocol::extract;
use crate::protocol::wire::GenerationResponse;
use crate::transport::LineStream;

/// Stream of reply-text fragments
pub type ReplyStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Stream of reasoning-text fragments
pub type ReasoningStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Demultiplexer over one underlying event-line stream.
pub struct StreamDemux {
    record: SharedTurn,
    shared: Arc<Mutex<DemuxInner>>,
}

impl StreamDemux {
    /// Seed the cursor from the first data line of the stream.
    ///
    /// Non-data lines before it are discarded; a stream with no data line at
    /// all is a protocol error. The returned demux already holds the seed
    /// content, reasoning, usage and citations in its reply turn.
    pub async fn seed(
        mut lines: LineStream,
        draft: RecordDraft,
        sink: Option<Arc<dyn PersistenceSink>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let chunk = loop {
            match lines.next().await {
                Some(line) => {
                    let line = line?;
                    if let Some(payload) = data_payload(&line) {
                        break decode_chunk(payload)?;
                    }
                }
                None => return Err(ProtocolError::NoData.into()),
            }
        };

        let record = SharedTurn::new(extract::reply_record(&chunk, clock.now()));
        let seed_reasoning = extract::reasoning_text(&chunk).map(String::from);
        let reasoning_open = seed_reasoning.is_some();
        tracing::debug!(
            "Seeded response stream (reasoning: {})",
            reasoning_open
        );

        Ok(Self {
            record: record.clone(),
            shared: Arc::new(Mutex::new(DemuxInner {
                lines,
                record,
                draft,
                sink,
                clock,
                reasoning_open,
                seed_reasoning,
                seed_replayed: false,
                source_done: false,
                persisted: false,
            })),
        })
    }

    /// Handle to the reply turn that fills in as the streams are drained.
    pub fn record(&self) -> SharedTurn {
        self.record.clone()
    }

    /// Split into the reply and reasoning stream handles.
    ///
    /// Pulls are serialized on the shared cursor, so the handles may be held
    /// by different tasks; a reply pull while reasoning is undrained fails
    /// with [`TongyiError::ReasoningPending`] and finishes that handle.
    pub fn split(self) -> (ReplyStream, ReasoningStream) {
        let reply_shared = self.shared;
        let reasoning_shared = reply_shared.clone();

        let reasoning: ReasoningStream = Box::pin(try_stream! {
            loop {
                // Guard is dropped before yielding so the other handle
                // can make progress between pulls.
                let step = {
                    let mut inner = reasoning_shared.lock().await;
                    inner.next_reasoning().await?
                };
                match step {
                    Some(text) => yield text,
                    None => break,
                }
            }
        });

        let reply: ReplyStream = Box::pin(try_stream! {
            loop {
                let step = {
                    let mut inner = reply_shared.lock().await;
                    inner.next_reply().await?
                };
                match step {
                    Some(text) => yield text,
                    None => break,
                }
            }
        });

        (reply, reasoning)
    }
}

/// Cursor state shared by the two stream handles
struct DemuxInner {
    lines: LineStream,
    record: SharedTurn,
    draft: RecordDraft,
    sink: Option<Arc<dyn PersistenceSink>>,
    clock: Arc<dyn Clock>,
    /// Seed carried reasoning text that has not been closed out yet
    reasoning_open: bool,
    /// Seed reasoning text pending its first yield
    seed_reasoning: Option<String>,
    /// Accumulated content was already emitted as the first reply item
    seed_replayed: bool,
    source_done: bool,
    persisted: bool,
}

impl DemuxInner {
    /// Advance the reasoning stream by one fragment.
    ///
    /// A chunk without reasoning text closes the stream; its reply fragment,
    /// if any, is folded into the accumulated content so the reply stream
    /// picks it up.
    async fn next_reasoning(&mut self) -> Result<Option<String>> {
        if !self.reasoning_open {
            return Ok(None);
        }
        if let Some(seed) = self.seed_reasoning.take() {
            return Ok(Some(seed));
        }

        match self.next_chunk().await? {
            Some(chunk) => match extract::reasoning_text(&chunk) {
                Some(think) => {
                    self.record.append_reasoning(think);
                    Ok(Some(think.to_string()))
                }
                None => {
                    if let Some(text) = extract::reply_text(&chunk) {
                        if !text.is_empty() {
                            self.record.append_content(text);
                        }
                    }
                    self.reasoning_open = false;
                    tracing::debug!("Reasoning phase closed, switching to reply chunks");
                    Ok(None)
                }
            },
            None => {
                // Source died while reasoning was open; nothing more can
                // arrive, so the record is final.
                self.reasoning_open = false;
                self.finish().await?;
                Ok(None)
            }
        }
    }

    /// Advance the reply stream by one fragment.
    ///
    /// The first item replays the content accumulated so far (seed plus any
    /// folded transition fragment); metadata-only chunks are absorbed
    /// without producing an item.
    async fn next_reply(&mut self) -> Result<Option<String>> {
        if self.reasoning_open {
            return Err(TongyiError::ReasoningPending);
        }
        if !self.seed_replayed {
            self.seed_replayed = true;
            let accumulated = self.record.content().unwrap_or_default();
            if !accumulated.is_empty() {
                return Ok(Some(accumulated));
            }
        }

        loop {
            match self.next_chunk().await? {
                Some(chunk) => {
                    if let Some(text) = extract::reply_text(&chunk) {
                        if !text.is_empty() {
                            self.record.append_content(text);
                            return Ok(Some(text.to_string()));
                        }
                    }
                }
                None => {
                    self.finish().await?;
                    return Ok(None);
                }
            }
        }
    }

    /// Pull lines until the next decodable data chunk, absorbing metadata.
    async fn next_chunk(&mut self) -> Result<Option<GenerationResponse>> {
        if self.source_done {
            return Ok(None);
        }
        while let Some(line) = self.lines.next().await {
            let line = line?;
            let Some(payload) = data_payload(&line) else {
                continue;
            };
            let chunk = decode_chunk(payload)?;
            self.absorb_meta(&chunk);
            return Ok(Some(chunk));
        }
        self.source_done = true;
        Ok(None)
    }

    /// Token usage takes the latest non-absent value, citations the first.
    fn absorb_meta(&mut self, chunk: &GenerationResponse) {
        if let Some(usage) = extract::token_usage(chunk) {
            self.record.set_usage(usage);
        }
        if let Some(citations) = extract::web_citations(chunk) {
            self.record.merge_citations(citations);
        }
    }

    /// Complete the record and hand it to the sink, at most once.
    async fn finish(&mut self) -> Result<()> {
        if self.persisted {
            return Ok(());
        }
        self.persisted = true;
        tracing::debug!("Response stream exhausted, completing record");
        if let Some(sink) = &self.sink {
            let record = self.draft.complete(&self.record.snapshot(), self.clock.now());
            sink.write(&record).await?;
        }
        Ok(())
    }
}

/// Payload of a `data:` line whose body is a JSON object, if it is one.
fn data_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    let rest = rest.strip_prefix(' ').unwrap_or(rest);
    if rest.starts_with('{') {
        Some(rest.trim_end())
    } else {
        None
    }
}

fn decode_chunk(payload: &str) -> Result<GenerationResponse> {
    Ok(serde_json::from_str(payload).map_err(ProtocolError::Json)?)
}
