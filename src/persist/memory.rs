// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! In-memory persistence sink
//!
//! Reference sink implementation, mainly for tests and embedding. Records
//! accumulate in order and can be inspected at any time.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::Result;
use crate::persist::{CompletionRecord, PersistenceSink};

/// Sink that appends records to an in-memory list
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<CompletionRecord>>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all records written so far
    pub fn records(&self) -> Vec<CompletionRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Number of records written so far
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// True when nothing has been written
    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn write(&self, record: &CompletionRecord) -> Result<()> {
        tracing::debug!("Persisting completion record for model {}", record.model);
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
