// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Upstream request and response protocol
//!
//! Serde types for the generation endpoint's wire format plus the tolerant
//! extractors that pull reply text, reasoning, usage and citations out of a
//! response without failing on absent parts.

pub mod extract;
pub mod wire;

pub use wire::{
    GenerationRequest, GenerationResponse, Parameters, SearchOptions, WireMessage,
};
