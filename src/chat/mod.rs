// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat sessions, turns and bounded history
//!
//! This module provides the conversation data model and the session
//! orchestrator that ties history, transport, streaming and persistence
//! together.

pub mod history;
pub mod session;
pub mod turn;

pub use history::{ConversationHistory, LimitOverride};
pub use session::{ChatOptions, ChatOutcome, ChatSession, SessionConfig};
pub use turn::{ChatTurn, HistoryInput, Role, SharedTurn, TokenUsage, TurnSeed, WebCitation};
