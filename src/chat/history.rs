// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Bounded per-conversation history
//!
//! Turns are kept per opaque conversation key, ordered by timestamp, and
//! trimmed from the oldest end by a character budget and/or a maximum age.
//! Per-call limits are three-state: inherit the store default, switch the
//! limit off, or set an explicit value.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::chat::turn::{ChatTurn, HistoryInput, Role, SharedTurn};
use crate::clock::Clock;

/// Per-call limit override with an explicit "no limit" state.
///
/// `Inherit` falls back to the store-level default; `Off` disables the limit
/// for this call even when a default is configured; `Set` replaces it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LimitOverride<T> {
    /// Use the store's configured default
    #[default]
    Inherit,
    /// No limit for this call
    Off,
    /// Explicit limit for this call
    Set(T),
}

impl<T> LimitOverride<T> {
    /// Resolve against a store-level default.
    pub fn resolve(self, default: Option<T>) -> Option<T> {
        match self {
            LimitOverride::Inherit => default,
            LimitOverride::Off => None,
            LimitOverride::Set(value) => Some(value),
        }
    }
}

/// Bounded in-memory log of chat turns, keyed by conversation.
pub struct ConversationHistory {
    clock: Arc<dyn Clock>,
    max_chars: Option<usize>,
    max_age: Option<Duration>,
    conversations: HashMap<String, Vec<SharedTurn>>,
}

impl ConversationHistory {
    /// Create a store with the given default limits.
    pub fn new(clock: Arc<dyn Clock>, max_chars: Option<usize>, max_age: Option<Duration>) -> Self {
        Self {
            clock,
            max_chars,
            max_age,
            conversations: HashMap::new(),
        }
    }

    /// Swap the clock shared with the owning session.
    pub(crate) fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    /// Append turns to a conversation and trim it to the default limits.
    ///
    /// Bare strings become user turns stamped with the current time. After
    /// insertion the sequence is re-sorted by timestamp (insertion order
    /// breaks ties) and eviction runs immediately.
    pub fn append(&mut self, key: &str, input: impl Into<HistoryInput>) {
        let now = self.clock.now();
        let turns: Vec<ChatTurn> = match input.into() {
            HistoryInput::Text(text) => vec![ChatTurn::user(text, now)],
            HistoryInput::Texts(texts) => texts
                .into_iter()
                .map(|text| ChatTurn::user(text, now))
                .collect(),
            HistoryInput::Seeds(seeds) => seeds
                .into_iter()
                .map(|seed| {
                    ChatTurn::new(
                        seed.role.unwrap_or(Role::User),
                        seed.content,
                        seed.timestamp.unwrap_or(now),
                    )
                })
                .collect(),
        };

        let entry = self.conversations.entry(key.to_string()).or_default();
        entry.extend(turns.into_iter().map(SharedTurn::new));
        entry.sort_by_key(SharedTurn::timestamp);
        Self::trim(entry, now, self.max_chars, self.max_age);
    }

    /// Read a conversation, trimmed to the resolved limits.
    ///
    /// With `delete` the trim is applied to storage; otherwise storage is
    /// untouched and only the returned copy is trimmed. The conversation
    /// entry is created lazily if the key was never seen.
    pub fn get(
        &mut self,
        key: &str,
        max_chars: LimitOverride<usize>,
        max_age: LimitOverride<Duration>,
        delete: bool,
    ) -> Vec<ChatTurn> {
        let max_chars = max_chars.resolve(self.max_chars);
        let max_age = max_age.resolve(self.max_age);
        let now = self.clock.now();

        let entry = self.conversations.entry(key.to_string()).or_default();
        if delete {
            Self::trim(entry, now, max_chars, max_age);
            entry.iter().map(SharedTurn::snapshot).collect()
        } else {
            let drop = Self::trim_boundary(entry, now, max_chars, max_age).unwrap_or(0);
            entry[drop..].iter().map(SharedTurn::snapshot).collect()
        }
    }

    /// Insert an already-built shared turn and trim to the default limits.
    ///
    /// Used for streaming replies, where the stored handle keeps filling in
    /// after insertion.
    pub(crate) fn push(&mut self, key: &str, turn: SharedTurn) {
        let now = self.clock.now();
        let entry = self.conversations.entry(key.to_string()).or_default();
        entry.push(turn);
        entry.sort_by_key(SharedTurn::timestamp);
        Self::trim(entry, now, self.max_chars, self.max_age);
    }

    /// True when no conversation has ever been touched.
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// True when the key has an entry, even an empty one.
    pub fn contains(&self, key: &str) -> bool {
        self.conversations.contains_key(key)
    }

    /// Number of turns currently retained for a key.
    pub fn turn_count(&self, key: &str) -> usize {
        self.conversations.get(key).map_or(0, Vec::len)
    }

    /// Number of turns to drop from the oldest end, if any limit is hit.
    ///
    /// Scans newest to oldest accumulating character length; the first turn
    /// that pushes the total over `max_chars`, or that is strictly older
    /// than `max_age`, is evicted together with everything older than it.
    fn trim_boundary(
        turns: &[SharedTurn],
        now: DateTime<Utc>,
        max_chars: Option<usize>,
        max_age: Option<Duration>,
    ) -> Option<usize> {
        let mut char_len: usize = 0;
        for (kept, turn) in turns.iter().rev().enumerate() {
            if let Some(limit) = max_chars {
                char_len += turn.char_len();
                if char_len > limit {
                    return Some(turns.len() - kept);
                }
            }
            if let Some(age) = max_age {
                if now - turn.timestamp() > age {
                    return Some(turns.len() - kept);
                }
            }
        }
        None
    }

    fn trim(
        turns: &mut Vec<SharedTurn>,
        now: DateTime<Utc>,
        max_chars: Option<usize>,
        max_age: Option<Duration>,
    ) {
        if let Some(drop) = Self::trim_boundary(turns, now, max_chars, max_age) {
            tracing::debug!("Evicting {} history turn(s) of {}", drop, turns.len());
            turns.drain(..drop);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::turn::TurnSeed;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn store_with(
        max_chars: Option<usize>,
        max_age: Option<Duration>,
    ) -> (Arc<ManualClock>, ConversationHistory) {
        let clock = Arc::new(ManualClock::new(start()));
        let history = ConversationHistory::new(clock.clone(), max_chars, max_age);
        (clock, history)
    }

    #[test]
    fn test_append_bare_string_round_trip() {
        let (_, mut history) = store_with(None, None);
        history.append("k", "hello");

        let turns = history.get("k", LimitOverride::Inherit, LimitOverride::Inherit, false);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content.as_deref(), Some("hello"));
        assert_eq!(turns[0].content_len, Some(5));
    }

    #[test]
    fn test_char_budget_keeps_newest_suffix() {
        let (clock, mut history) = store_with(Some(10), None);
        for text in ["aaaa", "bbbb", "cccc"] {
            history.append("k", text);
            clock.advance(Duration::seconds(1));
        }

        let turns = history.get("k", LimitOverride::Inherit, LimitOverride::Inherit, false);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content.as_deref(), Some("bbbb"));
        assert_eq!(turns[1].content.as_deref(), Some("cccc"));
    }

    #[test]
    fn test_newest_turn_over_budget_clears_all() {
        let (clock, mut history) = store_with(Some(5), None);
        history.append("k", "ok");
        clock.advance(Duration::seconds(1));
        history.append("k", "far too long for the budget");

        assert_eq!(history.turn_count("k"), 0);
    }

    #[test]
    fn test_age_eviction_strictly_older() {
        let (clock, mut history) = store_with(None, Some(Duration::seconds(60)));
        history.append("k", "old");
        clock.advance(Duration::seconds(60));
        history.append("k", "fresh");

        // Exactly max_age old: not strictly older, still retained.
        let turns = history.get("k", LimitOverride::Inherit, LimitOverride::Inherit, true);
        assert_eq!(turns.len(), 2);

        clock.advance(Duration::seconds(1));
        let turns = history.get("k", LimitOverride::Inherit, LimitOverride::Inherit, true);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content.as_deref(), Some("fresh"));
    }

    #[test]
    fn test_get_without_delete_keeps_storage() {
        let (clock, mut history) = store_with(None, None);
        for text in ["aaaa", "bbbb", "cccc"] {
            history.append("k", text);
            clock.advance(Duration::seconds(1));
        }

        let trimmed = history.get("k", LimitOverride::Set(8), LimitOverride::Inherit, false);
        assert_eq!(trimmed.len(), 2);
        assert_eq!(history.turn_count("k"), 3);

        let trimmed = history.get("k", LimitOverride::Set(8), LimitOverride::Inherit, true);
        assert_eq!(trimmed.len(), 2);
        assert_eq!(history.turn_count("k"), 2);
    }

    #[test]
    fn test_override_off_disables_default() {
        let (clock, mut history) = store_with(None, Some(Duration::seconds(60)));
        history.append("k", "old");
        clock.advance(Duration::seconds(90));

        let kept = history.get("k", LimitOverride::Inherit, LimitOverride::Off, false);
        assert_eq!(kept.len(), 1);

        let evicted = history.get("k", LimitOverride::Inherit, LimitOverride::Inherit, false);
        assert!(evicted.is_empty());
    }

    #[test]
    fn test_override_set_replaces_default() {
        let (clock, mut history) = store_with(None, None);
        for text in ["aaaa", "bbbb"] {
            history.append("k", text);
            clock.advance(Duration::seconds(1));
        }

        let turns = history.get("k", LimitOverride::Set(4), LimitOverride::Inherit, false);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content.as_deref(), Some("bbbb"));
    }

    #[test]
    fn test_get_creates_entry_lazily() {
        let (_, mut history) = store_with(None, None);
        assert!(!history.contains("k"));

        let turns = history.get("k", LimitOverride::Inherit, LimitOverride::Inherit, false);
        assert!(turns.is_empty());
        assert!(history.contains("k"));
    }

    #[test]
    fn test_appends_resort_by_timestamp() {
        let (clock, mut history) = store_with(None, None);
        let later = clock.now() + Duration::seconds(10);
        let earlier = clock.now() + Duration::seconds(5);
        history.append("k", TurnSeed::new("second").at(later));
        history.append("k", TurnSeed::new("first").at(earlier));

        let turns = history.get("k", LimitOverride::Inherit, LimitOverride::Inherit, false);
        assert_eq!(turns[0].content.as_deref(), Some("first"));
        assert_eq!(turns[1].content.as_deref(), Some("second"));
    }

    #[test]
    fn test_text_batch_becomes_user_turns() {
        let (_, mut history) = store_with(None, None);
        history.append("k", vec!["one", "two"]);

        let turns = history.get("k", LimitOverride::Inherit, LimitOverride::Inherit, false);
        assert_eq!(turns.len(), 2);
        assert!(turns.iter().all(|t| t.role == Role::User));
    }

    #[test]
    fn test_seed_role_defaults_to_user() {
        let (_, mut history) = store_with(None, None);
        history.append("k", TurnSeed::new("plain"));
        history.append("k", TurnSeed::new("reply").with_role(Role::Assistant));

        let turns = history.get("k", LimitOverride::Inherit, LimitOverride::Inherit, false);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Assistant);
    }

    #[test]
    fn test_keys_are_independent() {
        let (_, mut history) = store_with(Some(4), None);
        history.append("a", "aaaa");
        history.append("b", "bbbb");

        assert_eq!(history.turn_count("a"), 1);
        assert_eq!(history.turn_count("b"), 1);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn char_eviction_is_minimal(
                lens in proptest::collection::vec(0usize..20, 0..12),
                max in 1usize..60,
            ) {
                let clock = Arc::new(ManualClock::new(start()));
                let mut history =
                    ConversationHistory::new(clock.clone(), Some(max), None);
                for len in &lens {
                    history.append("k", "a".repeat(*len));
                    clock.advance(Duration::seconds(1));
                }

                let retained = history.get(
                    "k",
                    LimitOverride::Inherit,
                    LimitOverride::Inherit,
                    false,
                );
                let retained_sum: usize =
                    retained.iter().map(ChatTurn::char_len).sum();
                prop_assert!(retained_sum <= max);

                // Minimality: the newest evicted turn would not have fit.
                let dropped = lens.len() - retained.len();
                if dropped > 0 {
                    let newest_dropped = lens[dropped - 1];
                    prop_assert!(retained_sum + newest_dropped > max);
                }
            }
        }
    }
}
