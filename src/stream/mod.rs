// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming response handling
//!
//! Demultiplexes one event-line stream into separately consumable reply and
//! reasoning streams over a shared cursor.

pub mod demux;

pub use demux::*;
