// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Behavioral specifications for Tidemark.
//!
//! These tests drive whole components against the fake broker and an
//! on-disk store, and check what an operator would observe: store
//! contents, broker calls and the lines a subscriber receives.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

// recovery/
#[path = "specs/recovery/offsets.rs"]
mod recovery_offsets;

// cache/
#[path = "specs/cache/fold.rs"]
mod cache_fold;

// fanout/
#[path = "specs/fanout/subscribers.rs"]
mod fanout_subscribers;
