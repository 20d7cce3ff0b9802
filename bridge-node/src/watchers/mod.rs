// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

//! Long-lived observers of the external event sources. Each watcher owns a
//! replayable checkpoint in the status cursor table and publishes typed
//! events onto the bus. Delivery is at-least-once: checkpoints advance only
//! after the bus has accepted every emission of a batch, so handlers must be
//! idempotent on the domain identifiers.

pub mod burn;
pub mod credit;
pub mod topic;

/// Lifecycle of a watcher stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    CatchingUp,
    Streaming,
}
