// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parley integration tests.
//!
//! Provides an in-memory broker and REST service so transport and session
//! behaviour can be exercised deterministically, without a network.
//!
//! # Components
//!
//! - [`MockBroker`] - In-memory STOMP broker behind the transport connector seam
//! - [`MockFallback`] - REST fallback service with capture and failure injection
//! - [`TestHarness`] - Transport client wired to both mocks with fast timings

pub mod harness;
pub mod mock_broker;
pub mod mock_fallback;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_broker::MockBroker;
pub use mock_fallback::MockFallback;
