// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! REST fallback service for Parley.
//!
//! [`FallbackClient`] implements [`parley_core::FallbackService`] over the
//! messaging service's HTTP API. It is used whenever the realtime transport
//! cannot deliver, and for loading conversation history.

pub mod client;
pub mod types;

pub use client::FallbackClient;
