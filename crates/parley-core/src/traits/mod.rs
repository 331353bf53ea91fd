// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits the messaging core calls into.
//!
//! Implementations live in their own crates (`parley-fallback` for the REST
//! service) or are supplied by the embedding application (credentials).

pub mod credentials;
pub mod fallback;

pub use credentials::{CredentialProvider, StaticToken};
pub use fallback::FallbackService;
