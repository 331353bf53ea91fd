// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parley realtime messaging client.
//!
//! This crate provides the message envelope model, broker topic naming, the
//! shared error type, and the collaborator traits (credentials and the REST
//! fallback service) used throughout the workspace.

pub mod error;
pub mod topics;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ParleyError;
pub use traits::{CredentialProvider, FallbackService, StaticToken};
pub use types::{
    ConversationId, ConversationSummary, Envelope, EnvelopeKind, MessageId, UserId,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parley_error_has_all_variants() {
        let _config = ParleyError::Config("test".into());
        let _transport = ParleyError::Transport {
            message: "test".into(),
            source: None,
        };
        let _fallback = ParleyError::Fallback {
            message: "test".into(),
            status: Some(503),
            source: Some(Box::new(std::io::Error::other("test"))),
        };
        let _invalid = ParleyError::InvalidEnvelope("test".into());
        let _unauth = ParleyError::Unauthenticated;
        let _timeout = ParleyError::Timeout {
            duration: std::time::Duration::from_secs(5),
        };
        let _internal = ParleyError::Internal("test".into());
    }

    #[test]
    fn envelope_kind_display_round_trip() {
        use std::str::FromStr;

        for kind in [EnvelopeKind::Message, EnvelopeKind::Delete] {
            let s = kind.to_string();
            assert_eq!(EnvelopeKind::from_str(&s).unwrap(), kind);
        }
    }

    #[test]
    fn all_traits_are_object_safe() {
        fn _assert_fallback(_: &dyn FallbackService) {}
        fn _assert_credentials(_: &dyn CredentialProvider) {}
    }
}
