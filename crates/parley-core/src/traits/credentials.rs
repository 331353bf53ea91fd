// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer credential source.

use secrecy::SecretString;

/// Supplies the current bearer token.
///
/// The core never refreshes tokens; it asks for the current value on every
/// connect attempt and every fallback request.
pub trait CredentialProvider: Send + Sync + 'static {
    /// Returns the current token, or `None` when the user is not signed in.
    fn bearer_token(&self) -> Option<SecretString>;
}

/// A fixed token, for CLIs and tests.
#[derive(Clone)]
pub struct StaticToken(Option<SecretString>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(SecretString::from(token.into())))
    }

    /// A provider that never has a token.
    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StaticToken")
            .field(&self.0.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl CredentialProvider for StaticToken {
    fn bearer_token(&self) -> Option<SecretString> {
        self.0.clone()
    }
}
