//! Request authentication.
//!
//! A request is authenticated when it carries a configured API token, either
//! as `Authorization: Bearer <token>` or in the `payload-token` cookie.

use std::collections::HashSet;
use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use changefeed_core::error::DomainError;
use changefeed_core::host::AccessRule;

use crate::error::ApiError;
use crate::state::AppState;

/// Name of the session cookie carrying the token.
pub const TOKEN_COOKIE: &str = "payload-token";

/// The set of accepted API tokens.
#[derive(Debug, Clone, Default)]
pub struct ApiTokens(HashSet<String>);

impl ApiTokens {
    #[must_use]
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self(tokens.into_iter().collect())
    }

    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }
}

/// Where the credential of an authenticated request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Header,
    Cookie,
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub source: CredentialSource,
}

/// The caller, if the request is authenticated. Never rejects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaybeUser(pub Option<AuthUser>);

impl MaybeUser {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.0.is_some()
    }

    /// Checks `rule` for this caller.
    ///
    /// # Errors
    ///
    /// Returns a `Forbidden` error naming `action` when the rule denies it.
    pub fn authorize(&self, rule: AccessRule, action: &str) -> Result<(), ApiError> {
        if rule.allows(self.is_authenticated()) {
            Ok(())
        } else {
            Err(DomainError::Forbidden(format!("not allowed to {action} event records")).into())
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn cookie_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find_map(|(name, value)| (name == TOKEN_COOKIE).then_some(value))
}

/// Resolves the caller from request headers.
#[must_use]
pub fn authenticate(headers: &HeaderMap, tokens: &ApiTokens) -> Option<AuthUser> {
    if let Some(token) = bearer_token(headers) {
        if tokens.contains(token) {
            return Some(AuthUser {
                source: CredentialSource::Header,
            });
        }
    }
    cookie_token(headers)
        .filter(|token| tokens.contains(token))
        .map(|_| AuthUser {
            source: CredentialSource::Cookie,
        })
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(authenticate(&parts.headers, &state.tokens)))
    }
}
