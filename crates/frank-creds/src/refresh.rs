//! OAuth token refresh over the issuer's `grant_type=refresh_token`
//! endpoint (`spec.md` §4.6). Only `AssistantOauthBackend` uses this --
//! file-set and API-key variants never refresh.

use async_trait::async_trait;
use chrono::Utc;
use frank_core::error::CoreError;
use frank_core::types::OauthFields;
use serde::Deserialize;

#[async_trait]
pub trait OauthRefresher: Send + Sync {
    async fn refresh(&self, current: &OauthFields) -> Result<OauthFields, CoreError>;
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

/// Talks to a real OAuth token endpoint via `reqwest`, matching the
/// teacher's use of `reqwest` at `at-intelligence`'s provider edges.
pub struct HttpOauthRefresher {
    client: reqwest::Client,
    token_endpoint: String,
    client_id: String,
}

impl HttpOauthRefresher {
    pub fn new(token_endpoint: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), token_endpoint: token_endpoint.into(), client_id: client_id.into() }
    }
}

#[async_trait]
impl OauthRefresher for HttpOauthRefresher {
    async fn refresh(&self, current: &OauthFields) -> Result<OauthFields, CoreError> {
        let response = self
            .client
            .post(&self.token_endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", current.refresh_token.as_str()),
                ("client_id", self.client_id.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CoreError::Transient(format!("oauth refresh request: {e}")))?;

        if !response.status().is_success() {
            return Err(CoreError::AuthzDenied(format!(
                "oauth refresh rejected with status {}",
                response.status()
            )));
        }

        let parsed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| CoreError::InvalidArgument(format!("oauth refresh response: {e}")))?;

        Ok(OauthFields {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token.unwrap_or_else(|| current.refresh_token.clone()),
            expires_at_ms: Utc::now().timestamp_millis() + parsed.expires_in * 1000,
        })
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Deterministic in-memory refresher for tests: each call extends the
    /// expiry by one hour and bumps the access token so callers can observe
    /// that refresh actually ran.
    pub struct FakeRefresher {
        pub calls: AtomicU32,
    }

    impl FakeRefresher {
        pub fn new() -> Self {
            Self { calls: AtomicU32::new(0) }
        }

        pub fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OauthRefresher for FakeRefresher {
        async fn refresh(&self, current: &OauthFields) -> Result<OauthFields, CoreError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(OauthFields {
                access_token: format!("refreshed-token-{n}"),
                refresh_token: current.refresh_token.clone(),
                expires_at_ms: Utc::now().timestamp_millis() + 60 * 60 * 1000,
            })
        }
    }
}
