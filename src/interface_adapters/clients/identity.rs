use crate::domain::Identity;
use crate::domain::errors::IdentityError;
use crate::domain::ports::IdentityProvider;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const MAX_TOKEN_LEN: usize = 4096;
const MAX_GUEST_ID_LEN: usize = 64;

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
}

// Identity service response for a valid token.
#[derive(Debug, Deserialize)]
struct VerifiedIdentity {
    id: String,
    #[serde(default)]
    display_name: String,
}

/// Thin reqwest client for the external identity service.
#[derive(Clone)]
pub struct IdentityClient {
    http: reqwest::Client,
    base_url: String,
}

impl IdentityClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl IdentityProvider for IdentityClient {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        let token = token.trim();
        if token.is_empty() || token.len() > MAX_TOKEN_LEN {
            return Err(IdentityError::InvalidToken);
        }

        let url = format!("{}/identity/verify", self.base_url);
        let response = self
            .http
            .post(url)
            .json(&VerifyRequest { token })
            .send()
            .await
            .map_err(|_| IdentityError::UpstreamUnavailable)?;

        match response.status() {
            status if status.is_success() => {
                let verified = response
                    .json::<VerifiedIdentity>()
                    .await
                    .map_err(|_| IdentityError::UpstreamUnavailable)?;
                let display_name = if verified.display_name.is_empty() {
                    verified.id.clone()
                } else {
                    verified.display_name
                };
                let identity = Identity::new(verified.id, display_name);
                if identity.is_valid() {
                    Ok(identity)
                } else {
                    Err(IdentityError::InvalidToken)
                }
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(IdentityError::InvalidToken),
            _ => Err(IdentityError::UpstreamUnavailable),
        }
    }
}

/// Accepts any short token as the participant id, optionally as `id:display name`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuestIdentity;

#[async_trait]
impl IdentityProvider for GuestIdentity {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        let token = token.trim();
        let (id, display_name) = match token.split_once(':') {
            Some((id, name)) if !name.trim().is_empty() => (id.trim(), name.trim()),
            Some((id, _)) => (id.trim(), id.trim()),
            None => (token, token),
        };

        if id.is_empty() || id.len() > MAX_GUEST_ID_LEN {
            return Err(IdentityError::InvalidToken);
        }
        Ok(Identity::new(id, display_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guest_tokens_become_identities() {
        let guest = GuestIdentity;
        assert_eq!(
            guest.verify("alice").await.ok(),
            Some(Identity::new("alice", "alice"))
        );
        assert_eq!(
            guest.verify(" bob:Bobby Tables ").await.ok(),
            Some(Identity::new("bob", "Bobby Tables"))
        );
        assert_eq!(
            guest.verify("carol:").await.ok(),
            Some(Identity::new("carol", "carol"))
        );
    }

    #[tokio::test]
    async fn blank_or_oversized_guest_tokens_are_refused() {
        let guest = GuestIdentity;
        assert!(matches!(guest.verify("   ").await, Err(IdentityError::InvalidToken)));
        assert!(matches!(guest.verify(":name").await, Err(IdentityError::InvalidToken)));
        let long = "x".repeat(MAX_GUEST_ID_LEN + 1);
        assert!(matches!(guest.verify(&long).await, Err(IdentityError::InvalidToken)));
    }

    #[tokio::test]
    async fn unreachable_identity_service_is_reported_as_unavailable() {
        let client = IdentityClient::new("http://127.0.0.1:9", Duration::from_millis(200))
            .expect("client builds");
        assert!(matches!(
            client.verify("token").await,
            Err(IdentityError::UpstreamUnavailable)
        ));
        assert!(matches!(client.verify("").await, Err(IdentityError::InvalidToken)));
    }
}
