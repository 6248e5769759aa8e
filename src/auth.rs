//! Caller authentication.
//!
//! The spreadsheet add-in forwards the signed-in user's OAuth token in the `Authorization`
//! header. The token is resolved into an email address through the identity provider's
//! userinfo endpoint, and the email's domain must be one of the configured allowed domains.

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::AppState;
use anyhow::Context;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use serde::Deserialize;
use std::sync::Arc;

/// The authenticated caller.
#[derive(Clone, Debug, Deserialize)]
pub struct User {
    pub email: String,
}

#[derive(Clone)]
pub struct IdentityVerifier {
    client: reqwest::Client,
    userinfo_url: String,
}

impl IdentityVerifier {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build identity client")?;

        Ok(Self {
            client,
            userinfo_url: config.userinfo_url.clone(),
        })
    }

    /// Resolves a token into the user it was issued to.
    pub async fn verify(&self, token: &str) -> Result<User, ApiError> {
        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(token)
            .send()
            .await
            .context("Failed to reach identity provider")?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Identity provider rejected token");
            return Err(ApiError::Unauthorized);
        }

        response.json::<User>().await.map_err(|e| {
            tracing::warn!("Malformed identity provider response: {}", e);
            ApiError::Unauthorized
        })
    }
}

/// Extracts the token from `Authorization: Bearer <token>` or a bare `Authorization: <token>`.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = match value.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ if value.eq_ignore_ascii_case("bearer") => "",
        _ => value,
    };
    (!token.is_empty()).then_some(token)
}

impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(ApiError::Unauthorized)?;
        let user = state.verifier.verify(token).await?;

        if !state.config.is_allowed_email(&user.email) {
            tracing::warn!(email = %user.email, "Rejected caller outside allowed domains");
            return Err(ApiError::Forbidden(user.email));
        }

        Ok(user)
    }
}
