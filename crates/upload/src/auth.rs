//! Bearer token claims.
//!
//! The multipart init call needs the owner's `user_id`, which the server
//! embeds in the JWT it issues at login. The payload is decoded locally
//! without signature verification; the server verifies the token on every
//! request anyway.

use base64::Engine;
use serde::Deserialize;

use crate::error::UploadError;

/// Claims the upload core reads from a token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
    pub user_id: u64,
    #[serde(default)]
    pub username: Option<String>,
    /// Expiry as a unix timestamp.
    #[serde(default)]
    pub exp: Option<i64>,
}

impl TokenClaims {
    /// Decodes the payload segment of a JWT.
    pub fn from_token(token: &str) -> Result<Self, UploadError> {
        let token = token.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token);
        if token.is_empty() {
            return Err(UploadError::Auth("login required".into()));
        }

        let mut parts = token.split('.');
        let (Some(_header), Some(payload), Some(_signature)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(UploadError::Auth("token is not a JWT".into()));
        };

        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| UploadError::Auth(format!("token payload is not base64url: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| UploadError::Auth(format!("token payload has no user_id: {e}")))
    }

    /// `user_id` from an optional token; `None` means not logged in.
    pub fn user_id(token: Option<&str>) -> Result<u64, UploadError> {
        let token = token.ok_or_else(|| UploadError::Auth("login required".into()))?;
        Ok(Self::from_token(token)?.user_id)
    }
}
