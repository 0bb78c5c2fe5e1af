use crate::auth::keys::{KeyFetchError, PublicKeyCache};
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Tolerated clock skew for `auth_time`.
const AUTH_TIME_LEEWAY_SECS: u64 = 300;

#[derive(Error, Debug)]
pub enum TokenVerificationError {
    #[error("Key fetch error: {0}")]
    KeyFetchError(#[from] KeyFetchError),
    #[error("JWT validation error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FirebaseTokenClaims {
    pub aud: String,
    pub iss: String,
    pub sub: String,
    pub exp: u64,
    pub iat: u64,
    pub auth_time: u64,
    #[serde(default)]
    pub user_id: String,
    #[serde(flatten)]
    pub claims: serde_json::Map<String, serde_json::Value>,
}

/// Verifies Firebase ID tokens.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<FirebaseTokenClaims, TokenVerificationError>;
}

/// Verifies RS256 ID tokens against Google's published signing keys.
pub struct IdTokenVerifier {
    project_id: String,
    keys: PublicKeyCache,
}

impl IdTokenVerifier {
    pub fn new(project_id: String) -> Self {
        Self::with_key_cache(project_id, PublicKeyCache::new())
    }

    pub fn with_key_cache(project_id: String, keys: PublicKeyCache) -> Self {
        Self { project_id, keys }
    }
}

#[async_trait]
impl TokenVerifier for IdTokenVerifier {
    async fn verify(&self, token: &str) -> Result<FirebaseTokenClaims, TokenVerificationError> {
        let header = decode_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| TokenVerificationError::InvalidToken("Missing kid in header".to_string()))?;

        let public_key_pem = self.keys.get_key(&kid).await?;
        let key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[format!("https://securetoken.google.com/{}", self.project_id)]);

        let claims = decode::<FirebaseTokenClaims>(token, &key, &validation)?.claims;

        if claims.sub.is_empty() {
            return Err(TokenVerificationError::InvalidToken(
                "Subject (sub) claim must not be empty".to_string(),
            ));
        }

        let now = chrono::Utc::now().timestamp().max(0) as u64;
        if claims.auth_time > now + AUTH_TIME_LEEWAY_SECS {
            return Err(TokenVerificationError::InvalidToken(
                "Auth time is in the future".to_string(),
            ));
        }

        Ok(claims)
    }
}
