use chrono::Duration;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use yup_oauth2::ServiceAccountKey;

const CUSTOM_TOKEN_AUDIENCE: &str =
    "https://identitytoolkit.googleapis.com/google.identity.identitytoolkit.v1.IdentityToolkit";

// Custom tokens are accepted for at most one hour.
const CUSTOM_TOKEN_LIFETIME_SECS: i64 = 3600;

const RESERVED_CLAIMS: &[&str] = &[
    "acr", "amr", "at_hash", "aud", "auth_time", "azp", "cnf", "c_hash", "exp", "firebase",
    "iat", "iss", "jti", "nbf", "nonce", "sub",
];

#[derive(Error, Debug)]
pub enum TokenSigningError {
    #[error("Invalid custom token argument: {0}")]
    InvalidArgument(String),
    #[error("JWT signing error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

/// Claims of a Firebase custom token, exchanged by clients for an ID token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomTokenClaims {
    pub aud: String,
    pub iss: String,
    pub sub: String,
    pub uid: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<Map<String, Value>>,
}

impl CustomTokenClaims {
    /// Builds the claims for `uid`, issued by `issuer` at `issued_at` (epoch seconds).
    pub fn new(
        issuer: &str,
        uid: &str,
        developer_claims: Option<Map<String, Value>>,
        issued_at: i64,
    ) -> Result<Self, TokenSigningError> {
        if uid.is_empty() || uid.chars().count() > 128 {
            return Err(TokenSigningError::InvalidArgument(
                "uid must be a non-empty string of at most 128 characters".to_string(),
            ));
        }

        if let Some(claims) = &developer_claims {
            if let Some(reserved) = claims.keys().find(|k| RESERVED_CLAIMS.contains(&k.as_str())) {
                return Err(TokenSigningError::InvalidArgument(format!(
                    "Developer claim '{}' is reserved",
                    reserved
                )));
            }
        }

        Ok(Self {
            aud: CUSTOM_TOKEN_AUDIENCE.to_string(),
            iss: issuer.to_string(),
            sub: issuer.to_string(),
            uid: uid.to_string(),
            iat: issued_at,
            exp: issued_at + CUSTOM_TOKEN_LIFETIME_SECS,
            claims: developer_claims.filter(|c| !c.is_empty()),
        })
    }

    /// Shortens the token lifetime. Custom tokens live at most one hour.
    pub fn expires_in(mut self, lifetime: Duration) -> Result<Self, TokenSigningError> {
        let secs = lifetime.num_seconds();
        if !(1..=CUSTOM_TOKEN_LIFETIME_SECS).contains(&secs) {
            return Err(TokenSigningError::InvalidArgument(format!(
                "Custom token lifetime must be between 1 and {} seconds, got {}",
                CUSTOM_TOKEN_LIFETIME_SECS, secs
            )));
        }
        self.exp = self.iat + secs;
        Ok(self)
    }
}

/// Signs custom tokens.
pub trait TokenSigner: Send + Sync {
    /// The service account email tokens are issued by.
    fn issuer(&self) -> &str;

    fn sign(&self, claims: &CustomTokenClaims) -> Result<String, TokenSigningError>;
}

/// Signs tokens with the RSA private key of a service account.
pub struct ServiceAccountSigner {
    client_email: String,
    private_key: String,
    key_id: Option<String>,
}

impl ServiceAccountSigner {
    pub fn new(key: &ServiceAccountKey) -> Self {
        Self {
            client_email: key.client_email.clone(),
            private_key: key.private_key.clone(),
            key_id: key.private_key_id.clone(),
        }
    }
}

impl TokenSigner for ServiceAccountSigner {
    fn issuer(&self) -> &str {
        &self.client_email
    }

    fn sign(&self, claims: &CustomTokenClaims) -> Result<String, TokenSigningError> {
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())?;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();

        Ok(encode(&header, claims, &key)?)
    }
}
