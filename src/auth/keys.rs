use reqwest::Client;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

const GOOGLE_PUBLIC_KEYS_URL: &str =
    "https://www.googleapis.com/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com";

// Used when the response carries no usable Cache-Control max-age.
const DEFAULT_MAX_AGE_SECS: u64 = 3600;

#[derive(Error, Debug)]
pub enum KeyFetchError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Unknown key id: {0}")]
    UnknownKey(String),
}

struct CachedKeys {
    keys: HashMap<String, String>,
    expires_at: Instant,
}

/// Google's ID token signing certificates (PEM, keyed by `kid`), refreshed
/// whenever the cached set expires or lacks the requested key.
pub struct PublicKeyCache {
    client: Client,
    url: String,
    cache: RwLock<Option<CachedKeys>>,
}

impl Default for PublicKeyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PublicKeyCache {
    pub fn new() -> Self {
        Self::with_url(GOOGLE_PUBLIC_KEYS_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            cache: RwLock::new(None),
        }
    }

    pub async fn get_key(&self, kid: &str) -> Result<String, KeyFetchError> {
        if let Some(key) = self.cached(kid).await {
            return Ok(key);
        }

        self.refresh().await?;

        self.cached(kid)
            .await
            .ok_or_else(|| KeyFetchError::UnknownKey(kid.to_string()))
    }

    async fn cached(&self, kid: &str) -> Option<String> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|cached| Instant::now() < cached.expires_at)
            .and_then(|cached| cached.keys.get(kid).cloned())
    }

    async fn refresh(&self) -> Result<(), KeyFetchError> {
        debug!(url = %self.url, "fetching token signing keys");
        let response = self.client.get(&self.url).send().await?.error_for_status()?;

        let max_age = response
            .headers()
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_max_age)
            .unwrap_or(DEFAULT_MAX_AGE_SECS);

        let keys: HashMap<String, String> = response.json().await?;

        *self.cache.write().await = Some(CachedKeys {
            keys,
            expires_at: Instant::now() + Duration::from_secs(max_age),
        });

        Ok(())
    }
}

fn parse_max_age(cache_control: &str) -> Option<u64> {
    cache_control
        .split(',')
        .find_map(|part| part.trim().strip_prefix("max-age="))
        .and_then(|secs| secs.parse().ok())
}
