//! OAuth2 access tokens for the Google APIs.
//!
//! Tokens come from a service account key (JWT bearer grant) when
//! `GOOGLE_APPLICATION_CREDENTIALS` is set, otherwise from the metadata server
//! the function runs next to. Either way the token is cached until shortly
//! before it expires.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Tokens are refreshed this many seconds before they expire.
const EXPIRY_MARGIN_SECS: u64 = 60;

#[derive(Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: Option<String>,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: u64,
}

#[derive(Clone)]
enum Source {
    ServiceAccount(ServiceAccountKey),
    Metadata { url: String },
    Static(String),
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Shared, cheaply cloneable access token provider.
#[derive(Clone)]
pub struct TokenSource {
    source: Source,
    cache: Arc<Mutex<Option<CachedToken>>>,
}

impl TokenSource {
    /// Load a service account JSON key from disk.
    pub fn from_key_file(path: &Path) -> Result<Self> {
        let key_json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read service account key {:?}", path))?;
        let key: ServiceAccountKey = serde_json::from_str(&key_json)
            .with_context(|| format!("Failed to parse service account key {:?}", path))?;
        info!("Using service account {} for Google APIs", key.client_email);
        Ok(Self::new(Source::ServiceAccount(key)))
    }

    /// Use the instance metadata server at `host`.
    pub fn metadata(host: &str) -> Self {
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host)
        };
        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/token",
            base
        );
        Self::new(Source::Metadata { url })
    }

    /// A fixed token, never refreshed.
    pub fn fixed(token: impl Into<String>) -> Self {
        Self::new(Source::Static(token.into()))
    }

    fn new(source: Source) -> Self {
        Self {
            source,
            cache: Arc::new(Mutex::new(None)),
        }
    }

    /// Get a valid access token, refreshing if expired.
    pub async fn access_token(&self, client: &reqwest::Client) -> Result<String> {
        let mut cache = self.cache.lock().await;
        if let Some(ref cached) = *cache {
            if now_secs() < cached.expires_at.saturating_sub(EXPIRY_MARGIN_SECS) {
                return Ok(cached.access_token.clone());
            }
        }

        let now = now_secs();
        let resp = match &self.source {
            Source::ServiceAccount(key) => exchange_jwt(client, key, now).await?,
            Source::Metadata { url } => fetch_from_metadata(client, url).await?,
            Source::Static(token) => return Ok(token.clone()),
        };
        debug!("Fetched access token valid for {}s", resp.expires_in);

        let token = resp.access_token.clone();
        *cache = Some(CachedToken {
            access_token: resp.access_token,
            expires_at: now + resp.expires_in,
        });
        Ok(token)
    }
}

async fn exchange_jwt(
    client: &reqwest::Client,
    key: &ServiceAccountKey,
    now: u64,
) -> Result<TokenResponse> {
    let token_uri = key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
    let claims = serde_json::json!({
        "iss": key.client_email,
        "scope": CLOUD_PLATFORM_SCOPE,
        "aud": token_uri,
        "iat": now,
        "exp": now + 3600,
    });

    let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
    let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .context("Invalid RSA private key in service account JSON")?;
    let jwt =
        jsonwebtoken::encode(&header, &claims, &encoding_key).context("Failed to encode JWT")?;

    client
        .post(token_uri)
        .form(&[
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", &jwt),
        ])
        .send()
        .await
        .context("Token exchange request failed")?
        .error_for_status()
        .context("Token exchange returned error")?
        .json()
        .await
        .context("Failed to parse token response")
}

async fn fetch_from_metadata(client: &reqwest::Client, url: &str) -> Result<TokenResponse> {
    client
        .get(url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .context("Metadata server token request failed")?
        .error_for_status()
        .context("Metadata server returned error")?
        .json()
        .await
        .context("Failed to parse metadata token response")
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

    #[tokio::test]
    async fn test_fixed_token() {
        let source = TokenSource::fixed("abc");
        let token = source.access_token(&reqwest::Client::new()).await.unwrap();
        assert_eq!(token, "abc");
    }

    #[tokio::test]
    async fn test_metadata_token_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.meta",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = TokenSource::metadata(&server.uri());
        let client = reqwest::Client::new();
        assert_eq!(source.access_token(&client).await.unwrap(), "ya29.meta");
        assert_eq!(source.access_token(&client).await.unwrap(), "ya29.meta");
    }

    #[tokio::test]
    async fn test_metadata_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = TokenSource::metadata(&server.uri());
        assert!(source.access_token(&reqwest::Client::new()).await.is_err());
    }

    #[test]
    fn test_missing_key_file() {
        let result = TokenSource::from_key_file(Path::new("/nonexistent/key.json"));
        assert!(result.is_err());
    }
}
