//! Environment-driven configuration.
//!
//! Process settings are read once at startup into [`Settings`]. The result
//! bucket is deliberately not part of them: [`ResultBucket`] re-reads it on
//! every qualifying invocation.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

pub const RESULT_BUCKET_VAR: &str = "RESULT_BUCKET";

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_VISION_ENDPOINT: &str = "https://vision.googleapis.com";
const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";
const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

/// Process-wide settings for the HTTP host and the Google API clients.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub vision_endpoint: String,
    pub storage_endpoint: String,
    /// Pre-issued OAuth token, e.g. from `gcloud auth print-access-token`.
    pub access_token: Option<String>,
    /// Service account key file; `None` means use the metadata server.
    pub credentials_path: Option<PathBuf>,
    pub metadata_host: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            vision_endpoint: DEFAULT_VISION_ENDPOINT.to_string(),
            storage_endpoint: DEFAULT_STORAGE_ENDPOINT.to_string(),
            access_token: None,
            credentials_path: None,
            metadata_host: DEFAULT_METADATA_HOST.to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let port = match non_empty_var("PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("PORT is not a valid port number: {:?}", raw))?,
            None => defaults.port,
        };

        Ok(Self {
            port,
            vision_endpoint: non_empty_var("VISION_ENDPOINT")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.vision_endpoint),
            storage_endpoint: non_empty_var("STORAGE_ENDPOINT")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.storage_endpoint),
            access_token: non_empty_var("GOOGLE_OAUTH_ACCESS_TOKEN"),
            credentials_path: non_empty_var("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from),
            metadata_host: non_empty_var("GCE_METADATA_HOST").unwrap_or(defaults.metadata_host),
        })
    }
}

/// Where the result bucket name comes from.
#[derive(Debug, Clone)]
pub enum ResultBucket {
    /// Read `RESULT_BUCKET` from the process environment at call time.
    FromEnv,
    Fixed(String),
}

impl ResultBucket {
    /// Current bucket name; empty when unset.
    pub fn resolve(&self) -> String {
        match self {
            ResultBucket::FromEnv => env::var(RESULT_BUCKET_VAR).unwrap_or_default(),
            ResultBucket::Fixed(name) => name.clone(),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_bucket() {
        assert_eq!(ResultBucket::Fixed("texts".into()).resolve(), "texts");
        assert_eq!(ResultBucket::Fixed(String::new()).resolve(), "");
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.vision_endpoint, "https://vision.googleapis.com");
        assert_eq!(settings.storage_endpoint, "https://storage.googleapis.com");
        assert!(settings.credentials_path.is_none());
    }
}
