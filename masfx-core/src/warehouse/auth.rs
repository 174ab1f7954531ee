//! Service-account credentials and OAuth2 access tokens.
//!
//! The key is resolved and validated once at startup, so a malformed key
//! file fails the run before any network call. Tokens come from the
//! JWT-bearer grant and are cached until shortly before they expire.

use crate::config::CredentialSource;
use crate::error::EtlError;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Refresh a cached token this long before its stated expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// The fields of a service-account key file that the token grant needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub key_type: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".into()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("key_type", &self.key_type)
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    /// Resolve the key named by the configured credential source.
    pub fn resolve(source: &CredentialSource) -> Result<Self, EtlError> {
        match source {
            CredentialSource::File { path } => Self::from_file(path),
            CredentialSource::Env { var } => {
                let path = std::env::var_os(var).ok_or_else(|| {
                    EtlError::AuthConfiguration(format!("environment variable {var} is not set"))
                })?;
                Self::from_file(Path::new(&path))
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, EtlError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EtlError::AuthConfiguration(format!("read key file {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate a key file's JSON content.
    pub fn from_json(content: &str) -> Result<Self, EtlError> {
        let key: Self = serde_json::from_str(content)
            .map_err(|e| EtlError::AuthConfiguration(format!("malformed key JSON: {e}")))?;

        if key.key_type != "service_account" {
            return Err(EtlError::AuthConfiguration(format!(
                "expected key type 'service_account', found '{}'",
                key.key_type
            )));
        }
        if key.client_email.trim().is_empty() {
            return Err(EtlError::AuthConfiguration("client_email is empty".into()));
        }
        key.encoding_key()?;
        Ok(key)
    }

    fn encoding_key(&self) -> Result<EncodingKey, EtlError> {
        EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| EtlError::AuthConfiguration(format!("invalid private key: {e}")))
    }
}

/// JWT claim set for the bearer grant.
#[derive(Debug, Serialize, Deserialize)]
pub struct GrantClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Fetches and caches access tokens for one service account.
pub struct TokenProvider {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    scope: String,
    http: reqwest::blocking::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(key: ServiceAccountKey, http: reqwest::blocking::Client) -> Result<Self, EtlError> {
        let encoding_key = key.encoding_key()?;
        Ok(Self {
            key,
            encoding_key,
            scope: CLOUD_PLATFORM_SCOPE.to_string(),
            http,
            cached: Mutex::new(None),
        })
    }

    pub fn key(&self) -> &ServiceAccountKey {
        &self.key
    }

    /// Signed grant assertion issued at `now` (unix seconds).
    pub fn assertion(&self, now: i64) -> Result<String, EtlError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        let claims = GrantClaims {
            iss: self.key.client_email.clone(),
            scope: self.scope.clone(),
            aud: self.key.token_uri.clone(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| EtlError::AuthConfiguration(format!("sign grant assertion: {e}")))
    }

    /// A valid access token, fetching a new one when the cached one is stale.
    pub fn access_token(&self) -> Result<String, EtlError> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| EtlError::Warehouse("token cache lock poisoned".into()))?;

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.token.clone());
            }
        }

        let fresh = self.exchange()?;
        let token = fresh.access_token.clone();
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            token: fresh.access_token,
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token)
    }

    fn exchange(&self) -> Result<TokenResponse, EtlError> {
        debug!(token_uri = %self.key.token_uri, client = %self.key.client_email, "requesting access token");
        let assertion = self.assertion(chrono::Utc::now().timestamp())?;

        let resp = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .map_err(|e| EtlError::Warehouse(format!("token request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(EtlError::Warehouse(format!(
                "token exchange rejected (HTTP {status}): {body}"
            )));
        }

        resp.json()
            .map_err(|e| EtlError::Warehouse(format!("malformed token response: {e}")))
    }
}
