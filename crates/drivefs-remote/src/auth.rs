//! OAuth 2.0 installed-application flow and token persistence.
//!
//! Credentials live in a small JSON file next to the config. The access token
//! is refreshed on demand and the file is rewritten after every change so a
//! restarted mount picks up where the last one left off.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::SyncError;

pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Redirect target for copy/paste authorization codes.
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Tokens this close to expiry are refreshed before use.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Everything persisted in the credentials file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// True when an access token exists and is not about to expire.
    pub fn has_fresh_token(&self, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(_), Some(expires_at)) => {
                expires_at - ChronoDuration::seconds(EXPIRY_MARGIN_SECS) > now
            }
            (Some(_), None) => true,
            _ => false,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Holds OAuth credentials and hands out valid access tokens.
pub struct TokenStore {
    path: PathBuf,
    client: Client,
    auth_url: String,
    token_url: String,
    credentials: Mutex<Credentials>,
}

impl TokenStore {
    /// Load credentials from `path`, or start empty if the file does not exist.
    /// A client id/secret from the config overrides the stored one.
    pub async fn load(
        path: impl Into<PathBuf>,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Result<Self, SyncError> {
        let path = path.into();
        let mut credentials = match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str::<Credentials>(&text).map_err(|e| {
                SyncError::Auth(format!(
                    "credentials file {} is not valid JSON: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Credentials::default(),
            Err(e) => return Err(e.into()),
        };

        if client_id.is_some() {
            credentials.client_id = client_id;
        }
        if client_secret.is_some() {
            credentials.client_secret = client_secret;
        }

        let client = Client::builder()
            .build()
            .map_err(|e| SyncError::Auth(format!("Failed to create HTTP client: {}", e)))?;

        Ok(TokenStore {
            path,
            client,
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            credentials: Mutex::new(credentials),
        })
    }

    /// Point the token exchange at another endpoint.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A copy of the current credentials.
    pub async fn credentials(&self) -> Credentials {
        self.credentials.lock().await.clone()
    }

    /// True if a refresh token is on file.
    pub async fn is_authorized(&self) -> bool {
        self.credentials.lock().await.refresh_token.is_some()
    }

    /// The URL the user visits to grant read access.
    pub async fn authorization_url(&self) -> Result<String, SyncError> {
        let creds = self.credentials.lock().await;
        let client_id = creds
            .client_id
            .as_deref()
            .ok_or_else(|| SyncError::Auth("no client_id configured".to_string()))?;

        Ok(format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&access_type=offline",
            self.auth_url,
            urlencoding::encode(client_id),
            urlencoding::encode(OOB_REDIRECT_URI),
            urlencoding::encode(DRIVE_READONLY_SCOPE),
        ))
    }

    /// Trade an authorization code for tokens and persist them.
    pub async fn exchange_code(&self, code: &str) -> Result<(), SyncError> {
        let mut creds = self.credentials.lock().await;
        let (client_id, client_secret) = client_pair(&creds)?;

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code.trim()),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("redirect_uri", OOB_REDIRECT_URI),
        ];
        let token = self.request_token(&form).await?;
        apply_token(&mut creds, token, Utc::now());
        if creds.refresh_token.is_none() {
            return Err(SyncError::Auth(
                "token endpoint did not return a refresh token".to_string(),
            ));
        }

        self.persist(&creds).await?;
        info!(path = %self.path.display(), "authorization stored");
        Ok(())
    }

    /// A valid access token, refreshing first if the current one is missing
    /// or within a minute of expiry.
    pub async fn access_token(&self) -> Result<String, SyncError> {
        let mut creds = self.credentials.lock().await;
        if creds.has_fresh_token(Utc::now()) {
            if let Some(token) = creds.access_token.clone() {
                return Ok(token);
            }
        }
        self.refresh_locked(&mut creds).await
    }

    /// Refresh unconditionally, e.g. after the remote answered 401.
    pub async fn refresh(&self) -> Result<String, SyncError> {
        let mut creds = self.credentials.lock().await;
        self.refresh_locked(&mut creds).await
    }

    async fn refresh_locked(&self, creds: &mut Credentials) -> Result<String, SyncError> {
        let (client_id, client_secret) = client_pair(creds)?;
        let refresh_token = creds.refresh_token.clone().ok_or_else(|| {
            SyncError::Auth("no refresh token on file; run `drivefs auth`".to_string())
        })?;

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
        ];
        let token = self.request_token(&form).await?;
        apply_token(creds, token, Utc::now());
        self.persist(creds).await?;
        debug!(expires_at = ?creds.expires_at, "access token refreshed");

        creds
            .access_token
            .clone()
            .ok_or_else(|| SyncError::Auth("token endpoint returned no access token".to_string()))
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, SyncError> {
        let response = self.client.post(&self.token_url).form(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Auth(format!(
                "token endpoint returned status {}: {}",
                status.as_u16(),
                body
            )));
        }
        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| SyncError::Decode(format!("token response: {}", e)))
    }

    async fn persist(&self, creds: &Credentials) -> Result<(), SyncError> {
        let json = serde_json::to_string_pretty(creds)
            .map_err(|e| SyncError::Decode(format!("credentials: {}", e)))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

fn client_pair(creds: &Credentials) -> Result<(String, String), SyncError> {
    match (&creds.client_id, &creds.client_secret) {
        (Some(id), Some(secret)) => Ok((id.clone(), secret.clone())),
        _ => Err(SyncError::Auth(
            "client_id and client_secret must be configured".to_string(),
        )),
    }
}

fn apply_token(creds: &mut Credentials, token: TokenResponse, now: DateTime<Utc>) {
    creds.access_token = Some(token.access_token);
    creds.expires_at = token
        .expires_in
        .map(|secs| now + ChronoDuration::seconds(secs));
    // Refresh responses usually omit the refresh token; keep the old one
    if let Some(refresh) = token.refresh_token {
        creds.refresh_token = Some(refresh);
    }
}
