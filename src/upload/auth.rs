use crate::error::{BackupError, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const EXPIRY_SKEW_SECS: i64 = 300;

/// Authorized-user token file as written by the Google OAuth client
/// libraries. Fields this tool does not use are kept so the file survives a
/// refresh unchanged.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthorizedUserToken {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl std::fmt::Debug for AuthorizedUserToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedUserToken")
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl AuthorizedUserToken {
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match (&self.token, self.expiry) {
            (None, _) => true,
            (Some(_), Some(expiry)) => expiry - Duration::seconds(EXPIRY_SKEW_SECS) <= now,
            (Some(_), None) => false,
        }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BackupError::Auth(format!(
                "OAuth2 token file not found: {} (run the one-time authorization to create it)",
                path.display()
            )));
        }
        let contents = fs::read_to_string(path).await?;
        serde_json::from_str(&contents).map_err(|e| {
            BackupError::Auth(format!("malformed token file {}: {}", path.display(), e))
        })
    }

    /// Replaces the token file atomically: a crash mid-write leaves the old
    /// file intact.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        let file_name = path
            .file_name()
            .ok_or_else(|| BackupError::Auth(format!("invalid token path: {}", path.display())))?;
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);

        fs::write(&tmp, contents).await?;
        if let Ok(meta) = fs::metadata(path).await {
            fs::set_permissions(&tmp, meta.permissions()).await?;
        }
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!("Saved refreshed token to {}", path.display());
        Ok(())
    }

    pub async fn refresh(&mut self, client: &Client) -> Result<()> {
        let refresh_token = self.refresh_token.as_deref().ok_or_else(|| {
            BackupError::Auth("access token expired and no refresh token is available".to_string())
        })?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let response = client
            .post(&self.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| BackupError::Auth(format!("token refresh request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(BackupError::Auth(format!(
                "token refresh rejected: {} - {}",
                status, text
            )));
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| BackupError::Auth(format!("invalid token refresh response: {}", e)))?;

        let expiry = match refreshed.expires_in {
            Some(secs) => Some(
                Duration::try_seconds(secs)
                    .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                    .ok_or_else(|| {
                        BackupError::Auth(format!("token refresh returned invalid expires_in: {}", secs))
                    })?,
            ),
            None => None,
        };
        self.token = Some(refreshed.access_token);
        self.expiry = expiry;
        if let Some(rotated) = refreshed.refresh_token {
            self.refresh_token = Some(rotated);
        }
        Ok(())
    }
}

/// Returns a usable access token from the token file at `path`, refreshing
/// and rewriting the file first when it has expired.
pub async fn authorize(client: &Client, path: &Path) -> Result<String> {
    let mut token = AuthorizedUserToken::load(path).await?;
    if !token.scopes.is_empty() && !token.scopes.iter().any(|s| s == DRIVE_FILE_SCOPE) {
        warn!("Token scopes {:?} do not include {}", token.scopes, DRIVE_FILE_SCOPE);
    }

    if token.needs_refresh(Utc::now()) {
        info!("Refreshing expired OAuth2 token...");
        token.refresh(client).await?;
        token.save(path).await?;
    }

    token
        .token
        .ok_or_else(|| BackupError::Auth("token file has no access token".to_string()))
}
