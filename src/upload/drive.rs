use super::auth::authorize;
use super::uploader::{RemoteObject, RemoteStorage};
use crate::config::DriveConfig;
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Body, Client, Response};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs::File;
use tracing::{debug, info};

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const SQL_MIME: &str = "application/sql";
const RESPONSE_FIELDS: &str = "id,name,webViewLink";

pub struct DriveClient {
    client: Client,
    api_base: String,
    access_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parents: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    web_view_link: Option<String>,
}

impl From<DriveFile> for RemoteObject {
    fn from(file: DriveFile) -> Self {
        RemoteObject {
            id: file.id,
            name: file.name,
            web_view_link: file.web_view_link,
        }
    }
}

impl DriveClient {
    /// Authenticates with the token file named in `config`. Any failure here
    /// is fatal for the run.
    pub async fn connect(config: &DriveConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("pg-drive-backup/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackupError::Auth(format!("failed to create HTTP client: {}", e)))?;

        let access_token = authorize(&client, &config.credentials_file).await?;
        info!("Successfully authenticated with Google Drive using OAuth2");

        Ok(Self::with_token(client, &config.api_base, access_token))
    }

    pub fn with_token(client: Client, api_base: &str, access_token: String) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    async fn check(response: Response, action: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        Err(BackupError::Upload(format!("{} failed: {} - {}", action, status, text)))
    }

    async fn start_resumable_upload(&self, metadata: &FileMetadata<'_>, size: u64) -> Result<String> {
        let url = format!(
            "{}/upload/drive/v3/files?uploadType=resumable&fields={}",
            self.api_base, RESPONSE_FIELDS
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .header("X-Upload-Content-Type", SQL_MIME)
            .header("X-Upload-Content-Length", size)
            .json(metadata)
            .send()
            .await?;
        let response = Self::check(response, "Starting upload session").await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| BackupError::Upload("upload session has no Location header".to_string()))
    }
}

#[async_trait]
impl RemoteStorage for DriveClient {
    async fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<RemoteObject> {
        let url = format!("{}/drive/v3/files?fields={}", self.api_base, RESPONSE_FIELDS);
        let metadata = FileMetadata {
            name,
            mime_type: Some(FOLDER_MIME),
            parents: parent.into_iter().collect(),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&metadata)
            .send()
            .await?;
        let folder: DriveFile = Self::check(response, "Creating folder").await?.json().await?;
        Ok(folder.into())
    }

    async fn upload_file(&self, path: &Path, name: &str, parent: Option<&str>) -> Result<RemoteObject> {
        let file = File::open(path).await?;
        let size = file.metadata().await?.len();
        let metadata = FileMetadata {
            name,
            mime_type: None,
            parents: parent.into_iter().collect(),
        };

        let session_url = self.start_resumable_upload(&metadata, size).await?;
        debug!("Streaming {} bytes to upload session", size);

        let response = self
            .client
            .put(&session_url)
            .bearer_auth(&self.access_token)
            .header(CONTENT_TYPE, SQL_MIME)
            .header(CONTENT_LENGTH, size)
            .body(Body::from(file))
            .send()
            .await?;
        let uploaded: DriveFile = Self::check(response, "Uploading file").await?.json().await?;
        Ok(uploaded.into())
    }

    fn name(&self) -> &'static str {
        "Google Drive"
    }
}
