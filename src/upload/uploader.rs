use crate::error::{BackupError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

const SESSION_FOLDER_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObject {
    pub id: String,
    pub name: String,
    pub web_view_link: Option<String>,
}

#[async_trait]
pub trait RemoteStorage: Send + Sync {
    async fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<RemoteObject>;
    async fn upload_file(&self, path: &Path, name: &str, parent: Option<&str>) -> Result<RemoteObject>;
    fn name(&self) -> &'static str;
}

/// Per-file result of one upload batch, in input order.
#[derive(Debug, Default)]
pub struct UploadOutcome {
    entries: Vec<(PathBuf, Result<RemoteObject>)>,
}

impl UploadOutcome {
    pub fn entries(&self) -> &[(PathBuf, Result<RemoteObject>)] {
        &self.entries
    }

    pub fn uploaded(&self) -> impl Iterator<Item = (&Path, &RemoteObject)> {
        self.entries
            .iter()
            .filter_map(|(path, result)| result.as_ref().ok().map(|obj| (path.as_path(), obj)))
    }

    pub fn succeeded(&self) -> usize {
        self.uploaded().count()
    }
}

pub struct Uploader<'a> {
    storage: &'a dyn RemoteStorage,
    folder_id: Option<String>,
}

impl<'a> Uploader<'a> {
    pub fn new(storage: &'a dyn RemoteStorage, folder_id: Option<String>) -> Self {
        Self { storage, folder_id }
    }

    /// Creates a folder named after `started_at` under `parent` and targets
    /// it. If the folder cannot be created, uploads go to the storage root.
    pub async fn with_session_folder(
        storage: &'a dyn RemoteStorage,
        parent: Option<&str>,
        started_at: DateTime<Local>,
    ) -> Self {
        let folder_name = session_folder_name(&started_at);
        let folder_id = match storage.create_folder(&folder_name, parent).await {
            Ok(folder) => {
                info!("Created folder '{}' (ID: {})", folder_name, folder.id);
                if let Some(link) = &folder.web_view_link {
                    info!("View at: {}", link);
                }
                Some(folder.id)
            }
            Err(e) => {
                error!("Error creating folder '{}': {}", folder_name, e);
                None
            }
        };
        Self { storage, folder_id }
    }

    pub fn folder_id(&self) -> Option<&str> {
        self.folder_id.as_deref()
    }

    pub async fn upload_one(&self, path: &Path) -> Result<RemoteObject> {
        if !path.exists() {
            warn!("File not found: {}", path.display());
            return Err(BackupError::FileNotFound(path.to_path_buf()));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| BackupError::Upload(format!("{} has no file name", path.display())))?;

        info!("Uploading {} to {}...", file_name, self.storage.name());
        match self
            .storage
            .upload_file(path, &file_name, self.folder_id.as_deref())
            .await
        {
            Ok(object) => {
                info!("Successfully uploaded {} (ID: {})", object.name, object.id);
                if let Some(link) = &object.web_view_link {
                    info!("View at: {}", link);
                }
                Ok(object)
            }
            Err(e) => {
                error!("Error uploading {}: {}", path.display(), e);
                Err(e)
            }
        }
    }

    pub async fn upload_many(&self, paths: &[PathBuf]) -> UploadOutcome {
        let mut outcome = UploadOutcome::default();
        for path in paths {
            let result = self.upload_one(path).await;
            outcome.entries.push((path.clone(), result));
        }
        outcome
    }
}

pub fn session_folder_name(started_at: &DateTime<Local>) -> String {
    started_at.format(SESSION_FOLDER_FORMAT).to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Folder { name: String, parent: Option<String> },
        Upload { name: String, parent: Option<String> },
    }

    /// Records calls; uploads of files whose name starts with `fail` and
    /// folder creation with `fail_folders` set return transport errors.
    #[derive(Default)]
    pub(crate) struct FakeStorage {
        pub calls: Arc<Mutex<Vec<Call>>>,
        pub fail_folders: bool,
    }

    #[async_trait]
    impl RemoteStorage for FakeStorage {
        async fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<RemoteObject> {
            self.calls.lock().unwrap().push(Call::Folder {
                name: name.to_string(),
                parent: parent.map(str::to_string),
            });
            if self.fail_folders {
                return Err(BackupError::Upload("500 Internal Server Error".to_string()));
            }
            Ok(RemoteObject {
                id: "session-folder".to_string(),
                name: name.to_string(),
                web_view_link: Some("https://drive.example/session-folder".to_string()),
            })
        }

        async fn upload_file(&self, _path: &Path, name: &str, parent: Option<&str>) -> Result<RemoteObject> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call::Upload {
                name: name.to_string(),
                parent: parent.map(str::to_string),
            });
            if name.starts_with("fail") {
                return Err(BackupError::Upload("connection reset by peer".to_string()));
            }
            Ok(RemoteObject {
                id: format!("id-{}", calls.len()),
                name: name.to_string(),
                web_view_link: None,
            })
        }

        fn name(&self) -> &'static str {
            "Fake Storage"
        }
    }

    impl FakeStorage {
        pub(crate) fn upload_count(&self) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| matches!(c, Call::Upload { .. }))
                .count()
        }
    }

    #[tokio::test]
    async fn test_upload_many_one_entry_per_input() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("shop_20240309_070501.sql");
        let b = dir.path().join("fail_20240309_070501.sql");
        let missing = dir.path().join("gone.sql");
        std::fs::write(&a, "a").unwrap();
        std::fs::write(&b, "b").unwrap();

        let storage = FakeStorage::default();
        let uploader = Uploader::new(&storage, Some("parent".to_string()));
        let paths = vec![a.clone(), b.clone(), missing.clone(), a.clone()];
        let outcome = uploader.upload_many(&paths).await;

        let entries = outcome.entries();
        assert_eq!(entries.len(), paths.len());
        let keys: Vec<&PathBuf> = entries.iter().map(|(p, _)| p).collect();
        assert_eq!(keys, paths.iter().collect::<Vec<_>>());
        assert!(entries[0].1.is_ok());
        assert!(matches!(entries[1].1, Err(BackupError::Upload(_))));
        assert!(matches!(entries[2].1, Err(BackupError::FileNotFound(_))));
        assert!(entries[3].1.is_ok());
        assert_eq!(outcome.succeeded(), 2);
        // the missing file never reached the storage
        assert_eq!(storage.upload_count(), 3);
    }

    #[tokio::test]
    async fn test_upload_uses_basename_and_folder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crm_20240309_070501.sql");
        std::fs::write(&path, "-- crm").unwrap();

        let storage = FakeStorage::default();
        let uploader = Uploader::new(&storage, Some("parent".to_string()));
        let object = uploader.upload_one(&path).await.unwrap();

        assert_eq!(object.name, "crm_20240309_070501.sql");
        assert_eq!(
            storage.calls.lock().unwrap().as_slice(),
            &[Call::Upload {
                name: "crm_20240309_070501.sql".to_string(),
                parent: Some("parent".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn test_session_folder_is_created_under_parent() {
        let storage = FakeStorage::default();
        let started_at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let uploader = Uploader::with_session_folder(&storage, Some("backups"), started_at).await;

        assert_eq!(uploader.folder_id(), Some("session-folder"));
        assert_eq!(
            storage.calls.lock().unwrap().as_slice(),
            &[Call::Folder {
                name: "2024-03-09_07-05-01".to_string(),
                parent: Some("backups".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn test_session_folder_failure_degrades_to_no_parent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shop.sql");
        std::fs::write(&path, "-- shop").unwrap();

        let storage = FakeStorage {
            fail_folders: true,
            ..Default::default()
        };
        let uploader = Uploader::with_session_folder(&storage, Some("backups"), Local::now()).await;
        assert!(uploader.folder_id().is_none());

        uploader.upload_one(&path).await.unwrap();
        let calls = storage.calls.lock().unwrap();
        assert_eq!(
            calls.last(),
            Some(&Call::Upload {
                name: "shop.sql".to_string(),
                parent: None,
            })
        );
    }
}
