//! JSON file credential store
//!
//! Keeps the access/refresh pair in a single JSON file. Writes go through a
//! temp file + rename so a crash mid-write never leaves a truncated file, and
//! a tokio Mutex serializes writers (refresh persistence racing with logout).
//!
//! The in-memory copy is the read path; the file is rewritten on every
//! mutation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::gateway::{AccessCredential, BoxFuture, CredentialGateway, RefreshCredential};

/// On-disk shape of the credential file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh: Option<String>,
}

/// Credential gateway persisted to a JSON file with 0600 permissions.
pub struct FileCredentialStore {
    path: PathBuf,
    state: Mutex<StoredCredentials>,
}

impl FileCredentialStore {
    /// Load credentials from the given file path.
    ///
    /// A missing file is a cold start: an empty `{}` file is created so the
    /// next load takes the normal path.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::StorageUnavailable(format!("reading credential file: {e}")))?;
            let stored: StoredCredentials = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            info!(
                path = %path.display(),
                has_access = stored.access.is_some(),
                has_refresh = stored.refresh.is_some(),
                "loaded credentials"
            );
            stored
        } else {
            info!(path = %path.display(), "credential file not found, starting signed out");
            let stored = StoredCredentials::default();
            write_atomic(&path, &stored).await?;
            stored
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialGateway for FileCredentialStore {
    fn access_credential(&self) -> BoxFuture<'_, Result<Option<AccessCredential>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state.access.clone().map(AccessCredential::new))
        })
    }

    fn refresh_credential(&self) -> BoxFuture<'_, Result<Option<RefreshCredential>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state.refresh.clone().map(RefreshCredential::new))
        })
    }

    fn set_credentials(
        &self,
        access: AccessCredential,
        refresh: Option<RefreshCredential>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let mut next = state.clone();
            next.access = Some(access.expose().to_owned());
            if let Some(refresh) = refresh {
                next.refresh = Some(refresh.expose().to_owned());
            }
            // Only swap the in-memory copy once the file is durable
            write_atomic(&self.path, &next).await?;
            *state = next;
            debug!("stored credentials");
            Ok(())
        })
    }

    fn clear_credentials(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let cleared = StoredCredentials::default();
            write_atomic(&self.path, &cleared).await?;
            *state = cleared;
            debug!("cleared credentials");
            Ok(())
        })
    }
}

/// Write credentials to a file atomically.
///
/// Writes a temp file in the same directory, sets 0600 on unix, then renames
/// it over the target.
async fn write_atomic(path: &Path, data: &StoredCredentials) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::StorageUnavailable("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::StorageUnavailable(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| {
                Error::StorageUnavailable(format!("setting credential file permissions: {e}"))
            })?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::StorageUnavailable(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
