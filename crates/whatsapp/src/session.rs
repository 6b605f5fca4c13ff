//! Session credential persistence.
//!
//! The credential is an opaque JSON blob produced by the messaging client on
//! authentication. It is written to a single file on every `authenticated`
//! event and read once at startup so the client can resume without a new QR
//! scan.

use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
    tokio::sync::RwLock,
    tracing::{debug, warn},
};

/// Opaque authentication state handed back to the client on restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCredential(Value);

impl SessionCredential {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize session credential: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// File-backed store for the session credential.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted credential. Missing, unreadable, empty or corrupt
    /// files all read as "no credential".
    pub fn load(&self) -> Option<SessionCredential> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no saved session");
                return None;
            },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "session file unreadable, starting fresh");
                return None;
            },
        };

        if raw.trim().is_empty() {
            return None;
        }

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Null) => None,
            Ok(value) => Some(SessionCredential(value)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "session file corrupt, starting fresh");
                None
            },
        }
    }

    /// Replace the persisted credential.
    ///
    /// Writes to a sibling temp file, syncs it, then renames over the target
    /// so a crash mid-write leaves the previous credential intact.
    pub fn save(&self, credential: &SessionCredential) -> Result<(), StorageError> {
        let data = serde_json::to_vec(credential)?;
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp = self.tmp_path();
        let write_tmp = || -> io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(&data)?;
            file.sync_all()?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
            }
            Ok(())
        };

        if let Err(e) = write_tmp().and_then(|()| fs::rename(&tmp, &self.path)) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(e));
        }

        debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    /// Delete the persisted credential, forcing a fresh QR login on the next
    /// start. Returns whether a file was removed.
    pub fn clear(&self) -> Result<bool, StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StorageError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "session".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Shared in-memory copy of the current credential.
///
/// Created once at startup (seeded from [`SessionStore::load`]) and handed
/// to each component that reads or replaces the credential.
#[derive(Debug, Clone, Default)]
pub struct CredentialCell(Arc<RwLock<Option<SessionCredential>>>);

impl CredentialCell {
    pub fn new(initial: Option<SessionCredential>) -> Self {
        Self(Arc::new(RwLock::new(initial)))
    }

    pub async fn get(&self) -> Option<SessionCredential> {
        self.0.read().await.clone()
    }

    pub async fn set(&self, credential: SessionCredential) {
        *self.0.write().await = Some(credential);
    }
}
