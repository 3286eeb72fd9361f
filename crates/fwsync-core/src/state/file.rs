// # File Config Store
//
// File-based implementation of ConfigStore.
//
// ## Handle discipline
//
// A store owns exactly one read/write handle to the record for its whole
// lifetime. `load` rewinds and reads to the end; `save` truncates, rewinds
// and writes through that same handle. The record is never truncated before
// the read has completed, and no fresh handle is opened between load and
// save.
//
// A store made by `create` for a record that does not exist yet opens no
// handle until the first `save`, so an initialization that fails early
// leaves nothing on disk.
//
// ## Concurrent invocations
//
// Two fwsync processes working on the same record would interleave their
// read-modify-write cycles. Each store holds an exclusive OS lock on
// `<record>.lock` until it is dropped; a second store fails fast with
// `Error::ConfigLocked`. The kernel releases the lock when the process
// exits, however it exits, so a lock file left on disk is never stale.
//
// ## File Format
//
// ```json
// {
//   "provider": "google",
//   "project": "dev-project",
//   "ip_limit": 5,
//   "name": "alice-rule",
//   "ips": ["9.9.9.9", "8.8.8.8"]
// }
// ```

use async_trait::async_trait;
use fs2::FileExt;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::Error;
use crate::config::FirewallConfig;
use crate::traits::ConfigStore;

/// File-based config store
///
/// # Example
///
/// ```rust,no_run
/// use fwsync_core::state::FileConfigStore;
/// use fwsync_core::traits::ConfigStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileConfigStore::open("/home/alice/.fwsync").await?;
///
///     let mut config = store.load().await?;
///     config.add("9.9.9.9");
///     store.save(&config).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileConfigStore {
    path: PathBuf,
    /// `None` until the first `save` of a record that did not exist yet
    file: Mutex<Option<File>>,
    _lock: ConfigLock,
}

impl FileConfigStore {
    /// Open an existing record
    ///
    /// Fails with [`Error::ConfigNotFound`] if nothing exists at `path`.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();

        // Check the record before locking so a missing directory reads as a
        // missing record rather than an I/O failure
        let file = Self::open_record(path, false).await?;
        let lock = ConfigLock::acquire(path).await?;

        tracing::debug!("Opened config record {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(Some(file)),
            _lock: lock,
        })
    }

    /// Prepare a record for initialization
    ///
    /// Creates missing parent directories. An existing record is opened and
    /// left untouched until the first `save`; a missing one is only created
    /// by that `save`.
    pub async fn create<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "failed to create config directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let lock = ConfigLock::acquire(path).await?;
        let file = match Self::open_record(path, false).await {
            Ok(file) => Some(file),
            Err(Error::ConfigNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        tracing::debug!(
            "Prepared config record {} (exists: {})",
            path.display(),
            file.is_some()
        );
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            _lock: lock,
        })
    }

    async fn open_record(path: &Path, create: bool) -> Result<File, Error> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .open(path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => Error::ConfigNotFound(path.to_path_buf()),
                _ => Error::Io(e),
            })
    }

    /// Path of the record
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the lock file guarding `path`
    pub fn lock_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        path.with_file_name(name)
    }

    fn malformed(&self, message: impl Into<String>) -> Error {
        Error::ConfigMalformed {
            path: self.path.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load(&self) -> Result<FirewallConfig, Error> {
        let mut guard = self.file.lock().await;
        let file = guard
            .as_mut()
            .ok_or_else(|| Error::ConfigNotFound(self.path.clone()))?;
        file.seek(SeekFrom::Start(0)).await?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .await
            .map_err(|e| self.malformed(format!("failed to read record: {}", e)))?;

        if content.trim().is_empty() {
            return Err(self.malformed("record is empty"));
        }

        let config: FirewallConfig =
            serde_json::from_str(&content).map_err(|e| self.malformed(e.to_string()))?;

        tracing::debug!(
            "Loaded config record for firewall {} ({} IPs)",
            config.name,
            config.source_ips.len()
        );
        Ok(config)
    }

    async fn save(&self, config: &FirewallConfig) -> Result<(), Error> {
        let mut json = serde_json::to_vec_pretty(config)?;
        json.push(b'\n');

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            tracing::debug!("Creating config record {}", self.path.display());
            *guard = Some(Self::open_record(&self.path, true).await?);
        }
        let file = guard
            .as_mut()
            .ok_or_else(|| Error::ConfigNotFound(self.path.clone()))?;

        // Truncate and rewind only now, after any load has consumed the handle
        file.set_len(0).await?;
        file.seek(SeekFrom::Start(0)).await?;
        file.write_all(&json).await?;
        file.flush().await?;
        file.sync_all().await?;

        tracing::trace!("Config record written to {}", self.path.display());
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Exclusive OS lock held for the lifetime of a store
///
/// Dropping the handle releases the lock. The lock file itself stays on disk;
/// unlinking it would let a late opener lock an orphaned inode.
#[derive(Debug)]
struct ConfigLock {
    _file: std::fs::File,
}

impl ConfigLock {
    async fn acquire(record: &Path) -> Result<Self, Error> {
        let path = FileConfigStore::lock_path(record);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => Error::ConfigNotFound(record.to_path_buf()),
                _ => Error::Io(e),
            })?
            .into_std()
            .await;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::trace!("Locked {}", path.display());
                Ok(Self { _file: file })
            }
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                Err(Error::ConfigLocked(path))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> FirewallConfig {
        FirewallConfig::new()
            .with_provider("linode")
            .with_project("dev-project")
            .with_firewall("alice-rule")
            .with_source_ips(["9.9.9.9", "8.8.8.8"])
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".fwsync");

        {
            let store = FileConfigStore::create(&path).await.unwrap();
            store.save(&sample()).await.unwrap();
        }

        let store = FileConfigStore::open(&path).await.unwrap();
        assert_eq!(store.load().await.unwrap(), sample());
    }

    #[tokio::test]
    async fn test_open_missing_is_config_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".fwsync");

        let err = FileConfigStore::open(&path).await.unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(p) if p == path));

        // The record is checked before any lock file is made
        assert!(!FileConfigStore::lock_path(&path).exists());
    }

    #[tokio::test]
    async fn test_malformed_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".fwsync");
        fs::write(&path, b"name: not-json").await.unwrap();

        let store = FileConfigStore::open(&path).await.unwrap();
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, Error::ConfigMalformed { .. }));
    }

    #[tokio::test]
    async fn test_empty_record_is_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".fwsync");
        fs::write(&path, b"").await.unwrap();

        let store = FileConfigStore::open(&path).await.unwrap();
        assert!(matches!(
            store.load().await.unwrap_err(),
            Error::ConfigMalformed { .. }
        ));
    }

    #[tokio::test]
    async fn test_save_truncates_same_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".fwsync");

        let long = sample().with_source_ips(["1.1.1.1", "2.2.2.2", "3.3.3.3", "4.4.4.4"]);
        fs::write(&path, serde_json::to_vec_pretty(&long).unwrap())
            .await
            .unwrap();

        let store = FileConfigStore::open(&path).await.unwrap();
        let mut config = store.load().await.unwrap();
        config.source_ips = vec!["5.5.5.5".to_string()];
        store.save(&config).await.unwrap();

        // Reloading through the same handle sees exactly the shorter record
        assert_eq!(store.load().await.unwrap(), config);

        let on_disk: FirewallConfig =
            serde_json::from_slice(&fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(on_disk.source_ips, vec!["5.5.5.5"]);
    }

    #[tokio::test]
    async fn test_zero_limit_loaded_as_is() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".fwsync");
        fs::write(&path, br#"{"name": "alice-rule", "ip_limit": 0, "ips": []}"#)
            .await
            .unwrap();

        let store = FileConfigStore::open(&path).await.unwrap();
        let config = store.load().await.unwrap();
        assert_eq!(config.ip_limit, 0);
    }

    #[tokio::test]
    async fn test_concurrent_store_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".fwsync");

        let first = FileConfigStore::create(&path).await.unwrap();
        first.save(&sample()).await.unwrap();

        let err = FileConfigStore::open(&path).await.unwrap_err();
        assert!(matches!(err, Error::ConfigLocked(ref p) if *p == FileConfigStore::lock_path(&path)));

        drop(first);
        let second = FileConfigStore::open(&path).await.unwrap();
        assert_eq!(second.load().await.unwrap(), sample());
    }

    #[tokio::test]
    async fn test_open_missing_parent_is_config_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope").join(".fwsync");

        let err = FileConfigStore::open(&path).await.unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(ref p) if *p == path));
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_create_defers_record_until_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".fwsync");

        {
            let store = FileConfigStore::create(&path).await.unwrap();
            assert!(!path.exists());
            assert!(matches!(
                store.load().await.unwrap_err(),
                Error::ConfigNotFound(_)
            ));
        }

        // Dropped without a save: nothing for the next command to trip over
        assert!(!path.exists());
        assert!(matches!(
            FileConfigStore::open(&path).await.unwrap_err(),
            Error::ConfigNotFound(_)
        ));

        let store = FileConfigStore::create(&path).await.unwrap();
        store.save(&sample()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), sample());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_create_keeps_existing_record_until_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".fwsync");
        let old = sample().with_firewall("bob-rule");
        fs::write(&path, serde_json::to_vec_pretty(&old).unwrap())
            .await
            .unwrap();

        {
            let store = FileConfigStore::create(&path).await.unwrap();
            assert_eq!(store.load().await.unwrap(), old);
        }

        let store = FileConfigStore::open(&path).await.unwrap();
        assert_eq!(store.load().await.unwrap(), old);
    }

    #[tokio::test]
    async fn test_leftover_lock_file_does_not_block() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".fwsync");
        fs::write(&path, serde_json::to_vec_pretty(&sample()).unwrap())
            .await
            .unwrap();

        // What a killed process leaves behind: the file, but no held lock
        fs::write(FileConfigStore::lock_path(&path), b"4242\n")
            .await
            .unwrap();

        let store = FileConfigStore::open(&path).await.unwrap();
        assert_eq!(store.load().await.unwrap(), sample());
    }

    #[test]
    fn test_lock_path() {
        assert_eq!(
            FileConfigStore::lock_path(Path::new("/home/alice/.fwsync")),
            PathBuf::from("/home/alice/.fwsync.lock")
        );
    }
}
