//! Single-machine backend over a sandboxed directory tree.

use crate::CacheBackend;
use crate::error::BackendError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Per-file header: expiry as unix milliseconds, 0 = no expiry.
const HEADER_LEN: usize = 8;

/// A filesystem [`CacheBackend`].
///
/// Keys are digested to hex and sharded two directory levels deep
/// (`ab/cd/<digest>.bin`) so no single directory grows unbounded. Writes go
/// through a unique temp file in a dedicated `tmp/` directory, are synced
/// to hardware, and land via atomic rename, so a crash mid-write can never
/// leave a torn entry. Orphaned temp files from previous crashes are swept
/// on connect.
///
/// Locks are separate `create_new` files under `locks/`; file creation is
/// the atomic primitive, so a single holder is guaranteed per lock name on
/// one machine.
#[derive(Debug)]
pub struct FilesystemBackend {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl FilesystemBackend {
    /// Opens (and creates, if needed) the backing directory tree and sweeps
    /// leftover temp files.
    ///
    /// # Errors
    /// Returns a [`BackendError`] of kind `Io` if the directories cannot be
    /// created.
    pub async fn connect(root: impl AsRef<Path>) -> Result<Self, BackendError> {
        let root = root.as_ref().to_path_buf();
        for sub in ["entries", "locks", "tmp"] {
            fs::create_dir_all(root.join(sub))
                .await
                .map_err(|err| BackendError::io("connect", sub, &err))?;
        }

        let backend = Self { root, tmp_counter: AtomicU64::new(0) };
        backend.sweep_tmp().await;
        Ok(backend)
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.root
            .join("entries")
            .join(&digest[..2])
            .join(&digest[2..4])
            .join(format!("{digest}.bin"))
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.root.join("locks").join(format!("{digest}.lock"))
    }

    fn tmp_path(&self) -> PathBuf {
        let counter = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        self.root.join("tmp").join(format!("{}.{counter}.tctmp", std::process::id()))
    }

    /// Removes temp files orphaned by a crashed predecessor.
    async fn sweep_tmp(&self) {
        let tmp_dir = self.root.join("tmp");
        let Ok(mut dir) = fs::read_dir(&tmp_dir).await else { return };
        let mut swept = 0u32;
        while let Ok(Some(entry)) = dir.next_entry().await {
            if fs::remove_file(entry.path()).await.is_ok() {
                swept += 1;
            }
        }
        if swept > 0 {
            debug!(swept, "Orphaned temp files swept");
        }
    }

    /// Atomic write: unique temp file, fsync, rename into place.
    async fn write_atomic(
        &self,
        target: &Path,
        header: u64,
        value: &[u8],
        operation: &'static str,
        key: &str,
    ) -> Result<(), BackendError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| BackendError::io(operation, key, &err))?;
        }

        let tmp = self.tmp_path();
        {
            let mut file = fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&tmp)
                .await
                .map_err(|err| BackendError::io(operation, key, &err))?;
            file.write_all(&header.to_le_bytes())
                .await
                .map_err(|err| BackendError::io(operation, key, &err))?;
            file.write_all(value).await.map_err(|err| BackendError::io(operation, key, &err))?;
            file.sync_all().await.map_err(|err| BackendError::io(operation, key, &err))?;
        }

        if let Err(err) = fs::rename(&tmp, target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(BackendError::io(operation, key, &err));
        }
        Ok(())
    }

    /// Reads an entry file; `None` when absent or expired (expired files
    /// are unlinked on the spot).
    async fn read_live(
        &self,
        path: &Path,
        operation: &'static str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, BackendError> {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(BackendError::io(operation, key, &err)),
        };
        if data.len() < HEADER_LEN {
            warn!(path = %path.display(), "Torn entry file removed");
            let _ = fs::remove_file(path).await;
            return Ok(None);
        }

        if is_expired_header(&data[..HEADER_LEN]) {
            let _ = fs::remove_file(path).await;
            return Ok(None);
        }
        Ok(Some(data[HEADER_LEN..].to_vec()))
    }
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

fn expiry_header(ttl: Option<Duration>) -> u64 {
    ttl.map_or(0, |ttl| unix_ms().saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)))
}

#[async_trait]
impl CacheBackend for FilesystemBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.read_live(&self.entry_path(key), "get", key).await
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), BackendError> {
        self.write_atomic(&self.entry_path(key), expiry_header(ttl), value, "set", key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(BackendError::io("delete", key, &err)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, BackendError> {
        Ok(self.read_live(&self.entry_path(key), "exists", key).await?.is_some())
    }

    async fn acquire_lock(
        &self,
        key: &str,
        token: &[u8],
        ttl: Duration,
    ) -> Result<bool, BackendError> {
        let path = self.lock_path(key);
        let mut payload = Vec::with_capacity(HEADER_LEN + token.len());
        payload.extend_from_slice(&expiry_header(Some(ttl)).to_le_bytes());
        payload.extend_from_slice(token);

        // `create_new` is the atomic primitive: first creator wins.
        match fs::OpenOptions::new().create_new(true).write(true).open(&path).await {
            Ok(mut file) => {
                file.write_all(&payload)
                    .await
                    .map_err(|err| BackendError::io("acquire_lock", key, &err))?;
                file.sync_all().await.map_err(|err| BackendError::io("acquire_lock", key, &err))?;
                Ok(true)
            },
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                // A holder exists; take over only if its TTL lapsed.
                match fs::read(&path).await {
                    Ok(data)
                        if data.len() >= HEADER_LEN
                            && is_expired_header(&data[..HEADER_LEN]) =>
                    {
                        let _ = fs::remove_file(&path).await;
                        // One retry; losing the re-race means another waiter won.
                        match fs::OpenOptions::new().create_new(true).write(true).open(&path).await
                        {
                            Ok(mut file) => {
                                file.write_all(&payload).await.map_err(|err| {
                                    BackendError::io("acquire_lock", key, &err)
                                })?;
                                Ok(true)
                            },
                            Err(_) => Ok(false),
                        }
                    },
                    _ => Ok(false),
                }
            },
            Err(err) => Err(BackendError::io("acquire_lock", key, &err)),
        }
    }

    async fn release_lock(&self, key: &str, token: &[u8]) -> Result<bool, BackendError> {
        let path = self.lock_path(key);
        match fs::read(&path).await {
            Ok(data) if data.len() >= HEADER_LEN && &data[HEADER_LEN..] == token => {
                match fs::remove_file(&path).await {
                    Ok(()) => Ok(true),
                    Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
                    Err(err) => Err(BackendError::io("release_lock", key, &err)),
                }
            },
            Ok(_) => Ok(false),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(BackendError::io("release_lock", key, &err)),
        }
    }
}

fn is_expired_header(header: &[u8]) -> bool {
    let expires_ms = u64::from_le_bytes(header.try_into().unwrap_or([0; 8]));
    expires_ms != 0 && unix_ms() > expires_ms
}
