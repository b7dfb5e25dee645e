//! Session-scoped ownership of overflow files.
//!
//! A [`Session`] corresponds to one database connection. It hands out
//! overflow files to the byte stores created under it and keeps a registry
//! of every file still alive, so that closing the session removes them even
//! if a store was never released.
//!
//! ## Locking
//!
//! Nothing in this crate is safe to call concurrently on the same large
//! object. Callers serialize access with the session lock ([`Session::lock`])
//! held across each logical operation; the core takes no session lock itself.

use crate::config::LobConfig;
use crate::error::{CoreError, CoreResult};
use lobkit_storage::{
    BlockCipher, EncryptedLobFile, LobFile, StorageResult, TempDirProvider, TempFileProvider,
};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Connection-scoped owner of large object resources.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: LobConfig,
    provider: Arc<dyn TempFileProvider>,
    cipher: Option<Arc<dyn BlockCipher>>,
    /// Live overflow files: id -> path
    registry: Mutex<HashMap<u64, PathBuf>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    connection_lock: Mutex<()>,
}

impl Session {
    /// Creates a session with plain overflow files.
    #[must_use]
    pub fn new(config: LobConfig) -> Self {
        let provider = default_provider(&config);
        Self::with_provider(config, provider, None)
    }

    /// Creates a session for an encrypted database.
    ///
    /// Every overflow file is wrapped in an [`EncryptedLobFile`].
    #[must_use]
    pub fn encrypted(config: LobConfig, cipher: Arc<dyn BlockCipher>) -> Self {
        let provider = default_provider(&config);
        Self::with_provider(config, provider, Some(cipher))
    }

    /// Creates a session with an explicit temporary file provider.
    #[must_use]
    pub fn with_provider(
        config: LobConfig,
        provider: Arc<dyn TempFileProvider>,
        cipher: Option<Arc<dyn BlockCipher>>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                config,
                provider,
                cipher,
                registry: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                connection_lock: Mutex::new(()),
            }),
        }
    }

    /// Returns the session configuration.
    #[must_use]
    pub fn config(&self) -> &LobConfig {
        &self.inner.config
    }

    /// Returns true if overflow files are encrypted.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.inner.cipher.is_some()
    }

    /// Returns true once [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Acquires the connection lock.
    ///
    /// Hold the guard across every call into a large object owned by this
    /// session.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.inner.connection_lock.lock()
    }

    /// Returns the number of overflow files currently alive.
    #[must_use]
    pub fn overflow_file_count(&self) -> usize {
        self.inner.registry.lock().len()
    }

    /// Creates and registers a new overflow file.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or the file cannot be
    /// created.
    pub fn create_overflow_file(&self) -> CoreResult<OverflowFile> {
        if self.is_closed() {
            return Err(CoreError::SessionClosed);
        }

        let config = &self.inner.config;
        let file = self
            .inner
            .provider
            .create_temp_file(&config.overflow_prefix, &config.overflow_suffix)?;
        let path = file.path().to_path_buf();

        let file: Box<dyn LobFile> = match &self.inner.cipher {
            Some(cipher) => Box::new(EncryptedLobFile::new(file, Arc::clone(cipher))?),
            None => Box::new(file),
        };

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.registry.lock().insert(id, path.clone());
        debug!(id, path = %path.display(), encrypted = self.is_encrypted(), "overflow file created");

        Ok(OverflowFile {
            id,
            file,
            session: self.clone(),
        })
    }

    fn unregister(&self, id: u64) {
        if let Some(path) = self.inner.registry.lock().remove(&id) {
            debug!(id, path = %path.display(), "overflow file released");
        }
    }

    /// Ends the session, deleting every overflow file still registered.
    ///
    /// Idempotent. Stores that still reference a deleted file fail on their
    /// next file operation.
    pub fn close(&self) {
        self.inner.close();
    }
}

fn default_provider(config: &LobConfig) -> Arc<dyn TempFileProvider> {
    match &config.overflow_dir {
        Some(dir) => Arc::new(TempDirProvider::new(dir.clone())),
        None => Arc::new(TempDirProvider::default()),
    }
}

impl SessionInner {
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let leaked: Vec<(u64, PathBuf)> = self.registry.lock().drain().collect();
        for (id, path) in leaked {
            warn!(id, path = %path.display(), "deleting overflow file left open at session end");
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(id, error = %e, "failed to delete overflow file");
                }
            }
        }
        debug!("session closed");
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.inner.config)
            .field("encrypted", &self.is_encrypted())
            .field("overflow_files", &self.overflow_file_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A registered overflow file.
///
/// Dropping the value closes the file, deletes it from temporary storage and
/// removes it from the session registry.
pub struct OverflowFile {
    id: u64,
    file: Box<dyn LobFile>,
    session: Session,
}

impl OverflowFile {
    /// Returns the registry id of this file.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl LobFile for OverflowFile {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> StorageResult<usize> {
        self.file.read_at(pos, buf)
    }

    fn write_at(&mut self, pos: u64, data: &[u8]) -> StorageResult<()> {
        self.file.write_at(pos, data)
    }

    fn len(&self) -> StorageResult<u64> {
        self.file.len()
    }

    fn set_len(&mut self, new_len: u64) -> StorageResult<()> {
        self.file.set_len(new_len)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.sync()
    }

    fn close(&mut self) -> StorageResult<()> {
        self.file.close()
    }
}

impl Drop for OverflowFile {
    fn drop(&mut self) {
        if let Err(e) = self.file.close() {
            warn!(id = self.id, error = %e, "failed to close overflow file");
        }
        self.session.unregister(self.id);
    }
}

impl std::fmt::Debug for OverflowFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverflowFile").field("id", &self.id).finish()
    }
}

/// Provider that always fails; lets tests exercise promotion error paths.
#[cfg(test)]
pub(crate) struct FailingProvider;

#[cfg(test)]
impl TempFileProvider for FailingProvider {
    fn create_temp_file(
        &self,
        _prefix: &str,
        _suffix: &str,
    ) -> StorageResult<lobkit_storage::FileLob> {
        Err(std::io::Error::new(std::io::ErrorKind::Other, "no temporary storage").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(feature = "encryption")]
    use lobkit_storage::{AesBlockCipher, EncryptionKey};
    use tempfile::tempdir;

    #[test]
    fn overflow_files_are_registered_and_released() {
        let dir = tempdir().unwrap();
        let session = Session::new(LobConfig::new().overflow_dir(dir.path()));

        let mut file = session.create_overflow_file().unwrap();
        file.write_at(0, b"abc").unwrap();
        assert_eq!(session.overflow_file_count(), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        drop(file);
        assert_eq!(session.overflow_file_count(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn close_deletes_leaked_files() {
        let dir = tempdir().unwrap();
        let session = Session::new(LobConfig::new().overflow_dir(dir.path()));

        let file = session.create_overflow_file().unwrap();
        std::mem::forget(file);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        session.close();
        session.close();
        assert!(session.is_closed());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(matches!(
            session.create_overflow_file(),
            Err(CoreError::SessionClosed)
        ));
    }

    #[cfg(feature = "encryption")]
    #[test]
    fn encrypted_session_wraps_files() {
        let dir = tempdir().unwrap();
        let key = EncryptionKey::from_bytes(&[3u8; 32]).unwrap();
        let session = Session::encrypted(
            LobConfig::new().overflow_dir(dir.path()),
            Arc::new(AesBlockCipher::new(&key)),
        );
        assert!(session.is_encrypted());

        let mut file = session.create_overflow_file().unwrap();
        file.write_at(0, &[b'x'; 40]).unwrap();
        assert_eq!(file.len().unwrap(), 40);

        let entry = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap();
        let on_disk = std::fs::read(entry.path()).unwrap();
        assert_eq!(on_disk.len(), 32);
        assert_ne!(on_disk, vec![b'x'; 32]);
    }

    #[test]
    fn provider_failure_surfaces() {
        let session = Session::with_provider(LobConfig::new(), Arc::new(FailingProvider), None);
        assert!(matches!(
            session.create_overflow_file(),
            Err(CoreError::Storage(_))
        ));
        assert_eq!(session.overflow_file_count(), 0);
    }

    #[test]
    fn connection_lock_is_exclusive() {
        let session = Session::new(LobConfig::new());
        let guard = session.lock();
        assert!(session.inner.connection_lock.try_lock().is_none());
        drop(guard);
        assert!(session.inner.connection_lock.try_lock().is_some());
    }
}
