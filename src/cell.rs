//! Persistent key-value cells with change notification
//!
//! A [`PersistentCell`] is a single storage slot that survives restarts and
//! lets observers react to writes made elsewhere: by another handle in the
//! same process ([`MemoryCell`] clones behave like sibling browser windows on
//! one storage origin) or by another process sharing the same file
//! ([`FileCell::reload`] plays the role of the browser's `storage` event).
//!
//! Observers receive a [`tokio::sync::watch::Receiver`]. A write that leaves
//! the stored value unchanged does not notify.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SessionError};

/// Storage slot holding an optional value
pub trait PersistentCell<T>: Send + Sync
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Current value, or `None` when nothing is stored
    fn read(&self) -> Option<T>;

    /// Store a value (`None` removes it) and notify observers if it changed
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written. Observers
    /// are not notified in that case.
    fn write(&self, value: Option<T>) -> Result<()>;

    /// Observe changes; the value at subscription time counts as seen
    fn subscribe(&self) -> watch::Receiver<Option<T>>;
}

/// Replace the watched value, reporting whether it changed
fn replace_if_changed<T: PartialEq>(tx: &watch::Sender<Option<T>>, value: Option<T>) -> bool {
    tx.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    })
}

// ============================================================================
// In-memory cell
// ============================================================================

/// Process-local cell
///
/// Clones share the same slot, so a write through one clone is observed by
/// subscribers of every other clone.
#[derive(Debug)]
pub struct MemoryCell<T> {
    tx: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for MemoryCell<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> Default for MemoryCell<T> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<T> MemoryCell<T> {
    /// Create a cell holding `initial`
    #[must_use]
    pub fn new(initial: Option<T>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }
}

impl<T> PersistentCell<T> for MemoryCell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn read(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    fn write(&self, value: Option<T>) -> Result<()> {
        replace_if_changed(&self.tx, value);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.tx.subscribe()
    }
}

// ============================================================================
// File-backed cell
// ============================================================================

/// Cell persisted as a JSON file
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so concurrent readers see either the old or the new
/// value. The file is removed when the value is cleared. Content that cannot
/// be parsed is treated as absent.
#[derive(Debug)]
pub struct FileCell<T> {
    path: PathBuf,
    tx: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for FileCell<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            tx: Arc::clone(&self.tx),
        }
    }
}

/// Default storage directory (platform-specific config directory)
#[must_use]
pub fn default_storage_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("twitch-session")
}

impl<T> FileCell<T>
where
    T: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static,
{
    /// Open the cell backed by `path`, loading whatever is stored there
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (tx, _) = watch::channel(Self::load(&path));
        Self {
            path,
            tx: Arc::new(tx),
        }
    }

    /// Open the cell for `key` inside `dir` (`<dir>/<key>.json`)
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>, key: &str) -> Self {
        Self::open(dir.as_ref().join(format!("{key}.json")))
    }

    /// Get the storage path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Option<T> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Could not read stored value: {e}");
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Ignoring unparseable stored value: {e}");
                None
            }
        }
    }

    fn persist(&self, value: Option<&T>) -> Result<()> {
        self.persist_raw(value)
            .map_err(|e| SessionError::storage(format!("{}: {e}", self.path.display())))
    }

    /// Replace the file atomically so readers never see a partial write
    fn persist_raw(&self, value: Option<&T>) -> std::io::Result<()> {
        let Some(value) = value else {
            return match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            };
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let content = serde_json::to_string_pretty(value)?;
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(content.as_bytes())?;
        file.as_file().sync_all()?;

        // Tokens live here; keep them user-only on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            file.as_file().set_permissions(perms)?;
        }

        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Re-read the backing file and notify observers if another process
    /// changed it
    ///
    /// Returns whether the value changed.
    pub fn reload(&self) -> bool {
        let changed = replace_if_changed(&self.tx, Self::load(&self.path));
        if changed {
            tracing::debug!(path = %self.path.display(), "Stored value changed externally");
        }
        changed
    }

    /// Poll the backing file every `period` until `cancel` fires
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn_poller(&self, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let cell = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        cell.reload();
                    }
                }
            }
        })
    }
}

impl<T> PersistentCell<T> for FileCell<T>
where
    T: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static,
{
    fn read(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    fn write(&self, value: Option<T>) -> Result<()> {
        self.persist(value.as_ref())?;
        replace_if_changed(&self.tx, value);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_cell_write_notifies() {
        let cell = MemoryCell::<String>::default();
        let rx = cell.subscribe();
        assert!(!rx.has_changed().unwrap());

        cell.write(Some("tok".to_string())).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(cell.read(), Some("tok".to_string()));
    }

    #[test]
    fn test_memory_cell_equal_write_is_silent() {
        let cell = MemoryCell::new(Some("tok".to_string()));
        let rx = cell.subscribe();

        cell.write(Some("tok".to_string())).unwrap();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_memory_cell_clones_share_slot() {
        let window_a = MemoryCell::<String>::default();
        let window_b = window_a.clone();
        let rx = window_a.subscribe();

        window_b.write(Some("from-b".to_string())).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(window_a.read(), Some("from-b".to_string()));
    }

    #[test]
    fn test_file_cell_persists_across_opens() {
        let temp_dir = TempDir::new().unwrap();
        let cell = FileCell::<String>::in_dir(temp_dir.path(), "auth.twitch");
        assert_eq!(cell.read(), None);

        cell.write(Some("persisted".to_string())).unwrap();

        let reopened = FileCell::<String>::in_dir(temp_dir.path(), "auth.twitch");
        assert_eq!(reopened.read(), Some("persisted".to_string()));
        assert!(temp_dir.path().join("auth.twitch.json").exists());
    }

    #[test]
    fn test_file_cell_clear_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let cell = FileCell::<String>::in_dir(temp_dir.path(), "state");
        cell.write(Some("nonce".to_string())).unwrap();
        assert!(cell.path().exists());

        cell.write(None).unwrap();
        assert!(!cell.path().exists());
        assert_eq!(cell.read(), None);

        // Clearing an already empty cell is fine
        cell.write(None).unwrap();
    }

    #[test]
    fn test_file_cell_unparseable_is_absent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();

        let cell = FileCell::<String>::open(&path);
        assert_eq!(cell.read(), None);
    }

    #[test]
    fn test_file_cell_reload_sees_external_write() {
        let temp_dir = TempDir::new().unwrap();
        let ours = FileCell::<String>::in_dir(temp_dir.path(), "auth.twitch");
        let rx = ours.subscribe();

        // A second, independent handle stands in for another process
        let theirs = FileCell::<String>::in_dir(temp_dir.path(), "auth.twitch");
        theirs.write(Some("external".to_string())).unwrap();
        assert!(!rx.has_changed().unwrap());

        assert!(ours.reload());
        assert!(rx.has_changed().unwrap());
        assert_eq!(ours.read(), Some("external".to_string()));

        // Nothing new on disk
        assert!(!ours.reload());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_cell_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let cell = FileCell::<String>::in_dir(temp_dir.path(), "auth.twitch");
        cell.write(Some("secret".to_string())).unwrap();

        let mode = std::fs::metadata(cell.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_file_cell_readers_never_see_partial_write() {
        let temp_dir = TempDir::new().unwrap();
        let writer = FileCell::<String>::in_dir(temp_dir.path(), "auth.twitch");
        writer.write(Some("token-0".to_string())).unwrap();
        let path = writer.path().to_path_buf();

        let handle = std::thread::spawn(move || {
            for i in 1..200 {
                writer.write(Some(format!("token-{i}"))).unwrap();
            }
        });

        while !handle.is_finished() {
            assert!(FileCell::<String>::load(&path).is_some());
        }
        handle.join().unwrap();
        assert_eq!(FileCell::<String>::load(&path), Some("token-199".to_string()));
    }

    #[test]
    fn test_file_cell_write_failure_is_storage_error() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        let cell = FileCell::<String>::in_dir(&blocker, "auth.twitch");
        let err = cell.write(Some("tok".to_string())).unwrap_err();

        match err {
            SessionError::Storage(msg) => assert!(msg.contains("not-a-dir")),
            other => panic!("expected storage error, got {other:?}"),
        }
        assert_eq!(cell.read(), None);
    }

    #[test]
    fn test_file_cell_clear_failure_keeps_value() {
        let temp_dir = TempDir::new().unwrap();
        let cell = FileCell::<String>::in_dir(temp_dir.path(), "auth.twitch");
        cell.write(Some("tok".to_string())).unwrap();
        let rx = cell.subscribe();

        // A directory at the target path cannot be removed as a file
        std::fs::remove_file(cell.path()).unwrap();
        std::fs::create_dir(cell.path()).unwrap();

        let err = cell.write(None).unwrap_err();
        assert!(matches!(err, SessionError::Storage(_)));
        assert_eq!(cell.read(), Some("tok".to_string()));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_file_cell_poller_picks_up_change() {
        let temp_dir = TempDir::new().unwrap();
        let ours = FileCell::<String>::in_dir(temp_dir.path(), "auth.twitch");
        let mut rx = ours.subscribe();
        let cancel = CancellationToken::new();
        let poller = ours.spawn_poller(Duration::from_millis(10), cancel.clone());

        let theirs = FileCell::<String>::in_dir(temp_dir.path(), "auth.twitch");
        theirs.write(Some("polled".to_string())).unwrap();

        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("poller should notice the write")
            .unwrap();
        assert_eq!(rx.borrow().clone(), Some("polled".to_string()));

        cancel.cancel();
        poller.await.unwrap();
    }
}
