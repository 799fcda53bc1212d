//! Durable key/value settings shared by every cell.
//!
//! A [`SettingsStore`] maps names to the canonical text of cell values and
//! mirrors that map into a JSON settings file. The handle is cheap to clone
//! and deliberately `!Send`: it must only be used from the thread that owns
//! the cells. An application that wants to touch settings from another thread
//! should send messages to the owning thread instead of sharing the handle.
//!
//! One store per process is a convention of the composition root, which
//! creates the store once and hands it to every cell.

use crate::error::{CellError, StoreError};
use crate::graph::{self, CellId};
use directories::ProjectDirs;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Where a settings file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub application_name: String,
    pub vendor: String,
    pub filename_suffix: String,
    /// Overrides the platform configuration directory.
    pub directory: Option<PathBuf>,
}

impl StoreOptions {
    pub fn new(application_name: impl Into<String>, vendor: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            vendor: vendor.into(),
            filename_suffix: ".settings".to_owned(),
            directory: None,
        }
    }

    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn filename_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.filename_suffix = suffix.into();
        self
    }

    /// `<config dir>/<application><suffix>`, where the config dir is the
    /// per-vendor, per-application directory of the current platform.
    ///
    /// Returns `None` when no home directory can be determined.
    pub fn settings_path(&self) -> Option<PathBuf> {
        let directory = match &self.directory {
            Some(directory) => directory.clone(),
            None => ProjectDirs::from("", &self.vendor, &self.application_name)?
                .config_dir()
                .to_path_buf(),
        };
        Some(directory.join(format!("{}{}", self.application_name, self.filename_suffix)))
    }
}

#[derive(Debug)]
struct StoreInner {
    values: BTreeMap<String, String>,
    path: Option<PathBuf>,
    dirty: bool,
    /// Set once the backing file failed; the store then lives in memory only.
    degraded: bool,
    /// Cells tracked for `reset_all`, in construction order.
    registered: Vec<CellId>,
}

impl StoreInner {
    fn new(path: Option<PathBuf>, values: BTreeMap<String, String>) -> Self {
        Self {
            values,
            path,
            dirty: false,
            degraded: false,
            registered: Vec::new(),
        }
    }

    fn flush(&mut self) -> Result<bool, StoreError> {
        if !self.dirty {
            return Ok(false);
        }
        self.dirty = false;

        let Some(path) = self.path.clone() else {
            return Ok(false);
        };
        if self.degraded {
            return Ok(false);
        }

        match write_settings(&path, &self.values) {
            Ok(()) => {
                tracing::debug!(
                    path = %path.display(),
                    entries = self.values.len(),
                    "settings flushed"
                );
                Ok(true)
            }
            Err(source) => {
                self.degraded = true;
                Err(StoreError::StorageUnavailable { path, source })
            }
        }
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            tracing::warn!(%err, "final settings flush failed");
        }
        if let Some(path) = &self.path {
            tracing::info!(path = %path.display(), "settings store closed");
        }
    }
}

/// Shared handle to the settings map and its backing file.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    inner: Rc<RefCell<StoreInner>>,
}

impl SettingsStore {
    /// A store that never touches the disk.
    pub fn in_memory() -> Self {
        Self::from_inner(StoreInner::new(None, BTreeMap::new()))
    }

    /// Open the settings file described by `options`.
    ///
    /// Falls back to an in-memory store (with a warning) when the file cannot
    /// be located, read or parsed.
    pub fn open(options: &StoreOptions) -> Self {
        match options.settings_path() {
            Some(path) => Self::at_path(path),
            None => {
                tracing::warn!(
                    application = %options.application_name,
                    "no configuration directory available, settings will only be kept in memory"
                );
                Self::in_memory()
            }
        }
    }

    /// Like [`try_at_path`](Self::try_at_path), but degrades to in-memory
    /// operation instead of failing.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::try_at_path(&path) {
            Ok(store) => store,
            Err(err) => {
                tracing::warn!(%err, "settings will only be kept in memory");
                let mut inner = StoreInner::new(Some(path), BTreeMap::new());
                inner.degraded = true;
                Self::from_inner(inner)
            }
        }
    }

    /// Load `path`, creating an empty settings file if it does not exist yet.
    pub fn try_at_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            read_settings(&path)?
        } else {
            let values = BTreeMap::new();
            write_settings(&path, &values).map_err(|source| StoreError::StorageUnavailable {
                path: path.clone(),
                source,
            })?;
            values
        };
        tracing::debug!(path = %path.display(), entries = values.len(), "settings loaded");
        Ok(Self::from_inner(StoreInner::new(Some(path), values)))
    }

    fn from_inner(inner: StoreInner) -> Self {
        Self {
            inner: Rc::new(RefCell::new(inner)),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.borrow().values.get(key).cloned()
    }

    /// The stored text for `key`, or `default` when there is none. Never writes.
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_owned())
    }

    /// Write `text` under `key`. The store only becomes dirty when the stored
    /// text actually changes.
    pub fn set(&self, key: &str, text: &str) {
        let mut inner = self.inner.borrow_mut();
        if inner.values.get(key).map(String::as_str) == Some(text) {
            return;
        }
        inner.values.insert(key.to_owned(), text.to_owned());
        inner.dirty = true;
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.borrow_mut();
        let removed = inner.values.remove(key);
        if removed.is_some() {
            inner.dirty = true;
        }
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.borrow().values.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.borrow().values.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().values.is_empty()
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.inner.borrow().path.clone()
    }

    /// True once the backing file has failed and writes stay in memory.
    pub fn is_degraded(&self) -> bool {
        self.inner.borrow().degraded
    }

    /// Write pending changes to the settings file.
    ///
    /// Returns `Ok(true)` if the file was written, `Ok(false)` if there was
    /// nothing to write. The first failed write is reported as
    /// [`StoreError::StorageUnavailable`]; afterwards the store keeps working
    /// in memory and flushes become no-ops.
    pub fn flush_if_dirty(&self) -> Result<bool, StoreError> {
        self.inner.borrow_mut().flush()
    }

    /// Flush, logging instead of returning a failure.
    pub(crate) fn flush_or_warn(&self) {
        if let Err(err) = self.flush_if_dirty() {
            tracing::warn!(%err, "settings will only be kept in memory");
        }
    }

    /// Reset every registered cell to its default, newest cell first.
    ///
    /// Cells without a default (followers) are skipped. Returns how many
    /// cells changed value.
    pub fn reset_all(&self) -> usize {
        let registered: Vec<CellId> =
            self.inner.borrow().registered.iter().rev().copied().collect();

        let mut changed = 0;
        for id in registered {
            match graph::reset_node(id) {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(CellError::NoDefault { cell }) => {
                    tracing::debug!(%cell, "skipping reset of cell without a default");
                }
                Err(err) => tracing::warn!(%err, "cell could not be reset"),
            }
        }
        changed
    }

    /// Pretty-printed snapshot of every entry, for diagnostics.
    pub fn dump(&self) -> String {
        serde_json::to_string_pretty(&self.inner.borrow().values).unwrap_or_default()
    }

    pub(crate) fn register(&self, id: CellId) {
        self.inner.borrow_mut().registered.push(id);
    }

    pub(crate) fn unregister(&self, id: CellId) {
        self.inner.borrow_mut().registered.retain(|registered| *registered != id);
    }

    pub(crate) fn same_store(&self, other: &SettingsStore) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

fn read_settings(path: &Path) -> Result<BTreeMap<String, String>, StoreError> {
    let contents = fs::read_to_string(path).map_err(|source| StoreError::StorageUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    if contents.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(&contents).map_err(|source| StoreError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Write through a sibling temporary file so a crash never leaves a
/// half-written settings file behind.
fn write_settings(path: &Path, values: &BTreeMap<String, String>) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut contents = serde_json::to_vec_pretty(values)?;
    contents.push(b'\n');

    let mut temporary = path.as_os_str().to_owned();
    temporary.push(".tmp");
    let temporary = PathBuf::from(temporary);
    fs::write(&temporary, contents)?;
    fs::rename(&temporary, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_does_not_write() {
        let store = SettingsStore::in_memory();
        assert_eq!(store.get_or("missing", "fallback"), "fallback");
        assert!(!store.contains("missing"));
    }

    #[test]
    fn test_set_marks_dirty_only_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::try_at_path(dir.path().join("app.settings")).unwrap();

        store.set("k", "1");
        assert_eq!(store.flush_if_dirty().unwrap(), true);
        store.set("k", "1");
        assert_eq!(store.flush_if_dirty().unwrap(), false);
        store.set("k", "2");
        assert_eq!(store.flush_if_dirty().unwrap(), true);
    }

    #[test]
    fn test_missing_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("app.settings");
        let store = SettingsStore::try_at_path(&path).unwrap();
        assert!(path.exists());
        assert!(store.is_empty());
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.settings");
        {
            let store = SettingsStore::try_at_path(&path).unwrap();
            store.set("colour", "ffff0000");
            store.set("volume", "0.5");
        }
        let store = SettingsStore::try_at_path(&path).unwrap();
        assert_eq!(store.get("colour").as_deref(), Some("ffff0000"));
        assert_eq!(store.keys(), vec!["colour".to_owned(), "volume".to_owned()]);
    }

    #[test]
    fn test_remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.settings");
        let store = SettingsStore::try_at_path(&path).unwrap();
        store.set("a", "1");
        store.flush_if_dirty().unwrap();
        assert_eq!(store.remove("a").as_deref(), Some("1"));
        store.flush_if_dirty().unwrap();

        let reopened = SettingsStore::try_at_path(&path).unwrap();
        assert!(!reopened.contains("a"));
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.settings");
        fs::write(&path, "<xml/>").unwrap();

        let err = SettingsStore::try_at_path(&path).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));

        let store = SettingsStore::at_path(&path);
        assert!(store.is_degraded());
        store.set("k", "v");
        assert_eq!(store.flush_if_dirty().unwrap(), false);
        assert_eq!(fs::read_to_string(&path).unwrap(), "<xml/>");
    }

    #[test]
    fn test_unwritable_file_reports_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.settings");
        let store = SettingsStore::try_at_path(&path).unwrap();

        // A directory where the temporary file should go makes every write fail.
        let mut temporary = path.as_os_str().to_owned();
        temporary.push(".tmp");
        fs::create_dir(PathBuf::from(temporary)).unwrap();

        store.set("k", "1");
        assert!(matches!(
            store.flush_if_dirty(),
            Err(StoreError::StorageUnavailable { .. })
        ));
        assert!(store.is_degraded());

        store.set("k", "2");
        assert_eq!(store.flush_if_dirty().unwrap(), false);
        assert_eq!(store.get("k").as_deref(), Some("2"));
    }

    #[test]
    fn test_settings_path_layout() {
        let options = StoreOptions::new("ColourDemo", "Acme").directory("/tmp/acme");
        assert_eq!(
            options.settings_path(),
            Some(PathBuf::from("/tmp/acme/ColourDemo.settings"))
        );

        let options = options.filename_suffix(".json");
        assert_eq!(
            options.settings_path(),
            Some(PathBuf::from("/tmp/acme/ColourDemo.json"))
        );
    }

    #[test]
    fn test_dump_lists_entries() {
        let store = SettingsStore::in_memory();
        store.set("b", "2");
        store.set("a", "1");
        assert_eq!(store.dump(), "{\n  \"a\": \"1\",\n  \"b\": \"2\"\n}");
    }
}
