//! Key-value slots that hold serialized collections.
//!
//! [`FileStorage`] keeps one `<key>.json` file per slot inside a data
//! directory, replacing it atomically through a temporary file.
//! [`MemoryStorage`] keeps slots in a map and is shared by clones.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, trace};

use crate::error::StorageError;

const STORAGE_KEY_PREFIX: &str = "gemini-notepad-data-";
const TMP_SUFFIX: &str = ".tmp";

pub fn storage_key(user_id: &str) -> String {
    format!("{STORAGE_KEY_PREFIX}{user_id}")
}

pub trait Storage {
    /// `Ok(None)` means the slot has never been written.
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).read(key)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).write(key, value)
    }
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    basedir: PathBuf,
}

impl FileStorage {
    pub fn new(basedir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let basedir = basedir.into();
        debug!("opening file storage at \"{}\"", basedir.display());
        fs::create_dir_all(&basedir)?;
        Ok(FileStorage { basedir })
    }

    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    fn slot_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        Ok(self.basedir.join(format!("{key}.json")))
    }
}

impl Storage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.slot_path(key)?;
        trace!("reading slot \"{key}\" from \"{}\"", path.display());
        match fs::read_to_string(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.slot_path(key)?;
        let mut tmp_path = path.clone().into_os_string();
        tmp_path.push(TMP_SUFFIX);
        let tmp_path = PathBuf::from(tmp_path);
        trace!("writing slot \"{key}\" through \"{}\"", tmp_path.display());
        fs::write(&tmp_path, value)?;
        if let Err(e) = fs::rename(&tmp_path, &path) {
            error!(
                "failed to move \"{}\" into place for slot \"{key}\": {e}",
                tmp_path.display(),
            );
            if let Err(e) = fs::remove_file(&tmp_path) {
                error!("failed to remove \"{}\": {e}", tmp_path.display());
            }
            return Err(e.into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slots: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(slots.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}
