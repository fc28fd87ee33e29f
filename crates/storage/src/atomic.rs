//! Atomic JSON document persistence.
//!
//! Every persisted document is written to a temporary file in the target
//! directory, synced, then renamed over the destination. A crash or
//! cancellation mid-write leaves either the old document or the new one
//! visible, never a partial file. Documents are mode 0600.

use crate::error::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

const FILE_MODE: u32 = 0o600;

/// Serializes `value` as pretty JSON and atomically replaces `path`.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| StorageError::Document {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp_name);
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(FILE_MODE)
            .open(&tmp)
            .map_err(|e| StorageError::io(&tmp, e))?;
        file.write_all(&bytes).map_err(|e| StorageError::io(&tmp, e))?;
        file.sync_all().map_err(|e| StorageError::io(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| StorageError::io(path, e))
}

/// Reads a JSON document, returning `T::default()` when the file does not
/// exist yet.
pub fn read_json_or_default<T>(path: &Path) -> Result<T, StorageError>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        return Ok(T::default());
    }
    read_json(path)
}

/// Reads a JSON document that must exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let bytes = fs::read(path).map_err(|e| StorageError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| StorageError::Document {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_json(&path, &vec![1u32, 2, 3]).unwrap();
        let back: Vec<u32> = read_json(&path).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
        // No temp file left behind.
        assert!(!dir.path().join("doc.json.tmp").exists());
    }

    #[test]
    fn documents_are_private() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_json(&path, &"x").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, FILE_MODE);
    }

    #[test]
    fn missing_file_yields_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let v: Vec<String> = read_json_or_default(&path).unwrap();
        assert!(v.is_empty());
        assert!(read_json::<Vec<String>>(&path).is_err());
    }

    #[test]
    fn replace_preserves_old_until_rename() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_json(&path, &"first").unwrap();
        write_json(&path, &"second").unwrap();
        let back: String = read_json(&path).unwrap();
        assert_eq!(back, "second");
    }
}
