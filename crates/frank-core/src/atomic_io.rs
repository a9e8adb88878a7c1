//! Atomic file writes: every filesystem-backed component (`frank-registry`,
//! `frank-scrum`, `frank-creds`) persists its documents through this helper
//! rather than writing in place, so a crash or a concurrent reader never
//! observes a half-written file.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::error::CoreError;

/// Writes `contents` to `path` by writing to a sibling temp file and
/// renaming it into place. The rename is atomic on the same filesystem,
/// which is all this needs since callers always write within one directory.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CoreError> {
    let dir = path.parent().ok_or_else(|| {
        CoreError::InvalidArgument(format!("path {path:?} has no parent directory"))
    })?;
    fs::create_dir_all(dir)?;

    let tmp_name = format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("frank"),
        std::process::id()
    );
    let tmp_path = dir.join(tmp_name);

    {
        let mut f = File::create(&tmp_path)?;
        f.write_all(contents)?;
        f.sync_all()?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        CoreError::from(e)
    })?;
    Ok(())
}

/// Serializes `value` as pretty JSON and writes it atomically.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), CoreError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)
}

/// Reads and deserializes a JSON document written by [`write_json_atomic`].
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CoreError> {
    let bytes = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CoreError::NotFound(format!("{path:?}"))
        } else {
            CoreError::from(e)
        }
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        name: String,
        count: u32,
    }

    #[test]
    fn roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub").join("doc.json");
        let doc = Doc { name: "a".into(), count: 3 };

        write_json_atomic(&path, &doc).unwrap();
        let back: Doc = read_json(&path).unwrap();
        assert_eq!(doc, back);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.json");
        let err = read_json::<Doc>(&path).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        write_atomic(&path, b"hello").unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }
}
