//! The three credential variants (`spec.md` §4.6), each reduced to the
//! same local-replica interface the synchronizer drives. Differences are
//! confined to how a variant reads/writes its local disk representation
//! and, for `AssistantOauthBackend`, how it refreshes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use frank_core::error::CoreError;
use frank_core::types::{CredentialKind, CredentialRecord, OauthFields};

/// A credential variant's local-replica read/write surface. The
/// synchronizer only ever deals in `CredentialRecord`s and raw bytes; it
/// never knows whether the backing store is a single file or a directory.
pub trait CredentialBackend: Send + Sync {
    /// Stable remote secret id (`spec.md` §6).
    fn secret_id(&self) -> &str;

    /// Reads the current local replica, or `None` if nothing is stored yet
    /// (first run, or an API key variant with no bootstrap value).
    fn read_local(&self) -> Result<Option<CredentialRecord>, CoreError>;

    /// Overwrites the local replica with `record` (owner-only perms via
    /// [`frank_core::atomic_io`]).
    fn write_local(&self, record: &CredentialRecord) -> Result<(), CoreError>;
}

/// Cheap non-cryptographic content hash used for the "did local/remote
/// change" comparisons in `spec.md` §4.6 -- matches `frank-routing`'s use
/// of `DefaultHasher` for the priority-band assignment, the teacher's
/// style of reaching for `std::hash` rather than a checksum crate for
/// internal change-detection (not integrity verification).
pub fn content_hash(record: &CredentialRecord) -> Result<u64, CoreError> {
    let bytes = serde_json::to_vec(record)?;
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    Ok(hasher.finish())
}

// ---------------------------------------------------------------------------
// Assistant OAuth
// ---------------------------------------------------------------------------

/// Local file is the `CredentialRecord` itself, serialized as JSON with its
/// nested `oauth` object; the remote secret holds the same bytes.
pub struct AssistantOauthBackend {
    secret_id: String,
    local_path: PathBuf,
}

impl AssistantOauthBackend {
    pub fn new(secret_id: impl Into<String>, local_path: impl AsRef<Path>) -> Self {
        Self { secret_id: secret_id.into(), local_path: local_path.as_ref().to_path_buf() }
    }
}

impl CredentialBackend for AssistantOauthBackend {
    fn secret_id(&self) -> &str {
        &self.secret_id
    }

    fn read_local(&self) -> Result<Option<CredentialRecord>, CoreError> {
        match frank_core::atomic_io::read_json(&self.local_path) {
            Ok(record) => Ok(Some(record)),
            Err(CoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_local(&self, record: &CredentialRecord) -> Result<(), CoreError> {
        frank_core::atomic_io::write_json_atomic(&self.local_path, record)
    }
}

// ---------------------------------------------------------------------------
// File set
// ---------------------------------------------------------------------------

/// Local store is a directory; the packed payload is a JSON object mapping
/// each file's name to its base64-encoded content (`spec.md` §4.6).
pub struct FileSetBackend {
    secret_id: String,
    dir: PathBuf,
}

impl FileSetBackend {
    pub fn new(secret_id: impl Into<String>, dir: impl AsRef<Path>) -> Self {
        Self { secret_id: secret_id.into(), dir: dir.as_ref().to_path_buf() }
    }

    fn pack(&self) -> Result<Option<String>, CoreError> {
        if !self.dir.exists() {
            return Ok(None);
        }
        let mut packed = serde_json::Map::new();
        let mut entries: Vec<_> = std::fs::read_dir(&self.dir)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let bytes = std::fs::read(entry.path())?;
            packed.insert(name, serde_json::Value::String(BASE64.encode(bytes)));
        }
        if packed.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::to_string(&packed)?))
    }

    fn unpack(&self, payload: &str) -> Result<(), CoreError> {
        let packed: serde_json::Map<String, serde_json::Value> = serde_json::from_str(payload)?;
        std::fs::create_dir_all(&self.dir)?;
        for (name, value) in packed {
            let b64 = value.as_str().ok_or_else(|| {
                CoreError::InvalidArgument(format!("file set entry {name} is not a string"))
            })?;
            let bytes = BASE64
                .decode(b64)
                .map_err(|e| CoreError::InvalidArgument(format!("file set entry {name}: {e}")))?;
            frank_core::atomic_io::write_atomic(&self.dir.join(&name), &bytes)?;
        }
        Ok(())
    }
}

impl CredentialBackend for FileSetBackend {
    fn secret_id(&self) -> &str {
        &self.secret_id
    }

    fn read_local(&self) -> Result<Option<CredentialRecord>, CoreError> {
        Ok(self
            .pack()?
            .map(|payload| CredentialRecord { kind: CredentialKind::FileSet, payload, oauth: None }))
    }

    fn write_local(&self, record: &CredentialRecord) -> Result<(), CoreError> {
        self.unpack(&record.payload)
    }
}

// ---------------------------------------------------------------------------
// Per-agent API key
// ---------------------------------------------------------------------------

/// Secret id is `<prefix>/api-key/<agent_name>` (`spec.md` §6). Local
/// bootstrap order when no local file exists yet: an agent-specific-secret
/// file, then an environment variable, then nothing.
pub struct ApiKeyBackend {
    secret_id: String,
    local_path: PathBuf,
    env_fallback: String,
}

impl ApiKeyBackend {
    pub fn new(
        prefix: &str,
        agent_name: &str,
        local_path: impl AsRef<Path>,
        env_fallback: impl Into<String>,
    ) -> Self {
        Self {
            secret_id: format!("{prefix}/api-key/{agent_name}"),
            local_path: local_path.as_ref().to_path_buf(),
            env_fallback: env_fallback.into(),
        }
    }

    fn bootstrap_from_env(&self) -> Option<CredentialRecord> {
        std::env::var(&self.env_fallback)
            .ok()
            .filter(|v| !v.is_empty())
            .map(|v| CredentialRecord { kind: CredentialKind::OpaqueApiKey, payload: v, oauth: None })
    }
}

impl CredentialBackend for ApiKeyBackend {
    fn secret_id(&self) -> &str {
        &self.secret_id
    }

    fn read_local(&self) -> Result<Option<CredentialRecord>, CoreError> {
        match frank_core::atomic_io::read_json::<CredentialRecord>(&self.local_path) {
            Ok(record) => Ok(Some(record)),
            Err(CoreError::NotFound(_)) => Ok(self.bootstrap_from_env()),
            Err(e) => Err(e),
        }
    }

    fn write_local(&self, record: &CredentialRecord) -> Result<(), CoreError> {
        frank_core::atomic_io::write_json_atomic(&self.local_path, record)
    }
}

/// `true` when `record` is an OAuth bundle whose `expires_at_ms` is under
/// `now_ms + 30 min` (`spec.md` §4.6, §8 property 7).
pub fn needs_refresh(record: &CredentialRecord, now_ms: i64) -> bool {
    matches!(
        &record.oauth,
        Some(OauthFields { expires_at_ms, .. }) if *expires_at_ms < now_ms + 30 * 60 * 1000
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_set_round_trips_through_pack_unpack() {
        let dir = TempDir::new().unwrap();
        let local_dir = dir.path().join("files");
        std::fs::create_dir_all(&local_dir).unwrap();
        std::fs::write(local_dir.join("a.txt"), b"hello").unwrap();
        std::fs::write(local_dir.join("b.txt"), b"world").unwrap();

        let backend = FileSetBackend::new("secret/x", &local_dir);
        let record = backend.read_local().unwrap().unwrap();

        let restore_dir = dir.path().join("restored");
        let restore_backend = FileSetBackend::new("secret/x", &restore_dir);
        restore_backend.write_local(&record).unwrap();

        assert_eq!(std::fs::read(restore_dir.join("a.txt")).unwrap(), b"hello");
        assert_eq!(std::fs::read(restore_dir.join("b.txt")).unwrap(), b"world");
    }

    #[test]
    fn file_set_empty_dir_has_no_local_record() {
        let dir = TempDir::new().unwrap();
        let backend = FileSetBackend::new("secret/x", dir.path().join("files"));
        assert!(backend.read_local().unwrap().is_none());
    }

    #[test]
    fn api_key_bootstraps_from_env_when_no_local_file() {
        let dir = TempDir::new().unwrap();
        let env_name = "FRANK_TEST_API_KEY_BOOTSTRAP";
        std::env::set_var(env_name, "sk-test-123");
        let backend = ApiKeyBackend::new("pnyx", "proj-a", dir.path().join("key.json"), env_name);
        let record = backend.read_local().unwrap().unwrap();
        assert_eq!(record.payload, "sk-test-123");
        std::env::remove_var(env_name);
    }

    #[test]
    fn api_key_is_none_with_no_file_and_no_env() {
        let dir = TempDir::new().unwrap();
        let backend = ApiKeyBackend::new("pnyx", "proj-a", dir.path().join("key.json"), "FRANK_TEST_API_KEY_ABSENT");
        assert!(backend.read_local().unwrap().is_none());
    }

    #[test]
    fn needs_refresh_true_within_thirty_minutes_of_expiry() {
        let now = 1_700_000_000_000i64;
        let record = CredentialRecord {
            kind: CredentialKind::OauthTokenBundle,
            payload: String::new(),
            oauth: Some(OauthFields {
                access_token: "a".into(),
                refresh_token: "r".into(),
                expires_at_ms: now + 10 * 60 * 1000,
            }),
        };
        assert!(needs_refresh(&record, now));
    }

    #[test]
    fn needs_refresh_false_with_plenty_of_headroom() {
        let now = 1_700_000_000_000i64;
        let record = CredentialRecord {
            kind: CredentialKind::OauthTokenBundle,
            payload: String::new(),
            oauth: Some(OauthFields {
                access_token: "a".into(),
                refresh_token: "r".into(),
                expires_at_ms: now + 2 * 60 * 60 * 1000,
            }),
        };
        assert!(!needs_refresh(&record, now));
    }

    #[test]
    fn content_hash_is_stable_and_change_sensitive() {
        let a = CredentialRecord { kind: CredentialKind::OpaqueApiKey, payload: "x".into(), oauth: None };
        let b = CredentialRecord { kind: CredentialKind::OpaqueApiKey, payload: "y".into(), oauth: None };
        assert_eq!(content_hash(&a).unwrap(), content_hash(&a).unwrap());
        assert_ne!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }
}
