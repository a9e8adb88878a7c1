//! Persists one JSON document per session (`spec.md` §3 ScrumSession,
//! §6 "Session file"), following the teacher's `at-core::session_store`
//! single-writer-per-file convention -- no lock is needed since each
//! session is mutated only by the orchestrator instance running it
//! (`spec.md` §5).

use std::path::{Path, PathBuf};

use frank_core::atomic_io;
use frank_core::error::CoreError;
use frank_core::types::ScrumSession;

pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    pub fn save(&self, session: &ScrumSession) -> Result<(), CoreError> {
        atomic_io::write_json_atomic(&self.path_for(&session.id), session)
    }

    pub fn load(&self, id: &str) -> Result<ScrumSession, CoreError> {
        atomic_io::read_json(&self.path_for(id))
    }

    pub fn list(&self) -> Result<Vec<String>, CoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Parent directory must exist before the first save (mirrors
/// `at-core::session_store`'s fixture setup in tests).
pub fn ensure_dir(dir: &Path) -> Result<(), CoreError> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}
