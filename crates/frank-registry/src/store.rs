//! On-disk document shape (`spec.md` §6): `{version, profiles: {name: spec}}`
//! at a single well-known path, mode 0600, written atomically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use frank_core::atomic_io;
use frank_core::error::CoreError;
use frank_core::types::Profile;
use serde::{Deserialize, Serialize};

const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileDocument {
    pub version: u32,
    pub profiles: HashMap<String, Profile>,
}

impl Default for ProfileDocument {
    fn default() -> Self {
        Self { version: CURRENT_VERSION, profiles: HashMap::new() }
    }
}

pub fn lock_path(doc_path: &Path) -> PathBuf {
    let mut name = doc_path.file_name().and_then(|n| n.to_str()).unwrap_or("profiles").to_string();
    name.push_str(".lock");
    doc_path.with_file_name(name)
}

pub fn load_or_default(path: &Path) -> Result<ProfileDocument, CoreError> {
    match atomic_io::read_json::<ProfileDocument>(path) {
        Ok(doc) => Ok(doc),
        Err(CoreError::NotFound(_)) => Ok(ProfileDocument::default()),
        Err(e) => Err(e),
    }
}

pub fn save(path: &Path, doc: &ProfileDocument) -> Result<(), CoreError> {
    atomic_io::write_json_atomic(path, doc)
}
