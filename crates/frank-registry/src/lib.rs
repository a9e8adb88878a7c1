//! Persistent mapping from profile name to profile spec (`spec.md` §4.2).

mod store;

use std::path::PathBuf;
use std::sync::Arc;

use fs2::FileExt;
use frank_cloud::CloudAdapter;
use frank_core::error::CoreError;
use frank_core::types::{validate_profile_name, Profile};
use tracing::info;

use store::ProfileDocument;

pub struct ProfileRegistry {
    path: PathBuf,
}

impl ProfileRegistry {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn list(&self) -> Result<Vec<Profile>, CoreError> {
        Ok(store::load_or_default(&self.path)?.profiles.into_values().collect())
    }

    pub fn get(&self, name: &str) -> Result<Profile, CoreError> {
        store::load_or_default(&self.path)?
            .profiles
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("profile {name}")))
    }

    /// Overwrites if `profile.name` already exists (`spec.md` §4.2).
    pub fn add(&self, profile: Profile) -> Result<(), CoreError> {
        validate_profile_name(&profile.name)?;
        self.with_lock(|doc| {
            doc.profiles.insert(profile.name.clone(), profile.clone());
            info!(profile = %profile.name, "profile added");
            Ok(())
        })
    }

    pub fn remove(&self, name: &str) -> Result<(), CoreError> {
        validate_profile_name(name)?;
        self.with_lock(|doc| {
            if doc.profiles.remove(name).is_none() {
                return Err(CoreError::NotFound(format!("profile {name}")));
            }
            info!(profile = name, "profile removed");
            Ok(())
        })
    }

    /// Serialises the current profile set to the parameter store, as a
    /// single atomic overwrite (`spec.md` §4.2, §6).
    pub async fn sync_to_cloud(
        &self,
        cloud: &Arc<dyn CloudAdapter>,
        parameter_name: &str,
    ) -> Result<(), CoreError> {
        let profiles = self.list()?;
        let value = serde_json::to_string(&profiles)?;
        cloud.put_parameter(parameter_name, &value).await?;
        info!(count = profiles.len(), "profiles synced to cloud parameter store");
        Ok(())
    }

    /// Holds an `fs2` advisory lock over the whole read-modify-write cycle
    /// so two concurrent writers never interleave (`spec.md` §5), following
    /// the teacher's `DaemonLockfile`/`SettingsManager` atomic-write idiom.
    fn with_lock(
        &self,
        mutate: impl FnOnce(&mut ProfileDocument) -> Result<(), CoreError>,
    ) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let lock_path = store::lock_path(&self.path);
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)?;
        lock_file.lock_exclusive().map_err(|e| {
            CoreError::Transient(format!("failed to acquire registry lock: {e}"))
        })?;

        let mut doc = store::load_or_default(&self.path)?;
        let result = mutate(&mut doc);
        if result.is_ok() {
            store::save(&self.path, &doc)?;
        }

        fs2::FileExt::unlock(&lock_file).ok();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frank_core::types::AgentKind;
    use tempfile::TempDir;

    fn sample(name: &str) -> Profile {
        Profile {
            name: name.to_string(),
            repo: "https://example.invalid/r.git".to_string(),
            branch: Some("main".to_string()),
            description: None,
            category: None,
            agent: Some(AgentKind::Assistant),
            mode: None,
            task_prompt: None,
            model: None,
        }
    }

    #[test]
    fn add_then_get_roundtrips() {
        let dir = TempDir::new().unwrap();
        let reg = ProfileRegistry::new(dir.path().join("profiles.json"));
        reg.add(sample("proj-a")).unwrap();

        let got = reg.get("proj-a").unwrap();
        assert_eq!(got.repo, "https://example.invalid/r.git");
    }

    #[test]
    fn invalid_name_rejected() {
        let dir = TempDir::new().unwrap();
        let reg = ProfileRegistry::new(dir.path().join("profiles.json"));
        let err = reg.add(sample("Proj-A")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    #[test]
    fn add_overwrites_existing_name() {
        let dir = TempDir::new().unwrap();
        let reg = ProfileRegistry::new(dir.path().join("profiles.json"));
        reg.add(sample("proj-a")).unwrap();
        let mut updated = sample("proj-a");
        updated.description = Some("updated".to_string());
        reg.add(updated).unwrap();

        assert_eq!(reg.get("proj-a").unwrap().description.as_deref(), Some("updated"));
        assert_eq!(reg.list().unwrap().len(), 1);
    }

    #[test]
    fn remove_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let reg = ProfileRegistry::new(dir.path().join("profiles.json"));
        let err = reg.remove("proj-a").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn sync_to_cloud_writes_json_array() {
        let dir = TempDir::new().unwrap();
        let reg = ProfileRegistry::new(dir.path().join("profiles.json"));
        reg.add(sample("proj-a")).unwrap();

        let cloud: Arc<dyn CloudAdapter> = Arc::new(frank_cloud::fake::FakeCloud::new());
        reg.sync_to_cloud(&cloud, "/frank/profiles").await.unwrap();

        let stored = cloud.get_parameter("/frank/profiles").await.unwrap();
        let parsed: Vec<Profile> = serde_json::from_str(&stored).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "proj-a");
    }
}
