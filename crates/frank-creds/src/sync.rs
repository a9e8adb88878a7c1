//! The credential synchronizer skeleton shared by all three variants
//! (`spec.md` §4.6, §5): pull on startup, then loop forever on independent
//! push/pull/refresh intervals, grounded on the teacher's
//! `at-daemon::daemon::Daemon::run_loops` `tokio::select!` shape.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use frank_cloud::CloudAdapter;
use frank_core::error::CoreError;
use frank_core::types::CredentialRecord;
use tracing::{debug, info, warn};

use crate::backend::{content_hash, needs_refresh, CredentialBackend};
use crate::refresh::OauthRefresher;
use crate::shutdown::ShutdownSignal;

#[derive(Debug, Clone, Copy)]
pub struct CredsIntervals {
    pub push_check: Duration,
    pub pull_check: Duration,
    pub oauth_refresh_check: Duration,
}

impl Default for CredsIntervals {
    fn default() -> Self {
        Self {
            push_check: Duration::from_secs(5),
            pull_check: Duration::from_secs(60),
            oauth_refresh_check: Duration::from_secs(60),
        }
    }
}

pub struct CredentialSynchronizer {
    backend: Box<dyn CredentialBackend>,
    cloud: Arc<dyn CloudAdapter>,
    refresher: Option<Arc<dyn OauthRefresher>>,
    /// Hash of the record both replicas last agreed on, used to detect
    /// local or remote drift without re-fetching both sides every tick.
    last_synced_hash: Mutex<Option<u64>>,
}

impl CredentialSynchronizer {
    pub fn new(
        backend: Box<dyn CredentialBackend>,
        cloud: Arc<dyn CloudAdapter>,
        refresher: Option<Arc<dyn OauthRefresher>>,
    ) -> Self {
        Self { backend, cloud, refresher, last_synced_hash: Mutex::new(None) }
    }

    /// Remote -> local, when the remote differs from what was last synced
    /// (`spec.md` §4.6: startup pull, then every 60s).
    pub async fn pull_once(&self) -> Result<(), CoreError> {
        let raw = match self.cloud.get_secret(self.backend.secret_id()).await {
            Ok(raw) => raw,
            Err(CoreError::NotFound(_)) => {
                debug!(secret_id = self.backend.secret_id(), "pull: no remote secret yet");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let remote: CredentialRecord = serde_json::from_str(&raw)?;
        let remote_hash = content_hash(&remote)?;

        if self.last_synced_hash.lock().unwrap().as_ref() == Some(&remote_hash) {
            return Ok(());
        }

        self.backend.write_local(&remote)?;
        *self.last_synced_hash.lock().unwrap() = Some(remote_hash);
        info!(secret_id = self.backend.secret_id(), "pull: local updated from remote");
        Ok(())
    }

    /// Local -> remote, when the local replica differs from what was last
    /// synced (`spec.md` §4.6: every 5s).
    pub async fn push_if_changed(&self) -> Result<(), CoreError> {
        let Some(local) = self.backend.read_local()? else {
            return Ok(());
        };
        let local_hash = content_hash(&local)?;
        if self.last_synced_hash.lock().unwrap().as_ref() == Some(&local_hash) {
            return Ok(());
        }

        let raw = serde_json::to_string(&local)?;
        self.cloud.put_secret(self.backend.secret_id(), &raw).await?;
        *self.last_synced_hash.lock().unwrap() = Some(local_hash);
        info!(secret_id = self.backend.secret_id(), "push: remote updated from local");
        Ok(())
    }

    /// Refreshes an OAuth bundle nearing expiry and pushes the result
    /// (`spec.md` §4.6, §8 property 7). No-op for non-OAuth variants.
    pub async fn maybe_refresh(&self) -> Result<(), CoreError> {
        let Some(refresher) = &self.refresher else {
            return Ok(());
        };
        let Some(mut local) = self.backend.read_local()? else {
            return Ok(());
        };
        let Some(oauth) = &local.oauth else {
            return Ok(());
        };
        let now_ms = chrono::Utc::now().timestamp_millis();
        if !needs_refresh(&local, now_ms) {
            return Ok(());
        }

        let refreshed = refresher.refresh(oauth).await?;
        local.oauth = Some(refreshed);
        self.backend.write_local(&local)?;
        info!(secret_id = self.backend.secret_id(), "oauth token refreshed");

        let raw = serde_json::to_string(&local)?;
        self.cloud.put_secret(self.backend.secret_id(), &raw).await?;
        *self.last_synced_hash.lock().unwrap() = Some(content_hash(&local)?);
        Ok(())
    }

    /// Runs the three-interval loop until `shutdown` fires. Any single
    /// tick's failure is logged and the loop continues (`spec.md` §4.6:
    /// "best-effort ... the loop never crashes").
    pub async fn run(self: Arc<Self>, intervals: CredsIntervals, shutdown: ShutdownSignal) {
        if let Err(e) = self.pull_once().await {
            warn!(error = %e, "startup pull failed, continuing with local state");
        }

        let mut push_tick = tokio::time::interval(intervals.push_check);
        let mut pull_tick = tokio::time::interval(intervals.pull_check);
        let mut refresh_tick = tokio::time::interval(intervals.oauth_refresh_check);
        push_tick.tick().await;
        pull_tick.tick().await;
        refresh_tick.tick().await;

        let mut shutdown_rx = shutdown.subscribe();
        loop {
            tokio::select! {
                _ = push_tick.tick() => {
                    if let Err(e) = self.push_if_changed().await {
                        warn!(error = %e, "push check failed");
                    }
                }
                _ = pull_tick.tick() => {
                    if let Err(e) = self.pull_once().await {
                        warn!(error = %e, "pull check failed");
                    }
                }
                _ = refresh_tick.tick() => {
                    if let Err(e) = self.maybe_refresh().await {
                        warn!(error = %e, "oauth refresh check failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received, stopping credential sync loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ApiKeyBackend;
    use crate::refresh::fake::FakeRefresher;
    use frank_cloud::fake::FakeCloud;
    use frank_core::types::{CredentialKind, OauthFields};
    use tempfile::TempDir;

    #[tokio::test]
    async fn s6_empty_local_converges_to_remote_after_first_pull() {
        let dir = TempDir::new().unwrap();
        let cloud = Arc::new(FakeCloud::new());
        let remote = CredentialRecord { kind: CredentialKind::OpaqueApiKey, payload: "remote-value".into(), oauth: None };
        cloud.put_secret("pnyx/api-key/proj-a", &serde_json::to_string(&remote).unwrap()).await.unwrap();

        let backend = Box::new(ApiKeyBackend::new("pnyx", "proj-a", dir.path().join("key.json"), "FRANK_TEST_UNUSED"));
        let sync = CredentialSynchronizer::new(backend, cloud.clone(), None);

        sync.pull_once().await.unwrap();

        let local: CredentialRecord = frank_core::atomic_io::read_json(&dir.path().join("key.json")).unwrap();
        assert_eq!(local.payload, "remote-value");

        // No push occurs until local is modified: pushing now must be a
        // no-op because the hash matches what pull just recorded.
        let before = cloud.get_secret("pnyx/api-key/proj-a").await.unwrap();
        sync.push_if_changed().await.unwrap();
        let after = cloud.get_secret("pnyx/api-key/proj-a").await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn push_sends_local_change_once() {
        let dir = TempDir::new().unwrap();
        let cloud = Arc::new(FakeCloud::new());
        let local_path = dir.path().join("key.json");
        let record = CredentialRecord { kind: CredentialKind::OpaqueApiKey, payload: "v1".into(), oauth: None };
        frank_core::atomic_io::write_json_atomic(&local_path, &record).unwrap();

        let backend = Box::new(ApiKeyBackend::new("pnyx", "proj-a", &local_path, "FRANK_TEST_UNUSED"));
        let sync = CredentialSynchronizer::new(backend, cloud.clone(), None);

        sync.push_if_changed().await.unwrap();
        let pushed: CredentialRecord = serde_json::from_str(&cloud.get_secret("pnyx/api-key/proj-a").await.unwrap()).unwrap();
        assert_eq!(pushed.payload, "v1");

        // Pushing again with no local change does nothing new (idempotent).
        sync.push_if_changed().await.unwrap();
    }

    #[tokio::test]
    async fn refresh_runs_exactly_once_when_near_expiry() {
        let dir = TempDir::new().unwrap();
        let cloud = Arc::new(FakeCloud::new());
        let local_path = dir.path().join("oauth.json");
        let soon = chrono::Utc::now().timestamp_millis() + 5 * 60 * 1000;
        let record = CredentialRecord {
            kind: CredentialKind::OauthTokenBundle,
            payload: String::new(),
            oauth: Some(OauthFields { access_token: "old".into(), refresh_token: "r".into(), expires_at_ms: soon }),
        };
        frank_core::atomic_io::write_json_atomic(&local_path, &record).unwrap();

        let backend = Box::new(crate::backend::AssistantOauthBackend::new("assistant/proj-a", &local_path));
        let refresher = Arc::new(FakeRefresher::new());
        let sync = CredentialSynchronizer::new(backend, cloud.clone(), Some(refresher.clone()));

        sync.maybe_refresh().await.unwrap();
        assert_eq!(refresher.call_count(), 1);

        let updated: CredentialRecord = frank_core::atomic_io::read_json(&local_path).unwrap();
        assert_eq!(updated.oauth.unwrap().access_token, "refreshed-token-1");

        // Far from expiry now -- a second call must not refresh again.
        sync.maybe_refresh().await.unwrap();
        assert_eq!(refresher.call_count(), 1);
    }

    #[tokio::test]
    async fn refresh_is_noop_for_non_oauth_backend() {
        let dir = TempDir::new().unwrap();
        let cloud = Arc::new(FakeCloud::new());
        let record = CredentialRecord { kind: CredentialKind::OpaqueApiKey, payload: "v".into(), oauth: None };
        let local_path = dir.path().join("key.json");
        frank_core::atomic_io::write_json_atomic(&local_path, &record).unwrap();

        let backend = Box::new(ApiKeyBackend::new("pnyx", "proj-a", &local_path, "FRANK_TEST_UNUSED"));
        let sync = CredentialSynchronizer::new(backend, cloud, None);

        sync.maybe_refresh().await.unwrap();
    }
}
