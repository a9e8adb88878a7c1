//! End-to-end coverage of `CredentialSynchronizer::run` itself (as opposed
//! to the individual tick methods unit-tested in `sync.rs`): starts the
//! full `tokio::select!` loop against a paused clock and drives it through
//! a push, a pull, and a clean shutdown.

use std::sync::Arc;
use std::time::Duration;

use frank_cloud::fake::FakeCloud;
use frank_core::types::{CredentialKind, CredentialRecord};
use frank_creds::{ApiKeyBackend, CredentialSynchronizer, CredsIntervals, ShutdownSignal};
use tempfile::TempDir;

fn intervals() -> CredsIntervals {
    CredsIntervals {
        push_check: Duration::from_millis(10),
        pull_check: Duration::from_millis(20),
        oauth_refresh_check: Duration::from_secs(3600),
    }
}

#[tokio::test(start_paused = true)]
async fn full_loop_pushes_local_change_and_picks_up_remote_change_then_stops_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(FakeCloud::new());
    let local_path = dir.path().join("key.json");

    let backend = Box::new(ApiKeyBackend::new("pnyx", "proj-a", &local_path, "FRANK_TEST_UNUSED"));
    let sync = Arc::new(CredentialSynchronizer::new(backend, cloud.clone(), None));
    let shutdown = ShutdownSignal::new();

    let handle = tokio::spawn(sync.clone().run(intervals(), shutdown.clone()));

    // Local write appears on the remote within one push tick.
    let local = CredentialRecord { kind: CredentialKind::OpaqueApiKey, payload: "v1".into(), oauth: None };
    frank_core::atomic_io::write_json_atomic(&local_path, &local).unwrap();
    tokio::time::advance(Duration::from_millis(15)).await;
    let pushed: CredentialRecord =
        serde_json::from_str(&cloud.get_secret("pnyx/api-key/proj-a").await.unwrap()).unwrap();
    assert_eq!(pushed.payload, "v1");

    // A remote-side change appears locally within one pull tick.
    let remote = CredentialRecord { kind: CredentialKind::OpaqueApiKey, payload: "v2-from-remote".into(), oauth: None };
    cloud.put_secret("pnyx/api-key/proj-a", &serde_json::to_string(&remote).unwrap()).await.unwrap();
    tokio::time::advance(Duration::from_millis(25)).await;
    let local_now: CredentialRecord = frank_core::atomic_io::read_json(&local_path).unwrap();
    assert_eq!(local_now.payload, "v2-from-remote");

    shutdown.trigger();
    tokio::time::advance(Duration::from_millis(5)).await;
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_before_any_tick_stops_the_loop_promptly() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(FakeCloud::new());
    let backend =
        Box::new(ApiKeyBackend::new("pnyx", "proj-b", dir.path().join("key.json"), "FRANK_TEST_UNUSED"));
    let sync = Arc::new(CredentialSynchronizer::new(backend, cloud, None));
    let shutdown = ShutdownSignal::new();

    let handle = tokio::spawn(sync.run(intervals(), shutdown.clone()));
    shutdown.trigger();
    tokio::time::advance(Duration::from_millis(1)).await;
    handle.await.unwrap();
}
