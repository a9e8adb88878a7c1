//! Per-workspace credential sync daemon: runs the three credential variant
//! synchronizers (`spec.md` §4.6) side by side until told to stop.

use std::sync::Arc;

use anyhow::{Context, Result};
use frank_cloud::aws::AwsCloud;
use frank_cloud::CloudAdapter;
use frank_core::config::Config;
use frank_creds::{
    ApiKeyBackend, AssistantOauthBackend, CredentialSynchronizer, CredsIntervals, FileSetBackend,
    HttpOauthRefresher, OauthRefresher, ShutdownSignal,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("loading ~/.frank/config.toml")?;

    let default_level = config.telemetry.log_filter.as_deref().unwrap_or("info");
    match config.telemetry.log_format.as_str() {
        "json" => frank_telemetry::init_logging_json("frank-creds-agent", default_level),
        _ => frank_telemetry::init_logging("frank-creds-agent", default_level),
    }

    let container_name =
        std::env::var("CONTAINER_NAME").context("CONTAINER_NAME must be set in the workspace container")?;

    info!(container_name, "frank-creds-agent starting");

    let cloud: Arc<dyn CloudAdapter> = Arc::new(AwsCloud::from_env(config.cloud.cluster.clone()).await);

    let creds_dir = config.state_dir.join("creds").join(&container_name);
    std::fs::create_dir_all(&creds_dir).context("creating local credential replica directory")?;

    let intervals = CredsIntervals {
        push_check: std::time::Duration::from_secs(config.creds.push_check_secs),
        pull_check: std::time::Duration::from_secs(config.creds.pull_check_secs),
        oauth_refresh_check: std::time::Duration::from_secs(config.creds.oauth_refresh_check_secs),
    };
    let shutdown = ShutdownSignal::new();

    let oauth_refresher: Option<Arc<dyn OauthRefresher>> = match std::env::var("FRANK_OAUTH_TOKEN_ENDPOINT") {
        Ok(endpoint) => {
            let client_id = std::env::var("FRANK_OAUTH_CLIENT_ID").unwrap_or_default();
            Some(Arc::new(HttpOauthRefresher::new(endpoint, client_id)))
        }
        Err(_) => {
            warn!("FRANK_OAUTH_TOKEN_ENDPOINT not set, assistant oauth bundle will not auto-refresh");
            None
        }
    };

    let prefix = &config.cloud.cluster;

    let oauth_sync = Arc::new(CredentialSynchronizer::new(
        Box::new(AssistantOauthBackend::new(
            format!("{prefix}/assistant-credentials"),
            creds_dir.join("assistant-oauth.json"),
        )),
        cloud.clone(),
        oauth_refresher,
    ));
    let file_set_sync = Arc::new(CredentialSynchronizer::new(
        Box::new(FileSetBackend::new(
            format!("{prefix}/device-auth-credentials"),
            creds_dir.join("file-set"),
        )),
        cloud.clone(),
        None,
    ));
    let api_key_sync = Arc::new(CredentialSynchronizer::new(
        Box::new(ApiKeyBackend::new(
            prefix,
            &container_name,
            creds_dir.join("api-key.json"),
            "PNYX_API_KEY",
        )),
        cloud,
        None,
    ));

    let handles = vec![
        tokio::spawn(oauth_sync.run(intervals, shutdown.clone())),
        tokio::spawn(file_set_sync.run(intervals, shutdown.clone())),
        tokio::spawn(api_key_sync.run(intervals, shutdown.clone())),
    ];

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                return;
            }
            info!("ctrl-c received, stopping credential sync loops");
            shutdown.trigger();
        }
    });

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "a credential sync loop panicked");
        }
    }

    info!("frank-creds-agent stopped");
    Ok(())
}
