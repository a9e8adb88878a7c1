//! Given a profile name, ensures one running compute task tagged for that
//! profile and a populated routing slice; the symmetrical stop reverses
//! both (`spec.md` §4.3).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use frank_cloud::adapter::{EnvOverride, NetworkConfig, TaskDefinitionRef};
use frank_cloud::CloudAdapter;
use frank_core::error::CoreError;
use frank_core::types::{TaskHandle, TaskState};
use frank_registry::ProfileRegistry;
use frank_routing::RoutingFabricReconciler;
use tracing::{info, warn};

const IP_POLL_INTERVAL: Duration = Duration::from_secs(5);
const IP_POLL_DEADLINE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub cluster: String,
    pub service_name: String,
    pub public_hostname: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartResult {
    pub task_id: String,
    pub url: String,
    /// `true` when the 60s IP-acquisition deadline elapsed before a
    /// private IPv4 showed up; the caller may reconcile later.
    pub registration_pending: bool,
}

#[derive(Debug, Clone)]
pub struct ProfileStatus {
    pub profile: String,
    pub status: String,
    pub task_id: String,
    pub ip: Option<String>,
    pub url: String,
}

/// Task-definition family for [`LaunchController::dispatch_headless`]
/// (`spec.md` §4.5: planner vs. worker).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadlessFamily {
    Planner,
    Worker,
}

pub struct LaunchController {
    cloud: Arc<dyn CloudAdapter>,
    registry: Arc<ProfileRegistry>,
    routing: Arc<RoutingFabricReconciler>,
    config: LaunchConfig,
}

impl LaunchController {
    pub fn new(
        cloud: Arc<dyn CloudAdapter>,
        registry: Arc<ProfileRegistry>,
        routing: Arc<RoutingFabricReconciler>,
        config: LaunchConfig,
    ) -> Self {
        Self { cloud, registry, routing, config }
    }

    fn url_for(&self, name: &str) -> String {
        format!("https://{}/{}/", self.config.public_hostname, name)
    }

    /// `spec.md` §4.3: seven idempotent steps.
    pub async fn start(&self, profile_name: &str) -> Result<StartResult, CoreError> {
        let profile = self.registry.get(profile_name)?;

        if let Some((task_id, _ip)) = self.find_running_task(profile_name).await? {
            info!(profile = profile_name, task_id, "start: already running");
            return Ok(StartResult { task_id, url: self.url_for(profile_name), registration_pending: false });
        }

        let slice = self.routing.ensure_slice(profile_name).await?;
        self.routing.ensure_rules(&slice).await?;

        let service = self.cloud.describe_service(&self.config.service_name).await?;
        let mut tags = HashMap::new();
        tags.insert("profile".to_string(), profile_name.to_string());

        let overrides = vec![
            EnvOverride { name: "CONTAINER_NAME".to_string(), value: profile_name.to_string() },
            EnvOverride { name: "GIT_REPO".to_string(), value: profile.repo.clone() },
            EnvOverride {
                name: "GIT_BRANCH".to_string(),
                value: profile.branch_or_default().to_string(),
            },
            EnvOverride { name: "URL_PREFIX".to_string(), value: format!("/{profile_name}") },
        ];

        let task_id = self
            .cloud
            .run_task(&service.task_definition, &service.network_cfg, &overrides, &tags)
            .await?;
        info!(profile = profile_name, task_id, "start: task dispatched");

        let (ip, registration_pending) = self.poll_for_ip(&task_id).await?;

        if let Some(ip) = ip {
            self.routing.register_task_on_slice(&slice, &ip).await?;
        } else {
            warn!(profile = profile_name, task_id, "start: IP not attached within deadline, registration pending");
        }

        Ok(StartResult { task_id, url: self.url_for(profile_name), registration_pending })
    }

    async fn poll_for_ip(&self, task_id: &str) -> Result<(Option<String>, bool), CoreError> {
        let deadline = tokio::time::Instant::now() + IP_POLL_DEADLINE;
        loop {
            let described = self.cloud.describe_tasks(&[task_id.to_string()]).await?;
            let task = described
                .first()
                .ok_or_else(|| CoreError::Transient(format!("task {task_id} vanished")))?;

            if task.last_status == "STOPPED" {
                return Err(CoreError::TaskStoppedEarly {
                    reason: format!("task reached STOPPED before RUNNING (exit={:?})", task.exit_code),
                });
            }
            if let Some(ip) = &task.private_ipv4 {
                return Ok((Some(ip.clone()), false));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok((None, true));
            }
            tokio::time::sleep(IP_POLL_INTERVAL).await;
        }
    }

    async fn find_running_task(&self, profile_name: &str) -> Result<Option<(String, Option<String>)>, CoreError> {
        let ids = self.cloud.list_tasks(&self.config.cluster).await?;
        let described = self.cloud.describe_tasks(&ids).await?;
        for task in described {
            if task.tags.get("profile").map(|s| s.as_str()) != Some(profile_name) {
                continue;
            }
            if task.last_status == "RUNNING" || task.last_status == "PENDING" {
                return Ok(Some((task.id, task.private_ipv4)));
            }
        }
        Ok(None)
    }

    /// `spec.md` §4.3.
    pub async fn resolve_task_by_profile(
        &self,
        profile_name: &str,
    ) -> Result<(String, Option<String>), CoreError> {
        self.find_running_task(profile_name)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("running task for profile {profile_name}")))
    }

    /// Accepts either a profile name or a raw task id (`spec.md` §4.3).
    pub async fn stop(&self, profile_or_task_id: &str) -> Result<(), CoreError> {
        let resolved = self.find_running_task(profile_or_task_id).await?;
        let (task_id, ip, is_profile) = match resolved {
            Some((task_id, ip)) => (task_id, ip, true),
            None => (profile_or_task_id.to_string(), None, false),
        };

        if is_profile {
            if let Some(slice) = self.routing.describe_slice(profile_or_task_id).await? {
                if let Some(ip) = &ip {
                    self.routing.deregister_task_on_slice(&slice, ip).await?;
                }
            }
        }

        self.cloud.stop_task(&task_id, "operator stop").await?;

        if is_profile {
            self.routing.delete_slice(profile_or_task_id).await?;
        }
        info!(target = profile_or_task_id, task_id, "stop complete");
        Ok(())
    }

    /// `spec.md` §4.3: group by `profile` tag, newest task per profile.
    pub async fn list(&self) -> Result<Vec<ProfileStatus>, CoreError> {
        let ids = self.cloud.list_tasks(&self.config.cluster).await?;
        let described = self.cloud.describe_tasks(&ids).await?;

        let mut by_profile: HashMap<String, ProfileStatus> = HashMap::new();
        for task in described {
            let Some(profile) = task.tags.get("profile").cloned() else { continue };
            by_profile.insert(
                profile.clone(),
                ProfileStatus {
                    url: self.url_for(&profile),
                    profile,
                    status: task.last_status,
                    task_id: task.id,
                    ip: task.private_ipv4,
                },
            );
        }
        Ok(by_profile.into_values().collect())
    }

    /// Deletes routing slices for profiles with no running task
    /// (`spec.md` §4.4 `FindOrphans` + `DeleteSlice`).
    pub async fn cleanup(&self) -> Result<Vec<String>, CoreError> {
        let known: Vec<String> = self.registry.list()?.into_iter().map(|p| p.name).collect();
        let active: Vec<String> = self.list().await?.into_iter().map(|s| s.profile).collect();
        let orphans = self.routing.find_orphans(&known, &active).await?;
        for profile in &orphans {
            self.routing.delete_slice(profile).await?;
        }
        Ok(orphans)
    }

    pub async fn set_desired_count(&self, n: i32) -> Result<(), CoreError> {
        self.cloud.update_service_desired_count(&self.config.service_name, n).await
    }

    /// A thin wrapper over `CloudAdapter::run_task` that tags the task
    /// `task-type=headless|planner` and skips the routing fabric entirely
    /// (`spec.md` §4.5: "via LC primitive `DispatchHeadless`") -- headless
    /// workers are not web-routable.
    pub async fn dispatch_headless(
        &self,
        family: HeadlessFamily,
        task_definition: &TaskDefinitionRef,
        network_cfg: &NetworkConfig,
        overrides: Vec<EnvOverride>,
        mut tags: HashMap<String, String>,
    ) -> Result<TaskHandle, CoreError> {
        let task_type = match family {
            HeadlessFamily::Planner => "planner",
            HeadlessFamily::Worker => "headless",
        };
        tags.insert("task-type".to_string(), task_type.to_string());

        let task_id = self.cloud.run_task(task_definition, network_cfg, &overrides, &tags).await?;
        info!(task_id, task_type, "headless task dispatched");

        Ok(TaskHandle {
            task_id,
            state: TaskState::Pending,
            private_ipv4: None,
            exit_code: None,
            tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frank_cloud::fake::FakeCloud;
    use frank_core::types::{AgentKind, Profile};
    use frank_routing::RoutingConfig;
    use tempfile::TempDir;

    fn controller(cloud: Arc<FakeCloud>) -> (LaunchController, TempDir) {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(ProfileRegistry::new(dir.path().join("profiles.json")));
        registry
            .add(Profile {
                name: "proj-a".to_string(),
                repo: "https://example.invalid/r.git".to_string(),
                branch: Some("main".to_string()),
                description: None,
                category: None,
                agent: Some(AgentKind::Assistant),
                mode: None,
                task_prompt: None,
                model: None,
            })
            .unwrap();

        let routing = Arc::new(RoutingFabricReconciler::new(
            cloud.clone(),
            RoutingConfig { listener_arn: "arn:fake:listener".to_string(), vpc_id: "vpc-1".to_string() },
        ));
        let controller = LaunchController::new(
            cloud,
            registry,
            routing,
            LaunchConfig {
                cluster: "frank".to_string(),
                service_name: "frank-workspaces".to_string(),
                public_hostname: "frank.example.com".to_string(),
            },
        );
        (controller, dir)
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let cloud = Arc::new(FakeCloud::new());
        let (controller, _dir) = controller(cloud.clone());

        let first = controller.start("proj-a").await.unwrap();
        let second = controller.start("proj-a").await.unwrap();

        assert_eq!(first.task_id, second.task_id);
        assert_eq!(cloud.task_count(), 1);
    }

    #[tokio::test]
    async fn start_fails_for_unknown_profile() {
        let cloud = Arc::new(FakeCloud::new());
        let (controller, _dir) = controller(cloud);
        let err = controller.start("proj-missing").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn stop_reverses_start() {
        let cloud = Arc::new(FakeCloud::new());
        let (controller, _dir) = controller(cloud.clone());

        controller.start("proj-a").await.unwrap();
        controller.stop("proj-a").await.unwrap();

        let statuses = controller.list().await.unwrap();
        assert!(statuses.is_empty() || statuses.iter().all(|s| s.status == "STOPPED"));
        assert_eq!(cloud.rule_count(), 0);
    }

    #[tokio::test]
    async fn dispatch_headless_does_not_touch_routing() {
        let cloud = Arc::new(FakeCloud::new());
        let (controller, _dir) = controller(cloud.clone());

        let handle = controller
            .dispatch_headless(
                HeadlessFamily::Worker,
                &frank_cloud::adapter::TaskDefinitionRef { arn: "arn:fake:worker-td".to_string() },
                &NetworkConfig { subnets: vec![], security_groups: vec![], assign_public_ip: false },
                vec![],
                HashMap::new(),
            )
            .await
            .unwrap();

        assert_eq!(handle.tags.get("task-type").map(|s| s.as_str()), Some("headless"));
        assert_eq!(cloud.rule_count(), 0);
    }
}
