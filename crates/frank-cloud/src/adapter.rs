//! The `CloudAdapter` trait and its plain-data parameter/result types
//! (`spec.md` §4.1). Every method returns `frank_core::error::CoreError`;
//! the adapter never retries internally -- that is left to upper layers
//! (`spec.md` §7).

use std::collections::HashMap;

use async_trait::async_trait;
use frank_core::error::CoreError;

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub assign_public_ip: bool,
}

#[derive(Debug, Clone)]
pub struct TaskDefinitionRef {
    pub arn: String,
}

#[derive(Debug, Clone, Default)]
pub struct EnvOverride {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct DescribedTask {
    pub id: String,
    pub last_status: String,
    pub desired_status: String,
    pub private_ipv4: Option<String>,
    pub exit_code: Option<i32>,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct DescribedService {
    pub task_definition: TaskDefinitionRef,
    pub network_cfg: NetworkConfig,
}

#[derive(Debug, Clone)]
pub struct HealthCheckSpec {
    pub path: String,
    pub port: u16,
    pub healthy_threshold: i32,
    pub unhealthy_threshold: i32,
    pub interval_secs: i32,
    pub timeout_secs: i32,
    pub matcher: String,
}

impl Default for HealthCheckSpec {
    /// The canonical health check from `spec.md` §4.4: `/health` on the
    /// shared health port, 2 healthy / 3 unhealthy over a 30s interval.
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            port: frank_core::types::PORT_HEALTH,
            healthy_threshold: 2,
            unhealthy_threshold: 3,
            interval_secs: 30,
            timeout_secs: 10,
            matcher: "200".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DescribedTargetGroup {
    pub arn: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub enum RuleAction {
    /// `auth required` column true in `spec.md` §4.4's rule table: an
    /// authenticator action composed with a forward to `target_group_arn`.
    AuthenticateThenForward { target_group_arn: String },
    /// the unauthenticated status rule.
    Forward { target_group_arn: String },
}

#[derive(Debug, Clone)]
pub struct DescribedRule {
    pub arn: String,
    pub priority: i32,
    pub path_patterns: Vec<String>,
    pub action: RuleAction,
    pub is_default: bool,
}

#[async_trait]
pub trait CloudAdapter: Send + Sync {
    async fn run_task(
        &self,
        task_definition: &TaskDefinitionRef,
        network_cfg: &NetworkConfig,
        overrides: &[EnvOverride],
        tags: &HashMap<String, String>,
    ) -> Result<String, CoreError>;

    async fn describe_tasks(&self, ids: &[String]) -> Result<Vec<DescribedTask>, CoreError>;

    async fn list_tasks(&self, cluster: &str) -> Result<Vec<String>, CoreError>;

    async fn stop_task(&self, id: &str, reason: &str) -> Result<(), CoreError>;

    async fn describe_service(&self, name: &str) -> Result<DescribedService, CoreError>;

    async fn update_service_desired_count(&self, name: &str, n: i32) -> Result<(), CoreError>;

    async fn create_target_group(
        &self,
        name: &str,
        port: u16,
        vpc_id: &str,
        health_check: &HealthCheckSpec,
    ) -> Result<String, CoreError>;

    async fn describe_target_groups(
        &self,
        names: &[String],
    ) -> Result<Vec<DescribedTargetGroup>, CoreError>;

    async fn delete_target_group(&self, arn: &str) -> Result<(), CoreError>;

    async fn register_targets(
        &self,
        tg_arn: &str,
        targets: &[(String, u16)],
    ) -> Result<(), CoreError>;

    async fn deregister_targets(
        &self,
        tg_arn: &str,
        targets: &[(String, u16)],
    ) -> Result<(), CoreError>;

    async fn describe_listener(&self, name: &str) -> Result<String, CoreError>;

    async fn describe_rules(&self, listener_arn: &str) -> Result<Vec<DescribedRule>, CoreError>;

    async fn create_rule(
        &self,
        listener_arn: &str,
        priority: i32,
        path_patterns: &[String],
        action: RuleAction,
    ) -> Result<String, CoreError>;

    async fn delete_rule(&self, rule_arn: &str) -> Result<(), CoreError>;

    async fn get_secret(&self, id: &str) -> Result<String, CoreError>;

    async fn put_secret(&self, id: &str, value: &str) -> Result<(), CoreError>;

    async fn secret_exists(&self, id: &str) -> Result<bool, CoreError>;

    async fn get_parameter(&self, name: &str) -> Result<String, CoreError>;

    async fn put_parameter(&self, name: &str, value: &str) -> Result<(), CoreError>;
}

/// Reads a task's full log stream, the channel the Scrum Orchestrator uses
/// to retrieve a planner's sentinel-framed plan (`spec.md` §4.5, §9).
/// Deliberately separate from [`CloudAdapter`]: log *shipping* is out of
/// this core's scope (`spec.md` §1), but reading one task's own log back
/// is the one log-channel operation the orchestrator's contract requires.
#[async_trait]
pub trait TaskLogReader: Send + Sync {
    async fn read_log(&self, task_id: &str) -> Result<String, CoreError>;
}
