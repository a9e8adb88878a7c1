//! An in-memory `CloudAdapter` used by every other crate's test suite,
//! mirroring the teacher's `MockSpawner` pattern in
//! `at-agents::task_orchestrator` -- hand-written, no mocking framework.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::adapter::{
    CloudAdapter, DescribedRule, DescribedService, DescribedTargetGroup, DescribedTask,
    EnvOverride, HealthCheckSpec, NetworkConfig, RuleAction, TaskDefinitionRef, TaskLogReader,
};
use frank_core::error::CoreError;

#[derive(Debug, Clone)]
struct FakeTask {
    id: String,
    last_status: String,
    desired_status: String,
    private_ipv4: Option<String>,
    exit_code: Option<i32>,
    tags: HashMap<String, String>,
}

#[derive(Debug, Clone)]
struct FakeTargetGroup {
    arn: String,
    name: String,
    port: u16,
}

#[derive(Debug, Clone)]
struct FakeRule {
    arn: String,
    priority: i32,
    path_patterns: Vec<String>,
    action: RuleAction,
}

/// Drives `run_task` results and IP-attachment timing directly, so tests
/// can exercise the poll loops in `frank-launch`/`frank-scrum` without
/// real sleeps.
pub struct FakeCloud {
    tasks: Mutex<HashMap<String, FakeTask>>,
    target_groups: Mutex<Vec<FakeTargetGroup>>,
    rules: Mutex<Vec<FakeRule>>,
    secrets: Mutex<HashMap<String, String>>,
    parameters: Mutex<HashMap<String, String>>,
    logs: Mutex<HashMap<String, String>>,
    default_log: Mutex<Option<String>>,
    next_id: AtomicU32,
    next_priority_conflict: Mutex<Vec<i32>>,
    /// if set, new tasks are created with this IP already attached instead
    /// of starting with `private_ipv4 = None` (tests opt into IP-not-yet
    /// arrived behavior by leaving this `None`).
    pub auto_attach_ip: Mutex<Option<String>>,
    pub capacity_exhausted: std::sync::atomic::AtomicBool,
    /// headless/planner tasks (tag `task-type`) finish instantly with exit
    /// 0 when this is set, so scrum tests never block on real sleeps
    /// waiting for a task to leave RUNNING. Interactive workspace tasks
    /// (no `task-type` tag) are unaffected -- they stay RUNNING until a
    /// test calls `finish_task` explicitly, which `frank-launch`'s tests
    /// rely on.
    pub auto_complete_headless: std::sync::atomic::AtomicBool,
    dispatch_log: Mutex<Vec<HashMap<String, String>>>,
    /// Interleaved `run_task`/`describe_tasks` call trace, tagged by
    /// `scrum-item` when present -- lets a test tell apart "both items
    /// dispatched before either is polled" (true concurrent dispatch)
    /// from "dispatch, poll, dispatch, poll" (sequential) without any
    /// real timing.
    call_log: Mutex<Vec<String>>,
    /// `scrum-item`/`profile` tag values that should auto-complete with a
    /// non-zero exit code instead of 0, so a test can force a failing
    /// worker without disabling `auto_complete_headless` and blocking on
    /// real poll sleeps.
    fail_labels: Mutex<std::collections::HashSet<String>>,
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCloud {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            target_groups: Mutex::new(Vec::new()),
            rules: Mutex::new(Vec::new()),
            secrets: Mutex::new(HashMap::new()),
            parameters: Mutex::new(HashMap::new()),
            logs: Mutex::new(HashMap::new()),
            default_log: Mutex::new(None),
            next_id: AtomicU32::new(1),
            next_priority_conflict: Mutex::new(Vec::new()),
            auto_attach_ip: Mutex::new(Some("10.0.0.1".to_string())),
            capacity_exhausted: std::sync::atomic::AtomicBool::new(false),
            auto_complete_headless: std::sync::atomic::AtomicBool::new(true),
            dispatch_log: Mutex::new(Vec::new()),
            call_log: Mutex::new(Vec::new()),
            fail_labels: Mutex::new(std::collections::HashSet::new()),
        }
    }

    /// Test hook: any future headless/planner task whose `scrum-item` tag
    /// (or task id, if untagged) is in `labels` auto-completes with exit
    /// code 1 instead of 0.
    pub fn fail_scrum_items(&self, labels: impl IntoIterator<Item = impl Into<String>>) {
        self.fail_labels.lock().unwrap().extend(labels.into_iter().map(Into::into));
    }

    /// Test hook: the `tags` passed to each `run_task` call, in dispatch
    /// order -- lets wave-ordering tests assert on dispatch sequence
    /// without timing-sensitive assertions.
    pub fn dispatch_log(&self) -> Vec<HashMap<String, String>> {
        self.dispatch_log.lock().unwrap().clone()
    }

    /// Test hook: `"run_task <label>"` / `"describe_tasks <label>"` entries
    /// in call order, where `<label>` is the `scrum-item` tag if the task
    /// has one, else the task id.
    pub fn call_log(&self) -> Vec<String> {
        self.call_log.lock().unwrap().clone()
    }

    fn label_for(&self, id: &str) -> String {
        self.tasks
            .lock()
            .unwrap()
            .get(id)
            .and_then(|t| t.tags.get("scrum-item").cloned())
            .unwrap_or_else(|| id.to_string())
    }

    fn fresh_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}-{n}")
    }

    /// Test hook: force the given task to STOPPED with `exit_code`.
    pub fn finish_task(&self, id: &str, exit_code: i32) {
        if let Some(t) = self.tasks.lock().unwrap().get_mut(id) {
            t.last_status = "STOPPED".to_string();
            t.desired_status = "STOPPED".to_string();
            t.exit_code = Some(exit_code);
        }
    }

    /// Test hook: set the full log body a later `read_log(id)` returns.
    pub fn set_log(&self, id: &str, body: impl Into<String>) {
        self.logs.lock().unwrap().insert(id.to_string(), body.into());
    }

    /// Test hook: the log body returned for any task id with no specific
    /// entry from `set_log` -- lets a test arrange a planner's log output
    /// before the orchestrator has assigned that task its (randomly
    /// generated) session id.
    pub fn set_default_log(&self, body: impl Into<String>) {
        *self.default_log.lock().unwrap() = Some(body.into());
    }

    /// Convenience combining [`Self::finish_task`] and [`Self::set_log`],
    /// modelling a headless/planner task that ran to completion and
    /// produced the given log output.
    pub fn finish_task_with_log(&self, id: &str, exit_code: i32, log_body: impl Into<String>) {
        self.finish_task(id, exit_code);
        self.set_log(id, log_body);
    }

    /// Test hook: make the next `CreateRule` call at `priority` fail with
    /// `PriorityInUse` exactly once.
    pub fn reject_priority_once(&self, priority: i32) {
        self.next_priority_conflict.lock().unwrap().push(priority);
    }

    pub fn task_count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.lock().unwrap().len()
    }
}

#[async_trait]
impl CloudAdapter for FakeCloud {
    async fn run_task(
        &self,
        _task_definition: &TaskDefinitionRef,
        _network_cfg: &NetworkConfig,
        _overrides: &[EnvOverride],
        tags: &HashMap<String, String>,
    ) -> Result<String, CoreError> {
        if self.capacity_exhausted.load(Ordering::SeqCst) {
            return Err(CoreError::CapacityExhausted { reason: "fake capacity exhausted".into() });
        }
        let id = self.fresh_id("task");
        let ip = self.auto_attach_ip.lock().unwrap().clone();
        self.dispatch_log.lock().unwrap().push(tags.clone());

        let is_headless = matches!(tags.get("task-type").map(|s| s.as_str()), Some("headless") | Some("planner"));
        let auto_complete = is_headless && self.auto_complete_headless.load(Ordering::SeqCst);
        let label = tags.get("scrum-item").cloned().unwrap_or_else(|| id.clone());
        let should_fail = self.fail_labels.lock().unwrap().contains(&label);

        self.tasks.lock().unwrap().insert(
            id.clone(),
            FakeTask {
                id: id.clone(),
                last_status: if auto_complete { "STOPPED".to_string() } else { "RUNNING".to_string() },
                desired_status: if auto_complete { "STOPPED".to_string() } else { "RUNNING".to_string() },
                private_ipv4: ip,
                exit_code: if auto_complete { Some(if should_fail { 1 } else { 0 }) } else { None },
                tags: tags.clone(),
            },
        );
        self.call_log.lock().unwrap().push(format!("run_task {label}"));
        Ok(id)
    }

    async fn describe_tasks(&self, ids: &[String]) -> Result<Vec<DescribedTask>, CoreError> {
        for id in ids {
            let label = self.label_for(id);
            self.call_log.lock().unwrap().push(format!("describe_tasks {label}"));
        }
        let tasks = self.tasks.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| tasks.get(id))
            .map(|t| DescribedTask {
                id: t.id.clone(),
                last_status: t.last_status.clone(),
                desired_status: t.desired_status.clone(),
                private_ipv4: t.private_ipv4.clone(),
                exit_code: t.exit_code,
                tags: t.tags.clone(),
            })
            .collect())
    }

    async fn list_tasks(&self, _cluster: &str) -> Result<Vec<String>, CoreError> {
        Ok(self.tasks.lock().unwrap().keys().cloned().collect())
    }

    async fn stop_task(&self, id: &str, _reason: &str) -> Result<(), CoreError> {
        if let Some(t) = self.tasks.lock().unwrap().get_mut(id) {
            t.last_status = "STOPPED".to_string();
            t.desired_status = "STOPPED".to_string();
            if t.exit_code.is_none() {
                t.exit_code = Some(0);
            }
        }
        Ok(())
    }

    async fn describe_service(&self, _name: &str) -> Result<DescribedService, CoreError> {
        Ok(DescribedService {
            task_definition: TaskDefinitionRef { arn: "arn:fake:task-def".to_string() },
            network_cfg: NetworkConfig {
                subnets: vec!["subnet-fake".to_string()],
                security_groups: vec!["sg-fake".to_string()],
                assign_public_ip: false,
            },
        })
    }

    async fn update_service_desired_count(&self, _name: &str, _n: i32) -> Result<(), CoreError> {
        Ok(())
    }

    async fn create_target_group(
        &self,
        name: &str,
        port: u16,
        _vpc_id: &str,
        _health_check: &HealthCheckSpec,
    ) -> Result<String, CoreError> {
        let arn = self.fresh_id("tg-arn");
        self.target_groups.lock().unwrap().push(FakeTargetGroup {
            arn: arn.clone(),
            name: name.to_string(),
            port,
        });
        Ok(arn)
    }

    async fn describe_target_groups(
        &self,
        names: &[String],
    ) -> Result<Vec<DescribedTargetGroup>, CoreError> {
        let groups = self.target_groups.lock().unwrap();
        Ok(groups
            .iter()
            .filter(|g| names.contains(&g.name))
            .map(|g| DescribedTargetGroup { arn: g.arn.clone(), port: g.port })
            .collect())
    }

    async fn delete_target_group(&self, arn: &str) -> Result<(), CoreError> {
        self.target_groups.lock().unwrap().retain(|g| g.arn != arn);
        Ok(())
    }

    async fn register_targets(
        &self,
        _tg_arn: &str,
        _targets: &[(String, u16)],
    ) -> Result<(), CoreError> {
        Ok(())
    }

    async fn deregister_targets(
        &self,
        _tg_arn: &str,
        _targets: &[(String, u16)],
    ) -> Result<(), CoreError> {
        Ok(())
    }

    async fn describe_listener(&self, name: &str) -> Result<String, CoreError> {
        Ok(name.to_string())
    }

    async fn describe_rules(&self, _listener_arn: &str) -> Result<Vec<DescribedRule>, CoreError> {
        let rules = self.rules.lock().unwrap();
        Ok(rules
            .iter()
            .map(|r| DescribedRule {
                arn: r.arn.clone(),
                priority: r.priority,
                path_patterns: r.path_patterns.clone(),
                action: r.action.clone(),
                is_default: false,
            })
            .collect())
    }

    async fn create_rule(
        &self,
        _listener_arn: &str,
        priority: i32,
        path_patterns: &[String],
        action: RuleAction,
    ) -> Result<String, CoreError> {
        {
            let mut conflicts = self.next_priority_conflict.lock().unwrap();
            if let Some(pos) = conflicts.iter().position(|p| *p == priority) {
                conflicts.remove(pos);
                return Err(CoreError::PriorityInUse(priority));
            }
        }
        let mut rules = self.rules.lock().unwrap();
        if rules.iter().any(|r| r.priority == priority) {
            return Err(CoreError::PriorityInUse(priority));
        }
        let arn = self.fresh_id("rule-arn");
        rules.push(FakeRule {
            arn: arn.clone(),
            priority,
            path_patterns: path_patterns.to_vec(),
            action,
        });
        Ok(arn)
    }

    async fn delete_rule(&self, rule_arn: &str) -> Result<(), CoreError> {
        self.rules.lock().unwrap().retain(|r| r.arn != rule_arn);
        Ok(())
    }

    async fn get_secret(&self, id: &str) -> Result<String, CoreError> {
        self.secrets
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(id.to_string()))
    }

    async fn put_secret(&self, id: &str, value: &str) -> Result<(), CoreError> {
        self.secrets.lock().unwrap().insert(id.to_string(), value.to_string());
        Ok(())
    }

    async fn secret_exists(&self, id: &str) -> Result<bool, CoreError> {
        Ok(self.secrets.lock().unwrap().contains_key(id))
    }

    async fn get_parameter(&self, name: &str) -> Result<String, CoreError> {
        self.parameters
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(name.to_string()))
    }

    async fn put_parameter(&self, name: &str, value: &str) -> Result<(), CoreError> {
        self.parameters.lock().unwrap().insert(name.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl TaskLogReader for FakeCloud {
    async fn read_log(&self, task_id: &str) -> Result<String, CoreError> {
        if let Some(body) = self.logs.lock().unwrap().get(task_id).cloned() {
            return Ok(body);
        }
        self.default_log
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| CoreError::NotFound(format!("log for {task_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn td() -> TaskDefinitionRef {
        TaskDefinitionRef { arn: "arn:fake:td".to_string() }
    }
    fn nc() -> NetworkConfig {
        NetworkConfig { subnets: vec![], security_groups: vec![], assign_public_ip: false }
    }

    #[tokio::test]
    async fn run_task_then_describe_roundtrips() {
        let cloud = FakeCloud::new();
        let id = cloud.run_task(&td(), &nc(), &[], &HashMap::new()).await.unwrap();
        let described = cloud.describe_tasks(&[id.clone()]).await.unwrap();
        assert_eq!(described.len(), 1);
        assert_eq!(described[0].last_status, "RUNNING");
    }

    #[tokio::test]
    async fn stop_task_sets_terminal_state() {
        let cloud = FakeCloud::new();
        let id = cloud.run_task(&td(), &nc(), &[], &HashMap::new()).await.unwrap();
        cloud.stop_task(&id, "test").await.unwrap();
        let described = cloud.describe_tasks(&[id]).await.unwrap();
        assert_eq!(described[0].last_status, "STOPPED");
        assert_eq!(described[0].exit_code, Some(0));
    }

    #[tokio::test]
    async fn duplicate_priority_rejected() {
        let cloud = FakeCloud::new();
        cloud
            .create_rule("listener", 100, &["/p".to_string()], RuleAction::Forward {
                target_group_arn: "tg".into(),
            })
            .await
            .unwrap();
        let err = cloud
            .create_rule("listener", 100, &["/q".to_string()], RuleAction::Forward {
                target_group_arn: "tg2".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PriorityInUse(100)));
    }

    #[tokio::test]
    async fn capacity_exhausted_flag_is_honored() {
        let cloud = FakeCloud::new();
        cloud.capacity_exhausted.store(true, Ordering::SeqCst);
        let err = cloud.run_task(&td(), &nc(), &[], &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, CoreError::CapacityExhausted { .. }));
    }
}
