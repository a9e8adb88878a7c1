//! Decomposes a goal into a dependency DAG, schedules it in waves with
//! bounded parallelism, dispatches one headless worker per item, and
//! collects outcomes (`spec.md` §4.5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use frank_cloud::adapter::{EnvOverride, NetworkConfig, TaskDefinitionRef};
use frank_cloud::{CloudAdapter, TaskLogReader};
use frank_core::error::CoreError;
use frank_core::types::{ScrumSession, ScrumSessionStatus, TaskRunStatus, TaskStatus, WorkItem};
use frank_launch::{HeadlessFamily, LaunchController};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::plan::{parse_plan_from_log, wrap_goal_as_planner_prompt};
use crate::session_store::{ensure_dir, SessionStore};
use crate::waves::compute_waves;

const PLANNER_POLL_INTERVAL: Duration = Duration::from_secs(10);
const PLANNER_DEADLINE: Duration = Duration::from_secs(30 * 60);
const ITEM_POLL_INTERVAL: Duration = Duration::from_secs(10);
const ITEM_DEADLINE: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct ScrumTaskConfig {
    pub planner_task_definition: TaskDefinitionRef,
    pub worker_task_definition: TaskDefinitionRef,
    pub network_cfg: NetworkConfig,
}

pub struct ScrumOrchestrator {
    launch: Arc<LaunchController>,
    cloud: Arc<dyn CloudAdapter>,
    log_reader: Arc<dyn TaskLogReader>,
    store: SessionStore,
    config: ScrumTaskConfig,
}

impl ScrumOrchestrator {
    pub fn new(
        launch: Arc<LaunchController>,
        cloud: Arc<dyn CloudAdapter>,
        log_reader: Arc<dyn TaskLogReader>,
        sessions_dir: std::path::PathBuf,
        config: ScrumTaskConfig,
    ) -> Result<Self, CoreError> {
        ensure_dir(&sessions_dir)?;
        Ok(Self { launch, cloud, log_reader, store: SessionStore::new(sessions_dir), config })
    }

    pub fn status(&self, session_id: &str) -> Result<ScrumSession, CoreError> {
        self.store.load(session_id)
    }

    pub fn list(&self) -> Result<Vec<String>, CoreError> {
        self.store.list()
    }

    pub async fn run(
        &self,
        profile: &str,
        goal: &str,
        planner_model: &str,
        worker_model: &str,
        max_parallel: usize,
    ) -> Result<String, CoreError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let mut session = ScrumSession::new(session_id.clone(), profile, goal);
        self.store.save(&session)?;

        let plan = match self.run_planner(profile, &session_id, goal, planner_model).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!(session = %session_id, error = %e, "planning phase failed");
                session.status = ScrumSessionStatus::Failed;
                session.completed_at = Some(Utc::now());
                self.store.save(&session)?;
                return Err(e);
            }
        };

        if let Err(e) = plan.validate() {
            warn!(session = %session_id, error = %e, "plan failed validation");
            session.status = ScrumSessionStatus::Failed;
            session.completed_at = Some(Utc::now());
            self.store.save(&session)?;
            return Err(e);
        }

        session.plan = Some(plan.clone());
        session.status = ScrumSessionStatus::Dispatching;
        self.store.save(&session)?;

        let waves = compute_waves(&plan.work_items);
        info!(session = %session_id, waves = waves.len(), "dispatching waves");

        for (wave_idx, wave) in waves.iter().enumerate() {
            let batches: Vec<&[WorkItem]> = if max_parallel == 0 {
                vec![wave.as_slice()]
            } else {
                wave.chunks(max_parallel).collect()
            };

            for batch in batches {
                let statuses = self
                    .dispatch_and_await_batch(profile, &session_id, worker_model, batch)
                    .await?;
                session.tasks.extend(statuses);
                session.status = ScrumSessionStatus::Running;
                self.store.save(&session)?;
            }
            debug!(session = %session_id, wave = wave_idx, "wave complete");
        }

        session.status = session.final_status();
        session.completed_at = Some(Utc::now());
        self.store.save(&session)?;
        info!(session = %session_id, status = ?session.status, "session collected");

        Ok(session_id)
    }

    async fn run_planner(
        &self,
        profile: &str,
        session_id: &str,
        goal: &str,
        planner_model: &str,
    ) -> Result<frank_core::types::ScrumPlan, CoreError> {
        let wrapped = wrap_goal_as_planner_prompt(goal);
        let container_name = format!("{profile}-scrum-{session_id}-planner");

        let mut tags = HashMap::new();
        tags.insert("profile".to_string(), profile.to_string());
        tags.insert("scrum-session".to_string(), session_id.to_string());

        let overrides = vec![
            EnvOverride { name: "TASK_PROMPT".to_string(), value: wrapped },
            EnvOverride { name: "MODEL".to_string(), value: planner_model.to_string() },
            EnvOverride { name: "CONTAINER_NAME".to_string(), value: container_name },
        ];

        let handle = self
            .launch
            .dispatch_headless(
                HeadlessFamily::Planner,
                &self.config.planner_task_definition,
                &self.config.network_cfg,
                overrides,
                tags,
            )
            .await?;

        let (task, timed_out) =
            self.poll_until_terminal(&handle.task_id, PLANNER_POLL_INTERVAL, PLANNER_DEADLINE).await?;
        if timed_out {
            return Err(CoreError::Timeout(format!("planner task {} exceeded 30 minute deadline", handle.task_id)));
        }
        if task.exit_code != Some(0) {
            return Err(CoreError::InvalidArgument(format!(
                "planner task {} exited with code {:?}",
                handle.task_id, task.exit_code
            )));
        }

        let log = self.log_reader.read_log(&handle.task_id).await?;
        parse_plan_from_log(&log)
    }

    async fn dispatch_and_await_batch(
        &self,
        profile: &str,
        session_id: &str,
        worker_model: &str,
        batch: &[WorkItem],
    ) -> Result<Vec<TaskStatus>, CoreError> {
        let mut dispatched = Vec::with_capacity(batch.len());
        for item in batch {
            let container_name = format!("{profile}-scrum-{session_id}-item-{}", item.id);
            let mut tags = HashMap::new();
            tags.insert("profile".to_string(), profile.to_string());
            tags.insert("scrum-session".to_string(), session_id.to_string());
            tags.insert("scrum-item".to_string(), item.id.to_string());

            let overrides = vec![
                EnvOverride { name: "TASK_PROMPT".to_string(), value: item.prompt.clone() },
                EnvOverride { name: "MODEL".to_string(), value: worker_model.to_string() },
                EnvOverride { name: "CONTAINER_NAME".to_string(), value: container_name.clone() },
            ];

            let handle = self
                .launch
                .dispatch_headless(
                    HeadlessFamily::Worker,
                    &self.config.worker_task_definition,
                    &self.config.network_cfg,
                    overrides,
                    tags,
                )
                .await?;
            dispatched.push((item.id, container_name, handle.task_id, Utc::now()));
        }

        // Batch boundary: wait for all dispatched tasks concurrently, never
        // reordering which item started first (spec.md §5).
        let mut join_set: JoinSet<(u32, String, String, chrono::DateTime<Utc>, Result<(frank_cloud::adapter::DescribedTask, bool), CoreError>)> =
            JoinSet::new();
        for (item_id, container_name, task_id, started_at) in dispatched {
            let cloud = self.cloud.clone();
            join_set.spawn(async move {
                let result = poll_task(&*cloud, &task_id, ITEM_POLL_INTERVAL, ITEM_DEADLINE).await;
                (item_id, container_name, task_id, started_at, result)
            });
        }

        let mut statuses = Vec::with_capacity(join_set.len());
        while let Some(joined) = join_set.join_next().await {
            let (item_id, container_name, task_id, started_at, result) =
                joined.map_err(|e| CoreError::Transient(format!("join error: {e}")))?;
            let (status, exit_code, completed_at) = match result {
                Ok((task, true)) => {
                    warn!(item_id, task_id, "item task exceeded 30 minute deadline");
                    let _ = task;
                    (TaskRunStatus::Timeout, None, None)
                }
                Ok((task, false)) if task.exit_code == Some(0) => {
                    (TaskRunStatus::Stopped, task.exit_code, Some(Utc::now()))
                }
                Ok((task, false)) => (TaskRunStatus::Failed, task.exit_code, Some(Utc::now())),
                Err(e) => {
                    warn!(item_id, task_id, error = %e, "item task polling failed");
                    (TaskRunStatus::Failed, None, Some(Utc::now()))
                }
            };
            statuses.push(TaskStatus {
                work_item: item_id,
                container_name,
                task_id,
                status,
                exit_code,
                started_at,
                completed_at,
            });
        }
        statuses.sort_by_key(|s| s.work_item);
        Ok(statuses)
    }

    async fn poll_until_terminal(
        &self,
        task_id: &str,
        interval: Duration,
        deadline: Duration,
    ) -> Result<(frank_cloud::adapter::DescribedTask, bool), CoreError> {
        poll_task(&*self.cloud, task_id, interval, deadline).await
    }
}

async fn poll_task(
    cloud: &(dyn CloudAdapter + '_),
    task_id: &str,
    interval: Duration,
    deadline: Duration,
) -> Result<(frank_cloud::adapter::DescribedTask, bool), CoreError> {
    let cutoff = tokio::time::Instant::now() + deadline;
    loop {
        let described = cloud.describe_tasks(&[task_id.to_string()]).await?;
        let task = described
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::Transient(format!("task {task_id} vanished")))?;
        if task.last_status == "STOPPED" {
            return Ok((task, false));
        }
        if tokio::time::Instant::now() >= cutoff {
            return Ok((task, true));
        }
        tokio::time::sleep(interval).await;
    }
}
