//! `spec.md` §8 scenarios S4/S5: a plan with one fan-in dependency
//! (`1 -> [], 2 -> [1], 3 -> []`) dispatched at two different
//! `max_parallel` settings.

use std::collections::HashMap;
use std::sync::Arc;

use frank_cloud::adapter::{NetworkConfig, TaskDefinitionRef};
use frank_cloud::fake::FakeCloud;
use frank_core::types::{AgentKind, Profile, ScrumSessionStatus, TaskRunStatus};
use frank_launch::{LaunchConfig, LaunchController};
use frank_registry::ProfileRegistry;
use frank_routing::{RoutingConfig, RoutingFabricReconciler};
use frank_scrum::{ScrumOrchestrator, ScrumTaskConfig};
use tempfile::TempDir;

const PLAN_JSON: &str = r#"
{"goal":"ship the thing","summary":"three items, 2 depends on 1",
 "work_items":[
   {"id":1,"title":"a","prompt":"do a","files":[],"depends_on":[]},
   {"id":2,"title":"b","prompt":"do b","files":[],"depends_on":[1]},
   {"id":3,"title":"c","prompt":"do c","files":[],"depends_on":[]}
 ]}
"#;

fn td(name: &str) -> TaskDefinitionRef {
    TaskDefinitionRef { arn: format!("arn:fake:{name}") }
}

fn nc() -> NetworkConfig {
    NetworkConfig { subnets: vec!["subnet-fake".to_string()], security_groups: vec![], assign_public_ip: false }
}

fn orchestrator(cloud: Arc<FakeCloud>) -> (ScrumOrchestrator, TempDir) {
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
    let launch = Arc::new(LaunchController::new(
        cloud.clone(),
        registry,
        routing,
        LaunchConfig {
            cluster: "frank".to_string(),
            service_name: "frank-workspaces".to_string(),
            public_hostname: "frank.example.com".to_string(),
        },
    ));

    let sessions_dir = dir.path().join("sessions");
    let orchestrator = ScrumOrchestrator::new(
        launch,
        cloud.clone(),
        cloud,
        sessions_dir,
        ScrumTaskConfig {
            planner_task_definition: td("planner-td"),
            worker_task_definition: td("worker-td"),
            network_cfg: nc(),
        },
    )
    .unwrap();
    (orchestrator, dir)
}

#[tokio::test]
async fn s4_max_parallel_four_dispatches_wave_together() {
    let cloud = Arc::new(FakeCloud::new());
    cloud.set_default_log(PLAN_JSON);
    let (orchestrator, _dir) = orchestrator(cloud.clone());

    let session_id =
        orchestrator.run("proj-a", "ship the thing", "planner-model", "worker-model", 4).await.unwrap();

    let session = orchestrator.status(&session_id).unwrap();
    assert_eq!(session.status, ScrumSessionStatus::Done);
    assert_eq!(session.tasks.len(), 3);
    assert!(session.tasks.iter().all(|t| t.status == TaskRunStatus::Stopped && t.exit_code == Some(0)));

    // Items 1 and 3 are independent (wave 0); item 2 depends on 1 (wave 1).
    let by_item: HashMap<u32, usize> =
        session.tasks.iter().enumerate().map(|(i, t)| (t.work_item, i)).collect();
    assert!(by_item[&1] < by_item[&2]);
    assert!(by_item[&3] < by_item[&2]);

    // With max_parallel=4 the whole wave is one batch: both run_task calls
    // for items 1 and 3 happen before either is polled.
    let calls = cloud.call_log();
    let run_1 = calls.iter().position(|c| c == "run_task 1").unwrap();
    let run_3 = calls.iter().position(|c| c == "run_task 3").unwrap();
    let describe_1 = calls.iter().position(|c| c == "describe_tasks 1").unwrap();
    assert!(run_3 < describe_1, "item 3 should dispatch before item 1 is polled: {calls:?}");
    assert!(run_1 < run_3);
}

#[tokio::test]
async fn s5_max_parallel_one_dispatches_strictly_sequentially() {
    let cloud = Arc::new(FakeCloud::new());
    cloud.set_default_log(PLAN_JSON);
    let (orchestrator, _dir) = orchestrator(cloud.clone());

    let session_id =
        orchestrator.run("proj-a", "ship the thing", "planner-model", "worker-model", 1).await.unwrap();

    let session = orchestrator.status(&session_id).unwrap();
    assert_eq!(session.status, ScrumSessionStatus::Done);
    assert_eq!(session.tasks.len(), 3);

    // With max_parallel=1 each item is its own batch: item 1 is dispatched
    // and polled to completion before item 3 is ever dispatched.
    let calls = cloud.call_log();
    let run_1 = calls.iter().position(|c| c == "run_task 1").unwrap();
    let describe_1 = calls.iter().position(|c| c == "describe_tasks 1").unwrap();
    let run_3 = calls.iter().position(|c| c == "run_task 3").unwrap();
    assert!(describe_1 < run_3, "item 1 should be polled before item 3 dispatches: {calls:?}");
    assert!(run_1 < describe_1);
}

#[tokio::test]
async fn planner_failure_marks_session_failed() {
    let cloud = Arc::new(FakeCloud::new());
    // No default log and no sentinel block anywhere -- parsing must fail.
    let (orchestrator, _dir) = orchestrator(cloud.clone());

    let err = orchestrator.run("proj-a", "an underspecified goal", "p-model", "w-model", 2).await;
    assert!(err.is_err());
}

#[tokio::test]
async fn worker_failure_yields_done_with_failures() {
    let cloud = Arc::new(FakeCloud::new());
    cloud.set_default_log(PLAN_JSON);
    // Item 2 fails; the planner and items 1/3 still auto-complete clean.
    cloud.fail_scrum_items(["2"]);
    let (orchestrator, _dir) = orchestrator(cloud.clone());

    let session_id =
        orchestrator.run("proj-a", "ship the thing", "p-model", "w-model", 4).await.unwrap();

    let session = orchestrator.status(&session_id).unwrap();
    assert_eq!(session.status, ScrumSessionStatus::DoneWithFailures);
    let item2 = session.tasks.iter().find(|t| t.work_item == 2).unwrap();
    assert_eq!(item2.status, TaskRunStatus::Failed);
    assert_eq!(item2.exit_code, Some(1));
    for item_id in [1u32, 3] {
        let t = session.tasks.iter().find(|t| t.work_item == item_id).unwrap();
        assert_eq!(t.status, TaskRunStatus::Stopped);
    }
}
