//! Shared data model (`spec.md` §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Assistant,
    HeadlessWorker,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileMode {
    Interactive,
    Headless,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub repo: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub agent: Option<AgentKind>,
    #[serde(default)]
    pub mode: Option<ProfileMode>,
    #[serde(default)]
    pub task_prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl Profile {
    /// The branch to use, defaulting to "main" (`spec.md` §3).
    pub fn branch_or_default(&self) -> &str {
        self.branch.as_deref().unwrap_or("main")
    }
}

/// `^[a-z0-9][a-z0-9-]{0,29}$` -- profile names are DNS-safe and control
/// URL path prefixes and cloud resource names (`spec.md` §3, §8 property 1).
pub fn validate_profile_name(name: &str) -> Result<(), CoreError> {
    let re = regex::Regex::new("^[a-z0-9][a-z0-9-]{0,29}$").expect("static regex is valid");
    if re.is_match(name) {
        Ok(())
    } else {
        Err(CoreError::InvalidArgument(format!(
            "profile name {name:?} must match ^[a-z0-9][a-z0-9-]{{0,29}}$"
        )))
    }
}

// ---------------------------------------------------------------------------
// TaskHandle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Interactive,
    Headless,
    Planner,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHandle {
    pub task_id: String,
    pub state: TaskState,
    pub private_ipv4: Option<String>,
    pub exit_code: Option<i32>,
    pub tags: HashMap<String, String>,
}

impl TaskHandle {
    pub fn profile(&self) -> Option<&str> {
        self.tags.get("profile").map(|s| s.as_str())
    }
}

// ---------------------------------------------------------------------------
// RoutingSlice
// ---------------------------------------------------------------------------

pub const PORT_UI: u16 = 7680;
pub const PORT_ASSIST: u16 = 7681;
pub const PORT_SHELL: u16 = 7682;
pub const PORT_HEALTH: u16 = 7683;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetGroupKind {
    /// path suffix "", port 7680
    Ui,
    /// path suffix "-t", port 7681
    Assist,
    /// path suffix "-b", port 7682
    Shell,
}

impl TargetGroupKind {
    pub fn all() -> [TargetGroupKind; 3] {
        [TargetGroupKind::Ui, TargetGroupKind::Assist, TargetGroupKind::Shell]
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            TargetGroupKind::Ui => "",
            TargetGroupKind::Assist => "-t",
            TargetGroupKind::Shell => "-b",
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            TargetGroupKind::Ui => PORT_UI,
            TargetGroupKind::Assist => PORT_ASSIST,
            TargetGroupKind::Shell => PORT_SHELL,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetGroupRecord {
    pub kind: TargetGroupKind,
    pub arn: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSlice {
    pub profile: String,
    pub target_groups: Vec<TargetGroupRecord>,
}

impl RoutingSlice {
    pub fn group(&self, kind: TargetGroupKind) -> Option<&TargetGroupRecord> {
        self.target_groups.iter().find(|g| g.kind == kind)
    }
}

/// Stable target-group name: `"frank-profile-" + name [+ suffix]`, truncated
/// to 32 characters (`spec.md` §4.4, §6).
pub fn target_group_name(profile: &str, kind: TargetGroupKind) -> String {
    let full = format!("frank-profile-{profile}{}", kind.suffix());
    full.chars().take(32).collect()
}

// ---------------------------------------------------------------------------
// Scrum: Plan / WorkItem / Session / TaskStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: u32,
    pub title: String,
    pub prompt: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrumPlan {
    pub goal: String,
    pub summary: String,
    pub work_items: Vec<WorkItem>,
}

impl ScrumPlan {
    /// Validates the invariants in `spec.md` §4.5: ids unique, every
    /// `depends_on` references an id appearing earlier in the list, and
    /// `work_items` is non-empty.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.work_items.is_empty() {
            return Err(CoreError::InvalidArgument("plan has no work items".into()));
        }

        let mut seen: HashSet<u32> = HashSet::new();
        for item in &self.work_items {
            if !seen.insert(item.id) {
                return Err(CoreError::InvalidArgument(format!(
                    "duplicate work item id {}",
                    item.id
                )));
            }
            for dep in &item.depends_on {
                if !seen.contains(dep) {
                    return Err(CoreError::InvalidArgument(format!(
                        "work item {} depends on {} which does not appear earlier in the plan",
                        item.id, dep
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRunStatus {
    Running,
    Stopped,
    Failed,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub work_item: u32,
    pub container_name: String,
    pub task_id: String,
    pub status: TaskRunStatus,
    #[serde(default)]
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrumSessionStatus {
    Planning,
    Dispatching,
    Running,
    Collecting,
    Done,
    DoneWithFailures,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrumSession {
    pub id: String,
    pub profile: String,
    pub goal: String,
    pub created_at: DateTime<Utc>,
    pub status: ScrumSessionStatus,
    #[serde(default)]
    pub plan: Option<ScrumPlan>,
    #[serde(default)]
    pub tasks: Vec<TaskStatus>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScrumSession {
    pub fn new(id: impl Into<String>, profile: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            profile: profile.into(),
            goal: goal.into(),
            created_at: Utc::now(),
            status: ScrumSessionStatus::Planning,
            plan: None,
            tasks: Vec::new(),
            completed_at: None,
        }
    }

    /// `done` if every task is `Stopped` with exit code 0, else
    /// `done_with_failures` (`spec.md` §4.5 Phase 4).
    pub fn final_status(&self) -> ScrumSessionStatus {
        let all_clean = self
            .tasks
            .iter()
            .all(|t| t.status == TaskRunStatus::Stopped && t.exit_code == Some(0));
        if all_clean {
            ScrumSessionStatus::Done
        } else {
            ScrumSessionStatus::DoneWithFailures
        }
    }
}

// ---------------------------------------------------------------------------
// CredentialRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    OauthTokenBundle,
    FileSet,
    OpaqueApiKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OauthFields {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub kind: CredentialKind,
    /// Opaque payload bytes (base64 in JSON contexts), e.g. the raw secret
    /// bytes for a `file_set`/`opaque_api_key` record.
    pub payload: String,
    #[serde(default)]
    pub oauth: Option<OauthFields>,
}
