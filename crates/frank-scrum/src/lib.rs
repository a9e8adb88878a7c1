//! Multi-agent scrum orchestration: plan, wave-schedule, dispatch, collect
//! (`spec.md` §4.5).

mod orchestrator;
mod plan;
mod session_store;
mod waves;

pub use orchestrator::{ScrumOrchestrator, ScrumTaskConfig};
pub use plan::{parse_plan_from_log, wrap_goal_as_planner_prompt, SENTINEL_BEGIN, SENTINEL_END};
pub use waves::compute_waves;
