//! Sentinel-framed plan parsing (`spec.md` §4.5, §9, glossary "Sentinel
//! block"). Tolerates a planner that emits extra log lines before/after the
//! block; falls back to parsing the whole log as JSON when the sentinels
//! are absent, matching the source's leniency (`spec.md` §9 leaves this
//! choice open and explicitly allows either).

use frank_core::error::CoreError;
use frank_core::types::ScrumPlan;

pub const SENTINEL_BEGIN: &str = "FRANK_RESULT_BEGIN";
pub const SENTINEL_END: &str = "FRANK_RESULT_END";

/// Wraps a free-text goal in the meta-prompt instructing the planner to
/// emit its plan between the sentinel lines (`spec.md` §4.5 Phase 1).
pub fn wrap_goal_as_planner_prompt(goal: &str) -> String {
    format!(
        "You are the planning agent for a multi-agent coding session.\n\
         Decompose the following goal into a dependency-ordered set of work items.\n\
         Goal: {goal}\n\n\
         Respond with exactly one JSON object shaped as:\n\
         {{\"goal\": string, \"summary\": string, \"work_items\": \
         [{{\"id\": int, \"title\": string, \"prompt\": string, \"files\": [string], \"depends_on\": [int]}}]}}\n\
         Each work item's depends_on must reference only ids that appear earlier in the list.\n\
         Emit the JSON object, and nothing else, between these two marker lines:\n\
         {SENTINEL_BEGIN}\n\
         <json here>\n\
         {SENTINEL_END}\n"
    )
}

/// Extracts and parses the plan from a task's full log output.
pub fn parse_plan_from_log(log: &str) -> Result<ScrumPlan, CoreError> {
    match extract_sentinel_block(log) {
        Some(block) => serde_json::from_str(block.trim())
            .map_err(|e| CoreError::InvalidArgument(format!("plan JSON in sentinel block: {e}"))),
        None => serde_json::from_str(log.trim())
            .map_err(|e| CoreError::InvalidArgument(format!("no sentinel block and whole log is not plan JSON: {e}"))),
    }
}

fn extract_sentinel_block(log: &str) -> Option<&str> {
    let begin = log.find(SENTINEL_BEGIN)?;
    let after_begin = begin + SENTINEL_BEGIN.len();
    let end = log[after_begin..].find(SENTINEL_END)?;
    Some(&log[after_begin..after_begin + end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan_json() -> String {
        r#"{"goal":"g","summary":"s","work_items":[{"id":1,"title":"a","prompt":"p","files":[],"depends_on":[]}]}"#
            .to_string()
    }

    #[test]
    fn parses_block_surrounded_by_log_noise() {
        let log = format!(
            "starting up\nfetching deps\n{}\n{}\n{}\ncleaning up\ndone",
            SENTINEL_BEGIN,
            sample_plan_json(),
            SENTINEL_END
        );
        let plan = parse_plan_from_log(&log).unwrap();
        assert_eq!(plan.goal, "g");
        assert_eq!(plan.work_items.len(), 1);
    }

    #[test]
    fn falls_back_to_whole_log_when_no_sentinels() {
        let log = sample_plan_json();
        let plan = parse_plan_from_log(&log).unwrap();
        assert_eq!(plan.goal, "g");
    }

    #[test]
    fn fails_when_neither_sentinel_nor_whole_log_parses() {
        let log = "not json at all, no sentinels either".to_string();
        assert!(parse_plan_from_log(&log).is_err());
    }

    #[test]
    fn wrapped_prompt_contains_goal_and_sentinels() {
        let wrapped = wrap_goal_as_planner_prompt("add dark mode");
        assert!(wrapped.contains("add dark mode"));
        assert!(wrapped.contains(SENTINEL_BEGIN));
        assert!(wrapped.contains(SENTINEL_END));
    }
}
