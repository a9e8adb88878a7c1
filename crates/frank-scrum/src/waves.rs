//! Kahn-style layering of the work-item DAG into dependency-ordered waves
//! (`spec.md` §4.5 Phase 2, §8 property 5). Deterministic: within a wave,
//! items keep the order they appear in the plan.

use std::collections::HashMap;

use frank_core::types::WorkItem;

/// `ScrumPlan::validate` must have already confirmed unique ids and only
/// backward-referencing `depends_on`; this assumes that invariant holds.
pub fn compute_waves(work_items: &[WorkItem]) -> Vec<Vec<WorkItem>> {
    let layer_of: HashMap<u32, usize> = {
        let mut layers = HashMap::new();
        for item in work_items {
            let layer = item
                .depends_on
                .iter()
                .map(|dep| layers.get(dep).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0);
            layers.insert(item.id, layer);
        }
        layers
    };

    let max_layer = layer_of.values().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<WorkItem>> = (0..=max_layer).map(|_| Vec::new()).collect();
    for item in work_items {
        let layer = layer_of[&item.id];
        waves[layer].push(item.clone());
    }
    waves
}
