//! Keeps, per profile, the three target groups and four listener rules
//! described in `spec.md` §3 invariants and §4.4 -- idempotent, drift-
//! correcting.

mod priority;
mod reconciler;

pub use priority::priority_band_base;
pub use reconciler::{RoutingConfig, RoutingFabricReconciler};
