//! Thin façade over the compute service, load balancer, secret store, and
//! parameter store (`spec.md` §4.1). Upper layers only ever see
//! [`adapter::CloudAdapter`] -- no AWS SDK type leaks past this crate.

pub mod adapter;
pub mod aws;
pub mod logs;

#[cfg(feature = "testing")]
pub mod fake;

pub use adapter::{CloudAdapter, TaskLogReader};
