use std::sync::Arc;

use dashmap::DashMap;
use frank_cloud::adapter::{DescribedTargetGroup, HealthCheckSpec, RuleAction};
use frank_cloud::CloudAdapter;
use frank_core::error::CoreError;
use frank_core::types::{target_group_name, RoutingSlice, TargetGroupKind, TargetGroupRecord};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::priority::priority_band_base;

#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub listener_arn: String,
    pub vpc_id: String,
}

/// One `(path patterns, auth required)` entry per rule, in the specificity
/// order mandated by `spec.md` §4.4's table (status first, catch-all last).
struct RuleSpec {
    offset: i32,
    kind: TargetGroupKind,
    auth_required: bool,
    path_patterns: fn(&str) -> Vec<String>,
}

fn rule_specs() -> [RuleSpec; 4] {
    [
        RuleSpec {
            offset: 0,
            kind: TargetGroupKind::Ui,
            auth_required: false,
            path_patterns: |p| vec![format!("/{p}/status"), format!("/{p}/status/*")],
        },
        RuleSpec {
            offset: 1,
            kind: TargetGroupKind::Assist,
            auth_required: true,
            path_patterns: |p| vec![format!("/{p}/_t"), format!("/{p}/_t/*")],
        },
        RuleSpec {
            offset: 2,
            kind: TargetGroupKind::Shell,
            auth_required: true,
            path_patterns: |p| vec![format!("/{p}/_b"), format!("/{p}/_b/*")],
        },
        RuleSpec {
            offset: 3,
            kind: TargetGroupKind::Ui,
            auth_required: true,
            path_patterns: |p| vec![format!("/{p}"), format!("/{p}/*")],
        },
    ]
}

const RETRY_OFFSETS: [i32; 8] = [-1, -2, -3, 1, 2, 3, 4, 5];

pub struct RoutingFabricReconciler {
    cloud: Arc<dyn CloudAdapter>,
    config: RoutingConfig,
    /// per-profile mutation lock (`spec.md` §5): two `Start` calls for the
    /// same profile never race on rule creation; across profiles,
    /// reconciliation proceeds in parallel.
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl RoutingFabricReconciler {
    pub fn new(cloud: Arc<dyn CloudAdapter>, config: RoutingConfig) -> Self {
        Self { cloud, config, locks: DashMap::new() }
    }

    fn lock_for(&self, profile_name: &str) -> Arc<AsyncMutex<()>> {
        self.locks.entry(profile_name.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    pub async fn ensure_slice(&self, profile_name: &str) -> Result<RoutingSlice, CoreError> {
        let lock = self.lock_for(profile_name);
        let _guard = lock.lock().await;
        self.ensure_slice_locked(profile_name).await
    }

    async fn ensure_slice_locked(&self, profile_name: &str) -> Result<RoutingSlice, CoreError> {
        let mut groups = Vec::with_capacity(3);
        for kind in TargetGroupKind::all() {
            let name = target_group_name(profile_name, kind);
            let existing = self.cloud.describe_target_groups(&[name.clone()]).await?;
            let record = match existing.first() {
                Some(found) if found.port == kind.port() => {
                    debug!(profile = profile_name, ?kind, "target group reused");
                    TargetGroupRecord { kind, arn: found.arn.clone(), port: found.port }
                }
                Some(found) => {
                    warn!(
                        profile = profile_name,
                        ?kind,
                        wrong_port = found.port,
                        "target group port mismatch, recreating"
                    );
                    self.recreate_target_group(&found.arn, &name, kind).await?
                }
                None => self.create_target_group(&name, kind).await?,
            };
            groups.push(record);
        }
        Ok(RoutingSlice { profile: profile_name.to_string(), target_groups: groups })
    }

    async fn create_target_group(
        &self,
        name: &str,
        kind: TargetGroupKind,
    ) -> Result<TargetGroupRecord, CoreError> {
        let arn = self
            .cloud
            .create_target_group(name, kind.port(), &self.config.vpc_id, &HealthCheckSpec::default())
            .await?;
        info!(name, port = kind.port(), "target group created");
        Ok(TargetGroupRecord { kind, arn, port: kind.port() })
    }

    /// The only place a live target group is deleted outside `DeleteSlice`
    /// (`spec.md` §4.4): a port mismatch forces delete-and-recreate of both
    /// the group and any rules that still point at it.
    async fn recreate_target_group(
        &self,
        old_arn: &str,
        name: &str,
        kind: TargetGroupKind,
    ) -> Result<TargetGroupRecord, CoreError> {
        let rules = self.cloud.describe_rules(&self.config.listener_arn).await?;
        for rule in rules.iter().filter(|r| rule_targets_arn(r, old_arn)) {
            self.cloud.delete_rule(&rule.arn).await?;
        }
        self.cloud.delete_target_group(old_arn).await?;
        self.create_target_group(name, kind).await
    }

    /// Read-only counterpart of [`Self::ensure_slice`]: returns `None`
    /// rather than creating anything when a group is missing. Used by
    /// `Stop`, which must not conjure routing state for a profile it is in
    /// the middle of tearing down.
    pub async fn describe_slice(&self, profile_name: &str) -> Result<Option<RoutingSlice>, CoreError> {
        let mut groups = Vec::with_capacity(3);
        for kind in TargetGroupKind::all() {
            let name = target_group_name(profile_name, kind);
            let existing = self.cloud.describe_target_groups(&[name]).await?;
            match existing.first() {
                Some(found) => groups.push(TargetGroupRecord { kind, arn: found.arn.clone(), port: found.port }),
                None => return Ok(None),
            }
        }
        Ok(Some(RoutingSlice { profile: profile_name.to_string(), target_groups: groups }))
    }

    pub async fn ensure_rules(&self, slice: &RoutingSlice) -> Result<(), CoreError> {
        let lock = self.lock_for(&slice.profile);
        let _guard = lock.lock().await;

        let base = priority_band_base(&slice.profile);
        let existing = self.cloud.describe_rules(&self.config.listener_arn).await?;

        for spec in rule_specs() {
            let group = slice
                .group(spec.kind)
                .ok_or_else(|| CoreError::InvalidArgument(format!("slice missing {:?}", spec.kind)))?;
            let patterns = (spec.path_patterns)(&slice.profile);
            let target_priority = base + spec.offset;

            let reused = existing.iter().find(|r| {
                r.path_patterns.first().map(|p| p.as_str()) == patterns.first().map(|s| s.as_str())
            });

            if let Some(found) = reused {
                if (found.priority - target_priority).abs() <= 5 {
                    debug!(profile = %slice.profile, priority = found.priority, "rule reused");
                    continue;
                }
                info!(profile = %slice.profile, old = found.priority, "rule out of band, recreating");
                self.cloud.delete_rule(&found.arn).await?;
            }

            let action = if spec.auth_required {
                RuleAction::AuthenticateThenForward { target_group_arn: group.arn.clone() }
            } else {
                RuleAction::Forward { target_group_arn: group.arn.clone() }
            };

            self.create_rule_with_retry(target_priority, &patterns, action).await?;
        }
        Ok(())
    }

    async fn create_rule_with_retry(
        &self,
        priority: i32,
        patterns: &[String],
        action: RuleAction,
    ) -> Result<String, CoreError> {
        match self.cloud.create_rule(&self.config.listener_arn, priority, patterns, action.clone()).await
        {
            Ok(arn) => return Ok(arn),
            Err(CoreError::PriorityInUse(_)) => {}
            Err(e) => return Err(e),
        }

        for offset in RETRY_OFFSETS {
            let candidate = priority + offset;
            match self
                .cloud
                .create_rule(&self.config.listener_arn, candidate, patterns, action.clone())
                .await
            {
                Ok(arn) => return Ok(arn),
                Err(CoreError::PriorityInUse(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(CoreError::PriorityInUse(priority))
    }

    pub async fn register_task_on_slice(
        &self,
        slice: &RoutingSlice,
        ip: &str,
    ) -> Result<(), CoreError> {
        for group in &slice.target_groups {
            self.cloud.register_targets(&group.arn, &[(ip.to_string(), group.port)]).await?;
        }
        Ok(())
    }

    pub async fn deregister_task_on_slice(
        &self,
        slice: &RoutingSlice,
        ip: &str,
    ) -> Result<(), CoreError> {
        for group in &slice.target_groups {
            self.cloud.deregister_targets(&group.arn, &[(ip.to_string(), group.port)]).await?;
        }
        Ok(())
    }

    /// Deletes all rules and target groups for a profile; missing elements
    /// are treated as success (`spec.md` §4.4).
    pub async fn delete_slice(&self, profile_name: &str) -> Result<(), CoreError> {
        let lock = self.lock_for(profile_name);
        let _guard = lock.lock().await;

        let names: Vec<String> =
            TargetGroupKind::all().into_iter().map(|k| target_group_name(profile_name, k)).collect();
        let groups = self.cloud.describe_target_groups(&names).await?;

        let rules = self.cloud.describe_rules(&self.config.listener_arn).await?;
        for rule in &rules {
            if groups.iter().any(|g| rule_targets_arn(rule, &g.arn)) {
                self.cloud.delete_rule(&rule.arn).await?;
            }
        }
        for group in &groups {
            self.cloud.delete_target_group(&group.arn).await?;
        }
        info!(profile = profile_name, "routing slice deleted");
        Ok(())
    }

    /// Of `known_profiles` (the full registry catalog), returns the ones
    /// that have a routing slice but are not in `active_profiles`
    /// (`spec.md` §4.4). The CA exposes no cloud-wide "list target groups"
    /// primitive (§4.1 only has describe-by-name), so orphan discovery is
    /// necessarily bounded to the registry's known names rather than an
    /// unscoped listing -- the caller (typically a periodic cleanup job)
    /// supplies both lists from the Profile Registry and the Launch
    /// Controller respectively.
    pub async fn find_orphans(
        &self,
        known_profiles: &[String],
        active_profiles: &[String],
    ) -> Result<Vec<String>, CoreError> {
        let mut orphans = Vec::new();
        for profile in known_profiles {
            if active_profiles.iter().any(|a| a == profile) {
                continue;
            }
            let names: Vec<String> = TargetGroupKind::all()
                .into_iter()
                .map(|k| target_group_name(profile, k))
                .collect();
            let described: Vec<DescribedTargetGroup> =
                self.cloud.describe_target_groups(&names).await?;
            if !described.is_empty() {
                orphans.push(profile.clone());
            }
        }
        Ok(orphans)
    }
}

fn rule_targets_arn(rule: &frank_cloud::adapter::DescribedRule, arn: &str) -> bool {
    match &rule.action {
        RuleAction::Forward { target_group_arn } => target_group_arn == arn,
        RuleAction::AuthenticateThenForward { target_group_arn } => target_group_arn == arn,
    }
}
