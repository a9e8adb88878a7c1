//! The real adapter, backed by `aws-sdk-ecs`, `aws-sdk-elasticloadbalancingv2`,
//! `aws-sdk-secretsmanager`, and `aws-sdk-ssm`. Construction (`from_env`) is
//! the only place this crate reads ambient AWS configuration; every other
//! method takes explicit parameters, per `spec.md` §9's redesign flag on
//! ambient environment input.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, ContainerOverride, KeyValuePair, NetworkConfiguration,
    Tag as EcsTag, TaskOverride,
};
use aws_sdk_elasticloadbalancingv2::types::{
    Action as ElbAction, ActionTypeEnum, AuthenticateOidcActionConfig, HealthCheckProtocolEnum,
    PathPatternConditionConfig, RuleCondition, TargetDescription,
};
use tracing::{debug, info, warn};

use crate::adapter::{
    CloudAdapter, DescribedRule, DescribedService, DescribedTargetGroup, DescribedTask,
    EnvOverride, HealthCheckSpec, NetworkConfig, RuleAction, TaskDefinitionRef,
};
use frank_core::error::CoreError;

pub struct AwsCloud {
    ecs: aws_sdk_ecs::Client,
    elbv2: aws_sdk_elasticloadbalancingv2::Client,
    secrets: aws_sdk_secretsmanager::Client,
    ssm: aws_sdk_ssm::Client,
    cluster: String,
}

impl AwsCloud {
    /// Builds real SDK clients from the standard `aws-config` provider
    /// chain (environment, shared config file, IMDS). `cluster` is the ECS
    /// cluster name every task operation is scoped to.
    pub async fn from_env(cluster: impl Into<String>) -> Self {
        let shared_config = aws_config::load_from_env().await;
        Self {
            ecs: aws_sdk_ecs::Client::new(&shared_config),
            elbv2: aws_sdk_elasticloadbalancingv2::Client::new(&shared_config),
            secrets: aws_sdk_secretsmanager::Client::new(&shared_config),
            ssm: aws_sdk_ssm::Client::new(&shared_config),
            cluster: cluster.into(),
        }
    }

    fn map_run_task_err(e: impl std::fmt::Display) -> CoreError {
        let msg = e.to_string();
        if msg.contains("AccessDenied") || msg.contains("not authorized") {
            CoreError::AuthzDenied(msg)
        } else if msg.contains("Capacity") || msg.contains("capacity") {
            CoreError::CapacityExhausted { reason: msg }
        } else {
            CoreError::Transient(msg)
        }
    }
}

#[async_trait]
impl CloudAdapter for AwsCloud {
    async fn run_task(
        &self,
        task_definition: &TaskDefinitionRef,
        network_cfg: &NetworkConfig,
        overrides: &[EnvOverride],
        tags: &HashMap<String, String>,
    ) -> Result<String, CoreError> {
        let vpc_config = AwsVpcConfiguration::builder()
            .set_subnets(Some(network_cfg.subnets.clone()))
            .set_security_groups(Some(network_cfg.security_groups.clone()))
            .assign_public_ip(if network_cfg.assign_public_ip {
                AssignPublicIp::Enabled
            } else {
                AssignPublicIp::Disabled
            })
            .build()
            .map_err(|e| CoreError::InvalidArgument(e.to_string()))?;

        let env: Vec<KeyValuePair> = overrides
            .iter()
            .map(|o| KeyValuePair::builder().name(&o.name).value(&o.value).build())
            .collect();

        let container_override = ContainerOverride::builder().set_environment(Some(env)).build();

        let ecs_tags: Vec<EcsTag> = tags
            .iter()
            .map(|(k, v)| EcsTag::builder().key(k).value(v).build())
            .collect();

        let out = self
            .ecs
            .run_task()
            .cluster(&self.cluster)
            .task_definition(&task_definition.arn)
            .network_configuration(
                NetworkConfiguration::builder().awsvpc_configuration(vpc_config).build(),
            )
            .overrides(
                TaskOverride::builder().container_overrides(container_override).build(),
            )
            .set_tags(Some(ecs_tags))
            .send()
            .await
            .map_err(Self::map_run_task_err)?;

        let task = out
            .tasks()
            .first()
            .ok_or_else(|| CoreError::Transient("run_task returned no tasks".into()))?;
        let task_arn = task
            .task_arn()
            .ok_or_else(|| CoreError::Transient("task missing arn".into()))?
            .to_string();

        info!(task_arn = %task_arn, "task started");
        Ok(task_arn)
    }

    async fn describe_tasks(&self, ids: &[String]) -> Result<Vec<DescribedTask>, CoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let out = self
            .ecs
            .describe_tasks()
            .cluster(&self.cluster)
            .set_tasks(Some(ids.to_vec()))
            .send()
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;

        let described = out
            .tasks()
            .iter()
            .map(|t| {
                let private_ipv4 = t.attachments().iter().find_map(|a| {
                    a.details()
                        .iter()
                        .find(|d| d.name() == Some("privateIPv4Address"))
                        .and_then(|d| d.value())
                        .map(|s| s.to_string())
                });
                let exit_code = t.containers().first().and_then(|c| c.exit_code());
                let tags = t
                    .tags()
                    .iter()
                    .filter_map(|tag| Some((tag.key()?.to_string(), tag.value().unwrap_or("").to_string())))
                    .collect();
                DescribedTask {
                    id: t.task_arn().unwrap_or_default().to_string(),
                    last_status: t.last_status().unwrap_or_default().to_string(),
                    desired_status: t.desired_status().unwrap_or_default().to_string(),
                    private_ipv4,
                    exit_code,
                    tags,
                }
            })
            .collect();
        Ok(described)
    }

    async fn list_tasks(&self, cluster: &str) -> Result<Vec<String>, CoreError> {
        let out = self
            .ecs
            .list_tasks()
            .cluster(cluster)
            .send()
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        Ok(out.task_arns().to_vec())
    }

    async fn stop_task(&self, id: &str, reason: &str) -> Result<(), CoreError> {
        match self.ecs.stop_task().cluster(&self.cluster).task(id).reason(reason).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("not found") || msg.contains("InvalidParameter") {
                    debug!(task = id, "stop_task: task already gone, treating as success");
                    Ok(())
                } else {
                    Err(CoreError::Transient(msg))
                }
            }
        }
    }

    async fn describe_service(&self, name: &str) -> Result<DescribedService, CoreError> {
        let out = self
            .ecs
            .describe_services()
            .cluster(&self.cluster)
            .services(name)
            .send()
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        let svc = out
            .services()
            .first()
            .ok_or_else(|| CoreError::NotFound(format!("service {name}")))?;
        let task_definition = TaskDefinitionRef {
            arn: svc.task_definition().unwrap_or_default().to_string(),
        };
        let network_cfg = svc
            .network_configuration()
            .and_then(|nc| nc.awsvpc_configuration())
            .map(|vc| NetworkConfig {
                subnets: vc.subnets().to_vec(),
                security_groups: vc.security_groups().to_vec(),
                assign_public_ip: matches!(vc.assign_public_ip(), Some(AssignPublicIp::Enabled)),
            })
            .unwrap_or(NetworkConfig {
                subnets: vec![],
                security_groups: vec![],
                assign_public_ip: false,
            });
        Ok(DescribedService { task_definition, network_cfg })
    }

    async fn update_service_desired_count(&self, name: &str, n: i32) -> Result<(), CoreError> {
        self.ecs
            .update_service()
            .cluster(&self.cluster)
            .service(name)
            .desired_count(n)
            .send()
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        Ok(())
    }

    async fn create_target_group(
        &self,
        name: &str,
        port: u16,
        vpc_id: &str,
        health_check: &HealthCheckSpec,
    ) -> Result<String, CoreError> {
        let out = self
            .elbv2
            .create_target_group()
            .name(name)
            .port(port as i32)
            .vpc_id(vpc_id)
            .target_type(aws_sdk_elasticloadbalancingv2::types::TargetTypeEnum::Ip)
            .health_check_protocol(HealthCheckProtocolEnum::Http)
            .health_check_path(&health_check.path)
            .health_check_port(health_check.port.to_string())
            .healthy_threshold_count(health_check.healthy_threshold)
            .unhealthy_threshold_count(health_check.unhealthy_threshold)
            .health_check_interval_seconds(health_check.interval_secs)
            .health_check_timeout_seconds(health_check.timeout_secs)
            .matcher(
                aws_sdk_elasticloadbalancingv2::types::Matcher::builder()
                    .http_code(&health_check.matcher)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        let arn = out
            .target_groups()
            .first()
            .and_then(|tg| tg.target_group_arn())
            .ok_or_else(|| CoreError::Transient("create_target_group returned no arn".into()))?
            .to_string();
        info!(name, port, arn = %arn, "target group created");
        Ok(arn)
    }

    async fn describe_target_groups(
        &self,
        names: &[String],
    ) -> Result<Vec<DescribedTargetGroup>, CoreError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let out = self
            .elbv2
            .describe_target_groups()
            .set_names(Some(names.to_vec()))
            .send()
            .await;
        match out {
            Ok(resp) => Ok(resp
                .target_groups()
                .iter()
                .filter_map(|tg| {
                    Some(DescribedTargetGroup {
                        arn: tg.target_group_arn()?.to_string(),
                        port: tg.port().unwrap_or_default() as u16,
                    })
                })
                .collect()),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("TargetGroupNotFound") {
                    Ok(Vec::new())
                } else {
                    Err(CoreError::Transient(msg))
                }
            }
        }
    }

    async fn delete_target_group(&self, arn: &str) -> Result<(), CoreError> {
        match self.elbv2.delete_target_group().target_group_arn(arn).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("TargetGroupNotFound") {
                    Ok(())
                } else {
                    Err(CoreError::Transient(msg))
                }
            }
        }
    }

    async fn register_targets(
        &self,
        tg_arn: &str,
        targets: &[(String, u16)],
    ) -> Result<(), CoreError> {
        if targets.is_empty() {
            return Ok(());
        }
        let descriptions: Vec<TargetDescription> = targets
            .iter()
            .map(|(ip, port)| TargetDescription::builder().id(ip).port(*port as i32).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CoreError::InvalidArgument(e.to_string()))?;
        self.elbv2
            .register_targets()
            .target_group_arn(tg_arn)
            .set_targets(Some(descriptions))
            .send()
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        Ok(())
    }

    async fn deregister_targets(
        &self,
        tg_arn: &str,
        targets: &[(String, u16)],
    ) -> Result<(), CoreError> {
        if targets.is_empty() {
            return Ok(());
        }
        let descriptions: Vec<TargetDescription> = targets
            .iter()
            .map(|(ip, port)| TargetDescription::builder().id(ip).port(*port as i32).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CoreError::InvalidArgument(e.to_string()))?;
        match self
            .elbv2
            .deregister_targets()
            .target_group_arn(tg_arn)
            .set_targets(Some(descriptions))
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("TargetGroupNotFound") || msg.contains("InvalidTarget") {
                    warn!(tg_arn, "deregister_targets: group or target already gone");
                    Ok(())
                } else {
                    Err(CoreError::Transient(msg))
                }
            }
        }
    }

    async fn describe_listener(&self, name: &str) -> Result<String, CoreError> {
        // `name` is the listener's own ARN lookup key; in this deployment
        // model listeners are provisioned out-of-band (spec.md §1), so the
        // adapter simply validates it resolves rather than searching by tag.
        let out = self
            .elbv2
            .describe_listeners()
            .listener_arns(name)
            .send()
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        out.listeners()
            .first()
            .and_then(|l| l.listener_arn())
            .map(|s| s.to_string())
            .ok_or_else(|| CoreError::NotFound(format!("listener {name}")))
    }

    async fn describe_rules(&self, listener_arn: &str) -> Result<Vec<DescribedRule>, CoreError> {
        let out = self
            .elbv2
            .describe_rules()
            .listener_arn(listener_arn)
            .send()
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;

        let rules = out
            .rules()
            .iter()
            .filter_map(|r| {
                let arn = r.rule_arn()?.to_string();
                let priority: i32 = r.priority().and_then(|p| p.parse().ok()).unwrap_or(i32::MAX);
                let path_patterns = r
                    .conditions()
                    .iter()
                    .filter_map(|c| c.path_pattern_config())
                    .flat_map(|p| p.values().to_vec())
                    .collect::<Vec<_>>();
                let target_group_arn = r
                    .actions()
                    .iter()
                    .find_map(|a| a.target_group_arn())
                    .unwrap_or_default()
                    .to_string();
                let has_auth = r
                    .actions()
                    .iter()
                    .any(|a| a.r#type() == &ActionTypeEnum::AuthenticateOidc);
                let action = if has_auth {
                    RuleAction::AuthenticateThenForward { target_group_arn }
                } else {
                    RuleAction::Forward { target_group_arn }
                };
                Some(DescribedRule {
                    arn,
                    priority,
                    path_patterns,
                    action,
                    is_default: r.is_default(),
                })
            })
            .collect();
        Ok(rules)
    }

    async fn create_rule(
        &self,
        listener_arn: &str,
        priority: i32,
        path_patterns: &[String],
        action: RuleAction,
    ) -> Result<String, CoreError> {
        let condition = RuleCondition::builder()
            .field("path-pattern")
            .path_pattern_config(
                PathPatternConditionConfig::builder().set_values(Some(path_patterns.to_vec())).build(),
            )
            .build();

        let actions: Vec<ElbAction> = match &action {
            RuleAction::Forward { target_group_arn } => vec![ElbAction::builder()
                .r#type(ActionTypeEnum::Forward)
                .target_group_arn(target_group_arn)
                .order(1)
                .build()],
            RuleAction::AuthenticateThenForward { target_group_arn } => vec![
                ElbAction::builder()
                    .r#type(ActionTypeEnum::AuthenticateOidc)
                    .authenticate_oidc_config(AuthenticateOidcActionConfig::builder().build())
                    .order(1)
                    .build(),
                ElbAction::builder()
                    .r#type(ActionTypeEnum::Forward)
                    .target_group_arn(target_group_arn)
                    .order(2)
                    .build(),
            ],
        };

        let out = self
            .elbv2
            .create_rule()
            .listener_arn(listener_arn)
            .priority(priority)
            .conditions(condition)
            .set_actions(Some(actions))
            .send()
            .await;

        match out {
            Ok(resp) => resp
                .rules()
                .first()
                .and_then(|r| r.rule_arn())
                .map(|s| s.to_string())
                .ok_or_else(|| CoreError::Transient("create_rule returned no arn".into())),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("PriorityInUse") {
                    Err(CoreError::PriorityInUse(priority))
                } else {
                    Err(CoreError::Transient(msg))
                }
            }
        }
    }

    async fn delete_rule(&self, rule_arn: &str) -> Result<(), CoreError> {
        match self.elbv2.delete_rule().rule_arn(rule_arn).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("RuleNotFound") {
                    Ok(())
                } else {
                    Err(CoreError::Transient(msg))
                }
            }
        }
    }

    async fn get_secret(&self, id: &str) -> Result<String, CoreError> {
        match self.secrets.get_secret_value().secret_id(id).send().await {
            Ok(out) => out
                .secret_string()
                .map(|s| s.to_string())
                .ok_or_else(|| CoreError::NotFound(id.to_string())),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("ResourceNotFoundException") {
                    Err(CoreError::NotFound(id.to_string()))
                } else {
                    Err(CoreError::Transient(msg))
                }
            }
        }
    }

    async fn put_secret(&self, id: &str, value: &str) -> Result<(), CoreError> {
        let exists = self.secret_exists(id).await?;
        if exists {
            self.secrets
                .put_secret_value()
                .secret_id(id)
                .secret_string(value)
                .send()
                .await
                .map_err(|e| CoreError::Transient(e.to_string()))?;
        } else {
            self.secrets
                .create_secret()
                .name(id)
                .secret_string(value)
                .send()
                .await
                .map_err(|e| CoreError::Transient(e.to_string()))?;
        }
        Ok(())
    }

    async fn secret_exists(&self, id: &str) -> Result<bool, CoreError> {
        match self.secrets.describe_secret().secret_id(id).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("ResourceNotFoundException") {
                    Ok(false)
                } else {
                    Err(CoreError::Transient(msg))
                }
            }
        }
    }

    async fn get_parameter(&self, name: &str) -> Result<String, CoreError> {
        match self.ssm.get_parameter().name(name).with_decryption(true).send().await {
            Ok(out) => out
                .parameter()
                .and_then(|p| p.value())
                .map(|s| s.to_string())
                .ok_or_else(|| CoreError::NotFound(name.to_string())),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("ParameterNotFound") {
                    Err(CoreError::NotFound(name.to_string()))
                } else {
                    Err(CoreError::Transient(msg))
                }
            }
        }
    }

    async fn put_parameter(&self, name: &str, value: &str) -> Result<(), CoreError> {
        self.ssm
            .put_parameter()
            .name(name)
            .value(value)
            .r#type(aws_sdk_ssm::types::ParameterType::String)
            .overwrite(true)
            .send()
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        Ok(())
    }
}
