//! Real `TaskLogReader`, backed by `aws-sdk-cloudwatchlogs`. Follows the
//! ECS `awslogs` driver's naming convention: log stream
//! `<stream_prefix>/<container_name>/<task_id>` inside a fixed log group.

use async_trait::async_trait;
use tracing::debug;

use crate::adapter::TaskLogReader;
use frank_core::error::CoreError;

pub struct CloudWatchLogReader {
    client: aws_sdk_cloudwatchlogs::Client,
    log_group: String,
    stream_prefix: String,
}

impl CloudWatchLogReader {
    pub async fn from_env(log_group: impl Into<String>, stream_prefix: impl Into<String>) -> Self {
        let shared_config = aws_config::load_from_env().await;
        Self {
            client: aws_sdk_cloudwatchlogs::Client::new(&shared_config),
            log_group: log_group.into(),
            stream_prefix: stream_prefix.into(),
        }
    }

    fn stream_name(&self, task_id: &str) -> String {
        // ECS task arns are fully-qualified; the awslogs stream suffix is
        // just the trailing id segment.
        let short_id = task_id.rsplit('/').next().unwrap_or(task_id);
        format!("{}/{}", self.stream_prefix, short_id)
    }
}

#[async_trait]
impl TaskLogReader for CloudWatchLogReader {
    async fn read_log(&self, task_id: &str) -> Result<String, CoreError> {
        let stream = self.stream_name(task_id);
        debug!(task_id, stream = %stream, "reading task log");

        let mut lines = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let mut req = self
                .client
                .get_log_events()
                .log_group_name(&self.log_group)
                .log_stream_name(&stream)
                .start_from_head(true);
            if let Some(token) = &next_token {
                req = req.next_token(token);
            }
            let out = req.send().await.map_err(|e| {
                let msg = e.to_string();
                if msg.contains("ResourceNotFoundException") {
                    CoreError::NotFound(format!("log stream {stream}"))
                } else {
                    CoreError::Transient(msg)
                }
            })?;

            for event in out.events() {
                if let Some(msg) = event.message() {
                    lines.push(msg.to_string());
                }
            }

            match out.next_forward_token() {
                Some(token) if Some(token.to_string()) != next_token => {
                    next_token = Some(token.to_string());
                }
                _ => break,
            }
        }
        Ok(lines.join("\n"))
    }
}
