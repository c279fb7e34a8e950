use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PacingConfig, Run, RunTrigger};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
    pub retry_count: i32,
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessageType {
    RunExecution(RunExecutionMessage),
}

/// 运行执行请求，携带入队时刻的节奏与重试配置快照
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunExecutionMessage {
    pub run_id: String,
    pub source_name: String,
    pub trigger: RunTrigger,
    pub payload: serde_json::Value,
    pub pacing: PacingConfig,
    pub max_retries: i32,
}

impl RunExecutionMessage {
    pub fn for_run(run: &Run, pacing: PacingConfig, max_retries: i32) -> Self {
        Self {
            run_id: run.run_id.clone(),
            source_name: run.source_name.clone(),
            trigger: run.trigger,
            payload: run.payload.clone(),
            pacing,
            max_retries,
        }
    }
}

impl Message {
    pub fn run_execution(message: RunExecutionMessage) -> Self {
        let correlation_id = Some(message.run_id.clone());
        Self {
            id: Uuid::new_v4().to_string(),
            message_type: MessageType::RunExecution(message),
            timestamp: Utc::now(),
            retry_count: 0,
            correlation_id,
        }
    }
    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }
    pub fn with_correlation_id(mut self, correlation_id: String) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
    pub fn deserialize(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
    pub fn message_type_str(&self) -> &'static str {
        match &self.message_type {
            MessageType::RunExecution(_) => "run_execution",
        }
    }
    pub fn run_id(&self) -> &str {
        match &self.message_type {
            MessageType::RunExecution(msg) => &msg.run_id,
        }
    }
}
