use crate::error::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A unit of work for the agent runner, serialized as JSON onto a work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl TaskDescriptor {
    /// A single action for one named agent.
    pub fn agent_action(
        agent_name: impl Into<String>,
        project_id: impl Into<String>,
        action: impl Into<String>,
        params: Option<Value>,
    ) -> Self {
        Self {
            execution_id: None,
            project_id: project_id.into(),
            agent_name: Some(agent_name.into()),
            scene_id: None,
            action: Some(action.into()),
            input: None,
            params,
            timestamp: Utc::now(),
        }
    }

    /// A whole-project execution; `None` means every scene.
    pub fn project_execution(project_id: impl Into<String>, scene_id: Option<String>) -> Self {
        Self {
            execution_id: None,
            project_id: project_id.into(),
            agent_name: None,
            scene_id: Some(scene_id.unwrap_or_else(|| "all".to_string())),
            action: None,
            input: None,
            params: None,
            timestamp: Utc::now(),
        }
    }
}

/// One-way producer for broker-side work queues.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Append `task` to the named queue. Returns the queue length after the append.
    async fn enqueue(&self, queue: &str, task: &TaskDescriptor) -> Result<u64, Error>;
}

/// `TaskQueue` backed by broker lists, appended with `LPUSH`.
#[derive(Clone)]
pub struct RedisTaskQueue {
    connection: MultiplexedConnection,
}

impl RedisTaskQueue {
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, queue: &str, task: &TaskDescriptor) -> Result<u64, Error> {
        let payload = serde_json::to_string(task)?;
        let mut connection = self.connection.clone();
        let length: u64 = connection.lpush(queue, payload).await?;
        debug!(
            "Enqueued task for project {} on {queue} (length {length})",
            task.project_id
        );
        Ok(length)
    }
}
