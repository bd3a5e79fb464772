use crate::error::Error;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde_json::{json, Map, Value};

/// Agents whose status the dashboard polls.
pub const AGENTS: [&str; 9] = [
    "jarvis", "neoqeav", "joao", "cassiano", "noah", "melissa", "victoria", "miriam", "caio",
];

/// Broker key under which the agent runner stores one agent's status document.
pub fn status_key(agent: &str) -> String {
    format!("agent-status:{agent}")
}

/// Read-only view of the status documents written by the agent runner.
#[async_trait]
pub trait AgentStatusStore: Send + Sync {
    /// The stored status of `agent`, or `None` if it never reported one.
    async fn agent_status(&self, agent: &str) -> Result<Option<Value>, Error>;
}

/// Status of every known agent, keyed by name. Agents without a stored
/// status are reported as `{"status": "offline"}`.
pub async fn all_agent_statuses(
    store: &dyn AgentStatusStore,
) -> Result<Map<String, Value>, Error> {
    let mut statuses = Map::new();
    for agent in AGENTS {
        let status = store
            .agent_status(agent)
            .await?
            .unwrap_or_else(|| json!({"status": "offline"}));
        statuses.insert(agent.to_string(), status);
    }
    Ok(statuses)
}

/// `AgentStatusStore` backed by plain broker keys, read with `GET`.
#[derive(Clone)]
pub struct RedisAgentStatusStore {
    connection: MultiplexedConnection,
}

impl RedisAgentStatusStore {
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl AgentStatusStore for RedisAgentStatusStore {
    async fn agent_status(&self, agent: &str) -> Result<Option<Value>, Error> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection.get(status_key(agent)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
