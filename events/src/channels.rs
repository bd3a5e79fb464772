//! Fixed broker channel and queue names shared by the node and its workers.

/// Agent lifecycle and project-level notifications.
pub const AGENT_EVENTS: &str = "agent-events";

/// Progress reports for individual executions.
pub const EXECUTION_UPDATES: &str = "execution-updates";

/// Every pub/sub channel the listener subscribes to at startup.
pub const ALL: [&str; 2] = [AGENT_EVENTS, EXECUTION_UPDATES];

/// Work queue consumed by the agent runner for single agent actions.
pub const AGENT_TASKS_QUEUE: &str = "agent-tasks";

/// Work queue consumed by the agent runner for whole-project executions.
pub const EXECUTION_QUEUE: &str = "execution-queue";

/// Field of an event payload that names the project the event belongs to.
pub const TARGET_SCOPE_FIELD: &str = "projectId";
