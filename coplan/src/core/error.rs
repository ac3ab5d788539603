//! Typed failures raised by the planning core.

use thiserror::Error;

use crate::core::types::AgentId;

/// Violations of the fluent schema declared when the domain was built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("unknown fluent '{0}'")]
    UnknownFluent(String),
    #[error("fluent '{fluent}' has no key '{key}'")]
    UnknownKey { fluent: String, key: String },
    #[error("fluent '{0}' is static and cannot be modified")]
    StaticFluent(String),
}

/// Fatal search errors. Configuration variants point at a domain bug.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("task '{task}' isn't known by agent {agent}")]
    UnknownTask { agent: AgentId, task: String },
    #[error("agent {agent} doesn't have an operator for '{task}'")]
    MissingOperator { agent: AgentId, task: String },
    #[error("agent {agent} doesn't have a method for '{task}'")]
    MissingMethod { agent: AgentId, task: String },
    #[error("unexpected empty decomposition for '{task}' of agent {agent}")]
    EmptyDecomposition { agent: AgentId, task: String },
    #[error("no decomposition of agent {agent} produces action '{action}'")]
    DecompositionNotFound { agent: AgentId, action: String },
    #[error("pair {pair} has no acting agent (neither side waits for its turn)")]
    NoActingAgent { pair: usize },
    #[error("pair {pair} has no designated world to expand")]
    MissingWorld { pair: usize },
    #[error("applying '{task}' for agent {agent}: {source}")]
    Effect {
        agent: AgentId,
        task: String,
        #[source]
        source: StateError,
    },
}
