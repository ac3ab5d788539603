//! Shared deterministic types for the planning core.
//!
//! These types define stable contracts between core components. They carry no
//! I/O and must stay deterministic across runs: ids come from an explicit
//! [`Ids`] allocator threaded through the search instead of process globals.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two planning agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgentId {
    #[serde(rename = "H")]
    Human,
    #[serde(rename = "R")]
    Robot,
}

impl AgentId {
    /// Short label used in fluent keys and reports (`"H"` / `"R"`).
    pub fn as_str(self) -> &'static str {
        match self {
            AgentId::Human => "H",
            AgentId::Robot => "R",
        }
    }

    pub fn other(self) -> AgentId {
        match self {
            AgentId::Human => AgentId::Robot,
            AgentId::Robot => AgentId::Human,
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of refining one agenda down to its next primitive task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompStatus {
    #[default]
    Ok,
    NoApplicableMethod,
    AgendaEmpty,
    BothAgendasEmpty,
}

/// AND/OR tag of a pair, alternating per tree level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    And,
    Or,
}

impl NodeType {
    pub fn flipped(self) -> NodeType {
        match self {
            NodeType::And => NodeType::Or,
            NodeType::Or => NodeType::And,
        }
    }
}

/// Tag carried in the parameters of a passive action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Begin,
    Wait,
    WaitTurn,
    Idle,
    Pass,
    Skip,
}

impl Tag {
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Begin => "BEGIN",
            Tag::Wait => "WAIT",
            Tag::WaitTurn => "WAIT_TURN",
            Tag::Idle => "IDLE",
            Tag::Pass => "PASS",
            Tag::Skip => "SKIP",
        }
    }
}

/// Monotonic id allocator for tasks and steps.
///
/// A single allocator is owned by one search so that two runs over the same
/// domain hand out the same ids in the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ids {
    next_task: u64,
    next_step: u64,
}

impl Ids {
    /// Start task ids after the ones already used while building a domain.
    pub fn starting_at(next_task: u64) -> Self {
        Self {
            next_task,
            next_step: 0,
        }
    }

    pub fn task(&mut self) -> u64 {
        let id = self.next_task;
        self.next_task += 1;
        id
    }

    pub fn step(&mut self) -> u64 {
        let id = self.next_step;
        self.next_step += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_per_kind() {
        let mut ids = Ids::starting_at(5);
        assert_eq!(ids.task(), 5);
        assert_eq!(ids.task(), 6);
        assert_eq!(ids.step(), 0);
        assert_eq!(ids.step(), 1);
        assert_eq!(ids.task(), 7);
    }

    #[test]
    fn agent_labels_round_trip_through_serde() {
        let raw = serde_json::to_string(&AgentId::Human).expect("serialize");
        assert_eq!(raw, "\"H\"");
        let back: AgentId = serde_json::from_str("\"R\"").expect("deserialize");
        assert_eq!(back, AgentId::Robot);
        assert_eq!(AgentId::Robot.other(), AgentId::Human);
    }
}
