//! Per-agent dynamic data and the two-agent world snapshot.

use crate::core::state::State;
use crate::core::task::Task;
use crate::core::types::AgentId;

/// Dynamic part of an agent; its static tables live in the domain.
#[derive(Debug, Clone, Default)]
pub struct Agent {
    /// Pending tasks, head first.
    pub agenda: Vec<Task>,
    /// Actions committed so far in this world.
    pub planned: Vec<Task>,
}

/// One world: the shared state plus both agents' agendas.
///
/// Cloning forks the world: dynamic fluents and agendas are copied, static
/// fluents stay shared.
#[derive(Debug, Clone, Default)]
pub struct Agents {
    pub state: State,
    pub human: Agent,
    pub robot: Agent,
}

impl Agents {
    /// World holding only a state, used when rebuilding persisted leaves.
    pub fn from_state(state: State) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    pub fn agent(&self, id: AgentId) -> &Agent {
        match id {
            AgentId::Human => &self.human,
            AgentId::Robot => &self.robot,
        }
    }

    pub fn agent_mut(&mut self, id: AgentId) -> &mut Agent {
        match id {
            AgentId::Human => &mut self.human,
            AgentId::Robot => &mut self.robot,
        }
    }

    /// Agendas match entry by entry on abstractness, name and parameters.
    pub fn same_agenda(&self, other: &Agents, id: AgentId) -> bool {
        let mine = &self.agent(id).agenda;
        let theirs = &other.agent(id).agenda;
        mine.len() == theirs.len()
            && mine
                .iter()
                .zip(theirs)
                .all(|(left, right)| left.same_agenda_entry(right))
    }
}
