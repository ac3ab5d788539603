//! Tasks, primitive tasks and committed actions.

use std::fmt;

use crate::core::types::{AgentId, Ids, Tag};

/// Name shared by every passive action; the passive kind lives in the tags.
pub const PASSIVE: &str = "PASSIVE";
/// Name of the action H performs while waiting for a robot signal.
pub const SIGNAL: &str = "GET_SIGNAL";
/// Parameter carried by the signal action.
pub const WAIT_FOR_SIGNAL: &str = "WAIT-FOR-SIGNAL";

/// Runtime kind of a task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskKind {
    /// Refined through the agent's methods.
    Abstract,
    /// Executed through the agent's operator.
    Primitive,
    /// A primitive task committed in one world, with its cost.
    Action {
        cost: f64,
        shared_resource: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: u64,
    pub name: String,
    pub params: Vec<String>,
    pub agent: AgentId,
    pub kind: TaskKind,
    /// Index of the method that produced this task, if any.
    pub method_number: Option<usize>,
}

impl Task {
    pub fn abstract_task(
        ids: &mut Ids,
        name: impl Into<String>,
        params: Vec<String>,
        agent: AgentId,
        method_number: Option<usize>,
    ) -> Task {
        Task {
            id: ids.task(),
            name: name.into(),
            params,
            agent,
            kind: TaskKind::Abstract,
            method_number,
        }
    }

    pub fn primitive(
        ids: &mut Ids,
        name: impl Into<String>,
        params: Vec<String>,
        agent: AgentId,
        method_number: Option<usize>,
    ) -> Task {
        Task {
            id: ids.task(),
            name: name.into(),
            params,
            agent,
            kind: TaskKind::Primitive,
            method_number,
        }
    }

    /// Passive action of `agent` carrying a single tag.
    pub fn passive(ids: &mut Ids, agent: AgentId, tag: Tag, cost: f64) -> Task {
        Task {
            id: ids.task(),
            name: PASSIVE.to_string(),
            params: vec![tag.as_str().to_string()],
            agent,
            kind: TaskKind::Action {
                cost,
                shared_resource: None,
            },
            method_number: None,
        }
    }

    /// The placeholder action of H waiting for the robot to signal.
    pub fn signal(ids: &mut Ids, cost: f64) -> Task {
        Task {
            id: ids.task(),
            name: SIGNAL.to_string(),
            params: vec![WAIT_FOR_SIGNAL.to_string()],
            agent: AgentId::Human,
            kind: TaskKind::Action {
                cost,
                shared_resource: None,
            },
            method_number: None,
        }
    }

    /// Commit a primitive task as an action; the id is kept.
    pub fn into_action(self, cost: f64, shared_resource: Option<String>) -> Task {
        Task {
            kind: TaskKind::Action {
                cost,
                shared_resource,
            },
            ..self
        }
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.kind, TaskKind::Abstract)
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, TaskKind::Primitive)
    }

    pub fn cost(&self) -> Option<f64> {
        match &self.kind {
            TaskKind::Action { cost, .. } => Some(*cost),
            _ => None,
        }
    }

    pub fn shared_resource(&self) -> Option<&str> {
        match &self.kind {
            TaskKind::Action {
                shared_resource, ..
            } => shared_resource.as_deref(),
            _ => None,
        }
    }

    pub fn is_passive(&self) -> bool {
        self.name == PASSIVE
    }

    pub fn is_signal(&self) -> bool {
        self.name == SIGNAL
    }

    /// True for a passive action carrying `tag`.
    pub fn has_tag(&self, tag: Tag) -> bool {
        self.is_passive() && self.params.iter().any(|param| param == tag.as_str())
    }

    /// Append a tag to a passive action.
    pub fn push_tag(&mut self, tag: Tag) {
        self.params.push(tag.as_str().to_string());
    }

    /// True when the first tag of a passive action is `tag`.
    pub fn starts_with_tag(&self, tag: Tag) -> bool {
        self.is_passive() && self.params.first().is_some_and(|first| first == tag.as_str())
    }

    /// Both passive, or same name, parameters, cost and agent.
    pub fn is_similar(&self, other: &Task) -> bool {
        if self.is_passive() && other.is_passive() {
            return true;
        }
        self.name == other.name
            && self.params == other.params
            && self.cost() == other.cost()
            && self.agent == other.agent
    }

    /// Same structural identity on an agenda: abstractness, name and parameters.
    pub fn same_agenda_entry(&self, other: &Task) -> bool {
        self.is_abstract() == other.is_abstract()
            && self.name == other.name
            && self.params == other.params
    }

    /// `name[p1,p2]` label used in persisted solutions and logs.
    pub fn label(&self) -> String {
        format!("{}[{}]", self.name, self.params.join(","))
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            TaskKind::Abstract => "AT",
            TaskKind::Primitive => "PT",
            TaskKind::Action { .. } => "A",
        };
        write!(f, "{}-{}{}-{}", self.id, self.agent, kind, self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_action_keeps_identity() {
        let mut ids = Ids::default();
        let task = Task::primitive(&mut ids, "cut", vec![], AgentId::Robot, Some(0));
        let action = task.clone().into_action(1.0, Some("knife".to_string()));
        assert_eq!(action.id, task.id);
        assert_eq!(action.cost(), Some(1.0));
        assert_eq!(action.shared_resource(), Some("knife"));
        assert_eq!(action.to_string(), "0-RA-cut[]");
    }

    #[test]
    fn passive_actions_are_always_similar() {
        let mut ids = Ids::default();
        let wait = Task::passive(&mut ids, AgentId::Robot, Tag::Wait, 0.0);
        let mut idle = Task::passive(&mut ids, AgentId::Human, Tag::Idle, 2.0);
        assert!(wait.is_similar(&idle));
        idle.push_tag(Tag::Pass);
        assert!(idle.has_tag(Tag::Pass));
        assert!(idle.starts_with_tag(Tag::Idle));
        assert!(!idle.has_tag(Tag::Skip));
    }

    #[test]
    fn similarity_compares_name_params_cost_and_agent() {
        let mut ids = Ids::default();
        let a = Task::primitive(&mut ids, "move", vec!["kitchen".into()], AgentId::Human, None)
            .into_action(1.0, None);
        let b = Task::primitive(&mut ids, "move", vec!["kitchen".into()], AgentId::Human, None)
            .into_action(1.0, None);
        let c = Task::primitive(&mut ids, "move", vec!["pantry".into()], AgentId::Human, None)
            .into_action(1.0, None);
        assert!(a.is_similar(&b));
        assert!(!a.is_similar(&c));
    }
}
