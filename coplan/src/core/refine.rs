//! Single-world agenda refinement.
//!
//! [`refine_agenda`] pops an agent's agenda head and applies methods
//! depth-first until a primitive task that is not yet done surfaces. Every
//! method alternative beyond the first spawns a sibling [`Decomposition`],
//! which is the first branching dimension of the search.

use tracing::debug;

use crate::core::agents::Agents;
use crate::core::domain::{COMMUNICATE, Domain};
use crate::core::error::PlanError;
use crate::core::state::State;
use crate::core::task::Task;
use crate::core::types::{AgentId, DecompStatus, Ids};

/// One way of reducing an agenda to its next primitive task.
#[derive(Debug, Clone, Default)]
pub struct Decomposition {
    /// Remaining subtasks; the head is the ready primitive task when `status` is OK.
    pub subtasks: Vec<Task>,
    /// Residual agenda to splice back after the subtasks.
    pub agenda: Vec<Task>,
    pub status: DecompStatus,
    /// Ready primitive task, set for OK decompositions.
    pub pt: Option<Task>,
}

/// All alternative decompositions of one agenda.
pub type Refinement = Vec<Decomposition>;

impl Decomposition {
    fn new(subtasks: Vec<Task>, agenda: Vec<Task>) -> Self {
        Self {
            subtasks,
            agenda,
            status: DecompStatus::Ok,
            pt: None,
        }
    }

    /// Move on once the head subtask has been dropped.
    ///
    /// Returns `false` when both the subtasks and the agenda are exhausted.
    fn advance(&mut self) -> bool {
        if !self.subtasks.is_empty() {
            return true;
        }
        if self.agenda.is_empty() {
            self.status = DecompStatus::AgendaEmpty;
            return false;
        }
        let next = self.agenda.remove(0);
        self.subtasks.push(next);
        true
    }
}

/// Refine `agent`'s agenda in `agents`.
///
/// `worlds` are the possible worlds H entertains; they only matter when H
/// refines, where a method that is not applicable in some world is replaced
/// by a communication task.
pub fn refine_agenda(
    domain: &Domain,
    ids: &mut Ids,
    agent: AgentId,
    worlds: &[Agents],
    agents: &Agents,
) -> Result<Refinement, PlanError> {
    let mut agenda = agents.agent(agent).agenda.clone();
    if agenda.is_empty() {
        return Ok(vec![Decomposition {
            status: DecompStatus::AgendaEmpty,
            ..Decomposition::default()
        }]);
    }
    let head = agenda.remove(0);
    let mut refinement = vec![Decomposition::new(vec![head], agenda)];

    let mut index = 0;
    while index < refinement.len() {
        let mut current = std::mem::take(&mut refinement[index]);
        let mut siblings = Vec::new();
        refine_decomposition(
            domain,
            ids,
            agent,
            worlds,
            &agents.state,
            &mut current,
            &mut siblings,
        )?;
        refinement[index] = current;
        refinement.extend(siblings);
        index += 1;
    }

    debug!(
        agent = %agent,
        alternatives = refinement.len(),
        "refined agenda"
    );
    Ok(refinement)
}

fn refine_decomposition(
    domain: &Domain,
    ids: &mut Ids,
    agent: AgentId,
    worlds: &[Agents],
    state: &State,
    current: &mut Decomposition,
    siblings: &mut Vec<Decomposition>,
) -> Result<(), PlanError> {
    let model = domain.model(agent);
    loop {
        let Some(task) = current.subtasks.first().cloned() else {
            if current.advance() {
                continue;
            }
            break;
        };

        if task.is_primitive() {
            let operator = model
                .operator(&task.name)
                .ok_or_else(|| PlanError::UnknownTask {
                    agent,
                    task: task.name.clone(),
                })?;
            if !operator.is_done(state, &task) {
                break;
            }
            current.subtasks.remove(0);
            if current.advance() {
                continue;
            }
            break;
        }

        if !task.is_abstract() || !model.has_method(&task.name) {
            return Err(PlanError::UnknownTask {
                agent,
                task: task.name.clone(),
            });
        }

        let rest = current.subtasks[1..].to_vec();
        let mut alternatives =
            refine_method(domain, ids, &task, worlds, state, &current.agenda)?.into_iter();
        let Some(first) = alternatives.next() else {
            current.subtasks = rest;
            current.agenda.insert(0, task);
            current.status = DecompStatus::NoApplicableMethod;
            break;
        };

        if first.subtasks.is_empty() {
            current.subtasks.remove(0);
            if current.advance() {
                continue;
            }
            break;
        }

        for alternative in alternatives {
            let mut subtasks = alternative.subtasks;
            subtasks.extend(rest.iter().cloned());
            siblings.push(Decomposition::new(subtasks, alternative.agenda));
        }
        if !first.agenda.is_empty() {
            current.agenda = first.agenda;
        }
        current.subtasks = first.subtasks;
        current.subtasks.extend(rest);
    }

    if current.status == DecompStatus::Ok {
        current.pt = current.subtasks.first().cloned();
    }
    Ok(())
}

/// Apply every method of an abstract task, in declaration order.
///
/// A done method yields an empty decomposition (the task is satisfied). For
/// H, a method applicable in the designated world but not in every possible
/// world yields a `Communicate` task followed by the task itself.
pub fn refine_method(
    domain: &Domain,
    ids: &mut Ids,
    task: &Task,
    worlds: &[Agents],
    state: &State,
    agenda: &[Task],
) -> Result<Refinement, PlanError> {
    let agent = task.agent;
    let model = domain.model(agent);
    let methods = model
        .methods(&task.name)
        .ok_or_else(|| PlanError::MissingMethod {
            agent,
            task: task.name.clone(),
        })?;

    let mut refinement = Vec::new();
    for (number, method) in methods.iter().enumerate() {
        if method.is_done(state, task) {
            refinement.push(Decomposition::new(Vec::new(), agenda.to_vec()));
            continue;
        }
        if !method.is_applicable(state, task) {
            continue;
        }

        let undecided = agent == AgentId::Human
            && worlds
                .iter()
                .any(|world| !method.is_applicable(&world.state, task));
        if undecided {
            if model.has_method(COMMUNICATE) {
                debug!(task = %task, "method undecided in possible worlds, communicating first");
                let ask = Task::abstract_task(ids, COMMUNICATE, Vec::new(), agent, Some(number));
                let mut requeued = Vec::with_capacity(agenda.len() + 1);
                requeued.push(task.clone());
                requeued.extend_from_slice(agenda);
                refinement.push(Decomposition::new(vec![ask], requeued));
            }
            continue;
        }

        let alternatives = method.alternatives_for(state, task);
        if alternatives.is_empty() && method.requires_alternatives() {
            return Err(PlanError::EmptyDecomposition {
                agent,
                task: task.name.clone(),
            });
        }
        for alternative in &alternatives {
            let subtasks = alternative
                .iter()
                .map(|subtask| model.instantiate(ids, agent, subtask, Some(number)))
                .collect::<Result<Vec<_>, _>>()?;
            refinement.push(Decomposition::new(subtasks, agenda.to_vec()));
        }
    }
    Ok(refinement)
}
