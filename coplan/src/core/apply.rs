//! Committing decompositions: operator application over the designated world
//! and the possible worlds H entertains.

use tracing::debug;

use crate::core::agents::Agents;
use crate::core::domain::{Domain, Operator};
use crate::core::error::PlanError;
use crate::core::refine::{Decomposition, refine_agenda};
use crate::core::task::Task;
use crate::core::types::{AgentId, DecompStatus, Ids, Tag};

/// Result of applying an operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Application {
    Applied {
        cost: f64,
        shared_resource: Option<String>,
    },
    NotApplicable,
    AlreadyDone,
}

impl Operator {
    /// Check and apply the operator for `task`.
    ///
    /// For H, the task only counts as done (or applicable) when it is done (or
    /// applicable) in the designated world and in every possible world; the
    /// robot only looks at the designated world. Effects of H also update every
    /// possible world. After a communication act, possible worlds whose
    /// conveyed value differs from the designated one are dropped.
    pub fn apply(
        &self,
        task: &Task,
        designated: &mut Agents,
        worlds: &mut Vec<Agents>,
    ) -> Result<Application, PlanError> {
        match task.agent {
            AgentId::Human => {
                let done_everywhere = worlds.iter().all(|world| self.is_done(&world.state, task));
                if done_everywhere && self.is_done(&designated.state, task) {
                    return Ok(Application::AlreadyDone);
                }
                let applicable_everywhere = worlds
                    .iter()
                    .all(|world| self.is_applicable(&world.state, task));
                if !applicable_everywhere || !self.is_applicable(&designated.state, task) {
                    return Ok(Application::NotApplicable);
                }
            }
            AgentId::Robot => {
                if self.is_done(&designated.state, task) {
                    return Ok(Application::AlreadyDone);
                }
                if !self.is_applicable(&designated.state, task) {
                    return Ok(Application::NotApplicable);
                }
            }
        }

        let cost = self.cost_in(&designated.state, task);
        self.apply_effects(&mut designated.state, task)?;
        if task.agent == AgentId::Human {
            for world in worlds.iter_mut() {
                self.apply_effects(&mut world.state, task)?;
            }
        }

        if let Some(conveyed) = self.observed(&designated.state, task) {
            let before = worlds.len();
            worlds.retain(|world| self.observed(&world.state, task).as_ref() == Some(&conveyed));
            debug!(
                task = %task,
                before,
                after = worlds.len(),
                "communication revised possible worlds"
            );
        }

        Ok(Application::Applied {
            cost,
            shared_resource: self.resource_in(&designated.state, task),
        })
    }
}

/// A decomposition committed in its own fork of the world.
#[derive(Debug, Clone)]
pub struct AppliedDecomposition {
    pub decomposition: Decomposition,
    /// Action taken: the committed primitive task or a passive action.
    pub next_action: Task,
    /// Designated world after the action.
    pub end_agents: Agents,
    /// Possible worlds of H after the action.
    pub worlds: Vec<Agents>,
    /// Extra alternative where H waits for a signal instead of being told.
    pub signal: bool,
}

/// Refine `agent` in `agents` and commit every alternative.
///
/// Each alternative gets its own clone of the designated world and of
/// `worlds`. A decomposition led by a communication operator is duplicated
/// as a signal alternative in which H waits for the robot to act.
pub fn applied_refinement(
    domain: &Domain,
    ids: &mut Ids,
    agent: AgentId,
    worlds: &[Agents],
    agents: &Agents,
) -> Result<Vec<AppliedDecomposition>, PlanError> {
    let refinement = refine_agenda(domain, ids, agent, worlds, agents)?;
    let model = domain.model(agent);
    let wait_cost = domain.wait_costs.of(agent);

    let mut communicated = None;
    let mut applied = Vec::with_capacity(refinement.len());
    for decomposition in refinement {
        let mut end_agents = agents.clone();
        let mut forked = worlds.to_vec();
        let mut residual = decomposition.agenda.clone();
        let mut fired = false;

        let action = match (decomposition.status, decomposition.pt.as_ref()) {
            (DecompStatus::Ok, Some(pt)) => {
                let operator = model
                    .operator(&pt.name)
                    .ok_or_else(|| PlanError::MissingOperator {
                        agent,
                        task: pt.name.clone(),
                    })?;
                if agent == AgentId::Human && operator.is_communication() {
                    communicated = Some(decomposition.clone());
                }
                match operator.apply(pt, &mut end_agents, &mut forked)? {
                    Application::Applied {
                        cost,
                        shared_resource,
                    } => {
                        fired = true;
                        pt.clone().into_action(cost, shared_resource)
                    }
                    Application::NotApplicable => {
                        residual.insert(0, pt.clone());
                        Task::passive(ids, agent, Tag::Wait, wait_cost)
                    }
                    Application::AlreadyDone => Task::passive(ids, agent, Tag::Wait, wait_cost),
                }
            }
            (DecompStatus::NoApplicableMethod, _) | (DecompStatus::Ok, None) => {
                Task::passive(ids, agent, Tag::Wait, wait_cost)
            }
            (DecompStatus::AgendaEmpty | DecompStatus::BothAgendasEmpty, _) => {
                Task::passive(ids, agent, Tag::Idle, wait_cost)
            }
        };

        splice_agenda(&decomposition, residual, &mut end_agents, &mut forked, agent);
        if fired {
            fire_triggers(domain, ids, agent, &mut end_agents, &mut forked)?;
        }
        end_agents.agent_mut(agent).planned.push(action.clone());
        applied.push(AppliedDecomposition {
            decomposition,
            next_action: action,
            end_agents,
            worlds: forked,
            signal: false,
        });
    }

    if let Some(decomposition) = communicated {
        let mut end_agents = agents.clone();
        let mut forked = worlds.to_vec();
        let action = Task::signal(ids, domain.wait_costs.of(AgentId::Human));
        let residual = decomposition.agenda.clone();
        splice_agenda(&decomposition, residual, &mut end_agents, &mut forked, agent);
        end_agents.agent_mut(agent).planned.push(action.clone());
        applied.push(AppliedDecomposition {
            decomposition,
            next_action: action,
            end_agents,
            worlds: forked,
            signal: true,
        });
    }

    Ok(applied)
}

/// New agenda = remaining subtasks after the head + residual agenda.
fn splice_agenda(
    decomposition: &Decomposition,
    residual: Vec<Task>,
    end_agents: &mut Agents,
    worlds: &mut [Agents],
    agent: AgentId,
) {
    let mut agenda: Vec<Task> = decomposition.subtasks.iter().skip(1).cloned().collect();
    agenda.extend(residual);
    if agent == AgentId::Human {
        for world in worlds.iter_mut() {
            world.human.agenda = agenda.clone();
        }
    }
    end_agents.agent_mut(agent).agenda = agenda;
}

/// Prepend the tasks of every trigger holding in the new designated state.
///
/// H's possible worlds get the same agenda as the designated world.
fn fire_triggers(
    domain: &Domain,
    ids: &mut Ids,
    agent: AgentId,
    end_agents: &mut Agents,
    worlds: &mut [Agents],
) -> Result<(), PlanError> {
    let model = domain.model(agent);
    for trigger in &model.triggers {
        let Some(subtasks) = trigger.fire(&end_agents.state, agent) else {
            continue;
        };
        debug!(trigger = %trigger.name, agent = %agent, "trigger fired");
        let mut tasks = subtasks
            .iter()
            .map(|subtask| model.instantiate(ids, agent, subtask, None))
            .collect::<Result<Vec<_>, _>>()?;
        let agenda = &mut end_agents.agent_mut(agent).agenda;
        tasks.append(agenda);
        *agenda = tasks;
    }
    if agent == AgentId::Human {
        for world in worlds.iter_mut() {
            world.human.agenda = end_agents.human.agenda.clone();
        }
    }
    Ok(())
}

/// Designated world reached when `action` is taken from `agents`.
///
/// Passive actions leave the world unchanged; otherwise the acting agent is
/// refined again and the decomposition producing a similar action is used.
pub fn agents_after_action(
    domain: &Domain,
    ids: &mut Ids,
    agents: &Agents,
    worlds: &[Agents],
    action: &Task,
) -> Result<Agents, PlanError> {
    if action.is_passive() {
        return Ok(agents.clone());
    }
    applied_refinement(domain, ids, action.agent, worlds, agents)?
        .into_iter()
        .find(|applied| applied.next_action.is_similar(action))
        .map(|applied| applied.end_agents)
        .ok_or_else(|| PlanError::DecompositionNotFound {
            agent: action.agent,
            action: action.label(),
        })
}
