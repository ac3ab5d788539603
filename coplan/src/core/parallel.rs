//! Interleaving search: every joint action pair both agents can take from a
//! pair, ignoring what H believes.

use tracing::debug;

use crate::core::agents::Agents;
use crate::core::apply::{agents_after_action, applied_refinement};
use crate::core::domain::Domain;
use crate::core::error::PlanError;
use crate::core::task::Task;
use crate::core::tree::{Candidate, PairIdx, PlanTree, StepIdx};
use crate::core::types::{AgentId, Ids, Tag};

/// Joint actions reachable from `agents`.
///
/// Pairs computed with H acting first are kept when the same pair also comes
/// out with R acting first and both actions don't hold the same shared
/// resource. When both agents can act, H may also pass while R proceeds
/// alone. An H action left without a partner is paired with R waiting.
pub fn parallel_pairs(domain: &Domain, ids: &mut Ids, agents: &Agents) -> Result<Vec<Candidate>, PlanError> {
    let mut human_first = Vec::new();
    for human in applied_refinement(domain, ids, AgentId::Human, &[], agents)? {
        for robot in applied_refinement(domain, ids, AgentId::Robot, &[], &human.end_agents)? {
            human_first.push(Candidate {
                human: human.next_action.clone(),
                robot: robot.next_action,
                end_agents: robot.end_agents,
                worlds: Vec::new(),
            });
        }
    }

    let mut robot_first = Vec::new();
    for robot in applied_refinement(domain, ids, AgentId::Robot, &[], agents)? {
        for human in applied_refinement(domain, ids, AgentId::Human, &[], &robot.end_agents)? {
            robot_first.push(Candidate {
                human: human.next_action,
                robot: robot.next_action.clone(),
                end_agents: human.end_agents,
                worlds: Vec::new(),
            });
        }
    }

    let human_active = human_first.iter().any(|pair| !pair.human.is_passive());
    let robot_active = robot_first.iter().any(|pair| !pair.robot.is_passive());

    let mut robot_alone: Vec<Candidate> = Vec::new();
    if human_active && robot_active {
        let pass = Task::passive(ids, AgentId::Human, Tag::Pass, domain.wait_costs.human);
        for pair in &robot_first {
            if robot_alone
                .iter()
                .any(|other| other.robot.is_similar(&pair.robot))
            {
                continue;
            }
            let mut end_agents = agents_after_action(domain, ids, agents, &[], &pair.robot)?;
            end_agents.human.planned.push(pass.clone());
            robot_alone.push(Candidate {
                human: pass.clone(),
                robot: pair.robot.clone(),
                end_agents,
                worlds: Vec::new(),
            });
        }
    }

    let mut admitted: Vec<Candidate> = Vec::new();
    for pair in &human_first {
        if !human_active {
            admitted.push(pair.clone());
            continue;
        }
        let commutes = robot_first.iter().any(|other| {
            pair.robot.is_similar(&other.robot) && pair.human.is_similar(&other.human)
        });
        let clash = match (pair.human.shared_resource(), pair.robot.shared_resource()) {
            (Some(human), Some(robot)) => human == robot,
            _ => false,
        };
        if commutes && !clash {
            admitted.push(pair.clone());
        }
    }

    for pair in &human_first {
        if admitted
            .iter()
            .any(|other| other.human.is_similar(&pair.human))
        {
            continue;
        }
        let wait = Task::passive(ids, AgentId::Robot, Tag::Wait, domain.wait_costs.robot);
        let end_agents = agents_after_action(domain, ids, agents, &[], &pair.human)?;
        admitted.push(Candidate {
            human: pair.human.clone(),
            robot: wait,
            end_agents,
            worlds: Vec::new(),
        });
    }

    admitted.extend(robot_alone);
    Ok(admitted)
}

/// Give R a passive SKIP answer to every human option of `step`.
///
/// An existing passive robot action gets the SKIP tag; otherwise a new pair
/// (H's action, R SKIP) is attached to the option.
pub fn add_systematic_skip(
    domain: &Domain,
    ids: &mut Ids,
    tree: &mut PlanTree,
    step: StepIdx,
) -> Result<(), PlanError> {
    let Some(from) = tree.step(step).from_pair else {
        return Ok(());
    };
    let options = tree.step(step).options.clone();
    for option in options {
        let passive = tree
            .option(option)
            .pairs
            .iter()
            .copied()
            .find(|pair| tree.pair(*pair).robot.is_passive());
        if let Some(pair) = passive {
            tree.pair_mut(pair).robot.push_tag(Tag::Skip);
            continue;
        }

        let agents = tree
            .pair(from)
            .end_agents
            .clone()
            .ok_or(PlanError::MissingWorld { pair: from.0 })?;
        let human = tree.option(option).human.clone();
        let end_agents = agents_after_action(domain, ids, &agents, &[], &human)?;
        let skip = Task::passive(ids, AgentId::Robot, Tag::Skip, domain.wait_costs.robot);
        tree.attach_to_option(
            option,
            Candidate {
                human,
                robot: skip,
                end_agents,
                worlds: Vec::new(),
            },
        );
    }
    Ok(())
}

/// Expand `pair` with every parallel pair and return the pairs to explore.
///
/// Double-passive pairs are kept in the tree but never explored.
pub fn expand_parallel(
    domain: &Domain,
    ids: &mut Ids,
    tree: &mut PlanTree,
    pair: PairIdx,
) -> Result<Vec<PairIdx>, PlanError> {
    let agents = tree
        .pair(pair)
        .end_agents
        .clone()
        .ok_or(PlanError::MissingWorld { pair: pair.0 })?;
    let candidates = parallel_pairs(domain, ids, &agents)?;
    let step = tree.add_step(ids, pair, candidates);
    add_systematic_skip(domain, ids, tree, step)?;

    let new_pairs: Vec<PairIdx> = tree
        .step_pairs(step)
        .into_iter()
        .filter(|candidate| !tree.is_passive_pair(*candidate))
        .collect();
    debug!(
        step = tree.step(step).id,
        options = tree.step(step).options.len(),
        new_pairs = new_pairs.len(),
        "parallel expansion"
    );
    Ok(new_pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{Operator, call};
    use crate::core::types::NodeType;
    use crate::test_support::dinner_with_agendas;

    fn labels(pairs: &[Candidate]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|pair| (pair.human.label(), pair.robot.label()))
            .collect()
    }

    #[test]
    fn robot_waits_for_a_human_action_that_does_not_commute() {
        let domain = dinner_with_agendas(vec![call("Cut_n_Wash")], vec![call("Prepare_Dinner")]);
        let mut ids = domain.ids();
        let pairs = parallel_pairs(&domain, &mut ids, &domain.initial).expect("pairs");
        assert_eq!(
            labels(&pairs),
            vec![
                ("cut[]".to_string(), "PASSIVE[WAIT]".to_string()),
                ("PASSIVE[PASS]".to_string(), "cut[]".to_string()),
            ]
        );
        assert!(pairs[0].end_agents.state.flag("cut", "vegetable"));
        assert_eq!(pairs[1].end_agents.human.planned.len(), 1);
    }

    #[test]
    fn shared_resource_blocks_parallel_execution() {
        let grab = || Operator::new("grab").shared_resource(|_, _, _| Some("knife".to_string()));
        let domain = Domain::builder("knife")
            .operators(AgentId::Human, vec![grab()])
            .operators(AgentId::Robot, vec![grab()])
            .agenda(AgentId::Human, vec![call("grab")])
            .agenda(AgentId::Robot, vec![call("grab")])
            .build()
            .expect("build");
        let mut ids = domain.ids();
        let pairs = parallel_pairs(&domain, &mut ids, &domain.initial).expect("pairs");
        assert_eq!(
            labels(&pairs),
            vec![
                ("grab[]".to_string(), "PASSIVE[WAIT]".to_string()),
                ("PASSIVE[PASS]".to_string(), "grab[]".to_string()),
            ]
        );
    }

    #[test]
    fn expansion_adds_skips_and_returns_active_pairs() {
        let domain = dinner_with_agendas(vec![call("Cut_n_Wash")], vec![call("Prepare_Dinner")]);
        let mut ids = domain.ids();
        let human = Task::passive(&mut ids, AgentId::Human, Tag::Begin, 2.0);
        let robot = Task::passive(&mut ids, AgentId::Robot, Tag::Begin, 0.0);
        let mut tree = PlanTree::new(
            &mut ids,
            Candidate {
                human,
                robot,
                end_agents: domain.initial.clone(),
                worlds: Vec::new(),
            },
            NodeType::And,
        );

        let new_pairs =
            expand_parallel(&domain, &mut ids, &mut tree, PlanTree::ROOT_PAIR).expect("expand");
        let step = tree.step_of(new_pairs[0]);
        assert_eq!(tree.step_pairs(step).len(), 3);
        assert_eq!(new_pairs.len(), 2);
        assert!(tree.pair(new_pairs[0]).robot.has_tag(Tag::Skip));
        let skip_pair = tree
            .step_pairs(step)
            .into_iter()
            .find(|pair| tree.is_passive_pair(*pair))
            .expect("skip pair");
        assert!(tree.pair(skip_pair).robot.has_tag(Tag::Skip));
        assert_eq!(tree.pair(PlanTree::ROOT_PAIR).next.len(), 3);
    }
}
