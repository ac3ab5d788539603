//! Copresence-aware expansion of one action pair.
//!
//! Agents take turns: the agent whose last action was WAIT_TURN acts next
//! while the other one waits. Before acting, H's possible worlds are pruned
//! by situation assessment and collapsed to pairwise different ones. When
//! R acts, what happens to those worlds depends on whether H can see R:
//! out of sight every robot move H can't rule out becomes a new possible
//! world; in sight the observed move rules out the worlds where it was
//! impossible.

use tracing::{debug, warn};

use crate::core::agents::Agents;
use crate::core::apply::{AppliedDecomposition, applied_refinement};
use crate::core::domain::Domain;
use crate::core::error::PlanError;
use crate::core::task::Task;
use crate::core::tree::{Candidate, PairIdx, PlanTree, StepIdx};
use crate::core::types::{AgentId, Ids, Tag};
use crate::core::worlds::{assess_situation, dedup_worlds};

/// How an expansion that produced nothing to explore ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// A final pair reached the goal.
    Goal,
    /// Dead end: only repeated double-passive or non-goal final pairs.
    Pass,
}

#[derive(Debug, Clone)]
pub struct Expansion {
    pub step: StepIdx,
    /// Pairs to push on the frontier, in step order.
    pub new_pairs: Vec<PairIdx>,
    pub terminal: Option<Terminal>,
    /// Size of H's world set once deduplicated.
    pub worlds: usize,
}

/// Advance `pair` by one ply.
pub fn expand_epistemic(
    domain: &Domain,
    ids: &mut Ids,
    tree: &mut PlanTree,
    pair: PairIdx,
    allow_signal: bool,
) -> Result<Expansion, PlanError> {
    let designated = tree
        .pair(pair)
        .end_agents
        .clone()
        .ok_or(PlanError::MissingWorld { pair: pair.0 })?;
    let mut worlds = std::mem::take(&mut tree.pair_mut(pair).worlds);
    assess_situation(domain, &designated, &mut worlds);

    let acting = acting_agent(domain, tree, pair)?;
    let copresent = domain.copresent(&designated.state);
    let before = worlds.len();
    let worlds = dedup_worlds(copresent, &designated, worlds);
    debug!(
        pair = pair.0,
        agent = %acting,
        copresent,
        before,
        after = worlds.len(),
        "deduplicated possible worlds"
    );
    {
        let selected = tree.pair_mut(pair);
        selected.copresent = copresent;
        selected.worlds = worlds.clone();
    }

    let candidates = match acting {
        AgentId::Human => {
            human_turn(domain, ids, &designated, &worlds, copresent, allow_signal)?
        }
        AgentId::Robot if copresent => {
            let waits_for_signal = tree.pair(pair).human.is_signal();
            robot_turn_observed(domain, ids, &designated, &worlds, waits_for_signal)?
        }
        AgentId::Robot => robot_turn_unobserved(domain, ids, &designated, &worlds)?,
    };

    let step = tree.add_step(ids, pair, candidates);
    let (new_pairs, terminal) = classify(domain, tree, step);
    debug!(
        pair = pair.0,
        step = tree.step(step).id,
        new_pairs = new_pairs.len(),
        ?terminal,
        "epistemic expansion"
    );
    Ok(Expansion {
        step,
        new_pairs,
        terminal,
        worlds: worlds.len(),
    })
}

/// BEGIN hands over to the starting agent; otherwise the side tagged
/// WAIT_TURN acts.
pub fn acting_agent(domain: &Domain, tree: &PlanTree, pair: PairIdx) -> Result<AgentId, PlanError> {
    if tree.is_begin_pair(pair) {
        return Ok(domain.starting_agent);
    }
    let node = tree.pair(pair);
    if node.human.has_tag(Tag::WaitTurn) {
        Ok(AgentId::Human)
    } else if node.robot.has_tag(Tag::WaitTurn) {
        Ok(AgentId::Robot)
    } else {
        Err(PlanError::NoActingAgent { pair: pair.0 })
    }
}

fn human_turn(
    domain: &Domain,
    ids: &mut Ids,
    designated: &Agents,
    worlds: &[Agents],
    copresent: bool,
    allow_signal: bool,
) -> Result<Vec<Candidate>, PlanError> {
    let applied = applied_refinement(domain, ids, AgentId::Human, worlds, designated)?;
    let wait_turn = Task::passive(ids, AgentId::Robot, Tag::WaitTurn, domain.wait_costs.robot);

    let mut candidates = Vec::with_capacity(applied.len() + 1);
    if allow_signal {
        for signal in applied.iter().filter(|applied| applied.signal) {
            if let Some(candidate) = signal_candidate(domain, ids, signal, &wait_turn)? {
                candidates.push(candidate);
            }
        }
    }
    for applied in applied.into_iter().filter(|applied| !applied.signal) {
        candidates.push(Candidate {
            human: applied.next_action,
            robot: wait_turn.clone(),
            end_agents: applied.end_agents,
            worlds: applied.worlds,
        });
    }

    let passive = candidates
        .iter_mut()
        .find(|candidate| candidate.human.is_passive());
    match passive {
        Some(candidate) => candidate.human.push_tag(Tag::Pass),
        None if copresent => {
            let pass = Task::passive(ids, AgentId::Human, Tag::Pass, domain.wait_costs.human);
            candidates.push(Candidate {
                human: pass,
                robot: wait_turn,
                end_agents: designated.clone(),
                worlds: worlds.to_vec(),
            });
        }
        None => {}
    }
    Ok(candidates)
}

/// H waits for a signal: the domain schedules the robot subtasks conveying it
/// at the head of R's agenda, in the designated and every possible world.
fn signal_candidate(
    domain: &Domain,
    ids: &mut Ids,
    applied: &AppliedDecomposition,
    wait_turn: &Task,
) -> Result<Option<Candidate>, PlanError> {
    let Some(signal) = domain.signal() else {
        warn!(domain = %domain.name, "signal requested but the domain has no signal hook");
        return Ok(None);
    };
    let params = applied
        .decomposition
        .pt
        .as_ref()
        .map(|pt| pt.params.as_slice())
        .unwrap_or_default();
    let subtasks = signal(&applied.end_agents.state, params);
    let tasks = subtasks
        .iter()
        .map(|subtask| domain.robot.instantiate(ids, AgentId::Robot, subtask, None))
        .collect::<Result<Vec<_>, _>>()?;

    let mut end_agents = applied.end_agents.clone();
    prepend(&mut end_agents.robot.agenda, &tasks);
    let mut worlds = applied.worlds.clone();
    for world in &mut worlds {
        prepend(&mut world.robot.agenda, &tasks);
        world.human.agenda = end_agents.human.agenda.clone();
    }
    debug!(tasks = tasks.len(), "robot signal scheduled");
    Ok(Some(Candidate {
        human: applied.next_action.clone(),
        robot: wait_turn.clone(),
        end_agents,
        worlds,
    }))
}

fn prepend(agenda: &mut Vec<Task>, tasks: &[Task]) {
    agenda.splice(0..0, tasks.iter().cloned());
}

/// Tag the first passive robot action of `candidates` with PASS.
fn tag_robot_pass(candidates: &mut [Candidate]) -> bool {
    match candidates
        .iter_mut()
        .find(|candidate| candidate.robot.is_passive())
    {
        Some(candidate) => {
            candidate.robot.push_tag(Tag::Pass);
            true
        }
        None => false,
    }
}

/// R acts out of H's sight.
///
/// Each robot move gets as possible worlds every world reachable by a robot
/// move from one of H's worlds, the worlds H entertained where R could not
/// move, and the outcomes of the other moves R could really have made.
fn robot_turn_unobserved(
    domain: &Domain,
    ids: &mut Ids,
    designated: &Agents,
    worlds: &[Agents],
) -> Result<Vec<Candidate>, PlanError> {
    let mut fanned = Vec::new();
    for world in worlds {
        let applied = applied_refinement(domain, ids, AgentId::Robot, &[], world)?;
        let waits = applied
            .iter()
            .any(|applied| applied.next_action.is_passive());
        fanned.extend(applied.into_iter().map(|applied| applied.end_agents));
        if !waits {
            fanned.push(world.clone());
        }
    }

    let real = applied_refinement(domain, ids, AgentId::Robot, &[], designated)?;
    let waits = real.iter().any(|applied| applied.next_action.is_passive());
    let wait_turn = Task::passive(ids, AgentId::Human, Tag::WaitTurn, domain.wait_costs.human);

    let mut candidates = Vec::with_capacity(real.len() + 1);
    for (index, applied) in real.iter().enumerate() {
        let mut possible = fanned.clone();
        possible.extend(
            real.iter()
                .enumerate()
                .filter(|(other, _)| *other != index)
                .map(|(_, other)| other.end_agents.clone()),
        );
        if !waits {
            possible.push(designated.clone());
        }
        candidates.push(Candidate {
            human: wait_turn.clone(),
            robot: applied.next_action.clone(),
            end_agents: applied.end_agents.clone(),
            worlds: possible,
        });
    }

    if !tag_robot_pass(&mut candidates) {
        let mut possible = fanned;
        possible.extend(real.into_iter().map(|applied| applied.end_agents));
        let pass = Task::passive(ids, AgentId::Robot, Tag::Pass, domain.wait_costs.robot);
        candidates.push(Candidate {
            human: wait_turn,
            robot: pass,
            end_agents: designated.clone(),
            worlds: possible,
        });
    }
    Ok(candidates)
}

/// R acts in front of H.
///
/// A possible world survives a robot move only if R could have made the
/// same move (name and parameters) there too.
fn robot_turn_observed(
    domain: &Domain,
    ids: &mut Ids,
    designated: &Agents,
    worlds: &[Agents],
    waits_for_signal: bool,
) -> Result<Vec<Candidate>, PlanError> {
    let real = applied_refinement(domain, ids, AgentId::Robot, &[], designated)?;
    let stuck = real
        .iter()
        .any(|applied| applied.next_action.starts_with_tag(Tag::Wait));
    let wait_turn = Task::passive(ids, AgentId::Human, Tag::WaitTurn, domain.wait_costs.human);

    let mut candidates = Vec::new();
    if !stuck {
        let mut per_world = Vec::with_capacity(worlds.len());
        for world in worlds {
            per_world.push(applied_refinement(domain, ids, AgentId::Robot, &[], world)?);
        }
        for applied in real {
            let observed = &applied.next_action;
            let consistent: Vec<Agents> = per_world
                .iter()
                .flatten()
                .filter(|possible| {
                    possible.next_action.name == observed.name
                        && possible.next_action.params == observed.params
                })
                .map(|possible| possible.end_agents.clone())
                .collect();
            candidates.push(Candidate {
                human: wait_turn.clone(),
                robot: applied.next_action,
                end_agents: applied.end_agents,
                worlds: consistent,
            });
        }
    }

    let passed = tag_robot_pass(&mut candidates) || waits_for_signal;
    if !passed {
        let mut wait = Task::passive(ids, AgentId::Robot, Tag::Wait, domain.wait_costs.robot);
        wait.push_tag(Tag::Pass);
        candidates.push(Candidate {
            human: wait_turn,
            robot: wait,
            end_agents: designated.clone(),
            worlds: worlds.to_vec(),
        });
    }
    Ok(candidates)
}

/// Mark final and repeated double-passive pairs; return the others.
///
/// Final pairs are DONE when the goal holds in their world and pass
/// otherwise. A double-passive pair following a double-passive pair other
/// than BEGIN is a dead branch.
fn classify(domain: &Domain, tree: &mut PlanTree, step: StepIdx) -> (Vec<PairIdx>, Option<Terminal>) {
    let mut new_pairs = Vec::new();
    let mut reached_goal = false;
    for pair in tree.step_pairs(step) {
        if tree.is_final_pair(pair) {
            let goal = tree
                .pair(pair)
                .end_agents
                .as_ref()
                .is_some_and(|agents| domain.is_goal(&agents.state));
            let node = tree.pair_mut(pair);
            node.done = goal;
            node.pass = !goal;
            reached_goal |= goal;
            continue;
        }
        let repeated = tree.is_passive_pair(pair)
            && tree
                .pair(pair)
                .previous
                .is_some_and(|previous| tree.is_passive_pair(previous) && !tree.is_begin_pair(previous));
        if repeated {
            tree.pair_mut(pair).pass = true;
            continue;
        }
        new_pairs.push(pair);
    }
    let terminal = match (new_pairs.is_empty(), reached_goal) {
        (false, _) => None,
        (true, true) => Some(Terminal::Goal),
        (true, false) => Some(Terminal::Pass),
    };
    (new_pairs, terminal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::call;
    use crate::core::types::NodeType;
    use crate::test_support::dinner_with_agendas;

    fn tree_from(ids: &mut Ids, human: Tag, robot: Tag, agents: Agents, worlds: Vec<Agents>) -> PlanTree {
        let human = Task::passive(ids, AgentId::Human, human, 2.0);
        let robot = Task::passive(ids, AgentId::Robot, robot, 0.0);
        PlanTree::new(
            ids,
            Candidate {
                human,
                robot,
                end_agents: agents,
                worlds,
            },
            NodeType::And,
        )
    }

    /// Kitchen where only the seasoning is left to the robot.
    fn ready_to_season(domain: &Domain) -> Agents {
        let mut agents = domain.initial.clone();
        for fluent in ["cut", "washed", "boiling"] {
            agents.state.set(fluent, "vegetable", true).expect("set");
        }
        agents
    }

    #[test]
    fn human_turn_commits_cut_and_offers_a_pass() {
        let domain = dinner_with_agendas(vec![call("Cut_n_Wash")], vec![call("Prepare_Dinner")]);
        let mut ids = domain.ids();
        let mut tree = tree_from(&mut ids, Tag::Begin, Tag::Begin, domain.initial.clone(), vec![]);

        let expansion = expand_epistemic(&domain, &mut ids, &mut tree, PlanTree::ROOT_PAIR, false)
            .expect("expand");
        let pairs = tree.step_pairs(expansion.step);
        assert_eq!(pairs.len(), 2);
        let cut = tree.pair(pairs[0]);
        assert_eq!(cut.human.name, "cut");
        assert!(cut.robot.has_tag(Tag::WaitTurn));
        let end = cut.end_agents.as_ref().expect("world");
        assert!(end.state.flag("cut", "vegetable"));
        assert_eq!(end.human.agenda[0].name, "wash");
        assert!(tree.pair(pairs[1]).human.has_tag(Tag::Pass));
        assert_eq!(expansion.new_pairs, pairs);
        assert!(tree.pair(PlanTree::ROOT_PAIR).copresent);
    }

    #[test]
    fn missing_turn_marker_is_an_error() {
        let domain = dinner_with_agendas(vec![], vec![]);
        let mut ids = domain.ids();
        let mut tree = tree_from(&mut ids, Tag::Wait, Tag::Wait, domain.initial.clone(), vec![]);
        let err = expand_epistemic(&domain, &mut ids, &mut tree, PlanTree::ROOT_PAIR, false)
            .expect_err("no acting agent");
        assert_eq!(err, PlanError::NoActingAgent { pair: 0 });
    }

    #[test]
    fn observed_robot_move_rules_out_worlds_where_it_was_impossible() {
        let domain = dinner_with_agendas(vec![], vec![call("Prepare_Dinner")]);
        let designated = ready_to_season(&domain);
        let mut already_seasoned = designated.clone();
        already_seasoned
            .state
            .set("seasoned", "vegetable", true)
            .expect("set");
        let mut ids = domain.ids();
        let mut tree = tree_from(
            &mut ids,
            Tag::Idle,
            Tag::WaitTurn,
            designated,
            vec![already_seasoned],
        );

        let expansion = expand_epistemic(&domain, &mut ids, &mut tree, PlanTree::ROOT_PAIR, false)
            .expect("expand");
        assert_eq!(expansion.worlds, 1);
        let pairs = tree.step_pairs(expansion.step);
        assert_eq!(pairs.len(), 2);
        assert_eq!(tree.pair(pairs[0]).robot.name, "seasoning");
        assert!(tree.pair(pairs[0]).worlds.is_empty());
        let pass = tree.pair(pairs[1]);
        assert!(pass.robot.has_tag(Tag::Wait) && pass.robot.has_tag(Tag::Pass));
        assert_eq!(pass.worlds.len(), 1);
    }

    #[test]
    fn unobserved_robot_move_leaves_the_old_world_possible() {
        let domain = dinner_with_agendas(vec![], vec![call("Prepare_Dinner")]);
        let mut designated = ready_to_season(&domain);
        designated.state.set("agent_at", "H", "pantry").expect("set");
        designated
            .state
            .set("agent_in_context", "H", "pantry")
            .expect("set");
        let mut ids = domain.ids();
        let mut tree = tree_from(&mut ids, Tag::Idle, Tag::WaitTurn, designated, vec![]);

        let expansion = expand_epistemic(&domain, &mut ids, &mut tree, PlanTree::ROOT_PAIR, false)
            .expect("expand");
        let pairs = tree.step_pairs(expansion.step);
        let seasoning = tree.pair(pairs[0]);
        assert_eq!(seasoning.robot.name, "seasoning");
        assert_eq!(seasoning.worlds.len(), 1);
        assert!(!seasoning.worlds[0].state.flag("seasoned", "vegetable"));
        assert!(
            seasoning
                .end_agents
                .as_ref()
                .expect("world")
                .state
                .flag("seasoned", "vegetable")
        );
        assert!(tree.pair(pairs[1]).robot.has_tag(Tag::Pass));
        assert!(!tree.pair(PlanTree::ROOT_PAIR).copresent);
    }

    #[test]
    fn waiting_for_a_signal_schedules_the_robot_hook() {
        let domain = crate::domains::prepare_dinner::builder()
            .agenda(AgentId::Human, vec![call("Done_Cooking")])
            .signal(|_, _| vec![call("Communicate")])
            .build()
            .expect("domain");
        let mut designated = domain.initial.clone();
        designated.state.set("seasoned", "vegetable", true).expect("set");
        designated
            .state
            .set("ingredient_at", "ingredient", "vegetable")
            .expect("set");
        let mut unseasoned = designated.clone();
        unseasoned.state.set("seasoned", "vegetable", false).expect("set");
        let mut ids = domain.ids();
        let mut tree = tree_from(&mut ids, Tag::Begin, Tag::Begin, designated, vec![unseasoned]);

        let expansion = expand_epistemic(&domain, &mut ids, &mut tree, PlanTree::ROOT_PAIR, true)
            .expect("expand");
        let pairs = tree.step_pairs(expansion.step);
        let waiting = pairs
            .iter()
            .map(|pair| tree.pair(*pair))
            .find(|pair| pair.human.is_signal())
            .expect("signal pair");
        let end = waiting.end_agents.as_ref().expect("world");
        assert_eq!(end.robot.agenda[0].name, "Communicate");
        assert!(
            waiting
                .worlds
                .iter()
                .all(|world| world.robot.agenda[0].name == "Communicate")
        );

        let mut ids = domain.ids();
        let mut tree = tree_from(&mut ids, Tag::Begin, Tag::Begin, domain.initial.clone(), vec![]);
        let expansion = expand_epistemic(&domain, &mut ids, &mut tree, PlanTree::ROOT_PAIR, false)
            .expect("expand");
        assert!(
            tree.step_pairs(expansion.step)
                .iter()
                .all(|pair| !tree.pair(*pair).human.is_signal())
        );
    }

    #[test]
    fn closing_handshake_is_a_goal_only_when_the_goal_holds() {
        let domain = dinner_with_agendas(vec![], vec![]);
        let mut ids = domain.ids();
        let mut tree = tree_from(&mut ids, Tag::Idle, Tag::WaitTurn, domain.initial.clone(), vec![]);
        let expansion = expand_epistemic(&domain, &mut ids, &mut tree, PlanTree::ROOT_PAIR, false)
            .expect("expand");
        assert!(expansion.new_pairs.is_empty());
        assert_eq!(expansion.terminal, Some(Terminal::Pass));
        let closing = tree.step_pairs(expansion.step)[0];
        assert!(tree.is_final_pair(closing));
        assert!(tree.pair(closing).pass);

        let mut served = domain.initial.clone();
        served
            .state
            .set("cooking_done", "food_ready", true)
            .expect("set");
        let mut tree = tree_from(&mut ids, Tag::Idle, Tag::WaitTurn, served, vec![]);
        let expansion = expand_epistemic(&domain, &mut ids, &mut tree, PlanTree::ROOT_PAIR, false)
            .expect("expand");
        assert_eq!(expansion.terminal, Some(Terminal::Goal));
    }
}
