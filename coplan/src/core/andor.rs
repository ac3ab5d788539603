//! Goal-directed AND/OR search and policy extraction.
//!
//! Node types alternate per level. An OR pair is DONE as soon as one of its
//! live children is DONE, an AND pair once all of them are; children marked
//! pass are dead branches and don't count. The search stops the moment the
//! BEGIN pair is DONE.

use tracing::{debug, info, instrument};

use crate::core::domain::Domain;
use crate::core::error::PlanError;
use crate::core::expand::{Terminal, expand_epistemic};
use crate::core::frontier::{Frontier, SearchStats};
use crate::core::tree::{PairIdx, PlanTree, StepIdx};
use crate::core::types::{Ids, NodeType};

/// Expand pairs from `frontier` until the root is DONE, the frontier is
/// empty or `max_expansions` is reached. Returns whether the root is DONE.
#[instrument(skip_all, fields(domain = %domain.name))]
pub fn and_or_search(
    domain: &Domain,
    ids: &mut Ids,
    tree: &mut PlanTree,
    frontier: &mut Frontier,
    allow_signal: bool,
    max_expansions: Option<usize>,
    stats: &mut SearchStats,
) -> Result<bool, PlanError> {
    loop {
        if stats.exhausted(max_expansions) && !frontier.is_empty() {
            stats.truncated = true;
            break;
        }
        let Some(pair) = frontier.pop() else {
            break;
        };
        let expansion = expand_epistemic(domain, ids, tree, pair, allow_signal)?;
        stats.expansions += 1;
        stats.max_worlds = stats.max_worlds.max(expansion.worlds);

        match expansion.terminal {
            Some(terminal) => {
                let node = tree.pair_mut(pair);
                match terminal {
                    Terminal::Goal => node.done = true,
                    Terminal::Pass => node.pass = true,
                }
                debug!(pair = pair.0, ?terminal, "terminal pair");
                propagate_done(tree, pair);
            }
            None => {
                let reached: Vec<PairIdx> = tree
                    .step_pairs(expansion.step)
                    .into_iter()
                    .filter(|child| tree.pair(*child).done)
                    .collect();
                for child in reached {
                    propagate_done(tree, child);
                }
            }
        }

        if tree.pair(PlanTree::ROOT_PAIR).done {
            info!(
                expansions = stats.expansions,
                open = frontier.len(),
                "root solved"
            );
            return Ok(true);
        }
        frontier.push_expansion(expansion.new_pairs);
    }
    Ok(tree.pair(PlanTree::ROOT_PAIR).done)
}

/// Walk up from a DONE or pass pair, marking ancestors DONE while their
/// node type is satisfied. Stops at the first ancestor left unchanged or
/// already DONE.
pub fn propagate_done(tree: &mut PlanTree, from: PairIdx) {
    let mut cursor = tree.pair(from).previous;
    while let Some(parent) = cursor {
        let node = tree.pair(parent);
        if node.done {
            return;
        }
        let mut live = node
            .next
            .iter()
            .map(|child| tree.pair(*child))
            .filter(|child| !child.pass);
        let satisfied = match node.node_type {
            NodeType::Or => live.any(|child| child.done),
            NodeType::And => live.all(|child| child.done),
        };
        if !satisfied {
            return;
        }
        tree.pair_mut(parent).done = true;
        cursor = tree.pair(parent).previous;
    }
}

/// Prune the explored tree down to one conditional plan.
///
/// Below each step, only children grown from DONE pairs stay; under an OR
/// pair only the first of them.
pub fn extract_policy(tree: &mut PlanTree) {
    let Some(&first) = tree.step(PlanTree::ROOT_STEP).children.first() else {
        return;
    };
    let mut stack: Vec<StepIdx> = vec![first];
    while let Some(step) = stack.pop() {
        let Some(from) = tree.step(step).from_pair else {
            continue;
        };
        let done: Vec<StepIdx> = tree
            .step(step)
            .children
            .iter()
            .copied()
            .filter(|child| {
                tree.step(*child)
                    .from_pair
                    .is_some_and(|pair| tree.pair(pair).done)
            })
            .collect();
        let kept: Vec<StepIdx> = match tree.pair(from).node_type {
            NodeType::And => done,
            NodeType::Or => done.into_iter().take(1).collect(),
        };
        stack.extend(kept.iter().copied());
        tree.step_mut(step).children = kept;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agents::Agents;
    use crate::core::task::Task;
    use crate::core::tree::Candidate;
    use crate::core::types::{AgentId, Tag};

    fn candidate(ids: &mut Ids, human: Tag, robot: Tag) -> Candidate {
        Candidate {
            human: Task::passive(ids, AgentId::Human, human, 2.0),
            robot: Task::passive(ids, AgentId::Robot, robot, 0.0),
            end_agents: Agents::default(),
            worlds: Vec::new(),
        }
    }

    /// BEGIN (AND) with two human options, the first one expanded once.
    fn two_options(ids: &mut Ids) -> (PlanTree, [PairIdx; 3], [StepIdx; 3]) {
        let root = candidate(ids, Tag::Begin, Tag::Begin);
        let mut tree = PlanTree::new(ids, root, NodeType::And);
        let first = candidate(ids, Tag::Wait, Tag::WaitTurn);
        let second = candidate(ids, Tag::Idle, Tag::WaitTurn);
        let options = tree.add_step(ids, PlanTree::ROOT_PAIR, vec![first, second]);
        let [left, right] = tree.step_pairs(options)[..] else {
            panic!("two pairs expected");
        };
        let reply = candidate(ids, Tag::WaitTurn, Tag::Wait);
        let left_step = tree.add_step(ids, left, vec![reply]);
        let right_reply = candidate(ids, Tag::WaitTurn, Tag::Idle);
        let right_step = tree.add_step(ids, right, vec![right_reply]);
        let leaf = tree.step_pairs(left_step)[0];
        (tree, [left, right, leaf], [options, left_step, right_step])
    }

    #[test]
    fn or_needs_one_child_and_needs_all_live_children() {
        let mut ids = Ids::default();
        let (mut tree, [left, right, leaf], _) = two_options(&mut ids);
        assert_eq!(tree.pair(left).node_type, NodeType::Or);

        tree.pair_mut(leaf).done = true;
        propagate_done(&mut tree, leaf);
        assert!(tree.pair(left).done);
        assert!(!tree.pair(PlanTree::ROOT_PAIR).done);

        tree.pair_mut(right).pass = true;
        propagate_done(&mut tree, right);
        assert!(tree.pair(PlanTree::ROOT_PAIR).done);
    }

    #[test]
    fn policy_keeps_children_of_done_pairs_only() {
        let mut ids = Ids::default();
        let (mut tree, [_, right, leaf], [options, left_step, _]) = two_options(&mut ids);
        tree.pair_mut(leaf).done = true;
        propagate_done(&mut tree, leaf);
        tree.pair_mut(right).pass = true;
        propagate_done(&mut tree, right);

        extract_policy(&mut tree);
        assert_eq!(tree.step(options).children, vec![left_step]);
        assert!(tree.step(left_step).children.is_empty());
    }
}
