//! Structural invariants of a plan tree.

use std::collections::HashSet;

use crate::core::tree::{PlanTree, StepIdx};
use crate::core::worlds::duplicate_worlds;

/// Check the invariants of the steps reachable from the root:
/// - No duplicate step ids
/// - A child step's id is greater than its parent's
/// - A step's from-pair lists exactly the step's pairs as `next`
/// - The pairs of one human option share one human action id
/// - Node types alternate between a pair and its `next` pairs
/// - Expanded pairs carry a minimal set of possible worlds
pub fn validate_tree(tree: &PlanTree) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![PlanTree::ROOT_STEP];
    while let Some(step) = stack.pop() {
        validate_step(tree, step, &mut seen, &mut errors);
        stack.extend(tree.step(step).children.iter().rev().copied());
    }
    errors
}

fn validate_step(tree: &PlanTree, idx: StepIdx, seen: &mut HashSet<u64>, errors: &mut Vec<String>) {
    let step = tree.step(idx);
    if !seen.insert(step.id) {
        errors.push(format!("duplicate step id {}", step.id));
    }

    if let Some(parent) = step.parent {
        let parent_id = tree.step(parent).id;
        if step.id <= parent_id {
            errors.push(format!(
                "step {}: id must be greater than parent step {}",
                step.id, parent_id
            ));
        }
    }

    let mut pairs = tree.step_pairs(idx);
    if let Some(from) = step.from_pair {
        let mut next = tree.pair(from).next.clone();
        next.sort();
        pairs.sort();
        if next != pairs {
            errors.push(format!(
                "step {}: from-pair next {:?} doesn't match step pairs {:?}",
                step.id,
                next.iter().map(|pair| pair.0).collect::<Vec<_>>(),
                pairs.iter().map(|pair| pair.0).collect::<Vec<_>>()
            ));
        }
    }

    for option in &step.options {
        let option = tree.option(*option);
        for pair in &option.pairs {
            if tree.pair(*pair).human.id != option.human.id {
                errors.push(format!(
                    "step {}: pair {} doesn't share human action {} of its option",
                    step.id, pair.0, option.human.id
                ));
            }
        }
    }

    for pair in &pairs {
        let node = tree.pair(*pair);
        for child in &node.next {
            if tree.pair(*child).node_type == node.node_type {
                errors.push(format!(
                    "step {}: pair {} and its next pair {} have the same node type",
                    step.id, pair.0, child.0
                ));
            }
        }
        if !node.next.is_empty() {
            for (left, right) in duplicate_worlds(node.copresent, &node.worlds) {
                errors.push(format!(
                    "step {}: pair {} holds equivalent worlds {} and {}",
                    step.id, pair.0, left, right
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agents::Agents;
    use crate::core::task::Task;
    use crate::core::tree::Candidate;
    use crate::core::types::{AgentId, Ids, NodeType, Tag};

    fn candidate(ids: &mut Ids, human: Tag) -> Candidate {
        Candidate {
            human: Task::passive(ids, AgentId::Human, human, 2.0),
            robot: Task::passive(ids, AgentId::Robot, Tag::WaitTurn, 0.0),
            end_agents: Agents::default(),
            worlds: Vec::new(),
        }
    }

    fn small_tree(ids: &mut Ids) -> PlanTree {
        let root = candidate(ids, Tag::Begin);
        let mut tree = PlanTree::new(ids, root, NodeType::And);
        let first = candidate(ids, Tag::Wait);
        let second = candidate(ids, Tag::Idle);
        tree.add_step(ids, PlanTree::ROOT_PAIR, vec![first, second]);
        tree
    }

    #[test]
    fn built_trees_are_valid() {
        let mut ids = Ids::default();
        let tree = small_tree(&mut ids);
        assert!(validate_tree(&tree).is_empty());
    }

    #[test]
    fn reports_each_broken_rule() {
        let mut ids = Ids::default();
        let mut tree = small_tree(&mut ids);
        let step = tree.step(PlanTree::ROOT_STEP).children[0];
        tree.step_mut(step).id = 0;
        let pair = tree.step_pairs(step)[0];
        tree.pair_mut(pair).node_type = NodeType::And;
        tree.pair_mut(PlanTree::ROOT_PAIR).next.pop();

        let mut world = Agents::default();
        world.robot.agenda.push(Task::passive(&mut ids, AgentId::Robot, Tag::Idle, 0.0));
        let root = tree.pair_mut(PlanTree::ROOT_PAIR);
        root.worlds = vec![world.clone(), world];

        let errors = validate_tree(&tree);
        assert!(errors.iter().any(|e| e.contains("duplicate step id 0")));
        assert!(errors.iter().any(|e| e.contains("greater than parent")));
        assert!(errors.iter().any(|e| e.contains("doesn't match step pairs")));
        assert!(errors.iter().any(|e| e.contains("same node type")));
        assert!(errors.iter().any(|e| e.contains("equivalent worlds 0 and 1")));
    }
}
