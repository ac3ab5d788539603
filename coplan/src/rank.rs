//! Ranking of final leaves for `coplan rank` and `coplan explore`.

use serde::Serialize;
use tracing::debug;

use crate::core::metrics::{Preference, rank_leaves, rank_score, update_choices};
use crate::core::tree::PlanTree;
use crate::core::types::AgentId;

/// Execution preferences of both agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preferences {
    pub robot: Preference,
    pub human: Preference,
}

/// One ranked leaf, best first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedLeaf {
    pub step: u64,
    pub robot_rank: usize,
    pub human_rank: usize,
    pub robot_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankSummary {
    pub robot_preference: Preference,
    pub human_preference: Preference,
    /// Best rank reachable from the first step, per agent.
    pub best_robot_rank: Option<usize>,
    pub best_human_rank: Option<usize>,
    pub leaves: Vec<RankedLeaf>,
}

/// Rank every final leaf that carries metrics, for both agents, then run
/// backward induction so each step knows its best pair.
pub fn rank_tree(tree: &mut PlanTree, preferences: Preferences) -> RankSummary {
    let leaves = tree.final_leaves();
    let ordered = rank_leaves(tree, &leaves, &preferences.robot.criteria(), AgentId::Robot);
    rank_leaves(tree, &leaves, &preferences.human.criteria(), AgentId::Human);
    let best_robot_rank = update_choices(tree, AgentId::Robot);
    let best_human_rank = update_choices(tree, AgentId::Human);

    let count = ordered.len();
    let leaves: Vec<RankedLeaf> = ordered
        .into_iter()
        .filter_map(|leaf| {
            let pair = tree.pair(*tree.step_pairs(leaf).first()?);
            let robot_rank = pair.rank.robot?;
            Some(RankedLeaf {
                step: tree.step(leaf).id,
                robot_rank,
                human_rank: pair.rank.human?,
                robot_score: rank_score(robot_rank, count),
            })
        })
        .collect();
    debug!(
        leaves = leaves.len(),
        ?best_robot_rank,
        ?best_human_rank,
        "ranked final leaves"
    );
    RankSummary {
        robot_preference: preferences.robot,
        human_preference: preferences.human,
        best_robot_rank,
        best_human_rank,
        leaves,
    }
}
