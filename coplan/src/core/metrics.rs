//! Branch metrics, lexicographic ranking and backward induction of ranks.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::tree::{PairIdx, PlanTree, StepIdx};
use crate::core::types::{AgentId, Tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Metric {
    TimeEndHumanDuty,
    HumanEffort,
    TimeTaskCompletion,
    GlobalEffort,
    RiskConflict,
}

/// Metrics of one final branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BranchMetrics {
    /// Steps elapsed until H goes permanently passive.
    pub time_end_human_duty: u32,
    /// Non-passive human actions.
    pub human_effort: u32,
    pub time_task_completion: u32,
    /// Non-passive actions of both agents.
    pub global_effort: u32,
    /// Robot actions that are neither SKIP nor common to every human option.
    pub risk_conflict: u32,
}

impl BranchMetrics {
    pub fn get(&self, metric: Metric) -> u32 {
        match metric {
            Metric::TimeEndHumanDuty => self.time_end_human_duty,
            Metric::HumanEffort => self.human_effort,
            Metric::TimeTaskCompletion => self.time_task_completion,
            Metric::GlobalEffort => self.global_effort,
            Metric::RiskConflict => self.risk_conflict,
        }
    }
}

/// One tie-break criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Criterion {
    pub metric: Metric,
    pub maximize: bool,
}

impl Criterion {
    pub fn minimize(metric: Metric) -> Self {
        Self {
            metric,
            maximize: false,
        }
    }
}

/// Execution preference presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preference {
    HumanMinWork,
    HumanFreeEarly,
    TaskEndEarly,
}

impl Preference {
    pub const ALL: [Preference; 3] = [
        Preference::HumanMinWork,
        Preference::HumanFreeEarly,
        Preference::TaskEndEarly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Preference::HumanMinWork => "human_min_work",
            Preference::HumanFreeEarly => "human_free_early",
            Preference::TaskEndEarly => "task_end_early",
        }
    }

    /// Ordered criteria, all minimized.
    pub fn criteria(self) -> Vec<Criterion> {
        let order = match self {
            Preference::HumanMinWork => [
                Metric::HumanEffort,
                Metric::TimeEndHumanDuty,
                Metric::GlobalEffort,
                Metric::TimeTaskCompletion,
            ],
            Preference::HumanFreeEarly => [
                Metric::TimeEndHumanDuty,
                Metric::HumanEffort,
                Metric::GlobalEffort,
                Metric::TimeTaskCompletion,
            ],
            Preference::TaskEndEarly => [
                Metric::TimeTaskCompletion,
                Metric::TimeEndHumanDuty,
                Metric::HumanEffort,
                Metric::GlobalEffort,
            ],
        };
        order.into_iter().map(Criterion::minimize).collect()
    }
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preference {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Preference::ALL
            .into_iter()
            .find(|preference| preference.as_str() == raw)
            .ok_or_else(|| {
                let known: Vec<&str> = Preference::ALL.iter().map(|p| p.as_str()).collect();
                format!("unknown preference '{}' (expected one of {})", raw, known.join(", "))
            })
    }
}

/// Compute metrics for each final leaf step and store them on its pair.
pub fn compute_metrics(tree: &mut PlanTree, leaves: &[StepIdx]) {
    for leaf in leaves {
        let Some(&leaf_pair) = tree.step_pairs(*leaf).first() else {
            continue;
        };
        let metrics = branch_metrics(tree, *leaf, leaf_pair);
        tree.pair_mut(leaf_pair).metrics = Some(metrics);
    }
}

fn branch_metrics(tree: &PlanTree, leaf: StepIdx, leaf_pair: PairIdx) -> BranchMetrics {
    let depth = u32::try_from(tree.step(leaf).depth).unwrap_or(u32::MAX);
    let mut metrics = BranchMetrics {
        time_end_human_duty: depth.saturating_sub(1),
        time_task_completion: depth.saturating_sub(1),
        ..BranchMetrics::default()
    };

    let mut human_acted = false;
    let mut cursor = tree.pair(leaf_pair).previous;
    while let Some(idx) = cursor {
        let pair = tree.pair(idx);
        if pair.previous.is_none() {
            break;
        }
        if pair.human.is_passive() {
            if !human_acted {
                metrics.time_end_human_duty = metrics.time_end_human_duty.saturating_sub(1);
            }
        } else {
            human_acted = true;
            metrics.human_effort += 1;
            metrics.global_effort += 1;
        }
        if !pair.robot.is_passive() {
            metrics.global_effort += 1;
        }

        let skipped = pair.robot.has_tag(Tag::Skip);
        let common = tree
            .step(tree.step_of(idx))
            .cra
            .iter()
            .any(|action| pair.robot.is_similar(action));
        if !skipped && !common {
            metrics.risk_conflict += 1;
        }
        cursor = pair.previous;
    }
    metrics
}

/// Order two metric sets; `Less` means `left` is better.
pub fn compare_metrics(left: &BranchMetrics, right: &BranchMetrics, criteria: &[Criterion]) -> Ordering {
    for criterion in criteria {
        let ordering = left.get(criterion.metric).cmp(&right.get(criterion.metric));
        let ordering = if criterion.maximize {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Sort final leaves by `criteria` and store each leaf pair's rank for `agent`.
///
/// The sort is stable, so equal leaves keep their discovery order. Equal
/// leaves share the rank of the first of them; the next distinct leaf gets
/// its position (1, 1, 3).
pub fn rank_leaves(
    tree: &mut PlanTree,
    leaves: &[StepIdx],
    criteria: &[Criterion],
    agent: AgentId,
) -> Vec<StepIdx> {
    let mut scored: Vec<(StepIdx, PairIdx, BranchMetrics)> = leaves
        .iter()
        .filter_map(|leaf| {
            let pair = *tree.step_pairs(*leaf).first()?;
            let metrics = tree.pair(pair).metrics?;
            Some((*leaf, pair, metrics))
        })
        .collect();
    scored.sort_by(|left, right| compare_metrics(&left.2, &right.2, criteria));

    let mut previous: Option<(BranchMetrics, usize)> = None;
    for (position, (_, pair, metrics)) in scored.iter().enumerate() {
        let rank = match previous {
            Some((before, rank)) if compare_metrics(&before, metrics, criteria).is_eq() => rank,
            _ => position + 1,
        };
        tree.pair_mut(*pair).rank.set(agent, Some(rank));
        previous = Some((*metrics, rank));
    }
    scored.into_iter().map(|(leaf, _, _)| leaf).collect()
}

/// Backward induction of the best reachable rank from `step` for `agent`.
///
/// Stores best ranks on pairs and best pairs on options and the step. On
/// ties the later pair wins. Steps below `step` are settled children first
/// from an explicit stack, so plan length never grows the call stack.
pub fn best_rank_from_step(tree: &mut PlanTree, step: StepIdx, agent: AgentId) -> Option<usize> {
    let mut order = Vec::new();
    let mut stack = vec![step];
    while let Some(current) = stack.pop() {
        order.push(current);
        for pair in tree.step_pairs(current) {
            let Some(next) = ranked_successor(tree, pair) else {
                continue;
            };
            if !tree.is_final_pair(next) {
                stack.push(tree.step_of(next));
            }
        }
    }

    let mut settled: Vec<Option<usize>> = vec![None; tree.step_count()];
    for current in order.into_iter().rev() {
        settled[current.0] = settle_step(tree, current, agent, &settled);
    }
    settled[step.0]
}

/// Pair following `pair` when `pair` takes part in the ranking.
///
/// Double-passive pairs are skipped unless one side is waiting for its turn.
fn ranked_successor(tree: &PlanTree, pair: PairIdx) -> Option<PairIdx> {
    let node = tree.pair(pair);
    if tree.is_passive_pair(pair)
        && !node.human.has_tag(Tag::WaitTurn)
        && !node.robot.has_tag(Tag::WaitTurn)
    {
        return None;
    }
    node.next.first().copied()
}

/// Best choices of one step whose child steps are already in `settled`.
fn settle_step(
    tree: &mut PlanTree,
    step: StepIdx,
    agent: AgentId,
    settled: &[Option<usize>],
) -> Option<usize> {
    let mut best_step_pair: Option<(PairIdx, usize)> = None;
    let options = tree.step(step).options.clone();
    for option in options {
        let mut best_pair: Option<(PairIdx, usize)> = None;
        let pairs = tree.option(option).pairs.clone();
        for pair in pairs {
            let Some(next) = ranked_successor(tree, pair) else {
                continue;
            };
            let rank = if tree.is_final_pair(next) {
                tree.pair(next).rank.get(agent)
            } else {
                settled[tree.step_of(next).0]
            };
            tree.pair_mut(pair).best_rank.set(agent, rank);
            let Some(rank) = rank else {
                continue;
            };
            if best_pair.is_none_or(|(_, best)| rank <= best) {
                best_pair = Some((pair, rank));
            }
        }
        tree.option_mut(option)
            .best_pair
            .set(agent, best_pair.map(|(pair, _)| pair));
        let Some((pair, rank)) = best_pair else {
            continue;
        };
        if best_step_pair.is_none_or(|(_, best)| rank <= best) {
            best_step_pair = Some((pair, rank));
        }
    }
    tree.step_mut(step)
        .best_pair
        .set(agent, best_step_pair.map(|(pair, _)| pair));
    best_step_pair.map(|(_, rank)| rank)
}

/// Run backward induction from the first step after BEGIN.
pub fn update_choices(tree: &mut PlanTree, agent: AgentId) -> Option<usize> {
    let first = *tree.step(PlanTree::ROOT_STEP).children.first()?;
    best_rank_from_step(tree, first, agent)
}

/// Map rank 1..=n onto a score in [0, 1], best = 1.
pub fn rank_score(rank: usize, count: usize) -> f64 {
    if count <= 1 {
        return 1.0;
    }
    let n = count as f64;
    -(rank as f64) / (n - 1.0) + n / (n - 1.0)
}
