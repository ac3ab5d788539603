//! Search driver behind `coplan explore`.
//!
//! Builds the BEGIN pair from the domain, runs one of the three drivers over
//! an explicit frontier and finishes with the terminal metrics of every final
//! leaf. Everything runs on the calling thread; frontier order alone decides
//! the order of ids and leaves.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::core::andor::{and_or_search, extract_policy};
use crate::core::domain::Domain;
use crate::core::error::PlanError;
use crate::core::expand::expand_epistemic;
use crate::core::frontier::{Frontier, SearchOrder, SearchStats};
use crate::core::metrics::compute_metrics;
use crate::core::parallel::expand_parallel;
use crate::core::task::Task;
use crate::core::tree::{Candidate, PairIdx, PlanTree};
use crate::core::types::{AgentId, Ids, NodeType, Tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Every interleaving of concurrent H and R actions.
    Parallel,
    /// Turn-taking with H's possible worlds and copresence.
    Epistemic,
    /// Epistemic expansion that stops once a policy reaches the goal.
    AndOr,
}

impl SearchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::Parallel => "parallel",
            SearchMode::Epistemic => "epistemic",
            SearchMode::AndOr => "and_or",
        }
    }

    /// Exhaustive drivers go depth-first, the goal-directed one level by level.
    pub fn default_order(self) -> SearchOrder {
        match self {
            SearchMode::Parallel | SearchMode::Epistemic => SearchOrder::DepthFirst,
            SearchMode::AndOr => SearchOrder::BreadthFirst,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExploreOptions {
    pub mode: SearchMode,
    pub order: SearchOrder,
    /// Let H wait for a robot signal instead of asking.
    pub allow_signal: bool,
    /// Stop after this many expansions; `None` runs to exhaustion.
    pub max_expansions: Option<usize>,
}

impl ExploreOptions {
    pub fn new(mode: SearchMode) -> Self {
        Self {
            mode,
            order: mode.default_order(),
            allow_signal: false,
            max_expansions: None,
        }
    }
}

/// Statistics printed by `coplan explore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExploreStats {
    pub domain: String,
    pub mode: SearchMode,
    pub order: SearchOrder,
    pub expansions: usize,
    pub steps: usize,
    pub pairs: usize,
    /// Largest set of H's possible worlds met while expanding. Parallel
    /// exploration tracks no worlds and leaves it out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_worlds: Option<usize>,
    pub final_leaves: usize,
    pub goal_leaves: usize,
    /// Pairs left on the frontier.
    pub open: usize,
    pub truncated: bool,
    pub solved: bool,
}

#[derive(Debug, Clone)]
pub struct ExploreOutcome {
    pub tree: PlanTree,
    pub stats: ExploreStats,
    /// Frontier left behind by a bounded or early-exited search.
    pub open: Vec<PairIdx>,
}

/// BEGIN pair holding the initial designated world.
pub fn begin_pair(domain: &Domain, ids: &mut Ids) -> Candidate {
    Candidate {
        human: Task::passive(ids, AgentId::Human, Tag::Begin, domain.wait_costs.human),
        robot: Task::passive(ids, AgentId::Robot, Tag::Begin, domain.wait_costs.robot),
        end_agents: domain.initial.clone(),
        worlds: Vec::new(),
    }
}

/// Node type of the BEGIN pair: H's first choices must all be covered.
pub fn root_node_type(domain: &Domain) -> NodeType {
    match domain.starting_agent {
        AgentId::Human => NodeType::And,
        AgentId::Robot => NodeType::Or,
    }
}

/// Explore `domain` and return the tree with metrics on its final leaves.
#[instrument(skip_all, fields(domain = %domain.name, mode = options.mode.as_str()))]
pub fn explore(domain: &Domain, options: &ExploreOptions) -> Result<ExploreOutcome, PlanError> {
    let mut ids = domain.ids();
    let root = begin_pair(domain, &mut ids);
    let mut tree = PlanTree::new(&mut ids, root, root_node_type(domain));
    let mut frontier = Frontier::new(options.order, PlanTree::ROOT_PAIR);
    let mut stats = SearchStats::default();

    let solved_root = match options.mode {
        SearchMode::Parallel => {
            run_exhaustive(&mut stats, &mut frontier, options.max_expansions, |pair| {
                expand_parallel(domain, &mut ids, &mut tree, pair)
            })?;
            None
        }
        SearchMode::Epistemic => {
            run_exhaustive(&mut stats, &mut frontier, options.max_expansions, |pair| {
                let expansion =
                    expand_epistemic(domain, &mut ids, &mut tree, pair, options.allow_signal)?;
                Ok((expansion.new_pairs, expansion.worlds))
            })?;
            None
        }
        SearchMode::AndOr => {
            let solved = and_or_search(
                domain,
                &mut ids,
                &mut tree,
                &mut frontier,
                options.allow_signal,
                options.max_expansions,
                &mut stats,
            )?;
            if solved {
                extract_policy(&mut tree);
            }
            Some(solved)
        }
    };

    let leaves = tree.final_leaves();
    compute_metrics(&mut tree, &leaves);
    let goal_leaves = leaves
        .iter()
        .filter_map(|leaf| tree.step_pairs(*leaf).first().copied())
        .filter(|pair| {
            tree.pair(*pair)
                .end_agents
                .as_ref()
                .is_some_and(|agents| domain.is_goal(&agents.state))
        })
        .count();

    let open: Vec<PairIdx> = frontier.remaining().collect();
    let stats = ExploreStats {
        domain: domain.name.clone(),
        mode: options.mode,
        order: options.order,
        expansions: stats.expansions,
        steps: tree.step_count(),
        pairs: tree.count_pairs(),
        max_worlds: match options.mode {
            SearchMode::Parallel => None,
            SearchMode::Epistemic | SearchMode::AndOr => Some(stats.max_worlds),
        },
        final_leaves: leaves.len(),
        goal_leaves,
        open: open.len(),
        truncated: stats.truncated,
        solved: solved_root.unwrap_or(goal_leaves > 0),
    };
    info!(
        expansions = stats.expansions,
        steps = stats.steps,
        final_leaves = stats.final_leaves,
        solved = stats.solved,
        "exploration finished"
    );
    Ok(ExploreOutcome { tree, stats, open })
}

/// Pop and expand until the frontier is empty or the bound is reached.
fn run_exhaustive<E, R>(
    stats: &mut SearchStats,
    frontier: &mut Frontier,
    max_expansions: Option<usize>,
    mut expand: E,
) -> Result<(), PlanError>
where
    E: FnMut(PairIdx) -> Result<R, PlanError>,
    R: Into<Expanded>,
{
    loop {
        if stats.exhausted(max_expansions) && !frontier.is_empty() {
            stats.truncated = true;
            return Ok(());
        }
        let Some(pair) = frontier.pop() else {
            return Ok(());
        };
        let expanded: Expanded = expand(pair)?.into();
        stats.expansions += 1;
        stats.max_worlds = stats.max_worlds.max(expanded.worlds);
        frontier.push_expansion(expanded.new_pairs);
    }
}

/// New pairs of one expansion and the size of the world set it used.
struct Expanded {
    new_pairs: Vec<PairIdx>,
    worlds: usize,
}

impl From<Vec<PairIdx>> for Expanded {
    fn from(new_pairs: Vec<PairIdx>) -> Self {
        Self {
            new_pairs,
            worlds: 0,
        }
    }
}

impl From<(Vec<PairIdx>, usize)> for Expanded {
    fn from((new_pairs, worlds): (Vec<PairIdx>, usize)) -> Self {
        Self { new_pairs, worlds }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::call;
    use crate::core::invariants::validate_tree;
    use crate::test_support::{dinner_with_agendas, switch_domain};

    #[test]
    fn options_default_order_follows_mode() {
        assert_eq!(ExploreOptions::new(SearchMode::Parallel).order, SearchOrder::DepthFirst);
        assert_eq!(ExploreOptions::new(SearchMode::AndOr).order, SearchOrder::BreadthFirst);
    }

    #[test]
    fn epistemic_exploration_reaches_final_leaves() {
        let domain = dinner_with_agendas(vec![call("Cut_n_Wash")], vec![]);
        let outcome = explore(&domain, &ExploreOptions::new(SearchMode::Epistemic)).expect("explore");
        assert!(outcome.stats.final_leaves > 0);
        assert!(outcome.open.is_empty());
        assert!(!outcome.stats.truncated);
        assert!(outcome.stats.max_worlds.is_some());
        assert!(validate_tree(&outcome.tree).is_empty());
    }

    #[test]
    fn parallel_exploration_records_metrics() {
        let domain = dinner_with_agendas(vec![call("Cut_n_Wash")], vec![call("Cut_n_Wash")]);
        let outcome = explore(&domain, &ExploreOptions::new(SearchMode::Parallel)).expect("explore");
        let leaves = outcome.tree.final_leaves();
        assert!(!leaves.is_empty());
        for leaf in leaves {
            let pair = outcome.tree.step_pairs(leaf)[0];
            assert!(outcome.tree.pair(pair).metrics.is_some());
        }
        assert_eq!(outcome.stats.max_worlds, None);
    }

    #[test]
    fn bounded_search_reports_truncation() {
        let domain = dinner_with_agendas(vec![call("Cut_n_Wash")], vec![call("Prepare_Dinner")]);
        let options = ExploreOptions {
            max_expansions: Some(2),
            ..ExploreOptions::new(SearchMode::Epistemic)
        };
        let outcome = explore(&domain, &options).expect("explore");
        assert_eq!(outcome.stats.expansions, 2);
        assert!(outcome.stats.truncated);
        assert_eq!(outcome.stats.open, outcome.open.len());
        assert!(!outcome.open.is_empty());
    }

    #[test]
    fn and_or_stops_once_root_is_solved() {
        let domain = switch_domain();
        let outcome = explore(&domain, &ExploreOptions::new(SearchMode::AndOr)).expect("explore");
        assert!(outcome.stats.solved);
        assert!(outcome.tree.pair(PlanTree::ROOT_PAIR).done);
        assert!(!outcome.open.is_empty());
        assert_eq!(outcome.stats.final_leaves, 1);
    }
}
