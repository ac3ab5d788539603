//! Persisted plan trees: JSON export, schema + invariant validation on load.
//!
//! Steps are stored as a flat list in pre-order, each pointing at its parent
//! step and at the position of the pair it grew from, so deep trees never
//! nest. Pairs are listed option by option, which is the order
//! [`PlanTree::add_step_with_id`] needs to regroup them.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::validator_for;
use serde::{Deserialize, Serialize};

use crate::core::agents::Agents;
use crate::core::domain::Domain;
use crate::core::invariants::validate_tree;
use crate::core::metrics::BranchMetrics;
use crate::core::state::{State, Value};
use crate::core::task::{Task, TaskKind};
use crate::core::tree::{Candidate, PairIdx, PerAgent, PlanTree, StepIdx};
use crate::core::types::{AgentId, NodeType};

pub const FORMAT_VERSION: u32 = 1;

pub const V1_SCHEMA: &str = include_str!("../../schemas/solution/v1.schema.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionDoc {
    pub format_version: u32,
    pub domain: String,
    pub starting_agent: AgentId,
    pub initial_state: BTreeMap<String, Value>,
    pub initial_agendas: AgendaRecord,
    pub steps: Vec<StepRecord>,
}

/// Task labels of the initial agendas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgendaRecord {
    pub human: Vec<String>,
    pub robot: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: u64,
    pub parent: Option<u64>,
    /// Position of the originating pair among the parent step's pairs.
    pub from: Option<usize>,
    pub depth: usize,
    pub pairs: Vec<PairRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: u64,
    pub agent: AgentId,
    pub name: String,
    pub params: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_resource: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRecord {
    pub robot: Option<usize>,
    pub human: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRecord {
    pub human: ActionRecord,
    pub robot: ActionRecord,
    pub node_type: NodeType,
    pub done: bool,
    pub pass: bool,
    pub rank: RankRecord,
    pub best_rank: RankRecord,
    pub outcome: Outcome,
}

/// What became of a pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Expanded into the step with this id.
    Expanded { step: u64 },
    /// Final pair with its terminal metrics and designated state.
    Final {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metrics: Option<BranchMetrics>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<BTreeMap<String, Value>>,
    },
    /// Not continued in this tree (repeated passivity, dead end or pruned).
    Stalled,
    /// Left on the frontier of a bounded or early-exited search.
    Open,
}

/// A validated solution file and the tree rebuilt from it.
#[derive(Debug, Clone)]
pub struct LoadedSolution {
    pub doc: SolutionDoc,
    pub tree: PlanTree,
    pub open: Vec<PairIdx>,
}

impl SolutionDoc {
    pub fn from_tree(domain: &Domain, tree: &PlanTree, open: &[PairIdx]) -> Self {
        let labels = |agent: AgentId| -> Vec<String> {
            domain.initial.agent(agent).agenda.iter().map(Task::label).collect()
        };
        Self {
            format_version: FORMAT_VERSION,
            domain: domain.name.clone(),
            starting_agent: domain.starting_agent,
            initial_state: domain.initial.state.to_values(),
            initial_agendas: AgendaRecord {
                human: labels(AgentId::Human),
                robot: labels(AgentId::Robot),
            },
            steps: step_records(tree, open),
        }
    }

    /// Swap in the steps of `tree`, keeping the header.
    pub fn replace_tree(&mut self, tree: &PlanTree, open: &[PairIdx]) {
        self.steps = step_records(tree, open);
    }

    /// Rebuild the arena: same step ids, pairs, flags, metrics and ranks.
    ///
    /// Only final pairs get a designated world back, holding their state.
    pub fn into_tree(&self) -> Result<(PlanTree, Vec<PairIdx>)> {
        let (root, rest) = self
            .steps
            .split_first()
            .ok_or_else(|| anyhow!("solution has no steps"))?;
        if root.parent.is_some() || root.from.is_some() {
            bail!("first step {} must be the root", root.id);
        }
        let [begin] = root.pairs.as_slice() else {
            bail!("root step {} must hold exactly one pair", root.id);
        };

        let mut tree = PlanTree::with_root(root.id, candidate(begin)?, begin.node_type);
        let mut indices: HashMap<u64, StepIdx> = HashMap::from([(root.id, PlanTree::ROOT_STEP)]);
        let mut open = Vec::new();
        restore_pairs(&mut tree, PlanTree::ROOT_STEP, root, &mut open)?;

        for record in rest {
            let parent = record
                .parent
                .and_then(|parent| indices.get(&parent).copied())
                .ok_or_else(|| anyhow!("step {}: unknown parent step", record.id))?;
            let from = record
                .from
                .and_then(|position| tree.step_pairs(parent).get(position).copied())
                .ok_or_else(|| anyhow!("step {}: unknown originating pair", record.id))?;
            let candidates = record
                .pairs
                .iter()
                .map(candidate)
                .collect::<Result<Vec<_>>>()?;
            let step = tree.add_step_with_id(record.id, from, candidates);
            if indices.insert(record.id, step).is_some() {
                bail!("duplicate step id {}", record.id);
            }
            restore_pairs(&mut tree, step, record, &mut open)?;
        }
        Ok((tree, open))
    }
}

fn step_records(tree: &PlanTree, open: &[PairIdx]) -> Vec<StepRecord> {
    let mut records = Vec::new();
    let mut stack = vec![PlanTree::ROOT_STEP];
    while let Some(idx) = stack.pop() {
        let step = tree.step(idx);
        let from = step.parent.zip(step.from_pair).and_then(|(parent, from)| {
            tree.step_pairs(parent).iter().position(|pair| *pair == from)
        });
        records.push(StepRecord {
            id: step.id,
            parent: step.parent.map(|parent| tree.step(parent).id),
            from,
            depth: step.depth,
            pairs: tree
                .step_pairs(idx)
                .into_iter()
                .map(|pair| pair_record(tree, idx, pair, open))
                .collect(),
        });
        stack.extend(step.children.iter().rev().copied());
    }
    records
}

fn pair_record(tree: &PlanTree, step: StepIdx, idx: PairIdx, open: &[PairIdx]) -> PairRecord {
    let pair = tree.pair(idx);
    let child = tree
        .step(step)
        .children
        .iter()
        .find(|child| tree.step(**child).from_pair == Some(idx));
    let outcome = if let Some(child) = child {
        Outcome::Expanded {
            step: tree.step(*child).id,
        }
    } else if tree.is_final_pair(idx) {
        Outcome::Final {
            metrics: pair.metrics,
            state: pair
                .end_agents
                .as_ref()
                .map(|agents| agents.state.to_values()),
        }
    } else if open.contains(&idx) {
        Outcome::Open
    } else {
        Outcome::Stalled
    };
    PairRecord {
        human: action_record(&pair.human),
        robot: action_record(&pair.robot),
        node_type: pair.node_type,
        done: pair.done,
        pass: pair.pass,
        rank: rank_record(pair.rank),
        best_rank: rank_record(pair.best_rank),
        outcome,
    }
}

fn action_record(task: &Task) -> ActionRecord {
    ActionRecord {
        id: task.id,
        agent: task.agent,
        name: task.name.clone(),
        params: task.params.clone(),
        cost: task.cost(),
        shared_resource: task.shared_resource().map(str::to_string),
    }
}

fn rank_record(rank: PerAgent<Option<usize>>) -> RankRecord {
    RankRecord {
        robot: rank.robot,
        human: rank.human,
    }
}

fn action(record: &ActionRecord) -> Task {
    let kind = match record.cost {
        Some(cost) => TaskKind::Action {
            cost,
            shared_resource: record.shared_resource.clone(),
        },
        None => TaskKind::Primitive,
    };
    Task {
        id: record.id,
        name: record.name.clone(),
        params: record.params.clone(),
        agent: record.agent,
        kind,
        method_number: None,
    }
}

fn candidate(record: &PairRecord) -> Result<Candidate> {
    if record.human.agent != AgentId::Human || record.robot.agent != AgentId::Robot {
        bail!(
            "pair ({}, {}) must hold a human then a robot action",
            record.human.id,
            record.robot.id
        );
    }
    Ok(Candidate {
        human: action(&record.human),
        robot: action(&record.robot),
        end_agents: Agents::default(),
        worlds: Vec::new(),
    })
}

/// Copy the persisted pair fields onto the freshly attached pairs of `step`.
fn restore_pairs(
    tree: &mut PlanTree,
    step: StepIdx,
    record: &StepRecord,
    open: &mut Vec<PairIdx>,
) -> Result<()> {
    let pairs = tree.step_pairs(step);
    let grouped = pairs
        .iter()
        .zip(&record.pairs)
        .all(|(pair, stored)| tree.pair(*pair).human.id == stored.human.id);
    if !grouped {
        bail!("step {}: pairs are not grouped by human action", record.id);
    }
    for (pair, stored) in pairs.into_iter().zip(&record.pairs) {
        let node = tree.pair_mut(pair);
        node.node_type = stored.node_type;
        node.done = stored.done;
        node.pass = stored.pass;
        node.rank = PerAgent {
            robot: stored.rank.robot,
            human: stored.rank.human,
        };
        node.best_rank = PerAgent {
            robot: stored.best_rank.robot,
            human: stored.best_rank.human,
        };
        node.end_agents = None;
        match &stored.outcome {
            Outcome::Final { metrics, state } => {
                node.metrics = *metrics;
                node.end_agents = state
                    .clone()
                    .map(|values| Agents::from_state(State::from_values(values)));
            }
            Outcome::Open => open.push(pair),
            Outcome::Expanded { .. } | Outcome::Stalled => {}
        }
    }
    Ok(())
}

/// Load and validate a solution from disk (schema + invariants).
pub fn load_solution(path: &Path) -> Result<LoadedSolution> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read solution {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse solution {}", path.display()))?;
    validate_schema(&value)?;
    let doc: SolutionDoc = serde_json::from_value(value)
        .with_context(|| format!("deserialize solution {}", path.display()))?;
    let (tree, open) = doc
        .into_tree()
        .with_context(|| format!("rebuild tree from {}", path.display()))?;
    validate_tree_invariants(&tree)?;
    Ok(LoadedSolution { doc, tree, open })
}

/// Atomically write a solution as pretty-printed JSON with trailing newline.
pub fn write_solution(path: &Path, doc: &SolutionDoc) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(doc).context("serialize solution json")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

fn validate_schema(solution: &serde_json::Value) -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(V1_SCHEMA).context("parse embedded solution schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(solution) {
        let messages = compiled
            .iter_errors(solution)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "solution schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

fn validate_tree_invariants(tree: &PlanTree) -> Result<()> {
    let errors = validate_tree(tree);
    if errors.is_empty() {
        return Ok(());
    }
    Err(anyhow!("tree invariants failed: {}", errors.join("; ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::call;
    use crate::explore::{ExploreOptions, SearchMode, explore};
    use crate::test_support::dinner_with_agendas;

    fn explored(options: &ExploreOptions) -> (Domain, SolutionDoc) {
        let domain = dinner_with_agendas(vec![call("Cut_n_Wash")], vec![call("Prepare_Dinner")]);
        let outcome = explore(&domain, options).expect("explore");
        let doc = SolutionDoc::from_tree(&domain, &outcome.tree, &outcome.open);
        (domain, doc)
    }

    /// Writes an explored tree, loads it back and writes the rebuilt tree
    /// again: both documents must match field for field.
    #[test]
    fn write_load_write_is_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("solution.json");
        let (domain, doc) = explored(&ExploreOptions::new(SearchMode::Epistemic));
        write_solution(&path, &doc).expect("write");

        let loaded = load_solution(&path).expect("load");
        assert_eq!(loaded.doc, doc);
        let again = SolutionDoc::from_tree(&domain, &loaded.tree, &loaded.open);
        assert_eq!(again, doc);
        assert!(doc.steps.iter().any(|step| {
            step.pairs
                .iter()
                .any(|pair| matches!(pair.outcome, Outcome::Final { metrics: Some(_), .. }))
        }));
    }

    #[test]
    fn open_pairs_survive_a_round_trip() {
        let options = ExploreOptions {
            max_expansions: Some(3),
            ..ExploreOptions::new(SearchMode::Epistemic)
        };
        let (_, doc) = explored(&options);
        let (_, open) = doc.into_tree().expect("rebuild");
        let stored = doc
            .steps
            .iter()
            .flat_map(|step| &step.pairs)
            .filter(|pair| pair.outcome == Outcome::Open)
            .count();
        assert!(stored > 0);
        assert_eq!(open.len(), stored);
    }

    #[test]
    fn schema_rejects_unknown_fields() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("solution.json");
        let (_, doc) = explored(&ExploreOptions::new(SearchMode::Parallel));
        let mut value = serde_json::to_value(&doc).expect("to value");
        value["steps"][0]["color"] = serde_json::json!("blue");
        fs::write(&path, value.to_string()).expect("write");

        let err = load_solution(&path).expect_err("schema");
        assert!(format!("{:#}", err).contains("schema validation failed"));
    }

    #[test]
    fn tampered_node_type_breaks_invariants() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("solution.json");
        let (_, mut doc) = explored(&ExploreOptions::new(SearchMode::Parallel));
        let root_type = doc.steps[0].pairs[0].node_type;
        doc.steps[1].pairs[0].node_type = root_type;
        write_solution(&path, &doc).expect("write");

        let err = load_solution(&path).expect_err("invariants");
        assert!(format!("{:#}", err).contains("same node type"));
    }

    #[test]
    fn unknown_parent_is_reported() {
        let (_, mut doc) = explored(&ExploreOptions::new(SearchMode::Parallel));
        doc.steps[1].parent = Some(9_999);
        let err = doc.into_tree().expect_err("parent");
        assert!(err.to_string().contains("unknown parent"));
    }
}
