//! Arena of steps, human options and action pairs.
//!
//! The joint execution tree is stored in three vectors addressed by index.
//! A [`Step`] owns [`HumanOption`]s, each grouping the [`ActionPair`]s that
//! share one human action. Pairs link to the pair they follow (`previous`)
//! and to the pairs of the step their expansion produced (`next`).

use crate::core::agents::Agents;
use crate::core::metrics::BranchMetrics;
use crate::core::task::Task;
use crate::core::types::{AgentId, Ids, NodeType, Tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairIdx(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OptionIdx(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StepIdx(pub usize);

/// Value kept per agent perspective (robot preferences, human preferences).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerAgent<T> {
    pub robot: T,
    pub human: T,
}

impl<T: Copy> PerAgent<T> {
    pub fn get(&self, agent: AgentId) -> T {
        match agent {
            AgentId::Robot => self.robot,
            AgentId::Human => self.human,
        }
    }

    pub fn set(&mut self, agent: AgentId, value: T) {
        match agent {
            AgentId::Robot => self.robot = value,
            AgentId::Human => self.human = value,
        }
    }
}

/// A candidate joint action before it is attached to the tree.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub human: Task,
    pub robot: Task,
    pub end_agents: Agents,
    pub worlds: Vec<Agents>,
}

#[derive(Debug, Clone)]
pub struct ActionPair {
    pub human: Task,
    pub robot: Task,
    pub previous: Option<PairIdx>,
    pub next: Vec<PairIdx>,
    /// Designated world after both actions; absent on rebuilt trees.
    pub end_agents: Option<Agents>,
    /// Worlds H cannot yet tell apart from the designated one.
    pub worlds: Vec<Agents>,
    pub option: OptionIdx,
    pub node_type: NodeType,
    pub done: bool,
    pub pass: bool,
    pub copresent: bool,
    /// Terminal metrics of a final pair.
    pub metrics: Option<BranchMetrics>,
    pub rank: PerAgent<Option<usize>>,
    pub best_rank: PerAgent<Option<usize>>,
}

#[derive(Debug, Clone)]
pub struct HumanOption {
    pub human: Task,
    pub pairs: Vec<PairIdx>,
    pub step: StepIdx,
    pub best_pair: PerAgent<Option<PairIdx>>,
}

#[derive(Debug, Clone)]
pub struct Step {
    pub id: u64,
    pub options: Vec<OptionIdx>,
    /// Robot actions available whatever the human does.
    pub cra: Vec<Task>,
    pub from_pair: Option<PairIdx>,
    pub parent: Option<StepIdx>,
    pub children: Vec<StepIdx>,
    pub depth: usize,
    pub best_pair: PerAgent<Option<PairIdx>>,
}

#[derive(Debug, Clone)]
pub struct PlanTree {
    pairs: Vec<ActionPair>,
    options: Vec<HumanOption>,
    steps: Vec<Step>,
}

impl PlanTree {
    pub const ROOT_STEP: StepIdx = StepIdx(0);
    pub const ROOT_PAIR: PairIdx = PairIdx(0);

    /// Tree holding only the BEGIN pair.
    pub fn new(ids: &mut Ids, root: Candidate, node_type: NodeType) -> Self {
        Self::with_root(ids.step(), root, node_type)
    }

    pub fn with_root(step_id: u64, root: Candidate, node_type: NodeType) -> Self {
        let cra = vec![root.robot.clone()];
        let mut tree = Self {
            pairs: Vec::new(),
            options: Vec::new(),
            steps: vec![Step {
                id: step_id,
                options: Vec::new(),
                cra,
                from_pair: None,
                parent: None,
                children: Vec::new(),
                depth: 0,
                best_pair: PerAgent::default(),
            }],
        };
        let option = tree.new_option(Self::ROOT_STEP, root.human.clone());
        tree.attach(option, root, None, node_type);
        tree
    }

    pub fn pair(&self, idx: PairIdx) -> &ActionPair {
        &self.pairs[idx.0]
    }

    pub fn pair_mut(&mut self, idx: PairIdx) -> &mut ActionPair {
        &mut self.pairs[idx.0]
    }

    pub fn option(&self, idx: OptionIdx) -> &HumanOption {
        &self.options[idx.0]
    }

    pub fn option_mut(&mut self, idx: OptionIdx) -> &mut HumanOption {
        &mut self.options[idx.0]
    }

    pub fn step(&self, idx: StepIdx) -> &Step {
        &self.steps[idx.0]
    }

    pub fn step_mut(&mut self, idx: StepIdx) -> &mut Step {
        &mut self.steps[idx.0]
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn step_indices(&self) -> impl Iterator<Item = StepIdx> {
        (0..self.steps.len()).map(StepIdx)
    }

    pub fn pair_indices(&self) -> impl Iterator<Item = PairIdx> {
        (0..self.pairs.len()).map(PairIdx)
    }

    pub fn step_of(&self, pair: PairIdx) -> StepIdx {
        self.option(self.pair(pair).option).step
    }

    /// Pairs of a step, option by option.
    pub fn step_pairs(&self, step: StepIdx) -> Vec<PairIdx> {
        self.step(step)
            .options
            .iter()
            .flat_map(|option| self.option(*option).pairs.iter().copied())
            .collect()
    }

    /// Attach a new step produced by expanding `from`.
    ///
    /// Candidates are grouped by human action id in first-seen order; every
    /// new pair gets the node type opposite to `from`.
    pub fn add_step(&mut self, ids: &mut Ids, from: PairIdx, candidates: Vec<Candidate>) -> StepIdx {
        self.add_step_with_id(ids.step(), from, candidates)
    }

    pub fn add_step_with_id(&mut self, id: u64, from: PairIdx, candidates: Vec<Candidate>) -> StepIdx {
        let parent = self.step_of(from);
        let step = StepIdx(self.steps.len());
        self.steps.push(Step {
            id,
            options: Vec::new(),
            cra: Vec::new(),
            from_pair: Some(from),
            parent: Some(parent),
            children: Vec::new(),
            depth: self.step(parent).depth + 1,
            best_pair: PerAgent::default(),
        });
        self.step_mut(parent).children.push(step);

        let node_type = self.pair(from).node_type.flipped();
        for candidate in candidates {
            let existing = self
                .step(step)
                .options
                .iter()
                .copied()
                .find(|option| self.option(*option).human.id == candidate.human.id);
            let option = match existing {
                Some(option) => option,
                None => self.new_option(step, candidate.human.clone()),
            };
            self.attach(option, candidate, Some(from), node_type);
        }
        let cra = self.common_robot_actions(step);
        self.step_mut(step).cra = cra;
        step
    }

    /// Add one more pair to an existing option of a non-root step.
    pub fn attach_to_option(&mut self, option: OptionIdx, candidate: Candidate) -> Option<PairIdx> {
        let from = self.step(self.option(option).step).from_pair?;
        let node_type = self.pair(from).node_type.flipped();
        Some(self.attach(option, candidate, Some(from), node_type))
    }

    fn new_option(&mut self, step: StepIdx, human: Task) -> OptionIdx {
        let option = OptionIdx(self.options.len());
        self.options.push(HumanOption {
            human,
            pairs: Vec::new(),
            step,
            best_pair: PerAgent::default(),
        });
        self.step_mut(step).options.push(option);
        option
    }

    fn attach(
        &mut self,
        option: OptionIdx,
        candidate: Candidate,
        previous: Option<PairIdx>,
        node_type: NodeType,
    ) -> PairIdx {
        let pair = PairIdx(self.pairs.len());
        self.pairs.push(ActionPair {
            human: candidate.human,
            robot: candidate.robot,
            previous,
            next: Vec::new(),
            end_agents: Some(candidate.end_agents),
            worlds: candidate.worlds,
            option,
            node_type,
            done: false,
            pass: false,
            copresent: false,
            metrics: None,
            rank: PerAgent::default(),
            best_rank: PerAgent::default(),
        });
        self.option_mut(option).pairs.push(pair);
        if let Some(previous) = previous {
            self.pair_mut(previous).next.push(pair);
        }
        pair
    }

    /// Intersection over options of the robot actions they offer.
    pub fn common_robot_actions(&self, step: StepIdx) -> Vec<Task> {
        let mut options = self.step(step).options.iter();
        let Some(first) = options.next() else {
            return Vec::new();
        };
        let mut common: Vec<Task> = self.robot_actions(*first);
        for option in options {
            let offered = self.robot_actions(*option);
            common.retain(|action| offered.iter().any(|other| action.is_similar(other)));
        }
        common
    }

    pub fn robot_actions(&self, option: OptionIdx) -> Vec<Task> {
        self.option(option)
            .pairs
            .iter()
            .map(|pair| self.pair(*pair).robot.clone())
            .collect()
    }

    pub fn is_passive_pair(&self, pair: PairIdx) -> bool {
        let pair = self.pair(pair);
        pair.human.is_passive() && pair.robot.is_passive()
    }

    pub fn is_begin_pair(&self, pair: PairIdx) -> bool {
        let pair = self.pair(pair);
        pair.human.starts_with_tag(Tag::Begin) && pair.robot.starts_with_tag(Tag::Begin)
    }

    /// Both idle, or the WAIT_TURN/IDLE handshake closing the plan.
    pub fn is_final_pair(&self, idx: PairIdx) -> bool {
        let pair = self.pair(idx);
        let (human, robot) = (&pair.human, &pair.robot);
        if human.has_tag(Tag::Idle) && robot.has_tag(Tag::Idle) {
            return true;
        }
        let Some(previous) = pair.previous.map(|previous| self.pair(previous)) else {
            return false;
        };
        let (before_h, before_r) = (&previous.human, &previous.robot);
        (human.has_tag(Tag::WaitTurn)
            && robot.has_tag(Tag::Idle)
            && before_h.has_tag(Tag::Idle)
            && before_r.has_tag(Tag::WaitTurn))
            || (human.has_tag(Tag::Idle)
                && robot.has_tag(Tag::WaitTurn)
                && before_h.has_tag(Tag::WaitTurn)
                && before_r.has_tag(Tag::Idle))
    }

    /// A step holding exactly one pair, which is final.
    pub fn is_final_step(&self, step: StepIdx) -> bool {
        match self.step_pairs(step).as_slice() {
            [only] => self.is_final_pair(*only),
            _ => false,
        }
    }

    /// Final leaf steps in pre-order.
    pub fn final_leaves(&self) -> Vec<StepIdx> {
        let mut leaves = Vec::new();
        let mut stack = vec![Self::ROOT_STEP];
        while let Some(step) = stack.pop() {
            let children = &self.step(step).children;
            if children.is_empty() {
                if self.is_final_step(step) {
                    leaves.push(step);
                }
                continue;
            }
            stack.extend(children.iter().rev().copied());
        }
        leaves
    }

    /// Number of pairs reachable from the root through `next` links.
    pub fn count_pairs(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![Self::ROOT_PAIR];
        while let Some(pair) = stack.pop() {
            count += 1;
            stack.extend(self.pair(pair).next.iter().copied());
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passive(ids: &mut Ids, agent: AgentId, tag: Tag) -> Task {
        Task::passive(ids, agent, tag, 0.0)
    }

    fn candidate(human: Task, robot: Task) -> Candidate {
        Candidate {
            human,
            robot,
            end_agents: Agents::default(),
            worlds: Vec::new(),
        }
    }

    fn begin_tree(ids: &mut Ids) -> PlanTree {
        let human = passive(ids, AgentId::Human, Tag::Begin);
        let robot = passive(ids, AgentId::Robot, Tag::Begin);
        PlanTree::new(ids, candidate(human, robot), NodeType::And)
    }

    #[test]
    fn add_step_groups_by_human_action_and_alternates_types() {
        let mut ids = Ids::default();
        let mut tree = begin_tree(&mut ids);
        let shared_human = passive(&mut ids, AgentId::Human, Tag::WaitTurn);
        let other_human = passive(&mut ids, AgentId::Human, Tag::Pass);
        let candidates = vec![
            candidate(shared_human.clone(), passive(&mut ids, AgentId::Robot, Tag::Wait)),
            candidate(other_human, passive(&mut ids, AgentId::Robot, Tag::Wait)),
            candidate(shared_human, passive(&mut ids, AgentId::Robot, Tag::Idle)),
        ];
        let step = tree.add_step(&mut ids, PlanTree::ROOT_PAIR, candidates);

        assert_eq!(tree.step(step).id, 1);
        assert_eq!(tree.step(step).depth, 1);
        assert_eq!(tree.step(step).options.len(), 2);
        let pairs = tree.step_pairs(step);
        assert_eq!(pairs, vec![PairIdx(1), PairIdx(3), PairIdx(2)]);
        assert!(pairs.iter().all(|pair| tree.pair(*pair).node_type == NodeType::Or));
        assert_eq!(tree.pair(PlanTree::ROOT_PAIR).next.len(), 3);
        assert_eq!(tree.count_pairs(), 4);
        assert!(tree.is_begin_pair(PlanTree::ROOT_PAIR));
    }

    #[test]
    fn final_pairs_and_leaves() {
        let mut ids = Ids::default();
        let mut tree = begin_tree(&mut ids);
        let first_candidates = vec![candidate(
            passive(&mut ids, AgentId::Human, Tag::Idle),
            passive(&mut ids, AgentId::Robot, Tag::WaitTurn),
        )];
        let first = tree.add_step(&mut ids, PlanTree::ROOT_PAIR, first_candidates);
        let handshake = tree.step_pairs(first)[0];
        assert!(!tree.is_final_pair(handshake));

        let last_candidates = vec![candidate(
            passive(&mut ids, AgentId::Human, Tag::WaitTurn),
            passive(&mut ids, AgentId::Robot, Tag::Idle),
        )];
        let last = tree.add_step(&mut ids, handshake, last_candidates);
        let closing = tree.step_pairs(last)[0];
        assert!(tree.is_final_pair(closing));
        assert!(tree.is_final_step(last));
        assert_eq!(tree.final_leaves(), vec![last]);
    }

    #[test]
    fn common_robot_actions_intersect_options() {
        let mut ids = Ids::default();
        let mut tree = begin_tree(&mut ids);
        let cut = Task::primitive(&mut ids, "cut", vec![], AgentId::Robot, None).into_action(1.0, None);
        let wash =
            Task::primitive(&mut ids, "wash", vec![], AgentId::Robot, None).into_action(1.0, None);
        let h1 = passive(&mut ids, AgentId::Human, Tag::Wait);
        let h2 = Task::primitive(&mut ids, "move", vec![], AgentId::Human, None).into_action(1.0, None);
        let step = tree.add_step(
            &mut ids,
            PlanTree::ROOT_PAIR,
            vec![
                candidate(h1.clone(), cut.clone()),
                candidate(h1, wash.clone()),
                candidate(h2, cut),
            ],
        );
        let names: Vec<String> = tree.step(step).cra.iter().map(|task| task.name.clone()).collect();
        assert_eq!(names, vec!["cut".to_string()]);
    }
}
