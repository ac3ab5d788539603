//! Domain definition consumed by the engine.
//!
//! A [`Domain`] is an immutable value holding both agents' operator and method
//! tables, the initial world, the starting agent and the domain predicates
//! (situation assessment, copresence, goal, signal injection). It is built
//! once through [`DomainBuilder`] and passed by reference to every search
//! function.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::agents::{Agent, Agents};
use crate::core::error::{PlanError, StateError};
use crate::core::state::{State, Value};
use crate::core::task::Task;
use crate::core::types::{AgentId, Ids};

/// Predicate over a state for a task of `agent` with `params`.
pub type Condition = Arc<dyn Fn(&State, AgentId, &[String]) -> bool + Send + Sync>;
/// In-place effect of an operator.
pub type Effect = Arc<dyn Fn(&mut State, AgentId, &[String]) -> Result<(), StateError> + Send + Sync>;
pub type CostFn = Arc<dyn Fn(&State, AgentId, &[String]) -> f64 + Send + Sync>;
pub type ResourceFn = Arc<dyn Fn(&State, AgentId, &[String]) -> Option<String> + Send + Sync>;
/// Extracts the value a communication operator conveys.
pub type ObserveFn = Arc<dyn Fn(&State, AgentId, &[String]) -> Value + Send + Sync>;
/// Ordered alternative subtask sequences of a method.
pub type DecomposeFn = Arc<dyn Fn(&State, AgentId, &[String]) -> Vec<Vec<Subtask>> + Send + Sync>;
/// Keep a possible world (second state) given the designated one (first state)?
pub type ObservationFn = Arc<dyn Fn(&State, &State) -> bool + Send + Sync>;
pub type StatePredicate = Arc<dyn Fn(&State) -> bool + Send + Sync>;
/// Robot subtasks to schedule when H waits for a signal about a communicated task.
pub type SignalFn = Arc<dyn Fn(&State, &[String]) -> Vec<Subtask> + Send + Sync>;

/// Name of the abstract task inserted when H must be told something.
pub const COMMUNICATE: &str = "Communicate";

/// A `(name, params)` entry produced by a decomposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtask {
    pub name: String,
    pub params: Vec<String>,
}

impl Subtask {
    pub fn new<I, S>(name: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }
}

/// Shorthand for [`Subtask::new`] without parameters.
pub fn call(name: &str) -> Subtask {
    Subtask::new(name, Vec::<String>::new())
}

#[derive(Clone)]
pub struct Operator {
    pub name: String,
    done: Option<Condition>,
    precondition: Option<Condition>,
    effects: Option<Effect>,
    cost: Option<CostFn>,
    shared_resource: Option<ResourceFn>,
    observe: Option<ObserveFn>,
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("name", &self.name)
            .field("communicates", &self.observe.is_some())
            .finish()
    }
}

/// Default cost of a committed action.
pub const DEFAULT_ACTION_COST: f64 = 1.0;

impl Operator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: None,
            precondition: None,
            effects: None,
            cost: None,
            shared_resource: None,
            observe: None,
        }
    }

    pub fn done_when(
        mut self,
        done: impl Fn(&State, AgentId, &[String]) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.done = Some(Arc::new(done));
        self
    }

    pub fn precondition(
        mut self,
        precondition: impl Fn(&State, AgentId, &[String]) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.precondition = Some(Arc::new(precondition));
        self
    }

    pub fn effects(
        mut self,
        effects: impl Fn(&mut State, AgentId, &[String]) -> Result<(), StateError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.effects = Some(Arc::new(effects));
        self
    }

    pub fn cost(
        mut self,
        cost: impl Fn(&State, AgentId, &[String]) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.cost = Some(Arc::new(cost));
        self
    }

    pub fn shared_resource(
        mut self,
        resource: impl Fn(&State, AgentId, &[String]) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.shared_resource = Some(Arc::new(resource));
        self
    }

    /// Mark the operator as a communication act conveying `observe(state)`.
    pub fn observes(
        mut self,
        observe: impl Fn(&State, AgentId, &[String]) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.observe = Some(Arc::new(observe));
        self
    }

    pub fn is_done(&self, state: &State, task: &Task) -> bool {
        self.done
            .as_ref()
            .is_some_and(|done| done(state, task.agent, &task.params))
    }

    pub fn is_applicable(&self, state: &State, task: &Task) -> bool {
        self.precondition
            .as_ref()
            .is_none_or(|pre| pre(state, task.agent, &task.params))
    }

    pub fn is_communication(&self) -> bool {
        self.observe.is_some()
    }

    pub(crate) fn apply_effects(&self, state: &mut State, task: &Task) -> Result<(), PlanError> {
        match &self.effects {
            None => Ok(()),
            Some(effects) => {
                effects(state, task.agent, &task.params).map_err(|source| PlanError::Effect {
                    agent: task.agent,
                    task: task.name.clone(),
                    source,
                })
            }
        }
    }

    pub(crate) fn cost_in(&self, state: &State, task: &Task) -> f64 {
        self.cost
            .as_ref()
            .map_or(DEFAULT_ACTION_COST, |cost| cost(state, task.agent, &task.params))
    }

    pub(crate) fn resource_in(&self, state: &State, task: &Task) -> Option<String> {
        self.shared_resource
            .as_ref()
            .and_then(|resource| resource(state, task.agent, &task.params))
    }

    pub(crate) fn observed(&self, state: &State, task: &Task) -> Option<Value> {
        self.observe
            .as_ref()
            .map(|observe| observe(state, task.agent, &task.params))
    }
}

#[derive(Clone)]
pub struct Method {
    pub task: String,
    done: Option<Condition>,
    precondition: Option<Condition>,
    decompose: Option<DecomposeFn>,
    requires_alternatives: bool,
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method").field("task", &self.task).finish()
    }
}

impl Method {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            done: None,
            precondition: None,
            decompose: None,
            requires_alternatives: false,
        }
    }

    pub fn done_when(
        mut self,
        done: impl Fn(&State, AgentId, &[String]) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.done = Some(Arc::new(done));
        self
    }

    pub fn precondition(
        mut self,
        precondition: impl Fn(&State, AgentId, &[String]) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.precondition = Some(Arc::new(precondition));
        self
    }

    /// Single decomposition; an empty result means the method yields nothing.
    pub fn decompose(
        mut self,
        decompose: impl Fn(&State, AgentId, &[String]) -> Option<Vec<Subtask>>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.decompose = Some(Arc::new(
            move |state: &State, agent: AgentId, params: &[String]| -> Vec<Vec<Subtask>> {
                decompose(state, agent, params).into_iter().collect()
            },
        ));
        self
    }

    /// Several ordered alternatives.
    pub fn alternatives(
        mut self,
        decompose: impl Fn(&State, AgentId, &[String]) -> Vec<Vec<Subtask>> + Send + Sync + 'static,
    ) -> Self {
        self.decompose = Some(Arc::new(decompose));
        self
    }

    /// An applicable method returning no alternative is a domain bug.
    pub fn required(mut self) -> Self {
        self.requires_alternatives = true;
        self
    }

    pub fn is_done(&self, state: &State, task: &Task) -> bool {
        self.done
            .as_ref()
            .is_some_and(|done| done(state, task.agent, &task.params))
    }

    pub fn is_applicable(&self, state: &State, task: &Task) -> bool {
        self.precondition
            .as_ref()
            .is_none_or(|pre| pre(state, task.agent, &task.params))
    }

    /// Alternatives for `task`; a method without decomposition yields one empty list.
    pub fn alternatives_for(&self, state: &State, task: &Task) -> Vec<Vec<Subtask>> {
        match &self.decompose {
            None => vec![Vec::new()],
            Some(decompose) => decompose(state, task.agent, &task.params),
        }
    }

    pub fn requires_alternatives(&self) -> bool {
        self.requires_alternatives
    }
}

/// Reactive decomposition scheduled after an agent acts.
#[derive(Clone)]
pub struct Trigger {
    pub name: String,
    precondition: Condition,
    decompose: DecomposeFn,
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger").field("name", &self.name).finish()
    }
}

impl Trigger {
    pub fn new(
        name: impl Into<String>,
        precondition: impl Fn(&State, AgentId, &[String]) -> bool + Send + Sync + 'static,
        decompose: impl Fn(&State, AgentId, &[String]) -> Vec<Vec<Subtask>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            precondition: Arc::new(precondition),
            decompose: Arc::new(decompose),
        }
    }

    /// First alternative when the trigger fires in `state`.
    pub fn fire(&self, state: &State, agent: AgentId) -> Option<Vec<Subtask>> {
        if !(self.precondition)(state, agent, &[]) {
            return None;
        }
        (self.decompose)(state, agent, &[]).into_iter().next()
    }
}

/// Static tables of one agent.
#[derive(Debug, Clone, Default)]
pub struct AgentModel {
    pub operators: BTreeMap<String, Operator>,
    pub methods: BTreeMap<String, Vec<Method>>,
    pub triggers: Vec<Trigger>,
}

impl AgentModel {
    pub fn operator(&self, name: &str) -> Option<&Operator> {
        self.operators.get(name)
    }

    pub fn methods(&self, name: &str) -> Option<&[Method]> {
        self.methods.get(name).map(Vec::as_slice)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Turn a decomposition entry into an abstract or primitive task.
    pub fn instantiate(
        &self,
        ids: &mut Ids,
        agent: AgentId,
        subtask: &Subtask,
        method_number: Option<usize>,
    ) -> Result<Task, PlanError> {
        if self.has_method(&subtask.name) {
            return Ok(Task::abstract_task(
                ids,
                subtask.name.clone(),
                subtask.params.clone(),
                agent,
                method_number,
            ));
        }
        if self.operators.contains_key(&subtask.name) {
            return Ok(Task::primitive(
                ids,
                subtask.name.clone(),
                subtask.params.clone(),
                agent,
                method_number,
            ));
        }
        Err(PlanError::UnknownTask {
            agent,
            task: subtask.name.clone(),
        })
    }
}

/// Cost of passive actions per agent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitCosts {
    pub human: f64,
    pub robot: f64,
}

impl Default for WaitCosts {
    fn default() -> Self {
        Self {
            human: 2.0,
            robot: 0.0,
        }
    }
}

impl WaitCosts {
    pub fn of(&self, agent: AgentId) -> f64 {
        match agent {
            AgentId::Human => self.human,
            AgentId::Robot => self.robot,
        }
    }
}

/// Immutable planning problem shared by every search function.
#[derive(Clone)]
pub struct Domain {
    pub name: String,
    pub human: AgentModel,
    pub robot: AgentModel,
    pub initial: Agents,
    pub starting_agent: AgentId,
    pub wait_costs: WaitCosts,
    observation: Option<ObservationFn>,
    copresence: StatePredicate,
    goal: Option<StatePredicate>,
    signal: Option<SignalFn>,
    next_task_id: u64,
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain")
            .field("name", &self.name)
            .field("starting_agent", &self.starting_agent)
            .field("human", &self.human)
            .field("robot", &self.robot)
            .finish()
    }
}

impl Domain {
    pub fn builder(name: impl Into<String>) -> DomainBuilder {
        DomainBuilder::new(name)
    }

    pub fn model(&self, agent: AgentId) -> &AgentModel {
        match agent {
            AgentId::Human => &self.human,
            AgentId::Robot => &self.robot,
        }
    }

    /// Fresh id allocator continuing after the initial agenda's ids.
    pub fn ids(&self) -> Ids {
        Ids::starting_at(self.next_task_id)
    }

    /// Situation assessment: may H still entertain `possible` given `designated`?
    pub fn keeps_world(&self, designated: &State, possible: &State) -> bool {
        self.observation
            .as_ref()
            .is_none_or(|keep| keep(designated, possible))
    }

    pub fn copresent(&self, state: &State) -> bool {
        (self.copresence)(state)
    }

    pub fn is_goal(&self, state: &State) -> bool {
        self.goal.as_ref().is_none_or(|goal| goal(state))
    }

    pub fn has_goal(&self) -> bool {
        self.goal.is_some()
    }

    pub fn signal(&self) -> Option<&SignalFn> {
        self.signal.as_ref()
    }
}

/// Default copresence: same `agent_in_context` and same `agent_at` for H and R.
pub fn context_and_location(state: &State) -> bool {
    let same = |fluent: &str| {
        let human = state.lookup(fluent, AgentId::Human.as_str());
        human.is_some() && human == state.lookup(fluent, AgentId::Robot.as_str())
    };
    same("agent_in_context") && same("agent_at")
}

/// Step-by-step construction of a [`Domain`].
pub struct DomainBuilder {
    name: String,
    human: AgentModel,
    robot: AgentModel,
    state: State,
    agendas: Vec<(AgentId, Subtask)>,
    starting_agent: AgentId,
    wait_costs: WaitCosts,
    observation: Option<ObservationFn>,
    copresence: Option<StatePredicate>,
    goal: Option<StatePredicate>,
    signal: Option<SignalFn>,
}

impl DomainBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            human: AgentModel::default(),
            robot: AgentModel::default(),
            state: State::default(),
            agendas: Vec::new(),
            starting_agent: AgentId::Robot,
            wait_costs: WaitCosts::default(),
            observation: None,
            copresence: None,
            goal: None,
            signal: None,
        }
    }

    fn model_mut(&mut self, agent: AgentId) -> &mut AgentModel {
        match agent {
            AgentId::Human => &mut self.human,
            AgentId::Robot => &mut self.robot,
        }
    }

    pub fn operators(mut self, agent: AgentId, operators: Vec<Operator>) -> Self {
        let model = self.model_mut(agent);
        for operator in operators {
            model.operators.insert(operator.name.clone(), operator);
        }
        self
    }

    /// Register methods; declaration order per task is kept.
    pub fn methods(mut self, agent: AgentId, methods: Vec<Method>) -> Self {
        let model = self.model_mut(agent);
        for method in methods {
            model
                .methods
                .entry(method.task.clone())
                .or_default()
                .push(method);
        }
        self
    }

    pub fn triggers(mut self, agent: AgentId, triggers: Vec<Trigger>) -> Self {
        self.model_mut(agent).triggers.extend(triggers);
        self
    }

    pub fn state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    /// Append tasks to an agent's initial agenda.
    pub fn agenda(mut self, agent: AgentId, tasks: Vec<Subtask>) -> Self {
        self.agendas
            .extend(tasks.into_iter().map(|task| (agent, task)));
        self
    }

    pub fn starting_agent(mut self, agent: AgentId) -> Self {
        self.starting_agent = agent;
        self
    }

    pub fn wait_costs(mut self, costs: WaitCosts) -> Self {
        self.wait_costs = costs;
        self
    }

    pub fn observation(
        mut self,
        keep: impl Fn(&State, &State) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.observation = Some(Arc::new(keep));
        self
    }

    pub fn copresence(mut self, copresent: impl Fn(&State) -> bool + Send + Sync + 'static) -> Self {
        self.copresence = Some(Arc::new(copresent));
        self
    }

    pub fn goal(mut self, goal: impl Fn(&State) -> bool + Send + Sync + 'static) -> Self {
        self.goal = Some(Arc::new(goal));
        self
    }

    pub fn signal(
        mut self,
        signal: impl Fn(&State, &[String]) -> Vec<Subtask> + Send + Sync + 'static,
    ) -> Self {
        self.signal = Some(Arc::new(signal));
        self
    }

    /// Resolve the initial agendas and freeze the domain.
    ///
    /// Fails when an agenda entry is unknown to its agent.
    pub fn build(self) -> Result<Domain, PlanError> {
        let mut ids = Ids::default();
        let mut human = Agent::default();
        let mut robot = Agent::default();
        for (agent, subtask) in &self.agendas {
            let task = match agent {
                AgentId::Human => self.human.instantiate(&mut ids, *agent, subtask, None)?,
                AgentId::Robot => self.robot.instantiate(&mut ids, *agent, subtask, None)?,
            };
            match agent {
                AgentId::Human => human.agenda.push(task),
                AgentId::Robot => robot.agenda.push(task),
            }
        }
        let next_task_id = ids.task();
        let copresence: StatePredicate = match self.copresence {
            Some(copresent) => copresent,
            None => Arc::new(context_and_location),
        };
        Ok(Domain {
            name: self.name,
            human: self.human,
            robot: self.robot,
            initial: Agents {
                state: self.state,
                human,
                robot,
            },
            starting_agent: self.starting_agent,
            wait_costs: self.wait_costs,
            observation: self.observation,
            copresence,
            goal: self.goal,
            signal: self.signal,
            next_task_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::StateBuilder;

    #[test]
    fn build_rejects_unknown_agenda_tasks() {
        let err = Domain::builder("broken")
            .agenda(AgentId::Human, vec![call("Fly")])
            .build()
            .expect_err("unknown task");
        assert_eq!(
            err,
            PlanError::UnknownTask {
                agent: AgentId::Human,
                task: "Fly".to_string()
            }
        );
        assert_eq!(err.to_string(), "task 'Fly' isn't known by agent H");
    }

    #[test]
    fn build_resolves_abstract_and_primitive_tasks() {
        let domain = Domain::builder("small")
            .operators(AgentId::Robot, vec![Operator::new("cut")])
            .methods(AgentId::Robot, vec![Method::new("Prepare")])
            .agenda(AgentId::Robot, vec![call("Prepare"), call("cut")])
            .build()
            .expect("build");
        let agenda = &domain.initial.robot.agenda;
        assert!(agenda[0].is_abstract());
        assert!(agenda[1].is_primitive());
        assert_eq!(domain.ids().task(), 2);
    }

    #[test]
    fn default_copresence_compares_context_and_location() {
        let together = StateBuilder::new()
            .dynamic("agent_in_context", Value::map([("H", "kitchen"), ("R", "kitchen")]))
            .dynamic("agent_at", Value::map([("H", "kitchen"), ("R", "kitchen")]))
            .build();
        assert!(context_and_location(&together));

        let mut apart = together.clone();
        apart.set("agent_at", "H", "pantry").expect("set");
        assert!(!context_and_location(&apart));
        assert!(!context_and_location(&State::default()));
    }
}
