//! Dinner preparation: H and R share a kitchen, the ingredient waits in the
//! pantry and H can't see whether the vegetable was seasoned.

use crate::core::domain::{Domain, DomainBuilder, Method, Operator, Subtask, call};
use crate::core::error::{PlanError, StateError};
use crate::core::state::{State, StateBuilder, Value};
use crate::core::types::AgentId;

pub const NAME: &str = "prepare_dinner";

fn food_ready(state: &State) -> bool {
    state.flag("cooking_done", "food_ready")
}

fn vegetable(state: &State, fluent: &str) -> bool {
    state.flag(fluent, "vegetable")
}

fn at(state: &State, agent: AgentId, place: &str) -> bool {
    state.is("agent_at", agent.as_str(), place)
}

fn ingredient_at(state: &State, place: &str) -> bool {
    state.is("ingredient_at", "ingredient", place)
}

/// Effect setting `fluent.vegetable` to true.
fn mark(
    fluent: &'static str,
) -> impl Fn(&mut State, AgentId, &[String]) -> Result<(), StateError> + Send + Sync + 'static {
    move |state: &mut State, _: AgentId, _: &[String]| state.set(fluent, "vegetable", true)
}

fn operators() -> (Vec<Operator>, Vec<Operator>) {
    let cut = || {
        Operator::new("cut")
            .precondition(|state, _, _| !vegetable(state, "cut"))
            .effects(mark("cut"))
    };
    let wash = || {
        Operator::new("wash")
            .precondition(|state, _, _| !vegetable(state, "washed") && vegetable(state, "cut"))
            .effects(mark("washed"))
    };
    let communicate = || {
        Operator::new("communicate_status_of_seasoned").observes(|state, _, _| {
            state
                .lookup("seasoned", "vegetable")
                .cloned()
                .unwrap_or(Value::Null)
        })
    };

    let robot = vec![
        cut(),
        wash(),
        communicate(),
        Operator::new("seasoning")
            .precondition(|state, _, _| !vegetable(state, "seasoned") && vegetable(state, "washed"))
            .effects(mark("seasoned")),
        Operator::new("put_on_stove")
            .precondition(|state, _, _| vegetable(state, "washed") && !vegetable(state, "boiling"))
            .effects(mark("boiling")),
    ];

    let human = vec![
        cut(),
        wash(),
        communicate(),
        Operator::new("move")
            .precondition(|state, agent, params| {
                let Some(from) = params.first() else {
                    return false;
                };
                agent == AgentId::Human
                    && state.is("agent_in_context", agent.as_str(), from)
                    && state.is("agent_at", agent.as_str(), from)
            })
            .effects(|state, agent, params| {
                let Some(to) = params.get(1) else {
                    return Ok(());
                };
                state.set("agent_at", agent.as_str(), to.as_str())?;
                state.set("agent_in_context", agent.as_str(), to.as_str())
            }),
        Operator::new("get_ingredient")
            .precondition(|state, agent, _| {
                agent == AgentId::Human && at(state, agent, "pantry") && ingredient_at(state, "pantry")
            })
            .effects(|state, agent, _| state.set("ingredient_at", "ingredient", agent.as_str())),
        Operator::new("put_ingredient")
            .precondition(|state, agent, _| {
                agent == AgentId::Human
                    && at(state, agent, "kitchen")
                    && ingredient_at(state, agent.as_str())
                    && vegetable(state, "boiling")
            })
            .effects(|state, _, _| state.set("ingredient_at", "ingredient", "vegetable")),
        Operator::new("aux_done_cooking")
            .precondition(|state, _, _| {
                !food_ready(state) && vegetable(state, "seasoned") && ingredient_at(state, "vegetable")
            })
            .effects(|state, _, _| state.set("cooking_done", "food_ready", true)),
    ];
    (human, robot)
}

fn methods() -> (Vec<Method>, Vec<Method>) {
    let cut_n_wash = || {
        Method::new("Cut_n_Wash")
            .done_when(|state, _, _| vegetable(state, "cut") && vegetable(state, "washed"))
            .precondition(|state, _, _| !vegetable(state, "cut") || !vegetable(state, "washed"))
            .alternatives(|state, agent, _| {
                if !at(state, agent, "kitchen") {
                    vec![]
                } else if !vegetable(state, "cut") {
                    vec![vec![call("cut"), call("wash"), call("Cut_n_Wash")]]
                } else if !vegetable(state, "washed") {
                    vec![vec![call("wash"), call("Cut_n_Wash")]]
                } else {
                    vec![]
                }
            })
    };
    let communicate = || {
        Method::new("Communicate")
            .alternatives(|_, _, _| vec![vec![call("communicate_status_of_seasoned")]])
    };
    let not_ready = |state: &State, _: AgentId, _: &[String]| !food_ready(state);
    let ready = |state: &State, _: AgentId, _: &[String]| food_ready(state);

    let robot = vec![
        cut_n_wash(),
        communicate(),
        Method::new("Prepare_Dinner")
            .precondition(not_ready)
            .done_when(ready)
            .alternatives(|state, agent, _| {
                if !at(state, agent, "kitchen") {
                    vec![]
                } else if !vegetable(state, "cut") {
                    vec![vec![
                        call("Cut_n_Wash"),
                        call("put_on_stove"),
                        call("seasoning"),
                        call("Prepare_Dinner"),
                    ]]
                } else if !vegetable(state, "boiling") {
                    vec![vec![call("put_on_stove"), call("seasoning"), call("Prepare_Dinner")]]
                } else if !vegetable(state, "seasoned") {
                    vec![vec![call("seasoning"), call("Prepare_Dinner")]]
                } else {
                    vec![]
                }
            }),
    ];

    let human = vec![
        cut_n_wash(),
        communicate(),
        Method::new("Prepare_Dinner")
            .precondition(not_ready)
            .done_when(ready)
            .alternatives(|state, agent, _| {
                if at(state, agent, "kitchen") && ingredient_at(state, "pantry") {
                    vec![vec![
                        call("Bring_Ingredient_From_Pantry"),
                        call("Put_Ingredient"),
                        call("Prepare_Dinner"),
                    ]]
                } else if vegetable(state, "seasoned") && ingredient_at(state, "vegetable") {
                    vec![vec![call("Done_Cooking"), call("Prepare_Dinner")]]
                } else {
                    vec![]
                }
            }),
        Method::new("Done_Cooking")
            .precondition(|state, _, _| {
                !food_ready(state) && vegetable(state, "seasoned") && ingredient_at(state, "vegetable")
            })
            .alternatives(|state, _, _| {
                if food_ready(state) {
                    vec![]
                } else {
                    vec![vec![call("aux_done_cooking")]]
                }
            }),
        Method::new("Bring_Ingredient_From_Pantry")
            .precondition(|state, _, _| !food_ready(state) && ingredient_at(state, "pantry"))
            .alternatives(|state, agent, _| {
                if at(state, agent, "kitchen") {
                    vec![vec![
                        Subtask::new("move", ["kitchen", "pantry"]),
                        call("get_ingredient"),
                        Subtask::new("move", ["pantry", "kitchen"]),
                    ]]
                } else {
                    vec![]
                }
            }),
        Method::new("Put_Ingredient")
            .precondition(not_ready)
            .alternatives(|state, agent, _| {
                if at(state, agent, "kitchen") && ingredient_at(state, agent.as_str()) {
                    vec![vec![call("put_ingredient")]]
                } else {
                    vec![]
                }
            }),
    ];
    (human, robot)
}

pub fn initial_state() -> State {
    let by_agent = |place: &str| Value::map([("H", place), ("R", place)]);
    StateBuilder::new()
        .fixed("self_name", "None")
        .fixed("stove_at", Value::map([("stove", "kitchen")]))
        .dynamic("cooking_done", Value::map([("food_ready", false)]))
        .dynamic("washed", Value::map([("vegetable", false)]))
        .dynamic("cut", Value::map([("vegetable", false)]))
        .dynamic("seasoned", Value::map([("vegetable", false)]))
        .dynamic("boiling", Value::map([("vegetable", false)]))
        .dynamic("ingredient_at", Value::map([("ingredient", "pantry")]))
        .dynamic("agent_in_context", by_agent("kitchen"))
        .dynamic("agent_at", by_agent("kitchen"))
        .fixed("observability_washed_vegetable", Value::map([("washed", true)]))
        .fixed("observability_seasoned_vegetable", Value::map([("seasoned", false)]))
        .build()
}

/// What H sees of the kitchen when standing next to R.
///
/// Readiness, cut and boiling are always visible; washed and seasoned only
/// when their observability flag is set. Apart from R, H sees nothing.
pub fn observes(designated: &State, possible: &State) -> bool {
    let together = designated.lookup("agent_in_context", "R")
        == designated.lookup("agent_in_context", "H")
        && designated.lookup("agent_at", "R") == designated.lookup("agent_at", "H");
    if !together {
        return true;
    }
    let same = |fluent: &str, key: &str| designated.lookup(fluent, key) == possible.lookup(fluent, key);
    if !same("cooking_done", "food_ready") || !same("cut", "vegetable") || !same("boiling", "vegetable") {
        return false;
    }
    if designated.flag("observability_washed_vegetable", "washed") && !same("washed", "vegetable") {
        return false;
    }
    if designated.flag("observability_seasoned_vegetable", "seasoned") && !same("seasoned", "vegetable") {
        return false;
    }
    true
}

/// Everything but the agendas.
pub fn builder() -> DomainBuilder {
    let (human_ops, robot_ops) = operators();
    let (human_methods, robot_methods) = methods();
    Domain::builder(NAME)
        .state(initial_state())
        .operators(AgentId::Robot, robot_ops)
        .methods(AgentId::Robot, robot_methods)
        .operators(AgentId::Human, human_ops)
        .methods(AgentId::Human, human_methods)
        .observation(observes)
        .goal(food_ready)
        .starting_agent(AgentId::Human)
}

pub fn domain() -> Result<Domain, PlanError> {
    with_agendas(vec![call("Prepare_Dinner")], vec![call("Prepare_Dinner")])
}

pub fn with_agendas(human: Vec<Subtask>, robot: Vec<Subtask>) -> Result<Domain, PlanError> {
    builder()
        .agenda(AgentId::Robot, robot)
        .agenda(AgentId::Human, human)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_flags_static_fluents() {
        let state = initial_state();
        assert!(state.is_static("stove_at"));
        assert!(state.is_static("observability_seasoned_vegetable"));
        assert!(!state.is_static("cut"));
        let copy = state.clone();
        assert!(state.shares_fluent_with(&copy, "stove_at"));
    }

    #[test]
    fn seasoning_is_invisible_but_cutting_is_not() {
        let designated = initial_state();
        let mut seasoned = designated.clone();
        seasoned.set("seasoned", "vegetable", true).expect("set");
        let mut cut = designated.clone();
        cut.set("cut", "vegetable", true).expect("set");

        assert!(observes(&designated, &seasoned));
        assert!(!observes(&designated, &cut));

        let mut apart = designated.clone();
        apart.set("agent_at", "H", "pantry").expect("set");
        assert!(observes(&apart, &cut));
    }

    #[test]
    fn default_agendas_start_with_prepare_dinner() {
        let domain = domain().expect("domain");
        assert_eq!(domain.starting_agent, AgentId::Human);
        assert_eq!(domain.initial.human.agenda[0].name, "Prepare_Dinner");
        assert_eq!(domain.initial.robot.agenda[0].name, "Prepare_Dinner");
        assert!(domain.has_goal());
    }
}
