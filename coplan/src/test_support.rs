//! Test-only helpers for constructing small planning domains.

use std::path::PathBuf;

use crate::core::agents::Agents;
use crate::core::domain::{Domain, Method, Operator, Subtask, call};
use crate::core::state::{StateBuilder, Value};
use crate::core::types::AgentId;
use crate::domains::prepare_dinner;
use crate::explore::{ExploreOptions, explore};
use crate::io::solution_store::{SolutionDoc, write_solution};

/// Dinner domain with explicit agendas; H moves first.
pub fn dinner_with_agendas(human: Vec<Subtask>, robot: Vec<Subtask>) -> Domain {
    prepare_dinner::with_agendas(human, robot).expect("dinner domain")
}

/// Robot-only domain whose single task can be picked two ways.
pub fn pick_domain() -> Domain {
    Domain::builder("pick")
        .state(
            StateBuilder::new()
                .dynamic("holding", Value::map([("R", "nothing")]))
                .build(),
        )
        .operators(
            AgentId::Robot,
            vec![
                Operator::new("pick")
                    .precondition(|state, agent, _| state.is("holding", agent.as_str(), "nothing"))
                    .effects(|state, agent, params| {
                        let color = params.first().map(String::as_str).unwrap_or("nothing");
                        state.set("holding", agent.as_str(), color)
                    }),
            ],
        )
        .methods(
            AgentId::Robot,
            vec![Method::new("Pick").alternatives(|_, _, _| {
                vec![
                    vec![Subtask::new("pick", ["red"])],
                    vec![Subtask::new("pick", ["blue"])],
                ]
            })],
        )
        .agenda(AgentId::Robot, vec![call("Pick")])
        .build()
        .expect("pick domain")
}

/// H must finish cooking but isn't sure the vegetable was seasoned.
///
/// Returns the domain, the designated world (seasoned) and two possible
/// worlds: one unseasoned, one seasoned but with the vegetable already cut.
pub fn seasoned_ready_to_finish() -> (Domain, Agents, Vec<Agents>) {
    let domain = dinner_with_agendas(vec![call("Done_Cooking")], vec![]);
    let mut designated = domain.initial.clone();
    designated
        .state
        .set("seasoned", "vegetable", true)
        .expect("set");
    designated
        .state
        .set("ingredient_at", "ingredient", "vegetable")
        .expect("set");

    let mut unseasoned = designated.clone();
    unseasoned
        .state
        .set("seasoned", "vegetable", false)
        .expect("set");
    let mut cut = designated.clone();
    cut.state.set("cut", "vegetable", true).expect("set");

    (domain, designated, vec![unseasoned, cut])
}

/// R flips a switch, by pressing or by pulling; the goal is the switch on.
///
/// The robot starts and H has nothing to do, so either flip reaches the goal
/// after one robot step and the closing turn handshake.
pub fn switch_domain() -> Domain {
    let flip = |name: &str| {
        Operator::new(name)
            .precondition(|state, _, _| !state.flag("switch", "on"))
            .effects(|state, _, _| state.set("switch", "on", true))
    };
    Domain::builder("switch")
        .state(
            StateBuilder::new()
                .dynamic("switch", Value::map([("on", false)]))
                .build(),
        )
        .operators(AgentId::Robot, vec![flip("press"), flip("pull")])
        .methods(
            AgentId::Robot,
            vec![Method::new("Flip").alternatives(|_, _, _| {
                vec![vec![call("press")], vec![call("pull")]]
            })],
        )
        .agenda(AgentId::Robot, vec![call("Flip")])
        .goal(|state| state.flag("switch", "on"))
        .starting_agent(AgentId::Robot)
        .build()
        .expect("switch domain")
}

/// Explore `domain` and write the tree to `solution.json` in a fresh
/// temporary directory, kept alive by the returned guard.
pub fn solution_fixture(domain: &Domain, options: &ExploreOptions) -> (tempfile::TempDir, PathBuf) {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("solution.json");
    let outcome = explore(domain, options).expect("explore");
    let doc = SolutionDoc::from_tree(domain, &outcome.tree, &outcome.open);
    write_solution(&path, &doc).expect("write solution");
    (temp, path)
}
