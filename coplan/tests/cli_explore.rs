//! CLI tests for `coplan domains`, `explore`, `validate` and `rank`.
//!
//! Spawns the coplan binary and verifies exit codes and the files it writes.

use std::fs;
use std::process::{Command, Output};

use coplan::core::domain::call;
use coplan::exit_codes;
use coplan::explore::{ExploreOptions, SearchMode};
use coplan::io::solution_store::load_solution;
use coplan::test_support::{dinner_with_agendas, solution_fixture};

fn coplan(dir: &std::path::Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_coplan"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("run coplan")
}

#[test]
fn domains_lists_prepare_dinner() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = coplan(temp.path(), &["domains"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.lines().any(|line| line == "prepare_dinner"));
}

#[test]
fn unknown_domain_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = coplan(temp.path(), &["explore", "nowhere"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown domain"));
}

#[test]
fn bounded_exploration_without_goal_reports_no_solution() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = coplan(
        temp.path(),
        &[
            "explore",
            "prepare_dinner",
            "--max-expansions",
            "5",
            "--output",
            "solution.json",
        ],
    );
    assert_eq!(output.status.code(), Some(exit_codes::NO_SOLUTION));

    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).expect("stats json");
    assert_eq!(stats["expansions"], 5);
    assert_eq!(stats["truncated"], true);
    assert_eq!(stats["mode"], "epistemic");

    let loaded = load_solution(&temp.path().join("solution.json")).expect("load");
    assert_eq!(loaded.doc.domain, "prepare_dinner");
    assert!(!loaded.open.is_empty());
}

#[test]
fn config_file_sets_defaults_and_flags_override() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("coplan.toml"),
        "mode = \"parallel\"\nmax_expansions = 3\n",
    )
    .expect("write config");

    let output = coplan(temp.path(), &["explore", "prepare_dinner"]);
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).expect("stats json");
    assert_eq!(stats["mode"], "parallel");
    assert_eq!(stats["expansions"], 3);
    assert!(stats.get("max_worlds").is_none());

    let output = coplan(
        temp.path(),
        &["explore", "prepare_dinner", "--mode", "epistemic", "--max-expansions", "2"],
    );
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).expect("stats json");
    assert_eq!(stats["mode"], "epistemic");
    assert_eq!(stats["expansions"], 2);
    assert!(stats["max_worlds"].is_u64());
}

#[test]
fn signal_with_parallel_mode_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = coplan(
        temp.path(),
        &["explore", "prepare_dinner", "--mode", "parallel", "--signal"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn validate_then_rank_a_solution_file() {
    let domain = dinner_with_agendas(vec![call("Cut_n_Wash")], vec![call("Cut_n_Wash")]);
    let (temp, path) = solution_fixture(&domain, &ExploreOptions::new(SearchMode::Parallel));
    let file = path.to_string_lossy().to_string();

    let output = coplan(temp.path(), &["validate", &file]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let output = coplan(temp.path(), &["rank", &file, "--robot", "human_min_work"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).expect("summary json");
    assert_eq!(summary["robot_preference"], "human_min_work");
    assert_eq!(summary["best_robot_rank"], 1);

    let ranked = load_solution(&path).expect("reload");
    let ranked_pairs = ranked
        .doc
        .steps
        .iter()
        .flat_map(|step| &step.pairs)
        .filter(|pair| pair.rank.robot.is_some())
        .count();
    assert!(ranked_pairs > 0);
}

#[test]
fn validate_rejects_a_broken_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("solution.json");
    fs::write(&path, "{\"format_version\": 1}\n").expect("write");
    let output = coplan(temp.path(), &["validate", "solution.json"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("schema validation failed"));
}
