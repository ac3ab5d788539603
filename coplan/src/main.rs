//! Concurrent human-robot task planner.
//!
//! Explores the joint execution tree of a built-in domain, persists it as
//! `solution.json`-style files and ranks its final branches under execution
//! preferences.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde::Serialize;

use coplan::core::frontier::SearchOrder;
use coplan::core::metrics::Preference;
use coplan::domains;
use coplan::exit_codes;
use coplan::explore::{SearchMode, explore};
use coplan::io::config::load_config;
use coplan::io::solution_store::{SolutionDoc, load_solution, write_solution};
use coplan::logging;
use coplan::rank::{Preferences, rank_tree};

#[derive(Parser)]
#[command(
    name = "coplan",
    version,
    about = "Concurrent human-robot task planner"
)]
struct Cli {
    /// Louder diagnostics on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List built-in domains.
    Domains,
    /// Explore a built-in domain and print exploration statistics.
    Explore {
        /// Domain name (see `coplan domains`).
        domain: String,
        /// TOML config; missing file means defaults.
        #[arg(long, default_value = "coplan.toml")]
        config: PathBuf,
        /// Search driver: parallel, epistemic or and_or.
        #[arg(long, value_parser = parse_mode)]
        mode: Option<SearchMode>,
        /// Frontier order: depth_first or breadth_first.
        #[arg(long, value_parser = parse_order)]
        order: Option<SearchOrder>,
        /// Let H wait for a robot signal instead of asking.
        #[arg(long)]
        signal: bool,
        /// Stop after this many expansions.
        #[arg(long)]
        max_expansions: Option<usize>,
        /// Write the explored tree to this file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check a solution file against the schema and tree invariants.
    Validate {
        solution: PathBuf,
    },
    /// Rank the final leaves of a solution file and store the ranks in it.
    Rank {
        solution: PathBuf,
        #[arg(long, default_value = "task_end_early")]
        robot: Preference,
        #[arg(long, default_value = "human_min_work")]
        human: Preference,
    },
}

fn parse_mode(raw: &str) -> Result<SearchMode, String> {
    [SearchMode::Parallel, SearchMode::Epistemic, SearchMode::AndOr]
        .into_iter()
        .find(|mode| mode.as_str() == raw)
        .ok_or_else(|| format!("unknown mode '{}' (expected parallel, epistemic or and_or)", raw))
}

fn parse_order(raw: &str) -> Result<SearchOrder, String> {
    [SearchOrder::DepthFirst, SearchOrder::BreadthFirst]
        .into_iter()
        .find(|order| order.as_str() == raw)
        .ok_or_else(|| format!("unknown order '{}' (expected depth_first or breadth_first)", raw))
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Domains => cmd_domains(),
        Command::Explore {
            domain,
            config,
            mode,
            order,
            signal,
            max_expansions,
            output,
        } => cmd_explore(ExploreArgs {
            domain,
            config,
            mode,
            order,
            signal,
            max_expansions,
            output,
        }),
        Command::Validate { solution } => cmd_validate(&solution),
        Command::Rank {
            solution,
            robot,
            human,
        } => cmd_rank(&solution, Preferences { robot, human }),
    }
}

struct ExploreArgs {
    domain: String,
    config: PathBuf,
    mode: Option<SearchMode>,
    order: Option<SearchOrder>,
    signal: bool,
    max_expansions: Option<usize>,
    output: Option<PathBuf>,
}

fn cmd_domains() -> Result<i32> {
    for name in domains::names() {
        println!("{}", name);
    }
    Ok(exit_codes::OK)
}

fn cmd_explore(args: ExploreArgs) -> Result<i32> {
    let mut cfg = load_config(&args.config).context("load explore config")?;
    if let Some(mode) = args.mode {
        cfg.mode = mode;
    }
    if args.order.is_some() {
        cfg.order = args.order;
    }
    cfg.allow_signal |= args.signal;
    if args.max_expansions.is_some() {
        cfg.max_expansions = args.max_expansions;
    }
    cfg.validate()?;

    let domain = domains::by_name(&args.domain)
        .ok_or_else(|| {
            anyhow!(
                "unknown domain '{}' (known: {})",
                args.domain,
                domains::names().join(", ")
            )
        })?
        .with_context(|| format!("build domain {}", args.domain))?;
    let mut outcome = explore(&domain, &cfg.options())
        .with_context(|| format!("explore {}", domain.name))?;
    let ranking = rank_tree(&mut outcome.tree, cfg.preferences());

    if let Some(path) = &args.output {
        let doc = SolutionDoc::from_tree(&domain, &outcome.tree, &outcome.open);
        write_solution(path, &doc).with_context(|| format!("write {}", path.display()))?;
    }
    print_json(&ExploreReport {
        stats: &outcome.stats,
        best_robot_rank: ranking.best_robot_rank,
        best_human_rank: ranking.best_human_rank,
    })?;

    if outcome.stats.solved {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::NO_SOLUTION)
    }
}

#[derive(Serialize)]
struct ExploreReport<'a> {
    #[serde(flatten)]
    stats: &'a coplan::explore::ExploreStats,
    best_robot_rank: Option<usize>,
    best_human_rank: Option<usize>,
}

fn cmd_validate(path: &Path) -> Result<i32> {
    let loaded = load_solution(path)?;
    println!(
        "{}: {} steps, {} final leaves",
        path.display(),
        loaded.doc.steps.len(),
        loaded.tree.final_leaves().len()
    );
    Ok(exit_codes::OK)
}

fn cmd_rank(path: &Path, preferences: Preferences) -> Result<i32> {
    let mut loaded = load_solution(path)?;
    let summary = rank_tree(&mut loaded.tree, preferences);
    loaded.doc.replace_tree(&loaded.tree, &loaded.open);
    write_solution(path, &loaded.doc).with_context(|| format!("write {}", path.display()))?;
    print_json(&summary)?;
    if summary.leaves.is_empty() {
        return Ok(exit_codes::NO_SOLUTION);
    }
    Ok(exit_codes::OK)
}

/// Print `value` to stdout as pretty-printed JSON.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{}", payload);
    Ok(())
}
