//! Exploration settings stored in a TOML file (`coplan.toml` by default).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::frontier::SearchOrder;
use crate::core::metrics::Preference;
use crate::explore::{ExploreOptions, SearchMode};
use crate::rank::Preferences;

/// Exploration configuration (TOML).
///
/// Missing fields fall back to an exhaustive epistemic search ranked for
/// early task completion. Command-line flags override these values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExploreConfig {
    pub mode: SearchMode,

    /// Frontier order; the mode decides when absent.
    pub order: Option<SearchOrder>,

    /// Let H wait for a robot signal instead of asking.
    pub allow_signal: bool,

    /// Upper bound on expansions; absent runs to exhaustion.
    pub max_expansions: Option<usize>,

    pub ranking: RankingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RankingConfig {
    pub robot: Preference,
    pub human: Preference,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            robot: Preference::TaskEndEarly,
            human: Preference::HumanMinWork,
        }
    }
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            mode: SearchMode::Epistemic,
            order: None,
            allow_signal: false,
            max_expansions: None,
            ranking: RankingConfig::default(),
        }
    }
}

impl ExploreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_expansions == Some(0) {
            return Err(anyhow!("max_expansions must be > 0"));
        }
        if self.allow_signal && self.mode == SearchMode::Parallel {
            return Err(anyhow!("allow_signal requires mode 'epistemic' or 'and_or'"));
        }
        Ok(())
    }

    pub fn options(&self) -> ExploreOptions {
        ExploreOptions {
            mode: self.mode,
            order: self.order.unwrap_or(self.mode.default_order()),
            allow_signal: self.allow_signal,
            max_expansions: self.max_expansions,
        }
    }

    pub fn preferences(&self) -> Preferences {
        Preferences {
            robot: self.ranking.robot,
            human: self.ranking.human,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ExploreConfig::default()`.
pub fn load_config(path: &Path) -> Result<ExploreConfig> {
    if !path.exists() {
        let cfg = ExploreConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ExploreConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ExploreConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ExploreConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("coplan.toml");
        let cfg = ExploreConfig {
            mode: SearchMode::AndOr,
            order: Some(SearchOrder::DepthFirst),
            allow_signal: true,
            max_expansions: Some(500),
            ranking: RankingConfig {
                robot: Preference::HumanFreeEarly,
                human: Preference::TaskEndEarly,
            },
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("coplan.toml");
        fs::write(&path, "mode = \"and_or\"\n\n[ranking]\nrobot = \"human_min_work\"\n")
            .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.mode, SearchMode::AndOr);
        assert_eq!(cfg.ranking.robot, Preference::HumanMinWork);
        assert_eq!(cfg.ranking.human, Preference::HumanMinWork);
        assert_eq!(cfg.options().order, SearchOrder::BreadthFirst);
    }

    #[test]
    fn zero_expansion_bound_is_rejected() {
        let cfg = ExploreConfig {
            max_expansions: Some(0),
            ..ExploreConfig::default()
        };
        let err = cfg.validate().expect_err("invalid");
        assert!(err.to_string().contains("max_expansions"));
    }
}
