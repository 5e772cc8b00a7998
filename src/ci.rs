//! CI rule evaluation over an analysis result.
//!
//! Rules carry string-valued thresholds so a config file can disable
//! any of them with the literal `disabled`. Evaluation never aborts:
//! every rule reports pass, fail, warn, or skip, and the evaluator
//! tallies them into a single gate decision.

use crate::error::ConfigError;
use crate::image::AnalysisResult;
use bytesize::ByteSize;
use owo_colors::OwoColorize;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

const DEFAULT_LOWEST_EFFICIENCY: &str = "0.9";
const DEFAULT_HIGHEST_WASTED_BYTES: &str = "disabled";
const DEFAULT_HIGHEST_USER_WASTED_PERCENT: &str = "0.1";

/// The rules the evaluator knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
    LowestEfficiency,
    HighestWastedBytes,
    HighestUserWastedPercent,
}

impl RuleKind {
    fn key(self) -> &'static str {
        match self {
            RuleKind::LowestEfficiency => "lowestEfficiency",
            RuleKind::HighestWastedBytes => "highestWastedBytes",
            RuleKind::HighestUserWastedPercent => "highestUserWastedPercent",
        }
    }

    fn evaluate(self, analysis: &AnalysisResult, value: &str) -> (RuleStatus, String) {
        match self {
            RuleKind::LowestEfficiency => {
                let threshold: f64 = match value.parse() {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        return (
                            RuleStatus::Failed,
                            format!("invalid config value ('{value}'): {err}"),
                        )
                    }
                };
                if threshold > analysis.efficiency {
                    (
                        RuleStatus::Failed,
                        format!(
                            "image efficiency is too low (efficiency={} < threshold={})",
                            analysis.efficiency, threshold
                        ),
                    )
                } else {
                    (RuleStatus::Passed, String::new())
                }
            }
            RuleKind::HighestWastedBytes => {
                let threshold: ByteSize = match value.parse() {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        return (
                            RuleStatus::Failed,
                            format!("invalid config value ('{value}'): {err}"),
                        )
                    }
                };
                if analysis.wasted_bytes > threshold.as_u64() {
                    (
                        RuleStatus::Failed,
                        format!(
                            "too many bytes wasted (wasted-bytes={} > threshold={})",
                            analysis.wasted_bytes,
                            threshold.as_u64()
                        ),
                    )
                } else {
                    (RuleStatus::Passed, String::new())
                }
            }
            RuleKind::HighestUserWastedPercent => {
                let threshold: f64 = match value.parse() {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        return (
                            RuleStatus::Failed,
                            format!("invalid config value ('{value}'): {err}"),
                        )
                    }
                };
                if threshold < analysis.wasted_user_percent {
                    (
                        RuleStatus::Failed,
                        format!(
                            "too many bytes wasted, relative to the user bytes added (%-user-wasted-bytes={} > threshold={})",
                            analysis.wasted_user_percent, threshold
                        ),
                    )
                } else {
                    (RuleStatus::Passed, String::new())
                }
            }
        }
    }
}

/// Outcome of evaluating a single rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleStatus {
    Passed,
    Failed,
    Warning,
    Disabled,
}

impl RuleStatus {
    fn label(self) -> String {
        match self {
            RuleStatus::Passed => "PASS".to_string(),
            RuleStatus::Failed => "FAIL".bold().red().to_string(),
            RuleStatus::Warning => "WARN".blue().to_string(),
            RuleStatus::Disabled => "SKIP".blue().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuleResult {
    pub status: RuleStatus,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Tally {
    pub total: usize,
    pub pass: usize,
    pub fail: usize,
    pub warn: usize,
    pub skip: usize,
}

/// YAML-backed rule thresholds (the `.strata-ci.yaml` file).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CiConfig {
    #[serde(default)]
    rules: BTreeMap<String, serde_yaml::Value>,
}

impl CiConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source,
        })
    }

    fn value_for(&self, key: &str, default: &str) -> String {
        match self.rules.get(key) {
            Some(serde_yaml::Value::String(value)) => value.clone(),
            Some(serde_yaml::Value::Number(value)) => value.to_string(),
            Some(serde_yaml::Value::Bool(value)) => value.to_string(),
            _ => default.to_string(),
        }
    }
}

/// Evaluates every known rule against an analysis and tallies the
/// outcome.
#[derive(Debug)]
pub struct Evaluator {
    thresholds: Vec<(RuleKind, String)>,
    pub results: BTreeMap<String, RuleResult>,
    pub tally: Tally,
    pub pass: bool,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(&CiConfig::default())
    }
}

impl Evaluator {
    pub fn new(config: &CiConfig) -> Self {
        let thresholds = vec![
            (
                RuleKind::LowestEfficiency,
                config.value_for("lowestEfficiency", DEFAULT_LOWEST_EFFICIENCY),
            ),
            (
                RuleKind::HighestWastedBytes,
                config.value_for("highestWastedBytes", DEFAULT_HIGHEST_WASTED_BYTES),
            ),
            (
                RuleKind::HighestUserWastedPercent,
                config.value_for(
                    "highestUserWastedPercent",
                    DEFAULT_HIGHEST_USER_WASTED_PERCENT,
                ),
            ),
        ];
        Evaluator {
            thresholds,
            results: BTreeMap::new(),
            tally: Tally::default(),
            pass: true,
        }
    }

    /// Run every rule. Returns the overall gate decision.
    pub fn evaluate(&mut self, analysis: &AnalysisResult) -> bool {
        for (rule, value) in &self.thresholds {
            let result = if value == "disabled" {
                RuleResult {
                    status: RuleStatus::Disabled,
                    message: "rule disabled".to_string(),
                }
            } else {
                let (status, message) = rule.evaluate(analysis, value);
                if status == RuleStatus::Failed {
                    self.pass = false;
                }
                RuleResult { status, message }
            };
            self.results.insert(rule.key().to_string(), result);
        }

        self.tally = Tally::default();
        self.tally.total = self.results.len();
        for result in self.results.values() {
            match result.status {
                RuleStatus::Passed => self.tally.pass += 1,
                RuleStatus::Failed => self.tally.fail += 1,
                RuleStatus::Warning => self.tally.warn += 1,
                RuleStatus::Disabled => self.tally.skip += 1,
            }
        }

        self.pass
    }

    /// Human-readable evaluation report.
    pub fn report(&self) -> String {
        let mut out = String::new();
        for (key, result) in &self.results {
            if result.message.is_empty() {
                let _ = writeln!(out, "  {}: {}", result.status.label(), key);
            } else {
                let _ = writeln!(
                    out,
                    "  {}: {}: {}",
                    result.status.label(),
                    key,
                    result.message
                );
            }
        }

        let status = if self.tally.fail > 0 { "FAIL" } else { "PASS" };
        let summary = format!(
            "Result:{} [Total:{}] [Passed:{}] [Failed:{}] [Warn:{}] [Skipped:{}]",
            status,
            self.tally.total,
            self.tally.pass,
            self.tally.fail,
            self.tally.warn,
            self.tally.skip
        );
        if self.pass {
            let _ = writeln!(out, "{}", summary.green());
        } else {
            let _ = writeln!(out, "{}", summary.red());
        }
        out
    }
}
