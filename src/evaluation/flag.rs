use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::context::{Context, DEFAULT_KIND};
use crate::error::{Error, Result, ValidationError};

// MODELS

/// A flag definition as stored in the flags file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagData {
    // filled in from the map key on load
    #[serde(default)]
    pub key: String,
    pub on: bool,
    pub variations: Vec<serde_json::Value>,
    #[serde(default)]
    pub off_variation: Option<usize>,
    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub rules: Vec<RuleData>,
    pub fallthrough: VariationOrRollout,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Prerequisite {
    pub key: String,
    pub variation: usize,
}

/// Individual targeting: context keys of one kind that get a fixed variation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    #[serde(default = "default_kind")]
    pub context_kind: String,
    pub values: Vec<String>,
    pub variation: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleData {
    #[serde(default)]
    pub id: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub clauses: Vec<Clause>,
    #[serde(flatten)]
    pub serve: VariationOrRollout,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clause {
    #[serde(default = "default_kind")]
    pub context_kind: String,
    pub op: ClauseOp,
    pub values: Vec<String>,
    #[serde(default)]
    pub negate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClauseOp {
    In,
    StartsWith,
    EndsWith,
}

/// What a rule or the fallthrough serves: a fixed variation or a rollout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VariationOrRollout {
    #[serde(default)]
    pub variation: Option<usize>,
    #[serde(default)]
    pub rollout: Option<Rollout>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rollout {
    #[serde(default)]
    pub kind: RolloutKind,
    #[serde(default = "default_kind")]
    pub context_kind: String,
    pub variations: Vec<WeightedVariation>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RolloutKind {
    #[default]
    Rollout,
    Experiment,
}

/// `weight` is a percentage; weights of one rollout should sum to 100.
#[derive(Debug, Clone, Deserialize)]
pub struct WeightedVariation {
    pub variation: usize,
    pub weight: u32,
}

fn default_kind() -> String {
    DEFAULT_KIND.to_string()
}

fn enabled_by_default() -> bool {
    true
}

impl Clause {
    pub fn matches(&self, context: &Context) -> bool {
        // a clause on a kind the context lacks never matches, negated or not
        let Some(key) = context.key_for(&self.context_kind) else {
            return false;
        };

        let hit = self.values.iter().any(|v| match self.op {
            ClauseOp::In => key == v,
            ClauseOp::StartsWith => key.starts_with(v.as_str()),
            ClauseOp::EndsWith => key.ends_with(v.as_str()),
        });

        hit != self.negate
    }
}

impl FlagData {
    /// Every rollout the flag can serve, from its rules and its fallthrough.
    pub fn rollouts(&self) -> impl Iterator<Item = &Rollout> {
        self.rules
            .iter()
            .filter_map(|r| r.serve.rollout.as_ref())
            .chain(self.fallthrough.rollout.as_ref())
    }
}

impl RuleData {
    /// All clauses must match.
    pub fn matches(&self, context: &Context) -> bool {
        self.clauses.iter().all(|c| c.matches(context))
    }
}

// FLAG STORE

#[derive(Debug, Deserialize)]
struct FlagFile {
    #[serde(default)]
    flags: HashMap<String, FlagData>,
}

/// In-memory set of flag definitions the local evaluator reads from.
#[derive(Debug, Clone, Default)]
pub struct FlagStore {
    flags: HashMap<String, FlagData>,
}

impl FlagStore {
    pub fn from_json(json: &str) -> Result<Self> {
        let file: FlagFile = serde_json::from_str(json)
            .map_err(|e| Error::flag_store(format!("failed to parse flags: {}", e)))?;

        let mut flags = HashMap::with_capacity(file.flags.len());
        for (key, mut flag) in file.flags {
            validate_flag_key(&key)?;
            for rollout in flag.rollouts() {
                validate_rollout(&key, rollout)?;
            }
            flag.key = key.clone();
            flags.insert(key, flag);
        }

        Ok(Self { flags })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::flag_store(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn get(&self, key: &str) -> Option<&FlagData> {
        self.flags.get(key)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

// HELPER FUNCTIONS

// Validating the flag key
pub fn validate_flag_key(key: &str) -> std::result::Result<(), ValidationError> {
    if key.is_empty() {
        return Err(ValidationError::MissingField("flagKey"));
    }

    if key.len() > 256 {
        return Err(ValidationError::InvalidFlagKey(
            "too long (max: 256 characters)".to_string(),
        ));
    }

    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err(ValidationError::InvalidFlagKey(format!(
            "'{}' may only contain letters, numbers, '.', '_' and '-'",
            key
        )));
    }

    Ok(())
}

// Rollout weights are percentages: each at most 100, together at most 100
pub fn validate_rollout(flag_key: &str, rollout: &Rollout) -> std::result::Result<(), ValidationError> {
    let invalid = |message: String| ValidationError::InvalidRollout {
        flag: flag_key.to_string(),
        message,
    };

    if rollout.variations.is_empty() {
        return Err(invalid("rollout has no variations".to_string()));
    }

    let mut total = 0u32;
    for weighted in &rollout.variations {
        if weighted.weight > 100 {
            return Err(invalid(format!(
                "weight {} of variation {} is over 100",
                weighted.weight, weighted.variation
            )));
        }
        total += weighted.weight;
    }

    if total > 100 {
        return Err(invalid(format!("weights sum to {}, max is 100", total)));
    }

    Ok(())
}
