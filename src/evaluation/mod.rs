pub mod flag;

use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::ValidationError;

pub use flag::{validate_flag_key, FlagData, FlagStore, RolloutKind, VariationOrRollout};

/// Method name reported for boolean evaluations.
pub const BOOL_VARIATION: &str = "boolVariation";

// One flag evaluation as requested by the caller
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub flag_key: String,
    pub default_value: bool,
    pub method: String,
    pub context: Context,
}

impl EvaluationRequest {
    pub fn new(flag_key: impl Into<String>, context: Context, default_value: bool) -> Self {
        Self {
            flag_key: flag_key.into(),
            default_value,
            method: BOOL_VARIATION.to_string(),
            context,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_flag_key(&self.flag_key)?;
        if self.method.is_empty() {
            return Err(ValidationError::MissingField("method"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonKind {
    Off,
    Fallthrough,
    TargetMatch,
    RuleMatch,
    PrerequisiteFailed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ClientNotReady,
    FlagNotFound,
    MalformedFlag,
    UserNotSpecified,
    WrongType,
    Exception,
}

/// Why a value was served. Only the fields relevant to `kind` are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReason {
    pub kind: ReasonKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_experiment: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prerequisite_key: Option<String>,
}

impl EvaluationReason {
    fn of(kind: ReasonKind) -> Self {
        Self {
            kind,
            rule_id: None,
            rule_index: None,
            in_experiment: None,
            error_kind: None,
            prerequisite_key: None,
        }
    }

    pub fn off() -> Self {
        Self::of(ReasonKind::Off)
    }

    pub fn target_match() -> Self {
        Self::of(ReasonKind::TargetMatch)
    }

    pub fn fallthrough(in_experiment: bool) -> Self {
        Self {
            in_experiment: in_experiment.then_some(true),
            ..Self::of(ReasonKind::Fallthrough)
        }
    }

    pub fn rule_match(rule_index: usize, rule_id: impl Into<String>, in_experiment: bool) -> Self {
        Self {
            rule_id: Some(rule_id.into()),
            rule_index: Some(rule_index),
            in_experiment: in_experiment.then_some(true),
            ..Self::of(ReasonKind::RuleMatch)
        }
    }

    pub fn prerequisite_failed(prerequisite_key: impl Into<String>) -> Self {
        Self {
            prerequisite_key: Some(prerequisite_key.into()),
            ..Self::of(ReasonKind::PrerequisiteFailed)
        }
    }

    pub fn error(error_kind: ErrorKind) -> Self {
        Self {
            error_kind: Some(error_kind),
            ..Self::of(ReasonKind::Error)
        }
    }
}

/// What the evaluator reports back. No variation index means the default
/// value was served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationResult {
    pub value: bool,
    pub variation_index: Option<usize>,
    pub reason: EvaluationReason,
}

impl EvaluationResult {
    pub fn default_value(request: &EvaluationRequest, reason: EvaluationReason) -> Self {
        Self {
            value: request.default_value,
            variation_index: None,
            reason,
        }
    }

    pub fn is_default(&self) -> bool {
        self.variation_index.is_none()
    }
}

// Variation chosen by the flag logic, before its value is looked up
#[derive(Debug, Clone, PartialEq, Eq)]
struct Detail {
    variation_index: Option<usize>,
    reason: EvaluationReason,
}

impl Detail {
    fn off(flag: &FlagData, reason: EvaluationReason) -> Self {
        Self {
            variation_index: flag.off_variation,
            reason,
        }
    }
}

/// In-process evaluator over a [`FlagStore`]. When offline it serves the
/// default for every flag, the way a client that cannot reach its flag
/// service does.
#[derive(Debug, Clone, Default)]
pub struct LocalEvaluator {
    store: FlagStore,
    offline: bool,
}

impl LocalEvaluator {
    pub fn new(store: FlagStore) -> Self {
        Self {
            store,
            offline: false,
        }
    }

    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn bool_variation(&self, request: &EvaluationRequest) -> EvaluationResult {
        if self.offline {
            warn!(flag_key = %request.flag_key, "flag service unreachable, serving default value");
            return EvaluationResult::default_value(
                request,
                EvaluationReason::error(ErrorKind::ClientNotReady),
            );
        }

        let Some(flag) = self.store.get(&request.flag_key) else {
            warn!(flag_key = %request.flag_key, "unknown flag, serving default value");
            return EvaluationResult::default_value(
                request,
                EvaluationReason::error(ErrorKind::FlagNotFound),
            );
        };

        let mut visited = vec![flag.key.clone()];
        let detail = match evaluate_flag(flag, &request.context, &self.store, &mut visited) {
            Ok(detail) => detail,
            Err(kind) => {
                warn!(flag_key = %request.flag_key, error_kind = ?kind, "flag could not be evaluated");
                return EvaluationResult::default_value(request, EvaluationReason::error(kind));
            }
        };

        let Some(index) = detail.variation_index else {
            return EvaluationResult::default_value(request, detail.reason);
        };

        match flag.variations.get(index) {
            Some(serde_json::Value::Bool(value)) => {
                debug!(flag_key = %request.flag_key, variation = index, "flag evaluated");
                EvaluationResult {
                    value: *value,
                    variation_index: Some(index),
                    reason: detail.reason,
                }
            }
            Some(_) => EvaluationResult::default_value(
                request,
                EvaluationReason::error(ErrorKind::WrongType),
            ),
            None => EvaluationResult::default_value(
                request,
                EvaluationReason::error(ErrorKind::MalformedFlag),
            ),
        }
    }
}

/// Evaluate a flag for a context: off check, prerequisites, individual
/// targets, rules in declared order, then the fallthrough.
fn evaluate_flag(
    flag: &FlagData,
    context: &Context,
    store: &FlagStore,
    visited: &mut Vec<String>,
) -> Result<Detail, ErrorKind> {
    // Step 1: If flag is off, serve the off variation
    if !flag.on {
        return Ok(Detail::off(flag, EvaluationReason::off()));
    }

    // Step 2: Every prerequisite must be on and serve its expected variation
    for prereq in &flag.prerequisites {
        if visited.contains(&prereq.key) {
            return Err(ErrorKind::MalformedFlag);
        }

        let Some(prereq_flag) = store.get(&prereq.key) else {
            return Ok(Detail::off(
                flag,
                EvaluationReason::prerequisite_failed(&prereq.key),
            ));
        };

        visited.push(prereq.key.clone());
        let prereq_detail = evaluate_flag(prereq_flag, context, store, visited)?;
        visited.pop();

        if !prereq_flag.on || prereq_detail.variation_index != Some(prereq.variation) {
            return Ok(Detail::off(
                flag,
                EvaluationReason::prerequisite_failed(&prereq.key),
            ));
        }
    }

    // Step 3: Individual targets
    for target in &flag.targets {
        if let Some(key) = context.key_for(&target.context_kind) {
            if target.values.iter().any(|v| v == key) {
                return Ok(Detail {
                    variation_index: Some(target.variation),
                    reason: EvaluationReason::target_match(),
                });
            }
        }
    }

    // Step 4: Rules, first match wins
    for (index, rule) in flag.rules.iter().enumerate() {
        if !rule.enabled {
            continue;
        }
        if rule.matches(context) {
            let (variation, in_experiment) = resolve(&rule.serve, &flag.key, context)?;
            return Ok(Detail {
                variation_index: Some(variation),
                reason: EvaluationReason::rule_match(index, &rule.id, in_experiment),
            });
        }
    }

    // Step 5: Fallthrough
    let (variation, in_experiment) = resolve(&flag.fallthrough, &flag.key, context)?;
    Ok(Detail {
        variation_index: Some(variation),
        reason: EvaluationReason::fallthrough(in_experiment),
    })
}

// Pick the variation a rule or fallthrough serves, and whether the context
// is part of an experiment
fn resolve(
    serve: &VariationOrRollout,
    flag_key: &str,
    context: &Context,
) -> Result<(usize, bool), ErrorKind> {
    if let Some(variation) = serve.variation {
        return Ok((variation, false));
    }

    let Some(rollout) = serve.rollout.as_ref() else {
        return Err(ErrorKind::MalformedFlag);
    };
    let Some(last) = rollout.variations.last() else {
        return Err(ErrorKind::MalformedFlag);
    };

    let context_key = context.key_for(&rollout.context_kind);
    let bucket = context_key.map(|key| bucket_for(flag_key, key)).unwrap_or(0);
    let in_experiment = rollout.kind == RolloutKind::Experiment && context_key.is_some();

    let mut cumulative = 0u32;
    for weighted in &rollout.variations {
        cumulative = cumulative
            .checked_add(weighted.weight)
            .ok_or(ErrorKind::MalformedFlag)?;
        if bucket < cumulative {
            return Ok((weighted.variation, in_experiment));
        }
    }

    // weights summing to less than 100 leave the remainder on the last variation
    Ok((last.variation, in_experiment))
}

/// Consistent hashing for percentage rollout
/// Ensures the same context always lands in the same bucket for a given flag.
/// `DefaultHasher` output is only fixed for a given Rust release, so buckets
/// can move after a toolchain upgrade.
fn bucket_for(flag_key: &str, context_key: &str) -> u32 {
    let mut hasher = DefaultHasher::new();
    format!("{}:{}", flag_key, context_key).hash(&mut hasher);
    let hash = hasher.finish();

    // Map hash to 0-99 range
    (hash % 100) as u32
}
