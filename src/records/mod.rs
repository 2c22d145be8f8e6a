use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::context::{CanonicalKey, Context};
use crate::error::ValidationError;
use crate::evaluation::{EvaluationReason, EvaluationRequest, EvaluationResult};

pub const SOURCE: &str = "LaunchDarkly";

/// A log record, tagged by its `event` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum EventRecord {
    #[serde(rename = "before_flag_evaluation")]
    Before(BeforeEvaluationRecord),
    #[serde(rename = "after_flag_evaluation")]
    After(AfterEvaluationRecord),
    #[serde(rename = "evaluation_result_summary")]
    Summary(SummaryRecord),
}

/// Identity of the evaluated context, without any attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRecord {
    pub kinds: Vec<String>,
    pub canonical_key: CanonicalKey,
    // raw key of the first kind, kept for consumers predating canonicalKey
    pub key: String,
}

impl From<&Context> for ContextRecord {
    fn from(context: &Context) -> Self {
        Self {
            kinds: context.sorted_kind_names(),
            canonical_key: context.canonical_key().clone(),
            key: context.first_key().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeforeEvaluationRecord {
    pub flag_key: String,
    pub default_value: bool,
    pub method: String,
    pub context: ContextRecord,
    pub timestamp: i64,
    pub source: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AfterEvaluationRecord {
    pub flag_key: String,
    pub value: bool,
    // serialized as null when the default was served
    pub variation_index: Option<usize>,
    pub default_value: bool,
    pub method: String,
    pub reason: EvaluationReason,
    pub context: ContextRecord,
    pub timestamp: i64,
    pub source: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRecord {
    pub source: &'static str,
    pub flag_key: String,
    pub value: bool,
    pub project: String,
}

impl From<BeforeEvaluationRecord> for EventRecord {
    fn from(record: BeforeEvaluationRecord) -> Self {
        EventRecord::Before(record)
    }
}

impl From<AfterEvaluationRecord> for EventRecord {
    fn from(record: AfterEvaluationRecord) -> Self {
        EventRecord::After(record)
    }
}

impl From<SummaryRecord> for EventRecord {
    fn from(record: SummaryRecord) -> Self {
        EventRecord::Summary(record)
    }
}

/// Record emitted just before the flag is evaluated.
pub fn build_before_record(
    request: &EvaluationRequest,
    now: DateTime<Utc>,
) -> Result<BeforeEvaluationRecord, ValidationError> {
    request.validate()?;

    Ok(BeforeEvaluationRecord {
        flag_key: request.flag_key.clone(),
        default_value: request.default_value,
        method: request.method.clone(),
        context: ContextRecord::from(&request.context),
        timestamp: now.timestamp_millis(),
        source: SOURCE,
    })
}

/// Record emitted once evaluation completes, whatever the outcome.
pub fn build_after_record(
    request: &EvaluationRequest,
    result: &EvaluationResult,
    now: DateTime<Utc>,
) -> Result<AfterEvaluationRecord, ValidationError> {
    request.validate()?;

    Ok(AfterEvaluationRecord {
        flag_key: request.flag_key.clone(),
        value: result.value,
        variation_index: result.variation_index,
        default_value: request.default_value,
        method: request.method.clone(),
        reason: result.reason.clone(),
        context: ContextRecord::from(&request.context),
        timestamp: now.timestamp_millis(),
        source: SOURCE,
    })
}

pub fn build_summary_record(
    request: &EvaluationRequest,
    result: &EvaluationResult,
    project: &str,
) -> Result<SummaryRecord, ValidationError> {
    request.validate()?;
    if project.is_empty() {
        return Err(ValidationError::MissingField("project"));
    }

    Ok(SummaryRecord {
        source: SOURCE,
        flag_key: request.flag_key.clone(),
        value: result.value,
        project: project.to_string(),
    })
}
