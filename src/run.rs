use chrono::Utc;
use std::io::Write;
use tracing::{debug, info};

use crate::emit::JsonLineWriter;
use crate::error::{Result, ValidationError};
use crate::evaluation::{EvaluationRequest, EvaluationResult, LocalEvaluator};
use crate::hooks::evaluate_with_hooks;
use crate::records::{build_after_record, build_before_record, build_summary_record};

/// Evaluate one flag and write the before, after and summary records.
pub fn run<W: Write>(
    request: &EvaluationRequest,
    project: &str,
    evaluator: &LocalEvaluator,
    writer: &JsonLineWriter<W>,
) -> Result<EvaluationResult> {
    // fail before anything is written
    request.validate()?;
    if project.is_empty() {
        return Err(ValidationError::MissingField("project").into());
    }

    debug!(
        flag_key = %request.flag_key,
        canonical_key = %request.context.canonical_key(),
        multi_kind = request.context.is_multiple(),
        "evaluating flag"
    );

    let result = evaluate_with_hooks(
        request,
        |req| evaluator.bool_variation(req),
        |req| writer.emit(build_before_record(req, Utc::now())?),
        |req, result| writer.emit(build_after_record(req, result, Utc::now())?),
    )?;

    writer.emit(build_summary_record(request, &result, project)?)?;

    info!(
        flag_key = %request.flag_key,
        value = result.value,
        default_served = result.is_default(),
        "evaluation complete"
    );

    Ok(result)
}
