use crate::error::Result;
use crate::evaluation::{EvaluationRequest, EvaluationResult};

/// Run one evaluation between a before and an after callback.
///
/// `before` runs strictly before `evaluate` and `after` strictly after it,
/// on the calling thread. `evaluate` reports unreachability and flag errors
/// as a default-value result rather than failing, so `after` sees every
/// outcome. An error from `before` aborts the run before evaluation.
pub fn evaluate_with_hooks<E, B, A>(
    request: &EvaluationRequest,
    evaluate: E,
    before: B,
    after: A,
) -> Result<EvaluationResult>
where
    E: FnOnce(&EvaluationRequest) -> EvaluationResult,
    B: FnOnce(&EvaluationRequest) -> Result<()>,
    A: FnOnce(&EvaluationRequest, &EvaluationResult) -> Result<()>,
{
    before(request)?;
    let result = evaluate(request);
    after(request, &result)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::error::{Error, ValidationError};
    use crate::evaluation::EvaluationReason;
    use std::cell::RefCell;

    fn request() -> EvaluationRequest {
        EvaluationRequest::new("demo-flag", Context::single("user", "u").unwrap(), false)
    }

    #[test]
    fn test_callbacks_run_in_order() {
        let calls = RefCell::new(Vec::new());

        let result = evaluate_with_hooks(
            &request(),
            |_| {
                calls.borrow_mut().push("evaluate");
                EvaluationResult {
                    value: true,
                    variation_index: Some(0),
                    reason: EvaluationReason::fallthrough(false),
                }
            },
            |_| {
                calls.borrow_mut().push("before");
                Ok(())
            },
            |_, result| {
                assert_eq!(result.variation_index, Some(0));
                calls.borrow_mut().push("after");
                Ok(())
            },
        )
        .unwrap();

        assert!(result.value);
        assert_eq!(*calls.borrow(), vec!["before", "evaluate", "after"]);
    }

    #[test]
    fn test_failing_before_skips_evaluation() {
        let evaluated = RefCell::new(false);

        let outcome = evaluate_with_hooks(
            &request(),
            |req| {
                *evaluated.borrow_mut() = true;
                EvaluationResult::default_value(req, EvaluationReason::off())
            },
            |_| Err(ValidationError::MissingField("flagKey").into()),
            |_, _| Ok(()),
        );

        assert!(matches!(outcome, Err(Error::Validation(_))));
        assert!(!*evaluated.borrow());
    }
}
