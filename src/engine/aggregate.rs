// SPDX-License-Identifier: MIT
//! Verdict aggregation into the caller-facing result.

use crate::engine::model::{
    Diagnostics, ErrorType, EvaluationResult, TestDefinition, Verdict, RUNTIME_ERRORS_ID,
};

/// Fold per-test verdicts into one `EvaluationResult`.
///
/// `verdicts` is positionally aligned with `tests`. Uncaught errors from the
/// submission's own initialization go in as a synthetic `_runtime_errors`
/// entry — message and diagnostics only, never part of the id partition, and
/// they do not by themselves fail the evaluation. `console` is the whole
/// run's capture sequence; it rides along on that entry so script crashes
/// keep their surrounding log context.
pub fn aggregate(
    tests: &[TestDefinition],
    verdicts: Vec<Verdict>,
    runtime_errors: &[String],
    console: &[String],
) -> EvaluationResult {
    debug_assert_eq!(tests.len(), verdicts.len());

    let mut result = EvaluationResult::empty();
    for (test, verdict) in tests.iter().zip(verdicts) {
        result
            .test_labels
            .insert(test.id.clone(), test.display_label().to_string());
        result
            .messages
            .insert(test.id.clone(), verdict.message().to_string());
        if verdict.is_pass() {
            result.passed_ids.push(test.id.clone());
        } else {
            result.failed_ids.push(test.id.clone());
            if let Some(diagnostics) = verdict.diagnostics() {
                result
                    .error_details
                    .insert(test.id.clone(), diagnostics.clone());
            }
        }
    }
    result.passed = result.failed_ids.is_empty();

    if !runtime_errors.is_empty() {
        let joined = runtime_errors.join("\n");
        result
            .messages
            .insert(RUNTIME_ERRORS_ID.to_string(), joined.clone());
        result.error_details.insert(
            RUNTIME_ERRORS_ID.to_string(),
            Diagnostics {
                error_type: Some(ErrorType::Runtime),
                stderr: Some(joined),
                console_output: console.to_vec(),
                ..Diagnostics::default()
            },
        );
    }

    result
}
