// SPDX-License-Identifier: MIT
//! Test-evaluation engine.
//!
//! Pipeline: assemble the submission into one document, boot a runtime host
//! around it, let the document settle, run the probes sequentially against
//! the shared live DOM, then aggregate verdicts into an `EvaluationResult`.
//!
//! `ExecutionBackend` is the seam between transports and execution: the
//! in-process backend here and the remote sandbox adapter implement the same
//! contract, so routes and the batch checker don't care which one they get.

pub mod aggregate;
pub mod assembler;
pub mod dom;
pub mod model;
mod probe;
pub mod runtime;

use std::time::Instant;

use async_trait::async_trait;
use tracing::info;

use crate::config::EngineConfig;
use model::{Diagnostics, ErrorType, EvaluationResult, Submission, TestDefinition};
use runtime::RuntimeHost;

/// Reserved id for failures of the execution machinery itself.
pub const EXECUTION_ERROR_ID: &str = "_execution_error";

/// Anything that can evaluate a submission against a set of tests.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn evaluate(
        &self,
        files: &Submission,
        tests: &[TestDefinition],
    ) -> EvaluationResult;
}

// ─── In-process backend ───────────────────────────────────────────────────────

/// The default backend: submissions execute inside an embedded JS context in
/// this process, no network involved.
pub struct InProcessBackend {
    config: EngineConfig,
}

impl InProcessBackend {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ExecutionBackend for InProcessBackend {
    async fn evaluate(
        &self,
        files: &Submission,
        tests: &[TestDefinition],
    ) -> EvaluationResult {
        if tests.is_empty() {
            return EvaluationResult::empty();
        }
        let started = Instant::now();

        let document = assembler::assemble(files);
        let host = match RuntimeHost::launch(document, &self.config).await {
            Ok(host) => host,
            Err(e) => {
                return EvaluationResult::whole_call_failure(
                    tests,
                    EXECUTION_ERROR_ID,
                    format!("Error: {e}"),
                    Diagnostics {
                        error_type: Some(ErrorType::Runtime),
                        stderr: Some(e.to_string()),
                        ..Diagnostics::default()
                    },
                );
            }
        };

        // Give deferred init a chance before probing: wait the settle window,
        // then flush the zero-and-short-delay timers queued so far.
        tokio::time::sleep(std::time::Duration::from_millis(self.config.settle_ms)).await;
        let _ = host.settle(self.config.settle_ms).await;

        let mut verdicts = Vec::with_capacity(tests.len());
        for test in tests {
            verdicts.push(host.run_probe(test.clone()).await);
        }

        let report = host.finish().await;
        let result =
            aggregate::aggregate(tests, verdicts, &report.runtime_errors, &report.console);
        info!(
            tests = tests.len(),
            passed = result.passed_ids.len(),
            failed = result.failed_ids.len(),
            runtime_errors = report.runtime_errors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "evaluation complete"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn submission(entries: &[(&str, &str)]) -> Submission {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>()
    }

    fn test_def(id: &str, code: &str) -> TestDefinition {
        TestDefinition {
            id: id.into(),
            code: code.into(),
            label: String::new(),
            success_message: None,
            failure_message: None,
        }
    }

    #[tokio::test]
    async fn no_tests_yields_vacuous_pass() {
        let backend = InProcessBackend::new(EngineConfig::default());
        let result = backend.evaluate(&submission(&[]), &[]).await;
        assert!(result.passed);
        assert!(result.passed_ids.is_empty());
    }

    #[tokio::test]
    async fn mixed_verdicts_partition_cleanly() {
        let backend = InProcessBackend::new(EngineConfig::default());
        let files = submission(&[(
            "index.html",
            "<html><head></head><body><h1>Title</h1></body></html>",
        )]);
        let tests = vec![
            test_def("has-h1", "document.querySelector('h1') !== null"),
            test_def("has-h2", "document.querySelector('h2') !== null"),
        ];
        let result = backend.evaluate(&files, &tests).await;
        assert!(!result.passed);
        assert_eq!(result.passed_ids, vec!["has-h1"]);
        assert_eq!(result.failed_ids, vec!["has-h2"]);
        assert!(result.messages["has-h2"].contains("h2"));
    }
}
