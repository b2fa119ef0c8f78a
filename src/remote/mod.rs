// SPDX-License-Identifier: MIT
//! Remote execution adapter — evaluates plain-JS submissions at an external
//! sandbox provider instead of the in-process runtime.
//!
//! Flow: pick the submission's script, sanitize it, wrap it with the embedded
//! test runner, ship it to the provider, then cut the result JSON out of the
//! process output between markers. Every failure mode folds into a
//! well-formed `EvaluationResult` keyed by a reserved synthetic id, so the
//! caller renders a normal result instead of handling transport errors.

pub mod client;
pub mod harness;
pub mod sanitize;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::SandboxConfig;
use crate::engine::model::{
    Diagnostics, ErrorType, EvaluationResult, Submission, TestDefinition,
};
use crate::engine::ExecutionBackend;
use client::{SandboxClient, SandboxError};

/// Reserved id for provider-reported execution failures (non-zero exit or an
/// error field). Shared with the in-process engine.
pub use crate::engine::EXECUTION_ERROR_ID;
/// Reserved id: output carried no result markers.
pub const RUNTIME_ERROR_ID: &str = "_runtime_error";
/// Reserved id: marker content wasn't valid result JSON.
pub const PARSE_ERROR_ID: &str = "_parse_error";
/// Reserved id: the call to the provider itself failed.
pub const API_ERROR_ID: &str = "_api_error";

/// Script selection order. First hit wins; falling back to any `.js` file
/// covers free-form submissions.
const PREFERRED_SCRIPTS: [&str; 3] = ["main.js", "script.js", "index.js"];

pub struct RemoteBackend {
    client: SandboxClient,
}

impl RemoteBackend {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            client: SandboxClient::new(config),
        }
    }
}

#[async_trait]
impl ExecutionBackend for RemoteBackend {
    async fn evaluate(
        &self,
        files: &Submission,
        tests: &[TestDefinition],
    ) -> EvaluationResult {
        let user_code = match select_script(files) {
            Some(code) => code,
            None => return EvaluationResult::malformed_request("No JavaScript code provided"),
        };

        if let Err(violation) = sanitize::sanitize(user_code) {
            warn!(%violation, "submission rejected by sanitizer");
            return EvaluationResult::whole_call_failure(
                tests,
                sanitize::SECURITY_ERROR_ID,
                violation.to_string(),
                Diagnostics {
                    error_type: Some(ErrorType::Syntax),
                    stderr: Some(violation.to_string()),
                    ..Diagnostics::default()
                },
            );
        }

        let wrapper = match harness::build_wrapper(user_code, tests) {
            Ok(wrapper) => wrapper,
            Err(e) => {
                return EvaluationResult::whole_call_failure(
                    tests,
                    EXECUTION_ERROR_ID,
                    "Code evaluation failed",
                    Diagnostics {
                        error_type: Some(ErrorType::Runtime),
                        stderr: Some(format!("failed to build test wrapper: {e}")),
                        ..Diagnostics::default()
                    },
                );
            }
        };

        let response = match self.client.execute(&wrapper).await {
            Ok(response) => response,
            Err(e) => {
                let message = match &e {
                    SandboxError::Credentials => {
                        "Sandbox service not configured. Please contact administrator."
                    }
                    _ => "Code evaluation failed",
                };
                warn!(error = %e, "sandbox call failed");
                return EvaluationResult::whole_call_failure(
                    tests,
                    API_ERROR_ID,
                    message,
                    Diagnostics {
                        error_type: Some(ErrorType::Runtime),
                        stderr: Some(e.to_string()),
                        ..Diagnostics::default()
                    },
                );
            }
        };

        if response.status_code != 0 || response.error.is_some() {
            let stderr = response
                .error
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| response.output.clone());
            let mut result = EvaluationResult::whole_call_failure(
                tests,
                EXECUTION_ERROR_ID,
                "Code execution failed",
                Diagnostics {
                    error_type: Some(ErrorType::Runtime),
                    stderr: Some(if stderr.is_empty() {
                        "Unknown execution error".to_string()
                    } else {
                        stderr
                    }),
                    stack_trace: extract_stack_trace(&response.output),
                    console_output: nonblank_lines(&response.output),
                    dom_state: None,
                },
            );
            result.execution_time = response.cpu_time;
            result.memory = response.memory;
            return result;
        }

        parse_output(&response.output, tests, response.cpu_time, response.memory)
    }
}

fn select_script(files: &Submission) -> Option<&str> {
    // An empty conventional entry falls through to the next candidate
    // instead of shadowing a usable one.
    PREFERRED_SCRIPTS
        .iter()
        .find_map(|name| files.get(*name).filter(|s| !s.trim().is_empty()))
        .or_else(|| {
            files
                .iter()
                .find(|(path, source)| path.ends_with(".js") && !source.trim().is_empty())
                .map(|(_, source)| source)
        })
        .map(String::as_str)
}

/// Cut the result JSON out of the process output and finish it: console
/// back-fill for failed tests that captured nothing themselves, plus the
/// provider's execution metadata.
fn parse_output(
    output: &str,
    tests: &[TestDefinition],
    cpu_time: Option<String>,
    memory: Option<String>,
) -> EvaluationResult {
    let Some((before, rest)) = output.split_once(harness::RESULTS_MARKER) else {
        return with_metadata(
            EvaluationResult::whole_call_failure(
                tests,
                RUNTIME_ERROR_ID,
                "Tests did not complete successfully",
                Diagnostics {
                    error_type: Some(ErrorType::Runtime),
                    stderr: Some(
                        "Test execution did not complete. Check your code for errors.".into(),
                    ),
                    console_output: nonblank_lines(output),
                    ..Diagnostics::default()
                },
            ),
            cpu_time,
            memory,
        );
    };
    let results_json = rest
        .split_once(harness::RESULTS_END_MARKER)
        .map(|(json, _)| json)
        .unwrap_or(rest)
        .trim();

    let mut result: EvaluationResult = match serde_json::from_str(results_json) {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "result JSON did not parse");
            return EvaluationResult::whole_call_failure(
                tests,
                PARSE_ERROR_ID,
                "Failed to parse test results",
                Diagnostics {
                    error_type: Some(ErrorType::Runtime),
                    stderr: Some("Failed to parse test results JSON".into()),
                    console_output: vec![results_json.to_string()],
                    ..Diagnostics::default()
                },
            );
        }
    };

    // Tests that failed without capturing output still get the run's console
    // lines, so there's always something to show the student.
    let console_output = nonblank_lines(before);
    for id in &result.failed_ids {
        if let Some(details) = result.error_details.get_mut(id) {
            if details.console_output.is_empty() {
                details.console_output = console_output.clone();
            }
        }
    }

    info!(
        passed = result.passed_ids.len(),
        failed = result.failed_ids.len(),
        "remote evaluation complete"
    );
    with_metadata(result, cpu_time, memory)
}

fn with_metadata(
    mut result: EvaluationResult,
    cpu_time: Option<String>,
    memory: Option<String>,
) -> EvaluationResult {
    result.execution_time = cpu_time;
    result.memory = memory;
    result
}

fn nonblank_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Pull `at ...` frames out of interpreter output.
fn extract_stack_trace(output: &str) -> Option<String> {
    let frames: Vec<&str> = output
        .lines()
        .filter(|line| line.contains("at ") && (line.contains('(') || line.contains(':')))
        .collect();
    if frames.is_empty() {
        None
    } else {
        Some(frames.join("\n"))
    }
}
