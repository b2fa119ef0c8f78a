// SPDX-License-Identifier: MIT
// Evaluation data model — the JSON shapes the UI and storage layers depend on.
//
// Field names are a compatibility surface: `passedIds`, `testLabels`,
// `errorDetails` and the diagnostics keys must serialize exactly as the
// frontend expects them, so everything here carries explicit serde renames.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A student submission: relative file path → source text.
///
/// At most one entry is recognized per role (`index.html`/`main.html` for
/// markup, `*.css` for styles, `*.js`/`*.ts` for behavior). Immutable once
/// handed to an evaluation.
pub type Submission = BTreeMap<String, String>;

/// Reserved id under which uncaught script errors from the submission's own
/// initialization are reported. Not a declared test id.
pub const RUNTIME_ERRORS_ID: &str = "_runtime_errors";

// ─── Test definitions ─────────────────────────────────────────────────────────

/// One test authored as part of a task.
///
/// `code` is either a bare boolean expression (legacy form) or a full function
/// body with an explicit `return` (current form). Detection is textual: the
/// presence of `return ` in the source selects the function-body form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDefinition {
    /// Unique within a task.
    pub id: String,
    /// Executable probe body, bound to `(document, window)`.
    pub code: String,
    /// Human-readable label shown in the test panel.
    #[serde(default)]
    pub label: String,
    /// Message stored for the test when it passes.
    #[serde(default, rename = "successMessage", skip_serializing_if = "Option::is_none")]
    pub success_message: Option<String>,
    /// Message stored for the test when it fails.
    #[serde(default, rename = "failureMessage", skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

impl TestDefinition {
    /// Label to display: the authored label, or the id when none was given.
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }
}

// ─── Verdicts ─────────────────────────────────────────────────────────────────

/// Classification of a non-passing verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    /// Code failed to compile or was rejected by sanitization.
    Syntax,
    /// An exception was thrown, or the sandboxed process crashed.
    Runtime,
    /// The probe ran to completion and evaluated to a failing result.
    Assertion,
}

/// Diagnostic detail attached to a non-passing test.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    #[serde(rename = "errorType", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
    /// Primary failure text (exception message or assertion explanation).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(rename = "stackTrace", skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    /// Truncated snapshot of the document body at failure time.
    #[serde(rename = "domState", skip_serializing_if = "Option::is_none")]
    pub dom_state: Option<String>,
    /// Console lines produced between this probe's start and the next.
    #[serde(rename = "consoleOutput", default, skip_serializing_if = "Vec::is_empty")]
    pub console_output: Vec<String>,
}

/// Outcome of one probe. Never constructed for a test that wasn't declared.
#[derive(Debug, Clone)]
pub enum Verdict {
    Pass {
        message: String,
    },
    Fail {
        message: String,
        diagnostics: Diagnostics,
    },
    Error {
        message: String,
        diagnostics: Diagnostics,
    },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Verdict::Pass { message }
            | Verdict::Fail { message, .. }
            | Verdict::Error { message, .. } => message,
        }
    }

    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            Verdict::Pass { .. } => None,
            Verdict::Fail { diagnostics, .. } | Verdict::Error { diagnostics, .. } => {
                Some(diagnostics)
            }
        }
    }
}

// ─── Aggregated result ────────────────────────────────────────────────────────

/// The caller-facing outcome of evaluating all probes against one submission.
///
/// Invariants: `passed_ids ∪ failed_ids` equals the set of declared test ids,
/// the two are disjoint, and `passed == failed_ids.is_empty()`. Synthetic
/// entries (`_runtime_errors`, `_security_error`, …) appear in `messages` and
/// `error_details` only, never in the id partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub passed: bool,
    #[serde(rename = "passedIds")]
    pub passed_ids: Vec<String>,
    #[serde(rename = "failedIds")]
    pub failed_ids: Vec<String>,
    pub messages: BTreeMap<String, String>,
    #[serde(rename = "testLabels")]
    pub test_labels: BTreeMap<String, String>,
    #[serde(rename = "errorDetails", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub error_details: BTreeMap<String, Diagnostics>,
    /// Remote-path execution metadata; informational only.
    #[serde(rename = "executionTime", skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl EvaluationResult {
    pub fn empty() -> Self {
        Self {
            passed: true,
            passed_ids: Vec::new(),
            failed_ids: Vec::new(),
            messages: BTreeMap::new(),
            test_labels: BTreeMap::new(),
            error_details: BTreeMap::new(),
            execution_time: None,
            memory: None,
        }
    }

    /// A well-formed failure result carrying one synthetic diagnostic entry
    /// under `key` and every declared test id in `failed_ids`.
    ///
    /// Used for whole-call failures (sanitizer rejection, sandbox timeout,
    /// missing output markers) where no per-test verdicts exist.
    pub fn whole_call_failure(
        tests: &[TestDefinition],
        key: &str,
        message: impl Into<String>,
        diagnostics: Diagnostics,
    ) -> Self {
        let message = message.into();
        let mut result = Self::empty();
        result.passed = false;
        result.failed_ids = tests.iter().map(|t| t.id.clone()).collect();
        for test in tests {
            result
                .test_labels
                .insert(test.id.clone(), test.display_label().to_string());
        }
        result.messages.insert(key.to_string(), message);
        result.error_details.insert(key.to_string(), diagnostics);
        result
    }

    /// Degenerate result for a malformed top-level request. The only case in
    /// which the caller receives a result keyed `"error"`.
    pub fn malformed_request(detail: &str) -> Self {
        let mut result = Self::empty();
        result.passed = false;
        result
            .messages
            .insert("error".to_string(), detail.to_string());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_serialize_with_wire_names() {
        let diag = Diagnostics {
            error_type: Some(ErrorType::Runtime),
            stderr: Some("boom".into()),
            stack_trace: Some("at foo".into()),
            dom_state: Some("<p></p>".into()),
            console_output: vec!["[LOG] x".into()],
        };
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["errorType"], "runtime");
        assert_eq!(json["stackTrace"], "at foo");
        assert_eq!(json["domState"], "<p></p>");
        assert_eq!(json["consoleOutput"][0], "[LOG] x");
    }

    #[test]
    fn result_serializes_camel_case_ids() {
        let mut result = EvaluationResult::empty();
        result.passed_ids.push("h1".into());
        result.test_labels.insert("h1".into(), "Heading".into());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["passedIds"][0], "h1");
        assert_eq!(json["testLabels"]["h1"], "Heading");
        assert!(json.get("errorDetails").is_none());
        assert!(json.get("executionTime").is_none());
    }

    #[test]
    fn whole_call_failure_fails_every_declared_test() {
        let tests = vec![
            TestDefinition {
                id: "a".into(),
                code: "true".into(),
                label: String::new(),
                success_message: None,
                failure_message: None,
            },
            TestDefinition {
                id: "b".into(),
                code: "true".into(),
                label: "B".into(),
                success_message: None,
                failure_message: None,
            },
        ];
        let result = EvaluationResult::whole_call_failure(
            &tests,
            "_security_error",
            "rejected",
            Diagnostics::default(),
        );
        assert!(!result.passed);
        assert_eq!(result.failed_ids, vec!["a", "b"]);
        assert!(result.passed_ids.is_empty());
        assert_eq!(result.test_labels["a"], "a");
        assert_eq!(result.test_labels["b"], "B");
        assert!(result.messages.contains_key("_security_error"));
    }
}
