//! Integration tests for the in-process evaluation engine: the full
//! assemble → runtime → probe → aggregate pipeline against real submissions.

use std::collections::{BTreeMap, BTreeSet};

use graded::config::EngineConfig;
use graded::engine::model::{ErrorType, Submission, TestDefinition};
use graded::engine::{ExecutionBackend, InProcessBackend};
use proptest::prelude::*;

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

fn backend() -> InProcessBackend {
    InProcessBackend::new(EngineConfig::default())
}

#[tokio::test]
async fn heading_present_passes() {
    let files = submission(&[("index.html", "<h1>Hi</h1>")]);
    let tests = vec![test_def("h1", "document.querySelector('h1') !== null")];
    let result = backend().evaluate(&files, &tests).await;
    assert!(result.passed);
    assert_eq!(result.passed_ids, vec!["h1"]);
    assert!(result.failed_ids.is_empty());
}

#[tokio::test]
async fn missing_heading_fails_with_authored_message() {
    let files = submission(&[("index.html", "<p></p>")]);
    let mut test = test_def("h1", "document.querySelector('h1') !== null");
    test.failure_message = Some("Add an h1".into());
    let result = backend().evaluate(&files, &[test]).await;
    assert!(!result.passed);
    assert_eq!(result.failed_ids, vec!["h1"]);
    assert_eq!(result.messages["h1"], "Add an h1");
    let details = &result.error_details["h1"];
    assert_eq!(details.error_type, Some(ErrorType::Assertion));
}

#[tokio::test]
async fn throwing_probe_classifies_as_runtime_error() {
    let files = submission(&[("index.html", "<p></p>")]);
    let tests = vec![test_def("boom", "throw new Error('boom')")];
    let result = backend().evaluate(&files, &tests).await;
    assert!(!result.passed);
    assert_eq!(result.failed_ids, vec!["boom"]);
    assert!(result.messages["boom"].contains("boom"));
    let details = &result.error_details["boom"];
    assert_eq!(details.error_type, Some(ErrorType::Runtime));
    assert!(details.stderr.as_deref().unwrap_or_default().contains("boom"));
}

#[tokio::test]
async fn pure_js_submission_uses_fallback_document() {
    let files = submission(&[(
        "app.js",
        "document.getElementById('root').textContent = 'hello';",
    )]);
    let tests = vec![test_def(
        "root-text",
        "document.getElementById('root').textContent === 'hello'",
    )];
    let result = backend().evaluate(&files, &tests).await;
    assert!(result.passed, "got {result:?}");
    assert_eq!(result.passed_ids, vec!["root-text"]);
}

#[tokio::test]
async fn composite_failure_collapses_to_the_declared_id() {
    let files = submission(&[("index.html", "<p></p>")]);
    let tests = vec![test_def(
        "combo",
        "return {passed: false, passedIds: ['x'], failedIds: ['y']};",
    )];
    let result = backend().evaluate(&files, &tests).await;
    assert!(!result.passed);
    assert_eq!(result.failed_ids, vec!["combo"]);
    assert!(result.passed_ids.is_empty());
    assert!(!result.failed_ids.contains(&"y".to_string()));
}

#[tokio::test]
async fn composite_pass_uses_success_message() {
    let files = submission(&[("index.html", "<p></p>")]);
    let mut test = test_def("combo", "return {passed: true};");
    test.success_message = Some("well done".into());
    let result = backend().evaluate(&files, &[test]).await;
    assert!(result.passed);
    assert_eq!(result.messages["combo"], "well done");
}

#[tokio::test]
async fn heuristic_message_names_the_missing_selector() {
    let files = submission(&[("index.html", "<div class=\"card\"><p>x</p></div>")]);
    let tests = vec![test_def("h2", "document.querySelector('h2') !== null")];
    let result = backend().evaluate(&files, &tests).await;
    assert!(!result.passed);
    let message = &result.messages["h2"];
    assert!(message.contains("h2"), "message was: {message}");
}

#[tokio::test]
async fn console_lines_attach_to_the_probe_that_emitted_them() {
    let files = submission(&[("index.html", "<p></p>")]);
    let tests = vec![
        test_def("first", "console.log('from first'); return false;"),
        test_def("second", "console.log('from second'); return false;"),
    ];
    let result = backend().evaluate(&files, &tests).await;
    let second = &result.error_details["second"].console_output;
    assert_eq!(second, &vec!["[LOG] from second".to_string()]);
    let first = &result.error_details["first"].console_output;
    assert_eq!(first, &vec!["[LOG] from first".to_string()]);
}

#[tokio::test]
async fn submission_script_errors_surface_as_runtime_errors_entry() {
    let files = submission(&[
        ("index.html", "<h1>t</h1>"),
        ("main.js", "console.log('before the crash'); undefinedFunction();"),
    ]);
    let tests = vec![test_def("h1", "document.querySelector('h1') !== null")];
    let result = backend().evaluate(&files, &tests).await;
    assert!(result.passed, "script errors alone don't fail tests");
    let entry = &result.messages["_runtime_errors"];
    assert!(entry.contains("main.js"), "entry was: {entry}");

    // The entry carries the run's console capture alongside the error text.
    let details = &result.error_details["_runtime_errors"];
    assert_eq!(details.stderr.as_deref(), Some(entry.as_str()));
    assert!(
        details
            .console_output
            .contains(&"[LOG] before the crash".to_string()),
        "console was: {:?}",
        details.console_output
    );
}

#[tokio::test]
async fn styles_are_injected_without_breaking_evaluation() {
    let files = submission(&[
        (
            "index.html",
            "<html><head></head><body><h1>t</h1></body></html>",
        ),
        ("styles.css", "h1 { color: rebeccapurple; }"),
    ]);
    let tests = vec![test_def("style", "document.querySelector('style') !== null")];
    let result = backend().evaluate(&files, &tests).await;
    assert!(result.passed, "got {result:?}");
}

#[tokio::test]
async fn evaluation_is_idempotent() {
    let files = submission(&[
        ("index.html", "<h1>t</h1>"),
        ("main.js", "document.querySelector('h1').id = 'title';"),
    ]);
    let tests = vec![
        test_def("h1", "document.querySelector('h1') !== null"),
        test_def("id", "document.getElementById('title') !== null"),
        test_def("h2", "document.querySelector('h2') !== null"),
    ];
    let first = backend().evaluate(&files, &tests).await;
    let second = backend().evaluate(&files, &tests).await;
    assert_eq!(first.passed_ids, second.passed_ids);
    assert_eq!(first.failed_ids, second.failed_ids);
    assert_eq!(first.passed, second.passed);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// For any mix of passing/failing/throwing probes, the id partition is
    /// disjoint, covers every declared id, and `passed` mirrors `failedIds`.
    #[test]
    fn partition_is_disjoint_and_total(outcomes in prop::collection::vec(0u8..3, 1..6)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let tests: Vec<TestDefinition> = outcomes
                .iter()
                .enumerate()
                .map(|(i, kind)| {
                    let code = match kind {
                        0 => "true",
                        1 => "false",
                        _ => "throw new Error('x')",
                    };
                    test_def(&format!("t{i}"), code)
                })
                .collect();
            let files = submission(&[("index.html", "<p></p>")]);
            let result = backend().evaluate(&files, &tests).await;

            let passed: BTreeSet<_> = result.passed_ids.iter().cloned().collect();
            let failed: BTreeSet<_> = result.failed_ids.iter().cloned().collect();
            let declared: BTreeSet<_> = tests.iter().map(|t| t.id.clone()).collect();

            prop_assert!(passed.is_disjoint(&failed));
            let union: BTreeSet<_> = passed.union(&failed).cloned().collect();
            prop_assert_eq!(union, declared);
            prop_assert_eq!(result.passed, result.failed_ids.is_empty());
            Ok(())
        })?;
    }
}
