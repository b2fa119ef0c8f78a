// SPDX-License-Identifier: MIT
//! Self-contained Node test runner for the remote path.
//!
//! The student's script and the serialized test definitions are embedded in
//! one program that runs every test, collects the same result shape the
//! in-process engine produces, and prints it between output markers so the
//! adapter can cut it out of arbitrary stdout noise.

use crate::engine::model::TestDefinition;

/// Start-of-results marker printed by the wrapper.
pub const RESULTS_MARKER: &str = "__SANDBOX_RESULTS__";
/// End-of-results marker.
pub const RESULTS_END_MARKER: &str = "__SANDBOX_RESULTS_END__";

/// Build the wrapper program.
///
/// Only fails if a test definition can't be serialized, which a well-formed
/// request never triggers.
pub fn build_wrapper(
    user_code: &str,
    tests: &[TestDefinition],
) -> Result<String, serde_json::Error> {
    let tests_json = serde_json::to_string(tests)?;
    Ok(format!(
        r#"// ===== USER CODE =====
{user_code}

// ===== TEST FRAMEWORK =====
const results = {{
  passed: true,
  passedIds: [],
  failedIds: [],
  messages: {{}},
  testLabels: {{}},
  errorDetails: {{}}
}};

const tests = {tests_json};

const consoleOutput = [];
const originalLog = console.log;
const originalError = console.error;
const originalWarn = console.warn;

console.log = (...args) => {{
  consoleOutput.push('[LOG] ' + args.map(a => String(a)).join(' '));
  originalLog.apply(console, args);
}};
console.error = (...args) => {{
  consoleOutput.push('[ERROR] ' + args.map(a => String(a)).join(' '));
  originalError.apply(console, args);
}};
console.warn = (...args) => {{
  consoleOutput.push('[WARN] ' + args.map(a => String(a)).join(' '));
  originalWarn.apply(console, args);
}};

for (const test of tests) {{
  results.testLabels[test.id] = test.label || test.id;
  const testConsoleStart = consoleOutput.length;
  try {{
    const hasReturn = test.code.trim().includes('return ');
    const testFn = hasReturn
      ? new Function(test.code)
      : new Function('return ' + test.code);
    const result = testFn();

    if (typeof result === 'object' && result !== null && 'passed' in result) {{
      if (result.passed) {{
        results.passedIds.push(test.id);
        results.messages[test.id] = test.successMessage || 'Test passed';
      }} else {{
        results.passed = false;
        results.failedIds.push(test.id);
        results.messages[test.id] = test.failureMessage || 'Test failed';
        results.errorDetails[test.id] = {{
          errorType: 'assertion',
          stderr: test.failureMessage || 'Assertion failed',
          consoleOutput: consoleOutput.slice(testConsoleStart)
        }};
      }}
    }} else if (result) {{
      results.passedIds.push(test.id);
      results.messages[test.id] = test.successMessage || 'Test passed';
    }} else {{
      results.passed = false;
      results.failedIds.push(test.id);
      results.messages[test.id] = test.failureMessage || 'Test failed';
      results.errorDetails[test.id] = {{
        errorType: 'assertion',
        stderr: test.failureMessage || 'Expected true but got false',
        consoleOutput: consoleOutput.slice(testConsoleStart)
      }};
    }}
  }} catch (error) {{
    results.passed = false;
    results.failedIds.push(test.id);
    results.messages[test.id] = 'Error: ' + error.message;
    results.errorDetails[test.id] = {{
      errorType: 'runtime',
      stderr: error.message,
      stackTrace: error.stack,
      consoleOutput: consoleOutput.slice(testConsoleStart)
    }};
  }}
}}

console.log('\n{results_marker}');
console.log(JSON.stringify(results, null, 2));
console.log('{results_end_marker}');
"#,
        results_marker = RESULTS_MARKER,
        results_end_marker = RESULTS_END_MARKER,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_def(id: &str, code: &str) -> TestDefinition {
        TestDefinition {
            id: id.into(),
            code: code.into(),
            label: String::new(),
            success_message: None,
            failure_message: None,
        }
    }

    #[test]
    fn wrapper_embeds_code_tests_and_markers() {
        let tests = vec![test_def("sum", "add(1, 2) === 3")];
        let wrapper = build_wrapper("function add(a, b) { return a + b; }", &tests).unwrap();
        assert!(wrapper.contains("function add(a, b)"));
        assert!(wrapper.contains(r#""id":"sum""#));
        assert!(wrapper.contains(RESULTS_MARKER));
        assert!(wrapper.contains(RESULTS_END_MARKER));
    }

    #[test]
    fn wrapper_serializes_optional_messages_only_when_present() {
        let mut t = test_def("a", "true");
        t.success_message = Some("nice".into());
        let wrapper = build_wrapper("", &[t]).unwrap();
        assert!(wrapper.contains(r#""successMessage":"nice""#));
        assert!(!wrapper.contains("failureMessage"));
    }
}
