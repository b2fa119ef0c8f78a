// SPDX-License-Identifier: MIT
//! Probe execution and verdict classification.
//!
//! A probe's `code` is wrapped in a reporting envelope, evaluated inside the
//! runtime's context, and the JSON envelope is classified host-side. All
//! outcome shaping — composite `{passed}` objects, thrown errors, the
//! selector-heuristic failure text — lives here; the runtime worker only
//! shuttles jobs.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use boa_engine::{Context, Source};

use crate::config::EngineConfig;
use crate::engine::model::{Diagnostics, ErrorType, TestDefinition, Verdict};
use crate::engine::runtime;

// ─── Envelope ─────────────────────────────────────────────────────────────────

/// Result shape produced by the reporting wrapper, parsed from JSON.
#[derive(Debug, Deserialize)]
struct Envelope {
    kind: String,
    #[serde(default)]
    passed: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    stack: Option<String>,
}

/// Wrap the probe body so every outcome comes back as one JSON object.
///
/// Probes are bound to `(document, window)` like the originals they were
/// authored against. Legacy bare-expression probes (no `return ` in the
/// source) get an implicit `return (...)`.
fn wrap(test: &TestDefinition) -> String {
    let trimmed = test.code.trim();
    // Statement-form probes (explicit return, or a bare throw) run as the
    // function body directly; anything else is a legacy bare expression.
    let body = if trimmed.contains("return ") || trimmed.starts_with("throw") {
        test.code.clone()
    } else {
        format!("return ({trimmed});")
    };
    format!(
        r#"JSON.stringify((function () {{
  try {{
    var __r = (function (document, window) {{
{body}
    }})(document, window);
    if (__r !== null && typeof __r === 'object' && 'passed' in __r) {{
      return {{
        kind: 'composite',
        passed: !!__r.passed,
        message: typeof __r.message === 'string' ? __r.message : null
      }};
    }}
    return {{ kind: 'value', passed: !!__r }};
  }} catch (e) {{
    return {{
      kind: 'throw',
      message: String(e && e.message !== undefined ? e.message : e),
      stack: e && e.stack ? String(e.stack) : null
    }};
  }}
}})())"#
    )
}

// ─── Execution ────────────────────────────────────────────────────────────────

/// Run one probe against the live context and classify the outcome.
pub(crate) fn run_probe(
    ctx: &mut Context,
    test: &TestDefinition,
    config: &EngineConfig,
) -> Verdict {
    let watermark = runtime::console_watermark();
    let source = wrap(test);

    let raw = match ctx.eval(Source::from_bytes(source.as_bytes())) {
        Ok(value) => value
            .as_string()
            .map(|s| s.to_std_string_escaped())
            .unwrap_or_default(),
        // The wrapper itself failed to evaluate: the probe source didn't
        // parse, or a runtime limit fired outside the try block.
        Err(e) => {
            let display = e.to_string();
            let error_type = if display.contains("SyntaxError") {
                ErrorType::Syntax
            } else {
                ErrorType::Runtime
            };
            let message = runtime::error_message(&display).to_string();
            return Verdict::Error {
                message: format!("Error: {message}"),
                diagnostics: Diagnostics {
                    error_type: Some(error_type),
                    stderr: Some(message),
                    dom_state: snapshot(ctx, config.snapshot_max_chars),
                    console_output: runtime::console_slice(watermark),
                    ..Diagnostics::default()
                },
            };
        }
    };

    let envelope: Envelope = match serde_json::from_str(&raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            // The envelope always stringifies; this means the probe returned
            // something JSON.stringify refused (a cyclic composite, usually).
            let message = format!("test result could not be serialized: {e}");
            return Verdict::Error {
                message: format!("Error: {message}"),
                diagnostics: Diagnostics {
                    error_type: Some(ErrorType::Runtime),
                    stderr: Some(message),
                    dom_state: snapshot(ctx, config.snapshot_max_chars),
                    console_output: runtime::console_slice(watermark),
                    ..Diagnostics::default()
                },
            };
        }
    };

    let console_output = runtime::console_slice(watermark);

    match envelope.kind.as_str() {
        "throw" => {
            let message = envelope.message.unwrap_or_else(|| "unknown error".into());
            Verdict::Error {
                message: format!("Error: {message}"),
                diagnostics: Diagnostics {
                    error_type: Some(ErrorType::Runtime),
                    stderr: Some(message),
                    stack_trace: envelope.stack,
                    dom_state: snapshot(ctx, config.snapshot_max_chars),
                    console_output,
                },
            }
        }
        _ if envelope.passed => Verdict::Pass {
            message: test
                .success_message
                .clone()
                .unwrap_or_else(|| "Test passed".into()),
        },
        "composite" => {
            // Composite failures carry the author's own explanation; the
            // selector heuristic would only add noise.
            let message = envelope
                .message
                .or_else(|| test.failure_message.clone())
                .unwrap_or_else(|| "Test failed".into());
            Verdict::Fail {
                message: message.clone(),
                diagnostics: Diagnostics {
                    error_type: Some(ErrorType::Assertion),
                    stderr: Some(message),
                    dom_state: snapshot(ctx, config.snapshot_max_chars),
                    console_output,
                    ..Diagnostics::default()
                },
            }
        }
        _ => {
            let message = test
                .failure_message
                .clone()
                .unwrap_or_else(|| heuristic_failure_message(ctx, test));
            Verdict::Fail {
                message: message.clone(),
                diagnostics: Diagnostics {
                    error_type: Some(ErrorType::Assertion),
                    stderr: Some(message),
                    dom_state: snapshot(ctx, config.snapshot_max_chars),
                    console_output,
                    ..Diagnostics::default()
                },
            }
        }
    }
}

// ─── Failure-message heuristics ───────────────────────────────────────────────

static QUERY_SELECTOR_ALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"querySelectorAll\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());
static QUERY_SELECTOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"querySelector\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());
static GET_ELEMENT_BY_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"getElementById\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());

/// Build a specific failure message for a legacy probe that evaluated false.
///
/// The probe source is scanned for its first selector lookup; asking the live
/// DOM about that selector tells apart "the element isn't there" from "it's
/// there but the condition failed", which is the distinction students need.
fn heuristic_failure_message(ctx: &mut Context, test: &TestDefinition) -> String {
    if let Some(caps) = QUERY_SELECTOR_ALL.captures(&test.code) {
        let selector = &caps[1];
        return match element_count(ctx, selector) {
            Some(0) => format!(
                "No elements matching '{selector}' were found. {}",
                page_summary(ctx)
            ),
            Some(n) => format!(
                "Found {n} element(s) matching '{selector}', but the test condition was not met."
            ),
            None => format!("The condition on elements matching '{selector}' was not met."),
        };
    }
    if let Some(caps) = QUERY_SELECTOR.captures(&test.code) {
        let selector = &caps[1];
        return match element_count(ctx, selector) {
            Some(0) => format!(
                "No element matching '{selector}' was found. {}",
                page_summary(ctx)
            ),
            Some(_) => format!(
                "An element matching '{selector}' exists, but the test condition was not met."
            ),
            None => format!("The condition on '{selector}' was not met."),
        };
    }
    if let Some(caps) = GET_ELEMENT_BY_ID.captures(&test.code) {
        let id = &caps[1];
        return match element_count(ctx, &format!("#{id}")) {
            Some(0) => format!(
                "No element with id '{id}' was found. {}",
                page_summary(ctx)
            ),
            Some(_) => {
                format!("The element with id '{id}' exists, but the test condition was not met.")
            }
            None => format!("The condition on element '{id}' was not met."),
        };
    }
    "Test returned false.".to_string()
}

/// Count elements matching `selector` in the live DOM. `None` when the
/// selector engine can't handle the selector.
fn element_count(ctx: &mut Context, selector: &str) -> Option<u64> {
    let arg = serde_json::to_string(selector).ok()?;
    let source = format!("__gd_count({arg})");
    ctx.eval(Source::from_bytes(source.as_bytes()))
        .ok()?
        .as_number()
        .filter(|n| *n >= 0.0)
        .map(|n| n as u64)
}

/// One-line tag/id/class inventory of the current document body.
fn page_summary(ctx: &mut Context) -> String {
    ctx.eval(Source::from_bytes(b"__gd_summary()"))
        .ok()
        .and_then(|v| v.as_string().map(|s| s.to_std_string_escaped()))
        .map(|s| format!("Page contents: {s}"))
        .unwrap_or_default()
}

/// Serialized body markup, truncated for diagnostics.
pub(crate) fn snapshot(ctx: &mut Context, max_chars: usize) -> Option<String> {
    let raw = ctx
        .eval(Source::from_bytes(b"__gd_snapshot()"))
        .ok()?
        .as_string()
        .map(|s| s.to_std_string_escaped())?;
    if raw.chars().count() > max_chars {
        let truncated: String = raw.chars().take(max_chars).collect();
        Some(format!("{truncated}\n... (truncated)"))
    } else {
        Some(raw)
    }
}
