// SPDX-License-Identifier: MIT
//! Runtime Host — an isolated DOM + script execution context.
//!
//! Each evaluation gets a dedicated worker thread owning a `boa_engine`
//! context. The assembled document is parsed on that thread, the bootstrap
//! harness rebuilds a live DOM inside the context, submission scripts run
//! sequentially, and then probe jobs arrive over a channel. Dropping the host
//! closes the channel and the worker exits, so teardown happens on every exit
//! path.
//!
//! Console capture is host-side: the harness's intercepted `console.*`
//! channels call a registered native that appends to a thread-local
//! append-only buffer. Probes slice it by `(start, end)` watermarks — one
//! shared sequence, not per-test streams.

use std::cell::RefCell;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use boa_engine::{js_string, Context, JsValue, NativeFunction, Source};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::config::EngineConfig;
use crate::engine::dom::{self, ParsedDocument};
use crate::engine::model::{Diagnostics, ErrorType, TestDefinition, Verdict};
use crate::engine::probe;

const HARNESS_TEMPLATE: &str = include_str!("harness.js");

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime bootstrap failed: {0}")]
    Bootstrap(String),
    #[error("runtime worker is gone")]
    WorkerGone,
}

// ─── Host-side capture buffers ────────────────────────────────────────────────

thread_local! {
    static CONSOLE_CAPTURE: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    static RUNTIME_ERRORS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Current length of the shared console buffer — the watermark probes record
/// before they start.
pub(crate) fn console_watermark() -> usize {
    CONSOLE_CAPTURE.with(|buf| buf.borrow().len())
}

/// Console lines appended at or after `start`.
pub(crate) fn console_slice(start: usize) -> Vec<String> {
    CONSOLE_CAPTURE.with(|buf| {
        let buf = buf.borrow();
        buf.get(start..).map(<[String]>::to_vec).unwrap_or_default()
    })
}

fn push_console(line: String) {
    trace!(target: "graded::console", "{line}");
    CONSOLE_CAPTURE.with(|buf| buf.borrow_mut().push(line));
}

fn push_runtime_error(entry: String) {
    debug!(target: "graded::runtime", error = %entry, "uncaught script error");
    RUNTIME_ERRORS.with(|buf| buf.borrow_mut().push(entry));
}

fn reset_buffers() {
    CONSOLE_CAPTURE.with(|buf| buf.borrow_mut().clear());
    RUNTIME_ERRORS.with(|buf| buf.borrow_mut().clear());
}

// ─── Worker protocol ──────────────────────────────────────────────────────────

enum Job {
    Probe {
        test: TestDefinition,
        resp: oneshot::Sender<Verdict>,
    },
    Settle {
        budget_ms: u64,
        resp: oneshot::Sender<()>,
    },
    Finish {
        resp: oneshot::Sender<RuntimeReport>,
    },
}

/// Final state collected when the runtime is torn down.
#[derive(Debug, Default)]
pub struct RuntimeReport {
    /// Uncaught errors from submission scripts and timer callbacks.
    pub runtime_errors: Vec<String>,
    /// The full console capture sequence for the whole evaluation.
    pub console: Vec<String>,
}

// ─── RuntimeHost ──────────────────────────────────────────────────────────────

/// Handle to one evaluation's execution context.
pub struct RuntimeHost {
    tx: Option<mpsc::Sender<Job>>,
    handle: Option<thread::JoinHandle<()>>,
    probe_timeout: Duration,
}

impl RuntimeHost {
    /// Spawn the worker, bootstrap the DOM, and run the submission's scripts.
    ///
    /// Returns once the document reached its initial state (or errors if the
    /// harness itself failed to evaluate — a host bug, not a submission bug).
    pub async fn launch(document: String, config: &EngineConfig) -> Result<Self, RuntimeError> {
        let (tx, rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();
        let worker_config = config.clone();

        let handle = thread::Builder::new()
            .name("graded-runtime".into())
            .spawn(move || worker_main(document, worker_config, rx, ready_tx))
            .map_err(|e| RuntimeError::Bootstrap(format!("spawn worker: {e}")))?;

        let init_timeout = Duration::from_millis(config.init_timeout_ms);
        match tokio::time::timeout(init_timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => Ok(Self {
                tx: Some(tx),
                handle: Some(handle),
                probe_timeout: Duration::from_millis(config.probe_timeout_ms),
            }),
            Ok(Ok(Err(message))) => Err(RuntimeError::Bootstrap(message)),
            Ok(Err(_)) => Err(RuntimeError::Bootstrap("worker exited during init".into())),
            Err(_) => {
                warn!(timeout_ms = config.init_timeout_ms, "runtime init timed out");
                Err(RuntimeError::Bootstrap(format!(
                    "document initialization did not complete within {}ms",
                    config.init_timeout_ms
                )))
            }
        }
    }

    /// Flush timers that fit in the settle window. Called once, after the
    /// caller has awaited the settle delay and before the first probe.
    pub async fn settle(&self, budget_ms: u64) -> Result<(), RuntimeError> {
        let (resp, rx) = oneshot::channel();
        self.send(Job::Settle { budget_ms, resp })?;
        tokio::time::timeout(self.probe_timeout, rx)
            .await
            .map_err(|_| RuntimeError::WorkerGone)?
            .map_err(|_| RuntimeError::WorkerGone)
    }

    /// Run one probe. Never returns an `Err`: timeouts and channel failures
    /// become `error` verdicts so the caller always has something renderable.
    pub async fn run_probe(&self, test: TestDefinition) -> Verdict {
        let (resp, rx) = oneshot::channel();
        if self.send(Job::Probe { test, resp }).is_err() {
            return worker_gone_verdict();
        }
        match tokio::time::timeout(self.probe_timeout, rx).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(_)) => worker_gone_verdict(),
            Err(_) => {
                warn!(timeout_ms = self.probe_timeout.as_millis() as u64, "probe timed out");
                Verdict::Error {
                    message: format!(
                        "Error: probe did not complete within {}ms",
                        self.probe_timeout.as_millis()
                    ),
                    diagnostics: Diagnostics {
                        error_type: Some(ErrorType::Runtime),
                        stderr: Some(format!(
                            "Probe did not complete within {}ms",
                            self.probe_timeout.as_millis()
                        )),
                        ..Diagnostics::default()
                    },
                }
            }
        }
    }

    /// Tear down the runtime and collect the buffers.
    pub async fn finish(mut self) -> RuntimeReport {
        let (resp, rx) = oneshot::channel();
        let report = match self.send(Job::Finish { resp }) {
            Ok(()) => match tokio::time::timeout(self.probe_timeout, rx).await {
                Ok(Ok(report)) => report,
                _ => RuntimeReport::default(),
            },
            Err(_) => RuntimeReport::default(),
        };
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }
        report
    }

    fn send(&self, job: Job) -> Result<(), RuntimeError> {
        self.tx
            .as_ref()
            .ok_or(RuntimeError::WorkerGone)?
            .send(job)
            .map_err(|_| RuntimeError::WorkerGone)
    }
}

impl Drop for RuntimeHost {
    fn drop(&mut self) {
        // Closing the channel makes the worker exit; the thread is detached
        // rather than joined so drop never blocks the caller.
        self.tx.take();
    }
}

fn worker_gone_verdict() -> Verdict {
    Verdict::Error {
        message: "Error: evaluation runtime terminated unexpectedly".into(),
        diagnostics: Diagnostics {
            error_type: Some(ErrorType::Runtime),
            stderr: Some("Evaluation runtime terminated unexpectedly".into()),
            ..Diagnostics::default()
        },
    }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

fn worker_main(
    document: String,
    config: EngineConfig,
    rx: mpsc::Receiver<Job>,
    ready_tx: oneshot::Sender<Result<(), String>>,
) {
    reset_buffers();

    let parsed = dom::parse_document(&document);
    let mut ctx = Context::default();
    if config.loop_iteration_limit > 0 {
        ctx.runtime_limits_mut()
            .set_loop_iteration_limit(config.loop_iteration_limit);
    }
    if config.recursion_limit > 0 {
        ctx.runtime_limits_mut()
            .set_recursion_limit(config.recursion_limit);
    }

    if let Err(e) = register_host_callables(&mut ctx) {
        let _ = ready_tx.send(Err(format!("register host callables: {e}")));
        return;
    }
    if let Err(e) = bootstrap(&mut ctx, &parsed) {
        let _ = ready_tx.send(Err(e));
        return;
    }

    run_submission_scripts(&mut ctx, &parsed);
    let _ = ready_tx.send(Ok(()));

    while let Ok(job) = rx.recv() {
        match job {
            Job::Probe { test, resp } => {
                let verdict = probe::run_probe(&mut ctx, &test, &config);
                let _ = resp.send(verdict);
            }
            Job::Settle { budget_ms, resp } => {
                let source = format!("__gd_flush_timers({budget_ms})");
                if let Err(e) = ctx.eval(Source::from_bytes(source.as_bytes())) {
                    push_runtime_error(format!("{e} at timer flush"));
                }
                let _ = resp.send(());
            }
            Job::Finish { resp } => {
                let report = RuntimeReport {
                    runtime_errors: RUNTIME_ERRORS.with(|buf| buf.take()),
                    console: CONSOLE_CAPTURE.with(|buf| buf.take()),
                };
                let _ = resp.send(report);
                break;
            }
        }
    }
}

fn register_host_callables(ctx: &mut Context) -> boa_engine::JsResult<()> {
    ctx.register_global_builtin_callable(
        js_string!("__gd_emit"),
        1,
        NativeFunction::from_copy_closure(|_this, args, ctx| {
            let line = args
                .first()
                .map(|v| v.to_string(ctx))
                .transpose()?
                .map(|s| s.to_std_string_escaped())
                .unwrap_or_default();
            push_console(line);
            Ok(JsValue::undefined())
        }),
    )?;
    ctx.register_global_builtin_callable(
        js_string!("__gd_uncaught"),
        1,
        NativeFunction::from_copy_closure(|_this, args, ctx| {
            let entry = args
                .first()
                .map(|v| v.to_string(ctx))
                .transpose()?
                .map(|s| s.to_std_string_escaped())
                .unwrap_or_default();
            push_runtime_error(entry);
            Ok(JsValue::undefined())
        }),
    )?;
    Ok(())
}

fn bootstrap(ctx: &mut Context, parsed: &ParsedDocument) -> Result<(), String> {
    let title_json =
        serde_json::to_string(&parsed.title).unwrap_or_else(|_| "\"\"".to_string());
    let harness = HARNESS_TEMPLATE
        .replace("__GD_ELEMENTS__", &parsed.elements_json)
        .replace("__GD_TITLE__", &title_json);
    ctx.eval(Source::from_bytes(harness.as_bytes()))
        .map(|_| ())
        .map_err(|e| format!("harness bootstrap failed: {e}"))
}

/// Execute the submission's inline scripts sequentially. An uncaught error in
/// one script is recorded (`message at file:line:col` when the engine
/// reports a position, `message at file` otherwise) and does not stop the
/// rest — the document may still be in a probeable state.
fn run_submission_scripts(ctx: &mut Context, parsed: &ParsedDocument) {
    for block in &parsed.scripts {
        debug!(path = %block.path, bytes = block.source.len(), "running submission script");
        if let Err(e) = ctx.eval(Source::from_bytes(block.source.as_bytes())) {
            push_runtime_error(uncaught_entry(&e.to_string(), &block.path));
        }
    }
}

// Position clause in the engine's error display (parse and lex errors carry
// one; runtime throws don't).
static ERROR_POSITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*at line (\d+), col(?:umn)? (\d+)").unwrap());

/// Format one runtime-error buffer entry, folding the engine's in-message
/// position into the `file:line:col` location.
fn uncaught_entry(display: &str, path: &str) -> String {
    let message = error_message(display);
    if let Some(caps) = ERROR_POSITION.captures(message) {
        let stripped = ERROR_POSITION.replace(message, "");
        format!("{} at {path}:{}:{}", stripped.trim(), &caps[1], &caps[2])
    } else {
        format!("{message} at {path}")
    }
}

/// Strip boa's `Error: ` display prefix so messages match what a browser's
/// `error.message` would carry.
pub(crate) fn error_message(display: &str) -> &str {
    display.strip_prefix("Error: ").unwrap_or(display)
}
