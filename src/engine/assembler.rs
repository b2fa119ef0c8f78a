// SPDX-License-Identifier: MIT
//! Document Assembler — combines a submission's files into one executable
//! HTML document.
//!
//! Markup comes from `index.html` or `main.html`; when neither exists (pure-JS
//! challenges) a minimal shell with a `#root` container is substituted so
//! evaluation never hard-fails on missing markup. Every `*.css` file becomes
//! an inline `<style>` block before `</head>`, every `*.js`/`*.ts` file an
//! inline `<script>` block before `</body>`, preserving per-file order.
//!
//! TypeScript sources get a best-effort textual strip of type annotations and
//! standalone `interface` blocks. This is a heuristic, not a transpiler, and
//! is known to mangle complex TS; the runtime only executes plain script.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::engine::model::Submission;

/// Shell used when the submission contains no HTML file.
const FALLBACK_DOCUMENT: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="UTF-8">
  <title>Test</title>
</head>
<body>
  <div id="root"></div>
</body>
</html>"#;

// ─── TypeScript stripping ─────────────────────────────────────────────────────

static TYPE_ANNOTATION: Lazy<Regex> = Lazy::new(|| Regex::new(r": \w+").unwrap());
static INTERFACE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"interface \w+ \{[^}]+\}").unwrap());

/// Strip TypeScript-only syntax so the source runs as plain script.
///
/// Removes `: Type` annotations and standalone `interface Name { ... }`
/// blocks. Nested interface bodies and generics are out of scope.
pub fn strip_typescript(source: &str) -> String {
    let stripped = TYPE_ANNOTATION.replace_all(source, "");
    INTERFACE_BLOCK.replace_all(&stripped, "").into_owned()
}

// ─── Assembly ─────────────────────────────────────────────────────────────────

/// Build one self-contained document from the submission.
///
/// No escaping or sandboxing happens here; author markup and script are
/// embedded verbatim. Isolation is the runtime host's job.
pub fn assemble(files: &Submission) -> String {
    let mut html = files
        .get("index.html")
        .or_else(|| files.get("main.html"))
        .map(String::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(FALLBACK_DOCUMENT)
        .to_string();

    let mut styles = String::new();
    for (path, source) in files {
        if path.ends_with(".css") {
            styles.push_str("<style>\n");
            styles.push_str(source);
            styles.push_str("\n</style>\n");
        }
    }

    let mut scripts = String::new();
    for (path, source) in files {
        if path.ends_with(".js") || path.ends_with(".ts") {
            let code = strip_typescript(source);
            // data-path lets the runtime attribute uncaught errors to a file.
            scripts.push_str(&format!("<script data-path=\"{path}\">\n"));
            scripts.push_str(&code);
            scripts.push_str("\n</script>\n");
        }
    }

    if !styles.is_empty() {
        if html.contains("</head>") {
            html = html.replace("</head>", &format!("{styles}</head>"));
        } else {
            // Headless fragment markup: prepend styles.
            html = format!("{styles}{html}");
        }
    }
    if !scripts.is_empty() {
        if html.contains("</body>") {
            html = html.replace("</body>", &format!("{scripts}</body>"));
        } else {
            html.push_str(&scripts);
        }
    }

    html
}
