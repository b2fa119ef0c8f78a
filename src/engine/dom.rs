// SPDX-License-Identifier: MIT
//! Parsed-document model for the runtime host.
//!
//! The assembled HTML is parsed once with `scraper`; the element tree is
//! flattened into a JSON blob the bootstrap harness rebuilds its live DOM
//! from, and inline scripts are pulled out in document order for sequential
//! execution.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Map, Value};

// Selector::parse is moderately expensive; cache the ones used on every parse.
static SCRIPT_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("script").unwrap());
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());

/// One inline script extracted from the assembled document.
#[derive(Debug, Clone)]
pub struct ScriptBlock {
    /// Originating file path when the assembler tagged it, else `inline:<n>`.
    pub path: String,
    pub source: String,
}

/// Everything the runtime host needs from the assembled document.
#[derive(Debug)]
pub struct ParsedDocument {
    /// JSON tree (tag/attrs/children) rooted at the `<html>` element.
    pub elements_json: String,
    pub title: String,
    /// Inline scripts in document order.
    pub scripts: Vec<ScriptBlock>,
}

/// Parse the assembled document and serialize it for the harness.
pub fn parse_document(html: &str) -> ParsedDocument {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|n| n.text().collect::<String>())
        .unwrap_or_default();

    let scripts = document
        .select(&SCRIPT_SELECTOR)
        .enumerate()
        .map(|(i, node)| ScriptBlock {
            path: node
                .value()
                .attr("data-path")
                .map(str::to_string)
                .unwrap_or_else(|| format!("inline:{i}")),
            source: node.text().collect::<String>(),
        })
        .filter(|block| !block.source.trim().is_empty())
        .collect();

    let elements_json = serde_json::to_string(&element_to_value(document.root_element()))
        .unwrap_or_else(|_| "null".to_string());

    ParsedDocument {
        elements_json,
        title,
        scripts,
    }
}

/// Serialize one element and its subtree.
///
/// Script elements keep their node but lose their text children so the
/// harness DOM doesn't report source code as page text; the runtime executes
/// scripts from the separate `scripts` list.
fn element_to_value(el: ElementRef) -> Value {
    let mut attrs = Map::new();
    for (name, value) in el.value().attrs() {
        attrs.insert(name.to_string(), Value::String(value.to_string()));
    }

    let tag = el.value().name().to_string();
    let mut children = Vec::new();
    if tag != "script" {
        for child in el.children() {
            if let Some(text) = child.value().as_text() {
                if !text.trim().is_empty() {
                    children.push(json!({ "text": text.to_string() }));
                }
            } else if let Some(child_el) = ElementRef::wrap(child) {
                children.push(element_to_value(child_el));
            }
        }
    }

    json!({ "tag": tag, "attrs": attrs, "children": children })
}
