//! Embedded JSON-LD (`application/ld+json`) discovery

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

static JSON_LD_SCRIPT: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("static selector")
});

/// Every JSON-LD node in the document, with top-level arrays and `@graph`
/// containers flattened. Unparseable blocks are skipped.
pub fn nodes(document: &Html) -> Vec<Value> {
    let mut out = Vec::new();
    for script in document.select(&JSON_LD_SCRIPT) {
        let text = script.inner_html();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(text) {
            Ok(value) => flatten(value, &mut out),
            Err(e) => debug!("Skipping unparseable JSON-LD block: {}", e),
        }
    }
    out
}

fn flatten(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|item| flatten(item, out)),
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten(graph, out);
            }
            if !map.is_empty() {
                out.push(Value::Object(map));
            }
        }
        _ => {}
    }
}

/// Whether a node's `@type` (string or array) includes `ty`.
pub fn has_type(node: &Value, ty: &str) -> bool {
    match node.get("@type") {
        Some(Value::String(s)) => s == ty,
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some(ty)),
        _ => false,
    }
}

pub fn find_typed<'a>(nodes: &'a [Value], ty: &str) -> Option<&'a Value> {
    nodes.iter().find(|node| has_type(node, ty))
}

/// Number from a JSON number or a numeric string such as `"4.5"` or `"1,024"`.
pub fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => super::leading_number(s),
        _ => None,
    }
}

/// Text from a string, or from the `name` of a nested object (`author`).
pub fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => super::clean_text(s),
        Value::Object(map) => map.get("name").and_then(text),
        Value::Array(items) => items.iter().find_map(text),
        _ => None,
    }
}

/// Value as a list: arrays as-is, single values wrapped.
pub fn as_list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other],
    }
}
