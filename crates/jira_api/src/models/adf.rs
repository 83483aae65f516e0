//! Minimal Atlassian Document Format support for worklog comments.

use serde_json::{json, Value};

/// Wraps plain text as a single-paragraph ADF document.
pub fn plain_text_document(text: &str) -> Value {
    json!({
        "type": "doc",
        "version": 1,
        "content": [{
            "type": "paragraph",
            "content": [{ "type": "text", "text": text }]
        }]
    })
}

/// A document with no content; replaces an existing comment with nothing.
pub fn empty_document() -> Value {
    json!({ "type": "doc", "version": 1, "content": [] })
}

/// Collects text nodes of an ADF document; paragraphs are joined with newlines.
pub fn extract_text(document: &Value) -> String {
    if let Some(text) = document.as_str() {
        return text.to_string();
    }

    let Some(blocks) = document.get("content").and_then(Value::as_array) else {
        return String::new();
    };

    blocks
        .iter()
        .map(|block| {
            let mut buffer = String::new();
            collect_text(block, &mut buffer);
            buffer
        })
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(node: &Value, buffer: &mut String) {
    if node.get("type").and_then(Value::as_str) == Some("text") {
        if let Some(text) = node.get("text").and_then(Value::as_str) {
            buffer.push_str(text);
        }
    }
    if let Some(children) = node.get("content").and_then(Value::as_array) {
        for child in children {
            collect_text(child, buffer);
        }
    }
}
