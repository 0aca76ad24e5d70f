//! Recovering structured output from model text
//!
//! Models wrap JSON in prose or code fences often enough that callers
//! should never `serde_json::from_str` a raw response directly.

use serde_json::{Map, Value};

/// Find the first complete JSON object in `text`
///
/// Skips leading prose and ```json fences, and tracks string literals so
/// braces inside values do not end the object early. Returns `None` when
/// no object parses.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = matching_brace(&text[start..]) {
            let candidate = &text[start..start + end + 1];
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) {
                return Some(map);
            }
        }
        search_from = start + 1;
    }

    None
}

/// Byte offset of the brace closing the object that opens at offset 0
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {},
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            },
            _ => {},
        }
    }

    None
}
