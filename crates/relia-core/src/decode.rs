//! Lenient decoding shared by stored cells and analysis payloads.
//!
//! Both sources are loosely typed: legacy rows carry numbers as strings and
//! lists as delimited text, and the analysis service sometimes wraps its JSON
//! in prose or truncates it. Everything here is total; callers decide what a
//! missing value means.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn number_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d[\d,]*(?:\.\d+)?").expect("static regex"))
}

fn strip_fences(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    // drop an optional language tag on the opening fence line
    let rest = match rest.find('\n') {
        Some(nl) if !rest[..nl].contains('{') => &rest[nl + 1..],
        _ => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

/// Parses `text` as JSON, falling back to the outermost `{ ... }` span.
pub fn extract_json(text: &str) -> Option<Value> {
    let t = strip_fences(text);
    if t.is_empty() {
        return None;
    }
    if let Ok(v) = serde_json::from_str::<Value>(t) {
        return Some(v);
    }
    let (start, end) = (t.find('{')?, t.rfind('}')?);
    if start >= end {
        return None;
    }
    serde_json::from_str(&t[start..=end]).ok()
}

/// One best-effort structural repair pass over almost-JSON text.
///
/// Handles: code fences and leading prose, smart quotes, trailing commas,
/// Python literals, raw newlines inside strings, and truncated output
/// (unterminated string, unclosed brackets).
pub fn repair_json(text: &str) -> String {
    let t = strip_fences(text);
    let start = t.find(['{', '[']).unwrap_or(0);
    let src: Vec<char> = t[start..]
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' => '"',
            other => other,
        })
        .collect();

    let mut out = String::with_capacity(src.len() + 8);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < src.len() {
        let c = src[i];
        if in_string {
            match c {
                _ if escaped => {
                    escaped = false;
                    out.push(c);
                }
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => {}
                '\t' => out.push_str("\\t"),
                _ => out.push(c),
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '{' => {
                stack.push('}');
                out.push(c);
            }
            '[' => {
                stack.push(']');
                out.push(c);
            }
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                    out.push(c);
                }
                if stack.is_empty() {
                    // anything after the top-level value is prose
                    return out;
                }
            }
            ',' => {
                let next = src[i + 1..].iter().copied().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}') | Some(']') | None) {
                    out.push(c);
                }
            }
            _ => {
                let rest: String = src[i..src.len().min(i + 5)].iter().collect();
                let literal = [("True", "true"), ("False", "false"), ("None", "null")]
                    .into_iter()
                    .find(|(py, _)| rest.starts_with(py));
                if let Some((py, js)) = literal {
                    out.push_str(js);
                    i += py.len();
                    continue;
                }
                out.push(c);
            }
        }
        i += 1;
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    if out.ends_with(',') {
        out.pop();
    } else if out.ends_with(':') {
        out.push_str(" null");
    }
    while let Some(close) = stack.pop() {
        out.push(close);
    }
    out
}

/// `extract_json`, then one `repair_json` attempt.
pub fn parse_json_lenient(text: &str) -> Result<Value, String> {
    if let Some(v) = extract_json(text) {
        return Ok(v);
    }
    let repaired = repair_json(text);
    serde_json::from_str(&repaired).map_err(|e| format!("unparseable after repair: {}", e))
}

/// A JSON-encoded table cell; empty cells and garbage decode to `None`.
pub fn json_cell(cell: &str) -> Option<Value> {
    if cell.trim().is_empty() {
        return None;
    }
    parse_json_lenient(cell).ok()
}

/// Integer from a number or the first numeric token of a string
/// (`"₪ 1,200"` → 1200, `"72.6"` → 73).
pub fn lenient_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        Value::String(s) => lenient_i64_str(s),
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

pub fn lenient_i64_str(s: &str) -> Option<i64> {
    let token = number_token().find(s)?.as_str().replace(',', "");
    let f: f64 = token.parse().ok()?;
    f.is_finite().then(|| f.round() as i64)
}

pub fn lenient_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// List of strings from an array, a JSON-array string, or a single string.
pub fn string_list(v: &Value) -> Vec<String> {
    match v {
        Value::Array(items) => items
            .iter()
            .map(lenient_string)
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) if s.trim_start().starts_with('[') => match extract_json(s) {
            Some(inner @ Value::Array(_)) => string_list(&inner),
            _ => single(s),
        },
        Value::String(s) => single(s),
        Value::Null => Vec::new(),
        other => single(&other.to_string()),
    }
}

fn single(s: &str) -> Vec<String> {
    let s = s.trim();
    if s.is_empty() {
        Vec::new()
    } else {
        vec![s.to_string()]
    }
}

/// Issues column: `;`-separated, else `,`-separated, else one item.
pub fn delimited_list(s: &str) -> Vec<String> {
    let sep = if s.contains(';') {
        ';'
    } else if s.contains(',') {
        ','
    } else {
        return single(s);
    };
    s.split(sep)
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .map(String::from)
        .collect()
}
