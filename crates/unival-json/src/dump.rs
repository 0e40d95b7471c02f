//! JSON serializer for unival values
//!
//! Deterministic recursive dump: object keys are emitted in sorted order,
//! floats use the shortest representation that round-trips (kept distinct
//! from integer literals), and strings escape control characters plus the
//! U+2028/U+2029 line separators. Values with no JSON form fall back to
//! their class `__str__`, or a placeholder.

use unival_core::{escape_string, format_float, Kind, Value};

/// Serialize compactly, without any whitespace between tokens.
pub fn dump(value: &Value) -> String {
    let mut output = String::new();
    dump_impl(value, &mut output, 0, None);
    output
}

/// Serialize with a newline per entry and `indent` spaces per level.
pub fn dump_pretty(value: &Value, indent: usize) -> String {
    let mut output = String::new();
    dump_impl(value, &mut output, 0, Some(indent));
    output
}

fn dump_impl(value: &Value, output: &mut String, level: usize, indent: Option<usize>) {
    match value.kind() {
        Kind::Undefined => output.push_str("undefined"),
        Kind::Null => output.push_str("null"),
        Kind::Boolean => output.push_str(if value.as_bool() == Some(true) {
            "true"
        } else {
            "false"
        }),
        Kind::Integer => {
            if let Some(i) = value.as_int() {
                output.push_str(&i.to_string());
            }
        }
        Kind::Float => {
            if let Some(d) = value.as_float() {
                output.push_str(&format_float(d));
            }
        }
        Kind::String => {
            if let Some(s) = value.as_str() {
                escape_string(output, s);
            }
        }
        Kind::Array => {
            let items = value.as_array().map(|a| a.snapshot()).unwrap_or_default();
            if items.is_empty() {
                output.push_str("[]");
                return;
            }
            output.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    output.push(',');
                }
                open_line(output, level + 1, indent);
                dump_impl(item, output, level + 1, indent);
            }
            open_line(output, level, indent);
            output.push(']');
        }
        Kind::Object => {
            let mut entries = value
                .as_object()
                .map(|o| o.snapshot())
                .unwrap_or_default();
            if entries.is_empty() {
                output.push_str("{}");
                return;
            }
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            output.push('{');
            for (i, (key, item)) in entries.iter().enumerate() {
                if i > 0 {
                    output.push(',');
                }
                open_line(output, level + 1, indent);
                escape_string(output, key);
                output.push(':');
                if indent.is_some() {
                    output.push(' ');
                }
                dump_impl(item, output, level + 1, indent);
            }
            open_line(output, level, indent);
            output.push('}');
        }
        // Dict, Buffer, Function, Class, Other: Display already consults
        // the class __str__ and falls back to a placeholder.
        _ => output.push_str(&value.to_string()),
    }
}

fn open_line(output: &mut String, level: usize, indent: Option<usize>) {
    if let Some(width) = indent {
        output.push('\n');
        for _ in 0..level * width {
            output.push(' ');
        }
    }
}
