//! The per-source Template Renderer (§4.3)
//!
//! Deep-copies a template and rewrites every string-valued leaf that equals
//! a recognized placeholder. The template is never mutated; every render
//! starts from a fresh clone.

use crate::assembler::Record;
use crate::error::PyLogChopError;
use serde_json::{Map, Value};

/// Everything a render needs besides the template (§4.3's "record context").
pub struct RecordContext<'a> {
    pub first_line: &'a str,
    pub other_lines: &'a [String],
    pub tags_list: &'a [String],
    pub tags_dict: &'a Map<String, Value>,
    /// `captures[0]` is the whole match, `captures[n]` is capture group `n`.
    pub captures: Option<&'a [Option<String>]>,
}

impl<'a> RecordContext<'a> {
    pub fn new(record: &'a Record, tags_list: &'a [String], tags_dict: &'a Map<String, Value>) -> Self {
        Self {
            first_line: &record.first_line,
            other_lines: &record.other_lines,
            tags_list,
            tags_dict,
            captures: record.captures.as_deref(),
        }
    }
}

/// Materialize a payload from `template` and `ctx`. `template` is left
/// untouched (§4.3, §8 non-mutation property).
pub fn render(template: &Value, ctx: &RecordContext) -> Value {
    let mut payload = template.clone();
    rewrite(&mut payload, ctx);
    payload
}

fn rewrite(value: &mut Value, ctx: &RecordContext) {
    match value {
        Value::Object(map) => {
            for v in map.values_mut() {
                rewrite(v, ctx);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                rewrite(v, ctx);
            }
        }
        Value::String(s) => {
            if let Some(replacement) = substitute(s, ctx) {
                *value = replacement;
            }
        }
        _ => {}
    }
}

fn substitute(placeholder: &str, ctx: &RecordContext) -> Option<Value> {
    match placeholder {
        "$FIRST_LINE" => Some(Value::String(ctx.first_line.to_string())),
        "$OTHER_LINES" => Some(Value::Array(
            ctx.other_lines.iter().cloned().map(Value::String).collect(),
        )),
        "$TAGS" => Some(Value::Array(
            ctx.tags_list.iter().cloned().map(Value::String).collect(),
        )),
        "$TAGS_DICT" => Some(Value::Object(ctx.tags_dict.clone())),
        _ if placeholder.starts_with("$RE_") => substitute_capture(placeholder, ctx),
        _ => None,
    }
}

fn substitute_capture(placeholder: &str, ctx: &RecordContext) -> Option<Value> {
    let parts: Vec<&str> = placeholder.split('_').collect();
    if parts.len() != 3 {
        return None;
    }
    let group: usize = parts[1].parse().ok()?;
    let raw = capture_group(ctx, group, placeholder)?;

    match parts[2] {
        "INT" => match raw.parse::<i64>() {
            Ok(n) => Some(Value::Number(n.into())),
            Err(_) => {
                let err = PyLogChopError::PlaceholderSubstitution(format!(
                    "cannot transform capture group {raw} to integer for {placeholder}"
                ));
                tracing::error!(%err);
                None
            }
        },
        "FLOAT" => match raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            Some(n) => Some(Value::Number(n)),
            None => {
                let err = PyLogChopError::PlaceholderSubstitution(format!(
                    "cannot transform capture group {raw} to float for {placeholder}"
                ));
                tracing::error!(%err);
                None
            }
        },
        "STR" => Some(Value::String(raw.to_string())),
        _ => None,
    }
}

fn capture_group<'a>(ctx: &RecordContext<'a>, group: usize, placeholder: &str) -> Option<&'a str> {
    match ctx.captures.and_then(|c| c.get(group)).and_then(|g| g.as_deref()) {
        Some(s) => Some(s),
        None => {
            let err = PyLogChopError::PlaceholderSubstitution(format!("no match group {group} for {placeholder}"));
            tracing::error!(%err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn empty_tags() -> (Vec<String>, Map<String, Value>) {
        (Vec::new(), Map::new())
    }

    #[test]
    fn single_line_plain_substitution() {
        let record = Record {
            first_line: "hello\n".to_string(),
            other_lines: vec![],
            captures: None,
        };
        let (tags_list, tags_dict) = empty_tags();
        let ctx = RecordContext::new(&record, &tags_list, &tags_dict);
        let template = json!({"m": "$FIRST_LINE"});
        assert_eq!(render(&template, &ctx), json!({"m": "hello\n"}));
    }

    #[test]
    fn multiline_first_and_rest() {
        let record = Record {
            first_line: "2024-01-01 ERROR boom\n".to_string(),
            other_lines: vec!["  at X\n".to_string(), "  at Y\n".to_string()],
            captures: None,
        };
        let (tags_list, tags_dict) = empty_tags();
        let ctx = RecordContext::new(&record, &tags_list, &tags_dict);
        let template = json!({"first": "$FIRST_LINE", "rest": "$OTHER_LINES"});
        assert_eq!(
            render(&template, &ctx),
            json!({
                "first": "2024-01-01 ERROR boom\n",
                "rest": ["  at X\n", "  at Y\n"],
            })
        );
    }

    #[test]
    fn capture_extraction_int_str_float() {
        let record = Record {
            first_line: "42 hello 3.14\n".to_string(),
            other_lines: vec![],
            captures: Some(vec![
                Some("42 hello 3.14".to_string()),
                Some("42".to_string()),
                Some("hello".to_string()),
                Some("3.14".to_string()),
            ]),
        };
        let (tags_list, tags_dict) = empty_tags();
        let ctx = RecordContext::new(&record, &tags_list, &tags_dict);
        let template = json!({"n": "$RE_1_INT", "w": "$RE_2_STR", "x": "$RE_3_FLOAT"});
        assert_eq!(render(&template, &ctx), json!({"n": 42, "w": "hello", "x": 3.14}));
    }

    #[test]
    fn unrecognized_placeholder_is_identity() {
        let record = Record {
            first_line: "l\n".to_string(),
            other_lines: vec![],
            captures: None,
        };
        let (tags_list, tags_dict) = empty_tags();
        let ctx = RecordContext::new(&record, &tags_list, &tags_dict);
        let template = json!({"k": "$NOT_A_PLACEHOLDER"});
        assert_eq!(render(&template, &ctx), template);
    }

    #[test]
    fn missing_capture_group_leaves_leaf_unchanged() {
        let record = Record {
            first_line: "l\n".to_string(),
            other_lines: vec![],
            captures: Some(vec![Some("l".to_string())]),
        };
        let (tags_list, tags_dict) = empty_tags();
        let ctx = RecordContext::new(&record, &tags_list, &tags_dict);
        let template = json!({"k": "$RE_5_INT"});
        assert_eq!(render(&template, &ctx), template);
    }

    #[test]
    fn render_does_not_mutate_template_and_is_deterministic() {
        let record_a = Record {
            first_line: "a\n".to_string(),
            other_lines: vec![],
            captures: None,
        };
        let record_b = Record {
            first_line: "b\n".to_string(),
            other_lines: vec![],
            captures: None,
        };
        let (tags_list, tags_dict) = empty_tags();
        let template = json!({"m": "$FIRST_LINE"});

        let ctx_a = RecordContext::new(&record_a, &tags_list, &tags_dict);
        let first = render(&template, &ctx_a);
        let first_again = render(&template, &ctx_a);
        assert_eq!(first, first_again);

        let ctx_b = RecordContext::new(&record_b, &tags_list, &tags_dict);
        let second = render(&template, &ctx_b);
        assert_ne!(first, second);
        assert_eq!(template, json!({"m": "$FIRST_LINE"}));
    }

    #[test]
    fn tag_projection() {
        let tags_list = vec!["scheme:http".to_string(), "owner:alice".to_string(), "malformed".to_string()];
        let mut tags_dict = Map::new();
        tags_dict.insert("scheme".to_string(), json!("http"));
        tags_dict.insert("owner".to_string(), json!("alice"));

        let record = Record {
            first_line: "l\n".to_string(),
            other_lines: vec![],
            captures: None,
        };
        let ctx = RecordContext::new(&record, &tags_list, &tags_dict);
        let template = json!({"tags": "$TAGS", "tags_dict": "$TAGS_DICT"});
        assert_eq!(
            render(&template, &ctx),
            json!({
                "tags": ["scheme:http", "owner:alice", "malformed"],
                "tags_dict": {"scheme": "http", "owner": "alice"},
            })
        );
    }
}
