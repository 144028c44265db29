//! Render/apply engine: turns a template plus a structured record into the
//! (prompt, target) string pair
//!
//! The body is treated as an opaque renderable string. Before rendering, two
//! textual rewrites may be applied to every variable-interpolation closing
//! marker, in this fixed order:
//!
//! 1. truncation (`}}` becomes `| string | clip }}`), bounding the
//!    contribution of any single interpolated value;
//! 2. highlighting (`}}` becomes `| highlight }}`), wrapping substituted
//!    values in display markup.
//!
//! Record values are protected against containing the literal `|||`
//! separator: occurrences are swapped for a private token before rendering
//! and restored verbatim in every output part, so data content can never
//! change the part count.

use std::collections::HashMap;

use tera::{Context, Tera, Value};

use crate::error::{PromptStoreError, Result};
use crate::template::Template;

/// The literal token dividing the prompt region from the target region
pub const SEPARATOR: &str = "|||";

/// Maximum characters a single interpolated value may contribute when
/// truncation is enabled. Bounds prompt length while preserving most
/// natural text.
pub const MAX_INTERPOLATION_CHARS: usize = 2048;

/// Private stand-in for a literal `|||` inside record values
const PIPE_PROTECTOR: &str = "9fb0a52dcdc64c3797f1b14d7c9f16f1";

/// Registered name of the compiled body inside the engine
const TEMPLATE_KEY: &str = "template";

/// A structured record: field name to value, as supplied by an external
/// dataset source
pub type Example = serde_json::Map<String, Value>;

impl Template {
    /// Render this template against a record.
    ///
    /// Returns the rendered string split on the `|||` separator, part count
    /// unchanged: one part means the template produced no valid output, two
    /// is the normal prompt/target pair, more than two is an authoring
    /// defect left for the validation step to flag.
    pub fn apply(
        &self,
        example: &Example,
        truncate: bool,
        highlight_variables: bool,
    ) -> Result<Vec<String>> {
        let example = normalize_field_names(example);
        if example.contains_key("answer_choices") {
            return Err(PromptStoreError::validation(
                "record defines a field named 'answer_choices', which is reserved for the \
                 template's fixed answer choices",
            ));
        }

        let mut body = self.jinja.clone();
        if truncate {
            body = body.replace("}}", " | string | clip }}");
        }
        if highlight_variables {
            body = body.replace("}}", " | highlight }}");
        }

        let mut context = Context::new();
        for (field, value) in &example {
            context.insert(field, &protect_pipes(value));
        }
        if let Some(choices) = self.fixed_answer_choices_list() {
            context.insert("answer_choices", &choices);
        }

        let engine = build_engine(&body).map_err(|e| self.syntax_error(e))?;
        let rendered = engine
            .render(TEMPLATE_KEY, &context)
            .map_err(|e| self.syntax_error(e))?;

        Ok(rendered
            .split(SEPARATOR)
            .map(|part| part.replace(PIPE_PROTECTOR, SEPARATOR))
            .collect())
    }

    fn syntax_error(&self, err: tera::Error) -> PromptStoreError {
        PromptStoreError::TemplateSyntax {
            dataset: None,
            subset: None,
            template_id: self.id(),
            message: describe_tera_error(err),
        }
    }
}

/// Replace hyphens with underscores in every field name, so records from
/// sources with hyphenated column names line up with template variables.
pub fn normalize_field_names(example: &Example) -> Example {
    example
        .iter()
        .map(|(field, value)| (field.replace('-', "_"), value.clone()))
        .collect()
}

/// Compile a body without rendering it; used by the static validator.
pub(crate) fn compile_body(body: &str) -> std::result::Result<(), String> {
    build_engine(body).map(|_| ()).map_err(describe_tera_error)
}

fn build_engine(body: &str) -> tera::Result<Tera> {
    let mut tera = Tera::default();
    tera.autoescape_on(vec![]);
    tera.register_filter("string", string_filter);
    tera.register_filter("clip", clip_filter);
    tera.register_filter("choice", choice_filter);
    tera.register_filter("most_frequent", most_frequent_filter);
    tera.register_filter("highlight", highlight_filter);
    tera.add_raw_template(TEMPLATE_KEY, body)?;
    Ok(tera)
}

/// Tera's Display output is a one-liner; walk the source chain so parse
/// positions and filter failures stay visible.
fn describe_tera_error(err: tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Swap every literal separator inside string values (recursing through
/// sequences and mappings) for the private protector token.
fn protect_pipes(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.replace(SEPARATOR, PIPE_PROTECTOR)),
        Value::Array(items) => Value::Array(items.iter().map(protect_pipes).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), protect_pipes(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `string`: coerce any value to its string form, so numeric fields survive
/// the truncation filter
fn string_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(coerce_to_string(value)))
}

/// `clip`: bound a string to [`MAX_INTERPOLATION_CHARS`] characters.
///
/// A separator protector token straddling the cut point is dropped whole
/// instead of being sliced, so the post-render restoration never sees a
/// partial token and no token bytes can reach the output.
fn clip_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = coerce_to_string(value);
    let cut = match text.char_indices().nth(MAX_INTERPOLATION_CHARS) {
        Some((byte, _)) => byte,
        None => return Ok(Value::String(text)),
    };
    let mut kept = text[..cut].to_string();
    for taken in (1..PIPE_PROTECTOR.len()).rev() {
        if kept.ends_with(&PIPE_PROTECTOR[..taken])
            && text[cut..].starts_with(&PIPE_PROTECTOR[taken..])
        {
            kept.truncate(kept.len() - taken);
            break;
        }
    }
    Ok(Value::String(kept))
}

/// `choice`: a uniformly random element of a sequence
fn choice_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    use rand::seq::SliceRandom;

    let items = value
        .as_array()
        .ok_or_else(|| tera::Error::msg("choice filter expects a sequence"))?;
    items
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| tera::Error::msg("choice filter got an empty sequence"))
}

/// `most_frequent`: the modal element of a sequence, first-seen on ties
fn most_frequent_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let items = value
        .as_array()
        .ok_or_else(|| tera::Error::msg("most_frequent filter expects a sequence"))?;
    if items.is_empty() {
        return Err(tera::Error::msg("most_frequent filter got an empty sequence"));
    }

    let mut counts: Vec<(&Value, usize)> = Vec::new();
    for item in items {
        match counts.iter_mut().find(|(seen, _)| *seen == item) {
            Some(entry) => entry.1 += 1,
            None => counts.push((item, 1)),
        }
    }
    let mut best = &counts[0];
    for entry in &counts[1..] {
        if entry.1 > best.1 {
            best = entry;
        }
    }
    Ok(best.0.clone())
}

/// `highlight`: wrap a substituted value in display markup
fn highlight_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(format!(
        "<span style=\"color: #F08080\">{}</span>",
        coerce_to_string(value)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::metadata::{TaskFormat, TemplateMetadata};

    fn template(jinja: &str) -> Template {
        Template::new(
            "test",
            jinja,
            "",
            false,
            None,
            TemplateMetadata::new(TaskFormat::Generation, "someone"),
        )
        .unwrap()
    }

    fn example(fields: &[(&str, Value)]) -> Example {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_basic_prompt_target_pair() {
        let t = template("{{text}}\nQuestion? ||| {{label}}");
        let ex = example(&[
            ("text", Value::String("It rained.".to_string())),
            ("label", Value::String("yes".to_string())),
        ]);
        let parts = t.apply(&ex, true, false).unwrap();
        assert_eq!(parts, vec!["It rained.\nQuestion? ", " yes"]);
    }

    #[test]
    fn test_missing_separator_yields_single_part() {
        let t = template("{{text}} with no separator");
        let ex = example(&[("text", Value::String("hi".to_string()))]);
        let parts = t.apply(&ex, true, false).unwrap();
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn test_pipes_in_data_do_not_change_part_count() {
        let t = template("{{text}} ||| {{label}}");
        let plain = example(&[
            ("text", Value::String("a b".to_string())),
            ("label", Value::String("x".to_string())),
        ]);
        let piped = example(&[
            ("text", Value::String("a ||| b".to_string())),
            ("label", Value::String("x".to_string())),
        ]);

        let plain_parts = t.apply(&plain, true, false).unwrap();
        let piped_parts = t.apply(&piped, true, false).unwrap();
        assert_eq!(plain_parts.len(), piped_parts.len());
        assert_eq!(piped_parts[0], "a ||| b ");
    }

    #[test]
    fn test_pipes_inside_nested_values_are_protected() {
        let t = template("{% for c in choices %}{{c}} {% endfor %}||| {{label}}");
        let ex = example(&[
            (
                "choices",
                Value::Array(vec![
                    Value::String("l ||| r".to_string()),
                    Value::String("plain".to_string()),
                ]),
            ),
            ("label", Value::String("x".to_string())),
        ]);
        let parts = t.apply(&ex, false, false).unwrap();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].contains("l ||| r"));
    }

    #[test]
    fn test_answer_choices_field_collision_rejected() {
        let t = template("{{text}} ||| {{label}}");
        let ex = example(&[
            ("text", Value::String("hi".to_string())),
            ("label", Value::String("x".to_string())),
            ("answer_choices", Value::String("boom".to_string())),
        ]);
        let result = t.apply(&ex, true, false);
        assert!(matches!(result, Err(PromptStoreError::Validation { .. })));

        // Hyphenated spelling collides after normalization too.
        let ex = example(&[
            ("text", Value::String("hi".to_string())),
            ("label", Value::String("x".to_string())),
            ("answer-choices", Value::String("boom".to_string())),
        ]);
        assert!(t.apply(&ex, true, false).is_err());
    }

    #[test]
    fn test_answer_choices_injection() {
        let t = Template::new(
            "mc",
            "{{text}} ||| {{ answer_choices[0] }}",
            "",
            false,
            Some("yes ||| no".to_string()),
            TemplateMetadata::new(TaskFormat::Generation, "someone"),
        )
        .unwrap();
        let ex = example(&[("text", Value::String("hi".to_string()))]);
        let parts = t.apply(&ex, true, false).unwrap();
        assert_eq!(parts[1], " yes");
    }

    #[test]
    fn test_truncation_caps_interpolated_values() {
        let t = template("{{text}}\nQuestion? ||| {{label}}");
        let long_text: String = "a".repeat(5000);
        let ex = example(&[
            ("text", Value::String(long_text)),
            ("label", Value::String("x".to_string())),
        ]);

        let parts = t.apply(&ex, true, false).unwrap();
        assert_eq!(parts[0].len(), MAX_INTERPOLATION_CHARS + "\nQuestion? ".len());

        let parts = t.apply(&ex, false, false).unwrap();
        assert_eq!(parts[0].len(), 5000 + "\nQuestion? ".len());
    }

    #[test]
    fn test_separator_at_truncation_boundary_leaves_no_residue() {
        // A data separator whose protector token straddles the character
        // budget must not leak partial token bytes into the output.
        let t = template("{{text}} ||| {{label}}");
        let ex = example(&[
            (
                "text",
                Value::String(format!("{}|||{}", "a".repeat(2040), "b".repeat(500))),
            ),
            ("label", Value::String("x".to_string())),
        ]);

        let parts = t.apply(&ex, true, false).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], format!("{} ", "a".repeat(2040)));
        assert_eq!(parts[1], " x");

        // A separator that fits inside the budget still survives verbatim.
        let ex = example(&[
            (
                "text",
                Value::String(format!("{}|||{}", "a".repeat(100), "b".repeat(5000))),
            ),
            ("label", Value::String("x".to_string())),
        ]);
        let parts = t.apply(&ex, true, false).unwrap();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].starts_with(&format!("{}|||b", "a".repeat(100))));
        assert!(!parts[0].contains(&PIPE_PROTECTOR[..8]));
    }

    #[test]
    fn test_truncation_coerces_numbers() {
        let t = template("{{num}} ||| {{label}}");
        let ex = example(&[
            ("num", Value::from(42)),
            ("label", Value::String("x".to_string())),
        ]);
        let parts = t.apply(&ex, true, false).unwrap();
        assert_eq!(parts[0], "42 ");
    }

    #[test]
    fn test_highlighting_wraps_values() {
        let t = template("{{text}} ||| {{label}}");
        let ex = example(&[
            ("text", Value::String("hi".to_string())),
            ("label", Value::String("x".to_string())),
        ]);
        let parts = t.apply(&ex, false, true).unwrap();
        assert_eq!(parts[0], "<span style=\"color: #F08080\">hi</span> ");

        // Truncation and highlighting compose, truncation applied first.
        let parts = t.apply(&ex, true, true).unwrap();
        assert!(parts[0].contains("<span"));
        assert!(parts[0].contains("hi"));
    }

    #[test]
    fn test_hyphenated_field_names_are_normalized() {
        let t = template("{{review_text}} ||| {{label}}");
        let ex = example(&[
            ("review-text", Value::String("fine".to_string())),
            ("label", Value::String("x".to_string())),
        ]);
        let parts = t.apply(&ex, true, false).unwrap();
        assert_eq!(parts[0], "fine ");
    }

    #[test]
    fn test_most_frequent_filter() {
        let t = template("{{ labels | most_frequent }} ||| x");
        let ex = example(&[(
            "labels",
            Value::Array(vec![
                Value::String("b".to_string()),
                Value::String("a".to_string()),
                Value::String("a".to_string()),
            ]),
        )]);
        let parts = t.apply(&ex, false, false).unwrap();
        assert_eq!(parts[0], "a ");

        // First-seen wins on ties.
        let ex = example(&[(
            "labels",
            Value::Array(vec![
                Value::String("b".to_string()),
                Value::String("a".to_string()),
            ]),
        )]);
        let parts = t.apply(&ex, false, false).unwrap();
        assert_eq!(parts[0], "b ");
    }

    #[test]
    fn test_choice_filter() {
        let t = template("{{ labels | choice }} ||| x");
        let ex = example(&[(
            "labels",
            Value::Array(vec![Value::String("only".to_string())]),
        )]);
        let parts = t.apply(&ex, false, false).unwrap();
        assert_eq!(parts[0], "only ");
    }

    #[test]
    fn test_syntax_error_carries_template_id() {
        let t = template("{% if text %}unclosed ||| x");
        let ex = example(&[("text", Value::String("hi".to_string()))]);
        match t.apply(&ex, false, false) {
            Err(PromptStoreError::TemplateSyntax { template_id, dataset, .. }) => {
                assert_eq!(template_id, t.id());
                assert_eq!(dataset, None);
            }
            other => panic!("expected TemplateSyntax, got {:?}", other),
        }
    }
}
