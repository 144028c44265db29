//! Static template validation
//!
//! Offline checks run against a dataset's declared record schema, without
//! rendering anything: does each body parse, does it reference only known
//! fields, does it carry exactly one prompt/target separator, and are its
//! name and body unique within the dataset. Render-time checks live in the
//! engine;
//! this pass exists so authoring defects surface in CI rather than at
//! apply time.

use std::collections::BTreeSet;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

use crate::store::dataset::DatasetTemplates;
use crate::template::render::{compile_body, SEPARATOR};

lazy_static! {
    static ref BLOCK_RE: Regex = Regex::new(r"(?s)\{\{(.*?)\}\}|\{%(.*?)%\}").unwrap();
    static ref STRING_LIT_RE: Regex = Regex::new(r#""[^"]*"|'[^']*'"#).unwrap();
    static ref FILTER_RE: Regex = Regex::new(r"\|\s*[A-Za-z_][A-Za-z0-9_]*").unwrap();
    // Keyword arguments only appear after an opening paren or a comma;
    // anchoring there keeps comparisons like `label == 1` intact.
    static ref KWARG_RE: Regex = Regex::new(r"[(,]\s*[A-Za-z_][A-Za-z0-9_]*\s*=").unwrap();
    static ref ATTR_RE: Regex = Regex::new(r"\.[A-Za-z_][A-Za-z0-9_]*").unwrap();
    static ref IDENT_RE: Regex = Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap();
    static ref FOR_BOUND_RE: Regex =
        Regex::new(r"for\s+([A-Za-z_][A-Za-z0-9_]*)(?:\s*,\s*([A-Za-z_][A-Za-z0-9_]*))?\s+in")
            .unwrap();
    static ref SET_BOUND_RE: Regex =
        Regex::new(r"set\s+([A-Za-z_][A-Za-z0-9_]*)\s*=").unwrap();
}

/// Expression keywords and tag names that are never record fields
const KEYWORDS: &[&str] = &[
    "if", "elif", "else", "endif", "for", "endfor", "in", "and", "or", "not", "is", "set",
    "endset", "with", "true", "false", "True", "False", "loop", "raw", "endraw", "filter",
    "endfilter", "block", "endblock", "macro", "endmacro", "include", "defined", "undefined",
];

/// One defect found in one template
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub template_name: String,
    pub template_id: Uuid,
    pub kind: IssueKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    /// The body does not parse in the template engine
    SyntaxError { message: String },
    /// The body references a field absent from the record schema
    UnknownVariable { variable: String },
    /// No prompt/target separator in the body
    MissingSeparator,
    /// More than one separator; the engine will return more than two parts
    MultipleSeparators { count: usize },
    /// Identical body to another template in the same dataset
    DuplicateBody { of: String },
    /// Same name as another template id, so one of the two is unreachable
    /// by name; only hand-edited documents can get into this state
    DuplicateName { with: Uuid },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "template '{}' ({}): {}",
            self.template_name, self.template_id, self.kind
        )
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SyntaxError { message } => write!(f, "failed to parse: {}", message),
            Self::UnknownVariable { variable } => {
                write!(f, "references unknown variable '{}'", variable)
            }
            Self::MissingSeparator => write!(f, "has no prompt/target separator"),
            Self::MultipleSeparators { count } => {
                write!(f, "has {} separators, expected exactly one", count)
            }
            Self::DuplicateBody { of } => {
                write!(f, "has the same body as template '{}'", of)
            }
            Self::DuplicateName { with } => {
                write!(f, "shares its name with template {}", with)
            }
        }
    }
}

/// Normalize a declared schema the way the engine normalizes records:
/// hyphens in field names become underscores.
pub fn normalized_schema<I, S>(fields: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fields
        .into_iter()
        .map(|f| f.as_ref().replace('-', "_"))
        .collect()
}

/// Free variable names referenced by a template body.
///
/// A textual scan, not a full parse: string and number literals, filter
/// names, keyword arguments, attribute access, loop- and set-bound names,
/// and the injected `answer_choices` are all excluded. Good enough to catch
/// schema drift; exotic expressions may slip through rather than
/// false-positive.
pub fn template_variables(jinja: &str) -> BTreeSet<String> {
    let mut bound: BTreeSet<String> = BTreeSet::new();
    let mut variables = BTreeSet::new();

    for capture in BLOCK_RE.captures_iter(jinja) {
        let content = capture
            .get(1)
            .or_else(|| capture.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        for bound_capture in FOR_BOUND_RE.captures_iter(content) {
            for group in [1, 2] {
                if let Some(name) = bound_capture.get(group) {
                    bound.insert(name.as_str().to_string());
                }
            }
        }
        for bound_capture in SET_BOUND_RE.captures_iter(content) {
            bound.insert(bound_capture[1].to_string());
        }
    }

    for capture in BLOCK_RE.captures_iter(jinja) {
        let content = capture
            .get(1)
            .or_else(|| capture.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        let stripped = STRING_LIT_RE.replace_all(content, " ");
        let stripped = FILTER_RE.replace_all(&stripped, " ");
        let stripped = KWARG_RE.replace_all(&stripped, " ");
        let stripped = ATTR_RE.replace_all(&stripped, " ");

        for ident in IDENT_RE.find_iter(&stripped) {
            let name = ident.as_str();
            if KEYWORDS.contains(&name) || name == "answer_choices" || bound.contains(name) {
                continue;
            }
            variables.insert(name.to_string());
        }
    }
    variables
}

/// Check every template in a dataset store against a record schema.
/// Returns all issues found; an empty result means the store is clean.
pub fn validate_dataset(
    store: &DatasetTemplates,
    schema: &BTreeSet<String>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut seen_bodies: Vec<(String, String)> = Vec::new();

    for name in store.all_template_names() {
        let template = store
            .get_template(&name)
            .expect("name list is derived from the template map");
        let issue = |kind: IssueKind| ValidationIssue {
            template_name: name.clone(),
            template_id: template.id(),
            kind,
        };

        match compile_body(&template.jinja) {
            Ok(()) => {
                for variable in template_variables(&template.jinja) {
                    if !schema.contains(&variable) {
                        issues.push(issue(IssueKind::UnknownVariable { variable }));
                    }
                }
            }
            Err(message) => issues.push(issue(IssueKind::SyntaxError { message })),
        }

        let separators = template.jinja.matches(SEPARATOR).count();
        match separators {
            0 => issues.push(issue(IssueKind::MissingSeparator)),
            1 => {}
            count => issues.push(issue(IssueKind::MultipleSeparators { count })),
        }

        if let Some((first, _)) = seen_bodies.iter().find(|(_, body)| *body == template.jinja) {
            issues.push(issue(IssueKind::DuplicateBody { of: first.clone() }));
        } else {
            seen_bodies.push((name.clone(), template.jinja.clone()));
        }
    }

    // The loop above resolves names through the index, which hides templates
    // shadowed by a name collision in a hand-edited document. Walk the
    // id-keyed map so every colliding entry is reported.
    let mut seen_names: Vec<(String, Uuid)> = Vec::new();
    for template in store.templates() {
        let first = seen_names
            .iter()
            .find(|(name, _)| *name == template.name)
            .map(|(_, id)| *id);
        match first {
            Some(with) => issues.push(ValidationIssue {
                template_name: template.name.clone(),
                template_id: template.id(),
                kind: IssueKind::DuplicateName { with },
            }),
            None => seen_names.push((template.name.clone(), template.id())),
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::metadata::{TaskFormat, TemplateMetadata};
    use crate::template::Template;
    use tempfile::TempDir;

    fn template(name: &str, jinja: &str) -> Template {
        Template::new(
            name,
            jinja,
            "",
            false,
            None,
            TemplateMetadata::new(TaskFormat::Generation, "someone"),
        )
        .unwrap()
    }

    fn store_with(templates: Vec<Template>) -> (TempDir, DatasetTemplates) {
        let dir = TempDir::new().unwrap();
        let mut store = DatasetTemplates::load(dir.path(), "ds", None).unwrap();
        for t in templates {
            store.add_template(t).unwrap();
        }
        (dir, store)
    }

    #[test]
    fn test_variable_extraction() {
        let vars = template_variables(
            "{{text}} {% for c in choices %}{{c}}{% endfor %} ||| {{ answer_choices[label] }}",
        );
        let expected: BTreeSet<String> = ["text", "choices", "label"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(vars, expected);
    }

    #[test]
    fn test_extraction_skips_literals_filters_and_kwargs() {
        let vars = template_variables(
            "{{ \"constant\" }} {{ text | truncate(length=10) }} {% if label is defined %}x{% endif %}",
        );
        let expected: BTreeSet<String> =
            ["text", "label"].iter().map(|s| s.to_string()).collect();
        assert_eq!(vars, expected);
    }

    #[test]
    fn test_extraction_skips_attribute_names() {
        let vars = template_variables("{{ record.field }} ||| x");
        let expected: BTreeSet<String> = ["record"].iter().map(|s| s.to_string()).collect();
        assert_eq!(vars, expected);
    }

    #[test]
    fn test_unknown_variable_flagged() {
        let (_dir, store) = store_with(vec![template("t", "{{text}} ||| {{mystery}}")]);
        let schema = normalized_schema(["text", "label"]);
        let issues = validate_dataset(&store, &schema);
        assert_eq!(issues.len(), 1);
        assert_eq!(
            issues[0].kind,
            IssueKind::UnknownVariable {
                variable: "mystery".to_string()
            }
        );
    }

    #[test]
    fn test_hyphenated_schema_fields_match_normalized_variables() {
        let (_dir, store) = store_with(vec![template("t", "{{review_text}} ||| ok")]);
        let schema = normalized_schema(["review-text"]);
        assert!(validate_dataset(&store, &schema).is_empty());
    }

    #[test]
    fn test_separator_counting() {
        let (_dir, store) = store_with(vec![
            template("none", "{{text}} no separator"),
            template("two", "{{text}} ||| a ||| b"),
        ]);
        let schema = normalized_schema(["text"]);
        let issues = validate_dataset(&store, &schema);
        assert!(issues
            .iter()
            .any(|i| i.template_name == "none" && i.kind == IssueKind::MissingSeparator));
        assert!(issues
            .iter()
            .any(|i| i.template_name == "two"
                && i.kind == IssueKind::MultipleSeparators { count: 2 }));
    }

    #[test]
    fn test_syntax_error_flagged() {
        let (_dir, store) = store_with(vec![template("broken", "{% if x %}unclosed ||| y")]);
        let schema = normalized_schema(["x"]);
        let issues = validate_dataset(&store, &schema);
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0].kind, IssueKind::SyntaxError { .. }));
    }

    #[test]
    fn test_duplicate_bodies_flagged() {
        let (_dir, store) = store_with(vec![
            template("alpha", "{{text}} ||| same"),
            template("beta", "{{text}} ||| same"),
        ]);
        let schema = normalized_schema(["text"]);
        let issues = validate_dataset(&store, &schema);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].template_name, "beta");
        assert_eq!(
            issues[0].kind,
            IssueKind::DuplicateBody {
                of: "alpha".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_names_flagged() {
        let dir = TempDir::new().unwrap();
        let mut store = DatasetTemplates::load(dir.path(), "ds", None).unwrap();
        store
            .add_template(template("one", "{{text}} ||| a"))
            .unwrap();
        store
            .add_template(template("two", "{{text}} ||| b"))
            .unwrap();

        // Name collisions only arise from hand-edited documents; mutation
        // paths reject them up front.
        let path = store.yaml_path();
        let edited = std::fs::read_to_string(&path).unwrap().replace("two", "one");
        std::fs::write(&path, edited).unwrap();

        let store = DatasetTemplates::load(dir.path(), "ds", None).unwrap();
        let schema = normalized_schema(["text"]);
        let issues = validate_dataset(&store, &schema);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].template_name, "one");
        assert!(matches!(issues[0].kind, IssueKind::DuplicateName { .. }));
    }

    #[test]
    fn test_clean_store_has_no_issues() {
        let (_dir, store) = store_with(vec![template(
            "good",
            "{{text}} {{ answer_choices[0] }} ||| {{label}}",
        )]);
        let schema = normalized_schema(["text", "label"]);
        assert!(validate_dataset(&store, &schema).is_empty());
    }
}
