//! A single named, versioned prompt-rendering rule
//!
//! A template is a Jinja-style string with one literal `|||` separator
//! dividing the prompt region from the target region. Rendering it against
//! a structured record produces the (prompt, target) pair; see [`render`].

pub mod metadata;
pub mod render;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PromptStoreError, Result};
use metadata::TemplateMetadata;
use render::SEPARATOR;

/// A named prompt template with an immutable identity.
///
/// The id is assigned once at construction and never recomputed from
/// content; `name` is the human-facing handle and is only unique within
/// the owning [`DatasetTemplates`](crate::store::dataset::DatasetTemplates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    id: Uuid,

    /// Human-assigned name, unique per dataset
    pub name: String,

    /// Template body with a `|||` prompt/target separator
    pub jinja: String,

    /// Free-text provenance (author or paper reference)
    #[serde(default)]
    pub reference: String,

    /// Whether this template expresses the dataset's canonical task
    #[serde(default)]
    pub task_template: bool,

    /// Fixed answer choices as a `" ||| "`-delimited string, or None for
    /// open-ended generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_choices: Option<String>,

    #[serde(default)]
    pub metadata: TemplateMetadata,
}

impl Template {
    /// Create a template with a fresh id.
    ///
    /// Metadata invariants are checked here, before the template can become
    /// visible to any store.
    pub fn new(
        name: impl Into<String>,
        jinja: impl Into<String>,
        reference: impl Into<String>,
        task_template: bool,
        answer_choices: Option<String>,
        metadata: TemplateMetadata,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PromptStoreError::validation(
                "template name must not be empty",
            ));
        }
        metadata.validate()?;
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            jinja: jinja.into(),
            reference: reference.into(),
            task_template,
            answer_choices,
            metadata,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The fixed answer choices as a list, split on the separator and
    /// trimmed, or None when the template is open-ended.
    pub fn fixed_answer_choices_list(&self) -> Option<Vec<String>> {
        self.answer_choices
            .as_ref()
            .map(|choices| choices.split(SEPARATOR).map(|c| c.trim().to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metadata::TaskFormat;

    fn generation_metadata() -> TemplateMetadata {
        TemplateMetadata::new(TaskFormat::Generation, "someone")
    }

    #[test]
    fn test_new_assigns_distinct_ids() {
        let a = Template::new("a", "{{x}} ||| {{y}}", "", false, None, generation_metadata())
            .unwrap();
        let b = Template::new("a", "{{x}} ||| {{y}}", "", false, None, generation_metadata())
            .unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = Template::new("  ", "{{x}} ||| {{y}}", "", false, None, generation_metadata());
        assert!(matches!(result, Err(PromptStoreError::Validation { .. })));
    }

    #[test]
    fn test_invalid_metadata_rejected_at_construction() {
        let yaml = "task_format: classification\nfixed_choices: false\ncontributor: x\n";
        let metadata: TemplateMetadata = serde_yml::from_str(yaml).unwrap();
        let result = Template::new("bad", "{{x}} ||| {{y}}", "", false, None, metadata);
        assert!(matches!(result, Err(PromptStoreError::Validation { .. })));
    }

    #[test]
    fn test_fixed_answer_choices_list() {
        let template = Template::new(
            "choices",
            "{{x}} ||| {{y}}",
            "",
            false,
            Some("yes ||| no".to_string()),
            generation_metadata(),
        )
        .unwrap();
        assert_eq!(
            template.fixed_answer_choices_list(),
            Some(vec!["yes".to_string(), "no".to_string()])
        );

        let open = Template::new("open", "{{x}} ||| {{y}}", "", false, None, generation_metadata())
            .unwrap();
        assert_eq!(open.fixed_answer_choices_list(), None);
    }
}
