//! Template metadata: task shape, provenance, and evaluation hints
//!
//! The task shape is a tagged variant rather than a flat struct of
//! conditionally-meaningful optionals: only classification carries the
//! answer-choice bookkeeping, generation and extraction carry nothing extra.

use serde::{Deserialize, Serialize};

use crate::error::{PromptStoreError, Result};

/// The shape of the task a template expresses.
///
/// Serialized with an internal `task_format` tag, so a YAML document reads
/// as a flat mapping (`task_format: classification`, `fixed_choices: true`,
/// ...) alongside the other metadata fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task_format", rename_all = "snake_case")]
pub enum TaskFormat {
    /// The template asks for one of a known set of answers
    Classification {
        /// Whether the prompt text itself spells out the candidate answers
        #[serde(default)]
        choices_in_prompt: bool,
        /// Whether the candidate answers are the same for every example
        fixed_choices: bool,
        /// Record field holding per-example choices; required when
        /// `fixed_choices` is false
        #[serde(default, skip_serializing_if = "Option::is_none")]
        choices_fieldname: Option<String>,
    },
    /// Open-ended text generation
    Generation,
    /// Span or value extraction from the input
    Extraction,
}

impl TaskFormat {
    /// Build a classification task shape, enforcing the invariants that the
    /// flat legacy representation only checked at write time:
    /// `fixed_choices` must be decided, and per-example choices need a
    /// record field to come from.
    pub fn classification(
        choices_in_prompt: bool,
        fixed_choices: Option<bool>,
        choices_fieldname: Option<String>,
    ) -> Result<Self> {
        let fixed_choices = fixed_choices.ok_or_else(|| {
            PromptStoreError::validation("classification metadata requires fixed_choices to be set")
        })?;
        if !fixed_choices && choices_fieldname.is_none() {
            return Err(PromptStoreError::validation(
                "classification metadata requires choices_fieldname when fixed_choices is false",
            ));
        }
        Ok(Self::Classification {
            choices_in_prompt,
            fixed_choices,
            choices_fieldname,
        })
    }
}

/// Descriptive metadata carried by every template, one-to-one and with the
/// same lifetime as its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMetadata {
    #[serde(flatten)]
    pub task_format: TaskFormat,

    /// Whether the template reproduces the dataset's original task.
    /// None means the contributor has not decided yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_task: Option<bool>,

    /// Who authored the template
    #[serde(default)]
    pub contributor: String,

    /// Suggested evaluation metric
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl TemplateMetadata {
    pub fn new(task_format: TaskFormat, contributor: impl Into<String>) -> Self {
        Self {
            task_format,
            original_task: None,
            contributor: contributor.into(),
            metric: None,
            comment: None,
        }
    }

    /// Re-check the classification invariants.
    ///
    /// The typed constructors cannot produce an invalid value, but documents
    /// are human-editable YAML and may arrive in any state.
    pub fn validate(&self) -> Result<()> {
        if let TaskFormat::Classification {
            fixed_choices: false,
            choices_fieldname: None,
            ..
        } = &self.task_format
        {
            return Err(PromptStoreError::validation(
                "classification metadata requires choices_fieldname when fixed_choices is false",
            ));
        }
        Ok(())
    }
}

impl Default for TemplateMetadata {
    fn default() -> Self {
        Self::new(TaskFormat::Generation, "")
    }
}
