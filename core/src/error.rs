//! Structured error types for the prompt-template store
//!
//! Mirrors the failure taxonomy of the public API: caller-input validation,
//! missing names/keys, name-uniqueness conflicts, template parse/render
//! failures, and storage I/O.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Primary error type for store and engine operations
#[derive(Error, Debug)]
pub enum PromptStoreError {
    /// Caller-supplied input violates a structural invariant
    /// (empty name, malformed metadata combination, reserved field name)
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// Reference to a template name or dataset key that does not exist
    #[error("not found: {what}")]
    NotFound { what: String },

    /// A mutation would give two templates the same name within one dataset
    #[error("template name '{name}' already exists for dataset {dataset}")]
    Conflict { name: String, dataset: String },

    /// The template body failed to parse or render.
    ///
    /// Always carries the template id; the owning store attaches the
    /// dataset/subset before the error crosses its boundary.
    #[error("template {template_id} for {} failed to parse or render: {message}", dataset_label(.dataset, .subset))]
    TemplateSyntax {
        dataset: Option<String>,
        subset: Option<String>,
        template_id: Uuid,
        message: String,
    },

    /// A storage document exists but cannot be (de)serialized
    #[error("malformed template document at {path}: {message}")]
    MalformedDocument { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(String),
}

impl PromptStoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}

impl From<serde_yml::Error> for PromptStoreError {
    fn from(err: serde_yml::Error) -> Self {
        Self::Yaml(err.to_string())
    }
}

fn dataset_label(dataset: &Option<String>, subset: &Option<String>) -> String {
    match (dataset, subset) {
        (Some(d), Some(s)) => format!("{}/{}", d, s),
        (Some(d), None) => d.clone(),
        _ => "<detached>".to_string(),
    }
}

/// Result type alias using PromptStoreError
pub type Result<T> = std::result::Result<T, PromptStoreError>;
