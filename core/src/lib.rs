pub mod augment;
pub mod error;
pub mod store;
pub mod template;
pub mod validate;

// Re-exports for convenience
pub use error::{PromptStoreError, Result};
pub use store::collection::{DatasetKey, TemplateCollection, TemplateSummary};
pub use store::dataset::DatasetTemplates;
pub use template::metadata::{TaskFormat, TemplateMetadata};
pub use template::render::Example;
pub use template::Template;
