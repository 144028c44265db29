//! Durable template storage: per-dataset stores and the discovery registry

pub mod collection;
pub mod dataset;

use std::path::PathBuf;

/// Resolve the default store root: a `templates/` directory in the working
/// directory when present (the datasets-repo layout), otherwise a per-user
/// location.
pub fn default_store_root() -> PathBuf {
    let project = PathBuf::from("templates");
    if project.exists() {
        return project;
    }
    dirs::config_dir()
        .map(|d| d.join("promptstore").join("templates"))
        .unwrap_or(project)
}
