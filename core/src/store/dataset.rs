//! Per-dataset template set with durable YAML storage
//!
//! One YAML document per (dataset, subset) pair at
//! `<root>/<dataset>[/<subset>]/templates.yaml`. The document is id-keyed;
//! a name-to-id index is derived in memory and recomputed on every load and
//! mutation, so the name-uniqueness invariant is never observable as stale.
//! Every mutation rewrites the whole document.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{PromptStoreError, Result};
use crate::template::render::Example;
use crate::template::Template;

/// File name of the durable document inside a dataset/subset folder
pub(crate) const TEMPLATES_FILE_NAME: &str = "templates.yaml";

/// On-disk shape of one (dataset, subset) store
#[derive(Debug, Serialize, Deserialize)]
struct TemplateDocument {
    dataset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subset: Option<String>,
    #[serde(default)]
    templates: BTreeMap<Uuid, Template>,
}

/// All templates belonging to one (dataset, subset) identity.
///
/// Owns its templates exclusively; mutations persist immediately and keep
/// the derived name index consistent.
#[derive(Debug)]
pub struct DatasetTemplates {
    dataset_name: String,
    subset_name: Option<String>,
    root: PathBuf,
    templates: BTreeMap<Uuid, Template>,
    name_index: HashMap<String, Uuid>,
}

impl DatasetTemplates {
    /// Load the store for a (dataset, subset) pair, or start empty when no
    /// document exists yet ("no templates yet" is a valid, common state).
    pub fn load(
        root: impl Into<PathBuf>,
        dataset_name: impl Into<String>,
        subset_name: Option<String>,
    ) -> Result<Self> {
        let mut store = Self {
            dataset_name: dataset_name.into(),
            subset_name,
            root: root.into(),
            templates: BTreeMap::new(),
            name_index: HashMap::new(),
        };

        let path = store.yaml_path();
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            let document: TemplateDocument =
                serde_yml::from_str(&content).map_err(|e| PromptStoreError::MalformedDocument {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            {
                // Documents are hand-editable; flag broken metadata and name
                // collisions but keep every template loadable.
                let mut names_seen: HashMap<&str, Uuid> = HashMap::new();
                for (id, template) in &document.templates {
                    if let Err(e) = template.metadata.validate() {
                        warn!(
                            template = %template.name,
                            dataset = %store.dataset_name,
                            "template metadata violates invariants: {}",
                            e
                        );
                    }
                    if let Some(other) = names_seen.insert(template.name.as_str(), *id) {
                        warn!(
                            template = %template.name,
                            dataset = %store.dataset_name,
                            "templates {} and {} share one name; only one is reachable by name",
                            other,
                            id
                        );
                    }
                }
            }
            store.templates = document.templates;
            store.sync_name_index();
            debug!(
                dataset = %store.qualified_name(),
                count = store.templates.len(),
                "loaded template store"
            );
        }
        Ok(store)
    }

    pub fn dataset_name(&self) -> &str {
        &self.dataset_name
    }

    pub fn subset_name(&self) -> Option<&str> {
        self.subset_name.as_deref()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Folder holding this store's document
    pub fn folder_path(&self) -> PathBuf {
        let mut path = self.root.join(&self.dataset_name);
        if let Some(subset) = &self.subset_name {
            path = path.join(subset);
        }
        path
    }

    /// Full path of this store's document
    pub fn yaml_path(&self) -> PathBuf {
        self.folder_path().join(TEMPLATES_FILE_NAME)
    }

    /// "dataset" or "dataset/subset", for log and error labels
    pub fn qualified_name(&self) -> String {
        match &self.subset_name {
            Some(subset) => format!("{}/{}", self.dataset_name, subset),
            None => self.dataset_name.clone(),
        }
    }

    /// Insert a new template and persist.
    ///
    /// Fails with a conflict when a template with the same name already
    /// exists; the store is left untouched in that case.
    pub fn add_template(&mut self, template: Template) -> Result<()> {
        if self.name_index.contains_key(&template.name) {
            return Err(PromptStoreError::Conflict {
                name: template.name.clone(),
                dataset: self.qualified_name(),
            });
        }
        debug!(
            dataset = %self.qualified_name(),
            template = %template.name,
            "adding template"
        );
        self.templates.insert(template.id(), template);
        self.sync_name_index();
        self.write_to_file()
    }

    /// Remove a template by name and persist.
    ///
    /// Removing the last template deletes the document and its folder; if
    /// that leaves the dataset folder empty, the dataset folder is deleted
    /// too.
    pub fn remove_template(&mut self, name: &str) -> Result<()> {
        let id = *self.name_index.get(name).ok_or_else(|| {
            PromptStoreError::not_found(format!(
                "no template named '{}' for dataset {}",
                name,
                self.qualified_name()
            ))
        })?;
        self.templates.remove(&id);
        self.sync_name_index();
        debug!(
            dataset = %self.qualified_name(),
            template = %name,
            "removed template"
        );
        if self.templates.is_empty() {
            self.delete_storage()
        } else {
            self.write_to_file()
        }
    }

    /// Rewrite a template's mutable fields atomically (id unchanged) and
    /// persist. All checks run before any field is touched.
    pub fn update_template(
        &mut self,
        current_name: &str,
        new_name: &str,
        jinja: impl Into<String>,
        reference: impl Into<String>,
        task_template: bool,
        answer_choices: Option<String>,
    ) -> Result<()> {
        if new_name.trim().is_empty() {
            return Err(PromptStoreError::validation(
                "template name must not be empty",
            ));
        }
        let id = *self.name_index.get(current_name).ok_or_else(|| {
            PromptStoreError::not_found(format!(
                "no template named '{}' for dataset {}",
                current_name,
                self.qualified_name()
            ))
        })?;
        if let Some(existing) = self.name_index.get(new_name) {
            if *existing != id {
                return Err(PromptStoreError::Conflict {
                    name: new_name.to_string(),
                    dataset: self.qualified_name(),
                });
            }
        }

        let template = self
            .templates
            .get_mut(&id)
            .expect("name index out of sync with template map");
        template.name = new_name.to_string();
        template.jinja = jinja.into();
        template.reference = reference.into();
        template.task_template = task_template;
        template.answer_choices = answer_choices;

        self.sync_name_index();
        self.write_to_file()
    }

    /// Resolve a template by its current name
    pub fn get_template(&self, name: &str) -> Result<&Template> {
        let id = self.name_index.get(name).ok_or_else(|| {
            PromptStoreError::not_found(format!(
                "no template named '{}' for dataset {}",
                name,
                self.qualified_name()
            ))
        })?;
        Ok(&self.templates[id])
    }

    /// Render a named template against a record, labeling any syntax error
    /// with this store's identity.
    pub fn apply_template(
        &self,
        name: &str,
        example: &Example,
        truncate: bool,
        highlight_variables: bool,
    ) -> Result<Vec<String>> {
        let template = self.get_template(name)?;
        template
            .apply(example, truncate, highlight_variables)
            .map_err(|e| self.attach_identity(e))
    }

    /// All current template names, sorted by name. The ordering is a display
    /// contract for viewers and enumeration consumers.
    pub fn all_template_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.name_index.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn templates(&self) -> impl Iterator<Item = &Template> {
        self.templates.values()
    }

    fn attach_identity(&self, err: PromptStoreError) -> PromptStoreError {
        match err {
            PromptStoreError::TemplateSyntax {
                template_id,
                message,
                ..
            } => PromptStoreError::TemplateSyntax {
                dataset: Some(self.dataset_name.clone()),
                subset: self.subset_name.clone(),
                template_id,
                message,
            },
            other => other,
        }
    }

    fn sync_name_index(&mut self) {
        self.name_index = self
            .templates
            .iter()
            .map(|(id, template)| (template.name.clone(), *id))
            .collect();
    }

    fn write_to_file(&self) -> Result<()> {
        let folder = self.folder_path();
        fs::create_dir_all(&folder)?;
        let document = TemplateDocument {
            dataset: self.dataset_name.clone(),
            subset: self.subset_name.clone(),
            templates: self.templates.clone(),
        };
        let content = serde_yml::to_string(&document)?;
        fs::write(self.yaml_path(), content)?;
        Ok(())
    }

    fn delete_storage(&self) -> Result<()> {
        let path = self.yaml_path();
        if path.exists() {
            fs::remove_file(&path)?;
        }
        let folder = self.folder_path();
        if folder.exists() && dir_is_empty(&folder)? {
            fs::remove_dir(&folder)?;
        }
        if self.subset_name.is_some() {
            let dataset_folder = self.root.join(&self.dataset_name);
            if dataset_folder.exists() && dir_is_empty(&dataset_folder)? {
                fs::remove_dir(&dataset_folder)?;
            }
        }
        debug!(dataset = %self.qualified_name(), "deleted empty template store");
        Ok(())
    }
}

fn dir_is_empty(path: &Path) -> Result<bool> {
    Ok(fs::read_dir(path)?.next().is_none())
}
