//! Registry of all per-dataset template stores under one storage root
//!
//! Built by an explicit one-time scan of the root (never re-scanned; callers
//! needing freshness construct a new collection). The collection is a plain
//! owned object handed to whoever needs it, not process-global state.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::store::dataset::{DatasetTemplates, TEMPLATES_FILE_NAME};

/// Composite identity of one template store. Used uniformly everywhere a
/// dataset is keyed; `subset: None` means the dataset has no
/// sub-configurations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatasetKey {
    pub dataset: String,
    pub subset: Option<String>,
}

impl DatasetKey {
    pub fn new(dataset: impl Into<String>, subset: Option<String>) -> Self {
        Self {
            dataset: dataset.into(),
            subset,
        }
    }
}

impl std::fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.subset {
            Some(subset) => write!(f, "{}/{}", self.dataset, subset),
            None => write!(f, "{}", self.dataset),
        }
    }
}

/// Read-only description of one template for downstream mixture builders
#[derive(Debug, Clone, Serialize)]
pub struct TemplateSummary {
    pub dataset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subset: Option<String>,
    pub name: String,
    /// Whether the template expresses the dataset's canonical task
    pub original_task: bool,
    /// Whether fixed answer choices make it scorable as multiple choice
    pub multiple_choice: bool,
}

/// All known dataset template stores, discovered from a storage root.
pub struct TemplateCollection {
    root: PathBuf,
    datasets: BTreeMap<DatasetKey, DatasetTemplates>,
}

impl TemplateCollection {
    /// Scan the root once and load every discovered store. A dataset folder
    /// with a document directly inside is a flat (dataset, None) store; each
    /// sub-folder with a document is a (dataset, subset) store. A missing
    /// root is an empty collection.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let mut collection = Self {
            root,
            datasets: BTreeMap::new(),
        };
        collection.discover()?;
        Ok(collection)
    }

    fn discover(&mut self) -> Result<()> {
        if !self.root.exists() {
            debug!(root = %self.root.display(), "template root does not exist; starting empty");
            return Ok(());
        }
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dataset_dir = entry.path();
            let dataset = file_name_string(&dataset_dir);

            if dataset_dir.join(TEMPLATES_FILE_NAME).exists() {
                let key = DatasetKey::new(dataset.clone(), None);
                let store = DatasetTemplates::load(&self.root, &dataset, None)?;
                self.datasets.insert(key, store);
                continue;
            }

            for subset_entry in fs::read_dir(&dataset_dir)? {
                let subset_entry = subset_entry?;
                if !subset_entry.file_type()?.is_dir() {
                    continue;
                }
                let subset_dir = subset_entry.path();
                if !subset_dir.join(TEMPLATES_FILE_NAME).exists() {
                    continue;
                }
                let subset = file_name_string(&subset_dir);
                let key = DatasetKey::new(dataset.clone(), Some(subset.clone()));
                let store = DatasetTemplates::load(&self.root, &dataset, Some(subset))?;
                self.datasets.insert(key, store);
            }
        }
        debug!(
            root = %self.root.display(),
            stores = self.datasets.len(),
            "discovered template stores"
        );
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fetch the store for a key, registering an empty one when the key has
    /// not been seen. Absence is not an error here; a syntactically valid
    /// key always yields a store.
    pub fn get_dataset(
        &mut self,
        dataset: &str,
        subset: Option<&str>,
    ) -> Result<&mut DatasetTemplates> {
        let key = DatasetKey::new(dataset, subset.map(str::to_string));
        if !self.datasets.contains_key(&key) {
            let store =
                DatasetTemplates::load(&self.root, dataset, subset.map(str::to_string))?;
            self.datasets.insert(key.clone(), store);
        }
        Ok(self
            .datasets
            .get_mut(&key)
            .expect("store registered just above"))
    }

    pub fn keys(&self) -> impl Iterator<Item = &DatasetKey> {
        self.datasets.keys()
    }

    /// Total number of templates across all stores
    pub fn len(&self) -> usize {
        self.datasets.values().map(DatasetTemplates::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Template counts per dataset name, subsets folded into their dataset
    pub fn counts_by_dataset(&self) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for (key, store) in &self.datasets {
            *counts.entry(key.dataset.clone()).or_default() += store.len();
        }
        counts
    }

    /// Drop an entry from the in-memory map only; durable storage is
    /// untouched (deletion cascades go through the store itself). Used to
    /// filter a dataset out of a downstream view.
    pub fn remove(&mut self, dataset: &str, subset: Option<&str>) -> Option<DatasetTemplates> {
        let key = DatasetKey::new(dataset, subset.map(str::to_string));
        self.datasets.remove(&key)
    }

    /// Read-only per-template summaries for mixture registration
    pub fn summaries(&self) -> Vec<TemplateSummary> {
        let mut summaries = Vec::new();
        for (key, store) in &self.datasets {
            for name in store.all_template_names() {
                let template = store
                    .get_template(&name)
                    .expect("name list and index are derived from the same map");
                summaries.push(TemplateSummary {
                    dataset: key.dataset.clone(),
                    subset: key.subset.clone(),
                    name,
                    original_task: template.task_template,
                    multiple_choice: template.answer_choices.is_some(),
                });
            }
        }
        summaries
    }
}

fn file_name_string(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
