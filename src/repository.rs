//! Addin repositories and the catalog view built from them.
//!
//! A repository publishes its addins as a tree of folders. The panel only
//! reads it: to list what can be loaded, to resolve boot list entries back
//! to a display name, and to decide whether an entry is already running.

use crate::runtime::AddinRuntime;
use crate::RepositoryAddinInfo;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A folder inside a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddinsFolder {
    pub name: String,
    #[serde(default)]
    pub children: Vec<AddinsFolder>,
    #[serde(default)]
    pub addins: Vec<RepositoryAddinInfo>,
}

/// Interface the panel consumes from the host's repository index.
pub trait RepositoryIndex {
    fn root(&self) -> &AddinsFolder;

    fn find_by_load_descriptor(&self, descriptor: &str) -> Option<&RepositoryAddinInfo> {
        find_in_folder(self.root(), descriptor)
    }
}

fn find_in_folder<'a>(folder: &'a AddinsFolder, descriptor: &str) -> Option<&'a RepositoryAddinInfo> {
    folder
        .addins
        .iter()
        .find(|info| info.load == descriptor)
        .or_else(|| {
            folder
                .children
                .iter()
                .find_map(|child| find_in_folder(child, descriptor))
        })
}

/// Repository index backed by a folder tree held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub root: AddinsFolder,
}

impl Catalog {
    pub fn new(root: AddinsFolder) -> Self {
        Self { root }
    }

    /// Reads a catalog from a JSON file holding the root folder.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read catalog: {:?}", path))?;
        let root: AddinsFolder = serde_json::from_str(&content)
            .context(format!("Failed to parse catalog: {:?}", path))?;
        let catalog = Self { root };
        tracing::debug!(
            target: "addinpanel::repository",
            path = %path.display(),
            entries = catalog.entry_count(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    pub fn entry_count(&self) -> usize {
        fn count(folder: &AddinsFolder) -> usize {
            folder.addins.len() + folder.children.iter().map(count).sum::<usize>()
        }
        count(&self.root)
    }
}

impl RepositoryIndex for Catalog {
    fn root(&self) -> &AddinsFolder {
        &self.root
    }
}

/// One row of the displayed catalog: a folder or a visible entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub label: String,
    pub description: Option<String>,
    /// Load descriptor; `None` for folders.
    pub entry: Option<String>,
    /// The entry's addin is currently running in the runtime.
    pub loaded: bool,
    pub children: Vec<CatalogRow>,
}

impl CatalogRow {
    pub fn is_folder(&self) -> bool {
        self.entry.is_none()
    }
}

/// Builds the displayable catalog: folders first, then visible entries, each
/// in repository order. Hidden entries are skipped.
pub fn catalog_rows(repo: &dyn RepositoryIndex, runtime: &dyn AddinRuntime) -> Vec<CatalogRow> {
    fn walk(folder: &AddinsFolder, runtime: &dyn AddinRuntime) -> Vec<CatalogRow> {
        let mut rows = Vec::with_capacity(folder.children.len() + folder.addins.len());
        for child in &folder.children {
            rows.push(CatalogRow {
                label: child.name.clone(),
                description: None,
                entry: None,
                loaded: false,
                children: walk(child, runtime),
            });
        }
        for info in folder.addins.iter().filter(|info| !info.tags.is_hidden()) {
            let loaded = info
                .tags
                .unique_name()
                .is_some_and(|name| runtime.find_by_unique_name(name).is_some());
            rows.push(CatalogRow {
                label: info.name.clone(),
                description: info.description().map(str::to_string),
                entry: Some(info.load.clone()),
                loaded,
                children: Vec::new(),
            });
        }
        rows
    }
    walk(repo.root(), runtime)
}
