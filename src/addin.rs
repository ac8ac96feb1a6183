use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Stable handle of a group in the runtime's live hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u64);

/// Stable handle of a loaded addin. Handles are never reused, so a reloaded
/// addin always gets a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddinId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

impl fmt::Display for AddinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "addin#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct AddinGroup {
    pub id: GroupId,
    pub name: String,
    pub parent: Option<GroupId>,
    pub children: Vec<GroupId>,
    pub addins: Vec<AddinId>,
}

#[derive(Debug, Clone)]
pub struct Addin {
    pub id: AddinId,
    pub unique_name: String,
    pub display_name: String,
    pub full_path: PathBuf,
    pub group: GroupId,
}

/// A catalog entry as published by an addin repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryAddinInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Opaque string the runtime needs to load this addin.
    pub load: String,
    #[serde(default)]
    pub tags: AddinTags,
    #[serde(default)]
    pub help_path: Option<String>,
}

/// Free-form tags attached to a catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddinTags(pub BTreeMap<String, String>);

impl AddinTags {
    pub const HIDDEN: &'static str = "hidden";
    pub const STANDARD: &'static str = "is-standard";
    pub const UNIQUE_NAME: &'static str = "uname";
    pub const DESCRIPTION: &'static str = "descr";

    pub fn get(&self, tag: &str) -> Option<&str> {
        self.0.get(tag).map(String::as_str)
    }

    pub fn is_hidden(&self) -> bool {
        self.get(Self::HIDDEN) == Some("yes")
    }

    pub fn is_standard(&self) -> bool {
        matches!(self.get(Self::STANDARD), Some("yes") | Some("true") | Some(""))
    }

    pub fn unique_name(&self) -> Option<&str> {
        self.get(Self::UNIQUE_NAME).filter(|name| !name.is_empty())
    }
}

impl RepositoryAddinInfo {
    pub fn is_standard(&self) -> bool {
        self.tags.is_standard()
    }

    /// Text shown next to the entry: explicit description, else the `descr` tag.
    pub fn description(&self) -> Option<&str> {
        self.description
            .as_deref()
            .or_else(|| self.tags.get(AddinTags::DESCRIPTION))
    }
}
