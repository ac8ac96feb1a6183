//! The boot list: the user's tree of addins to load at host startup.
//!
//! The tree is edited in memory and only written back to the profile on an
//! explicit [`BootList::save`]. Every edit validates before it mutates, so a
//! rejected edit leaves the tree exactly as it was.
//!
//! Invariants held at all times:
//! - the root is a group and can't be deleted, renamed or moved;
//! - sibling groups have distinct names, compared case-insensitively;
//! - a load descriptor appears in at most one leaf of the whole tree;
//! - only groups have children.

use crate::error::{PanelError, Result};
use crate::profile::ProfileStore;
use crate::repository::RepositoryIndex;
use crate::RepositoryAddinInfo;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Persisted form of one boot list row. The synthetic root is never stored;
/// the profile holds the list of its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootEntry {
    /// Group name, or load descriptor for a leaf.
    pub addin: String,
    pub is_group: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BootEntry>,
}

impl BootEntry {
    pub fn group(name: &str, children: Vec<BootEntry>) -> Self {
        Self {
            addin: name.to_string(),
            is_group: true,
            children,
        }
    }

    pub fn leaf(descriptor: &str) -> Self {
        Self {
            addin: descriptor.to_string(),
            is_group: false,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BootNodeId(usize);

impl BootNodeId {
    pub fn raw(self) -> u64 {
        self.0 as u64
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw as usize)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootNodeKind {
    Group {
        name: String,
    },
    Leaf {
        descriptor: String,
        /// Catalog name of the addin; empty when the catalog doesn't know it.
        display_name: String,
    },
}

#[derive(Debug, Clone)]
struct BootNode {
    kind: BootNodeKind,
    parent: Option<BootNodeId>,
    children: Vec<BootNodeId>,
}

/// Result of comparing the edited list against the saved one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootListDiff {
    pub changed: bool,
    /// Descriptors present in the edited list but not in the saved one.
    pub added: Vec<String>,
    /// Descriptors present in the saved list but no longer in the edited one.
    pub removed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BootList {
    nodes: BTreeMap<BootNodeId, BootNode>,
    root: BootNodeId,
    next_id: usize,
    selected: Option<BootNodeId>,
}

impl BootList {
    pub fn new(root_caption: &str) -> Self {
        let root = BootNodeId(0);
        let mut nodes = BTreeMap::new();
        nodes.insert(
            root,
            BootNode {
                kind: BootNodeKind::Group {
                    name: root_caption.to_string(),
                },
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            nodes,
            root,
            next_id: 1,
            selected: None,
        }
    }

    /// Builds a list from persisted entries, resolving display names.
    pub fn from_entries(
        root_caption: &str,
        entries: &[BootEntry],
        repo: &dyn RepositoryIndex,
    ) -> Self {
        let mut list = Self::new(root_caption);
        let root = list.root;
        list.graft(root, entries, repo);
        list
    }

    fn graft(&mut self, parent: BootNodeId, entries: &[BootEntry], repo: &dyn RepositoryIndex) {
        for entry in entries {
            let kind = if entry.is_group {
                BootNodeKind::Group {
                    name: entry.addin.clone(),
                }
            } else {
                BootNodeKind::Leaf {
                    descriptor: entry.addin.clone(),
                    display_name: resolve_display_name(repo, &entry.addin),
                }
            };
            let id = self.push(parent, kind);
            if entry.is_group {
                self.graft(id, &entry.children, repo);
            }
        }
    }

    pub fn root(&self) -> BootNodeId {
        self.root
    }

    pub fn selected(&self) -> Option<BootNodeId> {
        self.selected
    }

    pub fn select(&mut self, id: BootNodeId) -> Result<()> {
        self.node(id)?;
        self.selected = Some(id);
        Ok(())
    }

    pub fn kind(&self, id: BootNodeId) -> Option<&BootNodeKind> {
        self.nodes.get(&id).map(|node| &node.kind)
    }

    pub fn parent(&self, id: BootNodeId) -> Option<BootNodeId> {
        self.nodes.get(&id).and_then(|node| node.parent)
    }

    pub fn children(&self, id: BootNodeId) -> &[BootNodeId] {
        self.nodes
            .get(&id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_group(&self, id: BootNodeId) -> bool {
        matches!(self.kind(id), Some(BootNodeKind::Group { .. }))
    }

    /// Group name or load descriptor of a node.
    pub fn label(&self, id: BootNodeId) -> Option<&str> {
        self.kind(id).map(|kind| match kind {
            BootNodeKind::Group { name } => name.as_str(),
            BootNodeKind::Leaf { descriptor, .. } => descriptor.as_str(),
        })
    }

    /// Leaf whose load descriptor is exactly `descriptor`.
    pub fn find_leaf(&self, descriptor: &str) -> Option<BootNodeId> {
        self.nodes.iter().find_map(|(id, node)| match &node.kind {
            BootNodeKind::Leaf { descriptor: d, .. } if d == descriptor => Some(*id),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children(self.root).is_empty()
    }

    fn node(&self, id: BootNodeId) -> Result<&BootNode> {
        self.nodes
            .get(&id)
            .ok_or_else(|| PanelError::validation("The row no longer exists"))
    }

    fn push(&mut self, parent: BootNodeId, kind: BootNodeKind) -> BootNodeId {
        let id = BootNodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            BootNode {
                kind,
                parent: Some(parent),
                children: Vec::new(),
            },
        );
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.push(id);
        }
        id
    }

    fn require_group(&self, parent: BootNodeId) -> Result<()> {
        match self.node(parent)?.kind {
            BootNodeKind::Group { .. } => Ok(()),
            BootNodeKind::Leaf { .. } => Err(PanelError::validation(
                "An addin row cannot contain other rows",
            )),
        }
    }

    fn sibling_group_named(
        &self,
        parent: BootNodeId,
        name: &str,
        except: Option<BootNodeId>,
    ) -> Option<BootNodeId> {
        let wanted = name.to_lowercase();
        self.children(parent).iter().copied().find(|child| {
            Some(*child) != except
                && matches!(
                    self.kind(*child),
                    Some(BootNodeKind::Group { name }) if name.to_lowercase() == wanted
                )
        })
    }

    pub fn add_group(&mut self, parent: BootNodeId, name: &str) -> Result<BootNodeId> {
        self.require_group(parent)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(PanelError::validation("Group name cannot be empty"));
        }
        if self.sibling_group_named(parent, name, None).is_some() {
            return Err(PanelError::validation(format!(
                "Group \"{}\" already exists here",
                name
            )));
        }
        let id = self.push(
            parent,
            BootNodeKind::Group {
                name: name.to_string(),
            },
        );
        self.selected = Some(id);
        Ok(id)
    }

    pub fn add_leaf(
        &mut self,
        parent: BootNodeId,
        descriptor: &str,
        repo: &dyn RepositoryIndex,
    ) -> Result<BootNodeId> {
        self.require_group(parent)?;
        if descriptor.trim().is_empty() {
            return Err(PanelError::validation("Load string cannot be empty"));
        }
        if self.find_leaf(descriptor).is_some() {
            return Err(PanelError::validation(format!(
                "Addin \"{}\" is already in the list",
                descriptor
            )));
        }
        let id = self.push(
            parent,
            BootNodeKind::Leaf {
                descriptor: descriptor.to_string(),
                display_name: resolve_display_name(repo, descriptor),
            },
        );
        self.selected = Some(id);
        Ok(id)
    }

    pub fn rename(&mut self, id: BootNodeId, new_name: &str) -> Result<()> {
        if id == self.root {
            return Err(PanelError::validation("The root row cannot be changed"));
        }
        let node = self.node(id)?;
        if !matches!(node.kind, BootNodeKind::Group { .. }) {
            return Err(PanelError::validation(
                "Only groups can be renamed; remove the addin and add it again",
            ));
        }
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(PanelError::validation("Group name cannot be empty"));
        }
        if let Some(parent) = node.parent {
            if self.sibling_group_named(parent, new_name, Some(id)).is_some() {
                return Err(PanelError::validation(format!(
                    "Group \"{}\" already exists here",
                    new_name
                )));
            }
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.kind = BootNodeKind::Group {
                name: new_name.to_string(),
            };
        }
        Ok(())
    }

    /// Removes a node and its whole subtree.
    pub fn delete(&mut self, id: BootNodeId) -> Result<()> {
        if id == self.root {
            return Err(PanelError::validation("The root row cannot be deleted"));
        }
        let parent = self.node(id)?.parent;
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|child| *child != id);
        }
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                pending.extend(node.children);
            }
        }
        if self.selected.is_some_and(|s| !self.nodes.contains_key(&s)) {
            self.selected = parent;
        }
        Ok(())
    }

    /// Adds a catalog entry under `target`, or under the group holding
    /// `target` when a leaf was picked.
    pub fn move_repository_entry_here(
        &mut self,
        info: &RepositoryAddinInfo,
        target: BootNodeId,
        repo: &dyn RepositoryIndex,
    ) -> Result<BootNodeId> {
        if info.is_standard() {
            return Err(PanelError::not_permitted(
                "This is a standard addin; it is loaded automatically",
            ));
        }
        if self.find_leaf(&info.load).is_some() {
            return Err(PanelError::validation("This addin is already in the list"));
        }
        let parent = if self.is_group(target) {
            target
        } else {
            self.node(target)?
                .parent
                .ok_or_else(|| PanelError::validation("No group selected for the addin"))?
        };
        self.add_leaf(parent, &info.load, repo)
    }

    /// Persisted form of the tree, without the synthetic root.
    pub fn to_entries(&self) -> Vec<BootEntry> {
        self.entries_below(self.root)
    }

    fn entries_below(&self, id: BootNodeId) -> Vec<BootEntry> {
        self.children(id)
            .iter()
            .filter_map(|child| {
                let entry = match self.kind(*child)? {
                    BootNodeKind::Group { name } => {
                        BootEntry::group(name, self.entries_below(*child))
                    }
                    BootNodeKind::Leaf { descriptor, .. } => BootEntry::leaf(descriptor),
                };
                Some(entry)
            })
            .collect()
    }

    /// Replaces the in-memory list with what the profile holds under `key`.
    /// A missing value is an empty list.
    pub fn load(
        &mut self,
        profile: &dyn ProfileStore,
        key: &str,
        repo: &dyn RepositoryIndex,
    ) -> Result<()> {
        let entries = read_entries(profile, key)?;
        let caption = self.label(self.root).unwrap_or_default().to_string();
        *self = Self::from_entries(&caption, &entries, repo);
        tracing::info!(
            target: "addinpanel::boot_list",
            key = %key,
            rows = self.len() - 1,
            "boot list loaded"
        );
        Ok(())
    }

    pub fn save(&self, profile: &mut dyn ProfileStore, key: &str) -> Result<()> {
        let value = serde_json::to_value(self.to_entries())
            .map_err(|e| PanelError::profile(key, e))?;
        profile
            .set(key, value)
            .map_err(|e| PanelError::profile(key, e))?;
        tracing::info!(
            target: "addinpanel::boot_list",
            key = %key,
            fingerprint = %self.fingerprint(),
            "boot list saved"
        );
        Ok(())
    }

    /// md5 digest of the persisted form; equal lists have equal fingerprints.
    pub fn fingerprint(&self) -> String {
        entries_fingerprint(&self.to_entries())
    }

    pub fn diff(&self, saved: &[BootEntry]) -> BootListDiff {
        let current = self.to_entries();
        if entries_fingerprint(&current) == entries_fingerprint(saved) {
            return BootListDiff::default();
        }
        let now = leaf_descriptors(&current);
        let before = leaf_descriptors(saved);
        BootListDiff {
            changed: true,
            added: now.difference(&before).cloned().collect(),
            removed: before.difference(&now).cloned().collect(),
        }
    }
}

/// Reads the persisted entries under `key`; a missing value is empty.
pub fn read_entries(profile: &dyn ProfileStore, key: &str) -> Result<Vec<BootEntry>> {
    match profile.get(key) {
        Some(value) => serde_json::from_value(value).map_err(|e| PanelError::profile(key, e)),
        None => Ok(Vec::new()),
    }
}

fn resolve_display_name(repo: &dyn RepositoryIndex, descriptor: &str) -> String {
    repo.find_by_load_descriptor(descriptor)
        .map(|info| info.name.clone())
        .unwrap_or_default()
}

fn entries_fingerprint(entries: &[BootEntry]) -> String {
    let canonical = serde_json::to_string(entries).unwrap_or_default();
    format!("{:x}", md5::compute(canonical.as_bytes()))
}

fn leaf_descriptors(entries: &[BootEntry]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut pending: Vec<&BootEntry> = entries.iter().collect();
    while let Some(entry) = pending.pop() {
        if entry.is_group {
            pending.extend(entry.children.iter());
        } else {
            out.insert(entry.addin.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::MemoryProfile;
    use crate::repository::{AddinsFolder, Catalog};
    use crate::AddinTags;
    use pretty_assertions::assert_eq;

    const KEY: &str = "Addins/BootList";

    fn info(name: &str, load: &str) -> RepositoryAddinInfo {
        RepositoryAddinInfo {
            name: name.to_string(),
            description: None,
            load: load.to_string(),
            tags: AddinTags::default(),
            help_path: None,
        }
    }

    fn catalog() -> Catalog {
        Catalog::new(AddinsFolder {
            name: "repo".into(),
            children: Vec::new(),
            addins: vec![info("Foo", "pkg:foo"), info("Bar", "pkg:bar")],
        })
    }

    fn tools_with_foo(repo: &Catalog) -> (BootList, BootNodeId, BootNodeId) {
        let mut list = BootList::new("User addins");
        let tools = list.add_group(list.root(), "Tools").unwrap();
        let foo = list.add_leaf(tools, "pkg:foo", repo).unwrap();
        (list, tools, foo)
    }

    #[test]
    fn new_nodes_are_appended_and_selected() {
        let repo = catalog();
        let (list, tools, foo) = tools_with_foo(&repo);
        assert_eq!(list.children(list.root()), &[tools]);
        assert_eq!(list.children(tools), &[foo]);
        assert_eq!(list.selected(), Some(foo));
        assert_eq!(
            list.kind(foo),
            Some(&BootNodeKind::Leaf {
                descriptor: "pkg:foo".into(),
                display_name: "Foo".into()
            })
        );
    }

    #[test]
    fn duplicate_descriptor_is_rejected_anywhere() {
        let repo = catalog();
        let (mut list, _, _) = tools_with_foo(&repo);
        let other = list.add_group(list.root(), "Other").unwrap();
        let before = list.to_entries();

        let err = list.add_leaf(other, "pkg:foo", &repo).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(list.to_entries(), before);
        assert_eq!(list.selected(), Some(other));
    }

    #[test]
    fn descriptor_match_is_case_sensitive() {
        let repo = catalog();
        let (mut list, tools, _) = tools_with_foo(&repo);
        assert!(list.add_leaf(tools, "pkg:FOO", &repo).is_ok());
    }

    #[test]
    fn sibling_groups_clash_case_insensitively() {
        let repo = catalog();
        let (mut list, tools, _) = tools_with_foo(&repo);
        assert!(list.add_group(list.root(), "tOOLS").unwrap_err().is_validation());
        // Same name one level down is fine.
        assert!(list.add_group(tools, "Tools").is_ok());
    }

    #[test]
    fn leaves_cannot_take_children() {
        let repo = catalog();
        let (mut list, _, foo) = tools_with_foo(&repo);
        assert!(list.add_group(foo, "Nested").unwrap_err().is_validation());
        assert!(list.add_leaf(foo, "pkg:bar", &repo).unwrap_err().is_validation());
    }

    #[test]
    fn rename_excludes_self_but_not_siblings() {
        let repo = catalog();
        let (mut list, tools, foo) = tools_with_foo(&repo);
        let misc = list.add_group(list.root(), "Misc").unwrap();

        list.rename(tools, "TOOLS").unwrap();
        assert_eq!(list.label(tools), Some("TOOLS"));
        assert!(list.rename(misc, "tools").unwrap_err().is_validation());
        assert!(list.rename(foo, "whatever").unwrap_err().is_validation());
        assert!(list.rename(list.root(), "Renamed").unwrap_err().is_validation());
        assert_eq!(list.label(misc), Some("Misc"));
    }

    #[test]
    fn delete_drops_subtree_but_never_root() {
        let repo = catalog();
        let (mut list, tools, foo) = tools_with_foo(&repo);
        assert!(list.delete(list.root()).unwrap_err().is_validation());

        list.delete(tools).unwrap();
        assert!(list.kind(foo).is_none());
        assert!(list.is_empty());
        assert_eq!(list.len(), 1);
        assert_eq!(list.selected(), Some(list.root()));
        // The descriptor is free again.
        assert!(list.add_leaf(list.root(), "pkg:foo", &repo).is_ok());
    }

    #[test]
    fn move_climbs_from_leaf_to_group() {
        let repo = catalog();
        let (mut list, tools, foo) = tools_with_foo(&repo);
        let bar = list
            .move_repository_entry_here(&info("Bar", "pkg:bar"), foo, &repo)
            .unwrap();
        assert_eq!(list.parent(bar), Some(tools));
        assert_eq!(list.children(tools), &[foo, bar]);
    }

    #[test]
    fn move_refuses_standard_and_duplicates() {
        let repo = catalog();
        let (mut list, tools, _) = tools_with_foo(&repo);
        let mut std_entry = info("Core", "core:main");
        std_entry
            .tags
            .0
            .insert(AddinTags::STANDARD.to_string(), "yes".to_string());

        let err = list
            .move_repository_entry_here(&std_entry, tools, &repo)
            .unwrap_err();
        assert!(err.is_not_permitted());
        let err = list
            .move_repository_entry_here(&info("Foo", "pkg:foo"), list.root(), &repo)
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn save_then_load_round_trips() {
        let repo = catalog();
        let (mut list, tools, _) = tools_with_foo(&repo);
        list.add_leaf(tools, "pkg:bar", &repo).unwrap();
        list.add_leaf(list.root(), "pkg:unknown", &repo).unwrap();

        let mut profile = MemoryProfile::new();
        list.save(&mut profile, KEY).unwrap();

        let mut reloaded = BootList::new("User addins");
        reloaded.load(&profile, KEY, &repo).unwrap();
        assert_eq!(reloaded.to_entries(), list.to_entries());
        assert_eq!(
            reloaded.to_entries(),
            vec![
                BootEntry::group(
                    "Tools",
                    vec![BootEntry::leaf("pkg:foo"), BootEntry::leaf("pkg:bar")]
                ),
                BootEntry::leaf("pkg:unknown"),
            ]
        );
        let unknown = reloaded.find_leaf("pkg:unknown").unwrap();
        assert_eq!(
            reloaded.kind(unknown),
            Some(&BootNodeKind::Leaf {
                descriptor: "pkg:unknown".into(),
                display_name: String::new()
            })
        );
    }

    #[test]
    fn load_without_saved_value_is_empty() {
        let repo = catalog();
        let (mut list, _, _) = tools_with_foo(&repo);
        list.load(&MemoryProfile::new(), KEY, &repo).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.label(list.root()), Some("User addins"));
    }

    #[test]
    fn malformed_saved_value_is_a_profile_error() {
        let mut profile = MemoryProfile::new();
        profile.set(KEY, serde_json::json!({"oops": 1})).unwrap();
        let mut list = BootList::new("User addins");
        let err = list.load(&profile, KEY, &catalog()).unwrap_err();
        assert!(matches!(err, PanelError::Profile { .. }));
    }

    #[test]
    fn diff_reports_leaf_changes() {
        let repo = catalog();
        let (mut list, tools, foo) = tools_with_foo(&repo);
        let saved = list.to_entries();
        assert_eq!(list.diff(&saved), BootListDiff::default());

        list.delete(foo).unwrap();
        list.add_leaf(tools, "pkg:bar", &repo).unwrap();
        let diff = list.diff(&saved);
        assert!(diff.changed);
        assert_eq!(diff.added, vec!["pkg:bar".to_string()]);
        assert_eq!(diff.removed, vec!["pkg:foo".to_string()]);
    }

    #[test]
    fn diff_notices_group_rename() {
        let repo = catalog();
        let (mut list, tools, _) = tools_with_foo(&repo);
        let saved = list.to_entries();
        list.rename(tools, "Utilities").unwrap();
        let diff = list.diff(&saved);
        assert!(diff.changed);
        assert!(diff.added.is_empty() && diff.removed.is_empty());
    }
}
