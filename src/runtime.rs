//! The host's addin runtime as seen by the panel.
//!
//! The runtime owns the live hierarchy of groups and addins. The panel only
//! keeps [`GroupId`]/[`AddinId`] handles and asks the runtime to resolve them,
//! so a handle to an unloaded addin simply stops resolving.
//!
//! Load/unload notifications are queued by the runtime and drained by
//! whoever drives the panel: the panel's own operations drain right after
//! calling into the runtime, the host drains everything else from its event
//! loop. Either way they are processed in the order they were queued.

use crate::{Addin, AddinGroup, AddinId, GroupId};
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::PathBuf;

/// Notification emitted by the runtime whenever an addin finishes loading
/// or unloading, whoever asked for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEvent {
    Loaded(AddinId),
    Unloaded(AddinId),
}

/// Interface the panel consumes from the host runtime.
///
/// `load_addin`/`unload_addin` return `Ok(false)` when the host refused the
/// request (the reason is then in [`AddinRuntime::last_error`]) and `Err`
/// when the host faulted unexpectedly.
pub trait AddinRuntime {
    fn root(&self) -> GroupId;

    /// Top of the subtree where the user may load and unload addins.
    fn user_root(&self) -> GroupId;

    fn group(&self, id: GroupId) -> Option<&AddinGroup>;

    fn addin(&self, id: AddinId) -> Option<&Addin>;

    fn find_by_unique_name(&self, unique_name: &str) -> Option<AddinId>;

    fn is_unloadable(&self, id: AddinId) -> bool;

    fn load_addin(&mut self, descriptor: &str, group: GroupId) -> Result<bool>;

    fn unload_addin(&mut self, id: AddinId) -> Result<bool>;

    fn last_error(&self) -> String;

    /// Drains queued load/unload notifications in delivery order.
    fn take_events(&mut self) -> Vec<RuntimeEvent>;

    /// True if `group` is `ancestor` or lies somewhere below it.
    fn is_within(&self, group: GroupId, ancestor: GroupId) -> bool {
        let mut current = Some(group);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.group(id).and_then(|g| g.parent);
        }
        false
    }

    fn in_user_subtree(&self, group: GroupId) -> bool {
        self.is_within(group, self.user_root())
    }
}

/// Arena holding a live group/addin hierarchy.
///
/// Ids come from a single monotonic counter and are never recycled.
#[derive(Debug, Clone)]
pub struct AddinArena {
    root: GroupId,
    groups: BTreeMap<GroupId, AddinGroup>,
    addins: BTreeMap<AddinId, Addin>,
    next_id: u64,
}

impl AddinArena {
    pub fn new(root_name: &str) -> Self {
        let root = GroupId(0);
        let mut groups = BTreeMap::new();
        groups.insert(
            root,
            AddinGroup {
                id: root,
                name: root_name.to_string(),
                parent: None,
                children: Vec::new(),
                addins: Vec::new(),
            },
        );
        Self {
            root,
            groups,
            addins: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn root(&self) -> GroupId {
        self.root
    }

    pub fn group(&self, id: GroupId) -> Option<&AddinGroup> {
        self.groups.get(&id)
    }

    pub fn addin(&self, id: AddinId) -> Option<&Addin> {
        self.addins.get(&id)
    }

    pub fn addins(&self) -> impl Iterator<Item = &Addin> {
        self.addins.values()
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Appends a child group. Returns `None` if `parent` is not live.
    pub fn add_group(&mut self, parent: GroupId, name: &str) -> Option<GroupId> {
        if !self.groups.contains_key(&parent) {
            return None;
        }
        let id = GroupId(self.next());
        self.groups.insert(
            id,
            AddinGroup {
                id,
                name: name.to_string(),
                parent: Some(parent),
                children: Vec::new(),
                addins: Vec::new(),
            },
        );
        self.groups.get_mut(&parent)?.children.push(id);
        Some(id)
    }

    /// Appends an addin as the last member of `group`.
    pub fn insert_addin(
        &mut self,
        group: GroupId,
        unique_name: &str,
        display_name: &str,
        full_path: PathBuf,
    ) -> Option<AddinId> {
        if !self.groups.contains_key(&group) {
            return None;
        }
        let id = AddinId(self.next());
        self.addins.insert(
            id,
            Addin {
                id,
                unique_name: unique_name.to_string(),
                display_name: display_name.to_string(),
                full_path,
                group,
            },
        );
        self.groups.get_mut(&group)?.addins.push(id);
        Some(id)
    }

    pub fn remove_addin(&mut self, id: AddinId) -> Option<Addin> {
        let addin = self.addins.remove(&id)?;
        if let Some(group) = self.groups.get_mut(&addin.group) {
            group.addins.retain(|member| *member != id);
        }
        Some(addin)
    }

    pub fn find_by_unique_name(&self, unique_name: &str) -> Option<AddinId> {
        self.addins
            .values()
            .find(|a| a.unique_name.eq_ignore_ascii_case(unique_name))
            .map(|a| a.id)
    }
}

/// What the in-memory runtime creates for a given load descriptor.
#[derive(Debug, Clone)]
pub struct PackageSpec {
    pub unique_name: String,
    pub display_name: String,
    pub unloadable: bool,
}

/// Self-contained [`AddinRuntime`] used by the demo binary and by tests.
///
/// Loading a descriptor creates an addin whose `full_path` is the descriptor
/// itself, so reloading an addin by its path round-trips. Failures and faults
/// can be scripted per descriptor or per addin.
#[derive(Debug)]
pub struct InMemoryRuntime {
    arena: AddinArena,
    standard: GroupId,
    users: GroupId,
    packages: HashMap<String, PackageSpec>,
    pinned: HashSet<AddinId>,
    load_refusals: HashMap<String, String>,
    load_faults: HashSet<String>,
    unload_refusals: HashMap<AddinId, String>,
    unload_faults: HashSet<AddinId>,
    events: VecDeque<RuntimeEvent>,
    last_error: String,
}

impl Default for InMemoryRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRuntime {
    pub const STANDARD_GROUP: &'static str = "Standard addins";
    pub const USER_GROUP: &'static str = "User addins";

    pub fn new() -> Self {
        let mut arena = AddinArena::new("Addins");
        let root = arena.root();
        let standard = arena.add_group(root, Self::STANDARD_GROUP).unwrap_or(root);
        let users = arena.add_group(root, Self::USER_GROUP).unwrap_or(root);
        Self {
            arena,
            standard,
            users,
            packages: HashMap::new(),
            pinned: HashSet::new(),
            load_refusals: HashMap::new(),
            load_faults: HashSet::new(),
            unload_refusals: HashMap::new(),
            unload_faults: HashSet::new(),
            events: VecDeque::new(),
            last_error: String::new(),
        }
    }

    pub fn standard_group(&self) -> GroupId {
        self.standard
    }

    pub fn arena(&self) -> &AddinArena {
        &self.arena
    }

    pub fn add_group(&mut self, parent: GroupId, name: &str) -> Option<GroupId> {
        self.arena.add_group(parent, name)
    }

    pub fn register_package(&mut self, descriptor: &str, spec: PackageSpec) {
        self.packages.insert(descriptor.to_string(), spec);
    }

    /// The next load of `descriptor` is refused with `message`.
    pub fn refuse_next_load(&mut self, descriptor: &str, message: &str) {
        self.load_refusals
            .insert(descriptor.to_string(), message.to_string());
    }

    /// The next load of `descriptor` faults instead of answering.
    pub fn fault_next_load(&mut self, descriptor: &str) {
        self.load_faults.insert(descriptor.to_string());
    }

    pub fn refuse_next_unload(&mut self, id: AddinId, message: &str) {
        self.unload_refusals.insert(id, message.to_string());
    }

    pub fn fault_next_unload(&mut self, id: AddinId) {
        self.unload_faults.insert(id);
    }

    fn spec_for(&self, descriptor: &str) -> PackageSpec {
        if let Some(spec) = self.packages.get(descriptor) {
            return spec.clone();
        }
        let stem = descriptor
            .rsplit([':', '/', '\\'])
            .next()
            .unwrap_or(descriptor);
        let stem = stem.split('.').next().unwrap_or(stem);
        PackageSpec {
            unique_name: stem.to_string(),
            display_name: stem.to_string(),
            unloadable: true,
        }
    }
}

impl AddinRuntime for InMemoryRuntime {
    fn root(&self) -> GroupId {
        self.arena.root()
    }

    fn user_root(&self) -> GroupId {
        self.users
    }

    fn group(&self, id: GroupId) -> Option<&AddinGroup> {
        self.arena.group(id)
    }

    fn addin(&self, id: AddinId) -> Option<&Addin> {
        self.arena.addin(id)
    }

    fn find_by_unique_name(&self, unique_name: &str) -> Option<AddinId> {
        self.arena.find_by_unique_name(unique_name)
    }

    fn is_unloadable(&self, id: AddinId) -> bool {
        self.arena.addin(id).is_some() && !self.pinned.contains(&id)
    }

    fn load_addin(&mut self, descriptor: &str, group: GroupId) -> Result<bool> {
        if self.load_faults.remove(descriptor) {
            return Err(anyhow!("host fault while loading `{}`", descriptor));
        }
        if let Some(message) = self.load_refusals.remove(descriptor) {
            self.last_error = message;
            return Ok(false);
        }
        let spec = self.spec_for(descriptor);
        if self.arena.find_by_unique_name(&spec.unique_name).is_some() {
            self.last_error = format!("addin `{}` is already loaded", spec.unique_name);
            return Ok(false);
        }
        let Some(id) = self.arena.insert_addin(
            group,
            &spec.unique_name,
            &spec.display_name,
            PathBuf::from(descriptor),
        ) else {
            self.last_error = format!("group {} does not exist", group);
            return Ok(false);
        };
        if !spec.unloadable {
            self.pinned.insert(id);
        }
        self.events.push_back(RuntimeEvent::Loaded(id));
        Ok(true)
    }

    fn unload_addin(&mut self, id: AddinId) -> Result<bool> {
        if self.unload_faults.remove(&id) {
            return Err(anyhow!("host fault while unloading {}", id));
        }
        if let Some(message) = self.unload_refusals.remove(&id) {
            self.last_error = message;
            return Ok(false);
        }
        if self.pinned.contains(&id) {
            self.last_error = format!("{} cannot be unloaded", id);
            return Ok(false);
        }
        if self.arena.remove_addin(id).is_none() {
            self.last_error = format!("{} is not loaded", id);
            return Ok(false);
        }
        self.events.push_back(RuntimeEvent::Unloaded(id));
        Ok(true)
    }

    fn last_error(&self) -> String {
        self.last_error.clone()
    }

    fn take_events(&mut self) -> Vec<RuntimeEvent> {
        self.events.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_never_reused() {
        let mut rt = InMemoryRuntime::new();
        let users = rt.user_root();
        assert!(rt.load_addin("script:a.js", users).unwrap());
        let first = rt.find_by_unique_name("a").unwrap();
        assert!(rt.unload_addin(first).unwrap());
        assert!(rt.load_addin("script:a.js", users).unwrap());
        let second = rt.find_by_unique_name("a").unwrap();
        assert_ne!(first, second);
        assert_eq!(
            rt.take_events(),
            vec![
                RuntimeEvent::Loaded(first),
                RuntimeEvent::Unloaded(first),
                RuntimeEvent::Loaded(second),
            ]
        );
    }

    #[test]
    fn user_subtree_membership_follows_parents() {
        let mut rt = InMemoryRuntime::new();
        let nested = rt.add_group(rt.user_root(), "Tools").unwrap();
        assert!(rt.in_user_subtree(nested));
        assert!(!rt.in_user_subtree(rt.standard_group()));
        assert!(!rt.in_user_subtree(rt.root()));
    }

    #[test]
    fn scripted_refusal_is_one_shot() {
        let mut rt = InMemoryRuntime::new();
        let users = rt.user_root();
        rt.refuse_next_load("script:a.js", "syntax error");
        assert!(!rt.load_addin("script:a.js", users).unwrap());
        assert_eq!(rt.last_error(), "syntax error");
        assert!(rt.take_events().is_empty());
        assert!(rt.load_addin("script:a.js", users).unwrap());
    }

    #[test]
    fn pinned_addins_refuse_unload() {
        let mut rt = InMemoryRuntime::new();
        rt.register_package(
            "core:main",
            PackageSpec {
                unique_name: "main".into(),
                display_name: "Main".into(),
                unloadable: false,
            },
        );
        let std_group = rt.standard_group();
        assert!(rt.load_addin("core:main", std_group).unwrap());
        let id = rt.find_by_unique_name("main").unwrap();
        assert!(!rt.is_unloadable(id));
        assert!(!rt.unload_addin(id).unwrap());
        let names: Vec<_> = rt.arena().addins().map(|a| a.display_name.as_str()).collect();
        assert_eq!(names, vec!["Main"]);
    }
}
