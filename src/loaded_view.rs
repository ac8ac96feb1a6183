//! Display tree of the addins currently loaded in the runtime.
//!
//! The view mirrors the runtime hierarchy one node per group and addin. It
//! is rebuilt from scratch whenever a notification can't be explained, and
//! patched in place when the notification is the outcome of an operation the
//! view started itself. The link between an operation and its notification
//! is a single-slot [`Correlation`] that is set for the duration of the
//! operation and always empty between operations.

use crate::error::{PanelError, Result};
use crate::runtime::{AddinRuntime, RuntimeEvent};
use crate::{AddinId, GroupId};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewNodeId(usize);

impl ViewNodeId {
    /// Number the host uses to refer to a row.
    pub fn raw(self) -> u64 {
        self.0 as u64
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw as usize)
    }
}

/// Runtime entity a view node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewTarget {
    Group(GroupId),
    Addin(AddinId),
}

#[derive(Debug, Clone)]
struct ViewNode {
    label: String,
    target: ViewTarget,
    parent: Option<ViewNodeId>,
    children: Vec<ViewNodeId>,
}

/// Comparable snapshot of the view's structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewShape {
    pub label: String,
    pub target: ViewTarget,
    pub children: Vec<ViewShape>,
}

/// Correlates an in-flight operation with the notification it will produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Correlation {
    /// A load into this group was requested from its row.
    LoadInto { group: GroupId },
    /// The addin on this row is being unloaded and loaded again.
    Reload { node: ViewNodeId },
    /// The addin on this row is being unloaded.
    Unload { node: ViewNodeId },
}

/// Enabled state and caption of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAvailability {
    pub enabled: bool,
    pub label: String,
}

impl CommandAvailability {
    fn enabled(label: String) -> Self {
        Self {
            enabled: true,
            label,
        }
    }

    fn disabled(label: &str) -> Self {
        Self {
            enabled: false,
            label: label.to_string(),
        }
    }
}

/// Commands offered for the focused row of the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedCommands {
    pub unload: CommandAvailability,
    pub restart: CommandAvailability,
    /// Loader commands apply to a group row inside the user subtree.
    pub load: bool,
    /// Unique name of the focused addin, for help lookup.
    pub addin: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadedView {
    nodes: BTreeMap<ViewNodeId, ViewNode>,
    top: Vec<ViewNodeId>,
    next_id: usize,
    selected: Option<ViewNodeId>,
    pending: Option<Correlation>,
}

impl LoadedView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn top_level(&self) -> &[ViewNodeId] {
        &self.top
    }

    pub fn children(&self, id: ViewNodeId) -> &[ViewNodeId] {
        self.nodes
            .get(&id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, id: ViewNodeId) -> Option<ViewNodeId> {
        self.nodes.get(&id).and_then(|node| node.parent)
    }

    pub fn label(&self, id: ViewNodeId) -> Option<&str> {
        self.nodes.get(&id).map(|node| node.label.as_str())
    }

    pub fn target(&self, id: ViewNodeId) -> Option<ViewTarget> {
        self.nodes.get(&id).map(|node| node.target)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn selected(&self) -> Option<ViewNodeId> {
        self.selected
    }

    pub fn select(&mut self, id: ViewNodeId) -> Result<()> {
        if !self.nodes.contains_key(&id) {
            return Err(PanelError::validation("The row no longer exists"));
        }
        self.selected = Some(id);
        Ok(())
    }

    /// True while an operation is waiting for its notification.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn node_for(&self, target: ViewTarget) -> Option<ViewNodeId> {
        self.nodes
            .iter()
            .find(|(_, node)| node.target == target)
            .map(|(id, _)| *id)
    }

    pub fn shape(&self) -> Vec<ViewShape> {
        self.top.iter().map(|id| self.shape_of(*id)).collect()
    }

    fn shape_of(&self, id: ViewNodeId) -> ViewShape {
        let node = &self.nodes[&id];
        ViewShape {
            label: node.label.clone(),
            target: node.target,
            children: node.children.iter().map(|c| self.shape_of(*c)).collect(),
        }
    }

    fn insert(&mut self, parent: Option<ViewNodeId>, label: String, target: ViewTarget) -> ViewNodeId {
        let id = ViewNodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            ViewNode {
                label,
                target,
                parent,
                children: Vec::new(),
            },
        );
        match parent.and_then(|p| self.nodes.get_mut(&p)) {
            Some(parent) => parent.children.push(id),
            None => self.top.push(id),
        }
        id
    }

    fn remove(&mut self, id: ViewNodeId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        match node.parent.and_then(|p| self.nodes.get_mut(&p)) {
            Some(parent) => parent.children.retain(|child| *child != id),
            None => self.top.retain(|child| *child != id),
        }
        let mut pending = node.children;
        while let Some(next) = pending.pop() {
            if let Some(child) = self.nodes.remove(&next) {
                pending.extend(child.children);
            }
        }
        if self.selected == Some(id) || self.selected.is_some_and(|s| !self.nodes.contains_key(&s)) {
            self.selected = node.parent;
        }
    }

    /// Discards the projection and walks the live tree from the root.
    /// Selection survives when its entity is still live.
    pub fn rebuild_all(&mut self, runtime: &dyn AddinRuntime) {
        let selected = self.selected.and_then(|id| self.target(id));
        self.nodes.clear();
        self.top.clear();
        self.selected = None;
        self.project_group(runtime, runtime.root(), None);
        self.selected = selected.and_then(|target| self.node_for(target));
        tracing::debug!(
            target: "addinpanel::loaded_view",
            nodes = self.nodes.len(),
            "loaded view rebuilt"
        );
    }

    fn project_group(&mut self, runtime: &dyn AddinRuntime, group: GroupId, row: Option<ViewNodeId>) {
        let Some(group) = runtime.group(group) else {
            return;
        };
        for child in &group.children {
            if let Some(child_group) = runtime.group(*child) {
                let id = self.insert(row, child_group.name.clone(), ViewTarget::Group(*child));
                self.project_group(runtime, *child, Some(id));
            }
        }
        for member in &group.addins {
            if let Some(addin) = runtime.addin(*member) {
                self.insert(row, addin.display_name.clone(), ViewTarget::Addin(*member));
            }
        }
    }

    pub fn on_event(&mut self, runtime: &dyn AddinRuntime, event: RuntimeEvent) {
        match event {
            RuntimeEvent::Loaded(id) => self.on_addin_loaded(runtime, id),
            RuntimeEvent::Unloaded(id) => self.on_addin_unloaded(runtime, id),
        }
    }

    pub fn on_addin_loaded(&mut self, runtime: &dyn AddinRuntime, id: AddinId) {
        let Some(addin) = runtime.addin(id) else {
            self.rebuild_all(runtime);
            return;
        };
        match self.pending {
            Some(Correlation::LoadInto { group }) if addin.group == group => {
                if let Some(row) = self.node_for(ViewTarget::Group(group)) {
                    let leaf = self.insert(Some(row), addin.display_name.clone(), ViewTarget::Addin(id));
                    self.selected = Some(leaf);
                    self.pending = None;
                    return;
                }
            }
            Some(Correlation::Reload { node }) if self.is_member_row(runtime, node, addin.group) => {
                if let Some(row) = self.nodes.get_mut(&node) {
                    row.label = addin.display_name.clone();
                    row.target = ViewTarget::Addin(id);
                }
                self.place_member(runtime, node, addin.group, id);
                self.pending = None;
                return;
            }
            _ => {}
        }
        self.rebuild_all(runtime);
    }

    /// `node` is an addin row sitting directly under the row of `group`.
    fn is_member_row(&self, runtime: &dyn AddinRuntime, node: ViewNodeId, group: GroupId) -> bool {
        if !matches!(self.target(node), Some(ViewTarget::Addin(_))) {
            return false;
        }
        match self.node_for(ViewTarget::Group(group)) {
            Some(row) => self.parent(node) == Some(row),
            None => group == runtime.root() && self.parent(node).is_none(),
        }
    }

    /// Moves an addin row to where a rebuild would put it: after the group's
    /// child groups, at the addin's position among the group's members.
    fn place_member(&mut self, runtime: &dyn AddinRuntime, node: ViewNodeId, group: GroupId, id: AddinId) {
        let Some(group) = runtime.group(group) else {
            return;
        };
        let Some(position) = group.addins.iter().position(|member| *member == id) else {
            return;
        };
        let index = group
            .children
            .iter()
            .filter(|child| runtime.group(**child).is_some())
            .count()
            + group.addins[..position]
                .iter()
                .filter(|member| runtime.addin(**member).is_some())
                .count();
        let siblings = match self.parent(node) {
            Some(parent) => match self.nodes.get_mut(&parent) {
                Some(parent) => &mut parent.children,
                None => return,
            },
            None => &mut self.top,
        };
        siblings.retain(|sibling| *sibling != node);
        let index = index.min(siblings.len());
        siblings.insert(index, node);
    }

    pub fn on_addin_unloaded(&mut self, runtime: &dyn AddinRuntime, _id: AddinId) {
        if matches!(
            self.pending,
            Some(Correlation::Reload { .. }) | Some(Correlation::Unload { .. })
        ) {
            return;
        }
        self.rebuild_all(runtime);
    }

    fn drain(&mut self, runtime: &mut dyn AddinRuntime) {
        for event in runtime.take_events() {
            self.on_event(&*runtime, event);
        }
    }

    fn begin(&mut self, correlation: Correlation) {
        debug_assert!(
            self.pending.is_none(),
            "correlation {:?} still pending",
            self.pending
        );
        self.pending = Some(correlation);
    }

    /// Row's addin if it may be unloaded or restarted from the panel.
    fn managed_addin(&self, runtime: &dyn AddinRuntime, node: ViewNodeId) -> Result<AddinId> {
        let Some(ViewTarget::Addin(id)) = self.target(node) else {
            return Err(PanelError::not_permitted("Select an addin row first"));
        };
        let addin = runtime
            .addin(id)
            .ok_or_else(|| PanelError::not_permitted("The addin is no longer loaded"))?;
        if !runtime.in_user_subtree(addin.group) || !runtime.is_unloadable(id) {
            return Err(PanelError::not_permitted(format!(
                "Addin \"{}\" cannot be unloaded",
                addin.display_name
            )));
        }
        Ok(id)
    }

    /// Loads `descriptor` into `group`. On success the new addin is appended
    /// under the group's row and selected.
    pub fn load_into(
        &mut self,
        runtime: &mut dyn AddinRuntime,
        descriptor: &str,
        group: GroupId,
    ) -> Result<()> {
        if runtime.group(group).is_none() || !runtime.in_user_subtree(group) {
            return Err(PanelError::not_permitted(
                "Addins can only be loaded into the user addins group",
            ));
        }
        self.begin(Correlation::LoadInto { group });
        let outcome = runtime.load_addin(descriptor, group);
        self.drain(runtime);
        self.pending = None;
        match outcome {
            Ok(true) => {
                tracing::info!(
                    target: "addinpanel::loaded_view",
                    descriptor = %descriptor,
                    group = %group,
                    "addin loaded"
                );
                Ok(())
            }
            Ok(false) => Err(self.refused(runtime, "load")),
            Err(fault) => Err(self.faulted(runtime, "load", fault)),
        }
    }

    pub fn unload(&mut self, runtime: &mut dyn AddinRuntime, node: ViewNodeId) -> Result<()> {
        let id = self.managed_addin(&*runtime, node)?;
        self.begin(Correlation::Unload { node });
        let outcome = runtime.unload_addin(id);
        self.drain(runtime);
        self.pending = None;
        match outcome {
            Ok(true) => {
                self.remove(node);
                tracing::info!(target: "addinpanel::loaded_view", addin = %id, "addin unloaded");
                Ok(())
            }
            Ok(false) => Err(self.refused(runtime, "unload")),
            Err(fault) => Err(self.faulted(runtime, "unload", fault)),
        }
    }

    /// Unloads the row's addin and loads it again from the same path into
    /// the same group, keeping the row in place.
    pub fn restart(&mut self, runtime: &mut dyn AddinRuntime, node: ViewNodeId) -> Result<()> {
        let id = self.managed_addin(&*runtime, node)?;
        let Some(addin) = runtime.addin(id) else {
            return Err(PanelError::not_permitted("The addin is no longer loaded"));
        };
        let path = addin.full_path.to_string_lossy().into_owned();
        let group = addin.group;

        self.begin(Correlation::Reload { node });
        let result = self.restart_steps(runtime, id, &path, group, node);
        self.pending = None;
        if result.is_ok() {
            tracing::info!(target: "addinpanel::loaded_view", path = %path, "addin restarted");
        }
        result
    }

    fn restart_steps(
        &mut self,
        runtime: &mut dyn AddinRuntime,
        id: AddinId,
        path: &str,
        group: GroupId,
        node: ViewNodeId,
    ) -> Result<()> {
        match runtime.unload_addin(id) {
            Ok(true) => self.drain(runtime),
            Ok(false) => return Err(self.refused(runtime, "unload")),
            Err(fault) => {
                self.pending = None;
                return Err(self.faulted(runtime, "unload", fault));
            }
        }
        match runtime.load_addin(path, group) {
            Ok(true) => {
                self.drain(runtime);
                Ok(())
            }
            Ok(false) => {
                self.drain(runtime);
                self.remove(node);
                Err(self.refused(runtime, "reload"))
            }
            Err(fault) => {
                self.pending = None;
                Err(self.faulted(runtime, "reload", fault))
            }
        }
    }

    fn refused(&self, runtime: &dyn AddinRuntime, operation: &'static str) -> PanelError {
        let details = runtime.last_error();
        tracing::warn!(
            target: "addinpanel::loaded_view",
            operation,
            error = %details,
            "host refused addin operation"
        );
        PanelError::operation_failed(operation, details)
    }

    /// Host faulted mid-operation: the view can't trust its own patching,
    /// so it resynchronises from the runtime.
    fn faulted(
        &mut self,
        runtime: &mut dyn AddinRuntime,
        operation: &'static str,
        fault: anyhow::Error,
    ) -> PanelError {
        tracing::error!(
            target: "addinpanel::loaded_view",
            operation,
            error = %fault,
            "host fault during addin operation"
        );
        self.drain(runtime);
        self.rebuild_all(&*runtime);
        PanelError::operation_failed(operation, fault.to_string())
    }

    /// Nearest group row at or above `node`, with its group handle.
    pub fn group_row(&self, node: ViewNodeId) -> Option<(ViewNodeId, GroupId)> {
        let mut current = Some(node);
        while let Some(id) = current {
            if let Some(ViewTarget::Group(group)) = self.target(id) {
                return Some((id, group));
            }
            current = self.parent(id);
        }
        None
    }

    /// Commands offered for `node`. Nothing focused disables everything.
    pub fn commands_for(&self, runtime: &dyn AddinRuntime, node: Option<ViewNodeId>) -> LoadedCommands {
        let generic = LoadedCommands {
            unload: CommandAvailability::disabled("Unload addin"),
            restart: CommandAvailability::disabled("Restart addin"),
            load: false,
            addin: None,
        };
        let Some(target) = node.and_then(|id| self.target(id)) else {
            return generic;
        };
        match target {
            ViewTarget::Group(group) => LoadedCommands {
                load: runtime.in_user_subtree(group),
                ..generic
            },
            ViewTarget::Addin(id) => {
                let Some(addin) = runtime.addin(id) else {
                    return generic;
                };
                let (unload, restart) =
                    if runtime.in_user_subtree(addin.group) && runtime.is_unloadable(id) {
                        (
                            CommandAvailability::enabled(format!("Unload <{}>", addin.display_name)),
                            CommandAvailability::enabled(format!("Restart <{}>", addin.display_name)),
                        )
                    } else {
                        (
                            CommandAvailability::disabled("This addin cannot be unloaded"),
                            CommandAvailability::disabled("Nor can it be restarted"),
                        )
                    };
                LoadedCommands {
                    unload,
                    restart,
                    load: false,
                    addin: Some(addin.unique_name.clone()),
                }
            }
        }
    }
}
