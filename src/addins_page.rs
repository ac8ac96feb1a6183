//! The "Addins" page: loaded addins, the repository catalog and the boot
//! list side by side.
//!
//! The page turns host commands into [`LoadedView`] and [`BootList`]
//! operations and reports their errors back through the [`HostView`]. No
//! error leaves the page.

use crate::boot_list::{read_entries, BootList, BootListDiff, BootNodeId, BootNodeKind};
use crate::context::AppContext;
use crate::error::{PanelError, Result};
use crate::loaded_view::{LoadedCommands, LoadedView, ViewNodeId, ViewTarget};
use crate::page::{CommandArgs, Handlers, HostView, Notification, Page, Reply};
use crate::repository::{catalog_rows, CatalogRow};

/// Command ids understood by [`AddinsPage`].
pub mod commands {
    pub const LOADED_ACTIVATE_ROW: &str = "loaded.activate_row";
    pub const REPOSITORY_ACTIVATE_ROW: &str = "repository.activate_row";
    pub const BOOT_LIST_ACTIVATE_ROW: &str = "boot_list.activate_row";
    pub const SUB_PANEL_CHANGE: &str = "sub_panel.change";
    pub const LOAD: &str = "addin.load";
    pub const UNLOAD: &str = "addin.unload";
    pub const RESTART: &str = "addin.restart";
    pub const MOVE: &str = "addin.move";
    pub const BOOT_LIST_RELOAD: &str = "boot_list.reload";
    pub const BOOT_LIST_SAVE: &str = "boot_list.save";
    pub const BOOT_LIST_ADD_GROUP: &str = "boot_list.add_group";
    pub const BOOT_LIST_ADD_LEAF: &str = "boot_list.add_leaf";
    pub const BOOT_LIST_RENAME: &str = "boot_list.rename";
    pub const BOOT_LIST_DELETE: &str = "boot_list.delete";
}

/// Host control names the page tracks focus for.
pub mod controls {
    pub const LOADED: &str = "LoadedAddins";
    pub const REPOSITORY: &str = "AllAddins";
    pub const BOOT_LIST: &str = "LoadList";
}

/// Which list the "move" command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubPanel {
    Loaded,
    BootList,
}

pub struct AddinsPage {
    ctx: AppContext,
    view: LoadedView,
    boot_list: BootList,
    catalog: Vec<CatalogRow>,
    selected_entry: Option<String>,
    sub_panel: SubPanel,
    idle_subscribed: bool,
    last_focus: Option<String>,
    commands: LoadedCommands,
}

impl AddinsPage {
    pub fn new(ctx: AppContext) -> Self {
        let boot_list = BootList::new(&ctx.config.boot_list_caption);
        let view = LoadedView::new();
        let commands = {
            let runtime = ctx.runtime.borrow();
            view.commands_for(&*runtime, None)
        };
        Self {
            ctx,
            view,
            boot_list,
            catalog: Vec::new(),
            selected_entry: None,
            sub_panel: SubPanel::Loaded,
            idle_subscribed: false,
            last_focus: None,
            commands,
        }
    }

    pub fn view(&self) -> &LoadedView {
        &self.view
    }

    pub fn boot_list(&self) -> &BootList {
        &self.boot_list
    }

    pub fn catalog(&self) -> &[CatalogRow] {
        &self.catalog
    }

    /// Command state for the focused row of the loaded list.
    pub fn loaded_commands(&self) -> &LoadedCommands {
        &self.commands
    }

    pub fn sub_panel(&self) -> SubPanel {
        self.sub_panel
    }

    pub fn is_idle_subscribed(&self) -> bool {
        self.idle_subscribed
    }

    /// Edits since the last save; drives the save/restore buttons.
    pub fn boot_list_diff(&self) -> Result<BootListDiff> {
        let key = &self.ctx.config.boot_list_key;
        let saved = read_entries(&*self.ctx.profile.borrow(), key)?;
        Ok(self.boot_list.diff(&saved))
    }

    fn refresh_catalog(&mut self) {
        let runtime = self.ctx.runtime.borrow();
        self.catalog = catalog_rows(&*self.ctx.repository, &*runtime);
    }

    fn refresh_commands(&mut self) {
        let runtime = self.ctx.runtime.borrow();
        self.commands = self.view.commands_for(&*runtime, self.view.selected());
    }

    fn reload_boot_list(&mut self) -> Result<()> {
        let profile = self.ctx.profile.borrow();
        self.boot_list.load(
            &*profile,
            &self.ctx.config.boot_list_key,
            &*self.ctx.repository,
        )
    }

    fn show_info(&self, host: &mut dyn HostView, topic: Option<String>) {
        let topic = topic
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.ctx.config.default_info_topic.clone());
        host.show_info(&topic);
    }

    /// Reports an error at the place the user acted and turns it into the
    /// reply the host expects.
    fn report(host: &mut dyn HostView, err: PanelError) -> Reply {
        match err {
            PanelError::Validation { message } => {
                host.message_box(&message);
                Reply::Invalid
            }
            PanelError::NotPermitted { message } => {
                host.message_box(&message);
                Reply::Cancel
            }
            PanelError::OperationFailed { operation, details } => {
                host.message(&format!("Addin {} failed: {}", operation, details));
                Reply::Done
            }
            other => {
                host.message_box(&other.to_string());
                Reply::Cancel
            }
        }
    }

    fn reply(host: &mut dyn HostView, result: Result<()>) -> Reply {
        match result {
            Ok(()) => Reply::Done,
            Err(err) => Self::report(host, err),
        }
    }

    fn view_node(args: &CommandArgs) -> Option<ViewNodeId> {
        args.u64("node").map(ViewNodeId::from_raw)
    }

    fn boot_node(args: &CommandArgs, field: &str) -> Option<BootNodeId> {
        args.u64(field).map(BootNodeId::from_raw)
    }

    fn activate_loaded_row(&mut self, host: &mut dyn HostView, args: &CommandArgs) -> Reply {
        if let Some(node) = Self::view_node(args) {
            if let Err(err) = self.view.select(node) {
                return Self::report(host, err);
            }
        }
        self.refresh_commands();
        let topic = self
            .commands
            .addin
            .as_deref()
            .and_then(|name| self.ctx.help.addin_help_path(name));
        self.show_info(host, topic);
        Reply::Done
    }

    fn activate_repository_row(&mut self, host: &mut dyn HostView, args: &CommandArgs) -> Reply {
        if args.value.get("entry").is_some() {
            self.selected_entry = args.str("entry").map(str::to_string);
        }
        let topic = self
            .selected_entry
            .as_deref()
            .and_then(|load| self.ctx.repository.find_by_load_descriptor(load))
            .and_then(|info| info.help_path.clone());
        self.show_info(host, topic);
        Reply::Done
    }

    fn activate_boot_row(&mut self, host: &mut dyn HostView, args: &CommandArgs) -> Reply {
        if let Some(node) = Self::boot_node(args, "node") {
            if let Err(err) = self.boot_list.select(node) {
                return Self::report(host, err);
            }
        }
        let topic = match self.boot_list.selected().and_then(|n| self.boot_list.kind(n)) {
            Some(BootNodeKind::Leaf { descriptor, .. }) => self
                .ctx
                .repository
                .find_by_load_descriptor(descriptor)
                .and_then(|info| info.help_path.clone()),
            _ => None,
        };
        self.show_info(host, topic);
        Reply::Done
    }

    fn change_sub_panel(&mut self, _host: &mut dyn HostView, args: &CommandArgs) -> Reply {
        self.sub_panel = match args.str("panel") {
            Some(controls::BOOT_LIST) | Some("boot_list") => SubPanel::BootList,
            _ => SubPanel::Loaded,
        };
        Reply::Done
    }

    fn load(&mut self, host: &mut dyn HostView, args: &CommandArgs) -> Reply {
        let Some(descriptor) = args.str("descriptor") else {
            return Reply::Invalid;
        };
        let result = self.load_into_selected(descriptor);
        Self::reply(host, result)
    }

    fn load_into_selected(&mut self, descriptor: &str) -> Result<()> {
        let (row, group) = self
            .view
            .selected()
            .and_then(|node| self.view.group_row(node))
            .ok_or_else(|| PanelError::not_permitted("Select a group to load the addin into"))?;
        self.view.select(row)?;
        let result = {
            let mut runtime = self.ctx.runtime.borrow_mut();
            self.view.load_into(&mut *runtime, descriptor, group)
        };
        self.refresh_catalog();
        self.refresh_commands();
        result
    }

    fn unload(&mut self, host: &mut dyn HostView, _args: &CommandArgs) -> Reply {
        let Some(node) = self.view.selected() else {
            return Reply::Cancel;
        };
        let result = {
            let mut runtime = self.ctx.runtime.borrow_mut();
            self.view.unload(&mut *runtime, node)
        };
        self.refresh_catalog();
        self.refresh_commands();
        Self::reply(host, result)
    }

    fn restart(&mut self, host: &mut dyn HostView, _args: &CommandArgs) -> Reply {
        let Some(node) = self.view.selected() else {
            return Reply::Cancel;
        };
        let result = {
            let mut runtime = self.ctx.runtime.borrow_mut();
            self.view.restart(&mut *runtime, node)
        };
        self.refresh_catalog();
        self.refresh_commands();
        Self::reply(host, result)
    }

    /// Moves the selected catalog entry into whichever list is showing.
    fn move_addin(&mut self, host: &mut dyn HostView, _args: &CommandArgs) -> Reply {
        let result = self.move_selected_entry();
        Self::reply(host, result)
    }

    fn move_selected_entry(&mut self) -> Result<()> {
        let repo = self.ctx.repository.clone();
        let info = self
            .selected_entry
            .as_deref()
            .and_then(|load| repo.find_by_load_descriptor(load))
            .ok_or_else(|| PanelError::not_permitted("Select an addin in the repository first"))?;
        if info.is_standard() {
            return Err(PanelError::not_permitted(
                "This is a standard addin; it is loaded automatically",
            ));
        }
        match self.sub_panel {
            SubPanel::BootList => {
                let target = self
                    .boot_list
                    .selected()
                    .ok_or_else(|| PanelError::not_permitted("Select a group for the addin"))?;
                self.boot_list
                    .move_repository_entry_here(info, target, &*repo)
                    .map(|_| ())
            }
            SubPanel::Loaded => {
                let running = info.tags.unique_name().is_some_and(|name| {
                    self.ctx.runtime.borrow().find_by_unique_name(name).is_some()
                });
                if running {
                    return Err(PanelError::not_permitted("This addin is already running"));
                }
                self.load_into_selected(&info.load)
            }
        }
    }

    fn reload_boot_list_confirmed(&mut self, host: &mut dyn HostView, _args: &CommandArgs) -> Reply {
        if !host.confirm(
            "All changes made since the list was last saved will be discarded.\nContinue?",
        ) {
            return Reply::Cancel;
        }
        let result = self.reload_boot_list();
        Self::reply(host, result)
    }

    fn save_boot_list(&mut self, host: &mut dyn HostView, _args: &CommandArgs) -> Reply {
        let result = {
            let mut profile = self.ctx.profile.borrow_mut();
            self.boot_list
                .save(&mut *profile, &self.ctx.config.boot_list_key)
        };
        Self::reply(host, result)
    }

    fn add_group(&mut self, host: &mut dyn HostView, args: &CommandArgs) -> Reply {
        let parent = Self::boot_node(args, "parent").unwrap_or_else(|| self.boot_list.root());
        let Some(name) = args.str("name") else {
            return Reply::Invalid;
        };
        let result = self.boot_list.add_group(parent, name).map(|_| ());
        Self::reply(host, result)
    }

    fn add_leaf(&mut self, host: &mut dyn HostView, args: &CommandArgs) -> Reply {
        let parent = Self::boot_node(args, "parent").unwrap_or_else(|| self.boot_list.root());
        let Some(descriptor) = args.str("descriptor") else {
            return Reply::Invalid;
        };
        let result = self
            .boot_list
            .add_leaf(parent, descriptor, &*self.ctx.repository)
            .map(|_| ());
        Self::reply(host, result)
    }

    fn rename(&mut self, host: &mut dyn HostView, args: &CommandArgs) -> Reply {
        let (Some(node), Some(name)) = (Self::boot_node(args, "node"), args.str("name")) else {
            return Reply::Invalid;
        };
        let result = self.boot_list.rename(node, name);
        Self::reply(host, result)
    }

    fn delete(&mut self, host: &mut dyn HostView, args: &CommandArgs) -> Reply {
        let Some(node) = Self::boot_node(args, "node").or(self.boot_list.selected()) else {
            return Reply::Cancel;
        };
        match self.boot_list.delete(node) {
            Ok(()) => Reply::Done,
            // Root deletion is refused silently, like any other row the host
            // can't delete.
            Err(_) if node == self.boot_list.root() => Reply::Cancel,
            Err(err) => Self::report(host, err),
        }
    }

    /// Hosts without a focus event: compare the focused control on every
    /// idle tick and refresh that list's state when it changes.
    fn poll_focus(&mut self, host: &mut dyn HostView) {
        let focus = host.focused_control();
        if focus == self.last_focus {
            return;
        }
        let args = CommandArgs::default();
        match focus.as_deref() {
            Some(controls::LOADED) => {
                self.activate_loaded_row(host, &args);
            }
            Some(controls::REPOSITORY) => {
                self.activate_repository_row(host, &args);
            }
            Some(controls::BOOT_LIST) => {
                self.activate_boot_row(host, &args);
            }
            _ => {}
        }
        self.last_focus = focus;
    }
}

impl Page for AddinsPage {
    fn handlers() -> Handlers<Self> {
        use commands::*;
        Handlers::new()
            .on(LOADED_ACTIVATE_ROW, AddinsPage::activate_loaded_row)
            .on(REPOSITORY_ACTIVATE_ROW, AddinsPage::activate_repository_row)
            .on(BOOT_LIST_ACTIVATE_ROW, AddinsPage::activate_boot_row)
            .on(SUB_PANEL_CHANGE, AddinsPage::change_sub_panel)
            .on(LOAD, AddinsPage::load)
            .on(UNLOAD, AddinsPage::unload)
            .on(RESTART, AddinsPage::restart)
            .on(MOVE, AddinsPage::move_addin)
            .on(BOOT_LIST_RELOAD, AddinsPage::reload_boot_list_confirmed)
            .on(BOOT_LIST_SAVE, AddinsPage::save_boot_list)
            .on(BOOT_LIST_ADD_GROUP, AddinsPage::add_group)
            .on(BOOT_LIST_ADD_LEAF, AddinsPage::add_leaf)
            .on(BOOT_LIST_RENAME, AddinsPage::rename)
            .on(BOOT_LIST_DELETE, AddinsPage::delete)
    }

    fn connect(&mut self, host: &mut dyn HostView) {
        {
            let runtime = self.ctx.runtime.borrow();
            self.view.rebuild_all(&*runtime);
        }
        self.refresh_catalog();
        self.refresh_commands();
        if let Err(err) = self.reload_boot_list() {
            tracing::warn!(target: "addinpanel::addins_page", error = %err, "boot list unreadable");
            Self::report(host, err);
        }
    }

    fn enter(&mut self, _host: &mut dyn HostView) {
        self.idle_subscribed = true;
        self.last_focus = None;
    }

    fn exit(&mut self, _host: &mut dyn HostView) {
        self.idle_subscribed = false;
    }

    fn notify(&mut self, host: &mut dyn HostView, event: &Notification) {
        match event {
            Notification::Idle => {
                if self.idle_subscribed {
                    self.poll_focus(host);
                }
            }
            Notification::AddinLoaded(id) => {
                {
                    let runtime = self.ctx.runtime.borrow();
                    self.view.on_addin_loaded(&*runtime, *id);
                }
                self.refresh_catalog();
                self.refresh_commands();
            }
            Notification::AddinUnloaded(id) => {
                {
                    let runtime = self.ctx.runtime.borrow();
                    self.view.on_addin_unloaded(&*runtime, *id);
                }
                self.refresh_catalog();
                self.refresh_commands();
            }
        }
    }
}

impl AddinsPage {
    /// Row of the loaded list showing `target`, for hosts that track rows by
    /// entity.
    pub fn loaded_row(&self, target: ViewTarget) -> Option<ViewNodeId> {
        self.view.node_for(target)
    }
}
