//! The panel window: owns the page controller and relays host events.

use crate::addins_page::AddinsPage;
use crate::context::AppContext;
use crate::error::{PanelError, Result};
use crate::page::{CommandArgs, HostView, Notification, Page, PageController, Routed};
use crate::runtime::RuntimeEvent;
use serde_json::Value;

/// Pages the panel window can show, in tab order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    Addins,
    Settings,
    Hotkeys,
    Update,
    Help,
    About,
}

pub struct PanelWindow {
    ctx: AppContext,
    pages: PageController<PageKind>,
    opened_once: bool,
    is_open: bool,
}

impl PanelWindow {
    /// Creates the window with the addins page registered. The host adds
    /// its own pages with [`PanelWindow::register_page`].
    pub fn new(ctx: AppContext) -> Self {
        let mut pages = PageController::new();
        let page_ctx = ctx.clone();
        pages.register(PageKind::Addins, move || AddinsPage::new(page_ctx.clone()));
        Self {
            ctx,
            pages,
            opened_once: false,
            is_open: false,
        }
    }

    pub fn register_page<P, F>(&mut self, kind: PageKind, factory: F)
    where
        P: Page,
        F: FnMut() -> P + 'static,
    {
        self.pages.register(kind, factory);
    }

    pub fn pages(&mut self) -> &mut PageController<PageKind> {
        &mut self.pages
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Shows the window. The first page is activated on the first open only.
    pub fn open(&mut self, host: &mut dyn HostView) -> Result<()> {
        if !self.opened_once {
            let first = *self
                .pages
                .kinds()
                .first()
                .ok_or_else(|| PanelError::unknown_page("<none>"))?;
            self.pages.activate(first, host)?;
            self.opened_once = true;
        }
        self.is_open = true;
        Ok(())
    }

    pub fn close(&mut self) {
        self.is_open = false;
    }

    /// Host switched tabs; `index` follows registration order.
    pub fn on_page_change(&mut self, index: usize, host: &mut dyn HostView) -> Result<()> {
        let kind = *self
            .pages
            .kinds()
            .get(index)
            .ok_or_else(|| PanelError::unknown_page(index))?;
        self.pages.activate(kind, host)
    }

    /// Forwards runtime notifications still queued, in order. Those produced
    /// by a page's own load/unload/restart were already drained by that page.
    pub fn pump(&mut self, host: &mut dyn HostView) {
        let events = self.ctx.runtime.borrow_mut().take_events();
        for event in events {
            let notification = match event {
                RuntimeEvent::Loaded(id) => Notification::AddinLoaded(id),
                RuntimeEvent::Unloaded(id) => Notification::AddinUnloaded(id),
            };
            self.pages.notify(host, &notification);
        }
    }

    pub fn idle(&mut self, host: &mut dyn HostView) {
        self.pages.notify(host, &Notification::Idle);
    }

    pub fn invoke(&mut self, host: &mut dyn HostView, command: &str, args: Value) -> Routed {
        self.pages.invoke(host, command, &CommandArgs::new(args))
    }

    /// Remembers whether the window was open when the host shut down.
    pub fn before_exit_app(&self) -> Result<()> {
        let key = &self.ctx.config.window_state_key;
        self.ctx
            .profile
            .borrow_mut()
            .set_flag(key, self.is_open)
            .map_err(|e| PanelError::profile(key.as_str(), e))
    }

    /// Reopens the window at startup if it was open last time. A profile
    /// without the flag counts as open.
    pub fn restore_state(&mut self, host: &mut dyn HostView) -> Result<()> {
        let key = self.ctx.config.window_state_key.clone();
        let was_open = {
            let mut profile = self.ctx.profile.borrow_mut();
            profile
                .create_value(&key, Value::Bool(true))
                .map_err(|e| PanelError::profile(key.as_str(), e))?;
            profile.flag(&key).unwrap_or(true)
        };
        tracing::debug!(target: "addinpanel::window", was_open, "window state restored");
        if was_open {
            self.open(host)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addins_page::commands;
    use crate::config::PanelConfig;
    use crate::loaded_view::ViewTarget;
    use crate::page::tests::TestHost;
    use crate::page::{Handlers, Reply};
    use crate::profile::{MemoryProfile, ProfileStore};
    use crate::repository::Catalog;
    use crate::runtime::{AddinRuntime, InMemoryRuntime};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Settings;

    impl Page for Settings {
        fn handlers() -> Handlers<Self> {
            Handlers::new()
        }
        fn connect(&mut self, _host: &mut dyn HostView) {}
        fn enter(&mut self, _host: &mut dyn HostView) {}
        fn exit(&mut self, _host: &mut dyn HostView) {}
    }

    fn window() -> (PanelWindow, Rc<RefCell<InMemoryRuntime>>, Rc<RefCell<MemoryProfile>>) {
        let runtime = Rc::new(RefCell::new(InMemoryRuntime::new()));
        let profile = Rc::new(RefCell::new(MemoryProfile::new()));
        let ctx = AppContext::new(
            PanelConfig::default(),
            runtime.clone(),
            Rc::new(Catalog::default()),
            profile.clone(),
        );
        let mut window = PanelWindow::new(ctx);
        window.register_page(PageKind::Settings, || Settings);
        (window, runtime, profile)
    }

    #[test]
    fn first_open_activates_the_addins_page() {
        let (mut window, _, _) = window();
        let mut host = TestHost::default();
        window.open(&mut host).unwrap();
        assert!(window.is_open());
        assert_eq!(window.pages().active(), Some(PageKind::Addins));

        window.on_page_change(1, &mut host).unwrap();
        window.close();
        window.open(&mut host).unwrap();
        assert_eq!(window.pages().active(), Some(PageKind::Settings));
        assert!(!window.pages().is_entered(PageKind::Addins));

        assert!(window.on_page_change(7, &mut host).is_err());
        assert_eq!(window.pages().active(), Some(PageKind::Settings));
    }

    #[test]
    fn window_state_round_trips_through_the_profile() {
        let (mut window, _, profile) = window();
        let mut host = TestHost::default();
        window.restore_state(&mut host).unwrap();
        assert!(window.is_open());
        assert_eq!(profile.borrow().flag("Panel/WndOpened"), Some(true));

        window.close();
        window.before_exit_app().unwrap();
        assert_eq!(profile.borrow().flag("Panel/WndOpened"), Some(false));

        let (mut next, _, next_profile) = window_with(profile.clone());
        next.restore_state(&mut host).unwrap();
        assert!(!next.is_open());
        assert_eq!(next_profile.borrow().flag("Panel/WndOpened"), Some(false));
    }

    fn window_with(
        profile: Rc<RefCell<MemoryProfile>>,
    ) -> (PanelWindow, Rc<RefCell<InMemoryRuntime>>, Rc<RefCell<MemoryProfile>>) {
        let runtime = Rc::new(RefCell::new(InMemoryRuntime::new()));
        let ctx = AppContext::new(
            PanelConfig::default(),
            runtime.clone(),
            Rc::new(Catalog::default()),
            profile.clone(),
        );
        (PanelWindow::new(ctx), runtime, profile)
    }

    #[test]
    fn pump_delivers_host_loads_to_inactive_pages() {
        let (mut window, runtime, _) = window();
        let mut host = TestHost::default();
        window.open(&mut host).unwrap();
        window.on_page_change(1, &mut host).unwrap();

        let id = {
            let mut runtime = runtime.borrow_mut();
            let users = runtime.user_root();
            runtime.load_addin("script:clock.js", users).unwrap();
            runtime.find_by_unique_name("clock").unwrap()
        };
        window.pump(&mut host);

        let page = window.pages().page_mut::<AddinsPage>(PageKind::Addins).unwrap();
        assert!(page.loaded_row(ViewTarget::Addin(id)).is_some());
        assert!(runtime.borrow_mut().take_events().is_empty());
    }

    #[test]
    fn page_operations_consume_their_own_notifications() {
        let (mut window, runtime, _) = window();
        let mut host = TestHost::default();
        window.open(&mut host).unwrap();
        assert!(window.pages().is_connected(PageKind::Addins));
        assert!(!window.pages().is_connected(PageKind::Settings));

        let users = runtime.borrow().user_root();
        let row = window
            .pages()
            .page_mut::<AddinsPage>(PageKind::Addins)
            .and_then(|page| page.loaded_row(ViewTarget::Group(users)))
            .unwrap();
        window.invoke(&mut host, commands::LOADED_ACTIVATE_ROW, json!({ "node": row.raw() }));
        assert_eq!(
            window.invoke(&mut host, commands::LOAD, json!({ "descriptor": "script:clock.js" })),
            Routed::Handled(Reply::Done)
        );

        assert!(runtime.borrow_mut().take_events().is_empty());
        window.pump(&mut host);
        let id = runtime.borrow().find_by_unique_name("clock").unwrap();
        let page = window.pages().page_mut::<AddinsPage>(PageKind::Addins).unwrap();
        assert!(page.loaded_row(ViewTarget::Addin(id)).is_some());
    }

    #[test]
    fn commands_reach_only_the_active_page() {
        let (mut window, _, _) = window();
        let mut host = TestHost::default();
        window.open(&mut host).unwrap();
        let args = json!({ "name": "Tools" });
        assert_eq!(
            window.invoke(&mut host, commands::BOOT_LIST_ADD_GROUP, args.clone()),
            Routed::Handled(Reply::Done)
        );

        window.on_page_change(1, &mut host).unwrap();
        assert_eq!(
            window.invoke(&mut host, commands::BOOT_LIST_ADD_GROUP, args),
            Routed::Inert
        );
        window.idle(&mut host);
        assert!(host.info.is_empty());
    }
}
