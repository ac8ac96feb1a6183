//! Page switching for the panel window.
//!
//! The window shows one page at a time out of a fixed set registered by the
//! host. Pages are built on first activation and kept afterwards. Only the
//! active page is entered and only it receives ambient events such as idle
//! ticks; the previous page is always exited before the next one is entered.
//!
//! Each page type declares its command handlers once, as a static table.
//! The controller resolves the table when it builds the page and routes host
//! commands through it.

use crate::error::{PanelError, Result};
use crate::AddinId;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Host services a page may use: messages, dialogs and focus queries.
pub trait HostView {
    /// Non-modal message in the host's message log.
    fn message(&mut self, text: &str);

    /// Modal message box.
    fn message_box(&mut self, text: &str);

    /// Modal yes/no question.
    fn confirm(&mut self, text: &str) -> bool;

    /// Name of the control that currently has focus.
    fn focused_control(&self) -> Option<String>;

    /// Shows a help topic in the page's info pane.
    fn show_info(&mut self, _topic: &str) {}
}

/// Events delivered to pages outside of command invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The host's idle loop ticked.
    Idle,
    AddinLoaded(AddinId),
    AddinUnloaded(AddinId),
}

impl Notification {
    /// Ambient events only reach the active page. The rest reach every page
    /// that has been connected.
    pub fn is_ambient(&self) -> bool {
        matches!(self, Notification::Idle)
    }
}

/// Arguments of a host command, as the host sent them.
#[derive(Debug, Clone, Default)]
pub struct CommandArgs {
    pub value: Value,
}

impl CommandArgs {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    pub fn str(&self, field: &str) -> Option<&str> {
        self.value.get(field).and_then(Value::as_str)
    }

    pub fn u64(&self, field: &str) -> Option<u64> {
        self.value.get(field).and_then(Value::as_u64)
    }
}

/// What a handler tells the host about the operation that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Done,
    /// Cancel the host operation (e.g. the row deletion it was about to do).
    Cancel,
    /// The value being committed is invalid.
    Invalid,
}

/// Whether a handler is reachable while its page isn't active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    ActiveOnly,
    Always,
}

pub type Handler<P> = fn(&mut P, &mut dyn HostView, &CommandArgs) -> Reply;

pub struct HandlerEntry<P> {
    pub command: &'static str,
    pub scope: Scope,
    pub handler: Handler<P>,
}

/// Static command table of one page type.
pub struct Handlers<P> {
    entries: Vec<HandlerEntry<P>>,
}

impl<P> Default for Handlers<P> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<P> Handlers<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, command: &'static str, handler: Handler<P>) -> Self {
        self.entries.push(HandlerEntry {
            command,
            scope: Scope::ActiveOnly,
            handler,
        });
        self
    }

    /// Registers a handler that stays reachable while the page is inactive.
    pub fn always(mut self, command: &'static str, handler: Handler<P>) -> Self {
        self.entries.push(HandlerEntry {
            command,
            scope: Scope::Always,
            handler,
        });
        self
    }
}

/// Lifecycle contract of a page.
pub trait Page: 'static {
    fn handlers() -> Handlers<Self>
    where
        Self: Sized;

    /// Runs once, right after the page is built.
    fn connect(&mut self, host: &mut dyn HostView);

    fn enter(&mut self, host: &mut dyn HostView);

    /// Must tolerate being called on a page that was never entered.
    fn exit(&mut self, host: &mut dyn HostView);

    fn notify(&mut self, _host: &mut dyn HostView, _event: &Notification) {}
}

/// Object-safe face of a built page with its resolved command table.
trait MountedPage {
    fn connect(&mut self, host: &mut dyn HostView);
    fn enter(&mut self, host: &mut dyn HostView);
    fn exit(&mut self, host: &mut dyn HostView);
    fn notify(&mut self, host: &mut dyn HostView, event: &Notification);
    fn invoke(
        &mut self,
        host: &mut dyn HostView,
        command: &str,
        args: &CommandArgs,
        active: bool,
    ) -> Option<Reply>;
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

struct Mounted<P: Page> {
    page: P,
    table: HashMap<&'static str, (Scope, Handler<P>)>,
}

impl<P: Page> Mounted<P> {
    fn new(page: P) -> Self {
        let table = P::handlers()
            .entries
            .into_iter()
            .map(|entry| (entry.command, (entry.scope, entry.handler)))
            .collect();
        Self { page, table }
    }
}

impl<P: Page> MountedPage for Mounted<P> {
    fn connect(&mut self, host: &mut dyn HostView) {
        self.page.connect(host);
    }

    fn enter(&mut self, host: &mut dyn HostView) {
        self.page.enter(host);
    }

    fn exit(&mut self, host: &mut dyn HostView) {
        self.page.exit(host);
    }

    fn notify(&mut self, host: &mut dyn HostView, event: &Notification) {
        self.page.notify(host, event);
    }

    fn invoke(
        &mut self,
        host: &mut dyn HostView,
        command: &str,
        args: &CommandArgs,
        active: bool,
    ) -> Option<Reply> {
        let (scope, handler) = *self.table.get(command)?;
        if !active && scope != Scope::Always {
            return None;
        }
        Some(handler(&mut self.page, host, args))
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        &mut self.page
    }
}

type Factory = Box<dyn FnMut() -> Box<dyn MountedPage>>;

struct Slot {
    factory: Factory,
    instance: Option<Box<dyn MountedPage>>,
    entered: bool,
}

/// Outcome of routing a host command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Handled(Reply),
    /// No reachable page handles the command.
    Inert,
}

/// Owns the pages of one window and the single active page.
pub struct PageController<K> {
    slots: HashMap<K, Slot>,
    order: Vec<K>,
    active: Option<K>,
}

impl<K> Default for PageController<K>
where
    K: Copy + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> PageController<K>
where
    K: Copy + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            order: Vec::new(),
            active: None,
        }
    }

    /// Declares a page kind. The page is built on its first activation.
    pub fn register<P, F>(&mut self, kind: K, mut factory: F)
    where
        P: Page,
        F: FnMut() -> P + 'static,
    {
        if !self.slots.contains_key(&kind) {
            self.order.push(kind);
        }
        self.slots.insert(
            kind,
            Slot {
                factory: Box::new(move || Box::new(Mounted::new(factory())) as Box<dyn MountedPage>),
                instance: None,
                entered: false,
            },
        );
    }

    /// Registered kinds in registration order.
    pub fn kinds(&self) -> &[K] {
        &self.order
    }

    pub fn active(&self) -> Option<K> {
        self.active
    }

    pub fn is_connected(&self, kind: K) -> bool {
        self.slots
            .get(&kind)
            .is_some_and(|slot| slot.instance.is_some())
    }

    pub fn is_entered(&self, kind: K) -> bool {
        self.slots.get(&kind).is_some_and(|slot| slot.entered)
    }

    /// Exits the current page, then builds (first time only) and enters
    /// `kind`.
    pub fn activate(&mut self, kind: K, host: &mut dyn HostView) -> Result<()> {
        if !self.slots.contains_key(&kind) {
            return Err(PanelError::unknown_page(kind));
        }
        if let Some(current) = self.active.take() {
            if let Some(slot) = self.slots.get_mut(&current) {
                if let Some(page) = slot.instance.as_mut() {
                    page.exit(host);
                }
                slot.entered = false;
            }
        }
        let slot = self
            .slots
            .get_mut(&kind)
            .ok_or_else(|| PanelError::unknown_page(kind))?;
        if slot.instance.is_none() {
            let mut page = (slot.factory)();
            page.connect(host);
            slot.instance = Some(page);
            tracing::debug!(target: "addinpanel::page", page = ?kind, "page connected");
        }
        if let Some(page) = slot.instance.as_mut() {
            page.enter(host);
            slot.entered = true;
        }
        self.active = Some(kind);
        tracing::debug!(target: "addinpanel::page", page = ?kind, "page entered");
        Ok(())
    }

    /// Delivers a host-reported event: ambient ones to the active page only,
    /// the rest to every connected page in registration order. Outcomes of a
    /// page's own addin operations are consumed by that page and never come
    /// through here.
    pub fn notify(&mut self, host: &mut dyn HostView, event: &Notification) {
        if event.is_ambient() {
            let Some(active) = self.active else {
                return;
            };
            if let Some(page) = self.slots.get_mut(&active).and_then(|s| s.instance.as_mut()) {
                page.notify(host, event);
            }
            return;
        }
        for kind in &self.order {
            if let Some(page) = self.slots.get_mut(kind).and_then(|s| s.instance.as_mut()) {
                page.notify(host, event);
            }
        }
    }

    /// Routes a host command to the active page, or to an inactive page that
    /// registered the command as always reachable.
    pub fn invoke(&mut self, host: &mut dyn HostView, command: &str, args: &CommandArgs) -> Routed {
        if let Some(active) = self.active {
            if let Some(page) = self.slots.get_mut(&active).and_then(|s| s.instance.as_mut()) {
                if let Some(reply) = page.invoke(host, command, args, true) {
                    return Routed::Handled(reply);
                }
            }
        }
        for kind in &self.order {
            if Some(*kind) == self.active {
                continue;
            }
            if let Some(page) = self.slots.get_mut(kind).and_then(|s| s.instance.as_mut()) {
                if let Some(reply) = page.invoke(host, command, args, false) {
                    return Routed::Handled(reply);
                }
            }
        }
        tracing::trace!(target: "addinpanel::page", command, "command not routed");
        Routed::Inert
    }

    /// Typed access to a connected page.
    pub fn page_mut<P: Page>(&mut self, kind: K) -> Option<&mut P> {
        self.slots
            .get_mut(&kind)?
            .instance
            .as_mut()?
            .as_any_mut()
            .downcast_mut::<P>()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    pub(crate) struct TestHost {
        pub messages: Vec<String>,
        pub boxes: Vec<String>,
        pub answer: bool,
        pub focus: Option<String>,
        pub info: Vec<String>,
    }

    impl HostView for TestHost {
        fn message(&mut self, text: &str) {
            self.messages.push(text.to_string());
        }
        fn message_box(&mut self, text: &str) {
            self.boxes.push(text.to_string());
        }
        fn confirm(&mut self, _text: &str) -> bool {
            self.answer
        }
        fn focused_control(&self) -> Option<String> {
            self.focus.clone()
        }
        fn show_info(&mut self, topic: &str) {
            self.info.push(topic.to_string());
        }
    }

    type Log = Rc<RefCell<Vec<String>>>;

    struct Probe {
        name: &'static str,
        log: Log,
    }

    impl Probe {
        fn record(&self, what: &str) {
            self.log.borrow_mut().push(format!("{}:{}", self.name, what));
        }

        fn ping(&mut self, _host: &mut dyn HostView, _args: &CommandArgs) -> Reply {
            self.record("ping");
            Reply::Done
        }

        fn reject(&mut self, _host: &mut dyn HostView, _args: &CommandArgs) -> Reply {
            self.record("reject");
            Reply::Cancel
        }
    }

    impl Page for Probe {
        fn handlers() -> Handlers<Self> {
            Handlers::new()
                .on("ping", Probe::ping)
                .always("reject", Probe::reject)
        }
        fn connect(&mut self, _host: &mut dyn HostView) {
            self.record("connect");
        }
        fn enter(&mut self, _host: &mut dyn HostView) {
            self.record("enter");
        }
        fn exit(&mut self, _host: &mut dyn HostView) {
            self.record("exit");
        }
        fn notify(&mut self, _host: &mut dyn HostView, event: &Notification) {
            self.record(&format!("{:?}", event));
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        A,
        B,
        Missing,
    }

    fn controller(log: &Log, builds: &Rc<RefCell<usize>>) -> PageController<Kind> {
        let mut pages = PageController::new();
        for (kind, name) in [(Kind::A, "a"), (Kind::B, "b")] {
            let log = log.clone();
            let builds = builds.clone();
            pages.register(kind, move || {
                *builds.borrow_mut() += 1;
                Probe {
                    name,
                    log: log.clone(),
                }
            });
        }
        pages
    }

    #[test]
    fn reactivation_reuses_instance() {
        let log = Log::default();
        let builds = Rc::new(RefCell::new(0));
        let mut pages = controller(&log, &builds);
        let mut host = TestHost::default();

        pages.activate(Kind::A, &mut host).unwrap();
        pages.activate(Kind::A, &mut host).unwrap();

        assert_eq!(*builds.borrow(), 1);
        assert_eq!(
            *log.borrow(),
            vec!["a:connect", "a:enter", "a:exit", "a:enter"]
        );
    }

    #[test]
    fn exit_precedes_enter() {
        let log = Log::default();
        let builds = Rc::new(RefCell::new(0));
        let mut pages = controller(&log, &builds);
        let mut host = TestHost::default();

        pages.activate(Kind::A, &mut host).unwrap();
        log.borrow_mut().clear();
        pages.activate(Kind::B, &mut host).unwrap();

        assert_eq!(*log.borrow(), vec!["a:exit", "b:connect", "b:enter"]);
        assert!(!pages.is_entered(Kind::A));
        assert!(pages.is_entered(Kind::B));
    }

    #[test]
    fn ambient_events_reach_only_active_page() {
        let log = Log::default();
        let builds = Rc::new(RefCell::new(0));
        let mut pages = controller(&log, &builds);
        let mut host = TestHost::default();

        pages.notify(&mut host, &Notification::Idle);
        pages.activate(Kind::A, &mut host).unwrap();
        pages.activate(Kind::B, &mut host).unwrap();
        log.borrow_mut().clear();

        pages.notify(&mut host, &Notification::Idle);
        pages.notify(&mut host, &Notification::AddinLoaded(AddinId(7)));
        assert_eq!(
            *log.borrow(),
            vec![
                "b:Idle",
                "a:AddinLoaded(AddinId(7))",
                "b:AddinLoaded(AddinId(7))"
            ]
        );
    }

    #[test]
    fn commands_route_to_active_page_only() {
        let log = Log::default();
        let builds = Rc::new(RefCell::new(0));
        let mut pages = controller(&log, &builds);
        let mut host = TestHost::default();
        let args = CommandArgs::default();

        assert_eq!(pages.invoke(&mut host, "ping", &args), Routed::Inert);
        pages.activate(Kind::A, &mut host).unwrap();
        pages.activate(Kind::B, &mut host).unwrap();
        log.borrow_mut().clear();

        assert_eq!(pages.invoke(&mut host, "ping", &args), Routed::Handled(Reply::Done));
        assert_eq!(*log.borrow(), vec!["b:ping"]);
        assert_eq!(pages.invoke(&mut host, "nope", &args), Routed::Inert);
    }

    #[test]
    fn always_scoped_handler_reaches_inactive_page() {
        let log = Log::default();
        let builds = Rc::new(RefCell::new(0));
        let mut pages = PageController::new();
        {
            let log = log.clone();
            let builds = builds.clone();
            pages.register(Kind::A, move || {
                *builds.borrow_mut() += 1;
                Probe {
                    name: "a",
                    log: log.clone(),
                }
            });
        }
        pages.register(Kind::B, NoHandlers::default);
        let mut host = TestHost::default();
        pages.activate(Kind::A, &mut host).unwrap();
        pages.activate(Kind::B, &mut host).unwrap();
        log.borrow_mut().clear();

        let args = CommandArgs::default();
        assert_eq!(pages.invoke(&mut host, "ping", &args), Routed::Inert);
        assert_eq!(
            pages.invoke(&mut host, "reject", &args),
            Routed::Handled(Reply::Cancel)
        );
        assert_eq!(*log.borrow(), vec!["a:reject"]);
    }

    #[derive(Default)]
    struct NoHandlers;

    impl Page for NoHandlers {
        fn handlers() -> Handlers<Self> {
            Handlers::new()
        }
        fn connect(&mut self, _host: &mut dyn HostView) {}
        fn enter(&mut self, _host: &mut dyn HostView) {}
        fn exit(&mut self, _host: &mut dyn HostView) {}
    }

    #[test]
    fn unknown_kind_leaves_active_page_entered() {
        let log = Log::default();
        let builds = Rc::new(RefCell::new(0));
        let mut pages = controller(&log, &builds);
        let mut host = TestHost::default();

        pages.activate(Kind::A, &mut host).unwrap();
        let err = pages.activate(Kind::Missing, &mut host).unwrap_err();
        assert!(matches!(err, PanelError::UnknownPage { .. }));
        assert_eq!(pages.active(), Some(Kind::A));
        assert!(pages.is_entered(Kind::A));
    }

    #[test]
    fn typed_access_to_connected_page() {
        let log = Log::default();
        let builds = Rc::new(RefCell::new(0));
        let mut pages = controller(&log, &builds);
        let mut host = TestHost::default();
        assert!(pages.page_mut::<Probe>(Kind::A).is_none());
        pages.activate(Kind::A, &mut host).unwrap();
        assert_eq!(pages.page_mut::<Probe>(Kind::A).map(|p| p.name), Some("a"));
        assert!(pages.page_mut::<NoHandlers>(Kind::A).is_none());
    }
}
