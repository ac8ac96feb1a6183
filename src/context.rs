//! Everything a panel window shares with its pages.
//!
//! One context is created per window and handed to page constructors. The
//! collaborators inside are the host's; the panel runs on the host's UI
//! thread only, hence `Rc<RefCell<_>>` rather than locks.

use crate::config::PanelConfig;
use crate::profile::ProfileStore;
use crate::repository::RepositoryIndex;
use crate::runtime::AddinRuntime;
use std::cell::RefCell;
use std::rc::Rc;

/// Maps an addin's unique name to its help topic.
pub trait HelpLookup {
    fn addin_help_path(&self, unique_name: &str) -> Option<String>;
}

/// Help lookup for hosts without a help system.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHelp;

impl HelpLookup for NoHelp {
    fn addin_help_path(&self, _unique_name: &str) -> Option<String> {
        None
    }
}

#[derive(Clone)]
pub struct AppContext {
    pub config: PanelConfig,
    pub runtime: Rc<RefCell<dyn AddinRuntime>>,
    pub repository: Rc<dyn RepositoryIndex>,
    pub profile: Rc<RefCell<dyn ProfileStore>>,
    pub help: Rc<dyn HelpLookup>,
}

impl AppContext {
    pub fn new(
        config: PanelConfig,
        runtime: Rc<RefCell<dyn AddinRuntime>>,
        repository: Rc<dyn RepositoryIndex>,
        profile: Rc<RefCell<dyn ProfileStore>>,
    ) -> Self {
        Self {
            config,
            runtime,
            repository,
            profile,
            help: Rc::new(NoHelp),
        }
    }

    pub fn with_help(mut self, help: Rc<dyn HelpLookup>) -> Self {
        self.help = help;
        self
    }
}
