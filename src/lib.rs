//! AddinPanel Core Library
//!
//! Control panel core for hosts that load addins (plugins) into a hierarchy
//! of named groups at runtime.
//!
//! # Architecture
//!
//! The host owns the addins, the repository catalog and the profile. This
//! library sees them through three traits and keeps its own state on top:
//! - **AddinRuntime**: live group/addin tree, load/unload, notifications
//! - **RepositoryIndex**: catalog of loadable addins
//! - **ProfileStore**: persisted boot list and window state
//!
//! Everything runs on the host's UI thread; operations never block.
//!
//! # Core Features
//!
//! ## Loaded Addins (`loaded_view` module)
//! - `rebuild_all()` - Project the live runtime tree into a display tree
//! - `load_into()` / `unload()` / `restart()` - Addin commands with in-place view updates
//! - `on_addin_loaded()` / `on_addin_unloaded()` - Reconcile with host notifications
//!
//! ## Boot List (`boot_list` module)
//! - `load()` / `save()` - Read and write the startup list through the profile
//! - `add_group()` / `add_leaf()` / `rename()` / `delete()` - Validated edits
//! - `move_repository_entry_here()` - Add a catalog entry to the list
//! - `diff()` - Compare edits with the saved list
//!
//! ## Pages (`page`, `addins_page`, `window` modules)
//! - `PageController` - One active page, lazy construction, exit-before-enter
//! - `AddinsPage` - The addins page and its command table
//! - `PanelWindow` - Window driver relaying host events to the pages

pub mod addin;
pub mod addins_page;
pub mod boot_list;
pub mod config;
pub mod context;
pub mod error;
pub mod loaded_view;
pub mod page;
pub mod profile;
pub mod repository;
pub mod runtime;
pub mod window;

pub use addin::{Addin, AddinGroup, AddinId, AddinTags, GroupId, RepositoryAddinInfo};
pub use error::{PanelError, Result};
