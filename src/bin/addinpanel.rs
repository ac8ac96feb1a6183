use addinpanel_core::boot_list::{BootList, BootNodeId, BootNodeKind};
use addinpanel_core::config::PanelConfig;
use addinpanel_core::profile::JsonFileProfile;
use addinpanel_core::repository::Catalog;
use anyhow::Context;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Prints the boot list stored in a profile, with catalog names resolved.
///
/// Usage: `addinpanel <profile.json> [catalog.json] [config.json]`
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let profile_path = args
        .next()
        .map(PathBuf::from)
        .context("usage: addinpanel <profile.json> [catalog.json] [config.json]")?;
    let catalog = match args.next() {
        Some(path) => Catalog::from_json_file(&PathBuf::from(path))?,
        None => Catalog::default(),
    };
    let config = match args.next() {
        Some(path) => PanelConfig::from_json_file(&PathBuf::from(path))?,
        None => PanelConfig::default(),
    };

    let profile = JsonFileProfile::open(&profile_path)?;
    let mut list = BootList::new(&config.boot_list_caption);
    list.load(&profile, &config.boot_list_key, &catalog)?;

    print_node(&list, list.root(), 0);
    Ok(())
}

fn print_node(list: &BootList, id: BootNodeId, depth: usize) {
    let indent = "  ".repeat(depth);
    match list.kind(id) {
        Some(BootNodeKind::Group { name }) => println!("{indent}[{name}]"),
        Some(BootNodeKind::Leaf {
            descriptor,
            display_name,
        }) if display_name.is_empty() => println!("{indent}{descriptor}"),
        Some(BootNodeKind::Leaf {
            descriptor,
            display_name,
        }) => println!("{indent}{display_name} ({descriptor})"),
        None => return,
    }
    for child in list.children(id) {
        print_node(list, *child, depth + 1);
    }
}
