use anyhow::{Context, Result, bail};
use std::path::Path;

use orgsync::{
    BuiltinRegistry, Cli, Commands, Config, IndexNode, LocalStore, MetadataIndex, PackageDescriptor,
    ProjectSettings, SyncState, filter_by_operation, find_project_root, get_config_dir, get_manifest_path,
    get_source_dir, global_config_path, init_logging, read_history, settings_path, take_last,
};

fn main() {
    init_logging();

    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let root = match cli.project {
        Some(path) => {
            if !settings_path(&path).is_file() {
                bail!("Not a project directory: {} (missing config/.settings)", path.display());
            }
            path
        }
        None => find_project_root()?,
    };

    let config_path = cli.config.unwrap_or_else(global_config_path);
    let config = Config::load_or_default(&config_path)?;

    match cli.command {
        Commands::Info => cmd_info(&root)?,
        Commands::Store { changed, json } => cmd_store(&root, changed, json)?,
        Commands::Index { keyword, selected } => cmd_index(&root, keyword.as_deref(), selected)?,
        Commands::Subscribe { type_name, members } => {
            cmd_subscribe(&root, &type_name, &members, &config)?
        },
        Commands::Unsubscribe { type_name, members } => {
            cmd_unsubscribe(&root, &type_name, &members)?
        },
        Commands::History { last, operation, json } => cmd_history(&root, last, operation, json)?,
    }

    Ok(())
}

/// Display project settings and the subscribed types
fn cmd_info(root: &Path) -> Result<()> {
    let settings = ProjectSettings::load(&get_config_dir(root))?;
    let package = PackageDescriptor::from_file(&get_manifest_path(root))?;

    println!("Project:     {}", settings.project_name);
    println!("Id:          {}", settings.id);
    println!("Path:        {}", root.display());
    println!("Username:    {}", settings.username);
    println!("Environment: {}", settings.environment);
    if let Some(namespace) = &settings.namespace {
        println!("Namespace:   {}", namespace);
    }
    println!("API version: {}", package.version());

    println!("\nSubscription:");
    for (type_name, members) in package.types() {
        println!("  {:<28} {}", type_name, members.names().join(", "));
    }

    Ok(())
}

/// List local store entries, optionally only the ones changed on disk
fn cmd_store(root: &Path, changed: bool, json: bool) -> Result<()> {
    let config_dir = get_config_dir(root);
    let mut store = LocalStore::load(&config_dir)?;

    if changed {
        store.refresh_states(&get_source_dir(root))?;
        store.save(&config_dir)?;
    }

    let entries: Vec<_> = store
        .iter()
        .filter(|(_, entry)| !changed || entry.mm_state == SyncState::Dirty)
        .collect();

    if json {
        let map: std::collections::BTreeMap<_, _> = entries.into_iter().collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("{}", if changed { "No local changes." } else { "Local store is empty." });
        return Ok(());
    }

    println!("{:<40} {:<20} {:<8} {}", "FILE", "TYPE", "STATE", "LAST MODIFIED");
    println!("{}", "-".repeat(96));
    for (key, entry) in &entries {
        println!(
            "{:<40} {:<20} {:<8} {}",
            key,
            entry.type_name,
            entry.mm_state.as_str(),
            entry.last_modified_date.as_deref().unwrap_or("-")
        );
    }
    println!("\nTotal entries: {}", entries.len());

    Ok(())
}

/// Print the org metadata index as a tree with selection markers
fn cmd_index(root: &Path, keyword: Option<&str>, selected_only: bool) -> Result<()> {
    let index = MetadataIndex::load(&get_config_dir(root))?;
    if index.is_empty() {
        println!("No org metadata index cached. Run a clean from your editor to build it.");
        return Ok(());
    }

    let package = PackageDescriptor::from_file(&get_manifest_path(root))?;
    let selection = index.with_selections(&package, &BuiltinRegistry::standard(), keyword)?;

    print_nodes(&selection.nodes, 0, selected_only);
    println!("\nSelected: {}", selection.selected_ids.len());

    Ok(())
}

fn print_nodes(nodes: &[IndexNode], depth: usize, selected_only: bool) {
    for node in nodes {
        if !node.visibility || (selected_only && !node.select) {
            continue;
        }
        let marker = if node.select { "[x]" } else { "[ ]" };
        println!("{}{} {}", "  ".repeat(depth), marker, node.text);
        print_nodes(&node.children, depth + 1, selected_only);
    }
}

/// Save the manifest and mirror its type list into the settings subscription
fn save_package(root: &Path, package: &PackageDescriptor) -> Result<()> {
    package.write(&get_manifest_path(root))?;

    let config_dir = get_config_dir(root);
    let settings = ProjectSettings::load(&config_dir)?;
    let inline_password = settings.password.is_some();
    settings
        .with_subscription(package.type_names())
        .save(&config_dir, inline_password)
        .context("Failed to update subscription in settings")
}

fn cmd_subscribe(root: &Path, type_name: &str, members: &[String], config: &Config) -> Result<()> {
    let manifest_path = get_manifest_path(root);
    let mut package = if manifest_path.exists() {
        PackageDescriptor::from_file(&manifest_path)?
    }
    else {
        PackageDescriptor::new(&config.api_version)
    };

    if members.is_empty() {
        package.subscribe_all(type_name);
    }
    else {
        for member in members {
            package.add_member(type_name, member);
        }
    }

    save_package(root, &package)?;
    println!("Subscribed to {}", describe_change(type_name, members));
    Ok(())
}

fn cmd_unsubscribe(root: &Path, type_name: &str, members: &[String]) -> Result<()> {
    let mut package = PackageDescriptor::from_file(&get_manifest_path(root))?;

    let changed = if members.is_empty() {
        package.unsubscribe(type_name)
    }
    else {
        members
            .iter()
            .fold(false, |changed, member| package.remove_member(type_name, member) || changed)
    };

    if !changed {
        println!("Nothing to remove for {}", describe_change(type_name, members));
        return Ok(());
    }

    save_package(root, &package)?;
    println!("Unsubscribed from {}", describe_change(type_name, members));
    Ok(())
}

fn describe_change(type_name: &str, members: &[String]) -> String {
    if members.is_empty() {
        type_name.to_string()
    }
    else {
        format!("{} ({})", type_name, members.join(", "))
    }
}

/// Display synchronization history
fn cmd_history(root: &Path, last: Option<usize>, operation: Option<String>, json: bool) -> Result<()> {
    let mut entries = read_history(root)?;

    if entries.is_empty() {
        println!("No history available.");
        return Ok(());
    }

    if let Some(ref operation) = operation {
        entries = filter_by_operation(entries, operation);
        if entries.is_empty() {
            println!("No history entries found for operation '{}'", operation);
            return Ok(());
        }
    }

    if let Some(n) = last {
        entries = take_last(entries, n);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    }
    else {
        println!("Sync History:\n");
        println!("{:<32} {:<9} {:<7} {}", "TIMESTAMP", "OPERATION", "RESULT", "DETAILS");
        println!("{}", "-".repeat(80));
        for entry in &entries {
            println!("{}", entry.display());
        }
        println!("\nTotal entries: {}", entries.len());
    }

    Ok(())
}
