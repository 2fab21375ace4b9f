//! fos-plugin-scan
//!
//! Scans the plugin directories the way the host does and prints every
//! module found with the MIME types it claims.

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use fos_plugins::{PluginDatabase, PluginModule, PluginSettings, Scheduler};

/// List installed native plugins
#[derive(Parser)]
#[command(name = "fos-plugin-scan", version, about, long_about = None)]
struct Cli {
    /// Directory to scan instead of the defaults (repeatable)
    #[arg(short, long = "dir")]
    dirs: Vec<PathBuf>,

    /// Plugin settings file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only show the plugin handling this MIME type
    #[arg(short, long)]
    mime: Option<String>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut settings = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            PluginSettings::from_json(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => PluginSettings::default(),
    };
    if !cli.dirs.is_empty() {
        settings.plugin_directories = cli.dirs.clone();
    }

    let mut database = PluginDatabase::new(&settings, Rc::new(Scheduler::system()));
    let found = database.refresh();
    tracing::debug!("Found {} plugins in {} directories", found, database.directories().len());

    let modules: Vec<Rc<PluginModule>> = match &cli.mime {
        Some(mime) => database.plugin_for_mime(mime).into_iter().collect(),
        None => database.plugins().to_vec(),
    };

    if cli.json {
        let list: Vec<serde_json::Value> = modules.iter().map(|m| module_json(m)).collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    if modules.is_empty() {
        println!("No plugins found in:");
        for dir in database.directories() {
            println!("  {}", dir.display());
        }
        return Ok(());
    }

    for module in &modules {
        print_module(module);
    }
    Ok(())
}

fn print_module(module: &PluginModule) {
    println!("{} ({})", module.name(), module.version());
    println!("  {}", module.path().display());
    if !module.description().is_empty() {
        println!("  {}", module.description());
    }
    let quirks = module.quirks().names();
    if !quirks.is_empty() {
        println!("  quirks: {}", quirks.join(", "));
    }
    for entry in module.mime_types() {
        println!(
            "    {:<40} {:<16} {}",
            entry.mime_type,
            entry.extensions.join(","),
            entry.description
        );
    }
}

fn module_json(module: &PluginModule) -> serde_json::Value {
    let mime_types: Vec<serde_json::Value> = module
        .mime_types()
        .iter()
        .map(|entry| {
            serde_json::json!({
                "mime_type": entry.mime_type,
                "extensions": entry.extensions,
                "description": entry.description,
            })
        })
        .collect();

    serde_json::json!({
        "name": module.name(),
        "description": module.description(),
        "path": module.path().display().to_string(),
        "version": module.version().to_string(),
        "quirks": module.quirks().names(),
        "mime_types": mime_types,
    })
}
