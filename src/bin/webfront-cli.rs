use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use webfront::config::{load_config, FrontConfig};
use webfront::lifecycle::build_resources;
use webfront::routing::Route;

#[derive(Parser)]
#[command(name = "webfront-cli")]
#[command(about = "Inspect the resource index and routing decisions of a webfront config", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every indexed alias and where it resolves
    Index,
    /// Show how a request path would be routed
    Route { path: String },
    /// Resolve a resource name the way the application would
    Resolve { name: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => FrontConfig::default(),
    };
    let resources = build_resources(&config.resources)?;

    let output = match cli.command {
        Commands::Index => {
            let mut entries: Vec<Value> = resources
                .index
                .iter()
                .map(|(alias, location)| {
                    json!({
                        "alias": alias,
                        "origin": location.origin(),
                        "location": location.to_string(),
                    })
                })
                .collect();
            entries.sort_by(|a, b| a["alias"].as_str().cmp(&b["alias"].as_str()));
            json!({
                "resources": resources.index.resource_count(),
                "aliases": resources.index.len(),
                "entries": entries,
            })
        }
        Commands::Route { path } => match resources.router.route(&path).await? {
            Route::FastPath(resource) => json!({
                "path": path,
                "decision": "fast",
                "origin": resource.origin(),
                "location": resource.location().to_string(),
            }),
            route => json!({
                "path": path,
                "decision": route.decision(),
            }),
        },
        Commands::Resolve { name } => match resources.resolver.resolve(&name) {
            Some(location) => json!({
                "name": name,
                "origin": location.origin(),
                "location": location.to_string(),
            }),
            None => json!({ "name": name, "location": null }),
        },
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
