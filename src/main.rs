//! waymark command line.
//!
//! ```text
//! waymark check <routes.toml>              validate and print the route tree
//! waymark match <routes.toml> <ref>        print the chains a ref matches
//! waymark navigate <routes.toml> <ref>...  drive a router over in-memory history
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use waymark::config::load_config;
use waymark::observability::logging::init_logging;
use waymark::routing::RouteSource;
use waymark::schema::SchemaTree;
use waymark::{MemoryHistory, Router, RouterConfig, Shutdown};

#[derive(Parser)]
#[command(name = "waymark", version, about = "Hierarchical route matching and transitions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a route file and print its tree.
    Check { config: PathBuf },
    /// Match a ref without running any hooks.
    Match { config: PathBuf, reference: String },
    /// Navigate through refs in order and print the committed state after each.
    Navigate {
        config: PathBuf,
        #[arg(required = true)]
        references: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let path = match &cli.command {
        Command::Check { config } | Command::Match { config, .. } | Command::Navigate { config, .. } => {
            config.clone()
        }
    };
    let config = load_config(&path)?;
    init_logging(&config.observability);

    tracing::debug!(path = %path.display(), routes = config.routes.len(), "Configuration loaded");

    match cli.command {
        Command::Check { .. } => check(&config)?,
        Command::Match { reference, .. } => {
            let history = Arc::new(MemoryHistory::new(&default_ref(&config))?);
            let router = Router::new(&config, history)?;
            let source = router.resolve(&reference)?;
            println!("{}", serde_json::to_string_pretty(&describe(&router, &source))?);
        }
        Command::Navigate { references, .. } => navigate(&config, &references).await?,
    }

    Ok(())
}

fn default_ref(config: &RouterConfig) -> String {
    format!("{}{}", config.prefix, config.default_location)
}

fn check(config: &RouterConfig) -> Result<(), Box<dyn std::error::Error>> {
    let tree = SchemaTree::build(&config.routes, &config.primary_group)?;
    for node in tree.nodes() {
        let mut flags = Vec::new();
        if node.allows_exact() {
            flags.push("exact".to_string());
        }
        if !node.query_keys().is_empty() {
            let keys: Vec<_> = node.query_keys().iter().cloned().collect();
            flags.push(format!("query={}", keys.join(",")));
        }
        if node.parallel().is_some() {
            flags.push("parallel".to_string());
        }
        println!(
            "{}{} {} [{}]{}",
            "  ".repeat(node.depth()),
            node.name(),
            node.pattern(),
            node.group(),
            if flags.is_empty() {
                String::new()
            } else {
                format!(" {}", flags.join(" "))
            }
        );
    }
    println!("{} nodes, {} groups", tree.len(), tree.groups().len());
    Ok(())
}

fn describe(router: &Router, source: &RouteSource) -> Value {
    let schema = router.tree().schema();
    let chains: serde_json::Map<String, Value> = source
        .chains()
        .iter()
        .map(|(group, chain)| {
            let entries = chain
                .iter()
                .map(|entry| {
                    json!({
                        "node": schema.node(entry.node).full_name(),
                        "exact": entry.exact,
                        "segment": entry.segment,
                        "param": entry.param,
                    })
                })
                .collect();
            (group.clone(), Value::Array(entries))
        })
        .collect();

    json!({
        "paths": source.paths(),
        "chains": chains,
        "query": source.query(),
    })
}

async fn navigate(config: &RouterConfig, references: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let history = Arc::new(MemoryHistory::new(&default_ref(config))?);
    let router = Router::new(config, history)?;

    let shutdown = Shutdown::new();
    let task = tokio::spawn({
        let router = router.clone();
        let rx = shutdown.subscribe();
        async move { router.run(rx).await }
    });

    for reference in references {
        let outcome = router.push_settled(reference).await?;
        let step = json!({
            "ref": reference,
            "outcome": outcome,
            "location": router.committed_location().map(|l| l.to_ref()),
            "state": describe(&router, &router.committed()),
        });
        println!("{}", serde_json::to_string_pretty(&step)?);
    }

    shutdown.trigger();
    task.await?;
    Ok(())
}
