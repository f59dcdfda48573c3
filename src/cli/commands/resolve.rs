//! Resolve command - print a module's dependency graph

use crate::cli::args::{OutputFormat, ResolveArgs};
use crate::config::Config;
use crate::error::KilnResult;
use crate::resolve::ResolvedGraph;
use crate::workspace::Workspace;
use console::style;

/// Execute the resolve command
pub async fn execute(args: ResolveArgs, config: &Config) -> KilnResult<()> {
    let ws = Workspace::load(config).await?;
    let root = ws.root_module(&args.module, args.version.as_deref())?;
    let graph = ws.resolver().resolve(&root)?;

    match args.format {
        OutputFormat::Table => print_graph_table(&graph),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&graph)?),
        OutputFormat::Plain => print_graph_plain(&graph),
    }

    Ok(())
}

fn print_graph_table(graph: &ResolvedGraph) {
    println!(
        "{:<32} {:<14} {:<8} {}",
        "MODULE", "VERSION", "SOURCE", "DEPENDENCIES"
    );
    println!("{}", "-".repeat(80));

    for node in graph.topo_order() {
        let deps = node
            .deps
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let name = if &node.module == graph.root() {
            style(node.module.path.as_str()).bold().to_string()
        } else {
            node.module.path.clone()
        };

        println!(
            "{:<32} {:<14} {:<8} {}",
            name,
            node.module.version,
            node.source.to_string(),
            if deps.is_empty() { "-".to_string() } else { deps }
        );
    }

    println!();
    println!("Total: {} module(s)", graph.len());
}

/// Dependencies first, one `path@version` per line
fn print_graph_plain(graph: &ResolvedGraph) {
    for node in graph.topo_order() {
        println!("{}", node.module);
    }
}
