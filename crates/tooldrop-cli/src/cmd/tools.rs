//! `tooldrop tools`: the built-in tool registry.

use crossterm::style::Stylize;
use tooldrop_core::tools::{self, ToolSpec};

/// Print every installable tool with its release sources.
pub fn tools() {
    let registry = tools::builtin();
    let nw = registry.iter().map(|t| t.name.len()).max().unwrap_or(0) + 2;

    println!();
    for tool in &registry {
        println!(
            "  {} {}",
            format!("{:<nw$}", tool.name).white().bold(),
            tool.description
        );
        println!("  {:<nw$} {}", "", sources_line(tool).dark_grey());
    }
    println!();
}

fn sources_line(tool: &ToolSpec) -> String {
    let mut line = format!("from {}", tool.source_ids().join(", "));
    if tool.source_build.is_some() {
        line.push_str(" (or built from source)");
    }
    line
}
