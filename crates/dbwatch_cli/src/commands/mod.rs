//! CLI command implementations.

pub mod create;
pub mod delete;
pub mod get;
pub mod list;
pub mod watch;

use clap::ValueEnum;
use dbwatch_api::Database;
use std::io::Write;

/// Result type shared by the commands.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Output format for object listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Aligned columns.
    Text,
    /// Pretty-printed JSON.
    Json,
}

const HEADER: [&str; 5] = ["NAME", "TYPE", "TOTAL", "AVAILABLE", "DESCRIPTION"];

/// Writes one table row per object.
pub fn write_table<'a>(
    out: &mut impl Write,
    objects: impl IntoIterator<Item = &'a Database>,
) -> std::io::Result<()> {
    writeln!(
        out,
        "{:<32} {:<10} {:>8} {:>10}  {}",
        HEADER[0], HEADER[1], HEADER[2], HEADER[3], HEADER[4]
    )?;
    for object in objects {
        writeln!(out, "{}", row(object))?;
    }
    Ok(())
}

fn row(object: &Database) -> String {
    let name = match object.metadata.namespace.as_deref() {
        Some(ns) => format!("{}/{}", ns, object.name()),
        None => object.name().to_string(),
    };
    format!(
        "{:<32} {:<10} {:>8} {:>10}  {}",
        name,
        object.spec.db_type,
        object.spec.total,
        object.spec.available,
        object.spec.description
    )
    .trim_end()
    .to_string()
}

/// Writes a value as pretty JSON followed by a newline.
pub fn write_json(out: &mut impl Write, value: &impl serde::Serialize) -> CommandResult {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
