//! List command implementation.

use super::{write_json, write_table, CommandResult, Format};
use dbwatch_api::ListOptions;
use dbwatch_client::{DatabaseClient, Transport};
use std::io::Write;

/// Runs the list command.
pub async fn run<T: Transport>(
    client: &DatabaseClient<T>,
    selector: Option<String>,
    format: Format,
    out: &mut impl Write,
) -> CommandResult {
    let options = ListOptions {
        label_selector: selector,
        ..Default::default()
    };
    let list = client.list(&options).await?;

    match format {
        Format::Text => write_table(out, &list.items)?,
        Format::Json => write_json(out, &list)?,
    }
    Ok(())
}
