//! Delete command implementation.

use super::CommandResult;
use dbwatch_api::DeleteOptions;
use dbwatch_client::{DatabaseClient, Transport};
use std::io::Write;

/// Runs the delete command.
pub async fn run<T: Transport>(
    client: &DatabaseClient<T>,
    name: &str,
    out: &mut impl Write,
) -> CommandResult {
    let deleted = client.delete(name, &DeleteOptions::default()).await?;
    writeln!(out, "database {} deleted", deleted.key())?;
    Ok(())
}
