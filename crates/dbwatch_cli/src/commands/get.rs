//! Get command implementation.

use super::{write_json, write_table, CommandResult, Format};
use dbwatch_api::GetOptions;
use dbwatch_client::{DatabaseClient, Transport};
use std::io::Write;

/// Runs the get command.
pub async fn run<T: Transport>(
    client: &DatabaseClient<T>,
    name: &str,
    format: Format,
    out: &mut impl Write,
) -> CommandResult {
    let object = client.get(name, &GetOptions::default()).await?;

    match format {
        Format::Text => write_table(out, [&object])?,
        Format::Json => write_json(out, &object)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{client, database};

    #[tokio::test]
    async fn shows_one_object() {
        let (_server, client) = client();
        client
            .create(&database("mysql", "SQL", 100, 50))
            .await
            .unwrap();

        let mut out = Vec::new();
        run(&client, "mysql", Format::Json, &mut out).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["spec"]["dbType"], "SQL");
        assert!(value["metadata"]["uid"].is_string());
    }

    #[tokio::test]
    async fn missing_object_fails() {
        let (_server, client) = client();
        let mut out = Vec::new();
        let err = run(&client, "nope", Format::Text, &mut out)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert!(out.is_empty());
    }
}
