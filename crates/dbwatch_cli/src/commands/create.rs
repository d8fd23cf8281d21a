//! Create command implementation.

use super::CommandResult;
use dbwatch_api::{Database, DatabaseSpec};
use dbwatch_client::{DatabaseClient, Transport};
use std::io::Write;

/// Fields of a new database object.
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    /// Object name.
    pub name: String,
    /// Database name inside the engine.
    pub db_name: String,
    /// Database type.
    pub db_type: String,
    /// Total capacity.
    pub total: i64,
    /// Available capacity.
    pub available: i64,
    /// Description.
    pub description: String,
    /// Free-form tags.
    pub tags: String,
    /// Labels as `key=value`.
    pub labels: Vec<String>,
}

impl CreateRequest {
    fn into_object(self) -> Result<Database, String> {
        let mut object = Database::new(
            self.name,
            DatabaseSpec {
                db_name: self.db_name,
                description: self.description,
                total: self.total,
                available: self.available,
                db_type: self.db_type,
                tags: self.tags,
            },
        );
        for label in &self.labels {
            match label.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    object.metadata.labels.insert(key.into(), value.into());
                }
                _ => return Err(format!("invalid label {:?}, expected key=value", label)),
            }
        }
        Ok(object)
    }
}

/// Runs the create command.
pub async fn run<T: Transport>(
    client: &DatabaseClient<T>,
    request: CreateRequest,
    out: &mut impl Write,
) -> CommandResult {
    let object = request.into_object()?;
    let created = client.create(&object).await?;
    writeln!(
        out,
        "database {} created (resourceVersion {})",
        created.key(),
        created
            .metadata
            .resource_version
            .as_ref()
            .map(|rv| rv.as_str())
            .unwrap_or("-")
    )?;
    Ok(())
}
