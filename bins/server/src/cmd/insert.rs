use pipeline::insert_payload;

use crate::config::{InsertArgs, ServerConfig};
use crate::error::ServerError;

/// Одна строка мимо pipeline'а. Схема должна уже существовать
/// (`init-schema` или `run`).
pub async fn run(config: ServerConfig, args: InsertArgs) -> Result<(), ServerError> {
    let connector = config.store.connector();
    let table = config.schema.table_spec();
    if insert_payload(&*connector, &table, args.json.as_bytes()).await? {
        Ok(())
    } else {
        Err(ServerError::InsertFailed(table.table.to_string()))
    }
}
