use pipeline::provision_schema;

use crate::config::ServerConfig;
use crate::error::ServerError;

pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let connector = config.store.connector();
    let table = config.schema.table_spec();
    provision_schema(&*connector, &config.schema.keyspace_spec(), &table).await?;
    tracing::info!(table = %table.table, store = %connector.describe(), "schema initialised");
    Ok(())
}
