use stream_api::{ColumnStore, KeyspaceSpec, PluginError, TableSpec};

/// Создать keyspace и таблицу, если их нет.
///
/// Идемпотентно: повторный вызов ничего не меняет. Ошибки не ретраятся.
pub async fn register_schema(
    store: &dyn ColumnStore,
    keyspace: &KeyspaceSpec,
    table: &TableSpec,
) -> Result<(), PluginError> {
    store
        .create_keyspace(keyspace)
        .await
        .map_err(|e| e.with_context(format!("create keyspace {}", keyspace.name)))?;
    tracing::info!(keyspace = %keyspace.name, replication = ?keyspace.replication, "keyspace ready");

    store
        .create_table(table)
        .await
        .map_err(|e| e.with_context(format!("create table {}", table.table)))?;
    tracing::info!(table = %table.table, columns = table.columns.len(), "table ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage_memory::MemoryStore;
    use stream_api::{IdType, TableRef};

    #[tokio::test]
    async fn registering_twice_is_a_noop() {
        let store = MemoryStore::new();
        let keyspace = KeyspaceSpec::simple("spark_streams", 1);
        let table = TableSpec::users(TableRef::new("spark_streams", "created_users"), IdType::Text);

        register_schema(&store, &keyspace, &table).await.unwrap();
        let first = store.table_spec(&table.table).await.unwrap();

        register_schema(&store, &keyspace, &table).await.unwrap();
        assert_eq!(store.table_spec(&table.table).await.unwrap(), first);
        assert_eq!(store.keyspace(&keyspace.name).await.unwrap(), keyspace);
    }

    #[tokio::test]
    async fn table_without_keyspace_fails() {
        let store = MemoryStore::new();
        let table = TableSpec::users(TableRef::new("missing", "created_users"), IdType::Text);
        let keyspace = KeyspaceSpec::simple("spark_streams", 1);

        register_schema(&store, &keyspace, &table).await.unwrap_err();
        assert!(store.table_spec(&table.table).await.is_none());
    }
}
