use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;

use stream_api::{
    ColumnStore, KeyspaceSpec, PluginError, StoreConnector, TableRef, TableSpec, UserRecord,
};

// ═══════════════════════════════════════════════════════════════
//  MemoryStore
// ═══════════════════════════════════════════════════════════════

struct Table {
    spec: TableSpec,
    /// id → строка. Upsert перезаписывает по ключу.
    rows: BTreeMap<String, UserRecord>,
}

#[derive(Default)]
struct State {
    keyspaces: BTreeMap<String, KeyspaceSpec>,
    tables: BTreeMap<TableRef, Table>,
}

#[derive(Default)]
struct Inner {
    state: RwLock<State>,
    open_sessions: AtomicUsize,
}

/// In-memory column store с семантикой Cassandra: `IF NOT EXISTS`
/// для схемы и upsert по primary key. Для dry-run запусков и тестов.
///
/// Клоны разделяют одно и то же состояние.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn keyspace(&self, name: &str) -> Option<KeyspaceSpec> {
        self.inner.state.read().await.keyspaces.get(name).cloned()
    }

    pub async fn table_spec(&self, table: &TableRef) -> Option<TableSpec> {
        self.inner.state.read().await.tables.get(table).map(|t| t.spec.clone())
    }

    /// Все строки таблицы в порядке `id`.
    pub async fn rows(&self, table: &TableRef) -> Vec<UserRecord> {
        self.inner
            .state
            .read()
            .await
            .tables
            .get(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn row(&self, table: &TableRef, id: &str) -> Option<UserRecord> {
        self.inner.state.read().await.tables.get(table).and_then(|t| t.rows.get(id).cloned())
    }

    /// Количество сессий, открытых через `connect` и ещё не закрытых.
    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::SeqCst)
    }
}

impl ColumnStore for MemoryStore {
    fn create_keyspace(
        &self,
        keyspace: &KeyspaceSpec,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        let keyspace = keyspace.clone();
        Box::pin(async move {
            let mut state = self.inner.state.write().await;
            state.keyspaces.entry(keyspace.name.clone()).or_insert(keyspace);
            Ok(())
        })
    }

    fn create_table(
        &self,
        table: &TableSpec,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        let spec = table.clone();
        Box::pin(async move {
            let mut state = self.inner.state.write().await;
            if !state.keyspaces.contains_key(&spec.table.keyspace) {
                return Err(PluginError::new(format!(
                    "keyspace '{}' does not exist",
                    spec.table.keyspace
                )));
            }
            state
                .tables
                .entry(spec.table.clone())
                .or_insert_with(|| Table { spec, rows: BTreeMap::new() });
            Ok(())
        })
    }

    fn upsert(
        &self,
        table: &TableSpec,
        rows: &[UserRecord],
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        let id_type = table.id_type();
        let table = table.table.clone();
        let rows = rows.to_vec();
        Box::pin(async move {
            let mut state = self.inner.state.write().await;
            let target = state
                .tables
                .get_mut(&table)
                .ok_or_else(|| PluginError::new(format!("table '{table}' does not exist")))?;
            // Как Cassandra при bind'е: тип id должен совпадать с колонкой.
            let column = target.spec.id_type();
            if column != id_type {
                return Err(PluginError::new(format!(
                    "table '{table}': id column is {column}, write binds {id_type}"
                )));
            }
            for row in rows {
                target.rows.insert(row.id.clone(), row);
            }
            Ok(())
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async {
            // Сессии, открытые не через connect(), не считаются.
            let _ = self.inner.open_sessions.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            });
            Ok(())
        })
    }
}

impl StoreConnector for MemoryStore {
    fn describe(&self) -> String {
        "memory".into()
    }

    fn connect(&self) -> Pin<Box<dyn Future<Output = Result<Arc<dyn ColumnStore>, PluginError>> + Send + '_>> {
        Box::pin(async {
            self.inner.open_sessions.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(self.clone()) as Arc<dyn ColumnStore>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_api::IdType;

    fn user(id: &str, first_name: &str) -> UserRecord {
        UserRecord {
            id: id.into(),
            first_name: first_name.into(),
            last_name: "Lee".into(),
            gender: "f".into(),
            address: "1 Main St".into(),
            post_code: "00001".into(),
            email: "a@x.com".into(),
            username: "ann".into(),
            dob: None,
            registered_date: "2024-01-01".into(),
            phone: "000".into(),
            picture: "http://x/p.png".into(),
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let store = MemoryStore::new();
        let table = TableRef::new("ks", "users");
        store.create_keyspace(&KeyspaceSpec::simple("ks", 1)).await.unwrap();
        let spec = TableSpec::users(table.clone(), IdType::Text);
        store.create_table(&spec).await.unwrap();

        store.upsert(&spec, &[user("u1", "Ann"), user("u2", "Bob")]).await.unwrap();
        store.upsert(&spec, &[user("u1", "Anna")]).await.unwrap();

        let rows = store.rows(&table).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(store.row(&table, "u1").await.unwrap().first_name, "Anna");
    }

    #[tokio::test]
    async fn write_with_wrong_id_type_fails() {
        let store = MemoryStore::new();
        let table = TableRef::new("ks", "users");
        store.create_keyspace(&KeyspaceSpec::simple("ks", 1)).await.unwrap();
        store.create_table(&TableSpec::users(table.clone(), IdType::Uuid)).await.unwrap();

        let text = TableSpec::users(table.clone(), IdType::Text);
        let err = store.upsert(&text, &[user("u1", "Ann")]).await.unwrap_err();
        assert!(err.message().contains("id column is uuid"), "{err}");
        assert!(store.rows(&table).await.is_empty());
    }

    #[tokio::test]
    async fn keyspace_definition_is_not_replaced() {
        let store = MemoryStore::new();
        store.create_keyspace(&KeyspaceSpec::simple("ks", 1)).await.unwrap();
        store.create_keyspace(&KeyspaceSpec::simple("ks", 3)).await.unwrap();
        assert_eq!(store.keyspace("ks").await.unwrap(), KeyspaceSpec::simple("ks", 1));
    }

    #[tokio::test]
    async fn upsert_into_missing_table_fails() {
        let store = MemoryStore::new();
        let err = store.upsert(&TableSpec::users(TableRef::new("ks", "nope"), IdType::Text), &[user("u1", "Ann")]).await.unwrap_err();
        assert!(err.message().contains("ks.nope"));
    }

    #[tokio::test]
    async fn sessions_are_counted() {
        let store = MemoryStore::new();
        let session = store.connect().await.unwrap();
        assert_eq!(store.open_sessions(), 1);
        session.close().await.unwrap();
        assert_eq!(store.open_sessions(), 0);
    }
}
