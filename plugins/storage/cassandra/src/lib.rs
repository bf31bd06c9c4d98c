use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scylla::prepared_statement::PreparedStatement;
use scylla::{Session, SessionBuilder};

use stream_api::{
    ColumnStore, ColumnType, KeyspaceSpec, PluginError, Replication, StoreConnector, TableRef,
    TableSpec, UserRecord,
};

// ═══════════════════════════════════════════════════════════════
//  Config
// ═══════════════════════════════════════════════════════════════

#[derive(Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CassandraConfig {
    /// `host:port` узлов кластера.
    #[serde(default = "default_contact_points")]
    pub contact_points: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for CassandraConfig {
    fn default() -> Self {
        Self {
            contact_points: default_contact_points(),
            username: None,
            password: None,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl std::fmt::Debug for CassandraConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CassandraConfig")
            .field("contact_points", &self.contact_points)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}

impl CassandraConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.contact_points.is_empty() {
            return Err("store: contact_points must not be empty".into());
        }
        if self.username.is_some() != self.password.is_some() {
            return Err("store: username and password must be set together".into());
        }
        Ok(())
    }
}

fn default_contact_points() -> Vec<String> {
    vec!["localhost:9042".into()]
}
fn default_connect_timeout_ms() -> u64 {
    5000
}

// ═══════════════════════════════════════════════════════════════
//  CQL rendering
// ═══════════════════════════════════════════════════════════════

pub fn create_keyspace_cql(keyspace: &KeyspaceSpec) -> String {
    let replication = match keyspace.replication {
        Replication::Simple { factor } => {
            format!("{{'class': 'SimpleStrategy', 'replication_factor': '{factor}'}}")
        }
    };
    format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {replication}",
        keyspace.name
    )
}

pub fn create_table_cql(table: &TableSpec) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            if c.primary_key {
                format!("{} {} PRIMARY KEY", c.name, c.column_type)
            } else {
                format!("{} {}", c.name, c.column_type)
            }
        })
        .collect();
    format!("CREATE TABLE IF NOT EXISTS {} ({})", table.table, columns.join(", "))
}

/// Значение `id`, готовое к bind'у в колонку своего типа.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdValue<'a> {
    Text(&'a str),
    Uuid(uuid::Uuid),
}

pub fn id_value(id_type: ColumnType, id: &str) -> Result<IdValue<'_>, PluginError> {
    match id_type {
        ColumnType::Text => Ok(IdValue::Text(id)),
        ColumnType::Uuid => uuid::Uuid::parse_str(id)
            .map(IdValue::Uuid)
            .map_err(|e| PluginError::format_err(format!("id '{id}' is not a uuid: {e}"))),
    }
}

pub fn insert_cql(table: &TableRef) -> String {
    let mut columns = vec!["id"];
    columns.extend(UserRecord::TEXT_COLUMNS);
    let placeholders = vec!["?"; columns.len()];
    format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    )
}

// ═══════════════════════════════════════════════════════════════
//  CassandraStore
// ═══════════════════════════════════════════════════════════════

/// Сессия Cassandra/ScyllaDB.
///
/// `close()` отпускает сессию; соединения закрываются, когда завершится
/// последняя выполняющаяся операция.
pub struct CassandraStore {
    session: Mutex<Option<Arc<Session>>>,
    inserts: tokio::sync::Mutex<HashMap<TableRef, PreparedStatement>>,
}

impl CassandraStore {
    fn new(session: Session) -> Self {
        Self {
            session: Mutex::new(Some(Arc::new(session))),
            inserts: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    fn session(&self) -> Result<Arc<Session>, PluginError> {
        self.session
            .lock()
            .map_err(|_| PluginError::new("session lock poisoned"))?
            .clone()
            .ok_or_else(|| PluginError::new("session closed"))
    }

    async fn exec_ddl(&self, cql: &str) -> Result<(), PluginError> {
        let session = self.session()?;
        tracing::debug!(%cql, "executing ddl");
        session
            .query(cql, ())
            .await
            .map_err(|e| PluginError::io(format!("cql: {e}")))?;
        Ok(())
    }

    async fn prepared_insert(&self, session: &Session, table: &TableRef) -> Result<PreparedStatement, PluginError> {
        let mut cache = self.inserts.lock().await;
        if let Some(stmt) = cache.get(table) {
            return Ok(stmt.clone());
        }
        let stmt = session
            .prepare(insert_cql(table))
            .await
            .map_err(|e| PluginError::io(format!("prepare insert into {table}: {e}")))?;
        cache.insert(table.clone(), stmt.clone());
        Ok(stmt)
    }
}

impl ColumnStore for CassandraStore {
    fn create_keyspace(
        &self,
        keyspace: &KeyspaceSpec,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        let cql = create_keyspace_cql(keyspace);
        Box::pin(async move { self.exec_ddl(&cql).await })
    }

    fn create_table(
        &self,
        table: &TableSpec,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        let cql = create_table_cql(table);
        Box::pin(async move { self.exec_ddl(&cql).await })
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
            if rows.is_empty() {
                return Ok(());
            }
            let session = self.session()?;
            let stmt = self.prepared_insert(&session, &table).await?;

            // Последовательно: при повторе id внутри batch'а побеждает последняя строка.
            for row in &rows {
                let v = row.text_values();
                let result = match id_value(id_type, &row.id)? {
                    IdValue::Uuid(id) => {
                        session
                            .execute(&stmt, (id, v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7], v[8], v[9], v[10]))
                            .await
                    }
                    IdValue::Text(id) => {
                        session
                            .execute(&stmt, (id, v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7], v[8], v[9], v[10]))
                            .await
                    }
                };
                result.map_err(|e| PluginError::io(format!("insert into {table} (id {}): {e}", row.id)))?;
            }
            Ok(())
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async {
            let session = self
                .session
                .lock()
                .map_err(|_| PluginError::new("session lock poisoned"))?
                .take();
            if session.is_some() {
                tracing::info!("cassandra session released");
            }
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Connector
// ═══════════════════════════════════════════════════════════════

pub struct CassandraConnector {
    config: CassandraConfig,
}

impl CassandraConnector {
    pub fn new(config: CassandraConfig) -> Self {
        Self { config }
    }
}

impl StoreConnector for CassandraConnector {
    fn describe(&self) -> String {
        format!("cassandra [{}]", self.config.contact_points.join(","))
    }

    fn connect(&self) -> Pin<Box<dyn Future<Output = Result<Arc<dyn ColumnStore>, PluginError>> + Send + '_>> {
        Box::pin(async move {
            let mut builder = SessionBuilder::new()
                .known_nodes(&self.config.contact_points)
                .connection_timeout(Duration::from_millis(self.config.connect_timeout_ms));
            if let (Some(user), Some(password)) = (&self.config.username, &self.config.password) {
                builder = builder.user(user, password);
            }
            let session = builder
                .build()
                .await
                .map_err(|e| PluginError::io(format!("cassandra connect ({}): {e}", self.config.contact_points.join(","))))?;
            Ok(Arc::new(CassandraStore::new(session)) as Arc<dyn ColumnStore>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_api::IdType;

    #[test]
    fn keyspace_statement() {
        let cql = create_keyspace_cql(&KeyspaceSpec::simple("spark_streams", 1));
        assert_eq!(
            cql,
            "CREATE KEYSPACE IF NOT EXISTS spark_streams WITH replication = \
             {'class': 'SimpleStrategy', 'replication_factor': '1'}"
        );
    }

    #[test]
    fn table_statement_lists_all_columns() {
        let spec = TableSpec::users(TableRef::new("spark_streams", "created_users"), IdType::Uuid);
        let cql = create_table_cql(&spec);
        assert!(cql.starts_with("CREATE TABLE IF NOT EXISTS spark_streams.created_users (id uuid PRIMARY KEY, "));
        assert!(cql.contains("first_name text"));
        assert!(cql.contains("dob text"));
        assert!(cql.ends_with("picture text)"));
        assert_eq!(cql.matches(" text").count(), 11);
    }

    #[test]
    fn insert_statement_has_twelve_placeholders() {
        let cql = insert_cql(&TableRef::new("spark_streams", "created_users"));
        assert!(cql.starts_with("INSERT INTO spark_streams.created_users (id, first_name, "));
        assert_eq!(cql.matches('?').count(), 12);
    }

    #[test]
    fn id_is_bound_by_table_column_type() {
        let uuid_table = TableSpec::users(TableRef::new("spark_streams", "created_users"), IdType::Uuid);
        let id = "67E55044-10B1-426F-9247-BB680E5FE0C8";
        assert_eq!(
            id_value(uuid_table.id_type(), id).unwrap(),
            IdValue::Uuid(uuid::Uuid::parse_str(id).unwrap())
        );
        let err = id_value(uuid_table.id_type(), "u1").unwrap_err();
        assert_eq!(err.kind(), stream_api::ErrorKind::Format);

        let text_table = TableSpec::users(TableRef::new("spark_streams", "created_users"), IdType::Text);
        assert_eq!(id_value(text_table.id_type(), "u1").unwrap(), IdValue::Text("u1"));
    }

    #[test]
    fn config_defaults_and_validation() {
        let cfg: CassandraConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.contact_points, vec!["localhost:9042".to_string()]);
        assert!(cfg.validate().is_ok());

        let cfg: CassandraConfig = serde_json::from_str(r#"{"username":"u"}"#).unwrap();
        assert!(cfg.validate().is_err());
    }
}
