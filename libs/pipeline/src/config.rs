use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use stream_api::{IdType, KeyspaceSpec, TableRef, TableSpec, validate_identifier};

// ═══════════════════════════════════════════════════════════════
//  Schema Config
// ═══════════════════════════════════════════════════════════════

/// Keyspace и таблица назначения. Одна секция питает и создание
/// схемы, и запись, поэтому имена всегда совпадают.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    #[serde(default = "default_keyspace")]
    pub keyspace: String,
    #[serde(default = "default_table")]
    pub table: String,
    /// Replication factor для `SimpleStrategy`.
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u32,
    /// Тип колонки `id`: `text` или `uuid`.
    #[serde(default)]
    pub id_type: IdType,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            keyspace: default_keyspace(),
            table: default_table(),
            replication_factor: default_replication_factor(),
            id_type: IdType::default(),
        }
    }
}

impl SchemaConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_identifier("keyspace", &self.keyspace).map_err(|e| e.to_string())?;
        validate_identifier("table", &self.table).map_err(|e| e.to_string())?;
        if self.replication_factor == 0 {
            return Err("schema: replication_factor must be >= 1".into());
        }
        Ok(())
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef::new(&self.keyspace, &self.table)
    }

    pub fn keyspace_spec(&self) -> KeyspaceSpec {
        KeyspaceSpec::simple(&self.keyspace, self.replication_factor)
    }

    pub fn table_spec(&self) -> TableSpec {
        TableSpec::users(self.table_ref(), self.id_type)
    }
}

fn default_keyspace() -> String {
    "spark_streams".into()
}
fn default_table() -> String {
    "created_users".into()
}
fn default_replication_factor() -> u32 {
    1
}

// ═══════════════════════════════════════════════════════════════
//  Sink Config
// ═══════════════════════════════════════════════════════════════

/// Параметры записи в column store.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SinkConfig {
    /// Максимум строк в одном upsert batch'е.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Максимальное время ожидания неполного batch'а.
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u64,
    /// Размер буфера канала source → sink.
    #[serde(default = "default_sink_buffer")]
    pub buffer: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            linger_ms: default_linger_ms(),
            buffer: default_sink_buffer(),
        }
    }
}

impl SinkConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("sink: batch_size must be >= 1".into());
        }
        if self.linger_ms == 0 {
            return Err("sink: linger_ms must be >= 1".into());
        }
        if self.buffer == 0 {
            return Err("sink: buffer must be >= 1".into());
        }
        Ok(())
    }

    pub fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }
}

fn default_batch_size() -> usize {
    500
}
fn default_linger_ms() -> u64 {
    200
}
fn default_sink_buffer() -> usize {
    8192
}

// ═══════════════════════════════════════════════════════════════
//  Checkpoint Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointConfig {
    /// Директория, где хранится прогресс чтения.
    #[serde(default = "default_checkpoint_location")]
    pub location: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self { location: default_checkpoint_location() }
    }
}

impl CheckpointConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.location.as_os_str().is_empty() {
            return Err("checkpoint: location must not be empty".into());
        }
        Ok(())
    }
}

fn default_checkpoint_location() -> PathBuf {
    PathBuf::from("/tmp/checkpoints")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Doc {
        #[serde(default)]
        schema: SchemaConfig,
        #[serde(default)]
        sink: SinkConfig,
        #[serde(default)]
        checkpoint: CheckpointConfig,
    }

    #[test]
    fn empty_document_gives_defaults() {
        let doc: Doc = toml::from_str("").unwrap();
        assert_eq!(doc.schema.table_ref().to_string(), "spark_streams.created_users");
        assert_eq!(doc.schema.replication_factor, 1);
        assert_eq!(doc.schema.id_type, IdType::Text);
        assert_eq!(doc.sink.batch_size, 500);
        assert_eq!(doc.checkpoint.location, PathBuf::from("/tmp/checkpoints"));
        assert!(doc.schema.validate().is_ok());
        assert!(doc.sink.validate().is_ok());
        assert!(doc.checkpoint.validate().is_ok());
    }

    #[test]
    fn overrides_and_validation() {
        let doc: Doc = toml::from_str(
            r#"
            [schema]
            keyspace = "users"
            table = "bad-name"
            id_type = "uuid"

            [sink]
            batch_size = 0
            "#,
        )
        .unwrap();
        assert_eq!(doc.schema.id_type, IdType::Uuid);
        assert!(doc.schema.validate().is_err());
        assert!(doc.sink.validate().is_err());
    }

    #[test]
    fn unknown_keys_rejected() {
        let res: Result<Doc, _> = toml::from_str("[sink]\nbatch = 3\n");
        assert!(res.is_err());
    }
}
