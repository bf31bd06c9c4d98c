use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use pipeline::config::{CheckpointConfig, SchemaConfig, SinkConfig};
use pipeline::{PipelineSettings, SinkSettings};
use source_kafka::KafkaSourceConfig;
use storage_cassandra::{CassandraConfig, CassandraConnector};
use storage_memory::MemoryStore;
use stream_api::StoreConnector;

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "user-stream", about = "Kafka → Cassandra поток пользовательских событий")]
pub struct Cli {
    /// Путь к TOML конфиг файлу. Без него используются значения по умолчанию.
    #[arg(long, global = true, env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Запустить pipeline (до Ctrl+C)
    Run,
    /// Только создать keyspace и таблицу
    InitSchema,
    /// Записать одну строку напрямую
    Insert(InsertArgs),
}

#[derive(Args, Clone, Debug)]
pub struct InsertArgs {
    /// JSON объект в формате сообщения topic'а
    #[arg(long)]
    pub json: String,
}

// ---- TOML Config ----

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Cassandra,
    /// In-process store, данные живут до выхода процесса.
    Memory,
}

#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_contact_points")]
    pub contact_points: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let cassandra = CassandraConfig::default();
        Self {
            backend: StoreBackend::default(),
            contact_points: cassandra.contact_points,
            username: None,
            password: None,
            connect_timeout_ms: cassandra.connect_timeout_ms,
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("backend", &self.backend)
            .field("contact_points", &self.contact_points)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}

fn default_contact_points() -> Vec<String> {
    CassandraConfig::default().contact_points
}
fn default_connect_timeout_ms() -> u64 {
    CassandraConfig::default().connect_timeout_ms
}

impl StoreConfig {
    fn cassandra(&self) -> CassandraConfig {
        CassandraConfig {
            contact_points: self.contact_points.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            connect_timeout_ms: self.connect_timeout_ms,
        }
    }

    pub fn connector(&self) -> Arc<dyn StoreConnector> {
        match self.backend {
            StoreBackend::Cassandra => Arc::new(CassandraConnector::new(self.cassandra())),
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default)]
    pub source: KafkaSourceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

impl ServerConfig {
    /// Прочитать и проверить конфиг. `None`: значения по умолчанию.
    pub fn load(path: Option<&Path>) -> Result<Self, ServerError> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| ServerError::Config {
                    context: "read",
                    detail: format!("'{}': {e}", path.display()),
                })?;
                let config = Self::parse(&content).map_err(|detail| ServerError::Config {
                    context: "parse",
                    detail: format!("'{}': {detail}", path.display()),
                })?;
                tracing::info!(config = %path.display(), "loaded config");
                config
            }
            None => {
                tracing::info!("no config file given, using defaults");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        let invalid = |detail: String| ServerError::Config { context: "validate", detail };
        self.source.validate().map_err(invalid)?;
        if self.store.backend == StoreBackend::Cassandra {
            self.store.cassandra().validate().map_err(invalid)?;
        }
        self.schema.validate().map_err(invalid)?;
        self.sink.validate().map_err(invalid)?;
        self.checkpoint.validate().map_err(invalid)?;
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            keyspace: self.schema.keyspace_spec(),
            table: self.schema.table_spec(),
            sink: SinkSettings {
                batch_size: self.sink.batch_size,
                linger: self.sink.linger(),
            },
            buffer: self.sink.buffer,
            checkpoint_dir: self.checkpoint.location.clone(),
        }
    }
}
