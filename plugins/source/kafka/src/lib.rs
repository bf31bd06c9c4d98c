use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::{ClientConfig, Message, Offset, TopicPartitionList};

use stream_api::{PluginError, RawRecord, RecordSource, RecordStream, SourcePositions};

// ═══════════════════════════════════════════════════════════════
//  Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartingOffsets {
    #[default]
    Earliest,
    Latest,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KafkaSourceConfig {
    #[serde(default = "default_brokers")]
    pub brokers: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Откуда читать partitions, для которых нет checkpoint'а.
    #[serde(default)]
    pub starting_offsets: StartingOffsets,
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
    #[serde(default = "default_metadata_timeout_ms")]
    pub metadata_timeout_ms: u64,
    /// Дополнительные свойства librdkafka, передаются как есть.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Default for KafkaSourceConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            topic: default_topic(),
            group_id: default_group_id(),
            client_id: default_client_id(),
            starting_offsets: StartingOffsets::default(),
            session_timeout_ms: default_session_timeout_ms(),
            metadata_timeout_ms: default_metadata_timeout_ms(),
            properties: BTreeMap::new(),
        }
    }
}

impl KafkaSourceConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.brokers.trim().is_empty() {
            return Err("source: brokers must not be empty".into());
        }
        if self.topic.trim().is_empty() {
            return Err("source: topic must not be empty".into());
        }
        if self.group_id.trim().is_empty() {
            return Err("source: group_id must not be empty".into());
        }
        for key in ["enable.auto.commit", "bootstrap.servers", "group.id"] {
            if self.properties.contains_key(key) {
                return Err(format!("source: property '{key}' is managed by the source and cannot be overridden"));
            }
        }
        Ok(())
    }

    fn client_config(&self) -> ClientConfig {
        let reset = match self.starting_offsets {
            StartingOffsets::Earliest => "earliest",
            StartingOffsets::Latest => "latest",
        };
        let mut cfg = ClientConfig::new();
        cfg.set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("client.id", &self.client_id)
            .set("enable.partition.eof", "false")
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", reset)
            .set("session.timeout.ms", self.session_timeout_ms.to_string());
        for (k, v) in &self.properties {
            cfg.set(k, v);
        }
        cfg
    }
}

fn default_brokers() -> String {
    "localhost:9092".into()
}
fn default_topic() -> String {
    "users_created".into()
}
fn default_group_id() -> String {
    "user-stream".into()
}
fn default_client_id() -> String {
    "user-stream".into()
}
fn default_session_timeout_ms() -> u64 {
    6000
}
fn default_metadata_timeout_ms() -> u64 {
    10_000
}

/// Стартовый offset каждой partition: checkpoint, если он есть, иначе `starting`.
pub fn assignment(
    partitions: &[i32],
    resume: &SourcePositions,
    starting: StartingOffsets,
) -> Vec<(i32, Offset)> {
    partitions
        .iter()
        .map(|&p| {
            let offset = match resume.next_offset(p) {
                Some(next) => Offset::Offset(next),
                None => match starting {
                    StartingOffsets::Earliest => Offset::Beginning,
                    StartingOffsets::Latest => Offset::End,
                },
            };
            (p, offset)
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════
//  KafkaSource
// ═══════════════════════════════════════════════════════════════

pub struct KafkaSource {
    config: KafkaSourceConfig,
}

impl KafkaSource {
    pub fn new(config: KafkaSourceConfig) -> Self {
        Self { config }
    }
}

/// Создание consumer'а и assign: блокирующие вызовы librdkafka.
fn connect_blocking(
    config: &KafkaSourceConfig,
    resume: &SourcePositions,
) -> Result<StreamConsumer, PluginError> {
    let consumer: StreamConsumer = config
        .client_config()
        .create()
        .map_err(|e| PluginError::config(format!("kafka consumer: {e}")))?;

    let metadata = consumer
        .fetch_metadata(
            Some(&config.topic),
            Duration::from_millis(config.metadata_timeout_ms),
        )
        .map_err(|e| PluginError::io(format!("kafka metadata ({}): {e}", config.brokers)))?;

    let partitions: Vec<i32> = metadata
        .topics()
        .iter()
        .filter(|t| t.name() == config.topic)
        .flat_map(|t| t.partitions().iter().map(|p| p.id()))
        .collect();
    if partitions.is_empty() {
        return Err(PluginError::io(format!(
            "topic '{}' has no partitions on {}",
            config.topic, config.brokers
        )));
    }

    let mut tpl = TopicPartitionList::new();
    for (partition, offset) in assignment(&partitions, resume, config.starting_offsets) {
        tpl.add_partition_offset(&config.topic, partition, offset)
            .map_err(|e| PluginError::config(format!("partition {partition}: {e}")))?;
    }
    consumer
        .assign(&tpl)
        .map_err(|e| PluginError::io(format!("kafka assign: {e}")))?;

    tracing::info!(
        topic = %config.topic,
        brokers = %config.brokers,
        partitions = partitions.len(),
        resumed = !resume.is_empty(),
        "kafka subscription opened"
    );
    Ok(consumer)
}

impl RecordSource for KafkaSource {
    fn topic(&self) -> &str {
        &self.config.topic
    }

    fn open(
        &self,
        resume: &SourcePositions,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn RecordStream>, PluginError>> + Send + '_>> {
        let config = self.config.clone();
        let resume = resume.clone();
        Box::pin(async move {
            let consumer = tokio::task::spawn_blocking(move || connect_blocking(&config, &resume))
                .await
                .map_err(|e| PluginError::new(format!("kafka connect task: {e}")))??;
            Ok(Box::new(KafkaStream { consumer: Some(consumer) }) as Box<dyn RecordStream>)
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  KafkaStream
// ═══════════════════════════════════════════════════════════════

pub struct KafkaStream {
    consumer: Option<StreamConsumer>,
}

impl RecordStream for KafkaStream {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<RawRecord, PluginError>>> + Send + '_>> {
        Box::pin(async move {
            let consumer = self.consumer.as_ref()?;
            let record = match consumer.recv().await {
                Ok(msg) => Ok(RawRecord {
                    topic: msg.topic().to_string(),
                    partition: msg.partition(),
                    offset: msg.offset(),
                    value: msg.payload().map(<[u8]>::to_vec),
                    ts_ms: msg.timestamp().to_millis(),
                }),
                Err(e) => Err(PluginError::io(format!("kafka recv: {e}"))),
            };
            Some(record)
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async move {
            if let Some(consumer) = self.consumer.take() {
                consumer
                    .unassign()
                    .map_err(|e| PluginError::io(format!("kafka unassign: {e}")))?;
                tracing::info!("kafka subscription closed");
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg: KafkaSourceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.brokers, "localhost:9092");
        assert_eq!(cfg.topic, "users_created");
        assert_eq!(cfg.starting_offsets, StartingOffsets::Earliest);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn managed_properties_rejected() {
        let mut cfg = KafkaSourceConfig::default();
        cfg.properties.insert("enable.auto.commit".into(), "true".into());
        assert!(cfg.validate().unwrap_err().contains("enable.auto.commit"));
    }

    #[test]
    fn client_config_disables_auto_commit() {
        let mut cfg = KafkaSourceConfig::default();
        cfg.properties.insert("fetch.min.bytes".into(), "1".into());
        let client = cfg.client_config();
        assert_eq!(client.get("enable.auto.commit"), Some("false"));
        assert_eq!(client.get("auto.offset.reset"), Some("earliest"));
        assert_eq!(client.get("fetch.min.bytes"), Some("1"));
    }

    #[test]
    fn assignment_prefers_checkpoint() {
        let mut resume = SourcePositions::new("users_created");
        resume.advance(1, 41);

        let earliest = assignment(&[0, 1], &resume, StartingOffsets::Earliest);
        assert_eq!(earliest, vec![(0, Offset::Beginning), (1, Offset::Offset(42))]);

        let latest = assignment(&[0, 1], &resume, StartingOffsets::Latest);
        assert_eq!(latest, vec![(0, Offset::End), (1, Offset::Offset(42))]);
    }
}
