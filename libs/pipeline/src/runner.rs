use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use stream_api::{
    ColumnStore, KeyspaceSpec, PluginError, RecordSource, RecordStream, StoreConnector, TableSpec,
};

use crate::checkpoint::CheckpointStore;
use crate::decoder::Decoder;
use crate::registrar::register_schema;
use crate::sink::{SinkSettings, SinkStats, spawn_sink_task, upsert_one};
use crate::source::spawn_source_task;
use crate::PipelineError;

// ═══════════════════════════════════════════════════════════════
//  State machine
// ═══════════════════════════════════════════════════════════════

/// Состояние pipeline'а. Переходы только вперёд.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    NotStarted,
    /// Checkpoint store открыт.
    RuntimeReady,
    /// Подписка на topic открыта.
    SourceConnected,
    /// Сессия column store открыта, keyspace и таблица созданы.
    SchemaReady,
    Streaming,
    Terminated,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineState::NotStarted => "not_started",
            PipelineState::RuntimeReady => "runtime_ready",
            PipelineState::SourceConnected => "source_connected",
            PipelineState::SchemaReady => "schema_ready",
            PipelineState::Streaming => "streaming",
            PipelineState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Стартовый шаг, на котором может упасть запуск.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Checkpoint,
    Source,
    Store,
    Schema,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Checkpoint => "checkpoint store",
            Stage::Source => "source connector",
            Stage::Store => "store connection",
            Stage::Schema => "schema registration",
        };
        f.write_str(s)
    }
}

fn startup_error(stage: Stage, source: PluginError) -> PipelineError {
    tracing::error!(%stage, error = ?source, "startup failed");
    PipelineError::Startup { stage, source }
}

// ═══════════════════════════════════════════════════════════════
//  Pipeline
// ═══════════════════════════════════════════════════════════════

/// Всё, что pipeline'у нужно знать помимо source и store.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub keyspace: KeyspaceSpec,
    pub table: TableSpec,
    pub sink: SinkSettings,
    pub buffer: usize,
    pub checkpoint_dir: PathBuf,
}

/// Source → Decoder → Sink, с созданием схемы на старте.
pub struct Pipeline {
    settings: PipelineSettings,
    source: Arc<dyn RecordSource>,
    store: Arc<dyn StoreConnector>,
    state: watch::Sender<PipelineState>,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        source: Arc<dyn RecordSource>,
        store: Arc<dyn StoreConnector>,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::NotStarted);
        Self { settings, source, store, state }
    }

    /// Наблюдать за состоянием.
    pub fn state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    fn transition(&self, next: PipelineState) {
        let prev = *self.state.borrow();
        self.state.send_replace(next);
        tracing::info!(from = %prev, to = %next, "pipeline state");
    }

    /// Запустить pipeline и ждать его завершения.
    ///
    /// Каждый стартовый шаг является gate. При ошибке следующие шаги не
    /// выполняются, уже открытые ресурсы закрываются. После старта
    /// работает до отмены `token`, исчерпания источника или фатальной
    /// ошибки записи.
    pub async fn run(&self, token: CancellationToken) -> Result<SinkStats, PipelineError> {
        let topic = self.source.topic().to_string();

        // --- 1. Checkpoint ---
        let checkpoint = CheckpointStore::open(&self.settings.checkpoint_dir, &topic)
            .map_err(|e| startup_error(Stage::Checkpoint, e))?;
        tracing::info!(
            checkpoint = %checkpoint.dir().display(),
            resume = ?checkpoint.positions().next,
            "checkpoint store opened"
        );
        self.transition(PipelineState::RuntimeReady);

        // --- 2. Source ---
        let resume = checkpoint.positions().clone();
        let stream = self
            .source
            .open(&resume)
            .await
            .map_err(|e| startup_error(Stage::Source, e))?;
        tracing::info!(%topic, "source connected");
        self.transition(PipelineState::SourceConnected);

        // --- 3. Store + schema ---
        let store = match self.store.connect().await {
            Ok(store) => store,
            Err(e) => {
                close_stream(stream).await;
                return Err(startup_error(Stage::Store, e));
            }
        };
        tracing::info!(store = %self.store.describe(), "store connected");

        if let Err(e) = register_schema(&*store, &self.settings.keyspace, &self.settings.table).await {
            close_stream(stream).await;
            close_store(&*store).await;
            return Err(startup_error(Stage::Schema, e));
        }
        self.transition(PipelineState::SchemaReady);

        // --- 4. Streaming ---
        let run_token = token.child_token();
        let (tx, rx) = mpsc::channel(self.settings.buffer);
        let table = self.settings.table.clone();

        let source_handle = spawn_source_task(stream, resume, tx, run_token.clone());
        let sink_handle = spawn_sink_task(
            store.clone(),
            table.clone(),
            Decoder::new(table.id_type()),
            checkpoint,
            rx,
            self.settings.sink,
            run_token.clone(),
        );
        self.transition(PipelineState::Streaming);
        tracing::info!(%topic, table = %table.table, "streaming");

        let result = match sink_handle.await {
            Ok(result) => result,
            Err(e) => Err(PipelineError::Task(e)),
        };
        if let Err(e) = &result {
            tracing::error!(error = %e, "sink failed, stopping pipeline");
        }

        // Sink остановлен: остановить source и освободить подписку.
        run_token.cancel();
        match source_handle.await {
            Ok(stream) => close_stream(stream).await,
            Err(e) => tracing::error!(error = %e, "source task failed"),
        }
        close_store(&*store).await;

        self.transition(PipelineState::Terminated);
        result
    }
}

async fn close_stream(mut stream: Box<dyn RecordStream>) {
    if let Err(e) = stream.close().await {
        tracing::warn!(error = ?e, "source close error");
    }
}

async fn close_store(store: &dyn ColumnStore) {
    if let Err(e) = store.close().await {
        tracing::warn!(error = ?e, "store close error");
    }
}

// ═══════════════════════════════════════════════════════════════
//  One-shot operations
// ═══════════════════════════════════════════════════════════════

/// Только создать схему: connect → keyspace + table → close.
pub async fn provision_schema(
    connector: &dyn StoreConnector,
    keyspace: &KeyspaceSpec,
    table: &TableSpec,
) -> Result<(), PipelineError> {
    let store = connector
        .connect()
        .await
        .map_err(|e| startup_error(Stage::Store, e))?;
    let result = register_schema(&*store, keyspace, table)
        .await
        .map_err(|e| startup_error(Stage::Schema, e));
    close_store(&*store).await;
    result
}

/// Декодировать один payload и записать его напрямую.
///
/// Ошибка декодирования и подключения: `Err`; ошибка самой записи
/// только логируется (`Ok(false)`).
pub async fn insert_payload(
    connector: &dyn StoreConnector,
    table: &TableSpec,
    payload: &[u8],
) -> Result<bool, PipelineError> {
    let row = Decoder::new(table.id_type())
        .decode_payload(payload)
        .map_err(PipelineError::Decode)?;
    let store = connector
        .connect()
        .await
        .map_err(|e| startup_error(Stage::Store, e))?;
    let inserted = upsert_one(&*store, table, &row).await;
    close_store(&*store).await;
    Ok(inserted)
}
