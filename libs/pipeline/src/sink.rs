use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use stream_api::{ColumnStore, RawRecord, SourcePositions, TableSpec, UserRecord};

use crate::checkpoint::CheckpointStore;
use crate::decoder::Decoder;
use crate::PipelineError;

/// Счётчики sink'а за время работы.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Сообщений получено от source.
    pub received: u64,
    /// Строк записано (после схлопывания дубликатов внутри batch'а).
    pub written: u64,
    /// Сообщений отброшено decoder'ом.
    pub dropped: u64,
    pub batches: u64,
}

/// Параметры batch'инга.
#[derive(Debug, Clone, Copy)]
pub struct SinkSettings {
    pub batch_size: usize,
    pub linger: Duration,
}

// ═══════════════════════════════════════════════════════════════
//  Sink task: channel → decode → batch → upsert → checkpoint
// ═══════════════════════════════════════════════════════════════

struct Batch {
    rows: Vec<UserRecord>,
    positions: SourcePositions,
}

impl Batch {
    fn new(topic: &str) -> Self {
        Self { rows: Vec::new(), positions: SourcePositions::new(topic) }
    }

    fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.positions.is_empty()
    }
}

/// Запустить sink task.
///
/// Каждое сообщение декодируется; неудачные отбрасываются с warn, но их
/// позиции всё равно попадают в checkpoint. Batch пишется при достижении
/// `batch_size` или по истечении `linger`. Checkpoint продвигается только
/// после успешного upsert'а всего batch'а.
///
/// Ошибка записи или checkpoint'а завершает task с ошибкой. При отмене
/// токена или закрытии канала накопленный batch дописывается.
pub fn spawn_sink_task(
    store: Arc<dyn ColumnStore>,
    table: TableSpec,
    decoder: Decoder,
    mut checkpoint: CheckpointStore,
    mut rx: mpsc::Receiver<RawRecord>,
    settings: SinkSettings,
    token: CancellationToken,
) -> JoinHandle<Result<SinkStats, PipelineError>> {
    tokio::spawn(async move {
        let topic = checkpoint.positions().topic.clone();
        let mut stats = SinkStats::default();
        let mut batch = Batch::new(&topic);

        let mut ticker = tokio::time::interval(settings.linger);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                next = rx.recv() => {
                    let Some(raw) = next else { break };
                    stats.received += 1;
                    batch.positions.advance(raw.partition, raw.offset);
                    match decoder.decode(&raw) {
                        Ok(row) => batch.rows.push(row),
                        Err(e) => {
                            stats.dropped += 1;
                            tracing::warn!(
                                table = %table.table,
                                partition = raw.partition,
                                offset = raw.offset,
                                ts_ms = ?raw.ts_ms,
                                error = ?e,
                                "bad record, skipping"
                            );
                        }
                    }
                    if batch.rows.len() >= settings.batch_size {
                        flush(&*store, &table, &mut checkpoint, &mut batch, &mut stats).await?;
                    }
                }
                _ = ticker.tick() => {
                    flush(&*store, &table, &mut checkpoint, &mut batch, &mut stats).await?;
                }
                _ = token.cancelled() => break,
            }
        }

        flush(&*store, &table, &mut checkpoint, &mut batch, &mut stats).await?;
        tracing::info!(
            table = %table.table,
            received = stats.received,
            written = stats.written,
            dropped = stats.dropped,
            batches = stats.batches,
            "sink finished"
        );
        Ok(stats)
    })
}

async fn flush(
    store: &dyn ColumnStore,
    table: &TableSpec,
    checkpoint: &mut CheckpointStore,
    batch: &mut Batch,
    stats: &mut SinkStats,
) -> Result<(), PipelineError> {
    if batch.is_empty() {
        return Ok(());
    }

    let mut done = Batch::new(&batch.positions.topic);
    std::mem::swap(batch, &mut done);

    if !done.rows.is_empty() {
        let rows = last_write_wins(done.rows);
        store
            .upsert(table, &rows)
            .await
            .map_err(|e| PipelineError::Write { table: table.table.to_string(), source: e })?;
        stats.written += rows.len() as u64;
        stats.batches += 1;
        tracing::debug!(table = %table.table, rows = rows.len(), "batch written");
    }

    checkpoint.commit(&done.positions).map_err(PipelineError::Checkpoint)?;
    Ok(())
}

/// Схлопнуть строки с одинаковым `id`: остаётся последняя, порядок
/// первых вхождений сохраняется.
fn last_write_wins(rows: Vec<UserRecord>) -> Vec<UserRecord> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(rows.len());
    let mut out: Vec<UserRecord> = Vec::with_capacity(rows.len());
    for row in rows {
        match index.get(&row.id) {
            Some(&i) => out[i] = row,
            None => {
                index.insert(row.id.clone(), out.len());
                out.push(row);
            }
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════
//  Single-row upsert
// ═══════════════════════════════════════════════════════════════

/// Прямая запись одной строки, вне streaming sink'а.
///
/// Ошибка логируется и не пробрасывается: возвращается `false`.
pub async fn upsert_one(store: &dyn ColumnStore, table: &TableSpec, row: &UserRecord) -> bool {
    tracing::info!(table = %table.table, id = %row.id, "inserting data");
    match store.upsert(table, std::slice::from_ref(row)).await {
        Ok(()) => {
            tracing::info!(table = %table.table, "data inserted for {} {}", row.first_name, row.last_name);
            true
        }
        Err(e) => {
            tracing::error!(table = %table.table, id = %row.id, error = ?e, "couldn't insert data");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, name: &str) -> UserRecord {
        UserRecord {
            id: id.into(),
            first_name: name.into(),
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

    #[test]
    fn duplicate_ids_keep_last_value() {
        let rows = vec![user("a", "1"), user("b", "2"), user("a", "3")];
        let out = last_write_wins(rows);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, "a");
        assert_eq!(out[0].first_name, "3");
        assert_eq!(out[1].id, "b");
    }
}
