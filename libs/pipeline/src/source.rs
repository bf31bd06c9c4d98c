use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use stream_api::{RawRecord, RecordStream, SourcePositions};

// ═══════════════════════════════════════════════════════════════
//  Source task: stream.recv() → channel → sink
// ═══════════════════════════════════════════════════════════════

/// Запустить source task: читает сообщения из подписки и передаёт их
/// sink'у через bounded канал (back-pressure).
///
/// Сообщения, уже покрытые `resume`, пропускаются. Ошибки broker'а
/// логируются, чтение продолжается. Task завершается по отмене токена,
/// при закрытии канала sink'ом или при исчерпании потока, и возвращает
/// подписку, чтобы хост мог её закрыть.
pub fn spawn_source_task(
    mut stream: Box<dyn RecordStream>,
    resume: SourcePositions,
    tx: mpsc::Sender<RawRecord>,
    token: CancellationToken,
) -> JoinHandle<Box<dyn RecordStream>> {
    tokio::spawn(async move {
        let topic = resume.topic.clone();
        let mut forwarded = 0u64;
        let mut skipped = 0u64;

        loop {
            tokio::select! {
                next = stream.recv() => {
                    match next {
                        Some(Ok(record)) => {
                            if resume.covers(record.partition, record.offset) {
                                skipped += 1;
                                continue;
                            }
                            tokio::select! {
                                sent = tx.send(record) => {
                                    if sent.is_err() {
                                        tracing::info!(%topic, "sink closed, stopping source");
                                        break;
                                    }
                                    forwarded += 1;
                                }
                                _ = token.cancelled() => break,
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(%topic, error = ?e, "source receive error");
                        }
                        None => {
                            tracing::info!(%topic, "source exhausted");
                            break;
                        }
                    }
                }
                _ = token.cancelled() => break,
            }
        }

        tracing::info!(%topic, forwarded, skipped, "source finished");
        stream
    })
}
