use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use stream_api::{PluginError, SourcePositions, now_ms};

const CHECKPOINT_FILE: &str = "offsets.json";
const CHECKPOINT_VERSION: u32 = 1;

/// Файл прогресса на диске.
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    version: u32,
    updated_at_ms: i64,
    positions: SourcePositions,
}

/// Durable прогресс чтения одного topic'а.
///
/// `commit` пишет во временный файл, делает fsync и атомарно
/// переименовывает его поверх `offsets.json`: после рестарта читается
/// либо старая, либо новая версия, но не обрезанная.
#[derive(Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
    positions: SourcePositions,
}

impl CheckpointStore {
    /// Открыть (или создать) checkpoint в `dir` для `topic`.
    ///
    /// Checkpoint, записанный для другого topic'а, считается ошибкой конфигурации.
    pub fn open(dir: &Path, topic: &str) -> Result<Self, PluginError> {
        fs::create_dir_all(dir)
            .map_err(|e| PluginError::io(format!("create {}: {e}", dir.display())))?;

        let path = dir.join(CHECKPOINT_FILE);
        let positions = match fs::read(&path) {
            Ok(bytes) => {
                let file: CheckpointFile = serde_json::from_slice(&bytes)
                    .map_err(|e| PluginError::format_err(format!("parse {}: {e}", path.display())))?;
                if file.version != CHECKPOINT_VERSION {
                    return Err(PluginError::config(format!(
                        "{}: unsupported checkpoint version {}",
                        path.display(),
                        file.version
                    )));
                }
                if file.positions.topic != topic {
                    return Err(PluginError::config(format!(
                        "{} belongs to topic '{}', configured topic is '{topic}'",
                        path.display(),
                        file.positions.topic
                    )));
                }
                file.positions
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SourcePositions::new(topic),
            Err(e) => return Err(PluginError::io(format!("read {}: {e}", path.display()))),
        };

        Ok(Self { dir: dir.to_path_buf(), positions })
    }

    pub fn positions(&self) -> &SourcePositions {
        &self.positions
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Зафиксировать позиции (слить с уже сохранёнными и записать на диск).
    pub fn commit(&mut self, processed: &SourcePositions) -> Result<(), PluginError> {
        let mut next = self.positions.clone();
        next.merge(processed);
        if next == self.positions {
            return Ok(());
        }

        let file = CheckpointFile {
            version: CHECKPOINT_VERSION,
            updated_at_ms: now_ms(),
            positions: next,
        };
        let bytes = serde_json::to_vec_pretty(&file)?;

        let path = self.dir.join(CHECKPOINT_FILE);
        let tmp = self.dir.join(format!("{CHECKPOINT_FILE}.tmp"));
        {
            let mut f = fs::File::create(&tmp)
                .map_err(|e| PluginError::io(format!("create {}: {e}", tmp.display())))?;
            f.write_all(&bytes)
                .map_err(|e| PluginError::io(format!("write {}: {e}", tmp.display())))?;
            f.sync_all()
                .map_err(|e| PluginError::io(format!("sync {}: {e}", tmp.display())))?;
        }
        fs::rename(&tmp, &path)
            .map_err(|e| PluginError::io(format!("rename {}: {e}", path.display())))?;

        self.positions = file.positions;
        tracing::debug!(checkpoint = %path.display(), positions = ?self.positions.next, "checkpoint committed");
        Ok(())
    }
}
