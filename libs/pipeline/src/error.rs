use stream_api::PluginError;

use crate::runner::Stage;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{stage}: {source}")]
    Startup { stage: Stage, source: PluginError },

    #[error("decode: {0}")]
    Decode(PluginError),

    #[error("write to {table}: {source}")]
    Write { table: String, source: PluginError },

    #[error("checkpoint: {0}")]
    Checkpoint(PluginError),

    #[error("task: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// Стадия запуска, на которой pipeline остановился (если ошибка стартовая).
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Startup { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
