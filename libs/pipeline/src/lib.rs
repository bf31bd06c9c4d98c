pub mod config;
pub mod error;
mod checkpoint;
mod decoder;
mod registrar;
mod runner;
mod sink;
mod source;

pub use checkpoint::CheckpointStore;
pub use decoder::Decoder;
pub use error::PipelineError;
pub use registrar::register_schema;
pub use runner::{
    Pipeline, PipelineSettings, PipelineState, Stage, insert_payload, provision_schema,
};
pub use sink::{SinkSettings, SinkStats, spawn_sink_task, upsert_one};
pub use source::spawn_source_task;
