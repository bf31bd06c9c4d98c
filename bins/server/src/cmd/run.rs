use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use pipeline::Pipeline;
use source_kafka::KafkaSource;

use crate::config::ServerConfig;
use crate::error::ServerError;

pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    tracing::info!(
        brokers = %config.source.brokers,
        topic = %config.source.topic,
        table = %config.schema.table_ref(),
        "user-stream starting"
    );

    let source = Arc::new(KafkaSource::new(config.source.clone()));
    let pipeline = Pipeline::new(config.pipeline_settings(), source, config.store.connector());

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();
    let signal_token = token.clone();
    let signal = tokio::spawn(async move {
        let result = tokio::signal::ctrl_c().await;
        match &result {
            Ok(()) => tracing::info!("shutting down..."),
            Err(e) => tracing::error!(error = %e, "ctrl-c handler failed, stopping"),
        }
        signal_token.cancel();
        result
    });

    let result = pipeline.run(token).await;

    let signal_result = if signal.is_finished() {
        signal.await.ok()
    } else {
        signal.abort();
        None
    };
    let stats = result?;
    if let Some(Err(e)) = signal_result {
        return Err(ServerError::Signal(e));
    }

    tracing::info!(
        received = stats.received,
        written = stats.written,
        dropped = stats.dropped,
        "shutdown complete"
    );
    Ok(())
}
