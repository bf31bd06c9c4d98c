use std::future::Future;
use std::pin::Pin;

use crate::error::PluginError;
use crate::record::{RawRecord, SourcePositions};

/// Открытая подписка на topic: асинхронный поток сырых сообщений.
pub trait RecordStream: Send {
    /// Следующее сообщение.
    ///
    /// - `Some(Ok(_))`: сообщение;
    /// - `Some(Err(_))`: ошибка broker'а, поток продолжает работу;
    /// - `None`: поток исчерпан (только у конечных источников).
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<RawRecord, PluginError>>> + Send + '_>>;

    /// Освободить подписку. Вызывается хостом на любом пути выхода.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>>;
}

/// Source connector: открывает подписку на topic, начиная с `resume`
/// (partitions без позиции: с `starting_offsets` источника).
pub trait RecordSource: Send + Sync {
    /// Имя topic'а, из которого читает источник.
    fn topic(&self) -> &str;

    fn open(
        &self,
        resume: &SourcePositions,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn RecordStream>, PluginError>> + Send + '_>>;
}
