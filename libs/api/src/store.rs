use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::PluginError;
use crate::record::UserRecord;
use crate::schema::{KeyspaceSpec, TableSpec};

/// Открытая сессия к column store.
///
/// Все операции создания схемы идемпотентны (`IF NOT EXISTS`),
/// запись выполняется как upsert по primary key.
pub trait ColumnStore: Send + Sync {
    /// Создать keyspace, если его нет.
    fn create_keyspace(&self, keyspace: &KeyspaceSpec)
        -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>>;

    /// Создать таблицу, если её нет.
    fn create_table(&self, table: &TableSpec)
        -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>>;

    /// Upsert строк в таблицу. Успех = все строки durably записаны.
    ///
    /// `table` несёт и тип колонки `id`: сессия не обязана знать схему,
    /// созданную другой сессией.
    fn upsert(&self, table: &TableSpec, rows: &[UserRecord])
        -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>>;

    /// Закрыть сессию.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>>;
}

/// Фабрика сессий column store.
pub trait StoreConnector: Send + Sync {
    /// Описание подключения (для логирования).
    fn describe(&self) -> String;

    fn connect(&self) -> Pin<Box<dyn Future<Output = Result<Arc<dyn ColumnStore>, PluginError>> + Send + '_>>;
}
