//! Общие типы и trait'ы pipeline'а: записи, схема таблицы, source/store seams.

pub mod error;
pub mod record;
pub mod schema;
pub mod source;
pub mod store;
pub mod util;

pub use error::{ErrorKind, PluginError};
pub use record::{RawRecord, SourcePositions, UserRecord};
pub use schema::{
    ColumnSpec, ColumnType, IdType, KeyspaceSpec, Replication, TableRef, TableSpec,
    validate_identifier,
};
pub use source::{RecordSource, RecordStream};
pub use store::{ColumnStore, StoreConnector};
pub use util::now_ms;
