use serde::{Deserialize, Serialize};

use crate::error::PluginError;
use crate::record::UserRecord;

// ════════════════════════════════════════════════════════════════
//  Column Types
// ════════════════════════════════════════════════════════════════

/// Тип колонки `id`. Остальные колонки таблицы всегда `text`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    /// Произвольная строка (`"u1"`, UUID в текстовом виде, ...).
    #[default]
    Text,
    /// CQL `uuid`: decoder отбрасывает записи с id, не являющимся UUID.
    Uuid,
}

/// CQL-тип колонки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Text,
    Uuid,
}

impl ColumnType {
    pub fn cql(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Uuid => "uuid",
        }
    }
}

impl From<IdType> for ColumnType {
    fn from(t: IdType) -> Self {
        match t {
            IdType::Text => ColumnType::Text,
            IdType::Uuid => ColumnType::Uuid,
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.cql())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub primary_key: bool,
}

// ════════════════════════════════════════════════════════════════
//  Keyspace
// ════════════════════════════════════════════════════════════════

/// Стратегия репликации keyspace'а.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Replication {
    /// `SimpleStrategy` с фиксированным replication factor.
    Simple { factor: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyspaceSpec {
    pub name: String,
    pub replication: Replication,
}

impl KeyspaceSpec {
    pub fn simple(name: impl Into<String>, factor: u32) -> Self {
        Self { name: name.into(), replication: Replication::Simple { factor } }
    }
}

// ════════════════════════════════════════════════════════════════
//  Table
// ════════════════════════════════════════════════════════════════

/// Полное имя таблицы. Один и тот же `TableRef` используется и при
/// создании схемы, и при записи: имена не могут разойтись.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef {
    pub keyspace: String,
    pub table: String,
}

impl TableRef {
    pub fn new(keyspace: impl Into<String>, table: impl Into<String>) -> Self {
        Self { keyspace: keyspace.into(), table: table.into() }
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.keyspace, self.table)
    }
}

/// Описание таблицы пользователей: `id` (primary key) + 11 text колонок.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableSpec {
    pub table: TableRef,
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    pub fn users(table: TableRef, id_type: IdType) -> Self {
        let mut columns = Vec::with_capacity(UserRecord::TEXT_COLUMNS.len() + 1);
        columns.push(ColumnSpec {
            name: "id",
            column_type: id_type.into(),
            primary_key: true,
        });
        for name in UserRecord::TEXT_COLUMNS {
            columns.push(ColumnSpec { name, column_type: ColumnType::Text, primary_key: false });
        }
        Self { table, columns }
    }

    pub fn primary_key(&self) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.primary_key)
    }

    pub fn id_type(&self) -> ColumnType {
        self.primary_key().map(|c| c.column_type).unwrap_or(ColumnType::Text)
    }
}

/// Проверить имя keyspace/таблицы: CQL unquoted identifier, до 48 символов.
pub fn validate_identifier(what: &str, name: &str) -> Result<(), PluginError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            first.is_ascii_alphabetic()
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                && name.len() <= 48
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(PluginError::config(format!(
            "{what} '{name}': expected [A-Za-z][A-Za-z0-9_]*, at most 48 chars"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn users_table_has_twelve_columns() {
        let spec = TableSpec::users(TableRef::new("spark_streams", "created_users"), IdType::Uuid);
        assert_eq!(spec.columns.len(), 12);
        assert_eq!(spec.columns.iter().filter(|c| c.primary_key).count(), 1);
        assert_eq!(spec.id_type(), ColumnType::Uuid);
        assert!(spec.columns[1..].iter().all(|c| c.column_type == ColumnType::Text));
        assert_eq!(spec.table.to_string(), "spark_streams.created_users");
    }

    #[test]
    fn identifiers() {
        assert!(validate_identifier("keyspace", "spark_streams").is_ok());
        assert!(validate_identifier("table", "created_users").is_ok());
        assert!(validate_identifier("table", "").is_err());
        assert!(validate_identifier("table", "1users").is_err());
        assert!(validate_identifier("table", "users; DROP").is_err());
        assert!(validate_identifier("table", &"a".repeat(49)).is_err());
    }
}
