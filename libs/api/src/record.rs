use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════
//  UserRecord
// ════════════════════════════════════════════════════════════════

/// Пользователь, декодированный из сообщения broker'а.
///
/// Все поля обязательны и должны быть строками, кроме `dob`: producer
/// его не присылает, в таблице колонка остаётся nullable.
/// Лишние ключи JSON игнорируются.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub address: String,
    pub post_code: String,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub dob: Option<String>,
    pub registered_date: String,
    pub phone: String,
    pub picture: String,
}

impl UserRecord {
    /// Текстовые колонки в порядке таблицы (без `id`).
    pub const TEXT_COLUMNS: [&'static str; 11] = [
        "first_name",
        "last_name",
        "gender",
        "address",
        "post_code",
        "email",
        "username",
        "dob",
        "registered_date",
        "phone",
        "picture",
    ];

    /// Значения текстовых колонок в порядке `TEXT_COLUMNS`.
    pub fn text_values(&self) -> [Option<&str>; 11] {
        [
            Some(self.first_name.as_str()),
            Some(self.last_name.as_str()),
            Some(self.gender.as_str()),
            Some(self.address.as_str()),
            Some(self.post_code.as_str()),
            Some(self.email.as_str()),
            Some(self.username.as_str()),
            self.dob.as_deref(),
            Some(self.registered_date.as_str()),
            Some(self.phone.as_str()),
            Some(self.picture.as_str()),
        ]
    }
}

// ════════════════════════════════════════════════════════════════
//  RawRecord
// ════════════════════════════════════════════════════════════════

/// Сырое сообщение из broker'а: позиция + непрозрачные байты.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub value: Option<Vec<u8>>,
    /// Broker timestamp (Unix ms), если есть.
    pub ts_ms: Option<i64>,
}

// ════════════════════════════════════════════════════════════════
//  SourcePositions
// ════════════════════════════════════════════════════════════════

/// Позиции чтения одного topic'а: partition → следующий offset для чтения.
///
/// Partition без записи читается с `starting_offsets` источника.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePositions {
    pub topic: String,
    #[serde(default)]
    pub next: BTreeMap<i32, i64>,
}

impl SourcePositions {
    pub fn new(topic: impl Into<String>) -> Self {
        Self { topic: topic.into(), next: BTreeMap::new() }
    }

    /// Отметить offset как обработанный. Позиция никогда не откатывается назад.
    pub fn advance(&mut self, partition: i32, offset: i64) {
        let next = offset + 1;
        let slot = self.next.entry(partition).or_insert(next);
        if *slot < next {
            *slot = next;
        }
    }

    /// Следующий offset для partition, если он известен.
    pub fn next_offset(&self, partition: i32) -> Option<i64> {
        self.next.get(&partition).copied()
    }

    /// Уже обработана ли запись с этой позицией.
    pub fn covers(&self, partition: i32, offset: i64) -> bool {
        self.next_offset(partition).is_some_and(|next| offset < next)
    }

    /// Влить более свежие позиции из `other` (по каждой partition берётся максимум).
    pub fn merge(&mut self, other: &SourcePositions) {
        for (&partition, &next) in &other.next {
            self.advance(partition, next - 1);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }
}
