use std::fmt;

/// Что делать с ошибкой на границе source/store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Неверные настройки или чужой checkpoint. Запуск не продолжается.
    Config,
    /// Broker, Cassandra или файловая система недоступны.
    Io,
    /// Сообщение не декодируется. Запись отбрасывается, поток идёт дальше.
    Format,
    /// Прочее: закрытая сессия, отсутствующая таблица.
    Logic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Format => "format",
            ErrorKind::Logic => "logic",
        })
    }
}

/// Ошибка `RecordSource`/`RecordStream` и `StoreConnector`/`ColumnStore`.
///
/// `Display` отдаёт только текст, `Debug` добавляет категорию: `[io] ...`.
#[derive(Clone, PartialEq, Eq)]
pub struct PluginError {
    kind: ErrorKind,
    message: String,
}

impl PluginError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Logic, message: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into() }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Io, message: msg.into() }
    }

    /// Плохое сообщение: вызывающий пропускает его.
    pub fn format_err(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Format, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// `"{ctx}: {message}"`, категория не меняется.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self { kind: self.kind, message: format!("{ctx}: {}", self.message) }
    }
}

impl fmt::Debug for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for PluginError {}

// JSON и UTF-8 встречаются только при разборе сообщений и checkpoint'а.
impl From<serde_json::Error> for PluginError {
    fn from(e: serde_json::Error) -> Self {
        Self::format_err(e.to_string())
    }
}

impl From<std::str::Utf8Error> for PluginError {
    fn from(e: std::str::Utf8Error) -> Self {
        Self::format_err(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_kind() {
        let e = PluginError::io("connection refused").with_context("cassandra");
        assert_eq!(e.kind(), ErrorKind::Io);
        assert_eq!(e.message(), "cassandra: connection refused");
        assert_eq!(format!("{e:?}"), "[io] cassandra: connection refused");
    }

    #[test]
    fn utf8_error_is_format() {
        let bytes = [0xffu8, 0xfe];
        let e: PluginError = std::str::from_utf8(&bytes).unwrap_err().into();
        assert_eq!(e.kind(), ErrorKind::Format);
    }
}
