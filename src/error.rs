use std::fmt;

/// Failures that stop an operation. Data-quality problems (missing columns,
/// non-numeric amounts, zero denominators, empty filters) are not errors;
/// they degrade and are reported alongside the result instead.
#[derive(Debug)]
pub enum ReportError {
    /// IO error (file operations, etc.)
    Io(std::io::Error),

    /// SQLite store error
    Sqlite(rusqlite::Error),

    /// CSV encoding/decoding error
    Csv(csv::Error),

    /// Spreadsheet writer error
    Xlsx(rust_xlsxwriter::XlsxError),

    /// JSON serialization error
    Json(serde_json::Error),

    /// Configuration error
    Config(String),

    /// TOML parsing error
    TomlParsing(toml::de::Error),

    /// Invalid argument error
    InvalidArgument(String),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::Io(err) => write!(f, "IO error: {err}"),
            ReportError::Sqlite(err) => write!(f, "Store error: {err}"),
            ReportError::Csv(err) => write!(f, "CSV error: {err}"),
            ReportError::Xlsx(err) => write!(f, "Spreadsheet error: {err}"),
            ReportError::Json(err) => write!(f, "JSON error: {err}"),
            ReportError::Config(msg) => write!(f, "Configuration error: {msg}"),
            ReportError::TomlParsing(err) => write!(f, "TOML parsing error: {err}"),
            ReportError::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::Io(err) => Some(err),
            ReportError::Sqlite(err) => Some(err),
            ReportError::Csv(err) => Some(err),
            ReportError::Xlsx(err) => Some(err),
            ReportError::Json(err) => Some(err),
            ReportError::TomlParsing(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ReportError {
    fn from(err: std::io::Error) -> Self {
        ReportError::Io(err)
    }
}

impl From<rusqlite::Error> for ReportError {
    fn from(err: rusqlite::Error) -> Self {
        ReportError::Sqlite(err)
    }
}

impl From<csv::Error> for ReportError {
    fn from(err: csv::Error) -> Self {
        ReportError::Csv(err)
    }
}

impl From<rust_xlsxwriter::XlsxError> for ReportError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        ReportError::Xlsx(err)
    }
}

impl From<serde_json::Error> for ReportError {
    fn from(err: serde_json::Error) -> Self {
        ReportError::Json(err)
    }
}

impl From<toml::de::Error> for ReportError {
    fn from(err: toml::de::Error) -> Self {
        ReportError::TomlParsing(err)
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReportError::Config("budget_min must be finite".to_string());
        assert_eq!(
            format!("{err}"),
            "Configuration error: budget_min must be finite"
        );

        let err = ReportError::InvalidArgument("month 13".to_string());
        assert_eq!(format!("{err}"), "Invalid argument: month 13");
    }

    #[test]
    fn test_error_from_io() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        match ReportError::from(io_error) {
            ReportError::Io(_) => {}
            other => panic!("Expected Io variant, got {other:?}"),
        }
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;
        let err = ReportError::from(rusqlite::Error::InvalidQuery);
        assert!(err.source().is_some());
        assert!(ReportError::Config("x".into()).source().is_none());
    }
}
