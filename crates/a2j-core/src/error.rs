use std::fmt;
use std::path::PathBuf;

/// Machine-readable error codes for startup failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    ConfigMissingValue,
    ConfigInvalidValue,
    TableNotFound,
    TableMalformed,
    LedgerWriteFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::ConfigMissingValue => "E1002",
            Self::ConfigInvalidValue => "E1003",
            Self::TableNotFound => "E2001",
            Self::TableMalformed => "E2002",
            Self::LedgerWriteFailed => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::ConfigMissingValue => "Required setting missing",
            Self::ConfigInvalidValue => "Invalid setting value",
            Self::TableNotFound => "Input table not found",
            Self::TableMalformed => "Input table malformed",
            Self::LedgerWriteFailed => "Ledger write failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in a2j.toml and retry."),
            Self::ConfigMissingValue => {
                Some("Set the value in a2j.toml or the matching environment variable.")
            }
            Self::ConfigInvalidValue => Some("Check the documented format for this setting."),
            Self::TableNotFound => {
                Some("Run the earlier export/import stages that produce this table first.")
            }
            Self::TableMalformed => Some("Re-export the table; a required column is missing."),
            Self::LedgerWriteFailed => Some("Check disk space and write permissions."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Fatal errors: any of these aborts a run before (or instead of) remote calls.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error("required table not found: {}", path.display())]
    MissingTable { path: PathBuf },

    #[error("table {} is missing required column '{column}'", path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("failed to parse table {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write ledger {}: {source}", path.display())]
    Ledger {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to parse config {}: {message}", path.display())]
    ConfigParse { path: PathBuf, message: String },

    #[error("missing required setting '{key}'")]
    MissingSetting { key: &'static str },

    #[error("invalid value '{value}' for setting '{key}': {reason}")]
    InvalidSetting {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MigrateError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::MissingTable { .. } => ErrorCode::TableNotFound,
            Self::MissingColumn { .. } | Self::Csv { .. } => ErrorCode::TableMalformed,
            Self::Ledger { .. } => ErrorCode::LedgerWriteFailed,
            Self::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Self::MissingSetting { .. } => ErrorCode::ConfigMissingValue,
            Self::InvalidSetting { .. } => ErrorCode::ConfigInvalidValue,
            Self::Io(_) => ErrorCode::InternalUnexpected,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ConfigParseError,
            ErrorCode::ConfigMissingValue,
            ErrorCode::ConfigInvalidValue,
            ErrorCode::TableNotFound,
            ErrorCode::TableMalformed,
            ErrorCode::LedgerWriteFailed,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::TableMalformed.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn missing_column_maps_to_malformed_table() {
        let err = MigrateError::MissingColumn {
            path: PathBuf::from("jira-users.csv"),
            column: "assemblaid".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::TableMalformed);
        assert!(err.to_string().contains("assemblaid"));
        assert!(err.hint().is_some());
    }
}
