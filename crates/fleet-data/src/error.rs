//! Error types for the data access layer.

/// Result alias for data layer operations.
pub type DataResult<T> = Result<T, DataError>;

/// Errors raised by the data access layer.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// Migration execution failed.
    #[error("migration failed")]
    MigrationFailed {
        /// Underlying migration error.
        #[source]
        source: sqlx::migrate::MigrateError,
    },
    /// A database operation failed.
    #[error("database operation failed: {operation}")]
    QueryFailed {
        /// Operation identifier, for diagnostics.
        operation: &'static str,
        /// Underlying SQL error.
        #[source]
        source: sqlx::Error,
    },
    /// A stored text column held a value outside its enum's known set.
    #[error("column {column} holds unrecognised value {value:?}")]
    UnknownEnumValue {
        /// Column name.
        column: &'static str,
        /// The offending raw value.
        value: String,
    },
}

impl DataError {
    pub(crate) fn query(operation: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::QueryFailed { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_failed_display_includes_operation() {
        let err = DataError::QueryFailed {
            operation: "fetch rule",
            source: sqlx::Error::RowNotFound,
        };
        assert_eq!(err.to_string(), "database operation failed: fetch rule");
    }

    #[test]
    fn unknown_enum_value_display() {
        let err = DataError::UnknownEnumValue {
            column: "delete_mode",
            value: "bogus".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "column delete_mode holds unrecognised value \"bogus\""
        );
    }
}
