use idforge_core::error::CoreError;

/// Errors returned by repository implementations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A unique constraint rejected the write.
    #[error("Duplicate value violates unique constraint: {0}")]
    Conflict(String),

    /// Any other database failure.
    #[error("Database error: {0}")]
    Sqlx(sqlx::Error),
}

/// Convenience alias for repository return values.
pub type DbResult<T> = Result<T, DbError>;

impl From<sqlx::Error> for DbError {
    /// PostgreSQL unique violations (SQLSTATE 23505) on `uq_`-prefixed
    /// constraints become [`DbError::Conflict`]; everything else is wrapped.
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return DbError::Conflict(constraint.to_string());
                }
            }
        }
        DbError::Sqlx(err)
    }
}

impl From<DbError> for CoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Conflict(constraint) => CoreError::AlreadyExists(constraint),
            DbError::Sqlx(e) => {
                tracing::error!(error = %e, "Repository operation failed");
                CoreError::Storage("database operation failed".into())
            }
        }
    }
}
