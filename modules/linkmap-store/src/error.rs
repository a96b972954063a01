pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or the query failed transiently.
    /// Safe to retry.
    #[error("Store unavailable: {0}")]
    Unavailable(sqlx::Error),

    /// A uniqueness or foreign-key constraint was violated. Fatal for
    /// the operation that triggered it.
    #[error("Constraint violation: {0}")]
    Constraint(sqlx::Error),

    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() || db.is_foreign_key_violation() => {
                StoreError::Constraint(e)
            }
            _ => StoreError::Unavailable(e),
        }
    }
}
