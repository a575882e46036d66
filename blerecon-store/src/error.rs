use thiserror::Error;

/// Startup failures only: every other Store operation neutralizes its
/// own errors at the boundary (spec.md §4.A, §7) and never returns
/// this type to callers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open device store: {0}")]
    Open(#[from] sqlx::Error),
    #[error("failed to run migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}
