use crate::transaction::TransactionState;

/// Errors produced by the runtime core.
///
/// Constraint violations and I/O problems from the underlying engine are
/// carried verbatim in [`Error::Sqlite`] so callers can inspect the original
/// sqlite error code.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("no adapter registered for model type `{0}`")]
    MissingAdapter(&'static str),
    #[error("table `{0}` is already claimed by another adapter")]
    DuplicateTable(&'static str),
    #[error("invalid adapter for table `{table}`: {reason}")]
    InvalidAdapter {
        table: &'static str,
        reason: String,
    },
    #[error("cache key error: {0}")]
    CacheKey(String),
    #[error("migration {version} failed: {source}")]
    Migration {
        version: i64,
        #[source]
        source: Box<Error>,
    },
    #[error("transaction dispatcher has shut down")]
    DispatcherShutdown,
    #[error("blocking execute called from the writer thread, use the transaction context for nested work")]
    ReentrantBlocking,
    #[error("transaction was cancelled")]
    Cancelled,
    #[error("failed to create background thread: {0}")]
    Thread(std::io::Error),
}

impl Error {
    /// Terminal transaction state implied by this error.
    #[must_use]
    pub fn terminal_state(&self) -> TransactionState {
        match self {
            Error::Cancelled => TransactionState::Cancelled,
            _ => TransactionState::Failed,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
