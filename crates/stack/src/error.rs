use std::io;
use table::TableError;
use thiserror::Error;

/// Errors surfaced by stack operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A lock file was held by another writer, or the in-memory state was
    /// stale when a transaction started. The stack has already been
    /// reloaded (best effort), so the transaction may simply be retried.
    #[error("reftable stack: lock failure")]
    LockFailure,

    /// An underlying I/O error from the manifest or lock-file plumbing.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An error from reading or writing an individual table file.
    #[error(transparent)]
    Table(#[from] TableError),
}

impl Error {
    /// Returns `true` if this error means a file did not exist.
    ///
    /// The reload loop treats a vanished table file as a transient
    /// condition: an external compaction may have renamed it between the
    /// manifest read and the table open.
    pub(crate) fn is_not_found(&self) -> bool {
        match self {
            Error::Io(e) => e.kind() == io::ErrorKind::NotFound,
            Error::Table(TableError::Io(e)) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
