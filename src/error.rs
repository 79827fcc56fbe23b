use std::{fmt, io, result};

/// Result alias used throughout the engine.
pub type Result<T> = result::Result<T, Error>;

/// Error taxonomy for the engine's public surface.
///
/// Internal invariant violations (row-id map corruption, catalog
/// bookkeeping bugs, structural index inconsistency) are not modeled
/// here: they are fatal and surface as `panic!`/`assert!`, never as a
/// value a caller is expected to handle.
#[derive(Debug)]
pub enum Error {
    /// Invalid parameters supplied by the adapter.
    InputError(String),
    /// Column type outside the closed palette, or unsupported for the
    /// requested operation.
    UnsupportedColumnType(String),
    /// Allocation failure, extent or row-id map growth.
    OutOfMemory(String),
    /// Catalog miss on table lookup.
    TableNotFound(u32),
    /// Catalog miss on index lookup.
    IndexNotFound(u32),
    /// Named column absent from a table's schema.
    ColumnNotFound(String),
    /// Index declared on a column whose type cannot be indexed
    /// (anything outside int32, uint64, varchar).
    IndexTypeNotSupported(String),
    /// Index declared on a nullable column.
    IndexColumnNullable(String),
    /// Composite key would exceed `KEY_DATA_LENGTH`.
    KeySizeExceeded { wanted: usize, limit: usize },
    /// Row layout exceeds `MAX_TUPLE_LEN`.
    RowSizeExceeded { wanted: usize, limit: usize },
    /// MVCC conflict; the calling transaction must abort.
    WriteWriteConflict(u32),
    /// Operation attempted on a transaction that is no longer active.
    TransactionAborted,
    /// Underlying file or pool I/O failure.
    IoError(String),
    /// A path did not name a usable file or directory.
    InvalidFile(String),
    /// A background worker thread failed to start or join.
    ThreadFail(String),
    /// A numeric conversion did not fit the target type.
    FailConversion(String),
    /// A read returned fewer bytes than requested.
    PartialRead(String, usize, usize),
    /// Functionality intentionally not implemented at this layer.
    NotImplemented(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InputError(msg) => write!(f, "input error: {}", msg),
            Error::UnsupportedColumnType(msg) => write!(f, "unsupported column type: {}", msg),
            Error::OutOfMemory(msg) => write!(f, "out of memory: {}", msg),
            Error::TableNotFound(oid) => write!(f, "table not found: {}", oid),
            Error::IndexNotFound(oid) => write!(f, "index not found: {}", oid),
            Error::ColumnNotFound(name) => write!(f, "column not found: {}", name),
            Error::IndexTypeNotSupported(msg) => write!(f, "index type not supported: {}", msg),
            Error::IndexColumnNullable(name) => {
                write!(f, "index column must not be nullable: {}", name)
            }
            Error::KeySizeExceeded { wanted, limit } => {
                write!(f, "key size {} exceeds limit {}", wanted, limit)
            }
            Error::RowSizeExceeded { wanted, limit } => {
                write!(f, "row size {} exceeds limit {}", wanted, limit)
            }
            Error::WriteWriteConflict(row_id) => {
                write!(f, "write-write conflict on row {}", row_id)
            }
            Error::TransactionAborted => write!(f, "transaction aborted"),
            Error::IoError(msg) => write!(f, "I/O error: {}", msg),
            Error::InvalidFile(path) => write!(f, "invalid file: {}", path),
            Error::ThreadFail(msg) => write!(f, "thread failure: {}", msg),
            Error::FailConversion(msg) => write!(f, "conversion failed: {}", msg),
            Error::PartialRead(msg, want, got) => {
                write!(f, "partial read ({}): wanted {} got {}", msg, want, got)
            }
            Error::NotImplemented(msg) => write!(f, "not implemented: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err.to_string())
    }
}
