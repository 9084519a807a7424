//! The single error type shared by every layer of the simulated filesystem.

/// Everything that can go wrong inside the image, named after the error
/// kinds a real filesystem call would report via `errno`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    Exists(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("out of inodes")]
    OutOfInodes,
    #[error("out of blocks")]
    OutOfBlocks,
    #[error("out of directory entries")]
    OutOfEntries,
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(i32),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("wrong type: {0}")]
    WrongType(String),
    #[error("underlying image I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for FsError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type FsResult<T> = Result<T, FsError>;
