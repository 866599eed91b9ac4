//! Error types for the varweave library.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CallerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("input error: {0}")]
    Input(String),

    #[error("region error: {0}")]
    Region(String),

    #[error("malformed read data: {0}")]
    Data(String),

    #[error("numerical error: {0}")]
    Numeric(String),

    #[error("haplotype overflow in {region}: {count} haplotypes exceeds limit {limit}")]
    Overflow {
        region: String,
        count: usize,
        limit: usize,
    },

    #[error("transient I/O failure: {0}")]
    Transient(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CallerError>;

impl CallerError {
    /// Process exit code for this error class.
    ///
    /// 0 is success, 1 configuration, 2 missing or unreadable input,
    /// 3 I/O, 4 internal failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            CallerError::Config(_) => 1,
            CallerError::Input(_) | CallerError::Region(_) => 2,
            CallerError::Io(_) | CallerError::Transient(_) => 3,
            CallerError::Data(_) | CallerError::Numeric(_) | CallerError::Overflow { .. } => 4,
        }
    }
}

/// Returns `true` if the error originated from a broken pipe.
#[inline]
pub fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.root_cause()
        .downcast_ref::<std::io::Error>()
        .map(|io_err| io_err.kind() == std::io::ErrorKind::BrokenPipe)
        .unwrap_or(false)
}
