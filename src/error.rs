use std::io;

use thiserror::Error;

/// Fatal conditions surfaced at the program boundary.
///
/// Lock contention, transient empty pops and idle/wake races are expected
/// runtime states, not errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("malformed input: {0}")]
    Malformed(String),
    #[error("wrapper initialization failed: {0}")]
    WrapperInit(String),
    #[error("computed distances do not match the reference solution")]
    SolutionMismatch,
    #[error("a worker thread panicked")]
    WorkerPanicked,
}
