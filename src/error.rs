use std::path::PathBuf;

use thiserror::Error;

/// Everything that can end a run early.
///
/// Each variant maps onto one of the error kinds named in the design:
/// parse, I/O, timeout, signal, and protocol failures.
#[derive(Debug, Error)]
pub enum ShrunError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{path}: {source}")]
    ShellNotExecutable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown control command: {0:?}")]
    UnknownControlCommand(String),

    #[error("command timed out")]
    TimedOut,

    #[error("interrupted")]
    Interrupted,

    #[error(transparent)]
    Nix(#[from] nix::Error),
}

pub type Result<T> = std::result::Result<T, ShrunError>;
