use std::fmt;

use thiserror::Error;

/// What diverged between two back-ends on the same command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivergenceKind {
    Status,
    Record,
    Key,
    Integrity,
}

impl fmt::Display for DivergenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DivergenceKind::Status => write!(f, "status"),
            DivergenceKind::Record => write!(f, "record"),
            DivergenceKind::Key => write!(f, "key"),
            DivergenceKind::Integrity => write!(f, "integrity check"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("line {line}: parse error near '{token}'")]
    Parse { line: u64, token: String },

    #[error("line {line}: {kind} mismatch between back-ends")]
    Divergence { line: u64, kind: DivergenceKind },

    #[error("line {line}: back-end reported a fatal status")]
    WorkerFailed { line: u64 },

    #[error("failed to open tee file: {0}")]
    Tee(#[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
