/// One element of the workload. Emitted by a command source, executed by
/// every worker in lock-step.
///
/// Insert/Erase/Find carry their payload so that all workers operate on the
/// same bytes; the key and record are generated exactly once per command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create,
    Open,
    Close,
    Insert { key: Vec<u8>, record: Vec<u8> },
    Erase { key: Vec<u8> },
    Find { key: Vec<u8> },
    TxnBegin,
    TxnCommit,
    TxnAbort,
    Fullcheck,
    Flush,
    Nop,
}

impl Command {
    /// The trace-file verb for this command.
    pub fn verb(&self) -> &'static str {
        match self {
            Command::Create => "CREATE",
            Command::Open => "OPEN",
            Command::Close => "CLOSE",
            Command::Insert { .. } => "INSERT",
            Command::Erase { .. } => "ERASE",
            Command::Find { .. } => "FIND",
            Command::TxnBegin => "BEGIN_TXN",
            Command::TxnCommit => "CLOSE_TXN",
            Command::TxnAbort => "ABORT_TXN",
            Command::Fullcheck => "FULLCHECK",
            Command::Flush => "FLUSH",
            Command::Nop => "--",
        }
    }
}
