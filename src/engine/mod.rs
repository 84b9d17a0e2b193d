//! Uniform operation surface over one key/value back-end.
//!
//! Workers and the controller only ever talk to a [`KvEngine`]; the concrete
//! store behind it is selected at process start. Operations report a
//! [`Status`] rather than a `Result` because statuses are data here: the
//! harness compares them verbatim across back-ends, and two of the non-zero
//! codes are expected outcomes rather than failures.

pub mod memory;
#[cfg(feature = "redb")]
pub mod redb_engine;

use std::fmt;

pub use memory::MemoryEngine;
#[cfg(feature = "redb")]
pub use redb_engine::RedbEngine;

/// Small-integer operation status. `OK` is zero; `DUPLICATE_KEY` and
/// `KEY_NOT_FOUND` are the two distinguished non-fatal codes and must be
/// propagated verbatim by adapters. Anything else marks the worker as
/// failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    pub const OK: Status = Status(0);
    pub const NOT_READY: Status = Status(-1);
    pub const IO_ERROR: Status = Status(-2);
    pub const INV_PARAMETER: Status = Status(-3);
    pub const DUPLICATE_KEY: Status = Status(-8);
    pub const INTEGRITY_VIOLATED: Status = Status(-9);
    pub const KEY_NOT_FOUND: Status = Status(-11);

    pub fn is_ok(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque transaction handle minted by an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnId(pub u64);

/// Opaque cursor handle minted by an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorId(pub u64);

/// The contract every back-end adapter satisfies.
///
/// `insert`/`erase`/`find` with `txn == None` auto-commit. Cursors are
/// optionally bound to a transaction at creation and see that transaction's
/// view of the store. `get_next`/`get_previous` copy the current key and
/// record into the supplied buffers (cleared first) and return
/// `KEY_NOT_FOUND` at the end of the iteration.
pub trait KvEngine: Send {
    fn name(&self) -> &'static str;

    fn create_env(&mut self) -> Status;
    fn open_env(&mut self) -> Status;
    fn close_env(&mut self) -> Status;

    fn create_db(&mut self, id: u32) -> Status;
    fn open_db(&mut self, id: u32) -> Status;
    fn close_db(&mut self) -> Status;

    fn txn_begin(&mut self) -> (Status, Option<TxnId>);
    fn txn_commit(&mut self, txn: TxnId) -> Status;
    fn txn_abort(&mut self, txn: TxnId) -> Status;

    fn cursor_create(&mut self, txn: Option<TxnId>) -> (Status, Option<CursorId>);
    fn cursor_close(&mut self, cursor: CursorId) -> Status;

    fn insert(&mut self, txn: Option<TxnId>, key: &[u8], record: &[u8]) -> Status;
    fn erase(&mut self, txn: Option<TxnId>, key: &[u8]) -> Status;
    fn find(&mut self, txn: Option<TxnId>, key: &[u8], record: &mut Vec<u8>) -> Status;

    fn cursor_insert(&mut self, cursor: CursorId, key: &[u8], record: &[u8]) -> Status;
    fn cursor_erase(&mut self, cursor: CursorId, key: &[u8]) -> Status;
    fn cursor_find(&mut self, cursor: CursorId, key: &[u8], record: &mut Vec<u8>) -> Status;

    fn get_next(
        &mut self,
        cursor: CursorId,
        key: &mut Vec<u8>,
        record: &mut Vec<u8>,
        skip_duplicates: bool,
    ) -> Status;
    fn get_previous(&mut self, cursor: CursorId, key: &mut Vec<u8>, record: &mut Vec<u8>)
        -> Status;

    fn check_integrity(&mut self) -> Status;
}
