//! Adapter onto [redb](https://crates.io/crates/redb).
//!
//! The contract's handle-based transactions map onto redb's owned
//! `WriteTransaction`; the worker invariant of at most one open transaction
//! per engine keeps that a single slot. Tables are opened per operation
//! (they borrow the transaction). Cursors remember their last key and step
//! with range queries, the same strategy as the memory engine.

use std::collections::HashMap;
use std::ops::Bound;
use std::path::PathBuf;

use redb::{Database, ReadableTable, TableDefinition, TableError, WriteTransaction};

use super::{CursorId, KvEngine, Status, TxnId};

const TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("kvbench");

struct CursorState {
    txn: Option<TxnId>,
    pos: Option<Vec<u8>>,
}

pub struct RedbEngine {
    path: PathBuf,
    db: Option<Database>,
    wtxn: Option<(TxnId, WriteTransaction)>,
    cursors: HashMap<CursorId, CursorState>,
    next_txn: u64,
    next_cursor: u64,
}

fn table_get<T>(table: &T, key: &[u8], record: &mut Vec<u8>) -> Status
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    match table.get(key) {
        Ok(Some(guard)) => {
            record.extend_from_slice(guard.value());
            Status::OK
        }
        Ok(None) => Status::KEY_NOT_FOUND,
        Err(_) => Status::IO_ERROR,
    }
}

/// Steps one entry past `pos` in the requested direction; on success returns
/// the new position through `key`/`record`.
fn table_step<T>(
    table: &T,
    pos: &Option<Vec<u8>>,
    forward: bool,
    key: &mut Vec<u8>,
    record: &mut Vec<u8>,
) -> Status
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let range = if forward {
        let lower = match pos {
            Some(p) => Bound::Excluded(p.as_slice()),
            None => Bound::Unbounded,
        };
        table.range::<&[u8]>((lower, Bound::Unbounded))
    } else {
        let upper = match pos {
            Some(p) => Bound::Excluded(p.as_slice()),
            None => Bound::Unbounded,
        };
        table.range::<&[u8]>((Bound::Unbounded, upper))
    };
    let mut range = match range {
        Ok(r) => r,
        Err(_) => return Status::IO_ERROR,
    };
    let entry = if forward { range.next() } else { range.next_back() };
    match entry {
        Some(Ok((k, v))) => {
            key.clear();
            key.extend_from_slice(k.value());
            record.clear();
            record.extend_from_slice(v.value());
            Status::OK
        }
        Some(Err(_)) => Status::IO_ERROR,
        None => Status::KEY_NOT_FOUND,
    }
}

impl RedbEngine {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            db: None,
            wtxn: None,
            cursors: HashMap::new(),
            next_txn: 0,
            next_cursor: 0,
        }
    }

    /// Runs `op` against the table of the open write transaction, or inside
    /// a one-shot transaction when none is open.
    fn with_write_table<F>(&mut self, txn: Option<TxnId>, op: F) -> Status
    where
        F: FnOnce(&mut redb::Table<'_, &'static [u8], &'static [u8]>) -> Status,
    {
        let Some(db) = self.db.as_ref() else {
            return Status::NOT_READY;
        };
        match (txn, self.wtxn.as_ref()) {
            (Some(id), Some((open_id, wtxn))) if id == *open_id => {
                match wtxn.open_table(TABLE) {
                    Ok(mut table) => op(&mut table),
                    Err(_) => Status::IO_ERROR,
                }
            }
            (Some(_), _) => Status::INV_PARAMETER,
            (None, _) => {
                let wtxn = match db.begin_write() {
                    Ok(t) => t,
                    Err(_) => return Status::IO_ERROR,
                };
                let st = match wtxn.open_table(TABLE) {
                    Ok(mut table) => op(&mut table),
                    Err(_) => Status::IO_ERROR,
                };
                match wtxn.commit() {
                    Ok(()) => st,
                    Err(_) => Status::IO_ERROR,
                }
            }
        }
    }
}

impl KvEngine for RedbEngine {
    fn name(&self) -> &'static str {
        "redb"
    }

    fn create_env(&mut self) -> Status {
        Status::OK
    }

    fn open_env(&mut self) -> Status {
        Status::OK
    }

    fn close_env(&mut self) -> Status {
        self.db = None;
        Status::OK
    }

    fn create_db(&mut self, _id: u32) -> Status {
        let _ = std::fs::remove_file(&self.path);
        let db = match Database::create(&self.path) {
            Ok(db) => db,
            Err(_) => return Status::IO_ERROR,
        };
        // materialize the table so snapshot reads see it
        let st = match db.begin_write() {
            Ok(wtxn) => {
                let created = wtxn.open_table(TABLE).is_ok();
                match wtxn.commit() {
                    Ok(()) if created => Status::OK,
                    _ => Status::IO_ERROR,
                }
            }
            Err(_) => Status::IO_ERROR,
        };
        self.db = Some(db);
        st
    }

    fn open_db(&mut self, _id: u32) -> Status {
        if self.db.is_some() {
            return Status::OK;
        }
        match Database::open(&self.path) {
            Ok(db) => {
                self.db = Some(db);
                Status::OK
            }
            Err(_) => Status::IO_ERROR,
        }
    }

    fn close_db(&mut self) -> Status {
        if self.db.is_none() {
            return Status::NOT_READY;
        }
        self.cursors.clear();
        self.db = None;
        Status::OK
    }

    fn txn_begin(&mut self) -> (Status, Option<TxnId>) {
        let Some(db) = self.db.as_ref() else {
            return (Status::NOT_READY, None);
        };
        if self.wtxn.is_some() {
            return (Status::INV_PARAMETER, None);
        }
        match db.begin_write() {
            Ok(wtxn) => {
                let id = TxnId(self.next_txn);
                self.next_txn += 1;
                self.wtxn = Some((id, wtxn));
                (Status::OK, Some(id))
            }
            Err(_) => (Status::IO_ERROR, None),
        }
    }

    fn txn_commit(&mut self, txn: TxnId) -> Status {
        match self.wtxn.take() {
            Some((id, wtxn)) if id == txn => match wtxn.commit() {
                Ok(()) => Status::OK,
                Err(_) => Status::IO_ERROR,
            },
            other => {
                self.wtxn = other;
                Status::INV_PARAMETER
            }
        }
    }

    fn txn_abort(&mut self, txn: TxnId) -> Status {
        match self.wtxn.take() {
            Some((id, wtxn)) if id == txn => match wtxn.abort() {
                Ok(()) => Status::OK,
                Err(_) => Status::IO_ERROR,
            },
            other => {
                self.wtxn = other;
                Status::INV_PARAMETER
            }
        }
    }

    fn cursor_create(&mut self, txn: Option<TxnId>) -> (Status, Option<CursorId>) {
        if self.db.is_none() {
            return (Status::NOT_READY, None);
        }
        let id = CursorId(self.next_cursor);
        self.next_cursor += 1;
        self.cursors.insert(id, CursorState { txn, pos: None });
        (Status::OK, Some(id))
    }

    fn cursor_close(&mut self, cursor: CursorId) -> Status {
        match self.cursors.remove(&cursor) {
            Some(_) => Status::OK,
            None => Status::INV_PARAMETER,
        }
    }

    fn insert(&mut self, txn: Option<TxnId>, key: &[u8], record: &[u8]) -> Status {
        self.with_write_table(txn, |table| {
            match table.get(key) {
                Ok(Some(_)) => return Status::DUPLICATE_KEY,
                Ok(None) => {}
                Err(_) => return Status::IO_ERROR,
            }
            match table.insert(key, record) {
                Ok(_) => Status::OK,
                Err(_) => Status::IO_ERROR,
            }
        })
    }

    fn erase(&mut self, txn: Option<TxnId>, key: &[u8]) -> Status {
        self.with_write_table(txn, |table| match table.remove(key) {
            Ok(Some(_)) => Status::OK,
            Ok(None) => Status::KEY_NOT_FOUND,
            Err(_) => Status::IO_ERROR,
        })
    }

    fn find(&mut self, txn: Option<TxnId>, key: &[u8], record: &mut Vec<u8>) -> Status {
        record.clear();
        let Some(db) = self.db.as_ref() else {
            return Status::NOT_READY;
        };
        match (txn, self.wtxn.as_ref()) {
            (Some(id), Some((open_id, wtxn))) if id == *open_id => {
                match wtxn.open_table(TABLE) {
                    Ok(table) => table_get(&table, key, record),
                    Err(TableError::TableDoesNotExist(_)) => Status::KEY_NOT_FOUND,
                    Err(_) => Status::IO_ERROR,
                }
            }
            (Some(_), _) => Status::INV_PARAMETER,
            (None, _) => {
                let rtxn = match db.begin_read() {
                    Ok(t) => t,
                    Err(_) => return Status::IO_ERROR,
                };
                match rtxn.open_table(TABLE) {
                    Ok(table) => table_get(&table, key, record),
                    Err(TableError::TableDoesNotExist(_)) => Status::KEY_NOT_FOUND,
                    Err(_) => Status::IO_ERROR,
                }
            }
        }
    }

    fn cursor_insert(&mut self, cursor: CursorId, key: &[u8], record: &[u8]) -> Status {
        let Some(txn) = self.cursors.get(&cursor).map(|c| c.txn) else {
            return Status::INV_PARAMETER;
        };
        let st = self.insert(txn, key, record);
        if st.is_ok() {
            if let Some(c) = self.cursors.get_mut(&cursor) {
                c.pos = Some(key.to_vec());
            }
        }
        st
    }

    fn cursor_erase(&mut self, cursor: CursorId, key: &[u8]) -> Status {
        let Some(txn) = self.cursors.get(&cursor).map(|c| c.txn) else {
            return Status::INV_PARAMETER;
        };
        let st = self.erase(txn, key);
        if st.is_ok() {
            if let Some(c) = self.cursors.get_mut(&cursor) {
                c.pos = None;
            }
        }
        st
    }

    fn cursor_find(&mut self, cursor: CursorId, key: &[u8], record: &mut Vec<u8>) -> Status {
        let Some(txn) = self.cursors.get(&cursor).map(|c| c.txn) else {
            return Status::INV_PARAMETER;
        };
        let st = self.find(txn, key, record);
        if st.is_ok() {
            if let Some(c) = self.cursors.get_mut(&cursor) {
                c.pos = Some(key.to_vec());
            }
        }
        st
    }

    fn get_next(
        &mut self,
        cursor: CursorId,
        key: &mut Vec<u8>,
        record: &mut Vec<u8>,
        _skip_duplicates: bool,
    ) -> Status {
        let Some((txn, pos)) = self.cursors.get(&cursor).map(|c| (c.txn, c.pos.clone())) else {
            return Status::INV_PARAMETER;
        };
        let Some(db) = self.db.as_ref() else {
            return Status::NOT_READY;
        };
        let st = match (txn, self.wtxn.as_ref()) {
            (Some(id), Some((open_id, wtxn))) if id == *open_id => {
                match wtxn.open_table(TABLE) {
                    Ok(table) => table_step(&table, &pos, true, key, record),
                    Err(TableError::TableDoesNotExist(_)) => Status::KEY_NOT_FOUND,
                    Err(_) => Status::IO_ERROR,
                }
            }
            (Some(_), _) => Status::INV_PARAMETER,
            (None, _) => match db.begin_read() {
                Ok(rtxn) => match rtxn.open_table(TABLE) {
                    Ok(table) => table_step(&table, &pos, true, key, record),
                    Err(TableError::TableDoesNotExist(_)) => Status::KEY_NOT_FOUND,
                    Err(_) => Status::IO_ERROR,
                },
                Err(_) => Status::IO_ERROR,
            },
        };
        if st.is_ok() {
            if let Some(c) = self.cursors.get_mut(&cursor) {
                c.pos = Some(key.clone());
            }
        }
        st
    }

    fn get_previous(
        &mut self,
        cursor: CursorId,
        key: &mut Vec<u8>,
        record: &mut Vec<u8>,
    ) -> Status {
        let Some((txn, pos)) = self.cursors.get(&cursor).map(|c| (c.txn, c.pos.clone())) else {
            return Status::INV_PARAMETER;
        };
        let Some(db) = self.db.as_ref() else {
            return Status::NOT_READY;
        };
        let st = match (txn, self.wtxn.as_ref()) {
            (Some(id), Some((open_id, wtxn))) if id == *open_id => {
                match wtxn.open_table(TABLE) {
                    Ok(table) => table_step(&table, &pos, false, key, record),
                    Err(TableError::TableDoesNotExist(_)) => Status::KEY_NOT_FOUND,
                    Err(_) => Status::IO_ERROR,
                }
            }
            (Some(_), _) => Status::INV_PARAMETER,
            (None, _) => match db.begin_read() {
                Ok(rtxn) => match rtxn.open_table(TABLE) {
                    Ok(table) => table_step(&table, &pos, false, key, record),
                    Err(TableError::TableDoesNotExist(_)) => Status::KEY_NOT_FOUND,
                    Err(_) => Status::IO_ERROR,
                },
                Err(_) => Status::IO_ERROR,
            },
        };
        if st.is_ok() {
            if let Some(c) = self.cursors.get_mut(&cursor) {
                c.pos = Some(key.clone());
            }
        }
        st
    }

    fn check_integrity(&mut self) -> Status {
        if self.wtxn.is_some() {
            // redb cannot check with a live write transaction
            return Status::OK;
        }
        match self.db.as_mut() {
            Some(db) => match db.check_integrity() {
                Ok(true) => Status::OK,
                Ok(false) => Status::INTEGRITY_VIOLATED,
                Err(_) => Status::IO_ERROR,
            },
            None => Status::NOT_READY,
        }
    }
}
