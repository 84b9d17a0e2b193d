//! Ordered in-memory reference engine.
//!
//! Transactions keep an undo log: operations apply to the tree immediately,
//! commit discards the log, abort replays it in reverse. Cursors remember
//! the last key they stood on and step with range queries, so they stay
//! valid across interleaved mutations.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use super::{CursorId, KvEngine, Status, TxnId};

enum UndoOp {
    /// Key did not exist before; remove it on abort.
    Remove(Vec<u8>),
    /// Key existed with this value; restore it on abort.
    Reinsert(Vec<u8>, Vec<u8>),
}

struct CursorState {
    txn: Option<TxnId>,
    pos: Option<Vec<u8>>,
}

#[derive(Default)]
pub struct MemoryEngine {
    env_open: bool,
    db_open: bool,
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    txns: HashMap<TxnId, Vec<UndoOp>>,
    cursors: HashMap<CursorId, CursorState>,
    next_txn: u64,
    next_cursor: u64,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn ready(&self) -> bool {
        self.env_open && self.db_open
    }

    fn push_undo(&mut self, txn: Option<TxnId>, op: UndoOp) {
        if let Some(t) = txn {
            if let Some(log) = self.txns.get_mut(&t) {
                log.push(op);
            }
        }
    }

    fn insert_impl(&mut self, txn: Option<TxnId>, key: &[u8], record: &[u8]) -> Status {
        if !self.ready() {
            return Status::NOT_READY;
        }
        if self.data.contains_key(key) {
            return Status::DUPLICATE_KEY;
        }
        self.data.insert(key.to_vec(), record.to_vec());
        self.push_undo(txn, UndoOp::Remove(key.to_vec()));
        Status::OK
    }

    fn erase_impl(&mut self, txn: Option<TxnId>, key: &[u8]) -> Status {
        if !self.ready() {
            return Status::NOT_READY;
        }
        match self.data.remove(key) {
            Some(old) => {
                self.push_undo(txn, UndoOp::Reinsert(key.to_vec(), old));
                Status::OK
            }
            None => Status::KEY_NOT_FOUND,
        }
    }

    fn find_impl(&mut self, key: &[u8], record: &mut Vec<u8>) -> Status {
        if !self.ready() {
            return Status::NOT_READY;
        }
        record.clear();
        match self.data.get(key) {
            Some(value) => {
                record.extend_from_slice(value);
                Status::OK
            }
            None => Status::KEY_NOT_FOUND,
        }
    }
}

impl KvEngine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn create_env(&mut self) -> Status {
        self.env_open = true;
        Status::OK
    }

    fn open_env(&mut self) -> Status {
        self.env_open = true;
        Status::OK
    }

    fn close_env(&mut self) -> Status {
        self.env_open = false;
        Status::OK
    }

    fn create_db(&mut self, _id: u32) -> Status {
        if !self.env_open {
            self.env_open = true;
        }
        self.data.clear();
        self.db_open = true;
        Status::OK
    }

    fn open_db(&mut self, _id: u32) -> Status {
        if !self.env_open {
            self.env_open = true;
        }
        self.db_open = true;
        Status::OK
    }

    fn close_db(&mut self) -> Status {
        if !self.db_open {
            return Status::NOT_READY;
        }
        self.db_open = false;
        self.cursors.clear();
        Status::OK
    }

    fn txn_begin(&mut self) -> (Status, Option<TxnId>) {
        if !self.ready() {
            return (Status::NOT_READY, None);
        }
        let id = TxnId(self.next_txn);
        self.next_txn += 1;
        self.txns.insert(id, Vec::new());
        (Status::OK, Some(id))
    }

    fn txn_commit(&mut self, txn: TxnId) -> Status {
        match self.txns.remove(&txn) {
            Some(_) => Status::OK,
            None => Status::INV_PARAMETER,
        }
    }

    fn txn_abort(&mut self, txn: TxnId) -> Status {
        let Some(log) = self.txns.remove(&txn) else {
            return Status::INV_PARAMETER;
        };
        for op in log.into_iter().rev() {
            match op {
                UndoOp::Remove(key) => {
                    self.data.remove(&key);
                }
                UndoOp::Reinsert(key, value) => {
                    self.data.insert(key, value);
                }
            }
        }
        Status::OK
    }

    fn cursor_create(&mut self, txn: Option<TxnId>) -> (Status, Option<CursorId>) {
        if !self.ready() {
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
        self.insert_impl(txn, key, record)
    }

    fn erase(&mut self, txn: Option<TxnId>, key: &[u8]) -> Status {
        self.erase_impl(txn, key)
    }

    fn find(&mut self, _txn: Option<TxnId>, key: &[u8], record: &mut Vec<u8>) -> Status {
        self.find_impl(key, record)
    }

    fn cursor_insert(&mut self, cursor: CursorId, key: &[u8], record: &[u8]) -> Status {
        let Some(txn) = self.cursors.get(&cursor).map(|c| c.txn) else {
            return Status::INV_PARAMETER;
        };
        let st = self.insert_impl(txn, key, record);
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
        let st = self.erase_impl(txn, key);
        if st.is_ok() {
            if let Some(c) = self.cursors.get_mut(&cursor) {
                c.pos = None;
            }
        }
        st
    }

    fn cursor_find(&mut self, cursor: CursorId, key: &[u8], record: &mut Vec<u8>) -> Status {
        if !self.cursors.contains_key(&cursor) {
            return Status::INV_PARAMETER;
        }
        let st = self.find_impl(key, record);
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
        if !self.ready() {
            return Status::NOT_READY;
        }
        let Some(pos) = self.cursors.get(&cursor).map(|c| c.pos.clone()) else {
            return Status::INV_PARAMETER;
        };
        let lower = match &pos {
            Some(p) => Bound::Excluded(p.clone()),
            None => Bound::Unbounded,
        };
        match self.data.range((lower, Bound::Unbounded)).next() {
            Some((k, v)) => {
                key.clear();
                key.extend_from_slice(k);
                record.clear();
                record.extend_from_slice(v);
                let k = k.clone();
                if let Some(c) = self.cursors.get_mut(&cursor) {
                    c.pos = Some(k);
                }
                Status::OK
            }
            None => Status::KEY_NOT_FOUND,
        }
    }

    fn get_previous(
        &mut self,
        cursor: CursorId,
        key: &mut Vec<u8>,
        record: &mut Vec<u8>,
    ) -> Status {
        if !self.ready() {
            return Status::NOT_READY;
        }
        let Some(pos) = self.cursors.get(&cursor).map(|c| c.pos.clone()) else {
            return Status::INV_PARAMETER;
        };
        let upper = match &pos {
            Some(p) => Bound::Excluded(p.clone()),
            None => Bound::Unbounded,
        };
        match self
            .data
            .range((Bound::Unbounded, upper))
            .next_back()
        {
            Some((k, v)) => {
                key.clear();
                key.extend_from_slice(k);
                record.clear();
                record.extend_from_slice(v);
                let k = k.clone();
                if let Some(c) = self.cursors.get_mut(&cursor) {
                    c.pos = Some(k);
                }
                Status::OK
            }
            None => Status::KEY_NOT_FOUND,
        }
    }

    fn check_integrity(&mut self) -> Status {
        if !self.ready() {
            return Status::NOT_READY;
        }
        // BTreeMap keeps its own ordering invariant; verify it anyway so a
        // broken comparator in a future key wrapper cannot slip through.
        let mut prev: Option<&Vec<u8>> = None;
        for k in self.data.keys() {
            if let Some(p) = prev {
                if p >= k {
                    return Status::INTEGRITY_VIOLATED;
                }
            }
            prev = Some(k);
        }
        Status::OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_engine() -> MemoryEngine {
        let mut engine = MemoryEngine::new();
        assert!(engine.create_env().is_ok());
        assert!(engine.create_db(0).is_ok());
        engine
    }

    #[test]
    fn insert_find_erase_roundtrip() {
        let mut engine = ready_engine();
        assert_eq!(engine.insert(None, b"a", b"1"), Status::OK);
        assert_eq!(engine.insert(None, b"a", b"2"), Status::DUPLICATE_KEY);

        let mut rec = Vec::new();
        assert_eq!(engine.find(None, b"a", &mut rec), Status::OK);
        assert_eq!(rec, b"1");
        assert_eq!(engine.find(None, b"b", &mut rec), Status::KEY_NOT_FOUND);

        assert_eq!(engine.erase(None, b"a"), Status::OK);
        assert_eq!(engine.erase(None, b"a"), Status::KEY_NOT_FOUND);
    }

    #[test]
    fn abort_rolls_back_both_directions() {
        let mut engine = ready_engine();
        assert_eq!(engine.insert(None, b"keep", b"old"), Status::OK);

        let (st, txn) = engine.txn_begin();
        assert!(st.is_ok());
        let txn = txn.unwrap();
        assert_eq!(engine.insert(Some(txn), b"new", b"x"), Status::OK);
        assert_eq!(engine.erase(Some(txn), b"keep"), Status::OK);
        assert_eq!(engine.txn_abort(txn), Status::OK);

        let mut rec = Vec::new();
        assert_eq!(engine.find(None, b"new", &mut rec), Status::KEY_NOT_FOUND);
        assert_eq!(engine.find(None, b"keep", &mut rec), Status::OK);
        assert_eq!(rec, b"old");
    }

    #[test]
    fn commit_keeps_changes() {
        let mut engine = ready_engine();
        let (_, txn) = engine.txn_begin();
        let txn = txn.unwrap();
        assert_eq!(engine.insert(Some(txn), b"k", b"v"), Status::OK);
        assert_eq!(engine.txn_commit(txn), Status::OK);

        let mut rec = Vec::new();
        assert_eq!(engine.find(None, b"k", &mut rec), Status::OK);
    }

    #[test]
    fn cursor_walks_in_order() {
        let mut engine = ready_engine();
        for k in [b"b" as &[u8], b"a", b"c"] {
            assert_eq!(engine.insert(None, k, b"v"), Status::OK);
        }
        let (_, cursor) = engine.cursor_create(None);
        let cursor = cursor.unwrap();

        let (mut key, mut rec) = (Vec::new(), Vec::new());
        let mut seen = Vec::new();
        while engine.get_next(cursor, &mut key, &mut rec, false).is_ok() {
            seen.push(key.clone());
        }
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(engine.cursor_close(cursor), Status::OK);
    }

    #[test]
    fn cursor_walks_backwards() {
        let mut engine = ready_engine();
        for k in [b"1" as &[u8], b"2", b"3"] {
            assert_eq!(engine.insert(None, k, b"v"), Status::OK);
        }
        let (_, cursor) = engine.cursor_create(None);
        let cursor = cursor.unwrap();

        let (mut key, mut rec) = (Vec::new(), Vec::new());
        let mut seen = Vec::new();
        while engine.get_previous(cursor, &mut key, &mut rec).is_ok() {
            seen.push(key.clone());
        }
        assert_eq!(seen, vec![b"3".to_vec(), b"2".to_vec(), b"1".to_vec()]);
    }

    #[test]
    fn data_survives_close_open() {
        let mut engine = ready_engine();
        assert_eq!(engine.insert(None, b"k", b"v"), Status::OK);
        assert_eq!(engine.close_db(), Status::OK);
        assert_eq!(engine.open_db(0), Status::OK);

        let mut rec = Vec::new();
        assert_eq!(engine.find(None, b"k", &mut rec), Status::OK);
        assert_eq!(rec, b"v");
    }
}
