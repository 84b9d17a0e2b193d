//! One worker owns one back-end and applies commands to it.
//!
//! Workers never return errors. Each command records its status, its timing
//! bucket, and for Find a deep copy of the returned record; a status outside
//! {OK, DUPLICATE_KEY on insert, KEY_NOT_FOUND on erase/find} clears the
//! sticky `success` flag, which the controller reads after every barrier.
//! Transaction-state violations are programmer errors (a broken command
//! source) and assert.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::command::Command;
use crate::config::Config;
use crate::engine::{CursorId, KvEngine, Status, TxnId};
use crate::metric::{Metrics, OpKind};

/// Snapshot of a worker's state after a command, published to the
/// controller at the barrier.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: Status,
    pub success: bool,
    /// Deep copy of the last Find result; the adapter's buffer may be
    /// reused.
    pub record: Vec<u8>,
    pub txn: Option<TxnId>,
    /// Cumulative successfully-inserted bytes, fed back to the command
    /// source for `limit_bytes`.
    pub insert_bytes: u64,
}

impl Default for Outcome {
    fn default() -> Self {
        Self {
            status: Status::OK,
            success: true,
            record: Vec::new(),
            txn: None,
            insert_bytes: 0,
        }
    }
}

pub struct Worker {
    id: u32,
    conf: Arc<Config>,
    engine: Arc<Mutex<Box<dyn KvEngine>>>,
    engine_name: &'static str,
    txn: Option<TxnId>,
    cursor: Option<CursorId>,
    last_status: Status,
    last_record: Vec<u8>,
    success: bool,
    pub metrics: Metrics,
    start: Instant,
}

impl Worker {
    pub fn new(id: u32, conf: Arc<Config>, engine: Arc<Mutex<Box<dyn KvEngine>>>) -> Self {
        let engine_name = engine.lock().unwrap().name();
        Self {
            id,
            conf,
            engine,
            engine_name,
            txn: None,
            cursor: None,
            last_status: Status::OK,
            last_record: Vec::new(),
            success: true,
            metrics: Metrics::default(),
            start: Instant::now(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine_name
    }

    pub fn outcome(&self) -> Outcome {
        Outcome {
            status: self.last_status,
            success: self.success,
            record: self.last_record.clone(),
            txn: self.txn,
            insert_bytes: self.metrics.bucket(OpKind::Insert).bytes,
        }
    }

    pub fn execute(&mut self, cmd: &Command) {
        match cmd {
            Command::Create => self.create(),
            Command::Open => self.open(),
            Command::Close => self.close(),
            Command::Insert { key, record } => self.insert(key, record),
            Command::Erase { key } => self.erase(key),
            Command::Find { key } => self.find(key),
            Command::TxnBegin => self.txn_begin(),
            Command::TxnCommit => self.txn_commit(),
            Command::TxnAbort => self.txn_abort(),
            // the controller performs the cross-engine comparison
            Command::Fullcheck | Command::Flush | Command::Nop => {}
        }
    }

    fn create(&mut self) {
        let mut engine = self.engine.lock().unwrap();
        self.last_status = engine.create_db(self.id);
        if self.conf.use_cursors {
            let (_, cursor) = engine.cursor_create(self.txn);
            self.cursor = cursor;
        }
        drop(engine);

        if !self.last_status.is_ok() {
            self.fail();
        }
        self.metrics.other_ops += 1;
    }

    fn open(&mut self) {
        let mut engine = self.engine.lock().unwrap();
        self.last_status = engine.open_db(self.id);
        if self.conf.use_cursors {
            let (_, cursor) = engine.cursor_create(self.txn);
            self.cursor = cursor;
        }
        drop(engine);

        if !self.last_status.is_ok() {
            self.fail();
        }
        self.metrics.other_ops += 1;
    }

    fn close(&mut self) {
        // a trace may close with a transaction still open; commit it so the
        // back-ends stay comparable
        if self.txn.is_some() {
            self.txn_commit();
        }

        let mut engine = self.engine.lock().unwrap();
        if let Some(cursor) = self.cursor.take() {
            engine.cursor_close(cursor);
        }
        self.last_status = engine.close_db();
        drop(engine);

        if !self.last_status.is_ok() {
            self.fail();
        }
        self.metrics.other_ops += 1;
        self.metrics.elapsed_wallclock_seconds = self.start.elapsed().as_secs_f64();
    }

    fn insert(&mut self, key: &[u8], record: &[u8]) {
        let mut engine = self.engine.lock().unwrap();
        let timer = Instant::now();
        self.last_status = match self.cursor {
            Some(cursor) => engine.cursor_insert(cursor, key, record),
            None => engine.insert(self.txn, key, record),
        };
        let elapsed = timer.elapsed();
        drop(engine);

        self.metrics.bucket_mut(OpKind::Insert).record_latency(elapsed);
        if !self.last_status.is_ok() && self.last_status != Status::DUPLICATE_KEY {
            self.fail();
        }
        if self.last_status.is_ok() {
            self.metrics
                .bucket_mut(OpKind::Insert)
                .add_bytes((key.len() + record.len()) as u64);
        }
    }

    fn erase(&mut self, key: &[u8]) {
        let mut engine = self.engine.lock().unwrap();
        let timer = Instant::now();
        self.last_status = match self.cursor {
            Some(cursor) => engine.cursor_erase(cursor, key),
            None => engine.erase(self.txn, key),
        };
        let elapsed = timer.elapsed();
        drop(engine);

        self.metrics.bucket_mut(OpKind::Erase).record_latency(elapsed);
        if !self.last_status.is_ok() && self.last_status != Status::KEY_NOT_FOUND {
            self.fail();
        }
    }

    fn find(&mut self, key: &[u8]) {
        self.last_record.clear();
        let mut engine = self.engine.lock().unwrap();
        let timer = Instant::now();
        self.last_status = match self.cursor {
            Some(cursor) => engine.cursor_find(cursor, key, &mut self.last_record),
            None => engine.find(self.txn, key, &mut self.last_record),
        };
        let elapsed = timer.elapsed();
        drop(engine);

        self.metrics.bucket_mut(OpKind::Find).record_latency(elapsed);
        if !self.last_status.is_ok() && self.last_status != Status::KEY_NOT_FOUND {
            self.fail();
        }
        self.metrics
            .bucket_mut(OpKind::Find)
            .add_bytes(self.last_record.len() as u64);
    }

    fn txn_begin(&mut self) {
        assert!(self.txn.is_none(), "transaction already open");

        let mut engine = self.engine.lock().unwrap();
        if let Some(cursor) = self.cursor.take() {
            engine.cursor_close(cursor);
        }
        let (status, txn) = engine.txn_begin();
        self.txn = txn;
        if self.conf.use_cursors {
            let (_, cursor) = engine.cursor_create(self.txn);
            self.cursor = cursor;
        }
        drop(engine);

        if !status.is_ok() {
            self.last_status = status;
            self.fail();
        }
        self.metrics.other_ops += 1;
    }

    fn txn_commit(&mut self) {
        let txn = self.txn.take().expect("no open transaction");

        let mut engine = self.engine.lock().unwrap();
        if let Some(cursor) = self.cursor.take() {
            engine.cursor_close(cursor);
        }
        let timer = Instant::now();
        self.last_status = engine.txn_commit(txn);
        let elapsed = timer.elapsed();
        drop(engine);

        self.metrics
            .bucket_mut(OpKind::TxnCommit)
            .record_latency(elapsed);
        if !self.last_status.is_ok() {
            self.fail();
        }
    }

    fn txn_abort(&mut self) {
        let txn = self.txn.take().expect("no open transaction");

        let mut engine = self.engine.lock().unwrap();
        if let Some(cursor) = self.cursor.take() {
            engine.cursor_close(cursor);
        }
        self.last_status = engine.txn_abort(txn);
        drop(engine);

        if !self.last_status.is_ok() {
            self.fail();
        }
        self.metrics.other_ops += 1;
    }

    fn fail(&mut self) {
        if self.success {
            tracing::error!(
                worker = self.id,
                engine = self.engine_name,
                status = %self.last_status,
                "fatal back-end status"
            );
        }
        self.success = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;

    fn worker_with(conf: Config) -> Worker {
        let engine: Arc<Mutex<Box<dyn KvEngine>>> =
            Arc::new(Mutex::new(Box::new(MemoryEngine::new())));
        Worker::new(0, Arc::new(conf), engine)
    }

    fn insert_cmd(key: &[u8], record: &[u8]) -> Command {
        Command::Insert {
            key: key.to_vec(),
            record: record.to_vec(),
        }
    }

    #[test]
    fn duplicate_insert_is_not_a_failure() {
        let mut worker = worker_with(Config::default());
        worker.execute(&Command::Create);
        worker.execute(&insert_cmd(b"k", b"v"));
        worker.execute(&insert_cmd(b"k", b"v"));

        let outcome = worker.outcome();
        assert_eq!(outcome.status, Status::DUPLICATE_KEY);
        assert!(outcome.success);
        assert_eq!(worker.metrics.bucket(OpKind::Insert).count, 2);
        // only the first insert contributes bytes
        assert_eq!(worker.metrics.bucket(OpKind::Insert).bytes, 2);
    }

    #[test]
    fn missing_key_on_find_and_erase_is_benign() {
        let mut worker = worker_with(Config::default());
        worker.execute(&Command::Create);
        worker.execute(&Command::Find { key: b"nope".to_vec() });
        assert_eq!(worker.outcome().status, Status::KEY_NOT_FOUND);
        worker.execute(&Command::Erase { key: b"nope".to_vec() });
        assert_eq!(worker.outcome().status, Status::KEY_NOT_FOUND);
        assert!(worker.outcome().success);
    }

    #[test]
    fn find_keeps_a_deep_copy() {
        let mut worker = worker_with(Config::default());
        worker.execute(&Command::Create);
        worker.execute(&insert_cmd(b"k", b"payload"));
        worker.execute(&Command::Find { key: b"k".to_vec() });
        assert_eq!(worker.outcome().record, b"payload");
    }

    #[test]
    fn txn_abort_discards_writes() {
        let mut worker = worker_with(Config::default());
        worker.execute(&Command::Create);
        worker.execute(&Command::TxnBegin);
        worker.execute(&insert_cmd(b"k", b"v"));
        worker.execute(&Command::TxnAbort);
        worker.execute(&Command::Find { key: b"k".to_vec() });
        assert_eq!(worker.outcome().status, Status::KEY_NOT_FOUND);
        assert!(worker.outcome().success);
    }

    #[test]
    fn cursor_mode_reopens_cursor_per_txn() {
        let mut conf = Config::default();
        conf.use_cursors(true);
        let mut worker = worker_with(conf);
        worker.execute(&Command::Create);
        assert!(worker.cursor.is_some());

        worker.execute(&Command::TxnBegin);
        let in_txn_cursor = worker.cursor;
        assert!(in_txn_cursor.is_some());
        worker.execute(&insert_cmd(b"k", b"v"));
        worker.execute(&Command::TxnCommit);
        // the cursor bound to the committed transaction is gone
        assert!(worker.cursor.is_none());
        assert!(worker.outcome().success);
    }

    #[test]
    #[should_panic(expected = "transaction already open")]
    fn nested_txn_begin_asserts() {
        let mut worker = worker_with(Config::default());
        worker.execute(&Command::Create);
        worker.execute(&Command::TxnBegin);
        worker.execute(&Command::TxnBegin);
    }

    #[test]
    fn close_commits_open_transaction() {
        let mut worker = worker_with(Config::default());
        worker.execute(&Command::Create);
        worker.execute(&Command::TxnBegin);
        worker.execute(&insert_cmd(b"k", b"v"));
        worker.execute(&Command::Close);
        assert!(worker.outcome().success);
        assert_eq!(worker.metrics.bucket(OpKind::TxnCommit).count, 1);

        worker.execute(&Command::Open);
        worker.execute(&Command::Find { key: b"k".to_vec() });
        assert_eq!(worker.outcome().status, Status::OK);
    }
}
