//! Lock-step differential runs: identical back-ends never diverge, broken
//! back-ends are caught at the first differing line.

use std::sync::Arc;
use std::time::Instant;

use crate::config::{Config, DistributionKind, FullcheckMode, KeyType, TxnMode};
use crate::engine::{CursorId, KvEngine, MemoryEngine, Status, TxnId};
use crate::error::{DivergenceKind, Error};
use crate::generator::{RuntimeGenerator, ScriptSource};
use crate::metric::OpKind;
use crate::Controller;

/// Delegates everything to a [`MemoryEngine`] so a test double only has to
/// override the operation it sabotages.
macro_rules! delegate_engine {
    ($inner:ident) => {
        fn create_env(&mut self) -> Status {
            self.$inner.create_env()
        }
        fn open_env(&mut self) -> Status {
            self.$inner.open_env()
        }
        fn close_env(&mut self) -> Status {
            self.$inner.close_env()
        }
        fn create_db(&mut self, id: u32) -> Status {
            self.$inner.create_db(id)
        }
        fn open_db(&mut self, id: u32) -> Status {
            self.$inner.open_db(id)
        }
        fn close_db(&mut self) -> Status {
            self.$inner.close_db()
        }
        fn txn_begin(&mut self) -> (Status, Option<TxnId>) {
            self.$inner.txn_begin()
        }
        fn txn_commit(&mut self, txn: TxnId) -> Status {
            self.$inner.txn_commit(txn)
        }
        fn txn_abort(&mut self, txn: TxnId) -> Status {
            self.$inner.txn_abort(txn)
        }
        fn cursor_create(&mut self, txn: Option<TxnId>) -> (Status, Option<CursorId>) {
            self.$inner.cursor_create(txn)
        }
        fn cursor_close(&mut self, cursor: CursorId) -> Status {
            self.$inner.cursor_close(cursor)
        }
        fn cursor_insert(&mut self, cursor: CursorId, key: &[u8], record: &[u8]) -> Status {
            self.$inner.cursor_insert(cursor, key, record)
        }
        fn cursor_erase(&mut self, cursor: CursorId, key: &[u8]) -> Status {
            self.$inner.cursor_erase(cursor, key)
        }
        fn cursor_find(&mut self, cursor: CursorId, key: &[u8], record: &mut Vec<u8>) -> Status {
            self.$inner.cursor_find(cursor, key, record)
        }
        fn get_next(
            &mut self,
            cursor: CursorId,
            key: &mut Vec<u8>,
            record: &mut Vec<u8>,
            skip_duplicates: bool,
        ) -> Status {
            self.$inner.get_next(cursor, key, record, skip_duplicates)
        }
        fn get_previous(
            &mut self,
            cursor: CursorId,
            key: &mut Vec<u8>,
            record: &mut Vec<u8>,
        ) -> Status {
            self.$inner.get_previous(cursor, key, record)
        }
        fn check_integrity(&mut self) -> Status {
            self.$inner.check_integrity()
        }
    };
}

/// Reports a successful erase without erasing anything.
#[derive(Default)]
struct NoopEraseEngine {
    inner: MemoryEngine,
}

impl KvEngine for NoopEraseEngine {
    fn name(&self) -> &'static str {
        "noop-erase"
    }

    fn insert(&mut self, txn: Option<TxnId>, key: &[u8], record: &[u8]) -> Status {
        self.inner.insert(txn, key, record)
    }

    fn erase(&mut self, _txn: Option<TxnId>, key: &[u8]) -> Status {
        let mut sink = Vec::new();
        self.inner.find(None, key, &mut sink)
    }

    fn find(&mut self, txn: Option<TxnId>, key: &[u8], record: &mut Vec<u8>) -> Status {
        self.inner.find(txn, key, record)
    }

    delegate_engine!(inner);
}

/// Claims success when erasing keys that do not exist.
#[derive(Default)]
struct LenientEraseEngine {
    inner: MemoryEngine,
}

impl KvEngine for LenientEraseEngine {
    fn name(&self) -> &'static str {
        "lenient-erase"
    }

    fn insert(&mut self, txn: Option<TxnId>, key: &[u8], record: &[u8]) -> Status {
        self.inner.insert(txn, key, record)
    }

    fn erase(&mut self, txn: Option<TxnId>, key: &[u8]) -> Status {
        match self.inner.erase(txn, key) {
            Status::KEY_NOT_FOUND => Status::OK,
            st => st,
        }
    }

    fn find(&mut self, txn: Option<TxnId>, key: &[u8], record: &mut Vec<u8>) -> Status {
        self.inner.find(txn, key, record)
    }

    delegate_engine!(inner);
}

/// Appends a junk byte to every record it returns from find.
#[derive(Default)]
struct CorruptFindEngine {
    inner: MemoryEngine,
}

impl KvEngine for CorruptFindEngine {
    fn name(&self) -> &'static str {
        "corrupt-find"
    }

    fn insert(&mut self, txn: Option<TxnId>, key: &[u8], record: &[u8]) -> Status {
        self.inner.insert(txn, key, record)
    }

    fn erase(&mut self, txn: Option<TxnId>, key: &[u8]) -> Status {
        self.inner.erase(txn, key)
    }

    fn find(&mut self, txn: Option<TxnId>, key: &[u8], record: &mut Vec<u8>) -> Status {
        let st = self.inner.find(txn, key, record);
        if st.is_ok() {
            record.push(0xaa);
        }
        st
    }

    delegate_engine!(inner);
}

fn run_script(
    conf: Config,
    script: &str,
    engines: Vec<Box<dyn KvEngine>>,
) -> Result<crate::RunOutcome, Error> {
    let conf = Arc::new(conf);
    let source = ScriptSource::from_reader(conf.clone(), script.as_bytes()).unwrap();
    Controller::new(conf, Box::new(source), engines).run()
}

#[test]
fn identical_engines_never_diverge() {
    let mut conf = Config::default();
    conf.seed(7)
        .key_type(KeyType::Uint32)
        .distribution(DistributionKind::Random)
        .erase_pct(10)
        .find_pct(40)
        .txn_mode(TxnMode::EveryNth(7))
        .rec_size(32)
        .limit_ops(3000);
    let conf = Arc::new(conf);

    let engines: Vec<Box<dyn KvEngine>> = vec![
        Box::new(MemoryEngine::new()),
        Box::new(MemoryEngine::new()),
    ];
    let source = RuntimeGenerator::new(conf.clone()).unwrap();
    let outcome = Controller::new(conf, Box::new(source), engines)
        .run()
        .unwrap();

    // every processed line lands in exactly one metric bucket
    for (_, metrics) in &outcome.per_worker {
        let counted = metrics.bucket(OpKind::Insert).count
            + metrics.bucket(OpKind::Erase).count
            + metrics.bucket(OpKind::Find).count
            + metrics.bucket(OpKind::TxnCommit).count
            + metrics.other_ops;
        assert_eq!(counted, outcome.lines);
    }
}

#[test]
fn cursor_mode_matches_plain_mode_results() {
    let mut conf = Config::default();
    conf.seed(19)
        .key_type(KeyType::Uint16)
        .distribution(DistributionKind::Random)
        .erase_pct(25)
        .find_pct(25)
        .use_cursors(true)
        .rec_size(16)
        .limit_ops(800);
    let conf = Arc::new(conf);

    let engines: Vec<Box<dyn KvEngine>> = vec![
        Box::new(MemoryEngine::new()),
        Box::new(MemoryEngine::new()),
    ];
    let source = RuntimeGenerator::new(conf.clone()).unwrap();
    Controller::new(conf, Box::new(source), engines)
        .run()
        .unwrap();
}

#[test]
fn fullcheck_passes_in_every_mode() {
    for mode in [
        FullcheckMode::Forward,
        FullcheckMode::Backwards,
        FullcheckMode::Find,
    ] {
        let mut conf = Config::default();
        conf.key_type(KeyType::Uint32).fullcheck(mode);
        let outcome = run_script(
            conf,
            "CREATE\n\
             INSERT (0, 1, 16)\n\
             INSERT (0, 2, 16)\n\
             INSERT (0, 3, 16)\n\
             FULLCHECK\n\
             CLOSE\n",
            vec![
                Box::new(MemoryEngine::new()),
                Box::new(MemoryEngine::new()),
            ],
        )
        .unwrap();
        assert_eq!(outcome.lines, 6);
    }
}

#[test]
fn noop_erase_is_caught_by_fullcheck() {
    let mut conf = Config::default();
    conf.key_type(KeyType::Uint32);
    let err = run_script(
        conf,
        "CREATE\n\
         INSERT (0, 1, 16)\n\
         INSERT (0, 2, 16)\n\
         ERASE (0, 1)\n\
         FULLCHECK\n\
         CLOSE\n",
        vec![
            Box::new(MemoryEngine::new()),
            Box::new(NoopEraseEngine::default()),
        ],
    )
    .unwrap_err();

    match err {
        Error::Divergence { line, kind } => {
            assert_eq!(line, 5);
            assert!(matches!(kind, DivergenceKind::Record | DivergenceKind::Key));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn status_divergence_stops_at_the_first_line() {
    let mut conf = Config::default();
    conf.key_type(KeyType::Uint32);
    let err = run_script(
        conf,
        "CREATE\n\
         ERASE (0, 99)\n\
         CLOSE\n",
        vec![
            Box::new(MemoryEngine::new()),
            Box::new(LenientEraseEngine::default()),
        ],
    )
    .unwrap_err();

    match err {
        Error::Divergence { line, kind } => {
            assert_eq!(line, 2);
            assert_eq!(kind, DivergenceKind::Status);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn record_divergence_on_find() {
    let mut conf = Config::default();
    conf.key_type(KeyType::Uint32);
    let err = run_script(
        conf,
        "CREATE\n\
         INSERT (0, 5, 16)\n\
         FIND (0, 5)\n\
         CLOSE\n",
        vec![
            Box::new(MemoryEngine::new()),
            Box::new(CorruptFindEngine::default()),
        ],
    )
    .unwrap_err();

    match err {
        Error::Divergence { line, kind } => {
            assert_eq!(line, 3);
            assert_eq!(kind, DivergenceKind::Record);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn reopen_runs_open_fullcheck_close() {
    let mut conf = Config::default();
    conf.seed(3)
        .key_type(KeyType::Uint64)
        .distribution(DistributionKind::Ascending)
        .rec_size(16)
        .limit_ops(50)
        .reopen(true);
    let conf = Arc::new(conf);

    let engines: Vec<Box<dyn KvEngine>> = vec![
        Box::new(MemoryEngine::new()),
        Box::new(MemoryEngine::new()),
    ];
    let source = RuntimeGenerator::new(conf.clone()).unwrap();
    let outcome = Controller::new(conf, Box::new(source), engines)
        .run()
        .unwrap();
    // create + payload + close, then open/fullcheck/close
    assert_eq!(outcome.lines, 51 + 3);
}

#[test]
fn time_limit_terminates_the_run() {
    let mut conf = Config::default();
    conf.seed(5)
        .key_type(KeyType::Uint64)
        .distribution(DistributionKind::Random)
        .rec_size(16)
        .limit_seconds(1);
    let conf = Arc::new(conf);

    let engines: Vec<Box<dyn KvEngine>> = vec![Box::new(MemoryEngine::new())];
    let source = RuntimeGenerator::new(conf.clone()).unwrap();
    let start = Instant::now();
    Controller::new(conf, Box::new(source), engines)
        .run()
        .unwrap();
    let elapsed = start.elapsed().as_secs_f64();
    assert!(elapsed >= 1.0, "stopped too early: {elapsed}");
    assert!(elapsed < 10.0, "stopped too late: {elapsed}");
}

#[test]
fn single_worker_sanity() {
    let mut conf = Config::default();
    conf.key_type(KeyType::Binary).key_size(8);
    let outcome = run_script(
        conf,
        "CREATE\n\
         BEGIN_TXN\n\
         INSERT (0, aaaa, 32)\n\
         FIND (0, aaaa)\n\
         CLOSE_TXN\n\
         FULLCHECK\n\
         CLOSE\n",
        vec![Box::new(MemoryEngine::new())],
    )
    .unwrap();
    assert_eq!(outcome.lines, 7);
    let metrics = &outcome.per_worker[0].1;
    assert_eq!(metrics.bucket(OpKind::Insert).count, 1);
    assert_eq!(metrics.bucket(OpKind::Find).count, 1);
    assert_eq!(metrics.bucket(OpKind::TxnCommit).count, 1);
}
