//! Synthesize → tee → replay must reproduce the per-operation status
//! sequence against the same back-end.

use std::sync::{Arc, Mutex};

use crate::config::{Config, DistributionKind, KeyType, TxnMode};
use crate::engine::{KvEngine, MemoryEngine, Status};
use crate::generator::{CommandSource, Feedback, RuntimeGenerator, ScriptSource};
use crate::worker::Worker;

fn drive(conf: &Arc<Config>, mut source: Box<dyn CommandSource>) -> (u64, Vec<Status>) {
    let engine: Arc<Mutex<Box<dyn KvEngine>>> =
        Arc::new(Mutex::new(Box::new(MemoryEngine::new())));
    let mut worker = Worker::new(0, conf.clone(), engine);
    let mut feedback = Feedback::default();
    let mut statuses = Vec::new();
    let mut lines = 0;

    while let Some(cmd) = source.next_command(&feedback) {
        lines += 1;
        worker.execute(&cmd);
        let outcome = worker.outcome();
        assert!(outcome.success, "worker failed at line {lines}");
        statuses.push(outcome.status);
        feedback.insert_bytes = outcome.insert_bytes;
    }
    (lines, statuses)
}

fn roundtrip_conf(key_type: KeyType) -> Config {
    let mut conf = Config::default();
    conf.seed(42)
        .key_type(key_type)
        .key_size(10)
        .distribution(DistributionKind::Random)
        .erase_pct(15)
        .find_pct(35)
        .txn_mode(TxnMode::EveryNth(5))
        .rec_size(24)
        .limit_ops(500);
    conf
}

fn check_roundtrip(key_type: KeyType) {
    let dir = tempfile::tempdir().unwrap();
    let trace = dir.path().join("trace.txt");

    let mut conf = roundtrip_conf(key_type);
    conf.tee_file(&trace);
    let conf = Arc::new(conf);

    let generator = RuntimeGenerator::new(conf.clone()).unwrap();
    let (gen_lines, gen_statuses) = drive(&conf, Box::new(generator));

    let replay_conf = Arc::new(roundtrip_conf(key_type));
    let source = ScriptSource::from_path(replay_conf.clone(), &trace).unwrap();
    assert_eq!(source.max_lines(), gen_lines);
    let (replay_lines, replay_statuses) = drive(&replay_conf, Box::new(source));

    assert_eq!(replay_lines, gen_lines);
    assert_eq!(replay_statuses, gen_statuses);
}

#[test]
fn numeric_trace_replays_identically() {
    check_roundtrip(KeyType::Uint32);
}

#[test]
fn binary_trace_replays_identically() {
    check_roundtrip(KeyType::Binary);
}

#[test]
fn teed_trace_is_line_per_command() {
    let dir = tempfile::tempdir().unwrap();
    let trace = dir.path().join("trace.txt");

    let mut conf = roundtrip_conf(KeyType::Uint16);
    conf.tee_file(&trace);
    let conf = Arc::new(conf);

    let generator = RuntimeGenerator::new(conf.clone()).unwrap();
    let (lines, _) = drive(&conf, Box::new(generator));

    let text = std::fs::read_to_string(&trace).unwrap();
    assert_eq!(text.lines().count() as u64, lines);
    assert!(text.starts_with("CREATE"));
    assert!(text.trim_end().ends_with("CLOSE"));
}
