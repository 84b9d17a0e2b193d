//! Lock-step driver.
//!
//! The controller owns N workers (one thread each) and a single command
//! source. Every command is dispatched to all workers, the controller waits
//! at a barrier until each worker has completed it, and then compares the
//! published outcomes: statuses always, record bytes after a successful
//! Find, and the full database contents on Fullcheck. The first divergence
//! aborts the run.
//!
//! Within one command workers run unordered; across commands every worker
//! sees the same total order. No worker observes command k+1 before all
//! workers finished command k.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::command::Command;
use crate::config::{Config, FullcheckMode};
use crate::engine::{KvEngine, Status};
use crate::error::{DivergenceKind, Error};
use crate::generator::{CommandSource, Feedback};
use crate::metric::Metrics;
use crate::progress::Progress;
use crate::worker::{Outcome, Worker};

/// How long the controller waits per barrier poll.
const BARRIER_POLL: Duration = Duration::from_micros(10);

#[derive(Debug)]
pub struct RunOutcome {
    /// Number of commands processed; equals the 1-based line number of the
    /// last command.
    pub lines: u64,
    pub per_worker: Vec<(&'static str, Metrics)>,
}

#[derive(Default)]
struct Slot {
    pending: Option<Command>,
    shutdown: bool,
    completed: u64,
    outcome: Outcome,
}

#[derive(Default)]
struct WorkerShared {
    slot: Mutex<Slot>,
    go: Condvar,
}

#[derive(Default)]
struct Signal {
    mutex: Mutex<()>,
    cond: Condvar,
}

pub struct Controller {
    conf: Arc<Config>,
    source: Box<dyn CommandSource>,
    engines: Vec<Arc<Mutex<Box<dyn KvEngine>>>>,
}

impl Controller {
    pub fn new(
        conf: Arc<Config>,
        source: Box<dyn CommandSource>,
        engines: Vec<Box<dyn KvEngine>>,
    ) -> Self {
        assert!(!engines.is_empty(), "at least one back-end is required");
        Self {
            conf,
            source,
            engines: engines
                .into_iter()
                .map(|e| Arc::new(Mutex::new(e)))
                .collect(),
        }
    }

    pub fn run(mut self) -> Result<RunOutcome, Error> {
        // the environment outlives the worker lifecycle; set it up before
        // the first command and tear it down after the last
        for engine in &self.engines {
            let mut engine = engine.lock().unwrap();
            let st = if self.conf.open {
                engine.open_env()
            } else {
                engine.create_env()
            };
            if !st.is_ok() {
                error!(engine = engine.name(), status = %st, "environment setup failed");
                return Err(Error::WorkerFailed { line: 0 });
            }
        }

        let signal = Arc::new(Signal::default());
        let mut shareds = Vec::with_capacity(self.engines.len());
        let mut handles = Vec::with_capacity(self.engines.len());

        for (i, engine) in self.engines.iter().enumerate() {
            let shared = Arc::new(WorkerShared::default());
            let worker = Worker::new(i as u32, self.conf.clone(), engine.clone());
            let thread_shared = shared.clone();
            let thread_signal = signal.clone();
            let handle = thread::Builder::new()
                .name(format!("worker-{i}"))
                .spawn(move || worker_loop(worker, thread_shared, thread_signal))
                .expect("failed to spawn worker thread");
            shareds.push(shared);
            handles.push(handle);
        }

        let result = self.drive(&shareds, &signal);

        for shared in &shareds {
            shared.slot.lock().unwrap().shutdown = true;
            shared.go.notify_one();
        }
        let mut per_worker = Vec::with_capacity(handles.len());
        for handle in handles {
            // a worker panic is a programmer error (broken command source);
            // surface it
            let worker = handle.join().expect("worker thread panicked");
            per_worker.push((worker.engine_name(), worker.metrics));
        }

        for engine in &self.engines {
            engine.lock().unwrap().close_env();
        }

        result.map(|lines| {
            info!(lines, workers = per_worker.len(), "run complete");
            RunOutcome { lines, per_worker }
        })
    }

    fn drive(
        &mut self,
        shareds: &[Arc<WorkerShared>],
        signal: &Arc<Signal>,
    ) -> Result<u64, Error> {
        let progress = Progress::new(&self.conf, self.source.len_hint());
        let start = Instant::now();
        let mut lineno: u64 = 0;
        let mut feedback = Feedback::default();

        while let Some(cmd) = self.source.next_command(&feedback) {
            lineno += 1;
            let outcomes = self.step(&cmd, lineno, shareds, signal)?;
            feedback.insert_bytes = outcomes[0].insert_bytes;
            progress.tick(lineno, feedback.insert_bytes, start.elapsed());
        }

        if self.conf.reopen {
            let mut tail = vec![Command::Open];
            if self.engines.len() > 1 {
                tail.push(Command::Fullcheck);
            }
            tail.push(Command::Close);
            for cmd in tail {
                lineno += 1;
                self.step(&cmd, lineno, shareds, signal)?;
            }
        }

        progress.finish();
        Ok(lineno)
    }

    /// Dispatches one command to every worker, waits at the barrier, and
    /// compares the outcomes.
    fn step(
        &self,
        cmd: &Command,
        lineno: u64,
        shareds: &[Arc<WorkerShared>],
        signal: &Arc<Signal>,
    ) -> Result<Vec<Outcome>, Error> {
        for shared in shareds {
            let mut slot = shared.slot.lock().unwrap();
            slot.pending = Some(cmd.clone());
            drop(slot);
            shared.go.notify_one();
        }

        self.wait_reached(shareds, signal, lineno);

        let outcomes: Vec<Outcome> = shareds
            .iter()
            .map(|s| s.slot.lock().unwrap().outcome.clone())
            .collect();

        if outcomes.iter().any(|o| !o.success) {
            error!(line = lineno, "worker reported a fatal status");
            return Err(Error::WorkerFailed { line: lineno });
        }

        if matches!(cmd, Command::Fullcheck) {
            self.fullcheck(lineno, &outcomes)?;
        } else {
            self.compare_status(lineno, &outcomes)?;
            if matches!(cmd, Command::Find { .. }) && outcomes[0].status.is_ok() {
                self.compare_records(lineno, &outcomes)?;
            }
        }

        Ok(outcomes)
    }

    /// Blocks until every worker's completed-command counter has reached
    /// `line`. A panicked worker reports `u64::MAX` so the barrier cannot
    /// hang; its panic resurfaces at join time.
    fn wait_reached(&self, shareds: &[Arc<WorkerShared>], signal: &Arc<Signal>, line: u64) {
        loop {
            let reached = shareds
                .iter()
                .all(|s| s.slot.lock().unwrap().completed >= line);
            if reached {
                return;
            }
            let guard = signal.mutex.lock().unwrap();
            let _ = signal.cond.wait_timeout(guard, BARRIER_POLL).unwrap();
        }
    }

    fn compare_status(&self, lineno: u64, outcomes: &[Outcome]) -> Result<(), Error> {
        let st0 = outcomes[0].status;
        for outcome in &outcomes[1..] {
            if outcome.status != st0 {
                error!(
                    line = lineno,
                    expected = %st0,
                    got = %outcome.status,
                    "status mismatch"
                );
                return Err(Error::Divergence {
                    line: lineno,
                    kind: DivergenceKind::Status,
                });
            }
        }
        Ok(())
    }

    fn compare_records(&self, lineno: u64, outcomes: &[Outcome]) -> Result<(), Error> {
        let rec0 = &outcomes[0].record;
        for outcome in &outcomes[1..] {
            if &outcome.record != rec0 {
                error!(
                    line = lineno,
                    expected_len = rec0.len(),
                    got_len = outcome.record.len(),
                    "record mismatch"
                );
                return Err(Error::Divergence {
                    line: lineno,
                    kind: DivergenceKind::Record,
                });
            }
        }
        Ok(())
    }

    /// Exhaustive key-by-key comparison of the database contents across all
    /// back-ends. Runs on the controller thread while the workers are
    /// parked at the barrier.
    fn fullcheck(&self, lineno: u64, outcomes: &[Outcome]) -> Result<(), Error> {
        let statuses: Vec<Status> = self
            .engines
            .iter()
            .map(|e| e.lock().unwrap().check_integrity())
            .collect();
        for st in &statuses[1..] {
            if *st != statuses[0] {
                return Err(Error::Divergence {
                    line: lineno,
                    kind: DivergenceKind::Integrity,
                });
            }
        }
        if !statuses[0].is_ok() {
            error!(line = lineno, status = %statuses[0], "integrity check failed");
            return Err(Error::WorkerFailed { line: lineno });
        }

        let mut cursors = Vec::with_capacity(self.engines.len());
        for (i, engine) in self.engines.iter().enumerate() {
            let (st, cursor) = engine.lock().unwrap().cursor_create(outcomes[i].txn);
            match cursor {
                Some(c) if st.is_ok() => cursors.push(c),
                _ => return Err(Error::WorkerFailed { line: lineno }),
            }
        }

        let result = self.fullcheck_compare(lineno, outcomes, &cursors);

        for (engine, cursor) in self.engines.iter().zip(&cursors) {
            engine.lock().unwrap().cursor_close(*cursor);
        }
        result
    }

    fn fullcheck_compare(
        &self,
        lineno: u64,
        outcomes: &[Outcome],
        cursors: &[crate::engine::CursorId],
    ) -> Result<(), Error> {
        let mode = self.conf.fullcheck;
        let mut key0 = Vec::new();
        let mut rec0 = Vec::new();

        loop {
            let st0 = {
                let mut engine = self.engines[0].lock().unwrap();
                match mode {
                    FullcheckMode::Find => engine.get_next(cursors[0], &mut key0, &mut rec0, true),
                    FullcheckMode::Backwards => {
                        engine.get_previous(cursors[0], &mut key0, &mut rec0)
                    }
                    FullcheckMode::Forward => {
                        engine.get_next(cursors[0], &mut key0, &mut rec0, false)
                    }
                }
            };

            for i in 1..self.engines.len() {
                let mut key = Vec::new();
                let mut rec = Vec::new();
                let st = {
                    let mut engine = self.engines[i].lock().unwrap();
                    match mode {
                        FullcheckMode::Find => {
                            if st0.is_ok() {
                                engine.find(outcomes[i].txn, &key0, &mut rec)
                            } else {
                                st0
                            }
                        }
                        FullcheckMode::Backwards => {
                            engine.get_previous(cursors[i], &mut key, &mut rec)
                        }
                        FullcheckMode::Forward => {
                            engine.get_next(cursors[i], &mut key, &mut rec, false)
                        }
                    }
                };

                if st != st0 {
                    error!(
                        line = lineno,
                        expected = %st0,
                        got = %st,
                        "fullcheck status mismatch"
                    );
                    return Err(Error::Divergence {
                        line: lineno,
                        kind: DivergenceKind::Status,
                    });
                }
                if st0.is_ok() {
                    if rec != rec0 {
                        error!(line = lineno, "fullcheck record mismatch");
                        return Err(Error::Divergence {
                            line: lineno,
                            kind: DivergenceKind::Record,
                        });
                    }
                    if mode != FullcheckMode::Find && key != key0 {
                        error!(line = lineno, "fullcheck key mismatch");
                        return Err(Error::Divergence {
                            line: lineno,
                            kind: DivergenceKind::Key,
                        });
                    }
                }
            }

            if !st0.is_ok() {
                return Ok(());
            }
        }
    }
}

/// Unblocks the controller barrier when the worker thread dies mid-command
/// (a transaction-state assertion). The panic itself is re-raised when the
/// controller joins the thread.
struct Bailout(Arc<WorkerShared>);

impl Drop for Bailout {
    fn drop(&mut self) {
        if thread::panicking() {
            let mut slot = self.0.slot.lock().unwrap();
            slot.completed = u64::MAX;
            slot.outcome.success = false;
        }
    }
}

fn worker_loop(mut worker: Worker, shared: Arc<WorkerShared>, signal: Arc<Signal>) -> Worker {
    let _bailout = Bailout(shared.clone());
    loop {
        let cmd = {
            let mut slot = shared.slot.lock().unwrap();
            loop {
                if let Some(cmd) = slot.pending.take() {
                    break cmd;
                }
                if slot.shutdown {
                    return worker;
                }
                slot = shared.go.wait(slot).unwrap();
            }
        };

        worker.execute(&cmd);

        {
            let mut slot = shared.slot.lock().unwrap();
            slot.completed += 1;
            slot.outcome = worker.outcome();
        }
        signal.cond.notify_one();
    }
}
