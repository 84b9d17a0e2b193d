use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::{make_record, CommandSource, Feedback};
use crate::command::Command;
use crate::config::{Config, KeyType, TxnMode};
use crate::datasource::{self, DataSource};
use crate::error::Error;

#[derive(Debug, PartialEq)]
enum GenState {
    Running,
    Stopped,
}

/// Synthesizes the workload from the configuration.
///
/// For a fixed seed the emitted command sequence is byte-identical across
/// runs: the operation-mix draw and the data source consume independent
/// streams seeded from the same value, and neither depends on execution
/// timing (except for the `limit_seconds` stop gate, which only decides
/// *when* the trailing commit/close pair is emitted).
pub struct RuntimeGenerator {
    conf: Arc<Config>,
    state: GenState,
    op_count: u64,
    rng: StdRng,
    datasource: Box<dyn DataSource>,
    txn_open: bool,
    start: Instant,
    tee: Option<BufWriter<File>>,
}

impl std::fmt::Debug for RuntimeGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeGenerator")
            .field("conf", &self.conf)
            .field("state", &self.state)
            .field("op_count", &self.op_count)
            .field("txn_open", &self.txn_open)
            .field("start", &self.start)
            .finish_non_exhaustive()
    }
}

impl RuntimeGenerator {
    pub fn new(conf: Arc<Config>) -> Result<Self, Error> {
        // failing to open the tee is fatal; failing to write to it later is
        // not, the run keeps going without the trace
        let tee = match &conf.tee_file {
            Some(path) => Some(BufWriter::new(File::create(path).map_err(Error::Tee)?)),
            None => None,
        };
        Ok(Self {
            state: GenState::Running,
            op_count: 0,
            rng: StdRng::seed_from_u64(conf.seed),
            datasource: datasource::from_config(&conf),
            txn_open: false,
            start: Instant::now(),
            tee,
            conf,
        })
    }

    pub fn op_count(&self) -> u64 {
        self.op_count
    }

    fn select(&mut self, feedback: &Feedback) -> Command {
        // limit reached - commit a dangling transaction, then close once
        if self.limit_reached(feedback) {
            if self.txn_open {
                self.txn_open = false;
                return Command::TxnCommit;
            }
            self.state = GenState::Stopped;
            return Command::Close;
        }

        // first command opens or creates the database
        if self.op_count == 0 {
            return if self.conf.open {
                Command::Open
            } else {
                Command::Create
            };
        }

        match self.conf.txn_mode {
            TxnMode::Disabled => {}
            TxnMode::EveryNth(nth) => {
                if !self.txn_open {
                    self.txn_open = true;
                    return Command::TxnBegin;
                }
                // +2 because the begin/commit pair itself ticks op_count,
                // leaving exactly `nth` payload ops per transaction
                if self.op_count % (nth + 2) == 0 {
                    self.txn_open = false;
                    return Command::TxnCommit;
                }
            }
            TxnMode::All => {
                if !self.txn_open {
                    self.txn_open = true;
                    return Command::TxnBegin;
                }
            }
        }

        if self.conf.erase_pct > 0 || self.conf.find_pct > 0 {
            let draw = self.rng.random::<f64>() * 100.0;
            if draw < self.conf.erase_pct as f64 {
                return Command::Erase {
                    key: self.generate_key(),
                };
            }
            if draw < (self.conf.erase_pct + self.conf.find_pct) as f64 {
                return Command::Find {
                    key: self.generate_key(),
                };
            }
        }

        let key = self.generate_key();
        let mut record = Vec::new();
        make_record(self.op_count, self.conf.rec_size, &mut record);
        Command::Insert { key, record }
    }

    fn limit_reached(&self, feedback: &Feedback) -> bool {
        // >= so the gate stays closed after the trailing commit ticked
        // op_count past the limit
        if self.conf.limit_ops != 0 && self.op_count >= self.conf.limit_ops {
            return true;
        }
        if self.conf.limit_seconds != 0
            && self.start.elapsed().as_secs_f64() > self.conf.limit_seconds as f64
        {
            return true;
        }
        if self.conf.limit_bytes != 0 && feedback.insert_bytes >= self.conf.limit_bytes {
            return true;
        }
        false
    }

    fn generate_key(&mut self) -> Vec<u8> {
        let mut key = Vec::new();
        self.datasource.next_key(&mut key);
        key
    }

    /// Appends the command to the tee file in replayable form. Write
    /// failures are ignored; losing the tee must not abort the run.
    fn tee(&mut self, cmd: &Command) {
        if self.tee.is_none() && !tracing::enabled!(tracing::Level::DEBUG) {
            return;
        }
        let line = format_command(cmd, self.conf.key_type);
        debug!(worker = "generator", command = %line);
        if let Some(tee) = &mut self.tee {
            let _ = writeln!(tee, "{line}");
        }
    }
}

impl CommandSource for RuntimeGenerator {
    fn next_command(&mut self, feedback: &Feedback) -> Option<Command> {
        if self.state == GenState::Stopped {
            if let Some(tee) = &mut self.tee {
                let _ = tee.flush();
            }
            return None;
        }
        let cmd = self.select(feedback);
        self.tee(&cmd);
        self.op_count += 1;
        Some(cmd)
    }
}

/// Renders a command in the trace grammar; the output parses back through
/// [`super::ScriptSource`].
pub(crate) fn format_command(cmd: &Command, key_type: KeyType) -> String {
    match cmd {
        Command::Insert { key, record } => {
            format!(
                "INSERT (0, {}, {})",
                format_key(key, key_type),
                record.len()
            )
        }
        Command::Erase { key } => format!("ERASE (0, {})", format_key(key, key_type)),
        Command::Find { key } => format!("FIND (0, {})", format_key(key, key_type)),
        other => other.verb().to_string(),
    }
}

fn format_key(key: &[u8], key_type: KeyType) -> String {
    match key_type.width() {
        Some(width) => {
            let mut bytes = [0u8; 8];
            bytes[..width.min(key.len())].copy_from_slice(&key[..width.min(key.len())]);
            u64::from_le_bytes(bytes).to_string()
        }
        None => String::from_utf8_lossy(key).into_owned(),
    }
}
