use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const DEFAULT_KEY_SIZE: usize = 16;
pub const DEFAULT_REC_SIZE: usize = 1024;
/// Applied when no stop condition is configured at all.
pub const DEFAULT_LIMIT_BYTES: u64 = 100 * 1024 * 1024;
/// Zipfian population when the run is not bounded by `limit_ops`.
pub const ZIPFIAN_POPULATION: u64 = 1024 * 1024 * 5;

/// Key family produced by the data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Binary,
}

impl KeyType {
    /// Encoded width in bytes; `None` for variable-width binary keys.
    pub fn width(&self) -> Option<usize> {
        match self {
            KeyType::Uint8 => Some(1),
            KeyType::Uint16 => Some(2),
            KeyType::Uint32 => Some(4),
            KeyType::Uint64 => Some(8),
            KeyType::Binary => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.width().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionKind {
    Random,
    Ascending,
    Descending,
    Zipfian,
}

/// How synthesized operations are grouped into transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnMode {
    /// No transaction commands are emitted; every operation auto-commits.
    Disabled,
    /// Commit after every N payload operations.
    EveryNth(u64),
    /// One transaction around the entire run.
    All,
}

/// Iteration strategy for the full-database comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FullcheckMode {
    Forward,
    Backwards,
    Find,
}

/// Frozen run configuration. Built once at startup, immutable afterwards.
///
/// The builder setters mirror the command-line surface; `validate` must pass
/// before the configuration is handed to the generator or the controller.
#[derive(Debug, Clone)]
pub struct Config {
    pub key_type: KeyType,
    pub distribution: DistributionKind,
    /// PRNG seed. `0` is resolved to wall-clock time by the CLI before the
    /// configuration is frozen; identical seeds produce identical workloads.
    pub seed: u64,
    pub key_size: usize,
    pub key_is_fixed_size: bool,
    pub rec_size: usize,
    pub erase_pct: u32,
    pub find_pct: u32,
    pub txn_mode: TxnMode,
    pub use_cursors: bool,
    pub limit_ops: u64,
    pub limit_seconds: u64,
    pub limit_bytes: u64,
    /// First command is Open rather than Create.
    pub open: bool,
    /// After the main run, open/fullcheck/close once more to exercise
    /// persistence.
    pub reopen: bool,
    pub fullcheck: FullcheckMode,
    /// Trace file for replay; also the name echoed in the [OK]/[FAIL] line.
    pub filename: Option<PathBuf>,
    /// If set, the runtime generator tees every emitted command here.
    pub tee_file: Option<PathBuf>,
    pub quiet: bool,
    pub no_progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_type: KeyType::Binary,
            distribution: DistributionKind::Random,
            seed: 0,
            key_size: DEFAULT_KEY_SIZE,
            key_is_fixed_size: false,
            rec_size: DEFAULT_REC_SIZE,
            erase_pct: 0,
            find_pct: 0,
            txn_mode: TxnMode::Disabled,
            use_cursors: false,
            limit_ops: 0,
            limit_seconds: 0,
            limit_bytes: 0,
            open: false,
            reopen: false,
            fullcheck: FullcheckMode::Forward,
            filename: None,
            tee_file: None,
            quiet: true,
            no_progress: true,
        }
    }
}

impl Config {
    pub fn key_type(&mut self, key_type: KeyType) -> &mut Self {
        self.key_type = key_type;
        self
    }

    pub fn distribution(&mut self, distribution: DistributionKind) -> &mut Self {
        self.distribution = distribution;
        self
    }

    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = seed;
        self
    }

    pub fn key_size(&mut self, key_size: usize) -> &mut Self {
        self.key_size = key_size;
        self
    }

    pub fn key_is_fixed_size(&mut self, fixed: bool) -> &mut Self {
        self.key_is_fixed_size = fixed;
        self
    }

    pub fn rec_size(&mut self, rec_size: usize) -> &mut Self {
        self.rec_size = rec_size;
        self
    }

    pub fn erase_pct(&mut self, pct: u32) -> &mut Self {
        self.erase_pct = pct;
        self
    }

    pub fn find_pct(&mut self, pct: u32) -> &mut Self {
        self.find_pct = pct;
        self
    }

    pub fn txn_mode(&mut self, mode: TxnMode) -> &mut Self {
        self.txn_mode = mode;
        self
    }

    pub fn use_cursors(&mut self, use_cursors: bool) -> &mut Self {
        self.use_cursors = use_cursors;
        self
    }

    pub fn limit_ops(&mut self, ops: u64) -> &mut Self {
        self.limit_ops = ops;
        self
    }

    pub fn limit_seconds(&mut self, seconds: u64) -> &mut Self {
        self.limit_seconds = seconds;
        self
    }

    pub fn limit_bytes(&mut self, bytes: u64) -> &mut Self {
        self.limit_bytes = bytes;
        self
    }

    pub fn open(&mut self, open: bool) -> &mut Self {
        self.open = open;
        self
    }

    pub fn reopen(&mut self, reopen: bool) -> &mut Self {
        self.reopen = reopen;
        self
    }

    pub fn fullcheck(&mut self, mode: FullcheckMode) -> &mut Self {
        self.fullcheck = mode;
        self
    }

    pub fn filename(&mut self, filename: impl Into<PathBuf>) -> &mut Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn tee_file(&mut self, tee_file: impl Into<PathBuf>) -> &mut Self {
        self.tee_file = Some(tee_file.into());
        self
    }

    /// Zipfian population: bounded runs draw over the operation budget,
    /// unbounded runs over a fixed cap.
    pub fn zipfian_population(&self) -> u64 {
        if self.limit_ops != 0 {
            self.limit_ops
        } else {
            ZIPFIAN_POPULATION
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.erase_pct > 100 {
            return Err(Error::Config("erase-pct must be within 0..=100".into()));
        }
        if self.find_pct > 100 {
            return Err(Error::Config("find-pct must be within 0..=100".into()));
        }
        if self.erase_pct + self.find_pct > 100 {
            return Err(Error::Config(
                "erase-pct + find-pct must not exceed 100".into(),
            ));
        }
        if self.key_type == KeyType::Binary && self.key_size == 0 {
            return Err(Error::Config("keysize must be non-zero".into()));
        }
        if let TxnMode::EveryNth(0) = self.txn_mode {
            return Err(Error::Config(
                "use-transactions needs a non-zero group size".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chain() {
        let mut config = Config::default();
        config
            .key_type(KeyType::Uint32)
            .distribution(DistributionKind::Zipfian)
            .seed(42)
            .limit_ops(1000);

        assert_eq!(config.key_type, KeyType::Uint32);
        assert_eq!(config.zipfian_population(), 1000);

        config.limit_ops(0);
        assert_eq!(config.zipfian_population(), ZIPFIAN_POPULATION);
    }

    #[test]
    fn validate_rejects_bad_mix() {
        let mut config = Config::default();
        config.erase_pct(60).find_pct(60);
        assert!(config.validate().is_err());

        config.erase_pct(40);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_txn_group() {
        let mut config = Config::default();
        config.txn_mode(TxnMode::EveryNth(0));
        assert!(config.validate().is_err());
    }
}
