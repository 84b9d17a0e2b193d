use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::Parser;
use mimalloc::MiMalloc;
use tracing_subscriber::EnvFilter;

use kvbench::config::DEFAULT_LIMIT_BYTES;
use kvbench::engine::MemoryEngine;
use kvbench::generator::{CommandSource, RuntimeGenerator, ScriptSource};
use kvbench::{report, Config, Controller, DistributionKind, FullcheckMode, KeyType, KvEngine, TxnMode};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineKind {
    Memory,
    Redb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricsLevel {
    None,
    Default,
    All,
    Json,
}

fn parse_key_type(value: &str) -> Result<KeyType, String> {
    match value {
        "uint8" => Ok(KeyType::Uint8),
        "uint16" => Ok(KeyType::Uint16),
        "uint32" => Ok(KeyType::Uint32),
        "uint64" => Ok(KeyType::Uint64),
        "binary" => Ok(KeyType::Binary),
        _ => Err(format!(
            "invalid key type '{value}'; use uint8, uint16, uint32, uint64 or binary"
        )),
    }
}

fn parse_distribution(value: &str) -> Result<DistributionKind, String> {
    match value {
        "random" => Ok(DistributionKind::Random),
        "ascending" => Ok(DistributionKind::Ascending),
        "descending" => Ok(DistributionKind::Descending),
        "zipfian" => Ok(DistributionKind::Zipfian),
        _ => Err(format!(
            "invalid distribution '{value}'; use random, ascending, descending or zipfian"
        )),
    }
}

fn parse_fullcheck(value: &str) -> Result<FullcheckMode, String> {
    match value {
        "forward" => Ok(FullcheckMode::Forward),
        "reverse" => Ok(FullcheckMode::Backwards),
        "find" => Ok(FullcheckMode::Find),
        _ => Err(format!(
            "invalid fullcheck mode '{value}'; use forward, reverse or find"
        )),
    }
}

fn parse_txn_mode(value: &str) -> Result<TxnMode, String> {
    match value {
        // temporary per-operation transactions are the adapter's own
        // business; the generator emits no transaction commands for them
        "tmp" => Ok(TxnMode::Disabled),
        "all" => Ok(TxnMode::All),
        n => {
            let nth: u64 = n
                .parse()
                .map_err(|_| format!("invalid transaction group '{value}'"))?;
            if nth == 0 {
                return Err("transaction group must be non-zero".into());
            }
            Ok(TxnMode::EveryNth(nth))
        }
    }
}

fn parse_engine(value: &str) -> Result<EngineKind, String> {
    match value {
        "memory" => Ok(EngineKind::Memory),
        "redb" => Ok(EngineKind::Redb),
        _ => Err(format!("unknown engine '{value}'; use memory or redb")),
    }
}

fn parse_metrics(value: &str) -> Result<MetricsLevel, String> {
    match value {
        "none" => Ok(MetricsLevel::None),
        "default" => Ok(MetricsLevel::Default),
        "all" => Ok(MetricsLevel::All),
        "json" => Ok(MetricsLevel::Json),
        _ => Err(format!(
            "invalid metrics level '{value}'; use none, default, all or json"
        )),
    }
}

/// Workload-driven benchmark harness for embedded ordered key/value stores.
#[derive(Parser, Debug)]
#[command(name = "kvbench", version, about)]
struct Args {
    /// PRNG seed; 0 takes the wall-clock time
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Key value distribution (random, ascending, descending, zipfian)
    #[arg(long, default_value = "random", value_parser = parse_distribution)]
    distribution: DistributionKind,

    /// Key type (uint8, uint16, uint32, uint64, binary)
    #[arg(long = "key", default_value = "binary", value_parser = parse_key_type)]
    key: KeyType,

    /// Key size for binary keys
    #[arg(long = "keysize", default_value_t = 16)]
    keysize: usize,

    /// Force a fixed key size
    #[arg(long = "keysize-fixed")]
    keysize_fixed: bool,

    /// Record size
    #[arg(long = "recsize", default_value_t = 1024)]
    recsize: usize,

    /// Route insert/erase/find through a cursor
    #[arg(long = "use-cursors")]
    use_cursors: bool,

    /// Group operations into transactions ('tmp', a group size N, or 'all')
    #[arg(long = "use-transactions", value_parser = parse_txn_mode)]
    use_transactions: Option<TxnMode>,

    /// Percentage of erase operations
    #[arg(long = "erase-pct", default_value_t = 0)]
    erase_pct: u32,

    /// Percentage of find operations
    #[arg(long = "find-pct", default_value_t = 0)]
    find_pct: u32,

    /// Stop after this many operations
    #[arg(long = "stop-ops", default_value_t = 0)]
    stop_ops: u64,

    /// Stop after this many seconds
    #[arg(long = "stop-seconds", default_value_t = 0)]
    stop_seconds: u64,

    /// Stop after inserting this many bytes (default: 100 mb)
    #[arg(long = "stop-bytes", default_value_t = 0)]
    stop_bytes: u64,

    /// First command opens the database instead of creating it
    #[arg(long)]
    open: bool,

    /// Open/fullcheck/close once more after the run
    #[arg(long, short = 'r')]
    reopen: bool,

    /// Fullcheck algorithm (forward, reverse, find)
    #[arg(long, default_value = "forward", value_parser = parse_fullcheck)]
    fullcheck: FullcheckMode,

    /// Copy the generated commands into this file for later replay
    #[arg(long)]
    tee: Option<PathBuf>,

    /// Back-end to drive; repeat for lock-step differential mode
    #[arg(long = "engine", value_parser = parse_engine)]
    engine: Vec<EngineKind>,

    /// Metrics verbosity (none, default, all, json)
    #[arg(long, default_value = "default", value_parser = parse_metrics)]
    metrics: MetricsLevel,

    /// Do not print the end-of-run metrics
    #[arg(long, short = 'q')]
    quiet: bool,

    /// Disable the progress bar
    #[arg(long = "no-progress")]
    no_progress: bool,

    /// Raise the log level (repeat for more)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Trace file to replay ('-' for stdin); synthesizes a workload when
    /// absent
    filename: Option<PathBuf>,
}

fn build_config(args: &Args) -> Config {
    let mut conf = Config::default();
    conf.key_type(args.key)
        .distribution(args.distribution)
        .key_size(args.keysize)
        .key_is_fixed_size(args.keysize_fixed)
        .rec_size(args.recsize)
        .use_cursors(args.use_cursors)
        .erase_pct(args.erase_pct)
        .find_pct(args.find_pct)
        .limit_ops(args.stop_ops)
        .limit_seconds(args.stop_seconds)
        .limit_bytes(args.stop_bytes)
        .open(args.open)
        .reopen(args.reopen)
        .fullcheck(args.fullcheck)
        .txn_mode(args.use_transactions.unwrap_or(TxnMode::Disabled));

    // the workload must always be reproducible, so pin the seed even when
    // the user did not provide one
    conf.seed(if args.seed != 0 {
        args.seed
    } else {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(1)
    });

    if let Some(filename) = &args.filename {
        conf.filename(filename.clone());
    } else if args.stop_ops == 0 && args.stop_seconds == 0 && args.stop_bytes == 0 {
        conf.limit_bytes(DEFAULT_LIMIT_BYTES);
    }
    if let Some(tee) = &args.tee {
        conf.tee_file(tee.clone());
    }
    conf.quiet = args.quiet;
    conf.no_progress = args.no_progress;
    conf
}

fn build_engines(kinds: &[EngineKind]) -> anyhow::Result<Vec<Box<dyn KvEngine>>> {
    let kinds = if kinds.is_empty() {
        &[EngineKind::Memory][..]
    } else {
        kinds
    };

    let mut engines: Vec<Box<dyn KvEngine>> = Vec::with_capacity(kinds.len());
    for (i, kind) in kinds.iter().enumerate() {
        match kind {
            EngineKind::Memory => engines.push(Box::new(MemoryEngine::new())),
            EngineKind::Redb => {
                #[cfg(feature = "redb")]
                {
                    let path = std::env::temp_dir()
                        .join(format!("kvbench-{}-{}.redb", std::process::id(), i));
                    engines.push(Box::new(kvbench::engine::RedbEngine::new(path)));
                }
                #[cfg(not(feature = "redb"))]
                {
                    anyhow::bail!(
                        "redb support is not compiled in; rebuild with --features redb"
                    );
                }
            }
        }
    }
    Ok(engines)
}

fn build_source(args: &Args, conf: &Arc<Config>) -> anyhow::Result<Box<dyn CommandSource>> {
    match &args.filename {
        Some(path) if path.as_os_str() == "-" => {
            let source = ScriptSource::from_reader(conf.clone(), std::io::stdin())
                .context("failed to read trace from stdin")?;
            Ok(Box::new(source))
        }
        Some(path) => {
            let source = ScriptSource::from_path(conf.clone(), path)
                .with_context(|| format!("failed to read trace file {}", path.display()))?;
            Ok(Box::new(source))
        }
        None => {
            let generator =
                RuntimeGenerator::new(conf.clone()).context("failed to set up the generator")?;
            Ok(Box::new(generator))
        }
    }
}

fn main() {
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let conf = build_config(&args);
    let display_name = conf
        .filename
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    if let Err(err) = conf.validate() {
        println!("[FAIL] {err}");
        std::process::exit(1);
    }
    let conf = Arc::new(conf);

    let run = build_engines(&args.engine)
        .and_then(|engines| {
            let source = build_source(&args, &conf)?;
            Ok(Controller::new(conf.clone(), source, engines))
        })
        .and_then(|controller| controller.run().map_err(anyhow::Error::from));

    match run {
        Ok(outcome) => {
            println!("[OK] {display_name}");
            if !args.quiet {
                match args.metrics {
                    MetricsLevel::None => {}
                    MetricsLevel::Default | MetricsLevel::All => {
                        for (engine, metrics) in &outcome.per_worker {
                            report::print_metrics(
                                engine,
                                metrics,
                                args.metrics == MetricsLevel::All,
                            );
                        }
                    }
                    MetricsLevel::Json => {
                        for (engine, metrics) in &outcome.per_worker {
                            println!(
                                "{}",
                                serde_json::json!({ "engine": engine, "metrics": metrics })
                            );
                        }
                    }
                }
            }
        }
        Err(err) => {
            println!("{err:#}");
            println!("[FAIL] {display_name}");
            std::process::exit(1);
        }
    }
}
