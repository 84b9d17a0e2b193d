//! Human-readable end-of-run metrics.

use crate::metric::{LatencyBucket, Metrics, OpKind};

const QUANTILES: [(&str, f64); 3] = [("95th", 0.95), ("99th", 0.99), ("99.9th", 0.999)];

/// Prints the per-engine summary. `all` adds latency quantiles.
pub fn print_metrics(engine: &str, metrics: &Metrics, all: bool) {
    println!("[{engine}]");
    println!(
        "\telapsed time (sec)             {:.6}",
        metrics.elapsed_wallclock_seconds
    );
    println!("\ttotal #ops                     {}", metrics.total_ops());

    print_bucket("insert", metrics.bucket(OpKind::Insert), all);
    if metrics.bucket(OpKind::Find).count > 0 {
        print_bucket("find", metrics.bucket(OpKind::Find), all);
    }
    if metrics.bucket(OpKind::Erase).count > 0 {
        print_bucket("erase", metrics.bucket(OpKind::Erase), all);
    }
    if metrics.bucket(OpKind::TxnCommit).count > 0 {
        print_bucket("txn_commit", metrics.bucket(OpKind::TxnCommit), all);
    }
}

fn print_bucket(name: &str, bucket: &LatencyBucket, all: bool) {
    if bucket.count == 0 {
        println!("\t{name} #ops                    0");
        return;
    }
    println!(
        "\t{} #ops                    {} ({:.2}/sec)",
        name,
        bucket.count,
        bucket.count as f64 / bucket.latency_total
    );
    if bucket.bytes > 0 {
        println!(
            "\t{} throughput              {:.2}/sec",
            name,
            bucket.bytes as f64 / bucket.latency_total
        );
    }
    println!(
        "\t{} latency (min, avg, max) {:.6}, {:.6}, {:.6}",
        name,
        bucket.latency_min,
        bucket.latency_avg(),
        bucket.latency_max
    );
    if all {
        for (label, q) in QUANTILES {
            println!(
                "\t{} latency ({})          {:.6}",
                name,
                label,
                bucket.latency_at_quantile(q)
            );
        }
    }
}
