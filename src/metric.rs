//! Streaming per-operation metrics.
//!
//! Each timed operation kind gets one bucket holding a count, a byte total,
//! and min/total/max latency in seconds; averages are derived at read time.
//! A nanosecond histogram rides along for quantile reporting. Buckets are
//! owned per worker and merged into a run total with `+=`.

use std::fmt;
use std::time::Duration;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use variant_count::VariantCount;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, VariantCount)]
pub enum OpKind {
    Insert = 0,
    Find = 1,
    Erase = 2,
    TxnCommit = 3,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Insert => write!(f, "insert"),
            OpKind::Find => write!(f, "find"),
            OpKind::Erase => write!(f, "erase"),
            OpKind::TxnCommit => write!(f, "txn_commit"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LatencyBucket {
    pub count: u64,
    pub bytes: u64,
    pub latency_min: f64,
    pub latency_max: f64,
    pub latency_total: f64,
    hist: hdrhistogram::Histogram<u64>,
}

impl Default for LatencyBucket {
    fn default() -> Self {
        let mut hist = hdrhistogram::Histogram::<u64>::new_with_bounds(1, 100_000_000, 3).unwrap();
        hist.auto(true);
        Self {
            count: 0,
            bytes: 0,
            latency_min: f64::INFINITY,
            latency_max: 0.0,
            latency_total: 0.0,
            hist,
        }
    }
}

impl LatencyBucket {
    pub fn record_latency(&mut self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        if self.latency_min > secs {
            self.latency_min = secs;
        }
        if self.latency_max < secs {
            self.latency_max = secs;
        }
        self.latency_total += secs;
        self.count += 1;
        self.hist.record(elapsed.as_nanos().max(1) as u64).unwrap();
    }

    pub fn add_bytes(&mut self, bytes: u64) {
        self.bytes += bytes;
    }

    /// Undefined (0.0) while the bucket is empty.
    pub fn latency_avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.latency_total / self.count as f64
        }
    }

    /// Latency at quantile `q`, in seconds.
    pub fn latency_at_quantile(&self, q: f64) -> f64 {
        self.hist.value_at_quantile(q) as f64 / 1e9
    }
}

#[derive(Debug, Clone)]
pub struct Metrics {
    buckets: [LatencyBucket; OpKind::VARIANT_COUNT],
    pub other_ops: u64,
    pub elapsed_wallclock_seconds: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            buckets: core::array::from_fn(|_| LatencyBucket::default()),
            other_ops: 0,
            elapsed_wallclock_seconds: 0.0,
        }
    }
}

impl Metrics {
    pub fn bucket(&self, kind: OpKind) -> &LatencyBucket {
        &self.buckets[kind as usize]
    }

    pub fn bucket_mut(&mut self, kind: OpKind) -> &mut LatencyBucket {
        &mut self.buckets[kind as usize]
    }

    pub fn total_ops(&self) -> u64 {
        self.buckets.iter().map(|b| b.count).sum::<u64>() + self.other_ops
    }
}

use auto_ops::impl_op_ex;

impl_op_ex!(+= |a: &mut Metrics, b: &Metrics| {
    for (i, bucket) in a.buckets.iter_mut().enumerate() {
        let other = &b.buckets[i];
        bucket.count += other.count;
        bucket.bytes += other.bytes;
        bucket.latency_total += other.latency_total;
        if other.latency_min < bucket.latency_min {
            bucket.latency_min = other.latency_min;
        }
        if other.latency_max > bucket.latency_max {
            bucket.latency_max = other.latency_max;
        }
        bucket.hist.add(other.hist.clone()).unwrap();
    }
    a.other_ops += b.other_ops;
    if b.elapsed_wallclock_seconds > a.elapsed_wallclock_seconds {
        a.elapsed_wallclock_seconds = b.elapsed_wallclock_seconds;
    }
});

const QUANTILE: [(&str, f64); 3] = [("95th", 0.95), ("99th", 0.99), ("99.9th", 0.999)];

impl Serialize for Metrics {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct BucketView {
            count: u64,
            bytes: u64,
            latency_min: f64,
            latency_avg: f64,
            latency_max: f64,
            quantiles: Vec<(&'static str, f64)>,
        }

        let mut state = serializer.serialize_map(Some(OpKind::VARIANT_COUNT + 2))?;
        for i in 0..OpKind::VARIANT_COUNT {
            let kind: OpKind = unsafe { std::mem::transmute(i as u8) };
            let bucket = self.bucket(kind);
            let view = BucketView {
                count: bucket.count,
                bytes: bucket.bytes,
                latency_min: if bucket.count == 0 {
                    0.0
                } else {
                    bucket.latency_min
                },
                latency_avg: bucket.latency_avg(),
                latency_max: bucket.latency_max,
                quantiles: QUANTILE
                    .iter()
                    .map(|(name, q)| (*name, bucket.latency_at_quantile(*q)))
                    .collect(),
            };
            state.serialize_entry(&kind.to_string(), &view)?;
        }
        state.serialize_entry("other_ops", &self.other_ops)?;
        state.serialize_entry("elapsed_wallclock_seconds", &self.elapsed_wallclock_seconds)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_avg_max_ordering() {
        let mut bucket = LatencyBucket::default();
        for micros in [5u64, 50, 500] {
            bucket.record_latency(Duration::from_micros(micros));
        }
        assert_eq!(bucket.count, 3);
        assert!(bucket.latency_min <= bucket.latency_avg());
        assert!(bucket.latency_avg() <= bucket.latency_max);
    }

    #[test]
    fn merge_combines_buckets() {
        let mut a = Metrics::default();
        let mut b = Metrics::default();
        a.bucket_mut(OpKind::Insert)
            .record_latency(Duration::from_micros(10));
        a.bucket_mut(OpKind::Insert).add_bytes(100);
        b.bucket_mut(OpKind::Insert)
            .record_latency(Duration::from_micros(30));
        b.bucket_mut(OpKind::Insert).add_bytes(50);
        b.other_ops = 2;

        a += &b;
        let bucket = a.bucket(OpKind::Insert);
        assert_eq!(bucket.count, 2);
        assert_eq!(bucket.bytes, 150);
        assert_eq!(a.other_ops, 2);
        assert!(bucket.latency_min <= bucket.latency_max);
    }

    #[test]
    fn empty_bucket_has_zero_avg() {
        let metrics = Metrics::default();
        assert_eq!(metrics.bucket(OpKind::Erase).latency_avg(), 0.0);
        assert_eq!(metrics.total_ops(), 0);
    }
}
