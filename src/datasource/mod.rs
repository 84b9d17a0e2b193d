//! Key generators: a lazy, infinite, non-restartable sequence of keys with a
//! configurable type and distribution. For a fixed seed the sequence is
//! bit-identical across runs, which is what makes lock-step differential
//! testing meaningful.

mod binary;
mod numeric;

use crate::config::{Config, DistributionKind, KeyType};

pub use binary::{BinaryAscending, BinaryDescending, BinaryRandom, BinaryZipfian};
pub use numeric::{NumericAscending, NumericDescending, NumericRandom, NumericZipfian};

/// Skew parameter of the zipfian distributions.
pub(crate) const ZIPFIAN_THETA: f64 = 0.8;

pub trait DataSource: Send {
    /// Appends the encoded bytes of the next key to `out`.
    fn next_key(&mut self, out: &mut Vec<u8>);
}

/// Builds the generator selected by `key_type` × `distribution`.
pub fn from_config(conf: &Config) -> Box<dyn DataSource> {
    let population = conf.zipfian_population();
    match conf.key_type {
        KeyType::Uint8 => numeric_source::<u8>(conf, population),
        KeyType::Uint16 => numeric_source::<u16>(conf, population),
        KeyType::Uint32 => numeric_source::<u32>(conf, population),
        KeyType::Uint64 => numeric_source::<u64>(conf, population),
        KeyType::Binary => match conf.distribution {
            DistributionKind::Random => Box::new(BinaryRandom::new(
                conf.key_size,
                conf.key_is_fixed_size,
                conf.seed,
            )),
            DistributionKind::Ascending => Box::new(BinaryAscending::new(
                conf.key_size,
                conf.key_is_fixed_size,
                conf.seed,
            )),
            DistributionKind::Descending => Box::new(BinaryDescending::new(
                conf.key_size,
                conf.key_is_fixed_size,
                conf.seed,
            )),
            DistributionKind::Zipfian => Box::new(BinaryZipfian::new(
                population,
                conf.key_size,
                conf.key_is_fixed_size,
                conf.seed,
            )),
        },
    }
}

fn numeric_source<T>(conf: &Config, population: u64) -> Box<dyn DataSource>
where
    T: numeric::NumericKey,
{
    match conf.distribution {
        DistributionKind::Random => Box::new(NumericRandom::<T>::new(conf.seed)),
        DistributionKind::Ascending => Box::new(NumericAscending::<T>::new()),
        DistributionKind::Descending => Box::new(NumericDescending::<T>::new()),
        DistributionKind::Zipfian => Box::new(NumericZipfian::<T>::new(population, conf.seed)),
    }
}
