use std::marker::PhantomData;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Zipf};

use super::{DataSource, ZIPFIAN_THETA};

/// Fixed-width unsigned key, little-endian encoded.
pub(crate) trait NumericKey: Copy + Send + 'static {
    const WIDTH: usize;

    fn from_u64(v: u64) -> Self;
    fn append_le(self, out: &mut Vec<u8>);
    fn sample(rng: &mut StdRng) -> Self;
}

macro_rules! numeric_key {
    ($t:ty) => {
        impl NumericKey for $t {
            const WIDTH: usize = std::mem::size_of::<$t>();

            fn from_u64(v: u64) -> Self {
                v as $t
            }

            fn append_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn sample(rng: &mut StdRng) -> Self {
                use rand::Rng;
                rng.random::<$t>()
            }
        }
    };
}

numeric_key!(u8);
numeric_key!(u16);
numeric_key!(u32);
numeric_key!(u64);

/// Counter starting at 0, +1 per key, wrapping at the type's width.
pub struct NumericAscending<T> {
    next: u64,
    _marker: PhantomData<T>,
}

impl<T: NumericKey> NumericAscending<T> {
    pub fn new() -> Self {
        Self {
            next: 0,
            _marker: PhantomData,
        }
    }
}

impl<T: NumericKey> Default for NumericAscending<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NumericKey> DataSource for NumericAscending<T> {
    fn next_key(&mut self, out: &mut Vec<u8>) {
        T::from_u64(self.next).append_le(out);
        self.next = self.next.wrapping_add(1);
    }
}

/// Mirror of [`NumericAscending`]: starts at the type's maximum, -1 per key.
pub struct NumericDescending<T> {
    next: u64,
    _marker: PhantomData<T>,
}

impl<T: NumericKey> NumericDescending<T> {
    pub fn new() -> Self {
        Self {
            next: u64::MAX,
            _marker: PhantomData,
        }
    }
}

impl<T: NumericKey> Default for NumericDescending<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NumericKey> DataSource for NumericDescending<T> {
    fn next_key(&mut self, out: &mut Vec<u8>) {
        T::from_u64(self.next).append_le(out);
        self.next = self.next.wrapping_sub(1);
    }
}

/// Uniform over the full range of the type.
pub struct NumericRandom<T> {
    rng: StdRng,
    _marker: PhantomData<T>,
}

impl<T: NumericKey> NumericRandom<T> {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            _marker: PhantomData,
        }
    }
}

impl<T: NumericKey> DataSource for NumericRandom<T> {
    fn next_key(&mut self, out: &mut Vec<u8>) {
        T::sample(&mut self.rng).append_le(out);
    }
}

/// Zipf-distributed ranks over a bounded population, truncated to the
/// type's width.
pub struct NumericZipfian<T> {
    rng: StdRng,
    zipf: Zipf<f64>,
    _marker: PhantomData<T>,
}

impl<T: NumericKey> NumericZipfian<T> {
    pub fn new(population: u64, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            zipf: Zipf::new(population as f64, ZIPFIAN_THETA).unwrap(),
            _marker: PhantomData,
        }
    }
}

impl<T: NumericKey> DataSource for NumericZipfian<T> {
    fn next_key(&mut self, out: &mut Vec<u8>) {
        // ranks start at 1
        let rank = self.zipf.sample(&mut self.rng) as u64 - 1;
        T::from_u64(rank).append_le(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn take<S: DataSource>(source: &mut S, n: usize) -> Vec<Vec<u8>> {
        (0..n)
            .map(|_| {
                let mut key = Vec::new();
                source.next_key(&mut key);
                key
            })
            .collect()
    }

    #[test]
    fn ascending_u32_counts_up() {
        let mut source = NumericAscending::<u32>::new();
        let keys = take(&mut source, 3);
        assert_eq!(keys[0], 0u32.to_le_bytes());
        assert_eq!(keys[1], 1u32.to_le_bytes());
        assert_eq!(keys[2], 2u32.to_le_bytes());
    }

    #[test]
    fn descending_u8_starts_at_max() {
        let mut source = NumericDescending::<u8>::new();
        let keys = take(&mut source, 2);
        assert_eq!(keys[0], vec![0xff]);
        assert_eq!(keys[1], vec![0xfe]);
    }

    #[test]
    fn random_is_reproducible() {
        let a = take(&mut NumericRandom::<u64>::new(7), 64);
        let b = take(&mut NumericRandom::<u64>::new(7), 64);
        assert_eq!(a, b);
    }

    #[test]
    fn zipfian_stays_in_population() {
        let mut source = NumericZipfian::<u64>::new(100, 3);
        for key in take(&mut source, 256) {
            let rank = u64::from_le_bytes(key.try_into().unwrap());
            assert!(rank < 100);
        }
    }
}
