use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Zipf};

use super::{DataSource, ZIPFIAN_THETA};

/// Binary keys draw from a printable pool so that teed traces never contain
/// tokenizer delimiters and diagnostics stay readable.
const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn random_len(rng: &mut StdRng, size: usize) -> usize {
    rng.random_range(1..=size)
}

/// Lexicographic successor over the alphabet, odometer style. Fixed-size
/// keys emit the full width; variable-size keys emit a random-length prefix
/// of the current odometer state.
pub struct BinaryAscending {
    digits: Vec<usize>,
    fixed: bool,
    len_rng: StdRng,
}

impl BinaryAscending {
    pub fn new(size: usize, fixed: bool, seed: u64) -> Self {
        Self {
            digits: vec![0; size],
            fixed,
            len_rng: StdRng::seed_from_u64(seed),
        }
    }

    fn advance(&mut self) {
        for d in self.digits.iter_mut().rev() {
            *d += 1;
            if *d < ALPHABET.len() {
                return;
            }
            *d = 0;
        }
    }
}

impl DataSource for BinaryAscending {
    fn next_key(&mut self, out: &mut Vec<u8>) {
        let len = if self.fixed {
            self.digits.len()
        } else {
            random_len(&mut self.len_rng, self.digits.len())
        };
        out.extend(self.digits[..len].iter().map(|&d| ALPHABET[d]));
        self.advance();
    }
}

/// Mirror of [`BinaryAscending`]: starts at the top of the key space and
/// counts down.
pub struct BinaryDescending {
    digits: Vec<usize>,
    fixed: bool,
    len_rng: StdRng,
}

impl BinaryDescending {
    pub fn new(size: usize, fixed: bool, seed: u64) -> Self {
        Self {
            digits: vec![ALPHABET.len() - 1; size],
            fixed,
            len_rng: StdRng::seed_from_u64(seed),
        }
    }

    fn advance(&mut self) {
        for d in self.digits.iter_mut().rev() {
            if *d > 0 {
                *d -= 1;
                return;
            }
            *d = ALPHABET.len() - 1;
        }
    }
}

impl DataSource for BinaryDescending {
    fn next_key(&mut self, out: &mut Vec<u8>) {
        let len = if self.fixed {
            self.digits.len()
        } else {
            random_len(&mut self.len_rng, self.digits.len())
        };
        out.extend(self.digits[..len].iter().map(|&d| ALPHABET[d]));
        self.advance();
    }
}

/// Uniformly random payload of fixed or variable length.
pub struct BinaryRandom {
    size: usize,
    fixed: bool,
    rng: StdRng,
}

impl BinaryRandom {
    pub fn new(size: usize, fixed: bool, seed: u64) -> Self {
        Self {
            size,
            fixed,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl DataSource for BinaryRandom {
    fn next_key(&mut self, out: &mut Vec<u8>) {
        let len = if self.fixed {
            self.size
        } else {
            random_len(&mut self.rng, self.size)
        };
        for _ in 0..len {
            out.push(ALPHABET[self.rng.random_range(0..ALPHABET.len())]);
        }
    }
}

/// Zipf-distributed ranks mapped deterministically onto binary keys, so the
/// hot ranks repeat byte-identically.
pub struct BinaryZipfian {
    zipf: Zipf<f64>,
    rng: StdRng,
    size: usize,
    fixed: bool,
    seed: u64,
}

impl BinaryZipfian {
    pub fn new(population: u64, size: usize, fixed: bool, seed: u64) -> Self {
        Self {
            zipf: Zipf::new(population as f64, ZIPFIAN_THETA).unwrap(),
            rng: StdRng::seed_from_u64(seed),
            size,
            fixed,
            seed,
        }
    }
}

impl DataSource for BinaryZipfian {
    fn next_key(&mut self, out: &mut Vec<u8>) {
        let rank = self.zipf.sample(&mut self.rng) as u64;
        // the key for a given rank must not depend on when it is drawn
        let mut key_rng =
            StdRng::seed_from_u64(self.seed ^ rank.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        let len = if self.fixed {
            self.size
        } else {
            random_len(&mut key_rng, self.size)
        };
        for _ in 0..len {
            out.push(ALPHABET[key_rng.random_range(0..ALPHABET.len())]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn take(source: &mut dyn DataSource, n: usize) -> Vec<Vec<u8>> {
        (0..n)
            .map(|_| {
                let mut key = Vec::new();
                source.next_key(&mut key);
                key
            })
            .collect()
    }

    #[test]
    fn ascending_fixed_is_sorted() {
        let mut source = BinaryAscending::new(4, true, 0);
        let keys = take(&mut source, 100);
        assert_eq!(keys[0], b"0000");
        assert_eq!(keys[1], b"0001");
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn descending_fixed_is_reverse_sorted() {
        let mut source = BinaryDescending::new(3, true, 0);
        let keys = take(&mut source, 50);
        assert_eq!(keys[0], b"zzz");
        let mut sorted = keys.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(keys, sorted);
    }

    #[test]
    fn random_variable_respects_bounds() {
        let mut source = BinaryRandom::new(8, false, 11);
        for key in take(&mut source, 200) {
            assert!(!key.is_empty() && key.len() <= 8);
            assert!(key.iter().all(|b| ALPHABET.contains(b)));
        }
    }

    #[test]
    fn zipfian_rank_maps_to_stable_key() {
        let a = take(&mut BinaryZipfian::new(64, 6, true, 9), 512);
        let b = take(&mut BinaryZipfian::new(64, 6, true, 9), 512);
        assert_eq!(a, b);
        // a small population must produce repeats
        let mut dedup = a.clone();
        dedup.sort();
        dedup.dedup();
        assert!(dedup.len() < a.len());
    }
}
