//! Ground-truth model: the authoritative key → value table the store's
//! answers are checked against.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{HarnessError, Result};

pub type Key = u64;

/// Characters values are drawn from (ASCII letters, no quoting hazards).
pub const VALUE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Key → value mapping plus the order the rows are fed to the store.
///
/// Keys are a permutation of `1..=N`, so insertion order never matches key
/// order and the store has to sort or index on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundTruth {
    table: BTreeMap<Key, String>,
    insertion_order: Vec<Key>,
}

impl GroundTruth {
    /// Builds `rows` records with shuffled keys and random values of
    /// `value_len` letters. Same RNG state, same table.
    pub fn generate<R: Rng + ?Sized>(rows: usize, value_len: usize, rng: &mut R) -> Result<Self> {
        if rows == 0 {
            return Err(HarnessError::EmptyKeyUniverse);
        }

        let mut insertion_order: Vec<Key> = (1..=rows as Key).collect();
        insertion_order.shuffle(rng);

        let table = insertion_order
            .iter()
            .map(|&key| (key, random_value(rng, value_len)))
            .collect();

        Ok(GroundTruth {
            table,
            insertion_order,
        })
    }

    /// Builds a table from explicit records, inserted in the given order.
    /// A repeated key keeps its last value and its first position.
    pub fn from_records<I, V>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Key, V)>,
        V: Into<String>,
    {
        let mut table = BTreeMap::new();
        let mut insertion_order = Vec::new();
        for (key, value) in records {
            if table.insert(key, value.into()).is_none() {
                insertion_order.push(key);
            }
        }
        if table.is_empty() {
            return Err(HarnessError::EmptyKeyUniverse);
        }
        Ok(GroundTruth {
            table,
            insertion_order,
        })
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn get(&self, key: Key) -> Option<&str> {
        self.table.get(&key).map(String::as_str)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> &[Key] {
        &self.insertion_order
    }

    /// Records in insertion order.
    pub fn records(&self) -> impl Iterator<Item = (Key, &str)> + '_ {
        self.insertion_order
            .iter()
            .map(move |key| (*key, self.table[key].as_str()))
    }

    /// Expected answer for `select ... where id lo hi`: every record with
    /// `lo <= key <= hi`. Empty when the range misses the table.
    pub fn project(&self, lo: Key, hi: Key) -> BTreeMap<Key, &str> {
        if lo > hi {
            return BTreeMap::new();
        }
        self.table
            .range(lo..=hi)
            .map(|(key, value)| (*key, value.as_str()))
            .collect()
    }
}

pub fn random_value<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| VALUE_ALPHABET[rng.gen_range(0..VALUE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn keys_are_a_permutation_of_one_to_n() {
        let mut rng = StdRng::seed_from_u64(7);
        let truth = GroundTruth::generate(500, 16, &mut rng).unwrap();

        let mut keys = truth.keys().to_vec();
        assert_ne!(keys, (1..=500).collect::<Vec<_>>(), "insertion order should be shuffled");
        keys.sort_unstable();
        assert_eq!(keys, (1..=500).collect::<Vec<_>>());
        assert_eq!(truth.len(), 500);
    }

    #[test]
    fn values_have_fixed_length_and_alphabet() {
        let mut rng = StdRng::seed_from_u64(11);
        let truth = GroundTruth::generate(100, 16, &mut rng).unwrap();
        for (_, value) in truth.records() {
            assert_eq!(value.len(), 16);
            assert!(value.bytes().all(|b| VALUE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn same_seed_same_table() {
        let a = GroundTruth::generate(200, 16, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = GroundTruth::generate(200, 16, &mut StdRng::seed_from_u64(42)).unwrap();
        let c = GroundTruth::generate(200, 16, &mut StdRng::seed_from_u64(43)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn zero_rows_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            GroundTruth::generate(0, 16, &mut rng),
            Err(HarnessError::EmptyKeyUniverse)
        ));
        assert!(matches!(
            GroundTruth::from_records(Vec::<(Key, String)>::new()),
            Err(HarnessError::EmptyKeyUniverse)
        ));
    }

    #[test]
    fn projection_is_inclusive_on_both_ends() {
        let truth = GroundTruth::from_records([(1, "aa"), (2, "bb"), (3, "cc")]).unwrap();
        let expected: BTreeMap<Key, &str> = [(1, "aa"), (2, "bb")].into_iter().collect();
        assert_eq!(truth.project(1, 2), expected);
    }

    #[test]
    fn projection_past_the_last_key_is_empty() {
        let truth = GroundTruth::from_records((1..=1000).map(|k| (k, "v"))).unwrap();
        assert!(truth.project(9999, 9999).is_empty());
        assert_eq!(truth.project(995, 1050).len(), 6);
        assert!(truth.project(5, 4).is_empty());
    }

    #[test]
    fn from_records_keeps_first_position_and_last_value() {
        let truth = GroundTruth::from_records([(3, "x"), (1, "y"), (3, "z")]).unwrap();
        assert_eq!(truth.keys(), &[3, 1]);
        assert_eq!(truth.get(3), Some("z"));
    }
}
