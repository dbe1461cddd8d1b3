//! The flat continuum shared by the modula, random, and ketama
//! distributors: a sequence of `{index, value}` entries binary-searched (or
//! indexed modulo `n`) to resolve a hash to a server index.

use crate::error::DistributorError;

/// One point on a continuum: `value` is the ring/bucket coordinate, `index`
/// is the server it resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuumEntry {
    /// Index into the owning pool's `servers[]`.
    pub index: usize,
    /// The ring coordinate this entry occupies.
    pub value: u32,
}

/// A sorted (by [`ContinuumEntry::value`]) array of continuum entries.
#[derive(Debug, Clone, Default)]
pub struct Continuum {
    entries: Vec<ContinuumEntry>,
}

impl Continuum {
    /// Builds a continuum from already-computed entries, sorting by value.
    #[must_use]
    pub fn from_entries(mut entries: Vec<ContinuumEntry>) -> Self {
        entries.sort_by_key(|entry| entry.value);
        Self { entries }
    }

    /// A flat continuum with one entry per live server index, in order.
    /// Used by the modula and random distributors, for which `value` is
    /// simply the entry's position.
    #[must_use]
    pub fn flat(live_indices: impl IntoIterator<Item = usize>) -> Self {
        let entries = live_indices
            .into_iter()
            .enumerate()
            .map(|(value, index)| ContinuumEntry {
                index,
                value: value as u32,
            })
            .collect();
        Self { entries }
    }

    /// Number of entries on the continuum.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the continuum has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub(crate) fn entries(&self) -> &[ContinuumEntry] {
        &self.entries
    }

    /// Modula dispatch: `entries[hash % len].index`.
    pub fn dispatch_modula(&self, hash: u32) -> Result<usize, DistributorError> {
        if self.entries.is_empty() {
            return Err(DistributorError::EmptyContinuum);
        }
        let slot = (hash as usize) % self.entries.len();
        Ok(self.entries[slot].index)
    }

    /// Random dispatch: a uniformly chosen entry, ignoring `hash`.
    pub fn dispatch_random(&self, rng: &mut impl rand::Rng) -> Result<usize, DistributorError> {
        if self.entries.is_empty() {
            return Err(DistributorError::EmptyContinuum);
        }
        let slot = rng.random_range(0..self.entries.len());
        Ok(self.entries[slot].index)
    }

    /// Ketama dispatch: binary search for the smallest entry with
    /// `value >= hash`; on wraparound, return the first entry.
    pub fn dispatch_ketama(&self, hash: u32) -> Result<usize, DistributorError> {
        if self.entries.is_empty() {
            return Err(DistributorError::EmptyContinuum);
        }
        let idx = match self.entries.binary_search_by(|entry| entry.value.cmp(&hash)) {
            Ok(found) => found,
            Err(insert_at) => {
                if insert_at >= self.entries.len() {
                    0
                } else {
                    insert_at
                }
            }
        };
        Ok(self.entries[idx].index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn modula_wraps_on_hash_mod_len() {
        let c = Continuum::flat([10, 11, 12]);
        assert_eq!(c.dispatch_modula(0).unwrap(), 10);
        assert_eq!(c.dispatch_modula(1).unwrap(), 11);
        assert_eq!(c.dispatch_modula(3).unwrap(), 10);
    }

    #[test]
    fn random_picks_a_member_entry() {
        let c = Continuum::flat([5, 6, 7]);
        let mut rng = StdRng::seed_from_u64(1);
        let picked = c.dispatch_random(&mut rng).unwrap();
        assert!([5, 6, 7].contains(&picked));
    }

    #[test]
    fn ketama_returns_smallest_entry_gte_hash() {
        let c = Continuum::from_entries(vec![
            ContinuumEntry { index: 0, value: 100 },
            ContinuumEntry { index: 1, value: 200 },
            ContinuumEntry { index: 2, value: 300 },
        ]);
        assert_eq!(c.dispatch_ketama(50).unwrap(), 0);
        assert_eq!(c.dispatch_ketama(100).unwrap(), 0);
        assert_eq!(c.dispatch_ketama(150).unwrap(), 1);
    }

    #[test]
    fn ketama_wraps_to_first_entry_past_the_end() {
        let c = Continuum::from_entries(vec![
            ContinuumEntry { index: 0, value: 100 },
            ContinuumEntry { index: 1, value: 200 },
        ]);
        assert_eq!(c.dispatch_ketama(u32::MAX).unwrap(), 0);
    }

    #[test]
    fn empty_continuum_reports_empty_error() {
        let c = Continuum::default();
        assert_eq!(c.dispatch_modula(0), Err(DistributorError::EmptyContinuum));
        assert_eq!(c.dispatch_ketama(0), Err(DistributorError::EmptyContinuum));
    }
}
