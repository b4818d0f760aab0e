//! Bookkeeping of the representations of one field.
//!
//! A field owns one representation per chart (scalar fields) or per frame (tensor
//! fields). Each entry remembers whether the user supplied it or it was derived
//! from another one, and whether it went stale because the field was redefined
//! since. Stale entries are never handed out; they are re-derived on request.

use std::collections::btree_map::{self, BTreeMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Supplied through `set_*` or `add_*`.
    Set,
    /// Computed from another representation.
    Derived,
}

#[derive(Debug, Clone)]
struct Stored<V> {
    value: V,
    origin: Origin,
    stale: bool,
}

#[derive(Debug, Clone)]
pub struct Representations<K, V> {
    entries: BTreeMap<K, Stored<V>>,
}

impl<K, V> Default for Representations<K, V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy, V> Representations<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a representation and marks every derived one stale.
    pub fn set(&mut self, key: K, value: V) -> &mut V {
        for entry in self.entries.values_mut() {
            if entry.origin == Origin::Derived {
                entry.stale = true;
            }
        }
        self.insert(key, value, Origin::Set)
    }

    /// Installs a representation the caller vouches is consistent with the others.
    pub fn add(&mut self, key: K, value: V) -> &mut V {
        self.insert(key, value, Origin::Set)
    }

    /// Stores a derived representation.
    pub fn cache(&mut self, key: K, value: V) -> &mut V {
        self.insert(key, value, Origin::Derived)
    }

    fn insert(&mut self, key: K, value: V, origin: Origin) -> &mut V {
        let stored = Stored {
            value,
            origin,
            stale: false,
        };
        let slot = match self.entries.entry(key) {
            btree_map::Entry::Occupied(mut occupied) => {
                occupied.insert(stored);
                occupied.into_mut()
            }
            btree_map::Entry::Vacant(vacant) => vacant.insert(stored),
        };
        &mut slot.value
    }

    /// A representation that is not stale.
    pub fn get(&self, key: K) -> Option<&V> {
        self.entries
            .get(&key)
            .filter(|entry| !entry.stale)
            .map(|entry| &entry.value)
    }

    /// Mutable access to a fresh representation, which becomes user supplied.
    pub fn get_mut(&mut self, key: K) -> Option<&mut V> {
        self.entries
            .get_mut(&key)
            .filter(|entry| !entry.stale)
            .map(|entry| {
                entry.origin = Origin::Set;
                &mut entry.value
            })
    }

    pub fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    pub fn is_stale(&self, key: K) -> bool {
        self.entries.get(&key).is_some_and(|entry| entry.stale)
    }

    pub fn origin(&self, key: K) -> Option<Origin> {
        self.entries
            .get(&key)
            .filter(|entry| !entry.stale)
            .map(|entry| entry.origin)
    }

    /// Keys of the fresh representations, in id order.
    pub fn keys(&self) -> Vec<K> {
        self.iter().map(|(key, _)| key).collect()
    }

    /// Fresh representations, in id order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> + Clone {
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.stale)
            .map(|(key, entry)| (*key, &entry.value))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl<K: Ord + Copy, V: Clone> Representations<K, V> {
    /// Fresh representations that satisfy `keep`, all marked as user supplied.
    pub fn filtered<F>(&self, mut keep: F) -> Representations<K, V>
    where
        F: FnMut(K) -> bool,
    {
        let mut result = Representations::new();
        for (key, value) in self.iter() {
            if keep(key) {
                result.add(key, value.clone());
            }
        }
        result
    }

    /// Applies `f` to every fresh representation; stale ones are dropped.
    pub fn map<W, F>(&self, mut f: F) -> Representations<K, W>
    where
        F: FnMut(K, &V) -> W,
    {
        let mut result = Representations::new();
        for (key, entry) in &self.entries {
            if !entry.stale {
                result.insert(*key, f(*key, &entry.value), entry.origin);
            }
        }
        result
    }

    /// Fallible variant of [`Representations::map`].
    pub fn try_map<W, E, F>(&self, mut f: F) -> Result<Representations<K, W>, E>
    where
        F: FnMut(K, &V) -> Result<W, E>,
    {
        let mut result = Representations::new();
        for (key, entry) in &self.entries {
            if entry.stale {
                continue;
            }
            result.insert(*key, f(*key, &entry.value)?, entry.origin);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_marks_derived_stale() {
        let mut reprs: Representations<u32, &str> = Representations::new();
        reprs.set(2, "a");
        reprs.cache(1, "b");
        reprs.add(3, "c");
        assert_eq!(reprs.keys(), vec![1, 2, 3]);
        assert_eq!(reprs.origin(1), Some(Origin::Derived));

        reprs.set(4, "d");
        assert!(reprs.is_stale(1));
        assert_eq!(reprs.get(1), None);
        assert_eq!(reprs.keys(), vec![2, 3, 4]);

        // re-deriving refreshes the entry
        reprs.cache(1, "b2");
        assert!(!reprs.is_stale(1));
        assert_eq!(reprs.get(1), Some(&"b2"));
    }

    #[test]
    fn test_pairs_of_fresh_entries() {
        use itertools::Itertools;

        let mut reprs: Representations<u32, i32> = Representations::new();
        assert!(reprs.is_empty());
        reprs.cache(4, 40);
        reprs.set(1, 10);
        reprs.add(2, 20);
        reprs.cache(3, 30);
        assert!(!reprs.is_empty());
        let pairs: Vec<(u32, u32)> = reprs
            .iter()
            .tuple_combinations()
            .map(|((a, _), (b, _))| (a, b))
            .collect();
        assert_eq!(pairs, vec![(1, 2), (1, 3), (2, 3)]);
    }

    #[test]
    fn test_add_keeps_others_fresh() {
        let mut reprs: Representations<u32, i32> = Representations::new();
        reprs.cache(1, 10);
        *reprs.add(2, 0) += 5;
        assert_eq!(reprs.get(1), Some(&10));
        assert_eq!(reprs.get(2), Some(&5));
    }

    #[test]
    fn test_try_map_and_filter() {
        let mut reprs: Representations<u32, i32> = Representations::new();
        reprs.set(1, 1);
        reprs.cache(2, 2);
        reprs.set(3, 3);
        let doubled: Representations<u32, i32> =
            reprs.try_map(|_, v| Ok::<_, ()>(v * 2)).unwrap();
        assert_eq!(doubled.iter().collect::<Vec<_>>(), vec![(1, &2), (3, &6)]);
        let odd = reprs.filtered(|k| k % 2 == 1);
        assert_eq!(odd.keys(), vec![1, 3]);
    }
}
