//! Index symmetries of components.
//!
//! A [`Symmetry`] is a set of disjoint slot groups, each tagged symmetric or
//! antisymmetric. Index tuples related by permutations inside the groups form an
//! equivalence class; the canonical representative of a class is its
//! lexicographically smallest tuple, which is obtained by sorting the values of
//! every group in increasing order. For antisymmetric groups the sign is the
//! parity of that sort, and a repeated value makes the whole class zero.

use std::fmt;

use itertools::Itertools;

use crate::errors::{GeometryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymmetryKind {
    Symmetric,
    Antisymmetric,
}

impl SymmetryKind {
    pub fn opposite(self) -> Self {
        match self {
            SymmetryKind::Symmetric => SymmetryKind::Antisymmetric,
            SymmetryKind::Antisymmetric => SymmetryKind::Symmetric,
        }
    }
}

/// A set of slot positions among which the components are (anti)symmetric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotGroup {
    slots: Vec<usize>,
    kind: SymmetryKind,
}

impl SlotGroup {
    pub fn slots(&self) -> &[usize] {
        &self.slots
    }

    pub fn kind(&self) -> SymmetryKind {
        self.kind
    }

    fn contains_all(&self, slots: &[usize]) -> bool {
        slots.iter().all(|s| self.slots.contains(s))
    }

    fn overlap(&self, slots: &[usize]) -> usize {
        self.slots.iter().filter(|s| slots.contains(s)).count()
    }
}

/// Result of resolving an index tuple through a symmetry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Canonical {
    /// The tuple is forced to zero by an antisymmetric group.
    Zero,
    /// The canonical tuple and the sign relating it to the requested one.
    Index(Vec<usize>, i8),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Symmetry {
    groups: Vec<SlotGroup>,
}

impl Symmetry {
    /// No symmetry at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// A single symmetric group.
    pub fn symmetric(slots: &[usize]) -> Result<Self> {
        Self::none().with_group(SymmetryKind::Symmetric, slots)
    }

    /// A single antisymmetric group.
    pub fn antisymmetric(slots: &[usize]) -> Result<Self> {
        Self::none().with_group(SymmetryKind::Antisymmetric, slots)
    }

    /// Adds a group, checking that it has at least two distinct slots and does not
    /// overlap an existing group.
    pub fn with_group(mut self, kind: SymmetryKind, slots: &[usize]) -> Result<Self> {
        let sorted: Vec<usize> = slots.iter().copied().sorted().dedup().collect();
        if sorted.len() != slots.len() {
            return Err(GeometryError::InvalidSymmetry(format!(
                "repeated slot in {slots:?}"
            )));
        }
        if sorted.len() < 2 {
            return Err(GeometryError::InvalidSymmetry(format!(
                "a group needs at least two slots, got {slots:?}"
            )));
        }
        if let Some(existing) = self.groups.iter().find(|g| g.overlap(&sorted) > 0) {
            return Err(GeometryError::InvalidSymmetry(format!(
                "group {sorted:?} overlaps {:?}",
                existing.slots
            )));
        }
        self.groups.push(SlotGroup {
            slots: sorted,
            kind,
        });
        self.groups.sort_by(|a, b| a.slots.cmp(&b.slots));
        Ok(self)
    }

    pub fn groups(&self) -> &[SlotGroup] {
        &self.groups
    }

    pub fn is_none(&self) -> bool {
        self.groups.is_empty()
    }

    /// Checks the groups against a rank and a slot compatibility predicate.
    ///
    /// `compatible(a, b)` must return true when slots `a` and `b` share frame, index
    /// range and variance.
    pub fn validate<F>(&self, rank: usize, compatible: F) -> Result<()>
    where
        F: Fn(usize, usize) -> bool,
    {
        for group in &self.groups {
            if let Some(slot) = group.slots.iter().find(|s| **s >= rank) {
                return Err(GeometryError::InvalidSymmetry(format!(
                    "slot {slot} out of range for rank {rank}"
                )));
            }
            let first = group.slots[0];
            if let Some(slot) = group.slots[1..].iter().find(|s| !compatible(first, **s)) {
                return Err(GeometryError::InvalidSymmetry(format!(
                    "slots {first} and {slot} have different types"
                )));
            }
        }
        Ok(())
    }

    /// Maps an index tuple to its canonical representative.
    pub fn canonicalize(&self, index: &[usize]) -> Canonical {
        let mut canonical = index.to_vec();
        let mut sign = 1i8;
        for group in &self.groups {
            let values: Vec<usize> = group.slots.iter().map(|s| index[*s]).collect();
            if group.kind == SymmetryKind::Antisymmetric {
                if values.iter().duplicates().next().is_some() {
                    return Canonical::Zero;
                }
                if inversions(&values) % 2 == 1 {
                    sign = -sign;
                }
            }
            for (slot, value) in group.slots.iter().zip(values.into_iter().sorted()) {
                canonical[*slot] = value;
            }
        }
        Canonical::Index(canonical, sign)
    }

    /// Returns the kind of the group containing all of `slots`, if any.
    pub fn kind_containing(&self, slots: &[usize]) -> Option<SymmetryKind> {
        self.groups
            .iter()
            .find(|g| g.contains_all(slots))
            .map(|g| g.kind)
    }

    /// Returns true if a group of `kind` shares at least two slots with `slots`.
    pub fn shares_pair(&self, kind: SymmetryKind, slots: &[usize]) -> bool {
        self.groups
            .iter()
            .any(|g| g.kind == kind && g.overlap(slots) >= 2)
    }

    /// Symmetry of the result of (anti)symmetrizing over `slots`.
    ///
    /// Groups disjoint from `slots` survive, groups contained in `slots` are absorbed
    /// by the new group and partially overlapping groups are dropped.
    pub fn after_projection(&self, kind: SymmetryKind, slots: &[usize]) -> Self {
        let mut groups: Vec<SlotGroup> = self
            .groups
            .iter()
            .filter(|g| g.overlap(slots) == 0)
            .cloned()
            .collect();
        groups.push(SlotGroup {
            slots: slots.iter().copied().sorted().collect(),
            kind,
        });
        groups.sort_by(|a, b| a.slots.cmp(&b.slots));
        Self { groups }
    }

    /// Groups common to both symmetries, as used for sums.
    pub fn intersection(&self, other: &Symmetry) -> Self {
        let mut groups: Vec<SlotGroup> = self
            .groups
            .iter()
            .cartesian_product(&other.groups)
            .filter(|(a, b)| a.kind == b.kind)
            .map(|(a, b)| SlotGroup {
                slots: a
                    .slots
                    .iter()
                    .copied()
                    .filter(|s| b.slots.contains(s))
                    .collect(),
                kind: a.kind,
            })
            .filter(|g| g.slots.len() >= 2)
            .collect();
        groups.sort_by(|a, b| a.slots.cmp(&b.slots));
        Self { groups }
    }

    /// Shifts every slot by `offset`, as needed for the right factor of a tensor product.
    pub fn shifted(&self, offset: usize) -> Self {
        Self {
            groups: self
                .groups
                .iter()
                .map(|g| SlotGroup {
                    slots: g.slots.iter().map(|s| s + offset).collect(),
                    kind: g.kind,
                })
                .collect(),
        }
    }

    /// Disjoint union of two symmetries.
    pub fn union(&self, other: &Symmetry) -> Self {
        let mut groups = self.groups.clone();
        groups.extend(other.groups.iter().cloned());
        groups.sort_by(|a, b| a.slots.cmp(&b.slots));
        Self { groups }
    }

    /// Relabels slots: slot `s` of the operand becomes slot `new_position[s]`.
    pub fn relabeled(&self, new_position: &[usize]) -> Self {
        let mut groups: Vec<SlotGroup> = self
            .groups
            .iter()
            .map(|g| SlotGroup {
                slots: g.slots.iter().map(|s| new_position[*s]).sorted().collect(),
                kind: g.kind,
            })
            .collect();
        groups.sort_by(|a, b| a.slots.cmp(&b.slots));
        Self { groups }
    }

    /// Drops the given slots and renumbers the remaining ones, as needed after a contraction.
    pub fn without_slots(&self, removed: &[usize]) -> Self {
        let renumber = |s: usize| s - removed.iter().filter(|r| **r < s).count();
        let mut groups: Vec<SlotGroup> = self
            .groups
            .iter()
            .map(|g| SlotGroup {
                slots: g
                    .slots
                    .iter()
                    .filter(|s| !removed.contains(s))
                    .map(|s| renumber(*s))
                    .collect(),
                kind: g.kind,
            })
            .filter(|g| g.slots.len() >= 2)
            .collect();
        groups.sort_by(|a, b| a.slots.cmp(&b.slots));
        Self { groups }
    }
}

/// Number of inversions of a sequence; its parity is the parity of the sorting permutation.
pub(crate) fn inversions(values: &[usize]) -> usize {
    values
        .iter()
        .enumerate()
        .map(|(i, a)| values[i + 1..].iter().filter(|b| *b < a).count())
        .sum()
}

impl fmt::Display for Symmetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.groups.is_empty() {
            return write!(f, "no symmetry");
        }
        let groups = self
            .groups
            .iter()
            .map(|g| {
                let kind = match g.kind {
                    SymmetryKind::Symmetric => "sym",
                    SymmetryKind::Antisymmetric => "antisym",
                };
                format!("{kind}{:?}", g.slots)
            })
            .join(", ");
        write!(f, "{groups}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_groups() {
        assert!(Symmetry::symmetric(&[0]).is_err());
        assert!(Symmetry::symmetric(&[0, 0]).is_err());
        let sym = Symmetry::symmetric(&[0, 1]).unwrap();
        assert!(sym.with_group(SymmetryKind::Antisymmetric, &[1, 2]).is_err());
    }

    #[test]
    fn test_validate_rank() {
        let sym = Symmetry::symmetric(&[0, 2]).unwrap();
        assert!(sym.validate(3, |_, _| true).is_ok());
        assert!(sym.validate(2, |_, _| true).is_err());
        assert!(sym.validate(3, |_, _| false).is_err());
    }

    #[test]
    fn test_canonicalize_symmetric() {
        let sym = Symmetry::symmetric(&[0, 1]).unwrap();
        assert_eq!(sym.canonicalize(&[2, 1]), Canonical::Index(vec![1, 2], 1));
        assert_eq!(sym.canonicalize(&[1, 1]), Canonical::Index(vec![1, 1], 1));
    }

    #[test]
    fn test_canonicalize_antisymmetric() {
        let sym = Symmetry::antisymmetric(&[0, 1, 2]).unwrap();
        assert_eq!(sym.canonicalize(&[0, 1, 2]), Canonical::Index(vec![0, 1, 2], 1));
        assert_eq!(sym.canonicalize(&[1, 0, 2]), Canonical::Index(vec![0, 1, 2], -1));
        assert_eq!(sym.canonicalize(&[2, 0, 1]), Canonical::Index(vec![0, 1, 2], 1));
        assert_eq!(sym.canonicalize(&[1, 0, 1]), Canonical::Zero);
    }

    #[test]
    fn test_canonicalize_mixed_groups() {
        let sym = Symmetry::symmetric(&[0, 1])
            .unwrap()
            .with_group(SymmetryKind::Antisymmetric, &[2, 3])
            .unwrap();
        assert_eq!(
            sym.canonicalize(&[1, 0, 3, 2]),
            Canonical::Index(vec![0, 1, 2, 3], -1)
        );
    }

    #[test]
    fn test_after_projection() {
        let sym = Symmetry::antisymmetric(&[0, 1])
            .unwrap()
            .with_group(SymmetryKind::Symmetric, &[2, 3])
            .unwrap();
        let projected = sym.after_projection(SymmetryKind::Symmetric, &[1, 2]);
        assert_eq!(projected.groups().len(), 1);
        assert_eq!(projected.groups()[0].slots(), &[1, 2]);

        let absorbed = Symmetry::symmetric(&[0, 1])
            .unwrap()
            .after_projection(SymmetryKind::Symmetric, &[0, 1, 2]);
        assert_eq!(absorbed, Symmetry::symmetric(&[0, 1, 2]).unwrap());
    }

    #[test]
    fn test_intersection_and_relabel() {
        let a = Symmetry::symmetric(&[0, 1, 2]).unwrap();
        let b = Symmetry::symmetric(&[1, 2]).unwrap();
        assert_eq!(a.intersection(&b), b);
        assert!(a.intersection(&Symmetry::antisymmetric(&[0, 1]).unwrap()).is_none());
        assert_eq!(
            b.relabeled(&[2, 0, 1]),
            Symmetry::symmetric(&[0, 1]).unwrap()
        );
        assert_eq!(
            a.without_slots(&[0]),
            Symmetry::symmetric(&[0, 1]).unwrap()
        );
    }

    #[test]
    fn test_inversions() {
        assert_eq!(inversions(&[0, 1, 2]), 0);
        assert_eq!(inversions(&[2, 1, 0]), 3);
        assert_eq!(inversions(&[1, 0]), 1);
    }
}
