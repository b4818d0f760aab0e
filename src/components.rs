//! Symmetry-aware components of a tensor in one fixed frame.
//!
//! A [`Components`] value is a sparse table of symbolic expressions indexed by
//! tuples, one index per slot. Every slot refers to a frame (covariant slots refer
//! to its dual coframe), an index range `start..start + dim` and a variance. Only
//! one value per symmetry-equivalence class is stored, at the canonical index
//! tuple (see [`crate::symmetry`]); all other tuples of the class are read back
//! through the sign rule. Unset entries are zero.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Range;

use itertools::Itertools;

use crate::canon::Assumptions;
use crate::errors::{GeometryError, Result};
use crate::expr::Expr;
use crate::manifold::{ChartId, FrameId};
use crate::matrix::SymMatrix;
use crate::symmetry::{inversions, Canonical, Symmetry, SymmetryKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variance {
    /// Upper index: the slot is paired with the frame vectors.
    Contra,
    /// Lower index: the slot is paired with the dual coframe.
    Co,
}

impl Variance {
    pub fn opposite(self) -> Self {
        match self {
            Variance::Contra => Variance::Co,
            Variance::Co => Variance::Contra,
        }
    }
}

/// Type of one index position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub frame: FrameId,
    pub start: usize,
    pub dim: usize,
    pub variance: Variance,
}

impl Slot {
    pub fn contra(frame: FrameId, start: usize, dim: usize) -> Self {
        Self {
            frame,
            start,
            dim,
            variance: Variance::Contra,
        }
    }

    pub fn co(frame: FrameId, start: usize, dim: usize) -> Self {
        Self {
            frame,
            start,
            dim,
            variance: Variance::Co,
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.dim
    }

    /// Same frame and range, any variance.
    fn same_basis(&self, other: &Slot) -> bool {
        self.frame == other.frame && self.start == other.start && self.dim == other.dim
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    value: Expr,
    /// The index tuple through which the value was explicitly set.
    origin: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Components {
    slots: Vec<Slot>,
    chart: Option<ChartId>,
    symmetry: Symmetry,
    values: BTreeMap<Vec<usize>, Entry>,
}

/// All index tuples over the given ranges, in lexicographic order.
pub(crate) fn index_product(ranges: &[Range<usize>]) -> Vec<Vec<usize>> {
    if ranges.is_empty() {
        return vec![Vec::new()];
    }
    ranges
        .iter()
        .cloned()
        .multi_cartesian_product()
        .collect()
}

impl Components {
    /// Creates empty (zero) components.
    ///
    /// # Arguments
    /// * `slots` - Type of each index position; an empty vector gives a scalar
    /// * `symmetry` - Declared symmetries; slots in one group must have identical types
    pub fn new(slots: Vec<Slot>, symmetry: Symmetry) -> Result<Self> {
        symmetry.validate(slots.len(), |a, b| slots[a] == slots[b])?;
        Ok(Self {
            slots,
            chart: None,
            symmetry,
            values: BTreeMap::new(),
        })
    }

    /// Components of a tensor of type `(k, l)` in a single frame, upper slots first.
    pub fn of_type(
        frame: FrameId,
        start: usize,
        dim: usize,
        tensor_type: (usize, usize),
        symmetry: Symmetry,
    ) -> Result<Self> {
        let (k, l) = tensor_type;
        let slots = itertools::repeat_n(Slot::contra(frame, start, dim), k)
            .chain(itertools::repeat_n(Slot::co(frame, start, dim), l))
            .collect();
        Self::new(slots, symmetry)
    }

    /// Records the chart in whose coordinates the values are written.
    pub fn with_chart(mut self, chart: ChartId) -> Self {
        self.chart = Some(chart);
        self
    }

    pub fn rank(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn chart(&self) -> Option<ChartId> {
        self.chart
    }

    pub fn symmetry(&self) -> &Symmetry {
        &self.symmetry
    }

    /// The frame of the first slot; tensor fields use a single frame for every slot.
    pub fn frame(&self) -> Option<FrameId> {
        self.slots.first().map(|s| s.frame)
    }

    /// `(contravariant, covariant)` slot counts.
    pub fn tensor_type(&self) -> (usize, usize) {
        let k = self
            .slots
            .iter()
            .filter(|s| s.variance == Variance::Contra)
            .count();
        (k, self.rank() - k)
    }

    fn ranges(&self) -> Vec<Range<usize>> {
        self.slots.iter().map(Slot::range).collect()
    }

    fn check_index(&self, index: &[usize]) -> Result<()> {
        let in_range = index.len() == self.rank()
            && index
                .iter()
                .zip(&self.slots)
                .all(|(i, slot)| slot.range().contains(i));
        if in_range {
            Ok(())
        } else {
            Err(GeometryError::IndexOutOfRange {
                index: index.to_vec(),
                ranges: self.slots.iter().map(|s| (s.start, s.start + s.dim)).collect(),
            })
        }
    }

    /// Reads a value assuming the index is valid.
    fn lookup(&self, index: &[usize]) -> Expr {
        match self.symmetry.canonicalize(index) {
            Canonical::Zero => Expr::zero(),
            Canonical::Index(canonical, sign) => match self.values.get(&canonical) {
                None => Expr::zero(),
                Some(entry) if sign > 0 => entry.value.clone(),
                Some(entry) => (-&entry.value).simplify(),
            },
        }
    }

    /// Returns the value at `index`, resolved through the symmetries.
    ///
    /// Index tuples that repeat a value inside an antisymmetric group read as zero.
    pub fn get(&self, index: &[usize]) -> Result<Expr> {
        self.check_index(index)?;
        Ok(self.lookup(index))
    }

    /// Stores a value, at the canonical index of its symmetry class.
    ///
    /// Fails with `SymmetryViolation` when an equivalent tuple was explicitly set to a
    /// different value through another index tuple, and with `DegenerateIndex` when a
    /// non-zero value is written to a tuple forced to zero by an antisymmetric group.
    /// Setting the same tuple again replaces its value; use [`Components::overwrite`]
    /// to replace a value set through an equivalent tuple.
    pub fn set(&mut self, index: &[usize], value: impl Into<Expr>) -> Result<()> {
        self.check_index(index)?;
        let value = value.into().simplify();
        match self.symmetry.canonicalize(index) {
            Canonical::Zero if value.is_zero() => Ok(()),
            Canonical::Zero => Err(GeometryError::DegenerateIndex {
                index: index.to_vec(),
            }),
            Canonical::Index(canonical, sign) => {
                let stored = if sign > 0 {
                    value.clone()
                } else {
                    (-&value).simplify()
                };
                match self.values.get(&canonical) {
                    Some(entry) if entry.origin != index && !entry.value.equals(&stored) => {
                        Err(GeometryError::SymmetryViolation {
                            index: index.to_vec(),
                            origin: entry.origin.clone(),
                            existing: self.lookup_as_requested(&entry.value, sign).to_string(),
                            requested: value.to_string(),
                        })
                    }
                    _ => {
                        self.insert_canonical(canonical, stored, index.to_vec());
                        Ok(())
                    }
                }
            }
        }
    }

    fn lookup_as_requested(&self, stored: &Expr, sign: i8) -> Expr {
        if sign > 0 {
            stored.clone()
        } else {
            (-stored).simplify()
        }
    }

    /// Stores a value regardless of what was set before.
    pub fn overwrite(&mut self, index: &[usize], value: impl Into<Expr>) -> Result<()> {
        self.check_index(index)?;
        let value = value.into().simplify();
        match self.symmetry.canonicalize(index) {
            Canonical::Zero if value.is_zero() => Ok(()),
            Canonical::Zero => Err(GeometryError::DegenerateIndex {
                index: index.to_vec(),
            }),
            Canonical::Index(canonical, sign) => {
                let stored = if sign > 0 { value } else { (-value).simplify() };
                self.insert_canonical(canonical, stored, index.to_vec());
                Ok(())
            }
        }
    }

    /// Inserts an already simplified value at a canonical index.
    fn insert_canonical(&mut self, canonical: Vec<usize>, value: Expr, origin: Vec<usize>) {
        if value.is_zero() {
            self.values.remove(&canonical);
        } else {
            self.values.insert(canonical, Entry { value, origin });
        }
    }

    /// Empty components of the same type and chart with another symmetry.
    fn blank(&self, symmetry: Symmetry) -> Components {
        Components {
            slots: self.slots.clone(),
            chart: self.chart,
            symmetry,
            values: BTreeMap::new(),
        }
    }

    /// Index tuples that are their own canonical representative.
    fn canonical_indices(slots: &[Slot], symmetry: &Symmetry) -> Vec<Vec<usize>> {
        let ranges: Vec<Range<usize>> = slots.iter().map(Slot::range).collect();
        index_product(&ranges)
            .into_iter()
            .filter(|index| {
                matches!(symmetry.canonicalize(index), Canonical::Index(ref c, 1) if c == index)
            })
            .collect()
    }

    /// Fills a fresh table by evaluating `value` at every canonical index.
    fn build<F>(
        slots: Vec<Slot>,
        chart: Option<ChartId>,
        symmetry: Symmetry,
        mut value: F,
    ) -> Components
    where
        F: FnMut(&[usize]) -> Expr,
    {
        let mut result = Components {
            slots,
            chart,
            symmetry,
            values: BTreeMap::new(),
        };
        for index in Self::canonical_indices(&result.slots, &result.symmetry) {
            let v = value(&index).simplify();
            result.insert_canonical(index.clone(), v, index);
        }
        result
    }

    /// Stored values at their canonical indices.
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<usize>, &Expr)> {
        self.values.iter().map(|(index, entry)| (index, &entry.value))
    }

    /// Number of stored (non-zero, canonical) values.
    pub fn stored_len(&self) -> usize {
        self.values.len()
    }

    /// Every index tuple of the table, in lexicographic order.
    pub fn indices(&self) -> Vec<Vec<usize>> {
        index_product(&self.ranges())
    }

    pub fn is_zero(&self) -> bool {
        self.values.values().all(|entry| entry.value.is_zero())
    }

    /// Equality of types and of every value up to simplification.
    pub fn equals(&self, other: &Components) -> bool {
        self.equals_with(other, &Assumptions::default())
    }

    pub fn equals_with(&self, other: &Components, assumptions: &Assumptions) -> bool {
        self.slots == other.slots
            && self
                .indices()
                .iter()
                .all(|index| self.lookup(index).equals_with(&other.lookup(index), assumptions))
    }

    /// Applies a linear map to every stored value, keeping the symmetry.
    pub fn map_values<F>(&self, mut f: F) -> Components
    where
        F: FnMut(&Expr) -> Expr,
    {
        let mut result = self.blank(self.symmetry.clone());
        for (index, entry) in &self.values {
            let value = f(&entry.value).simplify();
            result.insert_canonical(index.clone(), value, entry.origin.clone());
        }
        result
    }

    /// Fallible variant of [`Components::map_values`].
    pub fn try_map_values<F>(&self, mut f: F) -> Result<Components>
    where
        F: FnMut(&Expr) -> Result<Expr>,
    {
        let mut result = self.blank(self.symmetry.clone());
        for (index, entry) in &self.values {
            let value = f(&entry.value)?;
            result.insert_canonical(index.clone(), value, entry.origin.clone());
        }
        Ok(result)
    }

    pub fn substitute(&self, bindings: &HashMap<String, Expr>) -> Components {
        self.map_values(|v| v.substitute(bindings))
    }

    pub fn simplify_with(&self, assumptions: &Assumptions) -> Components {
        let mut result = self.blank(self.symmetry.clone());
        for (index, entry) in &self.values {
            let value = entry.value.simplify_with(assumptions);
            result.insert_canonical(index.clone(), value, entry.origin.clone());
        }
        result
    }

    fn check_same_type(&self, other: &Components, operation: &str) -> Result<()> {
        if self.slots != other.slots {
            return Err(GeometryError::TypeMismatch(format!(
                "{operation}: slots {:?} and {:?} differ",
                self.slots, other.slots
            )));
        }
        match (self.chart, other.chart) {
            (Some(a), Some(b)) if a != b => Err(GeometryError::TypeMismatch(format!(
                "{operation}: components written in charts {a} and {b}"
            ))),
            _ => Ok(()),
        }
    }

    fn merged_chart(&self, other: &Components) -> Result<Option<ChartId>> {
        match (self.chart, other.chart) {
            (Some(a), Some(b)) if a != b => Err(GeometryError::TypeMismatch(format!(
                "components written in charts {a} and {b}"
            ))),
            (a, b) => Ok(a.or(b)),
        }
    }

    /// Elementwise sum; the result keeps the symmetries common to both operands.
    pub fn add(&self, other: &Components) -> Result<Components> {
        self.combine(other, "add", |a, b| a + b)
    }

    /// Elementwise difference; the result keeps the symmetries common to both operands.
    pub fn sub(&self, other: &Components) -> Result<Components> {
        self.combine(other, "sub", |a, b| a - b)
    }

    fn combine<F>(&self, other: &Components, operation: &str, op: F) -> Result<Components>
    where
        F: Fn(Expr, Expr) -> Expr,
    {
        self.check_same_type(other, operation)?;
        let chart = self.merged_chart(other)?;
        let symmetry = self.symmetry.intersection(&other.symmetry);
        Ok(Self::build(self.slots.clone(), chart, symmetry, |index| {
            op(self.lookup(index), other.lookup(index))
        }))
    }

    pub fn neg(&self) -> Components {
        self.map_values(|v| -v)
    }

    /// Multiplies every value by a scalar expression.
    pub fn scale(&self, factor: &Expr) -> Components {
        if factor.is_zero() {
            return self.blank(self.symmetry.clone());
        }
        self.map_values(|v| factor * v)
    }

    /// Tensor product; no symmetry is carried over.
    pub fn tensor_product(&self, other: &Components) -> Result<Components> {
        self.product(other, Symmetry::none())
    }

    /// Tensor product keeping the symmetries of both factors.
    pub fn tensor_product_keeping_symmetries(&self, other: &Components) -> Result<Components> {
        let symmetry = self
            .symmetry
            .union(&other.symmetry.shifted(self.rank()));
        self.product(other, symmetry)
    }

    fn product(&self, other: &Components, symmetry: Symmetry) -> Result<Components> {
        let chart = self.merged_chart(other)?;
        let split = self.rank();
        let slots = self.slots.iter().chain(&other.slots).copied().collect();
        Ok(Self::build(slots, chart, symmetry, |index| {
            let left = self.lookup(&index[..split]);
            if left.is_zero() {
                return Expr::zero();
            }
            left * other.lookup(&index[split..])
        }))
    }

    /// Contracts slot `own` of `self` with slot `theirs` of `other`.
    pub fn contract(&self, own: usize, other: &Components, theirs: usize) -> Result<Components> {
        self.contract_pairs(other, &[(own, theirs)])
    }

    /// Contracts several slot pairs `(slot of self, slot of other)` at once.
    ///
    /// Each pair must join an upper and a lower slot over the same frame and index range.
    /// The free slots of `self` come first in the result, followed by those of `other`.
    pub fn contract_pairs(
        &self,
        other: &Components,
        pairs: &[(usize, usize)],
    ) -> Result<Components> {
        if pairs.is_empty() {
            return Err(GeometryError::TypeMismatch(
                "contraction needs at least one slot pair".to_string(),
            ));
        }
        let own: Vec<usize> = pairs.iter().map(|p| p.0).collect();
        let theirs: Vec<usize> = pairs.iter().map(|p| p.1).collect();
        if own.iter().duplicates().next().is_some() || theirs.iter().duplicates().next().is_some()
        {
            return Err(GeometryError::TypeMismatch(format!(
                "slot used twice in contraction {pairs:?}"
            )));
        }
        for &(a, b) in pairs {
            let (Some(sa), Some(sb)) = (self.slots.get(a), other.slots.get(b)) else {
                return Err(GeometryError::TypeMismatch(format!(
                    "contraction slots ({a}, {b}) out of range"
                )));
            };
            if sa.variance == sb.variance || !sa.same_basis(sb) {
                return Err(GeometryError::TypeMismatch(format!(
                    "cannot contract {sa:?} with {sb:?}"
                )));
            }
        }
        let chart = self.merged_chart(other)?;

        let own_free: Vec<usize> = (0..self.rank()).filter(|s| !own.contains(s)).collect();
        let their_free: Vec<usize> = (0..other.rank()).filter(|s| !theirs.contains(s)).collect();
        let slots: Vec<Slot> = own_free
            .iter()
            .map(|s| self.slots[*s])
            .chain(their_free.iter().map(|s| other.slots[*s]))
            .collect();
        let symmetry = self.symmetry.without_slots(&own).union(
            &other
                .symmetry
                .without_slots(&theirs)
                .shifted(own_free.len()),
        );
        let summed = index_product(&pairs.iter().map(|p| self.slots[p.0].range()).collect_vec());

        Ok(Self::build(slots, chart, symmetry, |index| {
            let mut a_index = vec![0; self.rank()];
            let mut b_index = vec![0; other.rank()];
            for (pos, slot) in own_free.iter().enumerate() {
                a_index[*slot] = index[pos];
            }
            for (pos, slot) in their_free.iter().enumerate() {
                b_index[*slot] = index[own_free.len() + pos];
            }
            let mut total = Expr::zero();
            for ks in &summed {
                for (p, k) in ks.iter().enumerate() {
                    a_index[pairs[p].0] = *k;
                    b_index[pairs[p].1] = *k;
                }
                let a = self.lookup(&a_index);
                if a.is_zero() {
                    continue;
                }
                let b = other.lookup(&b_index);
                if b.is_zero() {
                    continue;
                }
                total = total + a * b;
            }
            total
        }))
    }

    /// Contracts two slots of the same components (a trace).
    pub fn trace(&self, upper: usize, lower: usize) -> Result<Components> {
        let (Some(su), Some(sl)) = (self.slots.get(upper), self.slots.get(lower)) else {
            return Err(GeometryError::TypeMismatch(format!(
                "trace slots ({upper}, {lower}) out of range"
            )));
        };
        if upper == lower || su.variance == sl.variance || !su.same_basis(sl) {
            return Err(GeometryError::TypeMismatch(format!(
                "cannot trace slots {upper} and {lower}"
            )));
        }
        let free: Vec<usize> = (0..self.rank())
            .filter(|s| *s != upper && *s != lower)
            .collect();
        let slots = free.iter().map(|s| self.slots[*s]).collect();
        let symmetry = self.symmetry.without_slots(&[upper, lower]);
        Ok(Self::build(slots, self.chart, symmetry, |index| {
            let mut full = vec![0; self.rank()];
            for (pos, slot) in free.iter().enumerate() {
                full[*slot] = index[pos];
            }
            su.range()
                .map(|k| {
                    full[upper] = k;
                    full[lower] = k;
                    self.lookup(&full)
                })
                .fold(Expr::zero(), |acc, v| acc + v)
        }))
    }

    fn check_projection_slots(&self, slots: &[usize]) -> Result<Vec<usize>> {
        let sorted: Vec<usize> = slots.iter().copied().sorted().dedup().collect();
        if sorted.len() < 2 || sorted.len() != slots.len() {
            return Err(GeometryError::InvalidSymmetry(format!(
                "need at least two distinct slots, got {slots:?}"
            )));
        }
        if let Some(s) = sorted.iter().find(|s| **s >= self.rank()) {
            return Err(GeometryError::InvalidSymmetry(format!(
                "slot {s} out of range for rank {}",
                self.rank()
            )));
        }
        let first = self.slots[sorted[0]];
        if sorted.iter().any(|s| self.slots[*s] != first) {
            return Err(GeometryError::TypeMismatch(format!(
                "slots {slots:?} do not share a type"
            )));
        }
        Ok(sorted)
    }

    /// Symmetric part over the given slots.
    pub fn symmetrize(&self, slots: &[usize]) -> Result<Components> {
        self.project(SymmetryKind::Symmetric, slots)
    }

    /// Antisymmetric part over the given slots.
    pub fn antisymmetrize(&self, slots: &[usize]) -> Result<Components> {
        self.project(SymmetryKind::Antisymmetric, slots)
    }

    fn project(&self, kind: SymmetryKind, slots: &[usize]) -> Result<Components> {
        let slots = self.check_projection_slots(slots)?;
        if self.symmetry.kind_containing(&slots) == Some(kind) {
            return Ok(self.clone());
        }
        let symmetry = self.symmetry.after_projection(kind, &slots);
        if self.symmetry.shares_pair(kind.opposite(), &slots) {
            return Ok(self.blank(symmetry));
        }

        let k = slots.len();
        let order: f64 = (1..=k).map(|n| n as f64).product();
        let permutations: Vec<(Vec<usize>, bool)> = (0..k)
            .permutations(k)
            .map(|p| {
                let odd = inversions(&p) % 2 == 1;
                (p, odd)
            })
            .collect();

        Ok(Self::build(
            self.slots.clone(),
            self.chart,
            symmetry,
            |index| {
                let values: Vec<usize> = slots.iter().map(|s| index[*s]).collect();
                let mut permuted = index.to_vec();
                let mut total = Expr::zero();
                for (perm, odd) in &permutations {
                    for (i, s) in slots.iter().enumerate() {
                        permuted[*s] = values[perm[i]];
                    }
                    let v = self.lookup(&permuted);
                    if v.is_zero() {
                        continue;
                    }
                    total = if kind == SymmetryKind::Antisymmetric && *odd {
                        total - v
                    } else {
                        total + v
                    };
                }
                total / Expr::Const(order)
            },
        ))
    }

    /// Exchanges two slots.
    pub fn swap_slots(&self, a: usize, b: usize) -> Result<Components> {
        let mut permutation: Vec<usize> = (0..self.rank()).collect();
        if a >= self.rank() || b >= self.rank() {
            return Err(GeometryError::TypeMismatch(format!(
                "cannot swap slots {a} and {b} of a rank {} tensor",
                self.rank()
            )));
        }
        permutation.swap(a, b);
        self.permute_slots(&permutation)
    }

    /// Reorders slots: slot `i` of the result is slot `permutation[i]` of `self`.
    pub fn permute_slots(&self, permutation: &[usize]) -> Result<Components> {
        let is_permutation = permutation.len() == self.rank()
            && permutation.iter().copied().sorted().eq(0..self.rank());
        if !is_permutation {
            return Err(GeometryError::TypeMismatch(format!(
                "{permutation:?} is not a permutation of the slots of a rank {} tensor",
                self.rank()
            )));
        }
        let mut new_position = vec![0; self.rank()];
        for (i, old) in permutation.iter().enumerate() {
            new_position[*old] = i;
        }
        let slots = permutation.iter().map(|s| self.slots[*s]).collect();
        let symmetry = self.symmetry.relabeled(&new_position);
        Ok(Self::build(slots, self.chart, symmetry, |index| {
            let mut old = vec![0; index.len()];
            for (i, source) in permutation.iter().enumerate() {
                old[*source] = index[i];
            }
            self.lookup(&old)
        }))
    }

    /// Expresses the components in another frame.
    ///
    /// `upper` acts on contravariant slots and `lower_transposed` on covariant
    /// ones: for an upper slot `T'^i = upper[i][j] T^j`, for a lower slot
    /// `T'_i = lower_transposed[i][j] T_j`. Only slots in `from` are transformed.
    pub(crate) fn change_frame(
        &self,
        from: FrameId,
        to: FrameId,
        upper: &SymMatrix,
        lower_transposed: &SymMatrix,
        assumptions: &Assumptions,
    ) -> Components {
        let mut dense: BTreeMap<Vec<usize>, Expr> = self
            .indices()
            .into_iter()
            .map(|index| {
                let value = self.lookup(&index);
                (index, value)
            })
            .filter(|(_, value)| !value.is_zero())
            .collect();

        for (position, slot) in self.slots.iter().enumerate() {
            if slot.frame != from {
                continue;
            }
            let matrix = match slot.variance {
                Variance::Contra => upper,
                Variance::Co => lower_transposed,
            };
            let mut next: BTreeMap<Vec<usize>, Expr> = BTreeMap::new();
            for (index, value) in &dense {
                let j = index[position] - slot.start;
                for i in 0..slot.dim {
                    let coefficient = matrix.get(i, j);
                    if coefficient.is_zero() {
                        continue;
                    }
                    let mut target = index.clone();
                    target[position] = slot.start + i;
                    let term = coefficient * value;
                    let entry = next.entry(target).or_insert_with(Expr::zero);
                    *entry = &*entry + term;
                }
            }
            dense = next
                .into_iter()
                .map(|(index, value)| (index, value.simplify_with(assumptions)))
                .filter(|(_, value)| !value.is_zero())
                .collect();
        }

        let slots = self
            .slots
            .iter()
            .map(|slot| {
                if slot.frame == from {
                    Slot { frame: to, ..*slot }
                } else {
                    *slot
                }
            })
            .collect();
        let mut result = Components {
            slots,
            chart: self.chart,
            symmetry: self.symmetry.clone(),
            values: BTreeMap::new(),
        };
        for (index, value) in dense {
            if matches!(result.symmetry.canonicalize(&index), Canonical::Index(ref c, 1) if *c == index)
            {
                result.insert_canonical(index.clone(), value, index);
            }
        }
        result
    }

    /// The same values read under another symmetry.
    ///
    /// The values are taken at the canonical indices of `symmetry`; they are assumed
    /// to satisfy it, e.g. after a pullback of symmetric components.
    pub fn with_symmetry(&self, symmetry: Symmetry) -> Result<Components> {
        symmetry.validate(self.rank(), |a, b| self.slots[a] == self.slots[b])?;
        Ok(Self::build(self.slots.clone(), self.chart, symmetry, |index| {
            self.lookup(index)
        }))
    }

    /// Replaces the chart tag, used once the values have been rewritten.
    pub(crate) fn retagged(mut self, chart: Option<ChartId>) -> Components {
        self.chart = chart;
        self
    }

    /// Changes the frame of every slot without touching values, for restrictions.
    pub(crate) fn with_frame(mut self, frame: FrameId) -> Components {
        for slot in &mut self.slots {
            slot.frame = frame;
        }
        self
    }
}

impl fmt::Display for Components {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.values.is_empty() {
            return write!(f, "0");
        }
        let lines = self
            .values
            .iter()
            .map(|(index, entry)| format!("[{}] = {}", index.iter().join(","), entry.value))
            .join("\n");
        write!(f, "{lines}")
    }
}
