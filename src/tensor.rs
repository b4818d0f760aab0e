//! Tensor fields with one set of components per frame.
//!
//! A [`TensorField`] of type `(k, l)` stores [`Components`] in any number of
//! frames, all describing the same tensor. Components in a missing frame are
//! derived from a known frame along the shortest chain of registered changes of
//! frame and cached. Binary operations first settle on a common frame,
//! preferring frames in which both operands are already known.

use std::fmt;

use colored::Colorize;
use itertools::Itertools;
use tracing::debug;

use crate::components::{Components, Variance};
use crate::errors::{GeometryError, Result};
use crate::expr::Expr;
use crate::manifold::{ChartId, FrameId, FrameKind, Manifold, ManifoldId, SubsetId};
use crate::repr::{Origin, Representations};
use crate::scalar::ScalarField;
use crate::symmetry::{Symmetry, SymmetryKind};

#[derive(Clone)]
pub struct TensorField {
    manifold: ManifoldId,
    domain: SubsetId,
    name: Option<String>,
    tensor_type: (usize, usize),
    symmetry: Symmetry,
    components: Representations<FrameId, Components>,
}

impl Manifold {
    /// Creates a tensor field of type `(k, l)` without components.
    ///
    /// # Arguments
    /// * `domain` - Subset on which the field is defined
    /// * `name` - Optional name, used in logs and error messages
    /// * `tensor_type` - `(k, l)`: `k` contravariant slots followed by `l` covariant ones
    /// * `symmetry` - Declared symmetries; a group may not mix upper and lower slots
    pub fn tensor_field(
        &self,
        domain: SubsetId,
        name: Option<&str>,
        tensor_type: (usize, usize),
        symmetry: Symmetry,
    ) -> Result<TensorField> {
        self.subset_name(domain)?;
        let (k, l) = tensor_type;
        symmetry.validate(k + l, |a, b| (a < k) == (b < k))?;
        Ok(TensorField {
            manifold: self.id(),
            domain,
            name: name.map(str::to_string),
            tensor_type,
            symmetry,
            components: Representations::new(),
        })
    }

    pub fn vector_field(&self, domain: SubsetId, name: Option<&str>) -> Result<TensorField> {
        self.tensor_field(domain, name, (1, 0), Symmetry::none())
    }

    pub fn one_form(&self, domain: SubsetId, name: Option<&str>) -> Result<TensorField> {
        self.tensor_field(domain, name, (0, 1), Symmetry::none())
    }
}

impl TensorField {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn domain(&self) -> SubsetId {
        self.domain
    }

    pub fn manifold(&self) -> ManifoldId {
        self.manifold
    }

    pub fn tensor_type(&self) -> (usize, usize) {
        self.tensor_type
    }

    pub fn rank(&self) -> usize {
        self.tensor_type.0 + self.tensor_type.1
    }

    pub fn symmetry(&self) -> &Symmetry {
        &self.symmetry
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    fn check_manifold(&self, manifold: &Manifold) -> Result<()> {
        if manifold.id() != self.manifold {
            return Err(GeometryError::DomainMismatch(format!(
                "tensor field {} is not defined on manifold {}",
                self.label(),
                manifold.name()
            )));
        }
        Ok(())
    }

    /// A frame can carry components when its domain and the field's are nested.
    fn check_frame(&self, manifold: &Manifold, frame: FrameId) -> Result<()> {
        self.check_manifold(manifold)?;
        let domain = manifold.frame_info(frame)?.domain();
        manifold.common_subset(domain, self.domain).map(|_| ())
    }

    /// Empty components in `frame`, written in the chart of a coordinate frame or
    /// else in the default chart of the domain.
    fn blank(&self, manifold: &Manifold, frame: FrameId) -> Result<Components> {
        self.check_frame(manifold, frame)?;
        let components = Components::of_type(
            frame,
            manifold.start_index(),
            manifold.dim(),
            self.tensor_type,
            self.symmetry.clone(),
        )?;
        let chart = match manifold.frame_info(frame)?.kind() {
            FrameKind::Coordinate(chart) => Some(chart),
            FrameKind::Vector => manifold.default_chart(self.domain)?,
        };
        Ok(match chart {
            Some(chart) => components.with_chart(chart),
            None => components,
        })
    }

    /// Installs empty components in `frame` for the caller to fill.
    ///
    /// Components derived earlier in other frames go stale; components set
    /// explicitly in other frames are kept as they are.
    pub fn set_comp(&mut self, manifold: &Manifold, frame: FrameId) -> Result<&mut Components> {
        let blank = self.blank(manifold, frame)?;
        Ok(self.components.set(frame, blank))
    }

    /// Returns the components in `frame` for editing without touching other frames.
    ///
    /// Existing components in `frame` are kept; otherwise empty ones are installed.
    /// The caller is trusted to keep every frame consistent.
    pub fn add_comp(&mut self, manifold: &Manifold, frame: FrameId) -> Result<&mut Components> {
        self.check_frame(manifold, frame)?;
        if self.components.contains(frame) {
            return self
                .components
                .get_mut(frame)
                .ok_or_else(|| GeometryError::UnknownFrame(frame.to_string()));
        }
        let blank = self.blank(manifold, frame)?;
        Ok(self.components.add(frame, blank))
    }

    /// Frames with fresh components, in id order.
    pub fn frames(&self) -> Vec<FrameId> {
        self.components.keys()
    }

    pub fn is_stale(&self, frame: FrameId) -> bool {
        self.components.is_stale(frame)
    }

    pub fn origin(&self, frame: FrameId) -> Option<Origin> {
        self.components.origin(frame)
    }

    /// Components in `frame`, derived and cached when missing.
    pub fn comp(&mut self, manifold: &Manifold, frame: FrameId) -> Result<&Components> {
        if !self.components.contains(frame) {
            let derived = self.derive_comp(manifold, frame)?;
            self.components.cache(frame, derived);
        }
        self.components
            .get(frame)
            .ok_or_else(|| GeometryError::UnknownFrame(frame.to_string()))
    }

    /// Components in `frame`, derived without caching.
    ///
    /// Fails with `NoCommonFrame` when the field has no components at all, or when
    /// no chain of changes of frame leads from a known frame to `frame`.
    pub fn derive_comp(&self, manifold: &Manifold, frame: FrameId) -> Result<Components> {
        self.check_frame(manifold, frame)?;
        if let Some(components) = self.components.get(frame) {
            return Ok(components.clone());
        }
        if self.components.is_empty() {
            return Err(GeometryError::NoCommonFrame(format!(
                "tensor field {} has no components",
                self.label()
            )));
        }
        let known = self.components.keys();
        let change = manifold.frame_change_from_any(&known, frame)?;
        let source = self
            .components
            .get(change.from())
            .ok_or_else(|| GeometryError::NoCommonFrame(format!("no components in {}", change.from())))?;
        debug!(
            field = self.label(),
            from = %change.from(),
            to = %frame,
            "deriving components"
        );
        manifold.apply_frame_change(source, &change)
    }

    /// Components in `frame` with values written in the coordinates of `chart`.
    pub fn comp_in_chart(
        &mut self,
        manifold: &Manifold,
        frame: FrameId,
        chart: ChartId,
    ) -> Result<Components> {
        let components = self.comp(manifold, frame)?.clone();
        manifold.components_in_chart(&components, chart)
    }

    /// Whether components in `frame` are known or derivable, without deriving them.
    fn reaches(&self, manifold: &Manifold, frame: FrameId) -> bool {
        !self.components.is_empty()
            && self.check_frame(manifold, frame).is_ok()
            && manifold
                .frame_change_from_any(&self.components.keys(), frame)
                .is_ok()
    }

    /// Frames in which both fields can be expressed, best first.
    ///
    /// Frames where both already have components come first, in id order, followed
    /// by frames of either operand into which the other can be derived. Only the
    /// existence of a change of frame is checked; nothing is derived.
    pub fn common_frames(&self, other: &TensorField, manifold: &Manifold) -> Vec<FrameId> {
        let own = self.components.keys();
        let theirs = other.components.keys();
        let shared = own.iter().filter(|f| theirs.contains(f));
        let derivable_here = own
            .iter()
            .filter(|f| !theirs.contains(f) && other.reaches(manifold, **f));
        let derivable_there = theirs
            .iter()
            .filter(|f| !own.contains(f) && self.reaches(manifold, **f));
        shared
            .chain(derivable_here)
            .chain(derivable_there)
            .copied()
            .collect()
    }

    /// Components of both operands in a common frame and chart, and the common domain.
    fn aligned(
        &self,
        other: &TensorField,
        manifold: &Manifold,
        operation: &str,
    ) -> Result<(Components, Components, FrameId, SubsetId)> {
        self.check_manifold(manifold)?;
        other.check_manifold(manifold)?;
        let domain = manifold.common_subset(self.domain, other.domain)?;
        let frame = self
            .common_frames(other, manifold)
            .into_iter()
            .next()
            .ok_or_else(|| {
                GeometryError::NoCommonFrame(format!(
                    "{operation}: {} and {} share no frame",
                    self.label(),
                    other.label()
                ))
            })?;
        let a = self.derive_comp(manifold, frame)?;
        let b = other.derive_comp(manifold, frame)?;
        match (a.chart(), b.chart()) {
            (Some(ca), Some(cb)) if ca != cb => match manifold.components_in_chart(&b, ca) {
                Ok(b) => Ok((a, b, frame, domain)),
                Err(_) => Ok((manifold.components_in_chart(&a, cb)?, b, frame, domain)),
            },
            _ => Ok((a, b, frame, domain)),
        }
    }

    /// A field with the given components in `frame` as its only representation.
    fn from_components(
        &self,
        domain: SubsetId,
        tensor_type: (usize, usize),
        symmetry: Symmetry,
        frame: FrameId,
        components: Components,
    ) -> TensorField {
        let mut result = TensorField {
            manifold: self.manifold,
            domain,
            name: None,
            tensor_type,
            symmetry,
            components: Representations::new(),
        };
        result.components.set(frame, components);
        result
    }

    fn check_same_type(&self, other: &TensorField, operation: &str) -> Result<()> {
        if self.tensor_type != other.tensor_type {
            return Err(GeometryError::TypeMismatch(format!(
                "{operation}: {} has type {:?}, {} has type {:?}",
                self.label(),
                self.tensor_type,
                other.label(),
                other.tensor_type
            )));
        }
        Ok(())
    }

    /// Sum; the result keeps the symmetries common to both operands.
    pub fn add(&self, other: &TensorField, manifold: &Manifold) -> Result<TensorField> {
        self.check_same_type(other, "add")?;
        let (a, b, frame, domain) = self.aligned(other, manifold, "add")?;
        let symmetry = self.symmetry.intersection(&other.symmetry);
        Ok(self.from_components(domain, self.tensor_type, symmetry, frame, a.add(&b)?))
    }

    pub fn sub(&self, other: &TensorField, manifold: &Manifold) -> Result<TensorField> {
        self.check_same_type(other, "sub")?;
        let (a, b, frame, domain) = self.aligned(other, manifold, "sub")?;
        let symmetry = self.symmetry.intersection(&other.symmetry);
        Ok(self.from_components(domain, self.tensor_type, symmetry, frame, a.sub(&b)?))
    }

    /// Multiplies every representation by a constant (or parameter) expression.
    pub fn scale(&self, factor: &Expr) -> TensorField {
        TensorField {
            name: None,
            components: self.components.map(|_, c| c.scale(factor)),
            ..self.clone()
        }
    }

    /// Product with a scalar field, computed in every frame with fresh components.
    pub fn mul_scalar(&self, scalar: &ScalarField, manifold: &Manifold) -> Result<TensorField> {
        self.check_manifold(manifold)?;
        scalar.check_manifold(manifold)?;
        let domain = manifold.common_subset(self.domain, scalar.domain())?;
        let components = self.components.try_map(|_, c| {
            let chart = match c.chart() {
                Some(chart) => chart,
                None => scalar.charts().first().copied().ok_or_else(|| {
                    GeometryError::NoCommonChart("scalar field has no expression".to_string())
                })?,
            };
            let factor = scalar.derive_expr(manifold, chart)?;
            Ok::<_, GeometryError>(
                c.clone()
                    .retagged(Some(chart))
                    .scale(&factor)
                    .simplify_with(&manifold.chart_assumptions(chart)?),
            )
        })?;
        Ok(TensorField {
            domain,
            name: None,
            components,
            ..self.clone()
        })
    }

    /// Permutation putting the upper slots of two concatenated operands first.
    fn upper_first(left: (usize, usize), right: (usize, usize)) -> Vec<usize> {
        let (k1, l1) = left;
        let (k2, l2) = right;
        let rank1 = k1 + l1;
        (0..k1)
            .chain(rank1..rank1 + k2)
            .chain(k1..rank1)
            .chain(rank1 + k2..rank1 + k2 + l2)
            .collect()
    }

    /// Tensor product, of type `(k1 + k2, l1 + l2)` with the upper slots first.
    pub fn tensor_product(&self, other: &TensorField, manifold: &Manifold) -> Result<TensorField> {
        let (a, b, frame, domain) = self.aligned(other, manifold, "tensor product")?;
        let product = a
            .tensor_product(&b)?
            .permute_slots(&Self::upper_first(self.tensor_type, other.tensor_type))?;
        let tensor_type = (
            self.tensor_type.0 + other.tensor_type.0,
            self.tensor_type.1 + other.tensor_type.1,
        );
        Ok(self.from_components(domain, tensor_type, Symmetry::none(), frame, product))
    }

    /// Contraction of slot `own` of `self` with slot `theirs` of `other`.
    pub fn contract(
        &self,
        own: usize,
        other: &TensorField,
        theirs: usize,
        manifold: &Manifold,
    ) -> Result<TensorField> {
        self.contract_pairs(other, &[(own, theirs)], manifold)
    }

    /// Contraction over several slot pairs `(slot of self, slot of other)`.
    ///
    /// The free slots are reordered so that upper slots come first; a result of
    /// rank 0 is a `(0, 0)` tensor field, see [`TensorField::contract_to_scalar`].
    pub fn contract_pairs(
        &self,
        other: &TensorField,
        pairs: &[(usize, usize)],
        manifold: &Manifold,
    ) -> Result<TensorField> {
        let (a, b, frame, domain) = self.aligned(other, manifold, "contraction")?;
        let contracted = a.contract_pairs(&b, pairs)?;
        let upper: Vec<usize> = (0..contracted.rank())
            .filter(|s| contracted.slots()[*s].variance == Variance::Contra)
            .collect();
        let lower = (0..contracted.rank())
            .filter(|s| contracted.slots()[*s].variance == Variance::Co);
        let permutation: Vec<usize> = upper.iter().copied().chain(lower).collect();
        let reordered = contracted.permute_slots(&permutation)?;
        let tensor_type = (upper.len(), reordered.rank() - upper.len());
        let symmetry = reordered.symmetry().clone();
        Ok(self.from_components(domain, tensor_type, symmetry, frame, reordered))
    }

    /// Full contraction over the given slot pairs, as a scalar field.
    ///
    /// The expression is placed in the chart the components were written in, or
    /// the default chart of the domain.
    pub fn contract_to_scalar(
        &self,
        other: &TensorField,
        pairs: &[(usize, usize)],
        manifold: &Manifold,
    ) -> Result<ScalarField> {
        if pairs.len() != self.rank() || pairs.len() != other.rank() {
            return Err(GeometryError::TypeMismatch(format!(
                "{} slot pairs do not contract ranks {} and {} to a scalar",
                pairs.len(),
                self.rank(),
                other.rank()
            )));
        }
        let (a, b, _, domain) = self.aligned(other, manifold, "contraction")?;
        let contracted = a.contract_pairs(&b, pairs)?;
        let chart = match contracted.chart() {
            Some(chart) => chart,
            None => manifold
                .default_chart(domain)?
                .ok_or_else(|| GeometryError::NoCommonChart("no chart on the domain".to_string()))?,
        };
        manifold.scalar_field_from(domain, None, chart, contracted.get(&[])?)
    }

    fn project(&self, kind: SymmetryKind, slots: &[usize]) -> Result<TensorField> {
        let (k, _) = self.tensor_type;
        let sorted: Vec<usize> = slots.iter().copied().sorted().dedup().collect();
        if sorted.len() < 2 || sorted.len() != slots.len() || sorted.iter().any(|s| *s >= self.rank()) {
            return Err(GeometryError::InvalidSymmetry(format!(
                "need at least two distinct slots of a tensor of type {:?}, got {slots:?}",
                self.tensor_type
            )));
        }
        if !sorted.iter().map(|s| *s < k).all_equal() {
            return Err(GeometryError::TypeMismatch(format!(
                "slots {slots:?} do not share a variance in a tensor of type {:?}",
                self.tensor_type
            )));
        }
        let components = self.components.try_map(|_, c| match kind {
            SymmetryKind::Symmetric => c.symmetrize(slots),
            SymmetryKind::Antisymmetric => c.antisymmetrize(slots),
        })?;
        Ok(TensorField {
            manifold: self.manifold,
            domain: self.domain,
            name: None,
            tensor_type: self.tensor_type,
            symmetry: self.symmetry.after_projection(kind, &sorted),
            components,
        })
    }

    /// Symmetric part over the given slots, in every frame with fresh components.
    pub fn symmetrize(&self, slots: &[usize]) -> Result<TensorField> {
        self.project(SymmetryKind::Symmetric, slots)
    }

    /// Antisymmetric part over the given slots, in every frame with fresh components.
    pub fn antisymmetrize(&self, slots: &[usize]) -> Result<TensorField> {
        self.project(SymmetryKind::Antisymmetric, slots)
    }

    /// The field restricted to a subset of its domain.
    ///
    /// Components in frames whose domain is not nested with `subset` are dropped.
    pub fn restrict(&self, manifold: &Manifold, subset: SubsetId) -> Result<TensorField> {
        self.check_manifold(manifold)?;
        if !manifold.is_subset(subset, self.domain)? {
            return Err(GeometryError::DomainMismatch(format!(
                "{} is not contained in the domain of {}",
                manifold.subset_name(subset)?,
                self.label()
            )));
        }
        let components = self.components.filtered(|frame| {
            manifold
                .frame_info(frame)
                .and_then(|info| manifold.common_subset(info.domain(), subset))
                .is_ok()
        });
        Ok(TensorField {
            domain: subset,
            components,
            ..self.clone()
        })
    }

    /// Compares every pair of representations related by a known change of frame.
    ///
    /// Pairs of frames without a change of frame between them are not compared.
    /// Fails with `Inconsistent` on the first disagreement.
    pub fn check_consistency(&self, manifold: &Manifold) -> Result<()> {
        self.check_manifold(manifold)?;
        for ((fa, a), (fb, b)) in self.components.iter().tuple_combinations() {
            let Ok(change) = manifold.frame_change(fa, fb) else {
                debug!(field = self.label(), first = %fa, second = %fb, "no change of frame to compare through");
                continue;
            };
            let moved = manifold.apply_frame_change(a, &change)?;
            let (moved, reference) = match (moved.chart(), b.chart()) {
                (Some(cm), Some(cb)) if cm != cb => {
                    match manifold.components_in_chart(&moved, cb) {
                        Ok(moved) => (moved, b.clone()),
                        Err(_) => (moved, manifold.components_in_chart(b, cm)?),
                    }
                }
                _ => (moved, b.clone()),
            };
            let assumptions = match reference.chart() {
                Some(chart) => manifold.chart_assumptions(chart)?,
                None => Default::default(),
            };
            if !moved.equals_with(&reference, &assumptions) {
                return Err(GeometryError::Inconsistent(format!(
                    "tensor field {}: components in {fa} and {fb} disagree",
                    self.label()
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for TensorField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {} of type {:?}",
            "TensorField".bold(),
            self.label().cyan(),
            self.tensor_type
        )?;
        writeln!(f, "    {}: {}", "Domain".cyan(), self.domain)?;
        if !self.symmetry.is_none() {
            writeln!(f, "    {}: {}", "Symmetry".cyan(), self.symmetry)?;
        }
        for (frame, components) in self.components.iter() {
            let origin = match self.components.origin(frame) {
                Some(Origin::Derived) => "derived".yellow(),
                _ => "set".green(),
            };
            writeln!(f, "    {frame} ({origin}):")?;
            for line in components.to_string().lines() {
                writeln!(f, "        {line}")?;
            }
        }
        Ok(())
    }
}
