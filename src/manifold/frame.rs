//! Vector frames and changes of frame.
//!
//! A change of frame `from -> to` is stored as a matrix `P` with
//! `to_j = sum_i P[i][j] from_i`, together with `P^-1`. Vector components then
//! transform with `P^-1` and one-form components with `P^T`. The entries of `P`
//! are expressions in the coordinates of at most one chart, recorded with it.

use std::fmt;

use itertools::Itertools;
use tracing::debug;

use super::{ChartId, FrameId, Manifold, SubsetId};
use crate::canon::Assumptions;
use crate::components::Components;
use crate::errors::{GeometryError, Result};
use crate::matrix::SymMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// The frame `d/dx^i` of a chart.
    Coordinate(ChartId),
    /// A frame declared by the user.
    Vector,
}

#[derive(Debug, Clone)]
pub struct Frame {
    id: FrameId,
    domain: SubsetId,
    name: String,
    kind: FrameKind,
}

impl Frame {
    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn domain(&self) -> SubsetId {
        self.domain
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A change of basis between two frames.
#[derive(Debug, Clone)]
pub struct FrameChange {
    from: FrameId,
    to: FrameId,
    matrix: SymMatrix,
    inverse: SymMatrix,
    chart: Option<ChartId>,
}

impl FrameChange {
    pub(crate) fn new(
        from: FrameId,
        to: FrameId,
        matrix: SymMatrix,
        inverse: SymMatrix,
        chart: Option<ChartId>,
    ) -> Self {
        Self {
            from,
            to,
            matrix,
            inverse,
            chart,
        }
    }

    pub fn from(&self) -> FrameId {
        self.from
    }

    pub fn to(&self) -> FrameId {
        self.to
    }

    /// `P`, expressing the vectors of `to` in terms of those of `from`.
    pub fn matrix(&self) -> &SymMatrix {
        &self.matrix
    }

    pub fn inverse(&self) -> &SymMatrix {
        &self.inverse
    }

    /// Chart whose coordinates appear in the matrix entries, if any.
    pub fn chart(&self) -> Option<ChartId> {
        self.chart
    }

    pub fn reversed(&self) -> FrameChange {
        FrameChange {
            from: self.to,
            to: self.from,
            matrix: self.inverse.clone(),
            inverse: self.matrix.clone(),
            chart: self.chart,
        }
    }
}

impl Manifold {
    /// Appends a frame to the registry; the first frame of a subset becomes its default.
    pub(super) fn push_frame(&mut self, domain: SubsetId, name: &str, kind: FrameKind) -> FrameId {
        let id = FrameId {
            manifold: self.id,
            index: self.frames.len(),
        };
        self.frames.push(Frame {
            id,
            domain,
            name: name.to_string(),
            kind,
        });
        let subset = &mut self.subsets[domain.index];
        subset.frames.push(id);
        if subset.default_frame.is_none() {
            subset.default_frame = Some(id);
        }
        id
    }

    /// Declares a vector frame on an open subset.
    ///
    /// The frame is unrelated to every other frame until changes of frame are added
    /// with [`Manifold::add_frame_change`].
    pub fn vector_frame(&mut self, domain: SubsetId, name: &str) -> Result<FrameId> {
        let subset = self.subset_data(domain)?;
        if !subset.open {
            return Err(GeometryError::DomainMismatch(format!(
                "frame {name} on non-open subset {}",
                subset.name
            )));
        }
        let id = self.push_frame(domain, name, FrameKind::Vector);
        debug!(frame = name, id = %id, "creating vector frame");
        Ok(id)
    }

    pub fn frame_info(&self, id: FrameId) -> Result<&Frame> {
        if id.manifold != self.id {
            return Err(self.foreign(&id));
        }
        self.frames
            .get(id.index)
            .ok_or_else(|| GeometryError::UnknownFrame(id.to_string()))
    }

    /// Registers the change of frame `from -> to` and its inverse.
    ///
    /// # Arguments
    /// * `from` - Source frame
    /// * `to` - Target frame
    /// * `matrix` - `P` with `to_j = sum_i P[i][j] from_i`; its entries may only use
    ///   the coordinates of a single chart covering both frames
    ///
    /// Fails with `NonInvertibleTransition` when `P` is singular.
    pub fn add_frame_change(&mut self, from: FrameId, to: FrameId, matrix: SymMatrix) -> Result<()> {
        if from == to {
            return Err(GeometryError::NonInvertibleTransition(format!(
                "change of frame from {} to itself",
                self.frame_info(from)?.name
            )));
        }
        let domain = self.common_subset(self.frame_info(from)?.domain, self.frame_info(to)?.domain)?;
        if matrix.dim() != self.dim {
            return Err(GeometryError::DimensionMismatch {
                expected: self.dim,
                got: matrix.dim(),
            });
        }
        let chart = self.chart_of_symbols(domain, &matrix)?;
        let assumptions = match chart {
            Some(chart) => self.chart_assumptions(chart)?,
            None => Assumptions::default(),
        };
        let matrix = matrix.simplify_with(&assumptions);
        let inverse = matrix.inverse(&assumptions).map_err(|_| {
            GeometryError::NonInvertibleTransition(format!(
                "singular change of frame {} -> {}",
                self.frames[from.index].name, self.frames[to.index].name
            ))
        })?;
        debug!(
            from = %self.frames[from.index],
            to = %self.frames[to.index],
            chart = ?chart,
            "registering change of frame"
        );
        let change = FrameChange::new(from, to, matrix, inverse, chart);
        let graph = self.frame_changes.get_mut();
        graph.register(to, from, change.reversed());
        graph.register(from, to, change);
        Ok(())
    }

    /// The chart whose coordinates contain every symbol of `matrix`.
    fn chart_of_symbols(&self, domain: SubsetId, matrix: &SymMatrix) -> Result<Option<ChartId>> {
        let symbols = matrix.free_symbols();
        if symbols.is_empty() {
            return Ok(None);
        }
        for chart in self.charts_covering(domain)? {
            let coordinates = self.charts[chart.index].symbols();
            if symbols.iter().all(|s| coordinates.contains(s)) {
                return Ok(Some(chart));
            }
        }
        Err(GeometryError::InvalidCoordinate(format!(
            "no chart on {} has coordinates {{{}}}",
            self.subsets[domain.index].name,
            symbols.iter().join(", ")
        )))
    }

    /// The change of frame `from -> to`.
    ///
    /// Registered changes are returned directly; otherwise the shortest chain of
    /// registered changes is composed and cached. Fails with `NoCommonFrame` when
    /// no chain of at most `max_path_depth` steps exists.
    pub fn frame_change(&self, from: FrameId, to: FrameId) -> Result<FrameChange> {
        self.frame_change_from_any(&[from], to)
    }

    /// Change of frame to `target` from the first of `sources` that can reach it.
    pub fn frame_change_from_any(&self, sources: &[FrameId], target: FrameId) -> Result<FrameChange> {
        self.frame_info(target)?;
        for source in sources {
            self.frame_info(*source)?;
        }
        if sources.contains(&target) {
            return Ok(FrameChange::new(
                target,
                target,
                SymMatrix::identity(self.dim),
                SymMatrix::identity(self.dim),
                None,
            ));
        }
        let direct = {
            let graph = self.frame_changes.borrow();
            sources.iter().find_map(|s| graph.edge(*s, target).cloned())
        };
        if let Some(change) = direct {
            self.bump(|s| s.cache_hits += 1);
            return Ok(change);
        }

        // changes of frame are always registered in both directions, so the search
        // runs backwards from the single target
        self.bump(|s| s.path_searches += 1);
        let steps = {
            let graph = self.frame_changes.borrow();
            graph
                .shortest_path(target, |f| sources.contains(f), self.config.max_path_depth)
                .and_then(|mut path| {
                    path.reverse();
                    graph.path_values(&path)
                })
        };
        let Some(steps) = steps else {
            return Err(GeometryError::NoCommonFrame(format!(
                "no change of frame to {} from any of [{}]",
                self.frames[target.index].name,
                sources
                    .iter()
                    .map(|s| self.frames[s.index].name.as_str())
                    .join(", ")
            )));
        };
        let composed = self.compose_frame_changes(&steps)?;
        debug!(
            from = %composed.from,
            to = %composed.to,
            hops = steps.len(),
            "composed change of frame"
        );
        self.frame_changes
            .borrow_mut()
            .cache(composed.from, composed.to, composed.clone());
        self.bump(|s| s.compositions += 1);
        Ok(composed)
    }

    /// Composes `f0 -> f1 -> ... -> fn`: `P = P1 P2 ... Pn`.
    fn compose_frame_changes(&self, steps: &[FrameChange]) -> Result<FrameChange> {
        let first = steps
            .first()
            .ok_or_else(|| GeometryError::NoCommonFrame("empty frame path".to_string()))?;
        let mut composed = first.clone();
        for step in &steps[1..] {
            let (current, next, chart) = self.harmonize(&composed, step)?;
            let assumptions = match chart {
                Some(chart) => self.chart_assumptions(chart)?,
                None => Assumptions::default(),
            };
            composed = FrameChange {
                from: composed.from,
                to: step.to,
                matrix: current.matrix.mul(&next.matrix, &assumptions)?,
                inverse: next.inverse.mul(&current.inverse, &assumptions)?,
                chart,
            };
        }
        Ok(composed)
    }

    /// Brings two changes of frame to a common chart.
    fn harmonize(
        &self,
        a: &FrameChange,
        b: &FrameChange,
    ) -> Result<(FrameChange, FrameChange, Option<ChartId>)> {
        match (a.chart, b.chart) {
            (Some(ka), Some(kb)) if ka != kb => {
                if let Ok(b) = self.change_in_chart(b, ka) {
                    return Ok((a.clone(), b, Some(ka)));
                }
                let a = self.change_in_chart(a, kb)?;
                Ok((a, b.clone(), Some(kb)))
            }
            (ka, kb) => Ok((a.clone(), b.clone(), ka.or(kb))),
        }
    }

    fn change_in_chart(&self, change: &FrameChange, chart: ChartId) -> Result<FrameChange> {
        let Some(own) = change.chart else {
            return Ok(change.clone());
        };
        Ok(FrameChange {
            matrix: self.express_matrix(&change.matrix, own, chart)?,
            inverse: self.express_matrix(&change.inverse, own, chart)?,
            chart: Some(chart),
            ..change.clone()
        })
    }

    /// Rewrites matrix entries in the coordinates of `from` into those of `to`.
    pub(crate) fn express_matrix(&self, matrix: &SymMatrix, from: ChartId, to: ChartId) -> Result<SymMatrix> {
        if from == to {
            return Ok(matrix.clone());
        }
        let transition = self.transition_map(to, from)?;
        let bindings = self.chart_info(from)?.bindings(transition.functions());
        let assumptions = self.chart_assumptions(to)?;
        Ok(matrix.substitute(&bindings).simplify_with(&assumptions))
    }

    /// Applies a change of frame to components given in its source frame.
    ///
    /// When the matrix and the components are written in different charts, the
    /// matrix is rewritten in the chart of the components, or failing that the
    /// components in the chart of the matrix.
    pub(crate) fn apply_frame_change(
        &self,
        components: &Components,
        change: &FrameChange,
    ) -> Result<Components> {
        if change.from == change.to {
            return Ok(components.clone());
        }
        let (components, change, chart) = match (components.chart(), change.chart) {
            (Some(c), Some(k)) if c != k => match self.change_in_chart(change, c) {
                Ok(change) => (components.clone(), change, Some(c)),
                Err(_) => {
                    let moved = self.components_in_chart(components, k)?;
                    (moved, change.clone(), Some(k))
                }
            },
            (c, k) => (components.clone(), change.clone(), c.or(k)),
        };
        let assumptions = match chart {
            Some(chart) => self.chart_assumptions(chart)?,
            None => Assumptions::default(),
        };
        Ok(components
            .change_frame(
                change.from,
                change.to,
                &change.inverse,
                &change.matrix.transpose(),
                &assumptions,
            )
            .retagged(chart))
    }

    /// Rewrites component values in the coordinates of `chart`.
    pub(crate) fn components_in_chart(&self, components: &Components, chart: ChartId) -> Result<Components> {
        let Some(own) = components.chart() else {
            return Ok(components.clone().retagged(Some(chart)));
        };
        if own == chart {
            return Ok(components.clone());
        }
        let transition = self.transition_map(chart, own)?;
        let bindings = self.chart_info(own)?.bindings(transition.functions());
        let assumptions = self.chart_assumptions(chart)?;
        Ok(components
            .substitute(&bindings)
            .simplify_with(&assumptions)
            .retagged(Some(chart)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::symmetry::Symmetry;

    fn plane() -> (Manifold, ChartId, FrameId, FrameId) {
        let mut m = Manifold::new(2, "R2");
        let root = m.root();
        let cart = m.chart(root, "X", "x y").unwrap();
        let e = m.coordinate_frame(cart).unwrap();
        let f = m.vector_frame(root, "f").unwrap();
        (m, cart, e, f)
    }

    fn diag(a: &str, b: &str) -> SymMatrix {
        SymMatrix::parse_rows(&[&[a, "0"], &["0", b]]).unwrap()
    }

    #[test]
    fn test_frames_are_registered() {
        let (m, cart, e, f) = plane();
        let root = m.root();
        assert_eq!(m.frames(root).unwrap(), &[e, f]);
        assert_eq!(m.default_frame(root).unwrap(), Some(e));
        assert_eq!(m.frame_info(e).unwrap().kind(), FrameKind::Coordinate(cart));
        assert_eq!(m.frame_info(f).unwrap().name(), "f");

        let other = Manifold::new(2, "N");
        assert!(matches!(other.frame_info(e), Err(GeometryError::DomainMismatch(_))));
    }

    #[test]
    fn test_rotation_of_vector_components() {
        let (mut m, _, e, f) = plane();
        let rotation = SymMatrix::parse_rows(&[&["0", "-1"], &["1", "0"]]).unwrap();
        m.add_frame_change(e, f, rotation).unwrap();

        let mut v = Components::of_type(e, 0, 2, (1, 0), Symmetry::none()).unwrap();
        v.set(&[0], 1).unwrap();
        let change = m.frame_change(e, f).unwrap();
        let w = m.apply_frame_change(&v, &change).unwrap();
        assert_eq!(w.frame(), Some(f));
        assert!(w.get(&[0]).unwrap().is_zero());
        assert!(w.get(&[1]).unwrap().equals(&Expr::constant(-1.0)));

        // and back
        let back = m.frame_change(f, e).unwrap();
        let v2 = m.apply_frame_change(&w, &back).unwrap();
        assert!(v2.equals(&v));
    }

    #[test]
    fn test_one_form_transforms_with_transpose() {
        let (mut m, _, e, f) = plane();
        m.add_frame_change(e, f, diag("2", "3")).unwrap();
        let mut w = Components::of_type(e, 0, 2, (0, 1), Symmetry::none()).unwrap();
        w.set(&[0], 1).unwrap();
        w.set(&[1], 1).unwrap();
        let change = m.frame_change(e, f).unwrap();
        let w = m.apply_frame_change(&w, &change).unwrap();
        assert!(w.get(&[0]).unwrap().equals(&Expr::constant(2.0)));
        assert!(w.get(&[1]).unwrap().equals(&Expr::constant(3.0)));
    }

    #[test]
    fn test_composed_change_is_memoised() {
        let (mut m, _, e, f) = plane();
        let g = m.vector_frame(m.root(), "g").unwrap();
        m.add_frame_change(e, f, diag("2", "1")).unwrap();
        m.add_frame_change(f, g, diag("1", "3")).unwrap();
        m.reset_graph_stats();

        let change = m.frame_change(e, g).unwrap();
        assert!(change
            .matrix()
            .equals_with(&diag("2", "3"), &Assumptions::default()));
        assert!(change
            .inverse()
            .equals_with(&diag("0.5", "1/3"), &Assumptions::default()));
        let stats = m.graph_stats();
        assert_eq!(stats.path_searches, 1);
        assert_eq!(stats.compositions, 1);

        m.frame_change(e, g).unwrap();
        let stats = m.graph_stats();
        assert_eq!(stats.path_searches, 1);
        assert_eq!(stats.cache_hits, 1);
    }

    #[test]
    fn test_from_any_and_missing() {
        let (mut m, _, e, f) = plane();
        let h = m.vector_frame(m.root(), "h").unwrap();
        m.add_frame_change(e, f, diag("2", "1")).unwrap();
        let change = m.frame_change_from_any(&[h, e], f).unwrap();
        assert_eq!(change.from(), e);
        assert!(matches!(
            m.frame_change(h, f),
            Err(GeometryError::NoCommonFrame(_))
        ));
        let identity = m.frame_change_from_any(&[h, f], f).unwrap();
        assert!(identity.matrix().is_identity(&Assumptions::default()));
    }

    #[test]
    fn test_singular_and_foreign_symbols() {
        let (mut m, cart, e, f) = plane();
        let singular = SymMatrix::parse_rows(&[&["1", "1"], &["1", "1"]]).unwrap();
        assert!(matches!(
            m.add_frame_change(e, f, singular),
            Err(GeometryError::NonInvertibleTransition(_))
        ));
        assert!(matches!(
            m.add_frame_change(e, f, diag("q", "1")),
            Err(GeometryError::InvalidCoordinate(_))
        ));
        m.add_frame_change(e, f, diag("exp(x)", "1")).unwrap();
        assert_eq!(m.frame_change(e, f).unwrap().chart(), Some(cart));
    }

    #[test]
    fn test_composition_across_charts() {
        let mut m = Manifold::new(2, "R2");
        let root = m.root();
        let polar = m.chart(root, "P", "r:positive t:(0,2*pi)").unwrap();
        let cart = m.chart(root, "X", "x y").unwrap();
        m.add_transition(polar, cart, &["r*cos(t)", "r*sin(t)"]).unwrap();
        let e_polar = m.coordinate_frame(polar).unwrap();
        let e_cart = m.coordinate_frame(cart).unwrap();
        let f = m.vector_frame(root, "f").unwrap();
        m.add_frame_change(e_cart, f, diag("x", "1")).unwrap();

        let change = m.frame_change(e_polar, f).unwrap();
        assert_eq!(change.chart(), Some(polar));
        let assumptions = m.chart_assumptions(polar).unwrap();
        let expected = Expr::parse("r*cos(t)^2").unwrap();
        assert!(change.matrix().get(0, 0).equals_with(&expected, &assumptions));
    }
}
