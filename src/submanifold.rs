//! Embedded submanifolds.
//!
//! A submanifold is a manifold of its own, with a single chart, plus the
//! embedding that sends that chart into a chart of the ambient manifold.

use tracing::debug;

use crate::components::Components;
use crate::errors::{GeometryError, Result};
use crate::manifold::{ChartId, Manifold};
use crate::mapping::DiffMapping;
use crate::tensor::TensorField;

pub struct Submanifold {
    manifold: Manifold,
    chart: ChartId,
    ambient_chart: ChartId,
    embedding: DiffMapping,
}

impl Submanifold {
    /// Creates a submanifold from a parametrization.
    ///
    /// # Arguments
    /// * `name` - Name of the submanifold and of its chart
    /// * `ambient` - The manifold it is embedded in
    /// * `coordinates` - Coordinate declarations of the chart, as for [`Manifold::chart`]
    /// * `ambient_chart` - Chart of `ambient` in which the embedding is written
    /// * `embedding` - The coordinates of `ambient_chart` as expressions in the new ones
    ///
    /// # Example
    /// ```
    /// use sym_manifolds::prelude::*;
    ///
    /// let mut plane = Manifold::new(2, "R2");
    /// let root = plane.root();
    /// let xy = plane.chart(root, "X", "x y").unwrap();
    /// let parabola = Submanifold::curve("C", &plane, "s", xy, &["s", "s^2"]).unwrap();
    /// assert_eq!(parabola.manifold().dim(), 1);
    /// ```
    pub fn new<S: AsRef<str>>(
        name: &str,
        ambient: &Manifold,
        coordinates: &str,
        ambient_chart: ChartId,
        embedding: &[S],
    ) -> Result<Submanifold> {
        let dim = coordinates.split_whitespace().count();
        if dim == 0 || dim > ambient.dim() {
            return Err(GeometryError::DimensionMismatch {
                expected: ambient.dim(),
                got: dim,
            });
        }
        let mut manifold = Manifold::new(dim, name)
            .with_start_index(ambient.start_index())
            .with_config(ambient.config().clone());
        let root = manifold.root();
        let chart = manifold.chart(root, name, coordinates)?;
        let embedding = DiffMapping::new(
            &format!("iota_{name}"),
            &manifold,
            ambient,
            chart,
            ambient_chart,
            embedding,
        )?;
        debug!(submanifold = name, dim, ambient = ambient.name(), "embedding submanifold");
        Ok(Submanifold {
            manifold,
            chart,
            ambient_chart,
            embedding,
        })
    }

    /// A curve, parametrized by a single coordinate.
    pub fn curve<S: AsRef<str>>(
        name: &str,
        ambient: &Manifold,
        parameter: &str,
        ambient_chart: ChartId,
        embedding: &[S],
    ) -> Result<Submanifold> {
        let count = parameter.split_whitespace().count();
        if count != 1 {
            return Err(GeometryError::DimensionMismatch {
                expected: 1,
                got: count,
            });
        }
        Submanifold::new(name, ambient, parameter, ambient_chart, embedding)
    }

    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    /// Mutable access, e.g. to add charts and transitions to the submanifold.
    pub fn manifold_mut(&mut self) -> &mut Manifold {
        &mut self.manifold
    }

    pub fn chart(&self) -> ChartId {
        self.chart
    }

    pub fn ambient_chart(&self) -> ChartId {
        self.ambient_chart
    }

    pub fn embedding(&self) -> &DiffMapping {
        &self.embedding
    }

    pub fn embedding_mut(&mut self) -> &mut DiffMapping {
        &mut self.embedding
    }

    /// Pullback of an ambient metric along the embedding.
    pub fn induced_metric(&self, ambient: &Manifold, metric: &TensorField) -> Result<TensorField> {
        if metric.tensor_type() != (0, 2) {
            return Err(GeometryError::TypeMismatch(format!(
                "a metric has type (0, 2), got {:?}",
                metric.tensor_type()
            )));
        }
        self.embedding
            .pullback(&self.manifold, ambient, metric, self.chart, self.ambient_chart)
    }

    /// Tangent vector of a curve, in the coordinate frame of the ambient chart.
    pub fn velocity(&self, ambient: &Manifold) -> Result<Components> {
        if self.manifold.dim() != 1 {
            return Err(GeometryError::TypeMismatch(format!(
                "{} is not a curve",
                self.manifold.name()
            )));
        }
        let frame = self.manifold.coordinate_frame(self.chart)?;
        let mut tangent = self.manifold.vector_field(self.manifold.root(), None)?;
        tangent
            .set_comp(&self.manifold, frame)?
            .set(&[self.manifold.start_index()], 1)?;
        self.embedding
            .pushforward(&self.manifold, ambient, &tangent, self.chart, self.ambient_chart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::symmetry::Symmetry;

    fn euclidean(dim: usize, coordinates: &str) -> (Manifold, ChartId, TensorField) {
        let mut m = Manifold::new(dim, "E");
        let root = m.root();
        let chart = m.chart(root, "X", coordinates).unwrap();
        let mut g = m
            .tensor_field(root, Some("g"), (0, 2), Symmetry::symmetric(&[0, 1]).unwrap())
            .unwrap();
        let c = g.set_comp(&m, m.coordinate_frame(chart).unwrap()).unwrap();
        for i in 0..dim {
            c.set(&[i, i], 1).unwrap();
        }
        (m, chart, g)
    }

    #[test]
    fn test_helix_metric() {
        let (e, xyz, g) = euclidean(3, "x y z");
        let helix = Submanifold::curve("H", &e, "t", xyz, &["cos(t)", "sin(t)", "t"]).unwrap();
        let h = helix.induced_metric(&e, &g).unwrap();
        let frame = helix.manifold().coordinate_frame(helix.chart()).unwrap();
        let c = h.derive_comp(helix.manifold(), frame).unwrap();
        assert!(c.get(&[0, 0]).unwrap().equals(&Expr::constant(2.0)));

        let v = helix.velocity(&e).unwrap();
        assert!(v.get(&[0]).unwrap().equals(&Expr::parse("-sin(t)").unwrap()));
        assert!(v.get(&[2]).unwrap().equals(&Expr::one()));
    }

    #[test]
    fn test_graph_surface_metric() {
        let (e, xyz, g) = euclidean(3, "x y z");
        let surface = Submanifold::new("S", &e, "u v", xyz, &["u", "v", "u^2 + v^2"]).unwrap();
        let h = surface.induced_metric(&e, &g).unwrap();
        assert_eq!(h.tensor_type(), (0, 2));
        let frame = surface.manifold().coordinate_frame(surface.chart()).unwrap();
        let c = h.derive_comp(surface.manifold(), frame).unwrap();
        let parse = |s: &str| Expr::parse(s).unwrap();
        assert!(c.get(&[0, 0]).unwrap().equals(&parse("1 + 4*u^2")));
        assert!(c.get(&[0, 1]).unwrap().equals(&parse("4*u*v")));
        assert!(c.get(&[1, 0]).unwrap().equals(&parse("4*u*v")));
        assert!(c.get(&[1, 1]).unwrap().equals(&parse("1 + 4*v^2")));

        assert!(matches!(
            surface.velocity(&e),
            Err(GeometryError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_invalid_parametrizations() {
        let (e, xyz, _) = euclidean(3, "x y z");
        assert!(matches!(
            Submanifold::new("S", &e, "a b c d", xyz, &["a", "b", "c"]),
            Err(GeometryError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            Submanifold::curve("C", &e, "s t", xyz, &["s", "t", "0"]),
            Err(GeometryError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            Submanifold::curve("C", &e, "s", xyz, &["s", "s"]),
            Err(GeometryError::DimensionMismatch { .. })
        ));
        let (_, _, metric) = euclidean(3, "x y z");
        let curve = Submanifold::curve("C", &e, "s", xyz, &["s", "0", "0"]).unwrap();
        // a metric of another manifold
        assert!(curve.induced_metric(&e, &metric).is_err());
    }
}
