//! Points of a manifold, given by their coordinates in one or more charts.

use std::collections::BTreeMap;
use std::fmt;

use itertools::Itertools;
use tracing::debug;

use crate::errors::{GeometryError, Result};
use crate::expr::Expr;
use crate::manifold::{ChartId, Manifold, ManifoldId};

/// A point known through its coordinates in some chart.
///
/// Coordinates in other charts are derived through the transitions of the
/// manifold on request. Coordinates are symbolic, so a point may be generic
/// (`(a, b)`) as well as concrete (`(1, 0)`).
#[derive(Debug, Clone)]
pub struct Point {
    manifold: ManifoldId,
    name: Option<String>,
    coords: BTreeMap<ChartId, Vec<Expr>>,
}

impl Point {
    /// Creates a point from its coordinates in `chart`.
    pub fn new<E: Into<Expr> + Clone>(
        manifold: &Manifold,
        chart: ChartId,
        coords: &[E],
        name: Option<&str>,
    ) -> Result<Point> {
        manifold.chart_info(chart)?;
        if coords.len() != manifold.dim() {
            return Err(GeometryError::DimensionMismatch {
                expected: manifold.dim(),
                got: coords.len(),
            });
        }
        let coords: Vec<Expr> = coords.iter().cloned().map(Into::into).collect();
        Ok(Point {
            manifold: manifold.id(),
            name: name.map(str::to_string),
            coords: BTreeMap::from([(chart, coords)]),
        })
    }

    /// Parses the coordinates, e.g. `&["1", "pi/2"]`.
    pub fn parse(manifold: &Manifold, chart: ChartId, coords: &[&str], name: Option<&str>) -> Result<Point> {
        let coords = coords
            .iter()
            .map(|c| Expr::parse(c))
            .collect::<Result<Vec<_>>>()?;
        Point::new(manifold, chart, &coords, name)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn manifold(&self) -> ManifoldId {
        self.manifold
    }

    /// Charts in which the coordinates are known, in id order.
    pub fn charts(&self) -> Vec<ChartId> {
        self.coords.keys().copied().collect()
    }

    fn check_manifold(&self, manifold: &Manifold) -> Result<()> {
        if manifold.id() != self.manifold {
            return Err(GeometryError::DomainMismatch(format!(
                "point {} does not belong to manifold {}",
                self.name.as_deref().unwrap_or("<unnamed>"),
                manifold.name()
            )));
        }
        Ok(())
    }

    /// Coordinates in `chart`, derived and cached when not known yet.
    pub fn coords(&mut self, manifold: &Manifold, chart: ChartId) -> Result<Vec<Expr>> {
        let coords = self.derive_coords(manifold, chart)?;
        self.coords.entry(chart).or_insert_with(|| coords.clone());
        Ok(coords)
    }

    /// Coordinates in `chart` without caching them.
    pub fn derive_coords(&self, manifold: &Manifold, chart: ChartId) -> Result<Vec<Expr>> {
        self.check_manifold(manifold)?;
        if let Some(coords) = self.coords.get(&chart) {
            return Ok(coords.clone());
        }
        let mut last_error = None;
        for (known, values) in &self.coords {
            match manifold.transition_map(*known, chart) {
                Ok(transition) => {
                    let bindings = manifold.chart_info(*known)?.bindings(values);
                    let assumptions = manifold.chart_assumptions(chart)?;
                    debug!(from = %known, to = %chart, "deriving point coordinates");
                    return Ok(transition
                        .functions()
                        .iter()
                        .map(|f| f.substitute(&bindings).simplify_with(&assumptions))
                        .collect());
                }
                Err(err) => last_error = Some(err),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            GeometryError::NoCommonChart(format!("point has no coordinates to start from for {chart}"))
        }))
    }

    /// Adds coordinates in another chart, trusted to describe the same point.
    pub fn add_coords<E: Into<Expr> + Clone>(
        &mut self,
        manifold: &Manifold,
        chart: ChartId,
        coords: &[E],
    ) -> Result<()> {
        self.check_manifold(manifold)?;
        manifold.chart_info(chart)?;
        if coords.len() != manifold.dim() {
            return Err(GeometryError::DimensionMismatch {
                expected: manifold.dim(),
                got: coords.len(),
            });
        }
        self.coords
            .insert(chart, coords.iter().cloned().map(Into::into).collect());
        Ok(())
    }

    /// Whether two points have the same coordinates in some chart known to `self`.
    pub fn same_as(&self, manifold: &Manifold, other: &Point) -> Result<bool> {
        self.check_manifold(manifold)?;
        other.check_manifold(manifold)?;
        for (chart, coords) in &self.coords {
            if let Ok(theirs) = other.derive_coords(manifold, *chart) {
                let assumptions = manifold.chart_assumptions(*chart)?;
                return Ok(coords
                    .iter()
                    .zip(&theirs)
                    .all(|(a, b)| a.equals_with(b, &assumptions)));
            }
        }
        Err(GeometryError::NoCommonChart(
            "points share no chart in which to compare them".to_string(),
        ))
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name.as_deref().unwrap_or("point");
        match self.coords.iter().next() {
            Some((chart, coords)) => write!(f, "{name} ({}) in {chart}", coords.iter().join(", ")),
            None => write!(f, "{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane() -> (Manifold, ChartId, ChartId) {
        let mut m = Manifold::new(2, "R2");
        let root = m.root();
        let polar = m.chart(root, "P", "r:positive t:(0,2*pi)").unwrap();
        let cart = m.chart(root, "X", "x y").unwrap();
        m.add_transition(polar, cart, &["r*cos(t)", "r*sin(t)"]).unwrap();
        (m, polar, cart)
    }

    #[test]
    fn test_coordinates_are_derived_and_cached() {
        let (m, polar, cart) = plane();
        let mut p = Point::parse(&m, polar, &["2", "0"], Some("p")).unwrap();
        let xy = p.coords(&m, cart).unwrap();
        assert!(xy[0].equals(&Expr::constant(2.0)));
        assert!(xy[1].is_zero());
        assert_eq!(p.charts(), vec![polar, cart]);
    }

    #[test]
    fn test_missing_transition() {
        let (m, polar, cart) = plane();
        // the polar map has no derived inverse
        let p = Point::parse(&m, cart, &["1", "1"], None).unwrap();
        assert!(matches!(
            p.derive_coords(&m, polar),
            Err(GeometryError::NoCommonChart(_))
        ));
    }

    #[test]
    fn test_same_point() {
        let (m, polar, cart) = plane();
        let p = Point::parse(&m, polar, &["1", "0"], None).unwrap();
        let q = Point::parse(&m, cart, &["1", "0"], None).unwrap();
        let mut q2 = q.clone();
        q2.add_coords(&m, polar, &[Expr::one(), Expr::zero()]).unwrap();
        assert!(p.same_as(&m, &q2).unwrap());
        assert!(q.same_as(&m, &p).unwrap());
        assert!(matches!(
            Point::new(&m, cart, &[Expr::one()], None),
            Err(GeometryError::DimensionMismatch { .. })
        ));
    }
}
