//! Differentiable maps between manifolds.
//!
//! A [`DiffMapping`] stores its coordinate expressions per pair of charts
//! `(chart on the source, chart on the target)`. Expressions for other pairs are
//! derived on request through the transitions of both manifolds. Source and
//! target are separate registries, so every operation takes both.

use std::collections::BTreeMap;
use std::fmt;

use colored::Colorize;
use itertools::Itertools;
use tracing::debug;

use crate::components::{Components, Slot};
use crate::errors::{GeometryError, Result};
use crate::expr::Expr;
use crate::manifold::{ChartId, Manifold, ManifoldId};
use crate::point::Point;
use crate::scalar::ScalarField;
use crate::symmetry::Symmetry;
use crate::tensor::TensorField;

#[derive(Clone)]
pub struct DiffMapping {
    name: String,
    source: ManifoldId,
    target: ManifoldId,
    exprs: BTreeMap<(ChartId, ChartId), Vec<Expr>>,
}

impl DiffMapping {
    /// Creates a map from its coordinate expression between two charts.
    ///
    /// # Arguments
    /// * `name` - Name of the map
    /// * `source`, `target` - Source and target manifolds
    /// * `chart1` - Chart on the source
    /// * `chart2` - Chart on the target
    /// * `functions` - The coordinates of `chart2` as expressions in those of `chart1`
    pub fn new<S: AsRef<str>>(
        name: &str,
        source: &Manifold,
        target: &Manifold,
        chart1: ChartId,
        chart2: ChartId,
        functions: &[S],
    ) -> Result<DiffMapping> {
        let mut mapping = DiffMapping {
            name: name.to_string(),
            source: source.id(),
            target: target.id(),
            exprs: BTreeMap::new(),
        };
        mapping.add_expr(source, target, chart1, chart2, functions)?;
        Ok(mapping)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> ManifoldId {
        self.source
    }

    pub fn target(&self) -> ManifoldId {
        self.target
    }

    /// Chart pairs with a known expression, in id order.
    pub fn chart_pairs(&self) -> Vec<(ChartId, ChartId)> {
        self.exprs.keys().copied().collect()
    }

    fn check_manifolds(&self, source: &Manifold, target: &Manifold) -> Result<()> {
        if source.id() != self.source || target.id() != self.target {
            return Err(GeometryError::DomainMismatch(format!(
                "{} maps other manifolds than {} -> {}",
                self.name,
                source.name(),
                target.name()
            )));
        }
        Ok(())
    }

    /// Adds the coordinate expression for another pair of charts.
    ///
    /// The expression is trusted to describe the same map as the existing ones.
    pub fn add_expr<S: AsRef<str>>(
        &mut self,
        source: &Manifold,
        target: &Manifold,
        chart1: ChartId,
        chart2: ChartId,
        functions: &[S],
    ) -> Result<()> {
        self.check_manifolds(source, target)?;
        let assumptions = source.chart_assumptions(chart1)?;
        target.chart_info(chart2)?;
        if functions.len() != target.dim() {
            return Err(GeometryError::DimensionMismatch {
                expected: target.dim(),
                got: functions.len(),
            });
        }
        let functions = functions
            .iter()
            .map(|f| Ok(Expr::parse(f.as_ref())?.simplify_with(&assumptions)))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            mapping = %self.name,
            chart1 = %chart1,
            chart2 = %chart2,
            functions = %functions.iter().join(", "),
            "adding coordinate expression"
        );
        self.exprs.insert((chart1, chart2), functions);
        Ok(())
    }

    /// Coordinate expression for `(chart1, chart2)`, derived and cached when missing.
    pub fn coord_functions(
        &mut self,
        source: &Manifold,
        target: &Manifold,
        chart1: ChartId,
        chart2: ChartId,
    ) -> Result<Vec<Expr>> {
        let functions = self.derive_coord_functions(source, target, chart1, chart2)?;
        self.exprs
            .entry((chart1, chart2))
            .or_insert_with(|| functions.clone());
        Ok(functions)
    }

    /// Coordinate expression for `(chart1, chart2)` without caching.
    ///
    /// A known pair `(c1, c2)` is used through `chart1 -> c1` on the source and
    /// `c2 -> chart2` on the target; pairs are tried in id order.
    pub fn derive_coord_functions(
        &self,
        source: &Manifold,
        target: &Manifold,
        chart1: ChartId,
        chart2: ChartId,
    ) -> Result<Vec<Expr>> {
        self.check_manifolds(source, target)?;
        let assumptions = source.chart_assumptions(chart1)?;
        target.chart_info(chart2)?;
        if let Some(functions) = self.exprs.get(&(chart1, chart2)) {
            return Ok(functions.clone());
        }
        for ((c1, c2), functions) in &self.exprs {
            let Ok(in_chart1) = Self::rewrite_source(source, functions, *c1, chart1) else {
                continue;
            };
            let Ok(in_chart2) = Self::rewrite_target(target, &in_chart1, *c2, chart2) else {
                continue;
            };
            debug!(
                mapping = %self.name,
                from = ?(c1, c2),
                to = ?(chart1, chart2),
                "deriving coordinate expression"
            );
            return Ok(in_chart2
                .iter()
                .map(|f| f.simplify_with(&assumptions))
                .collect());
        }
        Err(GeometryError::NoCommonChart(format!(
            "{}: no coordinate expression reaches ({chart1}, {chart2})",
            self.name
        )))
    }

    /// Rewrites functions of the coordinates of `known` as functions of those of `wanted`.
    fn rewrite_source(
        source: &Manifold,
        functions: &[Expr],
        known: ChartId,
        wanted: ChartId,
    ) -> Result<Vec<Expr>> {
        if known == wanted {
            return Ok(functions.to_vec());
        }
        let transition = source.transition_map(wanted, known)?;
        let bindings = source.chart_info(known)?.bindings(transition.functions());
        Ok(functions.iter().map(|f| f.substitute(&bindings)).collect())
    }

    /// Turns the coordinates `values` of a point in `known` into its coordinates in `wanted`.
    fn rewrite_target(
        target: &Manifold,
        values: &[Expr],
        known: ChartId,
        wanted: ChartId,
    ) -> Result<Vec<Expr>> {
        if known == wanted {
            return Ok(values.to_vec());
        }
        let transition = target.transition_map(known, wanted)?;
        let bindings = target.chart_info(known)?.bindings(values);
        Ok(transition
            .functions()
            .iter()
            .map(|f| f.substitute(&bindings))
            .collect())
    }

    /// The composite `self o inner`, where `inner` maps into the source of `self`.
    ///
    /// Expressions are built for every pair of legs that meet in the same chart of
    /// `middle`. Other chart pairs stay absent until requested, when they are
    /// derived through the transitions of the source and target manifolds.
    pub fn compose(&self, inner: &DiffMapping, middle: &Manifold) -> Result<DiffMapping> {
        if inner.target != self.source || middle.id() != self.source {
            return Err(GeometryError::DomainMismatch(format!(
                "cannot compose {} after {}",
                self.name, inner.name
            )));
        }
        let mut exprs = BTreeMap::new();
        for ((a, b), inner_functions) in &inner.exprs {
            for ((b2, c), outer) in &self.exprs {
                if b != b2 {
                    continue;
                }
                let bindings = middle.chart_info(*b)?.bindings(inner_functions);
                let functions = outer.iter().map(|f| f.substitute(&bindings).simplify()).collect();
                exprs.entry((*a, *c)).or_insert(functions);
            }
        }
        if exprs.is_empty() {
            return Err(GeometryError::NoCommonChart(format!(
                "{} and {} share no chart on {}",
                self.name,
                inner.name,
                middle.name()
            )));
        }
        Ok(DiffMapping {
            name: format!("{} o {}", self.name, inner.name),
            source: inner.source,
            target: self.target,
            exprs,
        })
    }

    /// The Jacobian `d y^i / d x^j` of the coordinate expression in `(chart1, chart2)`.
    ///
    /// The result has an upper slot in the coordinate frame of `chart2` and a lower
    /// slot in the coordinate frame of `chart1`; its values are written in the
    /// coordinates of `chart1`.
    pub fn jacobian(
        &self,
        source: &Manifold,
        target: &Manifold,
        chart1: ChartId,
        chart2: ChartId,
    ) -> Result<Components> {
        let functions = self.derive_coord_functions(source, target, chart1, chart2)?;
        let info = source.chart_info(chart1)?;
        let assumptions = info.assumptions();
        let slots = vec![
            Slot::contra(target.coordinate_frame(chart2)?, target.start_index(), target.dim()),
            Slot::co(info.frame(), source.start_index(), source.dim()),
        ];
        let mut jacobian = Components::new(slots, Symmetry::none())?.with_chart(chart1);
        for (i, f) in functions.iter().enumerate() {
            for (j, x) in info.symbols().iter().enumerate() {
                let entry = f.diff(x).simplify_with(&assumptions);
                jacobian.set(&[target.start_index() + i, source.start_index() + j], entry)?;
            }
        }
        Ok(jacobian)
    }

    /// Pushforward of a contravariant tensor field of type `(k, 0)`.
    ///
    /// The result is the field along the map: components in the coordinate frame
    /// of `chart2`, written in the coordinates of `chart1`.
    pub fn pushforward(
        &self,
        source: &Manifold,
        target: &Manifold,
        field: &TensorField,
        chart1: ChartId,
        chart2: ChartId,
    ) -> Result<Components> {
        self.check_manifolds(source, target)?;
        let (k, l) = field.tensor_type();
        if field.manifold() != source.id() || k == 0 || l != 0 {
            return Err(GeometryError::TypeMismatch(format!(
                "{} pushes forward contravariant fields on {}, got type {:?}",
                self.name,
                source.name(),
                field.tensor_type()
            )));
        }
        let frame1 = source.coordinate_frame(chart1)?;
        let components = field.derive_comp(source, frame1)?;
        let mut current = source.components_in_chart(&components, chart1)?;
        let jacobian = self.jacobian(source, target, chart1, chart2)?;
        // each step consumes the leading source slot and appends a target slot
        for _ in 0..k {
            current = current.contract(0, &jacobian, 1)?;
        }
        let assumptions = source.chart_assumptions(chart1)?;
        current
            .simplify_with(&assumptions)
            .with_symmetry(field.symmetry().clone())
    }

    /// Pullback of a covariant tensor field of type `(0, l)`.
    ///
    /// The result is a field on the domain of `chart1`, with components in its
    /// coordinate frame.
    pub fn pullback(
        &self,
        source: &Manifold,
        target: &Manifold,
        field: &TensorField,
        chart1: ChartId,
        chart2: ChartId,
    ) -> Result<TensorField> {
        self.check_manifolds(source, target)?;
        let (k, l) = field.tensor_type();
        if field.manifold() != target.id() || k != 0 || l == 0 {
            return Err(GeometryError::TypeMismatch(format!(
                "{} pulls back covariant fields on {}, got type {:?}",
                self.name,
                target.name(),
                field.tensor_type()
            )));
        }
        let functions = self.derive_coord_functions(source, target, chart1, chart2)?;
        let components = field.derive_comp(target, target.coordinate_frame(chart2)?)?;
        let components = target.components_in_chart(&components, chart2)?;
        let bindings = target.chart_info(chart2)?.bindings(&functions);
        let mut current = components.substitute(&bindings).retagged(Some(chart1));
        let jacobian = self.jacobian(source, target, chart1, chart2)?;
        for _ in 0..l {
            current = current.contract(0, &jacobian, 0)?;
        }
        let assumptions = source.chart_assumptions(chart1)?;
        let current = current
            .simplify_with(&assumptions)
            .with_symmetry(field.symmetry().clone())?;

        let info = source.chart_info(chart1)?;
        let name = field.name().map(|n| format!("{}^*{n}", self.name));
        let mut result = source.tensor_field(
            info.domain(),
            name.as_deref(),
            (0, l),
            field.symmetry().clone(),
        )?;
        *result.set_comp(source, info.frame())? = current;
        Ok(result)
    }

    /// Pullback of a scalar field: `f o self`, expressed in `chart1`.
    pub fn pullback_scalar(
        &self,
        source: &Manifold,
        target: &Manifold,
        field: &ScalarField,
        chart1: ChartId,
        chart2: ChartId,
    ) -> Result<ScalarField> {
        let functions = self.derive_coord_functions(source, target, chart1, chart2)?;
        let expr = field.derive_expr(target, chart2)?;
        let bindings = target.chart_info(chart2)?.bindings(&functions);
        let name = field.name().map(|n| format!("{}^*{n}", self.name));
        source.scalar_field_from(
            source.chart_info(chart1)?.domain(),
            name.as_deref(),
            chart1,
            expr.substitute(&bindings),
        )
    }

    /// Image of a point, in the first target chart whose source chart the point reaches.
    pub fn apply(&self, source: &Manifold, target: &Manifold, point: &Point) -> Result<Point> {
        self.check_manifolds(source, target)?;
        for ((c1, c2), functions) in &self.exprs {
            let Ok(coords) = point.derive_coords(source, *c1) else {
                continue;
            };
            let bindings = source.chart_info(*c1)?.bindings(&coords);
            let image: Vec<Expr> = functions
                .iter()
                .map(|f| f.substitute(&bindings).simplify())
                .collect();
            let name = point.name().map(|n| format!("{}({n})", self.name));
            return Point::new(target, *c2, &image, name.as_deref());
        }
        Err(GeometryError::NoCommonChart(format!(
            "{}: the point has no coordinates in a source chart",
            self.name
        )))
    }
}

impl fmt::Debug for DiffMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", "DiffMapping".bold(), self.name.cyan())?;
        for ((c1, c2), functions) in &self.exprs {
            writeln!(f, "    {c1} -> {c2}: ({})", functions.iter().join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Expr {
        Expr::parse(source).unwrap()
    }

    /// Polar and Cartesian charts on the plane.
    fn plane() -> (Manifold, ChartId, ChartId) {
        let mut m = Manifold::new(2, "R2");
        let root = m.root();
        let polar = m.chart(root, "P", "r:positive t:(0,2*pi)").unwrap();
        let cart = m.chart(root, "X", "x y").unwrap();
        m.add_transition(polar, cart, &["r*cos(t)", "r*sin(t)"]).unwrap();
        (m, polar, cart)
    }

    fn line() -> (Manifold, ChartId) {
        let mut m = Manifold::new(1, "R");
        let root = m.root();
        let chart = m.chart(root, "T", "s").unwrap();
        (m, chart)
    }

    #[test]
    fn test_expressions_derived_through_transitions() {
        let (m, polar, cart) = plane();
        let (n, t) = line();
        // the curve s -> (r, t) = (1, s) on the plane
        let mut circle = DiffMapping::new("c", &n, &m, t, polar, &["1", "s"]).unwrap();
        let xy = circle.coord_functions(&n, &m, t, cart).unwrap();
        assert!(xy[0].equals(&parse("cos(s)")));
        assert!(xy[1].equals(&parse("sin(s)")));
        assert_eq!(circle.chart_pairs(), vec![(t, polar), (t, cart)]);
    }

    #[test]
    fn test_jacobian_and_pushforward() {
        let (m, _, cart) = plane();
        let (n, t) = line();
        let parabola = DiffMapping::new("p", &n, &m, t, cart, &["s", "s^2"]).unwrap();
        let jacobian = parabola.jacobian(&n, &m, t, cart).unwrap();
        assert!(jacobian.get(&[0, 0]).unwrap().equals(&Expr::one()));
        assert!(jacobian.get(&[1, 0]).unwrap().equals(&parse("2*s")));

        let mut d_ds = n.vector_field(n.root(), Some("d/ds")).unwrap();
        d_ds.set_comp(&n, n.coordinate_frame(t).unwrap())
            .unwrap()
            .set(&[0], 1)
            .unwrap();
        let velocity = parabola.pushforward(&n, &m, &d_ds, t, cart).unwrap();
        assert_eq!(velocity.frame(), Some(m.coordinate_frame(cart).unwrap()));
        assert!(velocity.get(&[0]).unwrap().equals(&Expr::one()));
        assert!(velocity.get(&[1]).unwrap().equals(&parse("2*s")));

        let form = n.one_form(n.root(), None).unwrap();
        assert!(matches!(
            parabola.pushforward(&n, &m, &form, t, cart),
            Err(GeometryError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_pullback_of_forms_and_scalars() {
        let (m, _, cart) = plane();
        let (n, t) = line();
        let parabola = DiffMapping::new("p", &n, &m, t, cart, &["s", "s^2"]).unwrap();

        // pullback of y dx + dy is s^2 ds + 2 s ds
        let mut w = m.one_form(m.root(), Some("w")).unwrap();
        {
            let c = w.set_comp(&m, m.coordinate_frame(cart).unwrap()).unwrap();
            c.set(&[0], parse("y")).unwrap();
            c.set(&[1], 1).unwrap();
        }
        let mut pulled = parabola.pullback(&n, &m, &w, t, cart).unwrap();
        assert_eq!(pulled.name(), Some("p^*w"));
        let c = pulled.comp(&n, n.coordinate_frame(t).unwrap()).unwrap();
        assert!(c.get(&[0]).unwrap().equals(&parse("s^2 + 2*s")));

        let f = m.scalar_field_from(m.root(), Some("f"), cart, parse("x*y")).unwrap();
        let g = parabola.pullback_scalar(&n, &m, &f, t, cart).unwrap();
        assert!(g.derive_expr(&n, t).unwrap().equals(&parse("s^3")));
    }

    #[test]
    fn test_pullback_keeps_symmetry() {
        let (m, _, cart) = plane();
        let mut square = Manifold::new(2, "Q");
        let root = square.root();
        let uv = square.chart(root, "U", "u v").unwrap();
        let map = DiffMapping::new("phi", &square, &m, uv, cart, &["u + v", "u - v"]).unwrap();
        let mut g = m
            .tensor_field(m.root(), Some("g"), (0, 2), Symmetry::symmetric(&[0, 1]).unwrap())
            .unwrap();
        {
            let c = g.set_comp(&m, m.coordinate_frame(cart).unwrap()).unwrap();
            c.set(&[0, 0], 1).unwrap();
            c.set(&[1, 1], 1).unwrap();
        }
        let mut h = map.pullback(&square, &m, &g, uv, cart).unwrap();
        assert_eq!(h.symmetry(), g.symmetry());
        let c = h.comp(&square, square.coordinate_frame(uv).unwrap()).unwrap();
        assert!(c.get(&[0, 0]).unwrap().equals(&Expr::constant(2.0)));
        assert!(c.get(&[0, 1]).unwrap().is_zero());
        assert!(c.get(&[1, 1]).unwrap().equals(&Expr::constant(2.0)));
    }

    #[test]
    fn test_compose_and_apply() {
        let (m, polar, cart) = plane();
        let (n, t) = line();
        let circle = DiffMapping::new("c", &n, &m, t, polar, &["2", "s"]).unwrap();
        let mut flip = DiffMapping::new("flip", &m, &m, cart, cart, &["y", "x"]).unwrap();

        // the legs do not meet in a chart of the middle manifold
        assert!(matches!(
            flip.compose(&circle, &m),
            Err(GeometryError::NoCommonChart(_))
        ));

        flip.add_expr(&m, &m, polar, cart, &["r*sin(t)", "r*cos(t)"]).unwrap();
        let composed = flip.compose(&circle, &m).unwrap();
        assert_eq!(composed.source(), n.id());
        assert_eq!(composed.chart_pairs(), vec![(t, cart)]);
        let functions = composed.derive_coord_functions(&n, &m, t, cart).unwrap();
        assert!(functions[0].equals(&parse("2*sin(s)")));
        assert!(functions[1].equals(&parse("2*cos(s)")));

        let p = Point::parse(&n, t, &["0"], Some("p")).unwrap();
        let image = circle.apply(&n, &m, &p).unwrap();
        assert_eq!(image.name(), Some("c(p)"));
        let mut image = flip.apply(&m, &m, &image).unwrap();
        let xy = image.coords(&m, cart).unwrap();
        assert!(xy[0].is_zero());
        assert!(xy[1].equals(&Expr::constant(2.0)));

        assert!(matches!(
            flip.compose(&flip, &n),
            Err(GeometryError::DomainMismatch(_))
        ));
    }
}
