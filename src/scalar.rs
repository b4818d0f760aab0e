//! Scalar fields with one coordinate expression per chart.
//!
//! A [`ScalarField`] stores the expressions of one function in several charts.
//! Missing expressions are derived by substituting a transition map into a known
//! one. Expressions supplied by the user are trusted to agree with each other;
//! [`ScalarField::check_consistency`] is the only place they are compared.

use std::fmt;

use colored::Colorize;
use itertools::Itertools;
use tracing::debug;

use crate::errors::{GeometryError, Result};
use crate::expr::Expr;
use crate::manifold::{ChartId, Manifold, ManifoldId, SubsetId};
use crate::point::Point;
use crate::repr::{Origin, Representations};
use crate::symmetry::Symmetry;
use crate::tensor::TensorField;

#[derive(Clone)]
pub struct ScalarField {
    manifold: ManifoldId,
    domain: SubsetId,
    name: Option<String>,
    exprs: Representations<ChartId, Expr>,
}

impl Manifold {
    /// Creates a scalar field on `domain` without any expression.
    pub fn scalar_field(&self, domain: SubsetId, name: Option<&str>) -> Result<ScalarField> {
        self.subset_name(domain)?;
        Ok(ScalarField {
            manifold: self.id(),
            domain,
            name: name.map(str::to_string),
            exprs: Representations::new(),
        })
    }

    /// Creates a scalar field given by `expr` in `chart`.
    pub fn scalar_field_from(
        &self,
        domain: SubsetId,
        name: Option<&str>,
        chart: ChartId,
        expr: impl Into<Expr>,
    ) -> Result<ScalarField> {
        let mut field = self.scalar_field(domain, name)?;
        field.set_expr(self, chart, expr)?;
        Ok(field)
    }
}

impl ScalarField {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn domain(&self) -> SubsetId {
        self.domain
    }

    pub fn manifold(&self) -> ManifoldId {
        self.manifold
    }

    /// Renames the field.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    pub(crate) fn check_manifold(&self, manifold: &Manifold) -> Result<()> {
        if manifold.id() != self.manifold {
            return Err(GeometryError::DomainMismatch(format!(
                "scalar field {} is not defined on manifold {}",
                self.label(),
                manifold.name()
            )));
        }
        Ok(())
    }

    /// A chart may carry an expression when its domain and the field's are nested.
    fn check_chart(&self, manifold: &Manifold, chart: ChartId) -> Result<()> {
        self.check_manifold(manifold)?;
        let domain = manifold.chart_info(chart)?.domain();
        manifold.common_subset(domain, self.domain).map(|_| ())
    }

    fn prepare(&self, manifold: &Manifold, chart: ChartId, expr: Expr) -> Result<Expr> {
        self.check_chart(manifold, chart)?;
        Ok(expr.simplify_with(&manifold.chart_assumptions(chart)?))
    }

    /// Defines the field by its expression in `chart`; derived expressions go stale.
    pub fn set_expr(&mut self, manifold: &Manifold, chart: ChartId, expr: impl Into<Expr>) -> Result<()> {
        let expr = self.prepare(manifold, chart, expr.into())?;
        self.exprs.set(chart, expr);
        Ok(())
    }

    /// Adds the expression in another chart, trusted to agree with the existing ones.
    pub fn add_expr(&mut self, manifold: &Manifold, chart: ChartId, expr: impl Into<Expr>) -> Result<()> {
        let expr = self.prepare(manifold, chart, expr.into())?;
        self.exprs.add(chart, expr);
        Ok(())
    }

    /// Charts with a fresh expression, in id order.
    pub fn charts(&self) -> Vec<ChartId> {
        self.exprs.keys()
    }

    pub fn origin(&self, chart: ChartId) -> Option<Origin> {
        self.exprs.origin(chart)
    }

    pub fn is_stale(&self, chart: ChartId) -> bool {
        self.exprs.is_stale(chart)
    }

    /// The expression in `chart`, derived and cached when missing.
    pub fn expr(&mut self, manifold: &Manifold, chart: ChartId) -> Result<Expr> {
        if let Some(expr) = self.exprs.get(chart) {
            return Ok(expr.clone());
        }
        let expr = self.derive_expr(manifold, chart)?;
        self.exprs.cache(chart, expr.clone());
        Ok(expr)
    }

    /// The expression in `chart`, derived without caching.
    ///
    /// A transition from `chart` to any chart with a known expression is looked up
    /// (registered ones first, then composed) and substituted.
    pub fn derive_expr(&self, manifold: &Manifold, chart: ChartId) -> Result<Expr> {
        self.check_chart(manifold, chart)?;
        if let Some(expr) = self.exprs.get(chart) {
            return Ok(expr.clone());
        }
        if self.exprs.is_empty() {
            return Err(GeometryError::NoCommonChart(format!(
                "scalar field {} has no expression",
                self.label()
            )));
        }
        let known = self.exprs.keys();
        let transition = manifold.transition_to_any(chart, &known)?;
        let source = transition.to();
        let bindings = manifold.chart_info(source)?.bindings(transition.functions());
        let expr = self
            .exprs
            .get(source)
            .map(|e| e.substitute(&bindings))
            .ok_or_else(|| GeometryError::NoCommonChart(format!("no expression in {source}")))?;
        debug!(field = self.label(), from = %source, to = %chart, "deriving scalar expression");
        if manifold.config().simplify_derived {
            Ok(expr.simplify_with(&manifold.chart_assumptions(chart)?))
        } else {
            Ok(expr)
        }
    }

    /// Whether an expression in `chart` is known or derivable, without deriving it.
    fn reaches(&self, manifold: &Manifold, chart: ChartId) -> bool {
        !self.exprs.is_empty()
            && self.check_chart(manifold, chart).is_ok()
            && manifold.transition_to_any(chart, &self.exprs.keys()).is_ok()
    }

    /// Charts in which both fields can be expressed, best first.
    ///
    /// Charts where both already have an expression come first, in id order,
    /// followed by charts of either operand into which the other can be derived.
    /// Only the existence of a transition is checked; nothing is derived.
    pub fn common_charts(&self, other: &ScalarField, manifold: &Manifold) -> Vec<ChartId> {
        let own = self.exprs.keys();
        let theirs = other.exprs.keys();
        let shared = own.iter().filter(|c| theirs.contains(c));
        let derivable_here = own
            .iter()
            .filter(|c| !theirs.contains(c) && other.reaches(manifold, **c));
        let derivable_there = theirs
            .iter()
            .filter(|c| !own.contains(c) && self.reaches(manifold, **c));
        shared
            .chain(derivable_here)
            .chain(derivable_there)
            .copied()
            .collect()
    }

    fn combine<F>(&self, other: &ScalarField, manifold: &Manifold, operation: &str, op: F) -> Result<ScalarField>
    where
        F: Fn(Expr, Expr) -> Result<Expr>,
    {
        self.check_manifold(manifold)?;
        other.check_manifold(manifold)?;
        let domain = manifold.common_subset(self.domain, other.domain)?;
        let chart = self
            .common_charts(other, manifold)
            .into_iter()
            .find(|c| {
                manifold
                    .chart_info(*c)
                    .and_then(|info| manifold.common_subset(info.domain(), domain))
                    .is_ok()
            })
            .ok_or_else(|| {
                GeometryError::NoCommonChart(format!(
                    "{operation}: {} and {} share no chart",
                    self.label(),
                    other.label()
                ))
            })?;
        let value = op(self.derive_expr(manifold, chart)?, other.derive_expr(manifold, chart)?)?;
        let mut result = manifold.scalar_field(domain, None)?;
        result.set_expr(manifold, chart, value)?;
        Ok(result)
    }

    pub fn add(&self, other: &ScalarField, manifold: &Manifold) -> Result<ScalarField> {
        self.combine(other, manifold, "add", |a, b| Ok(a + b))
    }

    pub fn sub(&self, other: &ScalarField, manifold: &Manifold) -> Result<ScalarField> {
        self.combine(other, manifold, "sub", |a, b| Ok(a - b))
    }

    pub fn mul(&self, other: &ScalarField, manifold: &Manifold) -> Result<ScalarField> {
        self.combine(other, manifold, "mul", |a, b| Ok(a * b))
    }

    /// Quotient; fails with `TypeMismatch` when `other` is identically zero.
    pub fn div(&self, other: &ScalarField, manifold: &Manifold) -> Result<ScalarField> {
        self.combine(other, manifold, "div", |a, b| {
            if b.is_zero() {
                return Err(GeometryError::TypeMismatch(
                    "division by the zero scalar field".to_string(),
                ));
            }
            Ok(a / b)
        })
    }

    fn map_exprs<F>(&self, manifold: &Manifold, f: F) -> Result<ScalarField>
    where
        F: Fn(&Expr) -> Expr,
    {
        self.check_manifold(manifold)?;
        let exprs = self.exprs.try_map(|chart, expr| {
            Ok::<_, GeometryError>(f(expr).simplify_with(&manifold.chart_assumptions(chart)?))
        })?;
        Ok(ScalarField {
            manifold: self.manifold,
            domain: self.domain,
            name: None,
            exprs,
        })
    }

    pub fn neg(&self, manifold: &Manifold) -> Result<ScalarField> {
        self.map_exprs(manifold, |e| -e)
    }

    /// Multiplies by a constant (or parameter) expression.
    pub fn scale(&self, factor: &Expr, manifold: &Manifold) -> Result<ScalarField> {
        self.map_exprs(manifold, |e| factor * e)
    }

    /// Whether every known expression is zero.
    pub fn is_zero(&self) -> bool {
        self.exprs.iter().all(|(_, expr)| expr.is_zero())
    }

    /// The field restricted to a subset of its domain.
    pub fn restrict(&self, manifold: &Manifold, subset: SubsetId) -> Result<ScalarField> {
        self.check_manifold(manifold)?;
        if !manifold.is_subset(subset, self.domain)? {
            return Err(GeometryError::DomainMismatch(format!(
                "{} is not contained in the domain of {}",
                manifold.subset_name(subset)?,
                self.label()
            )));
        }
        let exprs = self.exprs.filtered(|chart| {
            manifold
                .chart_info(chart)
                .and_then(|info| manifold.common_subset(info.domain(), subset))
                .is_ok()
        });
        Ok(ScalarField {
            manifold: self.manifold,
            domain: subset,
            name: self.name.clone(),
            exprs,
        })
    }

    /// Compares every pair of expressions related by a known transition.
    ///
    /// Pairs of charts without a transition between them are not compared.
    /// Fails with `Inconsistent` on the first disagreement.
    pub fn check_consistency(&self, manifold: &Manifold) -> Result<()> {
        self.check_manifold(manifold)?;
        for ((a, ea), (b, eb)) in self.exprs.iter().tuple_combinations() {
            // compare in whichever chart the other expression can be brought to
            let (chart, rewritten, reference) = if let Ok(t) = manifold.transition_map(b, a) {
                let bindings = manifold.chart_info(a)?.bindings(t.functions());
                (b, ea.substitute(&bindings), eb)
            } else if let Ok(t) = manifold.transition_map(a, b) {
                let bindings = manifold.chart_info(b)?.bindings(t.functions());
                (a, eb.substitute(&bindings), ea)
            } else {
                debug!(field = self.label(), first = %a, second = %b, "no transition to compare through");
                continue;
            };
            if !rewritten.equals_with(reference, &manifold.chart_assumptions(chart)?) {
                return Err(GeometryError::Inconsistent(format!(
                    "scalar field {}: {ea} in {a} disagrees with {eb} in {b}",
                    self.label()
                )));
            }
        }
        Ok(())
    }

    /// The value at a point, as an expression in the point's coordinates.
    pub fn value_at(&self, manifold: &Manifold, point: &Point) -> Result<Expr> {
        self.check_manifold(manifold)?;
        for (chart, expr) in self.exprs.iter() {
            if let Ok(coords) = point.derive_coords(manifold, chart) {
                let bindings = manifold.chart_info(chart)?.bindings(&coords);
                return Ok(expr.substitute(&bindings).simplify());
            }
        }
        for chart in point.charts() {
            if let Ok(expr) = self.derive_expr(manifold, chart) {
                let coords = point.derive_coords(manifold, chart)?;
                let bindings = manifold.chart_info(chart)?.bindings(&coords);
                return Ok(expr.substitute(&bindings).simplify());
            }
        }
        Err(GeometryError::NoCommonChart(format!(
            "cannot evaluate {} at {point}",
            self.label()
        )))
    }

    /// The differential `df` with components `df/dx^i` in the coordinate frame of `chart`.
    pub fn differential(&self, manifold: &Manifold, chart: ChartId) -> Result<TensorField> {
        let expr = self.derive_expr(manifold, chart)?;
        let info = manifold.chart_info(chart)?;
        let name = self.name.as_ref().map(|n| format!("d{n}"));
        let mut df = manifold.tensor_field(self.domain, name.as_deref(), (0, 1), Symmetry::none())?;
        let assumptions = info.assumptions();
        let components = df.set_comp(manifold, info.frame())?;
        for (i, symbol) in info.symbols().iter().enumerate() {
            let derivative = expr.diff(symbol).simplify_with(&assumptions);
            components.set(&[manifold.start_index() + i], derivative)?;
        }
        Ok(df)
    }
}

impl fmt::Debug for ScalarField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", "ScalarField".bold(), self.label().cyan())?;
        writeln!(f, "    {}: {}", "Domain".cyan(), self.domain)?;
        for (chart, expr) in self.exprs.iter() {
            let origin = match self.exprs.origin(chart) {
                Some(Origin::Derived) => "derived".yellow(),
                _ => "set".green(),
            };
            writeln!(f, "    {chart} ({origin}): {expr}")?;
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

    /// A line with charts `x > 0` and `y = x^2`.
    fn line() -> (Manifold, ChartId, ChartId) {
        let mut m = Manifold::new(1, "R+");
        let root = m.root();
        let a = m.chart(root, "A", "x:positive").unwrap();
        let b = m.chart(root, "B", "y").unwrap();
        m.add_transition(a, b, &["x^2"]).unwrap();
        (m, a, b)
    }

    fn plane() -> (Manifold, ChartId, ChartId) {
        let mut m = Manifold::new(2, "R2");
        let root = m.root();
        let polar = m.chart(root, "P", "r:positive t:(0,2*pi)").unwrap();
        let cart = m.chart(root, "X", "x y").unwrap();
        m.add_transition(polar, cart, &["r*cos(t)", "r*sin(t)"]).unwrap();
        (m, polar, cart)
    }

    #[test]
    fn test_expression_derived_through_square_root() {
        let (m, a, b) = line();
        let mut f = m.scalar_field_from(m.root(), Some("f"), a, parse("x")).unwrap();
        let in_b = f.expr(&m, b).unwrap();
        assert!(in_b.equals(&parse("sqrt(y)")));
        assert_eq!(f.charts(), vec![a, b]);
        assert_eq!(f.origin(b), Some(Origin::Derived));
    }

    #[test]
    fn test_set_expr_makes_derived_stale() {
        let (m, a, b) = line();
        let mut f = m.scalar_field_from(m.root(), Some("f"), a, parse("x")).unwrap();
        f.expr(&m, b).unwrap();
        f.set_expr(&m, a, parse("2*x")).unwrap();
        assert!(f.is_stale(b));
        assert!(f.expr(&m, b).unwrap().equals(&parse("2*sqrt(y)")));
        assert!(!f.is_stale(b));
    }

    #[test]
    fn test_no_path_is_an_error() {
        let (m, polar, cart) = plane();
        // polar coordinates are not invertible, so nothing leads from X to P
        let f = m.scalar_field_from(m.root(), None, polar, parse("r^2")).unwrap();
        assert!(matches!(
            f.derive_expr(&m, cart),
            Err(GeometryError::NoCommonChart(_))
        ));
        // the registered direction works
        let h = m.scalar_field_from(m.root(), None, cart, parse("x*y")).unwrap();
        let in_polar = h.derive_expr(&m, polar).unwrap();
        assert!(in_polar.equals(&parse("r^2*cos(t)*sin(t)")));
        let g = m.scalar_field(m.root(), None).unwrap();
        assert!(matches!(
            g.derive_expr(&m, cart),
            Err(GeometryError::NoCommonChart(_))
        ));
    }

    #[test]
    fn test_arithmetic_in_common_chart() {
        let (m, polar, cart) = plane();
        let root = m.root();
        let r2 = m.scalar_field_from(root, Some("r2"), polar, parse("r^2")).unwrap();
        let x2 = m.scalar_field_from(root, Some("x2"), cart, parse("x^2")).unwrap();
        // x2 can be derived in the polar chart, not the other way round
        assert_eq!(r2.common_charts(&x2, &m), vec![polar]);
        let diff = r2.sub(&x2, &m).unwrap();
        let expected = parse("r^2*sin(t)^2");
        assert!(diff.derive_expr(&m, polar).unwrap().equals(&expected));

        let zero = m.scalar_field_from(root, None, polar, Expr::zero()).unwrap();
        assert!(matches!(
            r2.div(&zero, &m),
            Err(GeometryError::TypeMismatch(_))
        ));
        let neg = r2.neg(&m).unwrap().add(&r2, &m).unwrap();
        assert!(neg.is_zero());
    }

    #[test]
    fn test_common_charts_leave_fields_untouched() {
        let (m, polar, cart) = plane();
        let root = m.root();
        let f = m.scalar_field_from(root, Some("f"), cart, parse("x + y")).unwrap();
        let g = m.scalar_field_from(root, Some("g"), polar, parse("r")).unwrap();
        let empty = m.scalar_field(root, Some("e")).unwrap();
        assert_eq!(f.common_charts(&g, &m), vec![polar]);
        assert_eq!(g.common_charts(&f, &m), vec![polar]);
        assert!(f.common_charts(&empty, &m).is_empty());
        assert_eq!(f.charts(), vec![cart]);
        assert_eq!(g.charts(), vec![polar]);
    }

    #[test]
    fn test_consistency_is_checked_on_request_only() {
        let (m, polar, cart) = plane();
        let mut f = m.scalar_field_from(m.root(), Some("f"), cart, parse("x")).unwrap();
        f.add_expr(&m, polar, parse("r*cos(t)")).unwrap();
        assert!(f.check_consistency(&m).is_ok());

        // a wrong expression is accepted, and only caught by the audit
        f.add_expr(&m, polar, parse("r*sin(t)")).unwrap();
        assert!(matches!(
            f.check_consistency(&m),
            Err(GeometryError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_restrict_and_value_at() {
        let (mut m, polar, cart) = plane();
        let root = m.root();
        let upper = m.open_subset("U", root).unwrap();
        let f = m.scalar_field_from(root, Some("f"), cart, parse("x + y")).unwrap();
        let g = f.restrict(&m, upper).unwrap();
        assert_eq!(g.domain(), upper);
        assert_eq!(g.charts(), vec![cart]);
        assert!(matches!(
            g.restrict(&m, root),
            Err(GeometryError::DomainMismatch(_))
        ));

        let p = Point::parse(&m, polar, &["2", "0"], None).unwrap();
        assert!(f.value_at(&m, &p).unwrap().equals(&Expr::constant(2.0)));
    }

    #[test]
    fn test_differential() {
        let (m, polar, _) = plane();
        let f = m.scalar_field_from(m.root(), Some("f"), polar, parse("r^2*sin(t)")).unwrap();
        let mut df = f.differential(&m, polar).unwrap();
        let frame = m.coordinate_frame(polar).unwrap();
        let components = df.comp(&m, frame).unwrap();
        assert!(components.get(&[0]).unwrap().equals(&parse("2*r*sin(t)")));
        assert!(components.get(&[1]).unwrap().equals(&parse("r^2*cos(t)")));
    }

    #[test]
    fn test_foreign_manifold_rejected() {
        let (m, a, _) = line();
        let (other, _, _) = line();
        let f = m.scalar_field_from(m.root(), None, a, parse("x")).unwrap();
        assert!(matches!(
            f.derive_expr(&other, a),
            Err(GeometryError::DomainMismatch(_))
        ));
    }
}
