//! Coordinate charts and the coordinate changes between them.

use std::collections::HashMap;
use std::fmt;

use itertools::Itertools;
use tracing::debug;

use super::frame::{FrameChange, FrameKind};
use super::inverse::invert_map;
use super::{ChartId, FrameId, Manifold, SubsetId};
use crate::canon::Assumptions;
use crate::errors::{GeometryError, Result};
use crate::expr::Expr;
use crate::matrix::SymMatrix;

/// One coordinate of a chart and what is known about its range.
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    symbol: String,
    lower: Option<Expr>,
    upper: Option<Expr>,
    nonnegative: bool,
    periodic: bool,
}

impl Coordinate {
    /// Parses a declaration such as `x`, `r:positive`, `th:(0,pi)` or `ph:[0,2*pi):periodic`.
    pub fn parse(declaration: &str) -> Result<Coordinate> {
        let mut parts = declaration.split(':');
        let symbol = parts.next().unwrap_or_default().trim();
        let valid = symbol
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(GeometryError::InvalidCoordinate(declaration.to_string()));
        }
        let mut coordinate = Coordinate {
            symbol: symbol.to_string(),
            lower: None,
            upper: None,
            nonnegative: false,
            periodic: false,
        };
        for option in parts {
            match option {
                "positive" | "nonnegative" => coordinate.nonnegative = true,
                "periodic" => coordinate.periodic = true,
                interval if is_interval(interval) => {
                    let (lower, upper) = parse_interval(interval)
                        .ok_or_else(|| GeometryError::InvalidCoordinate(declaration.to_string()))?;
                    if lower.as_ref().and_then(Expr::as_const).is_some_and(|c| c >= 0.0) {
                        coordinate.nonnegative = true;
                    }
                    coordinate.lower = lower;
                    coordinate.upper = upper;
                }
                _ => return Err(GeometryError::InvalidCoordinate(declaration.to_string())),
            }
        }
        Ok(coordinate)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn expr(&self) -> Expr {
        Expr::var(self.symbol.clone())
    }

    pub fn lower(&self) -> Option<&Expr> {
        self.lower.as_ref()
    }

    pub fn upper(&self) -> Option<&Expr> {
        self.upper.as_ref()
    }

    /// Whether the coordinate never takes negative values.
    pub fn is_nonnegative(&self) -> bool {
        self.nonnegative
    }

    pub fn is_periodic(&self) -> bool {
        self.periodic
    }
}

fn is_interval(option: &str) -> bool {
    (option.starts_with('(') || option.starts_with('['))
        && (option.ends_with(')') || option.ends_with(']'))
}

fn parse_interval(option: &str) -> Option<(Option<Expr>, Option<Expr>)> {
    let inner = &option[1..option.len() - 1];
    let (lower, upper) = inner.split_once(',')?;
    let bound = |s: &str| -> Option<Option<Expr>> {
        match s.trim() {
            "-inf" | "-oo" | "inf" | "+inf" | "oo" | "+oo" => Some(None),
            other => Expr::parse(other).ok().map(Some),
        }
    };
    Some((bound(lower)?, bound(upper)?))
}

/// A coordinate system on an open subset.
#[derive(Debug, Clone)]
pub struct Chart {
    id: ChartId,
    domain: SubsetId,
    name: String,
    coordinates: Vec<Coordinate>,
    frame: FrameId,
}

impl Chart {
    pub fn id(&self) -> ChartId {
        self.id
    }

    pub fn domain(&self) -> SubsetId {
        self.domain
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    /// Coordinate names in order.
    pub fn symbols(&self) -> Vec<String> {
        self.coordinates.iter().map(|c| c.symbol.clone()).collect()
    }

    /// Coordinate handles as expressions.
    pub fn coords(&self) -> Vec<Expr> {
        self.coordinates.iter().map(Coordinate::expr).collect()
    }

    /// The coordinate frame `(d/dx^i)` induced by the chart.
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Sign information derived from the coordinate ranges.
    pub fn assumptions(&self) -> Assumptions {
        let mut assumptions = Assumptions::new();
        for coordinate in self.coordinates.iter().filter(|c| c.nonnegative) {
            assumptions.assume_positive(coordinate.symbol.clone());
        }
        assumptions
    }

    /// Bindings mapping each coordinate symbol to the given expressions.
    pub(crate) fn bindings(&self, values: &[Expr]) -> HashMap<String, Expr> {
        self.symbols().into_iter().zip(values.iter().cloned()).collect()
    }
}

impl fmt::Display for Chart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, ({}))", self.name, self.symbols().join(", "))
    }
}

/// A coordinate change: the coordinates of `to` as functions of those of `from`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    from: ChartId,
    to: ChartId,
    functions: Vec<Expr>,
}

impl Transition {
    pub fn from(&self) -> ChartId {
        self.from
    }

    pub fn to(&self) -> ChartId {
        self.to
    }

    pub fn functions(&self) -> &[Expr] {
        &self.functions
    }
}

/// A validated coordinate change, not yet registered.
struct PreparedTransition {
    forward: Transition,
    jacobian: SymMatrix,
    inverse_jacobian: SymMatrix,
}

impl Manifold {
    /// Creates a chart on an open subset, together with its coordinate frame.
    ///
    /// # Arguments
    /// * `domain` - The open subset covered by the chart
    /// * `name` - Name of the chart
    /// * `coordinates` - Space separated coordinate declarations, e.g. `"r:positive th:(0,pi)"`
    ///
    /// # Returns
    /// * `Result<ChartId>` - The new chart; the first chart of a subset becomes its default
    pub fn chart(&mut self, domain: SubsetId, name: &str, coordinates: &str) -> Result<ChartId> {
        let subset = self.subset_data(domain)?;
        if !subset.open {
            return Err(GeometryError::DomainMismatch(format!(
                "chart {name} on non-open subset {}",
                subset.name
            )));
        }
        let coordinates = coordinates
            .split_whitespace()
            .map(Coordinate::parse)
            .collect::<Result<Vec<_>>>()?;
        if coordinates.len() != self.dim {
            return Err(GeometryError::DimensionMismatch {
                expected: self.dim,
                got: coordinates.len(),
            });
        }
        if let Some(repeated) = coordinates.iter().map(|c| &c.symbol).duplicates().next() {
            return Err(GeometryError::InvalidCoordinate(format!(
                "coordinate {repeated} declared twice in chart {name}"
            )));
        }

        let id = ChartId {
            manifold: self.id,
            index: self.charts.len(),
        };
        let frame = self.push_frame(domain, &format!("d/d{name}"), FrameKind::Coordinate(id));
        let chart = Chart {
            id,
            domain,
            name: name.to_string(),
            coordinates,
            frame,
        };
        debug!(chart = %chart, "creating chart");
        self.charts.push(chart);

        let subset = &mut self.subsets[domain.index];
        subset.atlas.push(id);
        if subset.default_chart.is_none() {
            subset.default_chart = Some(id);
        }
        Ok(id)
    }

    pub fn chart_info(&self, id: ChartId) -> Result<&Chart> {
        if id.manifold != self.id {
            return Err(self.foreign(&id));
        }
        self.charts
            .get(id.index)
            .ok_or_else(|| GeometryError::UnknownChart(id.to_string()))
    }

    /// Coordinate handles of a chart.
    pub fn coords(&self, chart: ChartId) -> Result<Vec<Expr>> {
        Ok(self.chart_info(chart)?.coords())
    }

    pub fn coordinate_frame(&self, chart: ChartId) -> Result<FrameId> {
        Ok(self.chart_info(chart)?.frame)
    }

    pub fn chart_assumptions(&self, chart: ChartId) -> Result<Assumptions> {
        Ok(self.chart_info(chart)?.assumptions())
    }

    /// Whether both charts' domains are nested, so a transition between them makes sense.
    fn check_overlap(&self, a: ChartId, b: ChartId) -> Result<()> {
        let (da, db) = (self.chart_info(a)?.domain, self.chart_info(b)?.domain);
        self.common_subset(da, db).map(|_| ())
    }

    fn parse_functions<S: AsRef<str>>(functions: &[S]) -> Result<Vec<Expr>> {
        functions.iter().map(|f| Expr::parse(f.as_ref())).collect()
    }

    /// Checks that `functions` are `dim` expressions in the coordinates of `chart`.
    fn check_functions(&self, chart: ChartId, functions: &[Expr]) -> Result<()> {
        if functions.len() != self.dim {
            return Err(GeometryError::DimensionMismatch {
                expected: self.dim,
                got: functions.len(),
            });
        }
        let symbols = self.chart_info(chart)?.symbols();
        let stray = functions
            .iter()
            .flat_map(Expr::free_symbols)
            .find(|s| !symbols.contains(s));
        match stray {
            Some(symbol) => Err(GeometryError::InvalidCoordinate(format!(
                "{symbol} is not a coordinate of chart {}",
                self.charts[chart.index].name
            ))),
            None => Ok(()),
        }
    }

    /// Jacobian `d(functions)_i / d(coordinate)_j` in the coordinates of `chart`.
    pub(crate) fn jacobian_matrix(&self, chart: ChartId, functions: &[Expr]) -> Result<SymMatrix> {
        let chart = self.chart_info(chart)?;
        let assumptions = chart.assumptions();
        let symbols = chart.symbols();
        let rows = functions
            .iter()
            .map(|f| {
                symbols
                    .iter()
                    .map(|x| f.derivative(x).simplify_with(&assumptions))
                    .collect()
            })
            .collect();
        SymMatrix::from_rows(rows)
    }

    /// Registers the coordinate change `from -> to`, given the coordinates of `to`
    /// as expressions in those of `from`.
    ///
    /// Also registers the change between the two coordinate frames in both
    /// directions. The reverse coordinate change is derived automatically when the
    /// map can be inverted; when it cannot, the forward map is still registered and
    /// the reverse stays unknown (see [`Manifold::invert_transition`]).
    ///
    /// Fails with `NonInvertibleTransition` when the Jacobian is singular.
    pub fn add_transition<S: AsRef<str>>(
        &mut self,
        from: ChartId,
        to: ChartId,
        functions: &[S],
    ) -> Result<()> {
        let functions = Self::parse_functions(functions)?;
        self.add_transition_exprs(from, to, functions)
    }

    /// Same as [`Manifold::add_transition`] with already built expressions.
    ///
    /// Re-registering `from -> to` also refreshes a previously derived `to -> from`;
    /// a reverse given explicitly by the user is kept.
    pub fn add_transition_exprs(
        &mut self,
        from: ChartId,
        to: ChartId,
        functions: Vec<Expr>,
    ) -> Result<()> {
        let prepared = self.prepare_transition(from, to, functions)?;
        self.install_transition(prepared);
        self.derived_inverses.remove(&(from, to));

        let explicit_reverse = self.transitions.get_mut().is_registered(to, from)
            && !self.derived_inverses.contains(&(to, from));
        if explicit_reverse {
            return Ok(());
        }
        match self.derive_inverse(from, to) {
            Ok(inverse) => {
                debug!(from = %from, to = %to, "registered derived inverse transition");
                self.transitions.get_mut().register(to, from, inverse);
                self.derived_inverses.insert((to, from));
            }
            Err(err) => {
                if self.derived_inverses.remove(&(to, from)) {
                    self.transitions.get_mut().remove(to, from);
                }
                debug!(from = %from, to = %to, error = %err, "inverse transition left unregistered");
            }
        }
        Ok(())
    }

    /// Registers a coordinate change together with its explicit inverse.
    ///
    /// With `verify_inversions` set, the two maps must compose to the identity in
    /// both orders; otherwise `NonInvertibleTransition` is returned and nothing is
    /// registered.
    pub fn add_transition_with_inverse<S: AsRef<str>>(
        &mut self,
        from: ChartId,
        to: ChartId,
        functions: &[S],
        inverse: &[S],
    ) -> Result<()> {
        let functions = Self::parse_functions(functions)?;
        let inverse = Self::parse_functions(inverse)?;
        self.check_functions(to, &inverse)?;
        let prepared = self.prepare_transition(from, to, functions)?;
        let reverse = Transition {
            from: to,
            to: from,
            functions: inverse,
        };
        if self.config.verify_inversions && !self.is_round_trip(&prepared.forward, &reverse)? {
            return Err(GeometryError::NonInvertibleTransition(format!(
                "({}) is not the inverse of {} -> {}",
                reverse.functions.iter().join(", "),
                self.charts[from.index].name,
                self.charts[to.index].name
            )));
        }
        self.install_transition(prepared);
        self.transitions.get_mut().register(to, from, reverse);
        self.derived_inverses.remove(&(from, to));
        self.derived_inverses.remove(&(to, from));
        Ok(())
    }

    /// Validates the forward map and computes both coordinate-frame changes.
    fn prepare_transition(
        &self,
        from: ChartId,
        to: ChartId,
        functions: Vec<Expr>,
    ) -> Result<PreparedTransition> {
        if from == to {
            return Err(GeometryError::InvalidCoordinate(format!(
                "transition from chart {} to itself",
                self.chart_info(from)?.name
            )));
        }
        self.check_overlap(from, to)?;
        self.check_functions(from, &functions)?;

        let assumptions = self.chart_info(from)?.assumptions();
        let functions: Vec<Expr> = functions
            .iter()
            .map(|f| f.simplify_with(&assumptions))
            .collect();
        let jacobian = self.jacobian_matrix(from, &functions)?;
        let inverse_jacobian = jacobian.inverse(&assumptions).map_err(|_| {
            GeometryError::NonInvertibleTransition(format!(
                "singular Jacobian for {} -> {}",
                self.charts[from.index].name, self.charts[to.index].name
            ))
        })?;
        Ok(PreparedTransition {
            forward: Transition {
                from,
                to,
                functions,
            },
            jacobian,
            inverse_jacobian,
        })
    }

    /// Registers a validated forward map and both coordinate-frame changes.
    fn install_transition(&mut self, prepared: PreparedTransition) {
        let PreparedTransition {
            forward,
            jacobian,
            inverse_jacobian,
        } = prepared;
        let (from, to) = (forward.from, forward.to);
        let from_frame = self.charts[from.index].frame;
        let to_frame = self.charts[to.index].frame;
        debug!(
            from = %self.charts[from.index],
            to = %self.charts[to.index],
            functions = %forward.functions.iter().join(", "),
            "registering transition"
        );
        self.transitions.get_mut().register(from, to, forward);
        // d/dx^j = (dy^i/dx^j) d/dy^i
        let frames = self.frame_changes.get_mut();
        frames.register(
            to_frame,
            from_frame,
            FrameChange::new(to_frame, from_frame, jacobian.clone(), inverse_jacobian.clone(), Some(from)),
        );
        frames.register(
            from_frame,
            to_frame,
            FrameChange::new(from_frame, to_frame, inverse_jacobian, jacobian, Some(from)),
        );
    }

    /// Derives `to -> from` from the registered `from -> to`.
    fn derive_inverse(&self, from: ChartId, to: ChartId) -> Result<Transition> {
        let forward = self
            .transitions
            .borrow()
            .edge(from, to)
            .cloned()
            .ok_or_else(|| {
                GeometryError::NoCommonChart(format!("no registered transition {from} -> {to}"))
            })?;
        let source = self.chart_info(from)?;
        let target = self.chart_info(to)?;
        let functions = invert_map(
            &source.symbols(),
            &target.symbols(),
            &forward.functions,
            &source.assumptions(),
        )
        .ok_or_else(|| {
            GeometryError::NonInvertibleTransition(format!(
                "cannot invert {} -> {}: ({})",
                source.name,
                target.name,
                forward.functions.iter().join(", ")
            ))
        })?;
        let target_assumptions = target.assumptions();
        let reverse = Transition {
            from: to,
            to: from,
            functions: functions
                .iter()
                .map(|f| f.simplify_with(&target_assumptions))
                .collect(),
        };
        if self.config.verify_inversions && !self.is_round_trip(&forward, &reverse)? {
            return Err(GeometryError::NonInvertibleTransition(format!(
                "derived inverse of {} -> {} does not compose to the identity",
                source.name, target.name
            )));
        }
        Ok(reverse)
    }

    /// Whether `reverse` undoes `forward` in both orders.
    fn is_round_trip(&self, forward: &Transition, reverse: &Transition) -> Result<bool> {
        let there_and_back = self.compose(&[forward.clone(), reverse.clone()])?;
        let back_and_there = self.compose(&[reverse.clone(), forward.clone()])?;
        let source = self.chart_info(forward.from)?;
        let target = self.chart_info(forward.to)?;
        let identity = |t: &Transition, chart: &Chart| {
            let assumptions = chart.assumptions();
            t.functions
                .iter()
                .zip(chart.coords())
                .all(|(f, x)| f.equals_with(&x, &assumptions))
        };
        Ok(identity(&there_and_back, source) && identity(&back_and_there, target))
    }

    /// Derives and registers the inverse of the registered transition `from -> to`.
    ///
    /// # Returns
    /// * `Result<Transition>` - The reverse transition, or `NonInvertibleTransition`
    pub fn invert_transition(&mut self, from: ChartId, to: ChartId) -> Result<Transition> {
        let reverse = self.derive_inverse(from, to)?;
        self.transitions.get_mut().register(to, from, reverse.clone());
        self.derived_inverses.insert((to, from));
        Ok(reverse)
    }

    /// Composes transitions along a path `c0 -> c1 -> ... -> cn`.
    fn compose(&self, steps: &[Transition]) -> Result<Transition> {
        let first = steps
            .first()
            .ok_or_else(|| GeometryError::NoCommonChart("empty transition path".to_string()))?;
        let assumptions = self.chart_info(first.from)?.assumptions();
        let mut functions = first.functions.clone();
        for step in &steps[1..] {
            let bindings = self.chart_info(step.from)?.bindings(&functions);
            functions = step
                .functions
                .iter()
                .map(|f| f.substitute(&bindings))
                .collect();
            if self.config.simplify_derived {
                functions = functions
                    .iter()
                    .map(|f| f.simplify_with(&assumptions))
                    .collect();
            }
        }
        let to = steps.last().map_or(first.to, |s| s.to);
        Ok(Transition {
            from: first.from,
            to,
            functions,
        })
    }

    fn identity_transition(&self, chart: ChartId) -> Result<Transition> {
        Ok(Transition {
            from: chart,
            to: chart,
            functions: self.chart_info(chart)?.coords(),
        })
    }

    /// The coordinates of `to` as functions of those of `from`.
    ///
    /// Registered transitions are used directly; otherwise the shortest chain of
    /// registered transitions is composed and cached as a direct edge. Fails with
    /// `NoCommonChart` when no chain of at most `max_path_depth` steps exists.
    pub fn transition_map(&self, from: ChartId, to: ChartId) -> Result<Transition> {
        self.transition_to_any(from, &[to])
    }

    /// Transition from `from` to the first of `targets` that can be reached.
    ///
    /// Targets are tried in the given order for a direct edge before a path search.
    pub fn transition_to_any(&self, from: ChartId, targets: &[ChartId]) -> Result<Transition> {
        self.chart_info(from)?;
        if targets.contains(&from) {
            return self.identity_transition(from);
        }
        let direct = {
            let graph = self.transitions.borrow();
            targets.iter().find_map(|t| graph.edge(from, *t).cloned())
        };
        if let Some(transition) = direct {
            self.bump(|s| s.cache_hits += 1);
            return Ok(transition);
        }

        self.bump(|s| s.path_searches += 1);
        let steps = {
            let graph = self.transitions.borrow();
            graph
                .shortest_path(from, |c| targets.contains(c), self.config.max_path_depth)
                .and_then(|path| graph.path_values(&path))
        };
        let Some(steps) = steps else {
            return Err(GeometryError::NoCommonChart(format!(
                "no transition from {} to any of [{}]",
                self.chart_info(from)?.name,
                targets
                    .iter()
                    .filter_map(|t| self.chart_info(*t).ok().map(|c| c.name.clone()))
                    .join(", ")
            )));
        };
        let composed = self.compose(&steps)?;
        debug!(
            from = %composed.from,
            to = %composed.to,
            hops = steps.len(),
            "composed transition"
        );
        self.transitions
            .borrow_mut()
            .cache(composed.from, composed.to, composed.clone());
        self.bump(|s| s.compositions += 1);
        Ok(composed)
    }

    /// Rewrites an expression in the coordinates of `from` into those of `to`.
    pub fn express_in(&self, expr: &Expr, from: ChartId, to: ChartId) -> Result<Expr> {
        if from == to {
            return Ok(expr.clone());
        }
        let transition = self.transition_map(to, from)?;
        let bindings = self.chart_info(from)?.bindings(&transition.functions);
        let assumptions = self.chart_info(to)?.assumptions();
        Ok(expr.substitute(&bindings).simplify_with(&assumptions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeometryConfig;

    fn parse(source: &str) -> Expr {
        Expr::parse(source).unwrap()
    }

    #[test]
    fn test_coordinate_declarations() {
        let r = Coordinate::parse("r:positive").unwrap();
        assert!(r.is_nonnegative());
        let th = Coordinate::parse("th:(0,pi)").unwrap();
        assert!(th.is_nonnegative());
        assert_eq!(th.upper(), Some(&Expr::var("pi")));
        let ph = Coordinate::parse("ph:[-pi,pi):periodic").unwrap();
        assert!(!ph.is_nonnegative());
        assert!(ph.is_periodic());
        assert!(Coordinate::parse("2x").is_err());
        assert!(Coordinate::parse("x:sometimes").is_err());
    }

    #[test]
    fn test_chart_creation() {
        let mut m = Manifold::new(2, "M");
        let root = m.root();
        let polar = m.chart(root, "P", "r:positive th:(0,2*pi)").unwrap();
        let chart = m.chart_info(polar).unwrap();
        assert_eq!(chart.symbols(), vec!["r".to_string(), "th".to_string()]);
        assert!(chart.assumptions().is_positive("r"));
        assert_eq!(chart.to_string(), "(P, (r, th))");
        assert!(matches!(
            m.chart(root, "Y", "x"),
            Err(GeometryError::DimensionMismatch { .. })
        ));
        assert!(m.chart(root, "Z", "x x").is_err());
        assert_eq!(m.atlas(root).unwrap(), &[polar]);
    }

    #[test]
    fn test_square_transition_derives_root() {
        let mut m = Manifold::new(1, "R+");
        let root = m.root();
        let a = m.chart(root, "A", "x:positive").unwrap();
        let b = m.chart(root, "B", "y").unwrap();
        m.add_transition(a, b, &["x^2"]).unwrap();
        let back = m.transition_map(b, a).unwrap();
        assert_eq!(back.functions(), &[parse("sqrt(y)")]);
    }

    #[test]
    fn test_round_trip_is_identity() {
        let mut m = Manifold::new(2, "M");
        let root = m.root();
        let a = m.chart(root, "A", "x:positive y").unwrap();
        let b = m.chart(root, "B", "u v").unwrap();
        m.add_transition(a, b, &["x^2", "3*y - 1"]).unwrap();
        let forward = m.transition_map(a, b).unwrap();
        let reverse = m.transition_map(b, a).unwrap();
        let composed = m.compose(&[forward, reverse]).unwrap();
        let assumptions = m.chart_assumptions(a).unwrap();
        for (f, x) in composed.functions().iter().zip(m.coords(a).unwrap()) {
            assert!(f.equals_with(&x, &assumptions));
        }
    }

    #[test]
    fn test_affine_inverse() {
        let mut m = Manifold::new(2, "M");
        let root = m.root();
        let a = m.chart(root, "A", "x y").unwrap();
        let b = m.chart(root, "B", "u v").unwrap();
        m.add_transition(a, b, &["x + y", "x - y + 2"]).unwrap();
        let back = m.transition_map(b, a).unwrap();
        assert!(back.functions()[0].equals(&parse("(u + v - 2)/2")));
        assert!(back.functions()[1].equals(&parse("(u - v + 2)/2")));
    }

    #[test]
    fn test_non_invertible_transition_left_unregistered() {
        let mut m = Manifold::new(2, "M");
        let root = m.root();
        let polar = m.chart(root, "P", "r:positive th:(0,2*pi)").unwrap();
        let cart = m.chart(root, "C", "x y").unwrap();
        m.add_transition(polar, cart, &["r*cos(th)", "r*sin(th)"])
            .unwrap();
        assert!(matches!(
            m.transition_map(cart, polar),
            Err(GeometryError::NoCommonChart(_))
        ));
        assert!(matches!(
            m.invert_transition(polar, cart),
            Err(GeometryError::NonInvertibleTransition(_))
        ));
        // the frame changes are registered in both directions
        let e_polar = m.coordinate_frame(polar).unwrap();
        let e_cart = m.coordinate_frame(cart).unwrap();
        assert!(m.frame_change(e_cart, e_polar).is_ok());
        assert!(m.frame_change(e_polar, e_cart).is_ok());
    }

    #[test]
    fn test_singular_transition_rejected() {
        let mut m = Manifold::new(2, "M");
        let root = m.root();
        let a = m.chart(root, "A", "x y").unwrap();
        let b = m.chart(root, "B", "u v").unwrap();
        assert!(matches!(
            m.add_transition(a, b, &["x + y", "2*x + 2*y"]),
            Err(GeometryError::NonInvertibleTransition(_))
        ));
        assert!(m.transition_map(a, b).is_err());
    }

    #[test]
    fn test_transition_validation() {
        let mut m = Manifold::new(1, "M");
        let root = m.root();
        let a = m.chart(root, "A", "x").unwrap();
        let b = m.chart(root, "B", "y").unwrap();
        assert!(matches!(
            m.add_transition(a, b, &["y + 1"]),
            Err(GeometryError::InvalidCoordinate(_))
        ));
        assert!(matches!(
            m.add_transition(a, b, &["x", "x"]),
            Err(GeometryError::DimensionMismatch { .. })
        ));
        assert!(m.add_transition(a, a, &["x"]).is_err());
    }

    #[test]
    fn test_composition_is_memoised() {
        let mut m = Manifold::new(1, "M");
        let root = m.root();
        let a = m.chart(root, "A", "x").unwrap();
        let b = m.chart(root, "B", "y").unwrap();
        let c = m.chart(root, "C", "z").unwrap();
        m.add_transition(a, b, &["2*x"]).unwrap();
        m.add_transition(b, c, &["y + 1"]).unwrap();
        m.reset_graph_stats();

        let first = m.transition_map(a, c).unwrap();
        assert!(first.functions()[0].equals(&parse("2*x + 1")));
        assert_eq!(m.graph_stats().path_searches, 1);

        let second = m.transition_map(a, c).unwrap();
        assert_eq!(first, second);
        assert_eq!(m.graph_stats().path_searches, 1);
        assert_eq!(m.graph_stats().cache_hits, 1);
    }

    #[test]
    fn test_depth_cap_from_config() {
        let mut m =
            Manifold::new(1, "M").with_config(GeometryConfig::default().with_max_path_depth(1));
        let root = m.root();
        let a = m.chart(root, "A", "x").unwrap();
        let b = m.chart(root, "B", "y").unwrap();
        let c = m.chart(root, "C", "z").unwrap();
        m.add_transition(a, b, &["2*x"]).unwrap();
        m.add_transition(b, c, &["y + 1"]).unwrap();
        assert!(matches!(
            m.transition_map(a, c),
            Err(GeometryError::NoCommonChart(_))
        ));
    }

    #[test]
    fn test_explicit_inverse_and_express_in() {
        let mut m = Manifold::new(1, "M");
        let root = m.root();
        let a = m.chart(root, "A", "x").unwrap();
        let b = m.chart(root, "B", "y:positive").unwrap();
        m.add_transition_with_inverse(a, b, &["exp(x)"], &["ln(y)"])
            .unwrap();
        let e = m.express_in(&parse("x^2"), a, b).unwrap();
        assert!(e.equals(&parse("ln(y)^2")));
        let back = m.express_in(&parse("y"), b, a).unwrap();
        assert!(back.equals(&parse("exp(x)")));
    }

    #[test]
    fn test_wrong_explicit_inverse_rejected() {
        let mut m = Manifold::new(1, "M");
        let root = m.root();
        let a = m.chart(root, "A", "x").unwrap();
        let b = m.chart(root, "B", "y").unwrap();
        assert!(matches!(
            m.add_transition_with_inverse(a, b, &["2*x"], &["y"]),
            Err(GeometryError::NonInvertibleTransition(_))
        ));
        assert!(m.transition_map(a, b).is_err());
        assert!(m.transition_map(b, a).is_err());
        let (fa, fb) = (m.chart_info(a).unwrap().frame(), m.chart_info(b).unwrap().frame());
        assert!(m.frame_change(fa, fb).is_err());

        let mut n = Manifold::new(1, "N")
            .with_config(GeometryConfig::default().with_verify_inversions(false));
        let root = n.root();
        let a = n.chart(root, "A", "x").unwrap();
        let b = n.chart(root, "B", "y").unwrap();
        assert!(n.add_transition_with_inverse(a, b, &["2*x"], &["y"]).is_ok());
    }

    #[test]
    fn test_reregistered_transition_refreshes_derived_inverse() {
        let mut m = Manifold::new(1, "M");
        let root = m.root();
        let a = m.chart(root, "A", "x").unwrap();
        let b = m.chart(root, "B", "y").unwrap();
        m.add_transition(a, b, &["2*x"]).unwrap();
        assert!(m.transition_map(b, a).unwrap().functions()[0].equals(&parse("y/2")));

        m.add_transition(a, b, &["3*x"]).unwrap();
        assert!(m.transition_map(b, a).unwrap().functions()[0].equals(&parse("y/3")));

        // a map that cannot be inverted drops the stale reverse
        m.add_transition(a, b, &["x^2 + x"]).unwrap();
        assert!(m.transition_map(b, a).is_err());
    }

    #[test]
    fn test_explicit_inverse_survives_forward_update() {
        let mut m = Manifold::new(1, "M");
        let root = m.root();
        let a = m.chart(root, "A", "x").unwrap();
        let b = m.chart(root, "B", "y:positive").unwrap();
        m.add_transition_with_inverse(a, b, &["exp(x)"], &["ln(y)"])
            .unwrap();
        m.add_transition(a, b, &["exp(x)"]).unwrap();
        assert_eq!(m.transition_map(b, a).unwrap().functions(), &[parse("ln(y)")]);
    }

    #[test]
    fn test_odd_power_derives_cube_root() {
        let mut m = Manifold::new(1, "M");
        let root = m.root();
        let a = m.chart(root, "A", "x").unwrap();
        let b = m.chart(root, "B", "y").unwrap();
        m.add_transition(a, b, &["x^3"]).unwrap();
        let back = m.transition_map(b, a).unwrap();
        assert!(back.functions()[0].equals(&parse("y^(1/3)")));
        let e = m.express_in(&parse("x^6"), a, b).unwrap();
        assert!(e.equals(&parse("y^2")));
    }

    #[test]
    fn test_affine_inverse_with_offset() {
        let mut m = Manifold::new(1, "M");
        let root = m.root();
        let a = m.chart(root, "A", "x").unwrap();
        let b = m.chart(root, "B", "y").unwrap();
        m.add_transition(a, b, &["x - 1"]).unwrap();
        let back = m.transition_map(b, a).unwrap();
        assert!(back.functions()[0].equals(&parse("y + 1")));
    }

    #[test]
    fn test_transition_between_nested_domains() {
        let mut m = Manifold::new(1, "M");
        let root = m.root();
        let u = m.open_subset("U", root).unwrap();
        let v = m.open_subset("V", root).unwrap();
        let a = m.chart(root, "A", "x").unwrap();
        let b = m.chart(u, "B", "y").unwrap();
        let c = m.chart(v, "C", "z").unwrap();
        assert!(m.add_transition(a, b, &["x - 1"]).is_ok());
        assert!(matches!(
            m.add_transition(b, c, &["y"]),
            Err(GeometryError::DomainMismatch(_))
        ));
    }
}
