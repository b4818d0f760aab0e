//! Canonical normal form for [`Expr`].
//!
//! Every expression is normalised into a [`Poly`]: a sum of monomials with `f64`
//! coefficients, where a monomial is a product of *atoms* raised to integer powers.
//! Atoms are symbols and everything that cannot be expanded any further: function
//! applications, square roots of non-monomials, non-integer powers and sums that
//! appear in a denominator.
//!
//! Pass pipeline
//! -------------
//!  1. **normalize**   – recursive rewrite into a `Poly`: constant folding, like-term
//!                       collection, distribution, expansion of non-negative integer
//!                       powers, monomial division, root and absolute value extraction.
//!  2. **pythagorean** – `c·m·sin(u)² + c·m·cos(u)² → c·m`, iterated to a fix-point.
//!  3. **to_expr**     – rebuild a deterministic expression tree from the `Poly`.
//!
//! Two expressions are equal up to simplification iff the normal form of their
//! difference has no terms.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::expr::Expr;

/// Coefficients smaller than this in magnitude are dropped.
const EPS: f64 = 1e-10;

/// Sign information about symbols, used when extracting roots and absolute values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assumptions {
    positive: BTreeSet<String>,
}

impl Assumptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`Assumptions::assume_positive`].
    pub fn with_positive(mut self, symbol: impl Into<String>) -> Self {
        self.assume_positive(symbol);
        self
    }

    /// Records that `symbol` only takes positive values.
    pub fn assume_positive(&mut self, symbol: impl Into<String>) {
        self.positive.insert(symbol.into());
    }

    pub fn is_positive(&self, symbol: &str) -> bool {
        self.positive.contains(symbol)
    }

    /// Union of two sets of assumptions.
    pub fn merged(&self, other: &Assumptions) -> Assumptions {
        let mut positive = self.positive.clone();
        positive.extend(other.positive.iter().cloned());
        Assumptions { positive }
    }
}

/// Simplifies `expr` into its canonical expression tree.
pub fn simplify(expr: &Expr, assumptions: &Assumptions) -> Expr {
    normalize(expr, assumptions).to_expr()
}

/// Returns true if `expr` normalises to zero.
pub fn is_zero(expr: &Expr, assumptions: &Assumptions) -> bool {
    normalize(expr, assumptions).is_zero()
}

/// Returns true if `expr` is known to be non-negative, e.g. `x^2 + 1` or `r*exp(t)` for `r > 0`.
pub fn is_nonnegative(expr: &Expr, assumptions: &Assumptions) -> bool {
    normalize(expr, assumptions).is_nonneg(assumptions)
}

#[derive(Debug, Clone)]
enum AtomKind {
    Symbol(String),
    Sqrt(Poly),
    Abs(Poly),
    Exp(Poly),
    Ln(Poly),
    Sin(Poly),
    Cos(Poly),
    /// A sum that could not be expanded, e.g. a denominator.
    Sum(Poly),
    /// A base raised to a non-integer exponent other than 1/2.
    Root(Poly, f64),
}

#[derive(Debug, Clone)]
struct Atom {
    key: String,
    kind: AtomKind,
}

impl Atom {
    fn new(kind: AtomKind) -> Atom {
        let key = match &kind {
            AtomKind::Symbol(name) => name.clone(),
            AtomKind::Sqrt(p) => format!("sqrt({})", p.to_expr()),
            AtomKind::Abs(p) => format!("|{}|", p.to_expr()),
            AtomKind::Exp(p) => format!("exp({})", p.to_expr()),
            AtomKind::Ln(p) => format!("ln({})", p.to_expr()),
            AtomKind::Sin(p) => format!("sin({})", p.to_expr()),
            AtomKind::Cos(p) => format!("cos({})", p.to_expr()),
            AtomKind::Sum(p) => format!("({})", p.to_expr()),
            AtomKind::Root(p, exp) => format!("({})^{exp}", p.to_expr()),
        };
        Atom { key, kind }
    }

    fn to_expr(&self) -> Expr {
        match &self.kind {
            AtomKind::Symbol(name) => Expr::Var(name.clone()),
            AtomKind::Sqrt(p) => Expr::Sqrt(Box::new(p.to_expr())),
            AtomKind::Abs(p) => Expr::Abs(Box::new(p.to_expr())),
            AtomKind::Exp(p) => Expr::Exp(Box::new(p.to_expr())),
            AtomKind::Ln(p) => Expr::Ln(Box::new(p.to_expr())),
            AtomKind::Sin(p) => Expr::Sin(Box::new(p.to_expr())),
            AtomKind::Cos(p) => Expr::Cos(Box::new(p.to_expr())),
            AtomKind::Sum(p) => p.to_expr(),
            AtomKind::Root(p, exp) => Expr::PowFloat(Box::new(p.to_expr()), *exp),
        }
    }

    fn is_nonneg(&self, assumptions: &Assumptions) -> bool {
        match &self.kind {
            AtomKind::Symbol(name) => assumptions.is_positive(name),
            AtomKind::Sqrt(_) | AtomKind::Abs(_) | AtomKind::Exp(_) | AtomKind::Root(..) => true,
            AtomKind::Sum(p) => p.is_nonneg(assumptions),
            AtomKind::Ln(_) | AtomKind::Sin(_) | AtomKind::Cos(_) => false,
        }
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Atom {}

impl PartialOrd for Atom {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Atom {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

/// Product of atoms with non-zero integer exponents.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
struct Monomial(BTreeMap<Atom, i64>);

impl Monomial {
    fn single(atom: Atom, exp: i64) -> Monomial {
        let mut factors = BTreeMap::new();
        if exp != 0 {
            factors.insert(atom, exp);
        }
        Monomial(factors)
    }

    fn mul(&self, other: &Monomial) -> Monomial {
        let mut factors = self.0.clone();
        for (atom, exp) in &other.0 {
            let entry = factors.entry(atom.clone()).or_insert(0);
            *entry += exp;
            if *entry == 0 {
                factors.remove(atom);
            }
        }
        Monomial(factors)
    }

    fn pow(&self, n: i64) -> Monomial {
        if n == 0 {
            return Monomial::default();
        }
        Monomial(
            self.0
                .iter()
                .map(|(atom, exp)| (atom.clone(), exp * n))
                .collect(),
        )
    }

    fn is_nonneg(&self, assumptions: &Assumptions) -> bool {
        self.0
            .iter()
            .all(|(atom, exp)| exp % 2 == 0 || atom.is_nonneg(assumptions))
    }

    /// Rewrites factors that have a polynomial meaning: `sqrt(a)^2 = a`,
    /// `|a|^2 = a^2`, `(a^(1/3))^3 = a` and positive powers of unexpanded sums.
    fn reduce(self) -> Poly {
        let needs_reduction = self.0.iter().any(|(atom, exp)| match &atom.kind {
            AtomKind::Sqrt(_) => *exp != 1 && *exp != 0,
            AtomKind::Abs(_) => exp % 2 == 0,
            AtomKind::Sum(_) => *exp > 0,
            AtomKind::Root(_, root_exp) => integral(root_exp * *exp as f64).is_some(),
            _ => false,
        });
        if !needs_reduction {
            return Poly::from_term(self, 1.0);
        }

        let mut rest = Monomial::default();
        let mut result = Poly::constant(1.0);
        for (atom, exp) in self.0 {
            match &atom.kind {
                AtomKind::Sqrt(inner) if exp != 1 => {
                    let q = exp.div_euclid(2);
                    let r = exp.rem_euclid(2);
                    result = result.mul(&inner.pow(q));
                    if r == 1 {
                        rest = rest.mul(&Monomial::single(atom.clone(), 1));
                    }
                }
                AtomKind::Abs(inner) if exp % 2 == 0 => {
                    result = result.mul(&inner.pow(exp));
                }
                AtomKind::Sum(inner) if exp > 0 => {
                    result = result.mul(&inner.pow(exp));
                }
                AtomKind::Root(inner, root_exp) => match integral(root_exp * exp as f64) {
                    Some(power) => result = result.mul(&inner.pow(power)),
                    None => rest = rest.mul(&Monomial::single(atom.clone(), exp)),
                },
                _ => rest = rest.mul(&Monomial::single(atom.clone(), exp)),
            }
        }
        result.mul(&Poly::from_term(rest, 1.0))
    }

    fn to_expr(&self) -> Option<Expr> {
        let mut numerator: Option<Expr> = None;
        let mut denominator: Option<Expr> = None;
        for (atom, exp) in &self.0 {
            let base = atom.to_expr();
            let factor = |e: i64| {
                if e == 1 {
                    base.clone()
                } else {
                    Expr::Pow(Box::new(base.clone()), e)
                }
            };
            if *exp > 0 {
                let f = factor(*exp);
                numerator = Some(match numerator {
                    Some(n) => Expr::Mul(Box::new(n), Box::new(f)),
                    None => f,
                });
            } else {
                let f = factor(-exp);
                denominator = Some(match denominator {
                    Some(d) => Expr::Mul(Box::new(d), Box::new(f)),
                    None => f,
                });
            }
        }
        match (numerator, denominator) {
            (None, None) => None,
            (Some(n), None) => Some(n),
            (n, Some(d)) => Some(Expr::Div(
                Box::new(n.unwrap_or(Expr::Const(1.0))),
                Box::new(d),
            )),
        }
    }
}

/// Sum of monomials with non-zero coefficients.
#[derive(Debug, Clone, Default)]
pub(crate) struct Poly {
    terms: BTreeMap<Monomial, f64>,
}

impl Poly {
    fn constant(value: f64) -> Poly {
        Poly::from_term(Monomial::default(), value)
    }

    fn from_atom(kind: AtomKind) -> Poly {
        Poly::from_term(Monomial::single(Atom::new(kind), 1), 1.0)
    }

    fn from_term(monomial: Monomial, coefficient: f64) -> Poly {
        let mut terms = BTreeMap::new();
        if coefficient.abs() >= EPS {
            terms.insert(monomial, coefficient);
        }
        Poly { terms }
    }

    fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    fn as_const(&self) -> Option<f64> {
        match self.terms.len() {
            0 => Some(0.0),
            1 => self
                .terms
                .iter()
                .next()
                .filter(|(m, _)| m.0.is_empty())
                .map(|(_, c)| *c),
            _ => None,
        }
    }

    fn single_term(&self) -> Option<(&Monomial, f64)> {
        if self.terms.len() == 1 {
            self.terms.iter().next().map(|(m, c)| (m, *c))
        } else {
            None
        }
    }

    /// Returns the atom if the polynomial is exactly `1 * atom^1`.
    fn as_atom(&self) -> Option<&Atom> {
        match self.single_term() {
            Some((m, c)) if (c - 1.0).abs() < EPS && m.0.len() == 1 => m
                .0
                .iter()
                .next()
                .filter(|(_, exp)| **exp == 1)
                .map(|(atom, _)| atom),
            _ => None,
        }
    }

    fn add_term(&mut self, monomial: Monomial, coefficient: f64) {
        let entry = self.terms.entry(monomial.clone()).or_insert(0.0);
        *entry += coefficient;
        if entry.abs() < EPS {
            self.terms.remove(&monomial);
        }
    }

    fn add(&self, other: &Poly) -> Poly {
        let mut result = self.clone();
        for (m, c) in &other.terms {
            result.add_term(m.clone(), *c);
        }
        result
    }

    fn scale(&self, factor: f64) -> Poly {
        let mut result = Poly::default();
        for (m, c) in &self.terms {
            result.add_term(m.clone(), c * factor);
        }
        result
    }

    fn mul(&self, other: &Poly) -> Poly {
        let mut result = Poly::default();
        for (m1, c1) in &self.terms {
            for (m2, c2) in &other.terms {
                let product = m1.mul(m2).reduce().scale(c1 * c2);
                result = result.add(&product);
            }
        }
        result
    }

    fn pow(&self, n: i64) -> Poly {
        if n < 0 {
            return self.reciprocal().pow(-n);
        }
        let mut result = Poly::constant(1.0);
        let mut base = self.clone();
        let mut remaining = n;
        while remaining > 0 {
            if remaining & 1 == 1 {
                result = result.mul(&base);
            }
            remaining >>= 1;
            if remaining > 0 {
                base = base.mul(&base);
            }
        }
        result
    }

    fn reciprocal(&self) -> Poly {
        match self.single_term() {
            Some((m, c)) => m.pow(-1).reduce().scale(1.0 / c),
            None => Poly::from_term(Monomial::single(Atom::new(AtomKind::Sum(self.clone())), -1), 1.0),
        }
    }

    /// Returns `k` such that `self == k * other`, if any.
    fn ratio(&self, other: &Poly) -> Option<f64> {
        let (m, c) = other.terms.iter().next()?;
        let k = self.terms.get(m)? / c;
        if self.add(&other.scale(-k)).is_zero() {
            Some(k)
        } else {
            None
        }
    }

    fn is_nonneg(&self, assumptions: &Assumptions) -> bool {
        !self.terms.is_empty()
            && self
                .terms
                .iter()
                .all(|(m, c)| *c > 0.0 && m.is_nonneg(assumptions))
    }

    /// Sign of the leading coefficient, used to canonicalise odd/even function arguments.
    fn leading_negative(&self) -> bool {
        self.terms.values().next().is_some_and(|c| *c < 0.0)
    }

    fn to_expr(&self) -> Expr {
        let mut result: Option<Expr> = None;
        for (m, c) in &self.terms {
            let magnitude = c.abs();
            let term = match m.to_expr() {
                None if result.is_none() => {
                    result = Some(Expr::Const(*c));
                    continue;
                }
                None => Expr::Const(magnitude),
                Some(e) if (magnitude - 1.0).abs() < EPS => e,
                Some(e) => Expr::Mul(Box::new(Expr::Const(magnitude)), Box::new(e)),
            };
            result = Some(match (result, *c < 0.0) {
                (None, false) => term,
                (None, true) => Expr::Neg(Box::new(term)),
                (Some(acc), false) => Expr::Add(Box::new(acc), Box::new(term)),
                (Some(acc), true) => Expr::Sub(Box::new(acc), Box::new(term)),
            });
        }
        result.unwrap_or(Expr::Const(0.0))
    }
}

pub(crate) fn normalize(expr: &Expr, assumptions: &Assumptions) -> Poly {
    match expr {
        Expr::Const(c) => Poly::constant(*c),
        Expr::Var(name) => Poly::from_atom(AtomKind::Symbol(name.clone())),
        Expr::Add(left, right) => pythagorean(
            normalize(left, assumptions).add(&normalize(right, assumptions)),
        ),
        Expr::Sub(left, right) => pythagorean(
            normalize(left, assumptions).add(&normalize(right, assumptions).scale(-1.0)),
        ),
        Expr::Neg(inner) => normalize(inner, assumptions).scale(-1.0),
        Expr::Mul(left, right) => pythagorean(
            normalize(left, assumptions).mul(&normalize(right, assumptions)),
        ),
        Expr::Div(left, right) => {
            let numerator = normalize(left, assumptions);
            let denominator = normalize(right, assumptions);
            if numerator.is_zero() {
                return Poly::default();
            }
            if denominator.single_term().is_some() {
                return pythagorean(numerator.mul(&denominator.reciprocal()));
            }
            match numerator.ratio(&denominator) {
                Some(k) => Poly::constant(k),
                None => numerator.mul(&denominator.reciprocal()),
            }
        }
        Expr::Pow(base, exp) => pythagorean(normalize(base, assumptions).pow(*exp)),
        Expr::PowFloat(base, exp) => {
            let b = normalize(base, assumptions);
            if exp.fract() == 0.0 {
                b.pow(*exp as i64)
            } else if (2.0 * exp).fract() == 0.0 {
                sqrt(&b, assumptions).pow((2.0 * exp) as i64)
            } else if let Some(c) = b.as_const().filter(|c| *c > 0.0) {
                Poly::constant(c.powf(*exp))
            } else if let Some(root) = rational_root(&b, *exp, assumptions) {
                root
            } else {
                Poly::from_atom(AtomKind::Root(b, *exp))
            }
        }
        Expr::Sqrt(inner) => sqrt(&normalize(inner, assumptions), assumptions),
        Expr::Abs(inner) => abs(&normalize(inner, assumptions), assumptions),
        Expr::Exp(inner) => {
            let arg = normalize(inner, assumptions);
            if let Some(c) = arg.as_const() {
                return Poly::constant(c.exp());
            }
            match arg.as_atom().map(|a| &a.kind) {
                // exp(ln(x)) -> x
                Some(AtomKind::Ln(x)) => x.clone(),
                _ => Poly::from_atom(AtomKind::Exp(arg)),
            }
        }
        Expr::Ln(inner) => {
            let arg = normalize(inner, assumptions);
            if let Some(c) = arg.as_const().filter(|c| *c > 0.0) {
                return Poly::constant(c.ln());
            }
            match arg.as_atom().map(|a| &a.kind) {
                // ln(exp(x)) -> x
                Some(AtomKind::Exp(x)) => x.clone(),
                _ => Poly::from_atom(AtomKind::Ln(arg)),
            }
        }
        Expr::Sin(inner) => {
            let arg = normalize(inner, assumptions);
            if let Some(c) = arg.as_const() {
                return Poly::constant(snap(c.sin()));
            }
            // sin(-u) -> -sin(u)
            if arg.leading_negative() {
                Poly::from_atom(AtomKind::Sin(arg.scale(-1.0))).scale(-1.0)
            } else {
                Poly::from_atom(AtomKind::Sin(arg))
            }
        }
        Expr::Cos(inner) => {
            let arg = normalize(inner, assumptions);
            if let Some(c) = arg.as_const() {
                return Poly::constant(snap(c.cos()));
            }
            // cos(-u) -> cos(u)
            if arg.leading_negative() {
                Poly::from_atom(AtomKind::Cos(arg.scale(-1.0)))
            } else {
                Poly::from_atom(AtomKind::Cos(arg))
            }
        }
    }
}

fn snap(value: f64) -> f64 {
    if value.abs() < EPS {
        0.0
    } else {
        value
    }
}

/// Square root: pulls even powers of single-term radicands out of the root.
fn sqrt(radicand: &Poly, assumptions: &Assumptions) -> Poly {
    if let Some(c) = radicand.as_const() {
        if c >= 0.0 {
            return Poly::constant(c.sqrt());
        }
    }
    let Some((monomial, c)) = radicand.single_term().filter(|(_, c)| *c > 0.0) else {
        return Poly::from_atom(AtomKind::Sqrt(radicand.clone()));
    };

    let mut outside = Poly::constant(c.sqrt());
    let mut inside = Monomial::default();
    for (atom, exp) in &monomial.0 {
        let q = exp.div_euclid(2);
        let r = exp.rem_euclid(2);
        if q != 0 {
            let factor = Poly::from_term(Monomial::single(atom.clone(), 1), 1.0);
            let factor = if q % 2 != 0 && !atom.is_nonneg(assumptions) {
                abs(&factor, assumptions)
            } else {
                factor
            };
            outside = outside.mul(&factor.pow(q));
        }
        if r == 1 {
            inside = inside.mul(&Monomial::single(atom.clone(), 1));
        }
    }
    if inside.0.is_empty() {
        outside
    } else {
        let root = Poly::from_atom(AtomKind::Sqrt(Poly::from_term(inside, 1.0)));
        outside.mul(&root)
    }
}

fn integral(value: f64) -> Option<i64> {
    let rounded = value.round();
    ((value - rounded).abs() < EPS).then_some(rounded as i64)
}

/// Largest denominator recognised in fractional exponents.
const MAX_ROOT_DEGREE: i64 = 12;

/// Writes `exp` as `numerator / degree` with the smallest degree up to [`MAX_ROOT_DEGREE`].
fn as_fraction(exp: f64) -> Option<(i64, i64)> {
    (1..=MAX_ROOT_DEGREE)
        .find_map(|degree| integral(exp * degree as f64).map(|numerator| (numerator, degree)))
}

/// Rational power of a single term whose exponents are all divisible by the root
/// degree, e.g. `(8*x^3)^(1/3) = 2*x` or `(x^4*y^8)^(1/4) = |x|*y^2`.
fn rational_root(base: &Poly, exp: f64, assumptions: &Assumptions) -> Option<Poly> {
    let (numerator, degree) = as_fraction(exp)?;
    let (monomial, c) = base.single_term()?;
    let even = degree % 2 == 0;
    if even && c < 0.0 {
        return None;
    }
    if monomial
        .0
        .values()
        .any(|e| (e * numerator) % degree != 0)
    {
        return None;
    }

    let magnitude = c.abs().powf(exp);
    let mut result = Poly::constant(if c < 0.0 && numerator % 2 != 0 {
        -magnitude
    } else {
        magnitude
    });
    for (atom, e) in &monomial.0 {
        let power = e * numerator / degree;
        let factor = Poly::from_term(Monomial::single(atom.clone(), 1), 1.0);
        // an even root of an even power leaves the sign of the base undetermined
        let factor = if even && power % 2 != 0 && !atom.is_nonneg(assumptions) {
            abs(&factor, assumptions)
        } else {
            factor
        };
        result = result.mul(&factor.pow(power));
    }
    Some(result)
}

/// Absolute value: removed on operands known to be non-negative or non-positive.
fn abs(operand: &Poly, assumptions: &Assumptions) -> Poly {
    if operand.is_zero() {
        return Poly::default();
    }
    if operand.is_nonneg(assumptions) {
        return operand.clone();
    }
    let negated = operand.scale(-1.0);
    if negated.is_nonneg(assumptions) {
        return negated;
    }
    let Some((monomial, c)) = operand.single_term() else {
        return Poly::from_atom(AtomKind::Abs(operand.clone()));
    };

    let mut result = Poly::constant(c.abs());
    for (atom, exp) in &monomial.0 {
        let factor = if exp % 2 == 0 || atom.is_nonneg(assumptions) {
            Poly::from_term(Monomial::single(atom.clone(), *exp), 1.0)
        } else {
            let inner = Poly::from_term(Monomial::single(atom.clone(), 1), 1.0);
            Poly::from_atom(AtomKind::Abs(inner)).pow(*exp)
        };
        result = result.mul(&factor);
    }
    result
}

/// Applies `sin(u)^2 + cos(u)^2 = 1` until no pair of matching terms remains.
fn pythagorean(mut poly: Poly) -> Poly {
    loop {
        let mut rewrite: Option<(Monomial, Monomial, Monomial, f64)> = None;
        'search: for (m, c) in &poly.terms {
            for (atom, exp) in &m.0 {
                let AtomKind::Sin(arg) = &atom.kind else {
                    continue;
                };
                if *exp < 2 {
                    continue;
                }
                let cos = Atom::new(AtomKind::Cos(arg.clone()));
                let reduced = m.mul(&Monomial::single(atom.clone(), -2));
                let partner = reduced.mul(&Monomial::single(cos, 2));
                if poly
                    .terms
                    .get(&partner)
                    .is_some_and(|pc| (pc - c).abs() < EPS)
                {
                    rewrite = Some((m.clone(), partner, reduced, *c));
                    break 'search;
                }
            }
        }
        match rewrite {
            Some((sin_term, cos_term, reduced, c)) => {
                poly.terms.remove(&sin_term);
                poly.terms.remove(&cos_term);
                poly.add_term(reduced, c);
            }
            None => return poly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Expr {
        Expr::parse(source).unwrap()
    }

    fn simplified(source: &str) -> Expr {
        simplify(&parse(source), &Assumptions::default())
    }

    #[test]
    fn test_constant_folding() {
        assert_eq!(simplified("2 + 3"), Expr::Const(5.0));
        assert_eq!(simplified("2 * 3 - 6"), Expr::Const(0.0));
        assert_eq!(simplified("exp(0)"), Expr::Const(1.0));
        assert_eq!(simplified("ln(1)"), Expr::Const(0.0));
    }

    #[test]
    fn test_identities() {
        assert_eq!(simplified("x + 0"), Expr::var("x"));
        assert_eq!(simplified("x * 1"), Expr::var("x"));
        assert_eq!(simplified("x * 0"), Expr::Const(0.0));
        assert_eq!(simplified("x / x"), Expr::Const(1.0));
        assert_eq!(simplified("x^0"), Expr::Const(1.0));
        assert_eq!(simplified("-(-x)"), Expr::var("x"));
    }

    #[test]
    fn test_like_terms_and_expansion() {
        let a = simplified("(x + y)^2");
        let b = simplified("x^2 + 2*x*y + y^2");
        assert_eq!(a, b);
        assert!(is_zero(&parse("x*y - y*x"), &Assumptions::default()));
    }

    #[test]
    fn test_rational_cancellation() {
        assert!(is_zero(
            &parse("(x + y)/(x + y) - 1"),
            &Assumptions::default()
        ));
        assert!(is_zero(
            &parse("(2*x + 2*y)/(x + y) - 2"),
            &Assumptions::default()
        ));
        assert!(is_zero(&parse("x^3 / x^2 - x"), &Assumptions::default()));
    }

    #[test]
    fn test_roots() {
        let none = Assumptions::default();
        assert_eq!(simplified("sqrt(x^2)"), Expr::Abs(Box::new(Expr::var("x"))));
        let positive = Assumptions::new().with_positive("x");
        assert_eq!(simplify(&parse("sqrt(x^2)"), &positive), Expr::var("x"));
        assert!(is_zero(&parse("sqrt(y)^2 - y"), &none));
        assert!(is_zero(&parse("sqrt(4*y^2) - 2*abs(y)"), &none));
        assert!(is_zero(&parse("sqrt(y)*sqrt(y) - y"), &none));
    }

    #[test]
    fn test_odd_and_higher_roots() {
        let none = Assumptions::default();
        assert_eq!(simplified("(x^3)^(1/3)"), Expr::var("x"));
        assert!(is_zero(&parse("(8*x^6*y^3)^(1/3) - 2*x^2*y"), &none));
        assert!(is_zero(&parse("(-27*x^3)^(1/3) + 3*x"), &none));
        assert_eq!(simplified("(x^4)^(1/4)"), Expr::Abs(Box::new(Expr::var("x"))));
        let positive = Assumptions::new().with_positive("x");
        assert_eq!(simplify(&parse("(x^4)^(1/4)"), &positive), Expr::var("x"));
        // exponents not divisible by the degree stay as a root
        assert!(matches!(simplified("(x^2)^(1/3)"), Expr::PowFloat(..)));
        assert_eq!(simplified("(y^(1/3))^3"), Expr::var("y"));
        assert!(is_zero(&parse("(y^(1/3))^6 - y^2"), &none));
    }

    #[test]
    fn test_negative_constants_stay_constant() {
        assert_eq!(simplified("1 - 3"), Expr::Const(-2.0));
        assert_eq!(simplified("x - x - 2").as_const(), Some(-2.0));
        assert_eq!(parse("-(4)").as_const(), Some(-4.0));
        assert!(simplified("y - 1 - 2*y").equals(&parse("-y - 1")));
    }

    #[test]
    fn test_absolute_values() {
        let positive = Assumptions::new().with_positive("r");
        assert_eq!(simplify(&parse("abs(r)"), &positive), Expr::var("r"));
        assert_eq!(simplify(&parse("abs(-3*r)"), &positive), simplified("3*r"));
        assert_eq!(simplified("abs(x)^2"), simplified("x^2"));
        assert_eq!(simplified("abs(exp(x))"), simplified("exp(x)"));
    }

    #[test]
    fn test_transcendental() {
        assert_eq!(simplified("exp(ln(x))"), Expr::var("x"));
        assert_eq!(simplified("ln(exp(x + 1))"), simplified("x + 1"));
        assert_eq!(simplified("sin(-x)"), simplified("-sin(x)"));
        assert_eq!(simplified("cos(-x)"), simplified("cos(x)"));
        assert_eq!(simplified("sin(0)"), Expr::Const(0.0));
    }

    #[test]
    fn test_pythagorean_identity() {
        assert_eq!(simplified("sin(t)^2 + cos(t)^2"), Expr::Const(1.0));
        assert!(is_zero(
            &parse("r^2*sin(t)^2 + r^2*cos(t)^2 - r^2"),
            &Assumptions::default()
        ));
        assert!(is_zero(
            &parse("(r*cos(t))^2 + (r*sin(t))^2 - r^2"),
            &Assumptions::default()
        ));
    }

    #[test]
    fn test_sign_knowledge() {
        let positive = Assumptions::new().with_positive("r");
        assert!(is_nonnegative(&parse("r^3*exp(t) + 2"), &positive));
        assert!(is_nonnegative(&parse("x^2"), &positive));
        assert!(!is_nonnegative(&parse("x"), &positive));
        assert!(!is_nonnegative(&parse("r - 1"), &positive));
    }

    #[test]
    fn test_simplify_is_idempotent() {
        for source in ["(x + 1)^3 / (y - 2)", "sqrt(x*y^3)", "cos(2*t)*sin(t)^2"] {
            let once = simplified(source);
            let twice = simplify(&once, &Assumptions::default());
            assert_eq!(once, twice, "{source}");
        }
    }
}
