//! Expression module for representing scalar symbolic expressions.
//!
//! This module defines the expression tree consumed by every geometric object in the
//! crate: coordinate functions of charts, entries of change-of-frame matrices, values of
//! scalar fields and components of tensor fields. The main type is:
//!
//! - `Expr`: An enum representing different kinds of mathematical expressions
//!
//! The expression tree is built recursively using `Box<Expr>` for nested expressions and can be:
//! - Parsed from strings (see [`Expr::parse`])
//! - Symbolically differentiated to compute derivatives
//! - Rewritten by substituting expressions for symbols
//! - Simplified into a canonical form, which also decides equality
//!
//! # Expression Tree Structure
//! The expression tree is built recursively with each node being one of:
//! - Leaf nodes: Constants and Variables
//! - Unary operations: Abs, Neg, Exp, Ln, Sqrt, Sin, Cos
//! - Binary operations: Add, Sub, Mul, Div
//! - Powers: Pow (integer exponent), PowFloat (real exponent)
//!
//! # Symbolic Differentiation
//! The derivative method implements symbolic differentiation by recursively applying
//! calculus rules like:
//! - Product rule
//! - Quotient rule
//! - Chain rule
//! - Power rule
//! - Special function derivatives (exp, ln, sqrt, sin, cos)
//!
//! # Simplification and equality
//! `simplify` delegates to the canonical normal form of [`crate::canon`]. Two expressions
//! are considered equal when their difference normalises to zero.

use std::collections::{BTreeSet, HashMap};
use std::ops;

use evalexpr::build_operator_tree;

use crate::canon::{self, Assumptions};
use crate::convert::build_ast;
use crate::errors::Result;

/// An expression tree node representing mathematical operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant floating point value
    Const(f64),
    /// A named symbol, typically a coordinate
    Var(String),
    /// Addition of two expressions
    Add(Box<Expr>, Box<Expr>),
    /// Multiplication of two expressions
    Mul(Box<Expr>, Box<Expr>),
    /// Subtraction of two expressions
    Sub(Box<Expr>, Box<Expr>),
    /// Division of two expressions
    Div(Box<Expr>, Box<Expr>),
    /// Absolute value of an expression
    Abs(Box<Expr>),
    /// Exponentiation of an expression by an integer constant
    Pow(Box<Expr>, i64),
    /// Exponentiation of an expression by a floating point constant
    PowFloat(Box<Expr>, f64),
    /// Exponential function of an expression
    Exp(Box<Expr>),
    /// Natural logarithm of an expression
    Ln(Box<Expr>),
    /// Square root of an expression
    Sqrt(Box<Expr>),
    /// Sine of an expression (argument in radians)
    Sin(Box<Expr>),
    /// Cosine of an expression (argument in radians)
    Cos(Box<Expr>),
    /// Negation of an expression
    Neg(Box<Expr>),
}

impl Expr {
    /// Creates a symbol.
    pub fn var(name: impl Into<String>) -> Expr {
        Expr::Var(name.into())
    }

    /// Creates a constant.
    pub fn constant(value: f64) -> Expr {
        Expr::Const(value)
    }

    /// The additive identity.
    pub fn zero() -> Expr {
        Expr::Const(0.0)
    }

    /// The multiplicative identity.
    pub fn one() -> Expr {
        Expr::Const(1.0)
    }

    /// Parses an expression such as `"x^2 + sin(y)"`.
    ///
    /// Every identifier becomes a symbol; `abs`, `sqrt`, `exp`, `ln`/`log`, `sin`
    /// and `cos` are recognised as functions.
    ///
    /// # Example
    /// ```
    /// # use sym_manifolds::expr::Expr;
    /// let e = Expr::parse("x^2 + 2*x").unwrap();
    /// assert!(e.diff("x").equals(&Expr::parse("2*x + 2").unwrap()));
    /// ```
    pub fn parse(source: &str) -> Result<Expr> {
        let node = build_operator_tree(source)?;
        Ok(build_ast(&node)?)
    }

    /// Returns the value of a constant node.
    pub fn as_const(&self) -> Option<f64> {
        match self {
            Expr::Const(value) => Some(*value),
            Expr::Neg(inner) => inner.as_const().map(|value| -value),
            _ => None,
        }
    }

    /// Returns the names of all symbols the expression depends on.
    pub fn free_symbols(&self) -> BTreeSet<String> {
        let mut symbols = BTreeSet::new();
        self.collect_symbols(&mut symbols);
        symbols
    }

    fn collect_symbols(&self, symbols: &mut BTreeSet<String>) {
        match self {
            Expr::Const(_) => {}
            Expr::Var(name) => {
                symbols.insert(name.clone());
            }
            Expr::Add(left, right)
            | Expr::Mul(left, right)
            | Expr::Sub(left, right)
            | Expr::Div(left, right) => {
                left.collect_symbols(symbols);
                right.collect_symbols(symbols);
            }
            Expr::Abs(expr)
            | Expr::Pow(expr, _)
            | Expr::PowFloat(expr, _)
            | Expr::Exp(expr)
            | Expr::Ln(expr)
            | Expr::Sqrt(expr)
            | Expr::Sin(expr)
            | Expr::Cos(expr)
            | Expr::Neg(expr) => expr.collect_symbols(symbols),
        }
    }

    /// Returns true if `name` occurs in the expression.
    pub fn depends_on(&self, name: &str) -> bool {
        match self {
            Expr::Const(_) => false,
            Expr::Var(var) => var == name,
            Expr::Add(left, right)
            | Expr::Mul(left, right)
            | Expr::Sub(left, right)
            | Expr::Div(left, right) => left.depends_on(name) || right.depends_on(name),
            Expr::Abs(expr)
            | Expr::Pow(expr, _)
            | Expr::PowFloat(expr, _)
            | Expr::Exp(expr)
            | Expr::Ln(expr)
            | Expr::Sqrt(expr)
            | Expr::Sin(expr)
            | Expr::Cos(expr)
            | Expr::Neg(expr) => expr.depends_on(name),
        }
    }

    /// Computes the symbolic derivative of this expression with respect to a variable.
    ///
    /// Recursively applies the rules of differentiation to build a new expression tree
    /// representing the derivative. The rules implemented are:
    /// - d/dx(c) = 0 for constants
    /// - d/dx(x) = 1 for the variable we're differentiating with respect to
    /// - d/dx(y) = 0 for other variables
    /// - Sum rule: d/dx(f + g) = df/dx + dg/dx
    /// - Product rule: d/dx(f * g) = f * dg/dx + g * df/dx
    /// - Quotient rule: d/dx(f/g) = (g * df/dx - f * dg/dx) / g^2
    /// - Chain rule for abs: d/dx|f| = f/|f| * df/dx
    /// - Power rule: d/dx(f^n) = n * f^(n-1) * df/dx
    /// - Chain rule for exp, ln, sqrt, sin and cos
    /// - Negation: d/dx(-f) = -(df/dx)
    ///
    /// The result is not simplified; see [`Expr::diff`].
    pub fn derivative(&self, with_respect_to: &str) -> Expr {
        match self {
            Expr::Const(_) => Expr::Const(0.0),

            Expr::Var(name) => {
                if name == with_respect_to {
                    Expr::Const(1.0)
                } else {
                    Expr::Const(0.0)
                }
            }

            // d/dx(f + g) = df/dx + dg/dx
            Expr::Add(left, right) => Expr::Add(
                Box::new(left.derivative(with_respect_to)),
                Box::new(right.derivative(with_respect_to)),
            ),

            // d/dx(f - g) = df/dx - dg/dx
            Expr::Sub(left, right) => Expr::Sub(
                Box::new(left.derivative(with_respect_to)),
                Box::new(right.derivative(with_respect_to)),
            ),

            // d/dx(f * g) = f * dg/dx + g * df/dx
            Expr::Mul(left, right) => Expr::Add(
                Box::new(Expr::Mul(
                    left.clone(),
                    Box::new(right.derivative(with_respect_to)),
                )),
                Box::new(Expr::Mul(
                    right.clone(),
                    Box::new(left.derivative(with_respect_to)),
                )),
            ),

            // d/dx(f/g) = (g * df/dx - f * dg/dx) / g^2
            Expr::Div(left, right) => Expr::Div(
                Box::new(Expr::Sub(
                    Box::new(Expr::Mul(
                        right.clone(),
                        Box::new(left.derivative(with_respect_to)),
                    )),
                    Box::new(Expr::Mul(
                        left.clone(),
                        Box::new(right.derivative(with_respect_to)),
                    )),
                )),
                Box::new(Expr::Pow(right.clone(), 2)),
            ),

            // d/dx|f| = f/|f| * df/dx
            Expr::Abs(expr) => Expr::Mul(
                Box::new(Expr::Div(expr.clone(), Box::new(Expr::Abs(expr.clone())))),
                Box::new(expr.derivative(with_respect_to)),
            ),

            // d/dx(f^n) = n * f^(n-1) * df/dx
            Expr::Pow(base, exp) => Expr::Mul(
                Box::new(Expr::Mul(
                    Box::new(Expr::Const(*exp as f64)),
                    Box::new(Expr::Pow(base.clone(), exp - 1)),
                )),
                Box::new(base.derivative(with_respect_to)),
            ),

            // d/dx(f^c) = c * f^(c-1) * df/dx
            Expr::PowFloat(base, exp) => Expr::Mul(
                Box::new(Expr::Mul(
                    Box::new(Expr::Const(*exp)),
                    Box::new(Expr::PowFloat(base.clone(), exp - 1.0)),
                )),
                Box::new(base.derivative(with_respect_to)),
            ),

            // d/dx(e^f) = e^f * df/dx
            Expr::Exp(expr) => Expr::Mul(
                Box::new(Expr::Exp(expr.clone())),
                Box::new(expr.derivative(with_respect_to)),
            ),

            // d/dx(ln(f)) = 1/f * df/dx
            Expr::Ln(expr) => Expr::Mul(
                Box::new(Expr::Div(Box::new(Expr::Const(1.0)), expr.clone())),
                Box::new(expr.derivative(with_respect_to)),
            ),

            // d/dx(sqrt(f)) = 1/(2*sqrt(f)) * df/dx
            Expr::Sqrt(expr) => Expr::Mul(
                Box::new(Expr::Div(
                    Box::new(Expr::Const(1.0)),
                    Box::new(Expr::Mul(
                        Box::new(Expr::Const(2.0)),
                        Box::new(Expr::Sqrt(expr.clone())),
                    )),
                )),
                Box::new(expr.derivative(with_respect_to)),
            ),

            // d/dx(sin(f)) = cos(f) * df/dx
            Expr::Sin(expr) => Expr::Mul(
                Box::new(Expr::Cos(expr.clone())),
                Box::new(expr.derivative(with_respect_to)),
            ),

            // d/dx(cos(f)) = -sin(f) * df/dx
            Expr::Cos(expr) => Expr::Mul(
                Box::new(Expr::Neg(Box::new(Expr::Sin(expr.clone())))),
                Box::new(expr.derivative(with_respect_to)),
            ),

            // d/dx(-f) = -(df/dx)
            Expr::Neg(expr) => Expr::Neg(Box::new(expr.derivative(with_respect_to))),
        }
    }

    /// Partial derivative followed by simplification.
    pub fn diff(&self, with_respect_to: &str) -> Expr {
        self.derivative(with_respect_to).simplify()
    }

    /// Rewrites the expression into its canonical form.
    pub fn simplify(&self) -> Expr {
        canon::simplify(self, &Assumptions::default())
    }

    /// Rewrites the expression into its canonical form, using sign information on symbols.
    pub fn simplify_with(&self, assumptions: &Assumptions) -> Expr {
        canon::simplify(self, assumptions)
    }

    /// Returns true if the expression simplifies to zero.
    pub fn is_zero(&self) -> bool {
        canon::is_zero(self, &Assumptions::default())
    }

    /// Equality up to simplification.
    pub fn equals(&self, other: &Expr) -> bool {
        self.equals_with(other, &Assumptions::default())
    }

    /// Equality up to simplification under the given assumptions.
    pub fn equals_with(&self, other: &Expr, assumptions: &Assumptions) -> bool {
        if self == other {
            return true;
        }
        let difference = Expr::Sub(Box::new(self.clone()), Box::new(other.clone()));
        canon::is_zero(&difference, assumptions)
    }

    /// Rebuilds the node with `f` applied to each direct child.
    fn map_children<F>(&self, mut f: F) -> Expr
    where
        F: FnMut(&Expr) -> Expr,
    {
        match self {
            Expr::Const(_) | Expr::Var(_) => self.clone(),
            Expr::Add(left, right) => Expr::Add(Box::new(f(left)), Box::new(f(right))),
            Expr::Mul(left, right) => Expr::Mul(Box::new(f(left)), Box::new(f(right))),
            Expr::Sub(left, right) => Expr::Sub(Box::new(f(left)), Box::new(f(right))),
            Expr::Div(left, right) => Expr::Div(Box::new(f(left)), Box::new(f(right))),
            Expr::Abs(expr) => Expr::Abs(Box::new(f(expr))),
            Expr::Pow(base, exp) => Expr::Pow(Box::new(f(base)), *exp),
            Expr::PowFloat(base, exp) => Expr::PowFloat(Box::new(f(base)), *exp),
            Expr::Exp(expr) => Expr::Exp(Box::new(f(expr))),
            Expr::Ln(expr) => Expr::Ln(Box::new(f(expr))),
            Expr::Sqrt(expr) => Expr::Sqrt(Box::new(f(expr))),
            Expr::Sin(expr) => Expr::Sin(Box::new(f(expr))),
            Expr::Cos(expr) => Expr::Cos(Box::new(f(expr))),
            Expr::Neg(expr) => Expr::Neg(Box::new(f(expr))),
        }
    }

    /// Inserts an expression by replacing nodes that match a predicate.
    ///
    /// Recursively traverses the expression tree and replaces any nodes that match
    /// the given predicate with the replacement expression.
    pub fn insert<F>(&self, predicate: F, replacement: &Expr) -> Expr
    where
        F: Fn(&Expr) -> bool + Clone,
    {
        if predicate(self) {
            replacement.clone()
        } else {
            self.map_children(|child| child.insert(predicate.clone(), replacement))
        }
    }

    /// Substitutes expressions for symbols, all at once.
    ///
    /// Symbols absent from `bindings` are left untouched. Substitution is
    /// simultaneous: `{x: y, y: x}` swaps the two symbols.
    pub fn substitute(&self, bindings: &HashMap<String, Expr>) -> Expr {
        match self {
            Expr::Var(name) => bindings.get(name).cloned().unwrap_or_else(|| self.clone()),
            _ => self.map_children(|child| child.substitute(bindings)),
        }
    }

    /// Integer power.
    pub fn pow(&self, exp: i64) -> Expr {
        Expr::Pow(Box::new(self.clone()), exp)
    }

    /// Square root.
    pub fn sqrt(&self) -> Expr {
        Expr::Sqrt(Box::new(self.clone()))
    }

    /// Sine.
    pub fn sin(&self) -> Expr {
        Expr::Sin(Box::new(self.clone()))
    }

    /// Cosine.
    pub fn cos(&self) -> Expr {
        Expr::Cos(Box::new(self.clone()))
    }

    /// Exponential.
    pub fn exp(&self) -> Expr {
        Expr::Exp(Box::new(self.clone()))
    }

    /// Natural logarithm.
    pub fn ln(&self) -> Expr {
        Expr::Ln(Box::new(self.clone()))
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Const(value)
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Expr::Const(value as f64)
    }
}

impl From<&Expr> for Expr {
    fn from(value: &Expr) -> Self {
        value.clone()
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl ops::$trait<Expr> for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::$variant(Box::new(self), Box::new(rhs))
            }
        }

        impl ops::$trait<&Expr> for Expr {
            type Output = Expr;

            fn $method(self, rhs: &Expr) -> Expr {
                Expr::$variant(Box::new(self), Box::new(rhs.clone()))
            }
        }

        impl ops::$trait<Expr> for &Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::$variant(Box::new(self.clone()), Box::new(rhs))
            }
        }

        impl ops::$trait<&Expr> for &Expr {
            type Output = Expr;

            fn $method(self, rhs: &Expr) -> Expr {
                Expr::$variant(Box::new(self.clone()), Box::new(rhs.clone()))
            }
        }
    };
}

impl_binary_op!(Add, add, Add);
impl_binary_op!(Sub, sub, Sub);
impl_binary_op!(Mul, mul, Mul);
impl_binary_op!(Div, div, Div);

impl ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

impl ops::Neg for &Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self.clone()))
    }
}

/// Implements string formatting for expressions.
///
/// This implementation converts expressions to their standard mathematical notation:
/// - Constants are formatted as numbers
/// - Variables are formatted as their names
/// - Binary operations (+,-,*,/) are wrapped in parentheses
/// - Functions (exp, ln, sqrt, sin, cos) use function call notation
/// - Absolute value uses |x| notation
/// - Exponents use ^
/// - Negation uses - prefix
impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Const(val) => write!(f, "{val}"),
            Expr::Var(name) => write!(f, "{name}"),
            Expr::Add(left, right) => write!(f, "({left} + {right})"),
            Expr::Mul(left, right) => write!(f, "({left} * {right})"),
            Expr::Sub(left, right) => write!(f, "({left} - {right})"),
            Expr::Div(left, right) => write!(f, "({left} / {right})"),
            Expr::Abs(expr) => write!(f, "|{expr}|"),
            Expr::Pow(base, exp) => write!(f, "({base}^{exp})"),
            Expr::PowFloat(base, exp) => write!(f, "({base}^{exp})"),
            Expr::Exp(expr) => write!(f, "exp({expr})"),
            Expr::Ln(expr) => write!(f, "ln({expr})"),
            Expr::Sqrt(expr) => write!(f, "sqrt({expr})"),
            Expr::Sin(expr) => write!(f, "sin({expr})"),
            Expr::Cos(expr) => write!(f, "cos({expr})"),
            Expr::Neg(expr) => write!(f, "-({expr})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Box<Expr> {
        Box::new(Expr::var(name))
    }

    fn parse(source: &str) -> Expr {
        Expr::parse(source).unwrap()
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            parse("x + 2"),
            Expr::Add(var("x"), Box::new(Expr::Const(2.0)))
        );
        assert_eq!(parse("x^3"), Expr::Pow(var("x"), 3));
        assert_eq!(parse("sqrt(y)"), Expr::Sqrt(var("y")));
        assert_eq!(parse("-th"), Expr::Neg(var("th")));
    }

    #[test]
    fn test_parse_unsupported_function() {
        assert!(Expr::parse("tan(x)").is_err());
    }

    #[test]
    fn test_derivative() {
        // Test constant derivative
        assert_eq!(Expr::Const(5.0).derivative("x"), Expr::Const(0.0));

        // Test variable derivatives (x)' = 1, (y)' = 0
        assert_eq!(var("x").derivative("x"), Expr::Const(1.0));
        assert_eq!(var("y").derivative("x"), Expr::Const(0.0));

        // Test sum rule (u+v)' = u' + v'
        let sum = Expr::Add(var("x"), var("y"));
        assert_eq!(
            sum.derivative("x"),
            Expr::Add(Box::new(Expr::Const(1.0)), Box::new(Expr::Const(0.0)))
        );

        // Test power rule
        let power = Expr::Pow(var("x"), 3);
        assert_eq!(
            power.derivative("x"),
            Expr::Mul(
                Box::new(Expr::Mul(
                    Box::new(Expr::Const(3.0)),
                    Box::new(Expr::Pow(var("x"), 2))
                )),
                Box::new(Expr::Const(1.0))
            )
        );
    }

    #[test]
    fn test_diff_simplifies() {
        assert!(parse("x^2 * y").diff("x").equals(&parse("2*x*y")));
        assert!(parse("sin(x)").diff("x").equals(&parse("cos(x)")));
        assert!(parse("cos(2*x)").diff("x").equals(&parse("-2*sin(2*x)")));
        assert!(parse("sqrt(y)").diff("y").equals(&parse("1/(2*sqrt(y))")));
        assert!(parse("ln(x)").diff("x").equals(&parse("1/x")));
    }

    #[test]
    fn test_substitute() {
        let expr = parse("x + y");
        let bindings = HashMap::from([
            ("x".to_string(), parse("y")),
            ("y".to_string(), parse("x")),
        ]);
        assert_eq!(expr.substitute(&bindings), parse("y + x"));
    }

    #[test]
    fn test_insert() {
        // Create expression: x + y
        let expr = Expr::Add(var("x"), var("y"));

        // Replace all occurrences of 'x' with '2*z'
        let replacement = Expr::Mul(Box::new(Expr::Const(2.0)), var("z"));

        let result = expr.insert(|e| matches!(e, Expr::Var(v) if v == "x"), &replacement);

        // Expected: (2*z) + y
        assert_eq!(
            result,
            Expr::Add(
                Box::new(Expr::Mul(Box::new(Expr::Const(2.0)), var("z"))),
                var("y"),
            )
        );
    }

    #[test]
    fn test_free_symbols() {
        let symbols = parse("x*sin(th) + 3").free_symbols();
        assert_eq!(
            symbols.into_iter().collect::<Vec<_>>(),
            vec!["th".to_string(), "x".to_string()]
        );
        assert!(parse("exp(r)").depends_on("r"));
        assert!(!parse("exp(r)").depends_on("x"));
    }

    #[test]
    fn test_operators() {
        let x = Expr::var("x");
        let y = Expr::var("y");
        let e = &x * &y + &x - &x * &y;
        assert!(e.equals(&x));
        assert!((-&x + &x).is_zero());
        assert!((&x / &x).equals(&Expr::one()));
    }

    #[test]
    fn test_display() {
        // Test basic expressions
        assert_eq!(format!("{}", Expr::Const(5.0)), "5");
        assert_eq!(format!("{}", *var("x")), "x");

        // Test binary operations
        let sum = Expr::Add(var("x"), var("y"));
        assert_eq!(format!("{sum}"), "(x + y)");

        // Test special functions
        let abs = Expr::Abs(var("x"));
        assert_eq!(format!("{abs}"), "|x|");

        // Test complex expression
        let complex = Expr::Div(
            Box::new(Expr::Add(Box::new(Expr::Pow(var("x"), 2)), var("y"))),
            var("z"),
        );
        assert_eq!(format!("{complex}"), "(((x^2) + y) / z)");
    }
}
