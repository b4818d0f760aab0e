//! Symbolic inversion of coordinate changes.
//!
//! Two families of maps are inverted:
//!  1. decoupled maps, where every target coordinate depends on exactly one source
//!     coordinate; each component is inverted by peeling invertible operations off
//!     the expression tree.
//!  2. affine maps `y = A x + b` with constant `A` and `b`, inverted through `A^-1`.
//!
//! Anything else (e.g. polar coordinates) is reported as not invertible. Callers
//! verify candidates by composition before trusting them.

use std::collections::HashMap;

use crate::canon::{self, Assumptions};
use crate::expr::Expr;
use crate::matrix::SymMatrix;

/// Inverts `target_i = functions_i(source)`.
///
/// # Returns
/// The source coordinates as expressions in the target coordinates, in source order,
/// or `None` if the map is outside the supported families.
pub(super) fn invert_map(
    source: &[String],
    target: &[String],
    functions: &[Expr],
    assumptions: &Assumptions,
) -> Option<Vec<Expr>> {
    if source.len() != target.len() || functions.len() != target.len() {
        return None;
    }
    invert_decoupled(source, target, functions, assumptions)
        .or_else(|| invert_affine(source, target, functions))
}

fn invert_decoupled(
    source: &[String],
    target: &[String],
    functions: &[Expr],
    assumptions: &Assumptions,
) -> Option<Vec<Expr>> {
    let mut inverse: Vec<Option<Expr>> = vec![None; source.len()];
    for (function, y) in functions.iter().zip(target) {
        let mut dependencies = source.iter().enumerate().filter(|(_, x)| function.depends_on(x));
        let (k, x) = dependencies.next()?;
        if dependencies.next().is_some() || inverse[k].is_some() {
            return None;
        }
        inverse[k] = Some(peel(function, x, Expr::var(y.clone()), assumptions)?);
    }
    inverse.into_iter().collect()
}

/// Solves `expr = rhs` for `var`, where `var` occurs in exactly one branch of each node.
fn peel(expr: &Expr, var: &str, rhs: Expr, assumptions: &Assumptions) -> Option<Expr> {
    let depends = |e: &Expr| e.depends_on(var);
    match expr {
        Expr::Var(name) if name == var => Some(rhs),
        Expr::Add(a, b) => match (depends(a), depends(b)) {
            (true, false) => peel(a, var, rhs - b.as_ref(), assumptions),
            (false, true) => peel(b, var, rhs - a.as_ref(), assumptions),
            _ => None,
        },
        Expr::Sub(a, b) => match (depends(a), depends(b)) {
            (true, false) => peel(a, var, rhs + b.as_ref(), assumptions),
            (false, true) => peel(b, var, a.as_ref() - rhs, assumptions),
            _ => None,
        },
        Expr::Mul(a, b) => match (depends(a), depends(b)) {
            (true, false) if !b.is_zero() => peel(a, var, rhs / b.as_ref(), assumptions),
            (false, true) if !a.is_zero() => peel(b, var, rhs / a.as_ref(), assumptions),
            _ => None,
        },
        Expr::Div(a, b) => match (depends(a), depends(b)) {
            (true, false) => peel(a, var, rhs * b.as_ref(), assumptions),
            (false, true) if !a.is_zero() => peel(b, var, a.as_ref() / rhs, assumptions),
            _ => None,
        },
        Expr::Neg(a) => peel(a, var, -rhs, assumptions),
        Expr::Pow(base, exp) => {
            let root = match *exp {
                0 => return None,
                1 => rhs,
                -1 => Expr::one() / rhs,
                // even roots only undo the power on a non-negative base
                n if n % 2 == 0 && !canon::is_nonnegative(base, assumptions) => return None,
                2 => rhs.sqrt(),
                n => Expr::PowFloat(Box::new(rhs), 1.0 / n as f64),
            };
            peel(base, var, root, assumptions)
        }
        Expr::PowFloat(base, exp) => {
            if *exp == 0.0 || !canon::is_nonnegative(base, assumptions) {
                return None;
            }
            let inverse_exp = 1.0 / exp;
            let root = if inverse_exp.fract() == 0.0 {
                rhs.pow(inverse_exp as i64)
            } else {
                Expr::PowFloat(Box::new(rhs), inverse_exp)
            };
            peel(base, var, root, assumptions)
        }
        Expr::Sqrt(a) => peel(a, var, rhs.pow(2), assumptions),
        Expr::Exp(a) => peel(a, var, rhs.ln(), assumptions),
        Expr::Ln(a) => peel(a, var, rhs.exp(), assumptions),
        _ => None,
    }
}

fn invert_affine(source: &[String], target: &[String], functions: &[Expr]) -> Option<Vec<Expr>> {
    let origin: HashMap<String, Expr> = source
        .iter()
        .map(|x| (x.clone(), Expr::zero()))
        .collect();
    let mut rows = Vec::with_capacity(functions.len());
    let mut offsets = Vec::with_capacity(functions.len());
    for function in functions {
        let row = source
            .iter()
            .map(|x| {
                let coefficient = function.diff(x);
                coefficient.as_const().map(Expr::Const)
            })
            .collect::<Option<Vec<_>>>()?;
        let offset = function.substitute(&origin).simplify().as_const()?;
        rows.push(row);
        offsets.push(offset);
    }
    let linear = SymMatrix::from_rows(rows).ok()?;
    let inverse = linear.inverse(&Assumptions::default()).ok()?;
    let shifted: Vec<Expr> = target
        .iter()
        .zip(&offsets)
        .map(|(y, b)| Expr::var(y.clone()) - Expr::Const(*b))
        .collect();
    inverse.apply(&shifted, &Assumptions::default()).ok()
}
