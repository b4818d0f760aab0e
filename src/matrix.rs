//! Square matrices of symbolic expressions.
//!
//! Used for change-of-frame matrices, Jacobians of transition maps and the
//! inversion of affine coordinate changes. Entries are stored in row-major order:
//! entry `(i, j)` lives at `i * dim + j`.

use std::collections::HashMap;
use std::fmt;

use itertools::Itertools;

use crate::canon::Assumptions;
use crate::errors::{GeometryError, Result};
use crate::expr::Expr;

#[derive(Debug, Clone, PartialEq)]
pub struct SymMatrix {
    dim: usize,
    entries: Vec<Expr>,
}

impl SymMatrix {
    /// The `dim x dim` identity matrix.
    pub fn identity(dim: usize) -> Self {
        let entries = (0..dim)
            .cartesian_product(0..dim)
            .map(|(i, j)| if i == j { Expr::one() } else { Expr::zero() })
            .collect();
        Self { dim, entries }
    }

    /// Builds a matrix from its rows.
    ///
    /// # Arguments
    /// * `rows` - The rows of the matrix; every row must have as many entries as there are rows
    ///
    /// # Returns
    /// * `Result<SymMatrix>` - The matrix, or `DimensionMismatch` for a non-square input
    pub fn from_rows(rows: Vec<Vec<Expr>>) -> Result<Self> {
        let dim = rows.len();
        let mut entries = Vec::with_capacity(dim * dim);
        for row in rows {
            if row.len() != dim {
                return Err(GeometryError::DimensionMismatch {
                    expected: dim,
                    got: row.len(),
                });
            }
            entries.extend(row);
        }
        Ok(Self { dim, entries })
    }

    /// Parses every entry with [`Expr::parse`].
    pub fn parse_rows(rows: &[&[&str]]) -> Result<Self> {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|s| Expr::parse(s)).collect::<Result<Vec<_>>>())
            .collect::<Result<Vec<_>>>()?;
        Self::from_rows(rows)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn get(&self, i: usize, j: usize) -> &Expr {
        &self.entries[i * self.dim + j]
    }

    pub fn rows(&self) -> Vec<Vec<Expr>> {
        self.entries
            .chunks(self.dim.max(1))
            .map(|row| row.to_vec())
            .collect()
    }

    pub fn transpose(&self) -> Self {
        let entries = (0..self.dim)
            .cartesian_product(0..self.dim)
            .map(|(i, j)| self.get(j, i).clone())
            .collect();
        Self {
            dim: self.dim,
            entries,
        }
    }

    /// Matrix product `self * other`, simplified entrywise.
    pub fn mul(&self, other: &SymMatrix, assumptions: &Assumptions) -> Result<Self> {
        if self.dim != other.dim {
            return Err(GeometryError::DimensionMismatch {
                expected: self.dim,
                got: other.dim,
            });
        }
        let entries = (0..self.dim)
            .cartesian_product(0..self.dim)
            .map(|(i, j)| {
                let sum = (0..self.dim)
                    .map(|k| self.get(i, k) * other.get(k, j))
                    .fold(Expr::zero(), |acc, term| acc + term);
                sum.simplify_with(assumptions)
            })
            .collect();
        Ok(Self {
            dim: self.dim,
            entries,
        })
    }

    /// Matrix-vector product `self * v`.
    pub fn apply(&self, vector: &[Expr], assumptions: &Assumptions) -> Result<Vec<Expr>> {
        if vector.len() != self.dim {
            return Err(GeometryError::DimensionMismatch {
                expected: self.dim,
                got: vector.len(),
            });
        }
        Ok((0..self.dim)
            .map(|i| {
                vector
                    .iter()
                    .enumerate()
                    .map(|(k, v)| self.get(i, k) * v)
                    .fold(Expr::zero(), |acc, term| acc + term)
                    .simplify_with(assumptions)
            })
            .collect())
    }

    /// Determinant by cofactor expansion along the first row.
    pub fn determinant(&self) -> Expr {
        match self.dim {
            0 => Expr::one(),
            1 => self.get(0, 0).clone(),
            2 => self.get(0, 0) * self.get(1, 1) - self.get(0, 1) * self.get(1, 0),
            _ => (0..self.dim)
                .filter(|j| !matches!(self.get(0, *j), Expr::Const(c) if *c == 0.0))
                .map(|j| {
                    let term = self.get(0, j) * self.minor(0, j).determinant();
                    if j % 2 == 0 {
                        term
                    } else {
                        -term
                    }
                })
                .fold(Expr::zero(), |acc, term| acc + term),
        }
    }

    fn minor(&self, row: usize, col: usize) -> SymMatrix {
        let entries = (0..self.dim)
            .filter(|i| *i != row)
            .cartesian_product((0..self.dim).filter(|j| *j != col).collect::<Vec<_>>())
            .map(|(i, j)| self.get(i, j).clone())
            .collect();
        SymMatrix {
            dim: self.dim - 1,
            entries,
        }
    }

    /// Inverse through the adjugate formula.
    ///
    /// Fails with `NonInvertibleTransition` when the determinant simplifies to zero.
    pub fn inverse(&self, assumptions: &Assumptions) -> Result<Self> {
        let det = self.determinant().simplify_with(assumptions);
        if det.is_zero() {
            return Err(GeometryError::NonInvertibleTransition(format!(
                "singular matrix {self}"
            )));
        }
        if self.dim == 1 {
            return Ok(Self {
                dim: 1,
                entries: vec![(Expr::one() / &det).simplify_with(assumptions)],
            });
        }
        let entries = (0..self.dim)
            .cartesian_product(0..self.dim)
            .map(|(i, j)| {
                // inverse(i, j) = cofactor(j, i) / det
                let cofactor = self.minor(j, i).determinant();
                let signed = if (i + j) % 2 == 0 { cofactor } else { -cofactor };
                (signed / &det).simplify_with(assumptions)
            })
            .collect();
        Ok(Self {
            dim: self.dim,
            entries,
        })
    }

    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(&Expr) -> Expr,
    {
        Self {
            dim: self.dim,
            entries: self.entries.iter().map(f).collect(),
        }
    }

    pub fn substitute(&self, bindings: &HashMap<String, Expr>) -> Self {
        self.map(|e| e.substitute(bindings))
    }

    pub fn simplify_with(&self, assumptions: &Assumptions) -> Self {
        self.map(|e| e.simplify_with(assumptions))
    }

    /// Entrywise equality up to simplification.
    pub fn equals_with(&self, other: &SymMatrix, assumptions: &Assumptions) -> bool {
        self.dim == other.dim
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|(a, b)| a.equals_with(b, assumptions))
    }

    pub fn is_identity(&self, assumptions: &Assumptions) -> bool {
        self.equals_with(&Self::identity(self.dim), assumptions)
    }

    pub fn free_symbols(&self) -> std::collections::BTreeSet<String> {
        self.entries.iter().flat_map(|e| e.free_symbols()).collect()
    }
}

impl fmt::Display for SymMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self
            .rows()
            .iter()
            .map(|row| format!("[{}]", row.iter().join(", ")))
            .join(", ");
        write!(f, "[{rows}]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn none() -> Assumptions {
        Assumptions::default()
    }

    #[test]
    fn test_identity_and_transpose() {
        let m = SymMatrix::parse_rows(&[&["a", "b"], &["c", "d"]]).unwrap();
        let t = m.transpose();
        assert_eq!(t.get(0, 1), &Expr::var("c"));
        assert!(SymMatrix::identity(3).is_identity(&none()));
        assert!(!m.is_identity(&none()));
    }

    #[test]
    fn test_non_square_rejected() {
        let rows = vec![vec![Expr::one(), Expr::zero()], vec![Expr::one()]];
        assert!(matches!(
            SymMatrix::from_rows(rows),
            Err(GeometryError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_determinant() {
        let m = SymMatrix::parse_rows(&[&["1", "2", "0"], &["0", "1", "0"], &["3", "0", "2"]])
            .unwrap();
        assert!(m.determinant().equals(&Expr::Const(2.0)));
        let rotation =
            SymMatrix::parse_rows(&[&["cos(t)", "-sin(t)"], &["sin(t)", "cos(t)"]]).unwrap();
        assert!(rotation.determinant().equals(&Expr::one()));
    }

    #[test]
    fn test_inverse() {
        let m = SymMatrix::parse_rows(&[&["1", "x"], &["0", "2"]]).unwrap();
        let inv = m.inverse(&none()).unwrap();
        assert!(m.mul(&inv, &none()).unwrap().is_identity(&none()));
        assert!(inv.get(0, 1).equals(&Expr::parse("-x/2").unwrap()));
    }

    #[test]
    fn test_polar_jacobian_inverse() {
        let positive = Assumptions::new().with_positive("r");
        let jacobian =
            SymMatrix::parse_rows(&[&["cos(t)", "-r*sin(t)"], &["sin(t)", "r*cos(t)"]]).unwrap();
        let inv = jacobian.inverse(&positive).unwrap();
        assert!(jacobian.mul(&inv, &positive).unwrap().is_identity(&positive));
        assert!(inv.get(1, 0).equals(&Expr::parse("-sin(t)/r").unwrap()));
    }

    #[test]
    fn test_singular_matrix() {
        let m = SymMatrix::parse_rows(&[&["x", "2*x"], &["1", "2"]]).unwrap();
        assert!(matches!(
            m.inverse(&none()),
            Err(GeometryError::NonInvertibleTransition(_))
        ));
    }

    #[test]
    fn test_apply() {
        let m = SymMatrix::parse_rows(&[&["0", "-1"], &["1", "0"]]).unwrap();
        let v = m.apply(&[Expr::one(), Expr::zero()], &none()).unwrap();
        assert_eq!(v, vec![Expr::zero(), Expr::one()]);
    }
}
