//! Symbolic differential geometry on manifolds with several charts and frames.
//!
//! This crate models smooth manifolds as explicit registries of subsets, coordinate
//! charts and vector frames. Scalar and tensor fields keep one representation per
//! chart or per frame and derive the missing ones on request through registered
//! coordinate changes and changes of basis. Expressions are parsed with the
//! [evalexpr](https://github.com/ISibboI/evalexpr) crate and handled symbolically.
//!
//! # Features
//!
//! - Charts with coordinate ranges, transition maps and derived inverses
//! - Shortest-path composition of transitions, memoised per manifold
//! - Sparse components with symmetric and antisymmetric slot groups
//! - Tensor arithmetic, contraction and (anti)symmetrization
//! - Differentiable maps with pushforward and pullback
//!
//! # Example
//!
//! ```rust
//! use sym_manifolds::prelude::*;
//!
//! let mut plane = Manifold::new(2, "R2");
//! let root = plane.root();
//! let polar = plane.chart(root, "P", "r:positive t:(0,2*pi)").unwrap();
//! let cart = plane.chart(root, "X", "x y").unwrap();
//! plane.add_transition(polar, cart, &["r*cos(t)", "r*sin(t)"]).unwrap();
//!
//! // x^2 + y^2, known in Cartesian coordinates only
//! let f = plane
//!     .scalar_field_from(root, Some("f"), cart, Expr::parse("x^2 + y^2").unwrap())
//!     .unwrap();
//! // the transition is applied on request
//! let in_polar = f.derive_expr(&plane, polar).unwrap();
//! assert!(in_polar.equals(&Expr::parse("r^2").unwrap()));
//! ```

pub mod prelude {
    pub use crate::components::{Components, Slot, Variance};
    pub use crate::config::GeometryConfig;
    pub use crate::errors::{GeometryError, Result};
    pub use crate::expr::Expr;
    pub use crate::manifold::{ChartId, FrameId, Manifold, SubsetId};
    pub use crate::mapping::DiffMapping;
    pub use crate::matrix::SymMatrix;
    pub use crate::point::Point;
    pub use crate::scalar::ScalarField;
    pub use crate::submanifold::Submanifold;
    pub use crate::symmetry::{Symmetry, SymmetryKind};
    pub use crate::tensor::TensorField;
}

/// Canonical polynomial form used to simplify and compare expressions
pub mod canon;
/// Components of tensors in a fixed frame
pub mod components;
/// Tunables of the transition engine
pub mod config;
/// Conversion from parsed expressions to internal AST
pub mod convert;
/// Error types for the various failure modes
pub mod errors;
/// Expression tree representation and symbolic differentiation
pub mod expr;
/// Transition graphs between charts and between frames
pub mod graph;
/// Manifolds, subsets, charts and frames
pub mod manifold;
/// Differentiable maps between manifolds
pub mod mapping;
/// Symbolic square matrices
pub mod matrix;
/// Points given by coordinates
pub mod point;
/// Per-chart and per-frame representations of fields
pub mod repr;
/// Scalar fields
pub mod scalar;
/// Embedded submanifolds
pub mod submanifold;
/// Index symmetries
pub mod symmetry;
/// Tensor fields
pub mod tensor;
