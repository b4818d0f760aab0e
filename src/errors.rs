//! Error types for the sym-manifolds crate.
//!
//! This module defines the failure modes of expression parsing and of the
//! geometric machinery built on top of it. The main error types are:
//!
//! - `ConvertError`: Errors during conversion from an evalexpr tree to `Expr`
//! - `GeometryError`: Errors raised by charts, frames, components and fields
//!
//! Every error is reported synchronously; none of them leaves the object that
//! raised it in a partially mutated state.

use evalexpr::{DefaultNumericTypes, EvalexprError};
use thiserror::Error;

/// Errors that can occur during conversion from evalexpr AST to our internal AST representation.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Error when an exponent is not a numeric constant
    #[error("Could not convert exponent in Exp operator: {0}")]
    ExpOperator(String),
    /// Error when encountering an operator that is not supported by our implementation
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),
    /// Error when encountering a function that is not supported by our implementation
    #[error("Unsupported function: {0}")]
    UnsupportedFunction(String),
    /// Error when the root node does not have exactly one child
    #[error("Expected single child for root node: {0}")]
    RootNode(String),
    /// Error when a constant value is not numeric
    #[error("Expected numeric constant: {0}")]
    ConstOperator(String),
    /// Error when an operator node has the wrong number of operands
    #[error("Wrong number of operands: {0}")]
    Arity(String),
}

/// Errors raised by the geometric layer.
///
/// The first group mirrors the taxonomy of the components and field engine;
/// the second group covers lookup and validation failures.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// A non-zero value was written to an index tuple that repeats an index
    /// inside an antisymmetric slot group.
    #[error("index {index:?} is degenerate for an antisymmetric slot group")]
    DegenerateIndex { index: Vec<usize> },
    /// Two explicit writes to symmetry-equivalent index tuples disagree.
    #[error("symmetry violation at {index:?}: {existing} was set through {origin:?}, got {requested}")]
    SymmetryViolation {
        index: Vec<usize>,
        origin: Vec<usize>,
        existing: String,
        requested: String,
    },
    /// Rank, tensor type, slot or frame mismatch between operands.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// No frame path connects an existing representation to the requested frame.
    #[error("no common frame: {0}")]
    NoCommonFrame(String),
    /// No chart path connects an existing expression to the requested chart.
    #[error("no common chart: {0}")]
    NoCommonChart(String),
    /// A reverse transition or frame change could not be derived.
    #[error("non-invertible transition: {0}")]
    NonInvertibleTransition(String),
    /// The operands live on unrelated subsets.
    #[error("domain mismatch: {0}")]
    DomainMismatch(String),
    /// An index lies outside the index range of its slot.
    #[error("index {index:?} out of range for slots {ranges:?}")]
    IndexOutOfRange {
        index: Vec<usize>,
        ranges: Vec<(usize, usize)>,
    },
    /// A symmetry declaration is malformed.
    #[error("invalid symmetry: {0}")]
    InvalidSymmetry(String),
    /// Wrong number of coordinates, functions or matrix entries.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// The chart id is not registered on this manifold.
    #[error("unknown chart: {0}")]
    UnknownChart(String),
    /// The frame id is not registered on this manifold.
    #[error("unknown frame: {0}")]
    UnknownFrame(String),
    /// The subset id is not registered on this manifold.
    #[error("unknown subset: {0}")]
    UnknownSubset(String),
    /// A coordinate declaration could not be understood.
    #[error("invalid coordinate declaration: {0}")]
    InvalidCoordinate(String),
    /// An explicit consistency check found representations that disagree.
    #[error("inconsistent representations: {0}")]
    Inconsistent(String),
    /// Error when parsing an expression string with evalexpr
    #[error("Failed to build Evalexpr AST")]
    BuildEvalexprError(#[from] EvalexprError<DefaultNumericTypes>),
    /// Error when converting from the evalexpr AST to `Expr`
    #[error("Failed to build expression")]
    BuildExprError(#[from] ConvertError),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GeometryError>;
