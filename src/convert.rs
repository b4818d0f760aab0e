//! Conversion module for transforming evalexpr AST nodes into our internal expression representation.
//!
//! Coordinate functions, transition maps and field expressions are usually written by the
//! user as strings. This module maps the operator tree produced by the evalexpr parser
//! onto [`Expr`]: every identifier becomes a symbol, numeric literals become constants and
//! a small set of function names is recognised.
//!
//! The main entry point is the `build_ast` function which recursively traverses the
//! evalexpr AST and builds up our expression tree.

use crate::{errors::ConvertError, expr::Expr};
use evalexpr::{Node, Operator};

/// Converts an evalexpr AST node into our internal expression representation.
///
/// # Arguments
/// * `node` - The evalexpr AST node to convert
///
/// # Returns
/// * `Result<Expr, ConvertError>` - The converted expression or an error if conversion fails
///
/// # Examples of supported operations:
/// * Basic arithmetic: +, -, *, /
/// * Variables: x, th, r2, etc.
/// * Constants: integer and floating point numbers
/// * Functions: abs(), sqrt(), exp(), ln()/log(), sin(), cos()
/// * Exponentiation: x^n where n is a numeric constant
pub fn build_ast(node: &Node) -> Result<Expr, ConvertError> {
    match node.operator() {
        // Addition operator - combines multiple children into a series of binary Add expressions
        Operator::Add => fold_children(node, Expr::Add),
        // Multiplication operator - combines multiple children into a series of binary Mul expressions
        Operator::Mul => fold_children(node, Expr::Mul),
        Operator::Div => {
            let (left, right) = binary_children(node)?;
            Ok(Expr::Div(Box::new(left), Box::new(right)))
        }
        Operator::Sub => {
            let (left, right) = binary_children(node)?;
            Ok(Expr::Sub(Box::new(left), Box::new(right)))
        }
        Operator::Const { value } => match value {
            evalexpr::Value::Float(f) => Ok(Expr::Const(*f)),
            evalexpr::Value::Int(i) => Ok(Expr::Const(*i as f64)),
            _ => Err(ConvertError::ConstOperator(format!("{:?}", value))),
        },
        Operator::VariableIdentifierRead { identifier } => Ok(Expr::Var(identifier.to_string())),
        Operator::Neg => {
            let child = single_child(node)?;
            Ok(Expr::Neg(Box::new(build_ast(child)?)))
        }
        Operator::FunctionIdentifier { identifier } => {
            let argument = Box::new(build_ast(single_child(node)?)?);
            match identifier.as_str() {
                "abs" => Ok(Expr::Abs(argument)),
                "ln" | "log" => Ok(Expr::Ln(argument)),
                "sqrt" => Ok(Expr::Sqrt(argument)),
                "exp" => Ok(Expr::Exp(argument)),
                "sin" => Ok(Expr::Sin(argument)),
                "cos" => Ok(Expr::Cos(argument)),
                _ => Err(ConvertError::UnsupportedFunction(identifier.to_string())),
            }
        }
        // Root node - should have exactly one child
        Operator::RootNode => {
            let children = node.children();
            if children.len() == 1 {
                build_ast(&children[0])
            } else {
                Err(ConvertError::RootNode(format!("{:?}", children)))
            }
        }
        // Exponentiation - the exponent must be a numeric constant, possibly negated
        Operator::Exp => {
            let children = node.children();
            if children.len() != 2 {
                return Err(ConvertError::Arity(format!(
                    "expected 2 children for Exp operator, got {}",
                    children.len()
                )));
            }
            let base = Box::new(build_ast(&children[0])?);
            let exponent = build_ast(&children[1])?;
            match exponent.simplify().as_const() {
                Some(exp) if exp.fract() == 0.0 => Ok(Expr::Pow(base, exp as i64)),
                Some(exp) => Ok(Expr::PowFloat(base, exp)),
                None => Err(ConvertError::ExpOperator(exponent.to_string())),
            }
        }
        // Any other operator is unsupported
        _ => Err(ConvertError::UnsupportedOperator(format!(
            "{:?}",
            node.operator()
        ))),
    }
}

fn fold_children(
    node: &Node,
    combine: fn(Box<Expr>, Box<Expr>) -> Expr,
) -> Result<Expr, ConvertError> {
    let children = node.children();
    let first = children
        .first()
        .ok_or_else(|| ConvertError::Arity(format!("{:?} without operands", node.operator())))?;
    children
        .iter()
        .skip(1)
        .try_fold(build_ast(first)?, |acc, child| {
            Ok(combine(Box::new(acc), Box::new(build_ast(child)?)))
        })
}

fn binary_children(node: &Node) -> Result<(Expr, Expr), ConvertError> {
    match node.children() {
        [left, right] => Ok((build_ast(left)?, build_ast(right)?)),
        children => Err(ConvertError::Arity(format!(
            "expected 2 children for {:?}, got {}",
            node.operator(),
            children.len()
        ))),
    }
}

fn single_child(node: &Node) -> Result<&Node, ConvertError> {
    match node.children() {
        [child] => Ok(child),
        children => Err(ConvertError::Arity(format!(
            "expected 1 child for {:?}, got {}",
            node.operator(),
            children.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalexpr::build_operator_tree;

    fn convert(source: &str) -> Result<Expr, ConvertError> {
        let node = build_operator_tree(source).unwrap();
        build_ast(&node)
    }

    #[test]
    fn test_nested_functions() {
        let expr = convert("sin(x) * exp(-y)").unwrap();
        assert_eq!(
            expr,
            Expr::Mul(
                Box::new(Expr::Sin(Box::new(Expr::var("x")))),
                Box::new(Expr::Exp(Box::new(Expr::Neg(Box::new(Expr::var("y")))))),
            )
        );
    }

    #[test]
    fn test_float_exponent() {
        assert_eq!(
            convert("r^0.5").unwrap(),
            Expr::PowFloat(Box::new(Expr::var("r")), 0.5)
        );
    }

    #[test]
    fn test_constant_exponent_expressions() {
        assert_eq!(
            convert("y^(1/3)").unwrap(),
            Expr::PowFloat(Box::new(Expr::var("y")), 1.0 / 3.0)
        );
        assert_eq!(
            convert("x^-2").unwrap(),
            Expr::Pow(Box::new(Expr::var("x")), -2)
        );
    }

    #[test]
    fn test_symbolic_exponent_rejected() {
        assert!(matches!(
            convert("x^y"),
            Err(ConvertError::ExpOperator(_))
        ));
    }

    #[test]
    fn test_unsupported_function() {
        assert!(matches!(
            convert("atan(x)"),
            Err(ConvertError::UnsupportedFunction(_))
        ));
    }
}
