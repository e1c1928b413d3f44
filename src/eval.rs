//! Partial evaluation of query expressions.
//!
//! Collapses every maximal sub-tree that does not transitively reference a
//! query source into a single constant, resolving captured values. The
//! evaluation itself is pure; if a candidate sub-tree cannot be evaluated it
//! is kept as-is rather than failing the translation.

use rust_decimal::Decimal;

use crate::expr::{BinaryOp, Expression, MethodCallExpression, UnaryOp, Value};

/// Replace every source-independent sub-tree of `expression` with a constant.
pub fn evaluate_independent_subtrees(expression: Expression) -> Expression {
    partial_eval(expression).0
}

/// Returns the processed expression plus whether it depends on a query source.
fn partial_eval(expression: Expression) -> (Expression, bool) {
    match expression {
        Expression::Constant(_) => (expression, false),
        Expression::Source { .. }
        | Expression::Parameter(_)
        | Expression::Reference(_)
        | Expression::SubQuery(_) => (expression, true),
        Expression::Lambda(mut l) => {
            // A lambda body is evaluated inside, but the lambda itself is
            // always kept: its parameters bind query-source items.
            l.body = partial_eval(l.body).0;
            (Expression::Lambda(l), true)
        }
        Expression::Member { source, member } => {
            let (source, dependent) = partial_eval(*source);
            let node = Expression::Member {
                source: Box::new(source),
                member,
            };
            collapse_if_independent(node, dependent)
        }
        Expression::Unary { op, operand } => {
            let (operand, dependent) = partial_eval(*operand);
            let node = Expression::Unary {
                op,
                operand: Box::new(operand),
            };
            collapse_if_independent(node, dependent)
        }
        Expression::Binary { op, left, right } => {
            let (left, left_dep) = partial_eval(*left);
            let (right, right_dep) = partial_eval(*right);
            let node = Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
            collapse_if_independent(node, left_dep || right_dep)
        }
        Expression::New { members } => {
            let mut dependent = false;
            let members = members
                .into_iter()
                .map(|(name, e)| {
                    let (e, d) = partial_eval(e);
                    dependent |= d;
                    (name, e)
                })
                .collect();
            // Anonymous projections stay structural even when constant; they
            // exist to be taken apart by the model builder.
            (Expression::New { members }, dependent)
        }
        Expression::Call(call) => {
            let (source, mut dependent) = partial_eval(*call.source);
            let arguments: Vec<Expression> = call
                .arguments
                .into_iter()
                .map(|a| {
                    let (a, d) = partial_eval(a);
                    dependent |= d;
                    a
                })
                .collect();
            let node = Expression::Call(MethodCallExpression {
                method: call.method,
                source: Box::new(source),
                arguments,
            });
            collapse_if_independent(node, dependent)
        }
    }
}

fn collapse_if_independent(node: Expression, dependent: bool) -> (Expression, bool) {
    if dependent {
        return (node, true);
    }
    match eval_const(&node) {
        Ok(value) => (Expression::Constant(value), false),
        // Recoverable fallback: keep the original sub-tree unevaluated.
        Err(_) => (node, false),
    }
}

/// Evaluate a source-independent expression to a value.
fn eval_const(expression: &Expression) -> Result<Value, String> {
    match expression {
        Expression::Constant(v) => Ok(v.clone()),
        Expression::Member { source, member } => {
            let source = eval_const(source)?;
            match source {
                Value::Record(fields) => fields
                    .get(member)
                    .cloned()
                    .ok_or_else(|| format!("record has no field '{}'", member)),
                other => Err(format!("cannot take member '{}' of {}", member, other)),
            }
        }
        Expression::Unary { op, operand } => {
            let operand = eval_const(operand)?;
            match (op, operand) {
                (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                (UnaryOp::Neg, Value::Int(n)) => Ok(Value::Int(-n)),
                (UnaryOp::Neg, Value::Float(n)) => Ok(Value::Float(-n)),
                (UnaryOp::Neg, Value::Decimal(d)) => Ok(Value::Decimal(-d)),
                (op, operand) => Err(format!("cannot apply {:?} to {}", op, operand)),
            }
        }
        Expression::Binary { op, left, right } => {
            let left = eval_const(left)?;
            let right = eval_const(right)?;
            eval_binary(*op, left, right)
        }
        Expression::Call(call) => eval_call(call),
        other => Err(format!("'{}' is not a constant expression", other)),
    }
}

fn eval_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, String> {
    use BinaryOp::*;
    match op {
        And | Or => match (left, right) {
            (Value::Bool(l), Value::Bool(r)) => Ok(Value::Bool(if op == And {
                l && r
            } else {
                l || r
            })),
            (l, r) => Err(format!("cannot apply {:?} to {} and {}", op, l, r)),
        },
        Eq => Ok(Value::Bool(values_equal(&left, &right))),
        Ne => Ok(Value::Bool(!values_equal(&left, &right))),
        Gt | Gte | Lt | Lte => {
            let ordering = compare_values(&left, &right)?;
            Ok(Value::Bool(match op {
                Gt => ordering.is_gt(),
                Gte => ordering.is_ge(),
                Lt => ordering.is_lt(),
                _ => ordering.is_le(),
            }))
        }
        Add | Sub | Mul | Div | Rem => eval_arithmetic(op, left, right),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(l), Value::Float(r)) | (Value::Float(r), Value::Int(l)) => *l as f64 == *r,
        (l, r) => l == r,
    }
}

fn compare_values(left: &Value, right: &Value) -> Result<std::cmp::Ordering, String> {
    match (left, right) {
        (Value::Int(l), Value::Int(r)) => Ok(l.cmp(r)),
        (Value::Float(l), Value::Float(r)) => {
            l.partial_cmp(r).ok_or_else(|| "incomparable floats".into())
        }
        (Value::Int(l), Value::Float(r)) => (*l as f64)
            .partial_cmp(r)
            .ok_or_else(|| "incomparable floats".into()),
        (Value::Float(l), Value::Int(r)) => l
            .partial_cmp(&(*r as f64))
            .ok_or_else(|| "incomparable floats".into()),
        (Value::Decimal(l), Value::Decimal(r)) => Ok(l.cmp(r)),
        (Value::String(l), Value::String(r)) => Ok(l.cmp(r)),
        (Value::DateTime(l), Value::DateTime(r)) => Ok(l.cmp(r)),
        (l, r) => Err(format!("cannot compare {} and {}", l, r)),
    }
}

fn eval_arithmetic(op: BinaryOp, left: Value, right: Value) -> Result<Value, String> {
    use BinaryOp::*;
    match (left, right) {
        (Value::Int(l), Value::Int(r)) => match op {
            Add => l.checked_add(r).map(Value::Int),
            Sub => l.checked_sub(r).map(Value::Int),
            Mul => l.checked_mul(r).map(Value::Int),
            Div => l.checked_div(r).map(Value::Int),
            Rem => l.checked_rem(r).map(Value::Int),
            _ => None,
        }
        .ok_or_else(|| "integer arithmetic failed".to_string()),
        (Value::Float(l), Value::Float(r)) => Ok(Value::Float(apply_float(op, l, r))),
        (Value::Int(l), Value::Float(r)) => Ok(Value::Float(apply_float(op, l as f64, r))),
        (Value::Float(l), Value::Int(r)) => Ok(Value::Float(apply_float(op, l, r as f64))),
        (Value::Decimal(l), Value::Decimal(r)) => match op {
            Add => Ok(Value::Decimal(l + r)),
            Sub => Ok(Value::Decimal(l - r)),
            Mul => Ok(Value::Decimal(l * r)),
            Div => {
                if r == Decimal::ZERO {
                    Err("decimal division by zero".into())
                } else {
                    Ok(Value::Decimal(l / r))
                }
            }
            Rem => Ok(Value::Decimal(l % r)),
            _ => Err("unsupported decimal operation".into()),
        },
        (Value::String(l), Value::String(r)) if op == Add => Ok(Value::String(l + &r)),
        (l, r) => Err(format!("cannot apply {:?} to {} and {}", op, l, r)),
    }
}

fn apply_float(op: BinaryOp, l: f64, r: f64) -> f64 {
    match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => l / r,
        BinaryOp::Rem => l % r,
        _ => f64::NAN,
    }
}

/// Pure methods evaluable on constants. Anything else fails the candidate,
/// which keeps the original call in the tree.
fn eval_call(call: &MethodCallExpression) -> Result<Value, String> {
    let source = eval_const(&call.source)?;
    match (call.method.as_str(), &source) {
        ("ToUpper", Value::String(s)) if call.arguments.is_empty() => {
            Ok(Value::String(s.to_uppercase()))
        }
        ("ToLower", Value::String(s)) if call.arguments.is_empty() => {
            Ok(Value::String(s.to_lowercase()))
        }
        ("Trim", Value::String(s)) if call.arguments.is_empty() => {
            Ok(Value::String(s.trim().to_string()))
        }
        ("Length", Value::String(s)) if call.arguments.is_empty() => {
            Ok(Value::Int(s.chars().count() as i64))
        }
        (method, _) => Err(format!("method '{}' is not constant-evaluable", method)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{lambda, param};

    #[test]
    fn test_constant_subtree_is_collapsed() {
        let expr = Expression::from(2).add(Expression::from(3).mul(4));
        assert_eq!(
            evaluate_independent_subtrees(expr),
            Expression::Constant(Value::Int(14))
        );
    }

    #[test]
    fn test_dependent_comparison_keeps_structure_but_folds_operand() {
        let expr = param("x").member("Age").gte(Expression::from(18).add(2));
        let result = evaluate_independent_subtrees(expr);
        let Expression::Binary { op, left, right } = result else {
            panic!("expected binary comparison");
        };
        assert_eq!(op, BinaryOp::Gte);
        assert!(matches!(*left, Expression::Member { .. }));
        assert_eq!(*right, Expression::Constant(Value::Int(20)));
    }

    #[test]
    fn test_captured_record_member_is_resolved() {
        let mut fields = indexmap::IndexMap::new();
        fields.insert("MinAge".to_string(), Value::Int(21));
        let captured = Expression::Constant(Value::Record(fields));
        let expr = captured.member("MinAge");
        assert_eq!(
            evaluate_independent_subtrees(expr),
            Expression::Constant(Value::Int(21))
        );
    }

    #[test]
    fn test_failed_candidate_is_kept_unevaluated() {
        let expr = Expression::from("abc").invoke("Reverse", vec![]);
        let result = evaluate_independent_subtrees(expr.clone());
        assert_eq!(result, expr);
    }

    #[test]
    fn test_pure_string_method_on_constant_is_evaluated() {
        let expr = Expression::from("abc").invoke("ToUpper", vec![]);
        assert_eq!(
            evaluate_independent_subtrees(expr),
            Expression::Constant(Value::String("ABC".into()))
        );
    }

    #[test]
    fn test_lambda_body_is_evaluated_in_place() {
        let l = lambda("x", param("x").member("Total").gt(Expression::from(10).mul(10)));
        let result = evaluate_independent_subtrees(Expression::Lambda(Box::new(l)));
        let Expression::Lambda(l) = result else {
            panic!("expected lambda");
        };
        let Expression::Binary { right, .. } = l.body else {
            panic!("expected comparison body");
        };
        assert_eq!(*right, Expression::Constant(Value::Int(100)));
    }
}
