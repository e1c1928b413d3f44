//! Fluent front end for building query expression chains.
//!
//! Every method appends one `MethodCallExpression` to the chain; nothing is
//! interpreted or validated at build time. The method names form the
//! supported operator surface and are matched verbatim by the node parser
//! registry.

use serde::{Deserialize, Serialize};

use crate::expr::{Expression, LambdaExpression, MethodCallExpression, TypeRef, Value};

/// A strongly-typed, declaratively built query over an entity source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Queryable {
    expression: Expression,
}

impl Queryable {
    /// Start a query over an entity collection.
    ///
    /// # Example
    /// ```
    /// use relq::prelude::*;
    ///
    /// let q = Queryable::source("Customer", "c")
    ///     .filter(lambda("x", param("x").member("Active")))
    ///     .select(lambda("x", param("x").member("Name")));
    /// ```
    pub fn source(element_type: impl Into<TypeRef>, name: impl Into<String>) -> Self {
        Self {
            expression: Expression::Source {
                element_type: element_type.into(),
                name: name.into(),
            },
        }
    }

    /// Wrap an already built expression (used for sub-query construction).
    pub fn from_expression(expression: Expression) -> Self {
        Self { expression }
    }

    /// The underlying expression chain.
    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn into_expression(self) -> Expression {
        self.expression
    }

    fn call(self, method: &str, arguments: Vec<Expression>) -> Self {
        Self {
            expression: Expression::Call(MethodCallExpression {
                method: method.to_string(),
                source: Box::new(self.expression),
                arguments,
            }),
        }
    }

    fn call_with_lambda(self, method: &str, lambda: LambdaExpression) -> Self {
        self.call(method, vec![Expression::Lambda(Box::new(lambda))])
    }

    /// Projection (`Select`).
    pub fn select(self, selector: LambdaExpression) -> Self {
        self.call_with_lambda("Select", selector)
    }

    /// Filter (`Where`).
    pub fn filter(self, predicate: LambdaExpression) -> Self {
        self.call_with_lambda("Where", predicate)
    }

    /// Primary ascending ordering.
    pub fn order_by(self, selector: LambdaExpression) -> Self {
        self.call_with_lambda("OrderBy", selector)
    }

    /// Primary descending ordering.
    pub fn order_by_desc(self, selector: LambdaExpression) -> Self {
        self.call_with_lambda("OrderByDescending", selector)
    }

    /// Primary ordering with a raw numeric direction (0 = ascending,
    /// 1 = descending; anything else is rejected during parsing).
    pub fn order_by_raw(self, selector: LambdaExpression, direction: i64) -> Self {
        self.call(
            "OrderBy",
            vec![
                Expression::Lambda(Box::new(selector)),
                Expression::Constant(Value::Int(direction)),
            ],
        )
    }

    /// Secondary ascending ordering; must directly follow an ordering.
    pub fn then_by(self, selector: LambdaExpression) -> Self {
        self.call_with_lambda("ThenBy", selector)
    }

    /// Secondary descending ordering; must directly follow an ordering.
    pub fn then_by_desc(self, selector: LambdaExpression) -> Self {
        self.call_with_lambda("ThenByDescending", selector)
    }

    /// Secondary ordering with a raw numeric direction.
    pub fn then_by_raw(self, selector: LambdaExpression, direction: i64) -> Self {
        self.call(
            "ThenBy",
            vec![
                Expression::Lambda(Box::new(selector)),
                Expression::Constant(Value::Int(direction)),
            ],
        )
    }

    /// Flattening projection over a per-item collection (`SelectMany`).
    pub fn select_many(
        self,
        collection_selector: LambdaExpression,
        result_selector: LambdaExpression,
    ) -> Self {
        self.call(
            "SelectMany",
            vec![
                Expression::Lambda(Box::new(collection_selector)),
                Expression::Lambda(Box::new(result_selector)),
            ],
        )
    }

    /// Equi-join against another source.
    pub fn join(
        self,
        inner: Queryable,
        outer_key: LambdaExpression,
        inner_key: LambdaExpression,
        result_selector: LambdaExpression,
    ) -> Self {
        self.call(
            "Join",
            vec![
                inner.expression,
                Expression::Lambda(Box::new(outer_key)),
                Expression::Lambda(Box::new(inner_key)),
                Expression::Lambda(Box::new(result_selector)),
            ],
        )
    }

    /// Grouped equi-join against another source.
    pub fn group_join(
        self,
        inner: Queryable,
        outer_key: LambdaExpression,
        inner_key: LambdaExpression,
        result_selector: LambdaExpression,
    ) -> Self {
        self.call(
            "GroupJoin",
            vec![
                inner.expression,
                Expression::Lambda(Box::new(outer_key)),
                Expression::Lambda(Box::new(inner_key)),
                Expression::Lambda(Box::new(result_selector)),
            ],
        )
    }

    /// Group elements by a key.
    pub fn group_by(self, key_selector: LambdaExpression) -> Self {
        self.call_with_lambda("GroupBy", key_selector)
    }

    /// Group elements by a key with an element projection.
    pub fn group_by_with(
        self,
        key_selector: LambdaExpression,
        element_selector: LambdaExpression,
    ) -> Self {
        self.call(
            "GroupBy",
            vec![
                Expression::Lambda(Box::new(key_selector)),
                Expression::Lambda(Box::new(element_selector)),
            ],
        )
    }

    pub fn distinct(self) -> Self {
        self.call("Distinct", vec![])
    }

    pub fn take(self, count: impl Into<Expression>) -> Self {
        self.call("Take", vec![count.into()])
    }

    pub fn skip(self, count: impl Into<Expression>) -> Self {
        self.call("Skip", vec![count.into()])
    }

    /// Re-type the sequence elements; no SQL effect.
    pub fn cast(self, target_type: impl Into<TypeRef>) -> Self {
        let target = target_type.into();
        self.call(
            "Cast",
            vec![Expression::Constant(Value::String(target.0))],
        )
    }

    pub fn count(self) -> Self {
        self.call("Count", vec![])
    }

    pub fn long_count(self) -> Self {
        self.call("LongCount", vec![])
    }

    /// Existence test.
    pub fn any(self) -> Self {
        self.call("Any", vec![])
    }

    /// Existence test with a predicate.
    pub fn any_filtered(self, predicate: LambdaExpression) -> Self {
        self.call_with_lambda("Any", predicate)
    }

    /// Universal quantification over a predicate.
    pub fn all(self, predicate: LambdaExpression) -> Self {
        self.call_with_lambda("All", predicate)
    }

    /// Membership test.
    pub fn contains(self, item: impl Into<Expression>) -> Self {
        self.call("Contains", vec![item.into()])
    }

    pub fn concat(self, other: Queryable) -> Self {
        self.call("Concat", vec![other.expression])
    }

    pub fn union(self, other: Queryable) -> Self {
        self.call("Union", vec![other.expression])
    }

    pub fn except(self, other: Queryable) -> Self {
        self.call("Except", vec![other.expression])
    }

    pub fn intersect(self, other: Queryable) -> Self {
        self.call("Intersect", vec![other.expression])
    }

    pub fn first(self) -> Self {
        self.call("First", vec![])
    }

    pub fn first_or_default(self) -> Self {
        self.call("FirstOrDefault", vec![])
    }

    pub fn single(self) -> Self {
        self.call("Single", vec![])
    }

    pub fn single_or_default(self) -> Self {
        self.call("SingleOrDefault", vec![])
    }

    pub fn last(self) -> Self {
        self.call("Last", vec![])
    }

    pub fn last_or_default(self) -> Self {
        self.call("LastOrDefault", vec![])
    }
}
