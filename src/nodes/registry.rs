//! Registry of node parsers, matched against method calls by name and shape.
//!
//! Parsers are consulted in registration order and the first one whose
//! method name and shape predicate both match wins, so a more specific
//! parser registered before a general one takes precedence. The default
//! registry relies on this for orderings given as a raw numeric direction.

use crate::error::{TranslateError, TranslateResult};
use crate::expr::{Expression, LambdaExpression, MethodCallExpression, Value};
use crate::model::{ChoiceKind, OrderingDirection, SetOperator};
use crate::nodes::QueryNode;

/// Context threaded through one parse: the rendered root expression, used
/// verbatim in parser error messages.
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub root: String,
}

impl ParseContext {
    pub fn for_expression(expression: &Expression) -> Self {
        Self {
            root: expression.to_string(),
        }
    }
}

/// Shape predicate deciding whether a parser applies to a call.
pub type MatchFn = fn(&MethodCallExpression) -> bool;

/// Builds the node for a matched call, given its already parsed source node.
pub type ConstructFn =
    fn(&MethodCallExpression, QueryNode, &ParseContext) -> TranslateResult<QueryNode>;

/// One entry in the registry.
pub struct NodeParser {
    pub method: &'static str,
    pub matches: MatchFn,
    pub construct: ConstructFn,
}

/// Ordered collection of node parsers.
pub struct NodeRegistry {
    parsers: Vec<NodeParser>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl NodeRegistry {
    /// A registry with no parsers; used by tests and callers composing their
    /// own operator surface.
    pub fn empty() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// The full default operator surface.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        // Raw-direction orderings must come before the plain forms so a
        // two-argument call is not rejected by the single-lambda shape.
        registry.register(NodeParser {
            method: "OrderBy",
            matches: matches_raw_ordering,
            construct: construct_raw_ordering,
        });
        registry.register(NodeParser {
            method: "ThenBy",
            matches: matches_raw_ordering,
            construct: construct_raw_ordering,
        });
        for method in ["OrderBy", "OrderByDescending", "ThenBy", "ThenByDescending"] {
            registry.register(NodeParser {
                method,
                matches: matches_single_lambda,
                construct: construct_ordering,
            });
        }
        registry.register(NodeParser {
            method: "Select",
            matches: matches_single_lambda,
            construct: construct_select,
        });
        registry.register(NodeParser {
            method: "Where",
            matches: matches_single_lambda,
            construct: construct_where,
        });
        registry.register(NodeParser {
            method: "SelectMany",
            matches: |call| call.lambda_argument(0).is_some() && call.lambda_argument(1).is_some(),
            construct: construct_select_many,
        });
        for method in ["Join", "GroupJoin"] {
            registry.register(NodeParser {
                method,
                matches: |call| {
                    call.arguments.len() == 4
                        && call.lambda_argument(1).is_some()
                        && call.lambda_argument(2).is_some()
                        && call.lambda_argument(3).is_some()
                },
                construct: construct_join,
            });
        }
        registry.register(NodeParser {
            method: "GroupBy",
            matches: |call| {
                call.lambda_argument(0).is_some() && call.arguments.len() <= 2
            },
            construct: construct_group_by,
        });
        registry.register(NodeParser {
            method: "Distinct",
            matches: matches_no_arguments,
            construct: |_, source, _| {
                Ok(QueryNode::Distinct {
                    source: Box::new(source),
                })
            },
        });
        registry.register(NodeParser {
            method: "Take",
            matches: matches_one_argument,
            construct: construct_take,
        });
        registry.register(NodeParser {
            method: "Skip",
            matches: matches_one_argument,
            construct: construct_skip,
        });
        registry.register(NodeParser {
            method: "Cast",
            matches: matches_one_argument,
            construct: construct_cast,
        });
        for method in ["Count", "LongCount"] {
            registry.register(NodeParser {
                method,
                matches: matches_no_arguments,
                construct: construct_count,
            });
        }
        registry.register(NodeParser {
            method: "Any",
            matches: |call| {
                call.arguments.is_empty() || call.lambda_argument(0).is_some()
            },
            construct: construct_any,
        });
        registry.register(NodeParser {
            method: "All",
            matches: matches_single_lambda,
            construct: construct_all,
        });
        registry.register(NodeParser {
            method: "Contains",
            matches: matches_one_argument,
            construct: construct_contains,
        });
        for method in ["Concat", "Union", "Except", "Intersect"] {
            registry.register(NodeParser {
                method,
                matches: matches_one_argument,
                construct: construct_set_operation,
            });
        }
        for method in [
            "First",
            "FirstOrDefault",
            "Single",
            "SingleOrDefault",
            "Last",
            "LastOrDefault",
        ] {
            registry.register(NodeParser {
                method,
                matches: matches_no_arguments,
                construct: construct_choice,
            });
        }
        registry
    }

    pub fn register(&mut self, parser: NodeParser) {
        self.parsers.push(parser);
    }

    fn find(&self, call: &MethodCallExpression) -> Option<&NodeParser> {
        self.parsers
            .iter()
            .find(|p| p.method == call.method && (p.matches)(call))
    }

    /// Whether some registered parser accepts this call. Used to detect
    /// query chains nested inside other expressions.
    pub fn can_parse(&self, call: &MethodCallExpression) -> bool {
        self.find(call).is_some()
    }

    /// Parse a full chain, leaf first.
    pub fn parse_chain(
        &self,
        expression: &Expression,
        ctx: &ParseContext,
    ) -> TranslateResult<QueryNode> {
        match expression {
            Expression::Source { element_type, name } => Ok(QueryNode::Source {
                expression: expression.clone(),
                element_type: Some(element_type.clone()),
                name: Some(name.clone()),
            }),
            Expression::Member { .. } | Expression::Reference(_) | Expression::SubQuery(_) => {
                Ok(QueryNode::Source {
                    expression: expression.clone(),
                    element_type: None,
                    name: None,
                })
            }
            Expression::Call(call) => {
                let source = self.parse_chain(&call.source, ctx)?;
                match self.find(call) {
                    Some(parser) => (parser.construct)(call, source, ctx),
                    None => Err(TranslateError::parser(
                        expression,
                        format!("no node parser accepts method '{}'", call.method),
                        &ctx.root,
                    )),
                }
            }
            other => Err(TranslateError::parser(
                other,
                "a query chain must start from an entity source or collection",
                &ctx.root,
            )),
        }
    }
}

fn matches_single_lambda(call: &MethodCallExpression) -> bool {
    call.arguments.len() == 1 && call.lambda_argument(0).is_some()
}

fn matches_raw_ordering(call: &MethodCallExpression) -> bool {
    call.arguments.len() == 2
        && call.lambda_argument(0).is_some()
        && matches!(call.argument(1), Some(Expression::Constant(_)))
}

fn matches_no_arguments(call: &MethodCallExpression) -> bool {
    call.arguments.is_empty()
}

fn matches_one_argument(call: &MethodCallExpression) -> bool {
    call.arguments.len() == 1
}

fn require_lambda(
    call: &MethodCallExpression,
    index: usize,
    ctx: &ParseContext,
) -> TranslateResult<LambdaExpression> {
    match call.lambda_argument(index) {
        Some(lambda) => Ok(lambda.clone()),
        None => Err(TranslateError::parser(
            Expression::Call(call.clone()),
            format!("argument {} of '{}' must be a lambda", index, call.method),
            &ctx.root,
        )),
    }
}

fn construct_select(
    call: &MethodCallExpression,
    source: QueryNode,
    ctx: &ParseContext,
) -> TranslateResult<QueryNode> {
    Ok(QueryNode::Select {
        source: Box::new(source),
        selector: require_lambda(call, 0, ctx)?,
    })
}

fn construct_where(
    call: &MethodCallExpression,
    source: QueryNode,
    ctx: &ParseContext,
) -> TranslateResult<QueryNode> {
    Ok(QueryNode::Where {
        source: Box::new(source),
        predicate: require_lambda(call, 0, ctx)?,
    })
}

fn construct_ordering(
    call: &MethodCallExpression,
    source: QueryNode,
    ctx: &ParseContext,
) -> TranslateResult<QueryNode> {
    let direction = if call.method.ends_with("Descending") {
        OrderingDirection::Desc
    } else {
        OrderingDirection::Asc
    };
    Ok(QueryNode::OrderBy {
        source: Box::new(source),
        selector: require_lambda(call, 0, ctx)?,
        direction,
        append: call.method.starts_with("Then"),
    })
}

fn construct_raw_ordering(
    call: &MethodCallExpression,
    source: QueryNode,
    ctx: &ParseContext,
) -> TranslateResult<QueryNode> {
    let direction = match call.argument(1) {
        Some(Expression::Constant(Value::Int(raw))) => OrderingDirection::from_raw(*raw)?,
        _ => {
            return Err(TranslateError::parser(
                Expression::Call(call.clone()),
                "the ordering direction must be an integer constant",
                &ctx.root,
            ));
        }
    };
    Ok(QueryNode::OrderBy {
        source: Box::new(source),
        selector: require_lambda(call, 0, ctx)?,
        direction,
        append: call.method.starts_with("Then"),
    })
}

fn construct_select_many(
    call: &MethodCallExpression,
    source: QueryNode,
    ctx: &ParseContext,
) -> TranslateResult<QueryNode> {
    Ok(QueryNode::SelectMany {
        source: Box::new(source),
        collection_selector: require_lambda(call, 0, ctx)?,
        result_selector: require_lambda(call, 1, ctx)?,
    })
}

fn construct_join(
    call: &MethodCallExpression,
    source: QueryNode,
    ctx: &ParseContext,
) -> TranslateResult<QueryNode> {
    let inner = match call.argument(0) {
        Some(inner) => inner.clone(),
        None => {
            return Err(TranslateError::parser(
                Expression::Call(call.clone()),
                format!("'{}' requires an inner sequence", call.method),
                &ctx.root,
            ));
        }
    };
    Ok(QueryNode::Join {
        source: Box::new(source),
        inner,
        outer_key: require_lambda(call, 1, ctx)?,
        inner_key: require_lambda(call, 2, ctx)?,
        result_selector: require_lambda(call, 3, ctx)?,
        grouped: call.method == "GroupJoin",
    })
}

fn construct_group_by(
    call: &MethodCallExpression,
    source: QueryNode,
    ctx: &ParseContext,
) -> TranslateResult<QueryNode> {
    let element_selector = if call.arguments.len() > 1 {
        Some(require_lambda(call, 1, ctx)?)
    } else {
        None
    };
    Ok(QueryNode::GroupBy {
        source: Box::new(source),
        key_selector: require_lambda(call, 0, ctx)?,
        element_selector,
    })
}

fn construct_take(
    call: &MethodCallExpression,
    source: QueryNode,
    ctx: &ParseContext,
) -> TranslateResult<QueryNode> {
    match call.argument(0) {
        Some(count) => Ok(QueryNode::Take {
            source: Box::new(source),
            count: count.clone(),
        }),
        None => Err(TranslateError::parser(
            Expression::Call(call.clone()),
            "'Take' requires a count",
            &ctx.root,
        )),
    }
}

fn construct_skip(
    call: &MethodCallExpression,
    source: QueryNode,
    ctx: &ParseContext,
) -> TranslateResult<QueryNode> {
    match call.argument(0) {
        Some(count) => Ok(QueryNode::Skip {
            source: Box::new(source),
            count: count.clone(),
        }),
        None => Err(TranslateError::parser(
            Expression::Call(call.clone()),
            "'Skip' requires a count",
            &ctx.root,
        )),
    }
}

fn construct_cast(
    call: &MethodCallExpression,
    source: QueryNode,
    ctx: &ParseContext,
) -> TranslateResult<QueryNode> {
    match call.argument(0) {
        Some(Expression::Constant(Value::String(target))) => Ok(QueryNode::Cast {
            source: Box::new(source),
            target: target.as_str().into(),
        }),
        _ => Err(TranslateError::parser(
            Expression::Call(call.clone()),
            "'Cast' requires a constant type name",
            &ctx.root,
        )),
    }
}

fn construct_count(
    call: &MethodCallExpression,
    source: QueryNode,
    _ctx: &ParseContext,
) -> TranslateResult<QueryNode> {
    Ok(QueryNode::Count {
        source: Box::new(source),
        long: call.method == "LongCount",
    })
}

fn construct_any(
    call: &MethodCallExpression,
    source: QueryNode,
    _ctx: &ParseContext,
) -> TranslateResult<QueryNode> {
    Ok(QueryNode::Any {
        source: Box::new(source),
        predicate: call.lambda_argument(0).cloned(),
    })
}

fn construct_all(
    call: &MethodCallExpression,
    source: QueryNode,
    ctx: &ParseContext,
) -> TranslateResult<QueryNode> {
    Ok(QueryNode::All {
        source: Box::new(source),
        predicate: require_lambda(call, 0, ctx)?,
    })
}

fn construct_contains(
    call: &MethodCallExpression,
    source: QueryNode,
    ctx: &ParseContext,
) -> TranslateResult<QueryNode> {
    match call.argument(0) {
        Some(item) => Ok(QueryNode::Contains {
            source: Box::new(source),
            item: item.clone(),
        }),
        None => Err(TranslateError::parser(
            Expression::Call(call.clone()),
            "'Contains' requires an item",
            &ctx.root,
        )),
    }
}

fn construct_set_operation(
    call: &MethodCallExpression,
    source: QueryNode,
    ctx: &ParseContext,
) -> TranslateResult<QueryNode> {
    let op = match call.method.as_str() {
        "Concat" => SetOperator::Concat,
        "Union" => SetOperator::Union,
        "Except" => SetOperator::Except,
        _ => SetOperator::Intersect,
    };
    match call.argument(0) {
        Some(other) => Ok(QueryNode::SetOperation {
            source: Box::new(source),
            op,
            other: other.clone(),
        }),
        None => Err(TranslateError::parser(
            Expression::Call(call.clone()),
            format!("'{}' requires a second sequence", call.method),
            &ctx.root,
        )),
    }
}

fn construct_choice(
    call: &MethodCallExpression,
    source: QueryNode,
    _ctx: &ParseContext,
) -> TranslateResult<QueryNode> {
    let kind = if call.method.starts_with("First") {
        ChoiceKind::First
    } else if call.method.starts_with("Single") {
        ChoiceKind::Single
    } else {
        ChoiceKind::Last
    };
    Ok(QueryNode::Choice {
        source: Box::new(source),
        kind,
        or_default: call.method.ends_with("OrDefault"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{lambda, param, Queryable};

    fn parse(q: &Queryable) -> TranslateResult<QueryNode> {
        let registry = NodeRegistry::with_defaults();
        let ctx = ParseContext::for_expression(q.expression());
        registry.parse_chain(q.expression(), &ctx)
    }

    #[test]
    fn test_parses_filter_then_select() {
        let q = Queryable::source("Customer", "c")
            .filter(lambda("x", param("x").member("Active")))
            .select(lambda("x", param("x").member("Name")));
        let node = parse(&q).unwrap();

        let QueryNode::Select { source, .. } = node else {
            panic!("expected select at the root");
        };
        let QueryNode::Where { source, .. } = *source else {
            panic!("expected where beneath select");
        };
        assert!(matches!(*source, QueryNode::Source { .. }));
    }

    #[test]
    fn test_unknown_method_names_method_and_root() {
        let q = Queryable::source("Customer", "c");
        let chain = Expression::Call(MethodCallExpression {
            method: "Reverse".into(),
            source: Box::new(q.into_expression()),
            arguments: vec![],
        });
        let registry = NodeRegistry::with_defaults();
        let ctx = ParseContext::for_expression(&chain);
        let err = registry.parse_chain(&chain, &ctx).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Reverse"), "message was: {}", message);
        assert!(message.contains("root query"), "message was: {}", message);
    }

    #[test]
    fn test_raw_direction_values() {
        let asc = Queryable::source("T", "t").order_by_raw(lambda("x", param("x")), 0);
        let QueryNode::OrderBy { direction, append, .. } = parse(&asc).unwrap() else {
            panic!("expected ordering node");
        };
        assert_eq!(direction, OrderingDirection::Asc);
        assert!(!append);

        let desc = Queryable::source("T", "t").then_by_raw(lambda("x", param("x")), 1);
        let QueryNode::OrderBy { direction, append, .. } = parse(&desc).unwrap() else {
            panic!("expected ordering node");
        };
        assert_eq!(direction, OrderingDirection::Desc);
        assert!(append);
    }

    #[test]
    fn test_raw_direction_out_of_range_reports_literal_value() {
        let q = Queryable::source("T", "t").order_by_raw(lambda("x", param("x")), 7);
        let err = parse(&q).unwrap_err();
        assert!(matches!(err, TranslateError::NotSupported(_)));
        assert!(err.to_string().contains("7"), "message was: {}", err);
    }

    #[test]
    fn test_first_matching_parser_wins() {
        let mut registry = NodeRegistry::empty();
        registry.register(NodeParser {
            method: "Take",
            matches: |_| true,
            construct: |_, source, _| {
                Ok(QueryNode::Distinct {
                    source: Box::new(source),
                })
            },
        });
        registry.register(NodeParser {
            method: "Take",
            matches: matches_one_argument,
            construct: construct_take,
        });

        let q = Queryable::source("T", "t").take(5);
        let ctx = ParseContext::for_expression(q.expression());
        let node = registry.parse_chain(q.expression(), &ctx).unwrap();
        assert!(matches!(node, QueryNode::Distinct { .. }));
    }

    #[test]
    fn test_any_with_and_without_predicate() {
        let bare = Queryable::source("T", "t").any();
        let QueryNode::Any { predicate, .. } = parse(&bare).unwrap() else {
            panic!("expected any node");
        };
        assert!(predicate.is_none());

        let filtered =
            Queryable::source("T", "t").any_filtered(lambda("x", param("x").member("Active")));
        let QueryNode::Any { predicate, .. } = parse(&filtered).unwrap() else {
            panic!("expected any node");
        };
        assert!(predicate.is_some());
    }

    #[test]
    fn test_choice_kinds_and_defaults() {
        let cases = [
            (Queryable::source("T", "t").first(), ChoiceKind::First, false),
            (
                Queryable::source("T", "t").first_or_default(),
                ChoiceKind::First,
                true,
            ),
            (
                Queryable::source("T", "t").single_or_default(),
                ChoiceKind::Single,
                true,
            ),
            (Queryable::source("T", "t").last(), ChoiceKind::Last, false),
        ];
        for (q, expected_kind, expected_default) in cases {
            let QueryNode::Choice {
                kind, or_default, ..
            } = parse(&q).unwrap()
            else {
                panic!("expected choice node");
            };
            assert_eq!(kind, expected_kind);
            assert_eq!(or_default, expected_default);
        }
    }
}
