//! Typed nodes produced by parsing a query expression chain.
//!
//! A chain of method calls over an entity source parses into a [`QueryNode`]
//! tree whose root is the outermost operator and whose leaf is the source.
//! Parsing is purely syntactic; model construction happens afterwards.

pub mod registry;

pub use registry::{NodeParser, NodeRegistry, ParseContext};

use crate::expr::{Expression, LambdaExpression, TypeRef};
use crate::model::{ChoiceKind, OrderingDirection, SetOperator};

/// One parsed query operator, wrapping the node it operates on.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// The collection the chain starts from: an entity source, or (for
    /// nested chains) a navigation member or source reference.
    Source {
        expression: Expression,
        element_type: Option<TypeRef>,
        name: Option<String>,
    },
    Select {
        source: Box<QueryNode>,
        selector: LambdaExpression,
    },
    Where {
        source: Box<QueryNode>,
        predicate: LambdaExpression,
    },
    /// Primary or secondary ordering. `append` distinguishes `ThenBy`, which
    /// extends the preceding ordering instead of starting a new one.
    OrderBy {
        source: Box<QueryNode>,
        selector: LambdaExpression,
        direction: OrderingDirection,
        append: bool,
    },
    SelectMany {
        source: Box<QueryNode>,
        collection_selector: LambdaExpression,
        result_selector: LambdaExpression,
    },
    Join {
        source: Box<QueryNode>,
        inner: Expression,
        outer_key: LambdaExpression,
        inner_key: LambdaExpression,
        result_selector: LambdaExpression,
        grouped: bool,
    },
    GroupBy {
        source: Box<QueryNode>,
        key_selector: LambdaExpression,
        element_selector: Option<LambdaExpression>,
    },
    Distinct {
        source: Box<QueryNode>,
    },
    Take {
        source: Box<QueryNode>,
        count: Expression,
    },
    Skip {
        source: Box<QueryNode>,
        count: Expression,
    },
    Cast {
        source: Box<QueryNode>,
        target: TypeRef,
    },
    Count {
        source: Box<QueryNode>,
        long: bool,
    },
    Any {
        source: Box<QueryNode>,
        predicate: Option<LambdaExpression>,
    },
    All {
        source: Box<QueryNode>,
        predicate: LambdaExpression,
    },
    Contains {
        source: Box<QueryNode>,
        item: Expression,
    },
    SetOperation {
        source: Box<QueryNode>,
        op: SetOperator,
        other: Expression,
    },
    Choice {
        source: Box<QueryNode>,
        kind: ChoiceKind,
        or_default: bool,
    },
}

impl QueryNode {
    /// The node this operator applies to, or `None` for the source leaf.
    pub fn source_node(&self) -> Option<&QueryNode> {
        match self {
            QueryNode::Source { .. } => None,
            QueryNode::Select { source, .. }
            | QueryNode::Where { source, .. }
            | QueryNode::OrderBy { source, .. }
            | QueryNode::SelectMany { source, .. }
            | QueryNode::Join { source, .. }
            | QueryNode::GroupBy { source, .. }
            | QueryNode::Distinct { source }
            | QueryNode::Take { source, .. }
            | QueryNode::Skip { source, .. }
            | QueryNode::Cast { source, .. }
            | QueryNode::Count { source, .. }
            | QueryNode::Any { source, .. }
            | QueryNode::All { source, .. }
            | QueryNode::Contains { source, .. }
            | QueryNode::SetOperation { source, .. }
            | QueryNode::Choice { source, .. } => Some(source),
        }
    }
}
