//! The normalized intermediate representation of a query.
//!
//! A [`QueryModel`] owns one main source, an ordered list of body clauses,
//! exactly one terminal select-or-group clause, and an ordered list of result
//! operators. Query sources (from/join clauses) live in a [`ClauseArena`] and
//! are addressed by stable [`ClauseId`]s; reference expressions elsewhere in
//! the tree carry IDs rather than live handles, which makes cloning a matter
//! of allocating new arena entries and remapping IDs.
//!
//! Body clause order is semantically significant and is never reordered by a
//! later stage.

pub mod builder;
pub mod cloning;

use serde::{Deserialize, Serialize};

use crate::error::{TranslateError, TranslateResult};
use crate::expr::{Expression, TypeRef};

/// Stable identifier of a query-source clause inside a [`ClauseArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClauseId(pub u32);

/// What kind of query source a clause is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceClauseKind {
    MainFrom,
    AdditionalFrom,
    Join {
        outer_key: Expression,
        inner_key: Expression,
    },
    GroupJoin {
        outer_key: Expression,
        inner_key: Expression,
    },
}

/// One query source: a from clause or a join clause.
///
/// `item_name` is the logical alias of the items this source produces;
/// `item_type` is their semantic element type when declared (sources derived
/// from navigation members leave it to the mapping resolver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceClause {
    pub item_name: String,
    pub item_type: Option<TypeRef>,
    pub source: Expression,
    pub kind: SourceClauseKind,
}

/// Arena owning every query source of a translation, shared between a query
/// model and its nested sub-query models.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClauseArena {
    clauses: Vec<SourceClause>,
}

impl ClauseArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, clause: SourceClause) -> ClauseId {
        let id = ClauseId(self.clauses.len() as u32);
        self.clauses.push(clause);
        id
    }

    pub fn get(&self, id: ClauseId) -> &SourceClause {
        &self.clauses[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ClauseId) -> &mut SourceClause {
        &mut self.clauses[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// A filter over the current items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereClause {
    pub predicate: Expression,
}

/// Sort direction of one ordering field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderingDirection {
    Asc,
    Desc,
}

impl OrderingDirection {
    /// Convert a raw numeric direction. Anything other than 0 (ascending) or
    /// 1 (descending) is rejected; the message carries the literal value.
    pub fn from_raw(value: i64) -> TranslateResult<Self> {
        match value {
            0 => Ok(OrderingDirection::Asc),
            1 => Ok(OrderingDirection::Desc),
            other => Err(TranslateError::not_supported(format!(
                "Ordering direction '{}' is not supported; only Asc (0) and Desc (1) are valid",
                other
            ))),
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            OrderingDirection::Asc => OrderingDirection::Desc,
            OrderingDirection::Desc => OrderingDirection::Asc,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            OrderingDirection::Asc => "ASC",
            OrderingDirection::Desc => "DESC",
        }
    }
}

/// One ordering field (`OrderBy`/`ThenBy` entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ordering {
    pub expression: Expression,
    pub direction: OrderingDirection,
}

/// An ordering clause accumulating `OrderBy, ThenBy, ThenBy, …` fields in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByClause {
    pub orderings: Vec<Ordering>,
}

/// The terminal projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectClause {
    pub selector: Expression,
}

/// The terminal grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupClause {
    pub key_selector: Expression,
    pub element_selector: Expression,
}

/// A clause in the body of a query, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BodyClause {
    Where(WhereClause),
    AdditionalFrom(ClauseId),
    Join(ClauseId),
    OrderBy(OrderByClause),
}

/// Exactly one of these terminates every query model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectOrGroup {
    Select(SelectClause),
    Group(GroupClause),
}

/// Set operators combining two statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetOperator {
    /// UNION ALL (keeps duplicates)
    Concat,
    /// UNION (removes duplicates)
    Union,
    /// EXCEPT (rows in first but not second)
    Except,
    /// INTERSECT (common rows)
    Intersect,
}

impl SetOperator {
    pub fn keyword(&self) -> &'static str {
        match self {
            SetOperator::Concat => "UNION ALL",
            SetOperator::Union => "UNION",
            SetOperator::Except => "EXCEPT",
            SetOperator::Intersect => "INTERSECT",
        }
    }
}

/// Which single row a choice operator picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChoiceKind {
    First,
    Single,
    Last,
}

/// A post-processing operator applied after the clauses, strictly in append
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResultOperator {
    Distinct,
    Take(Expression),
    Skip(Expression),
    Cast(TypeRef),
    Count,
    LongCount,
    Any { predicate: Option<Expression> },
    All { predicate: Expression },
    Contains { item: Expression },
    SetOperation { op: SetOperator, other: QueryModel },
    Choice { kind: ChoiceKind, or_default: bool },
}

/// The normalized representation of one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryModel {
    pub main_from: ClauseId,
    pub body_clauses: Vec<BodyClause>,
    pub select: SelectOrGroup,
    pub result_operators: Vec<ResultOperator>,
}

impl QueryModel {
    /// A fresh model selecting the main source's items unchanged.
    pub fn new(main_from: ClauseId) -> Self {
        Self {
            main_from,
            body_clauses: Vec::new(),
            select: SelectOrGroup::Select(SelectClause {
                selector: Expression::Reference(main_from),
            }),
            result_operators: Vec::new(),
        }
    }

    /// IDs of every query source this model owns (main plus body sources),
    /// in declaration order. Sub-query sources are not included.
    pub fn source_clause_ids(&self) -> Vec<ClauseId> {
        let mut ids = vec![self.main_from];
        for clause in &self.body_clauses {
            match clause {
                BodyClause::AdditionalFrom(id) | BodyClause::Join(id) => ids.push(*id),
                BodyClause::Where(_) | BodyClause::OrderBy(_) => {}
            }
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_from_raw() {
        assert_eq!(OrderingDirection::from_raw(0).unwrap(), OrderingDirection::Asc);
        assert_eq!(OrderingDirection::from_raw(1).unwrap(), OrderingDirection::Desc);
    }

    #[test]
    fn test_direction_from_raw_rejects_with_literal_value() {
        let err = OrderingDirection::from_raw(42).unwrap_err();
        assert!(err.to_string().contains("42"), "message was: {}", err);
        let err = OrderingDirection::from_raw(-7).unwrap_err();
        assert!(err.to_string().contains("-7"), "message was: {}", err);
    }

    #[test]
    fn test_new_model_selects_main_source() {
        let mut arena = ClauseArena::new();
        let id = arena.alloc(SourceClause {
            item_name: "c".into(),
            item_type: Some("Customer".into()),
            source: Expression::Source {
                element_type: "Customer".into(),
                name: "c".into(),
            },
            kind: SourceClauseKind::MainFrom,
        });
        let model = QueryModel::new(id);
        assert_eq!(
            model.select,
            SelectOrGroup::Select(SelectClause {
                selector: Expression::Reference(id)
            })
        );
        assert!(model.body_clauses.is_empty());
    }
}
