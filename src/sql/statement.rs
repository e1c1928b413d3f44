//! The unresolved SQL statement model.
//!
//! Lowering produces statements whose table sources are still entity types
//! and whose member accesses are still abstract; the mapping resolver turns
//! both into physical tables and columns, creating navigation joins on the
//! way. Text generation only ever sees resolved statements.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::expr::{BinaryOp, TypeRef, UnaryOp, Value};
use crate::model::{OrderingDirection, SetOperator};

/// Where the rows of a table come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlTableSource {
    /// An entity type awaiting table resolution.
    Entity(TypeRef),
    /// A resolved physical table name.
    Table(String),
    /// An unresolved collection expression (a navigation member).
    Collection(SqlExpr),
    /// A derived table.
    Statement(Box<SqlStatement>),
    /// An inline list of constant rows; only meaningful under a membership
    /// test.
    Values(Vec<Value>),
}

/// A table joined onto another through a navigation member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlJoinedTable {
    pub alias: String,
    pub entity_type: TypeRef,
    pub table_name: String,
    /// ON pairs, each a resolved column equality.
    pub conditions: Vec<(SqlColumn, SqlColumn)>,
    /// Nullable navigations join with LEFT JOIN.
    pub left: bool,
    /// Joins hanging off this table, keyed by navigation member.
    pub joins: IndexMap<String, SqlJoinedTable>,
}

/// One entry of the FROM list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlTable {
    pub alias: String,
    pub entity_type: Option<TypeRef>,
    pub source: SqlTableSource,
    /// Navigation joins keyed by member name; at most one join per member.
    pub joins: IndexMap<String, SqlJoinedTable>,
}

impl SqlTable {
    pub fn new(alias: impl Into<String>, source: SqlTableSource) -> Self {
        Self {
            alias: alias.into(),
            entity_type: None,
            source,
            joins: IndexMap::new(),
        }
    }
}

/// A fully resolved column reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlColumn {
    pub table: String,
    pub column: String,
}

/// A resolved whole-entity value: all columns of one table alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlEntity {
    pub entity_type: TypeRef,
    pub alias: String,
    pub columns: Vec<String>,
}

/// A scalar function recognized by the generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlFunction {
    Upper,
    Lower,
    Trim,
    Length,
}

/// An expression inside a statement, resolved or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlExpr {
    Literal(Value),
    Column(SqlColumn),
    /// A whole item of the table with this alias; unresolved until mapping
    /// resolution, afterwards only kept for derived tables.
    TableRef(String),
    /// An unresolved member access.
    Member {
        source: Box<SqlExpr>,
        member: String,
    },
    Entity(SqlEntity),
    /// A composite value; compared pairwise.
    Row(Vec<SqlExpr>),
    Unary {
        op: UnaryOp,
        operand: Box<SqlExpr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    IsNull {
        operand: Box<SqlExpr>,
        negated: bool,
    },
    Call {
        function: SqlFunction,
        arguments: Vec<SqlExpr>,
    },
    /// A nested statement; its form decides how it renders (scalar,
    /// EXISTS, or IN).
    Statement(Box<SqlStatement>),
}

impl SqlExpr {
    pub fn column(table: impl Into<String>, column: impl Into<String>) -> Self {
        SqlExpr::Column(SqlColumn {
            table: table.into(),
            column: column.into(),
        })
    }

    pub fn eq(self, other: SqlExpr) -> Self {
        SqlExpr::Binary {
            op: BinaryOp::Eq,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn and(self, other: SqlExpr) -> Self {
        SqlExpr::Binary {
            op: BinaryOp::And,
            left: Box::new(self),
            right: Box::new(other),
        }
    }
}

/// One item of the select list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectItem {
    pub expression: SqlExpr,
    pub alias: Option<String>,
}

/// The select list or an aggregate replacing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectList {
    Items(Vec<SelectItem>),
    Count { big: bool },
}

/// How the statement is consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatementForm {
    /// Plain row results.
    Rows,
    /// An existence test; renders as EXISTS / NOT EXISTS, or a CASE
    /// expression when it is the whole result.
    Exists { negated: bool },
    /// A membership test of `item` against the statement's rows.
    In { item: Box<SqlExpr> },
}

/// Row limiting and paging.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RowSelection {
    pub top: Option<SqlExpr>,
    pub offset: Option<SqlExpr>,
}

/// One appended set-operation arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetStatement {
    pub op: SetOperator,
    pub statement: SqlStatement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlOrdering {
    pub expression: SqlExpr,
    pub direction: OrderingDirection,
}

/// One SELECT statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlStatement {
    pub form: StatementForm,
    pub select: SelectList,
    pub distinct: bool,
    pub tables: Vec<SqlTable>,
    pub where_condition: Option<SqlExpr>,
    pub group_by: Option<SqlExpr>,
    pub orderings: Vec<SqlOrdering>,
    pub row_selection: RowSelection,
    pub set_operations: Vec<SetStatement>,
}

impl Default for SqlStatement {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlStatement {
    pub fn new() -> Self {
        Self {
            form: StatementForm::Rows,
            select: SelectList::Items(Vec::new()),
            distinct: false,
            tables: Vec::new(),
            where_condition: None,
            group_by: None,
            orderings: Vec::new(),
            row_selection: RowSelection::default(),
            set_operations: Vec::new(),
        }
    }

    /// AND a condition onto the predicate, keeping earlier conditions first.
    pub fn and_where(&mut self, condition: SqlExpr) {
        self.where_condition = Some(match self.where_condition.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
    }
}
