//! The raw query expression tree.
//!
//! A query is built declaratively as a chain of method calls (see
//! [`queryable::Queryable`]); nothing is interpreted until the whole chain is
//! handed to the translation pipeline. The same [`Expression`] type is used
//! throughout the pipeline: after model building it additionally carries
//! [`Expression::Reference`] nodes pointing at query-source clauses and
//! [`Expression::SubQuery`] nodes wrapping nested query models.

pub mod queryable;
pub mod values;

pub use queryable::Queryable;
pub use values::Value;

use serde::{Deserialize, Serialize};

use crate::model::{ClauseId, QueryModel};

/// Binary operators usable inside query expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    /// Returns the SQL symbol/keyword for this operator.
    pub fn sql_symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }

    /// True for operators producing a boolean from two values.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Gt | BinaryOp::Gte | BinaryOp::Lt | BinaryOp::Lte
        )
    }

    /// True for AND/OR.
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// A semantic element type, identified by name.
///
/// The schema provider is keyed by these names; the translation pipeline
/// never inspects the shape of the type itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRef(pub String);

impl TypeRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeRef {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for TypeRef {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A lambda parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterExpression {
    pub name: String,
    /// Element type of the bound query source, when declared.
    pub param_type: Option<TypeRef>,
}

/// A lambda abstraction used as a selector, predicate, or key extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaExpression {
    pub parameters: Vec<ParameterExpression>,
    pub body: Expression,
}

/// One query operator call in the chain (`source.Method(args...)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCallExpression {
    pub method: String,
    pub source: Box<Expression>,
    pub arguments: Vec<Expression>,
}

impl MethodCallExpression {
    pub fn argument(&self, index: usize) -> Option<&Expression> {
        self.arguments.get(index)
    }

    /// Returns the argument at `index` if it is a lambda.
    pub fn lambda_argument(&self, index: usize) -> Option<&LambdaExpression> {
        match self.arguments.get(index) {
            Some(Expression::Lambda(l)) => Some(l),
            _ => None,
        }
    }
}

/// A node of the query expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// An evaluated constant.
    Constant(Value),
    /// An entity collection root (the ultimate query source).
    Source { element_type: TypeRef, name: String },
    /// A lambda parameter occurrence.
    Parameter(ParameterExpression),
    /// Member access (`x.Name`).
    Member {
        source: Box<Expression>,
        member: String,
    },
    /// Binary operation.
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// Unary operation.
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    /// A query operator call.
    Call(MethodCallExpression),
    /// A lambda; appears only as an operator call argument.
    Lambda(Box<LambdaExpression>),
    /// An anonymous projection (`new { a = ..., b = ... }`); the vehicle for
    /// transparent identifiers created by multi-source operators.
    New { members: Vec<(String, Expression)> },
    /// A reference to a query-source clause, by stable ID. Produced by the
    /// query model builder; never present in a raw query.
    Reference(ClauseId),
    /// A nested, fully built query model. Produced by sub-query detection.
    SubQuery(Box<QueryModel>),
}

impl Expression {
    /// Member access builder.
    pub fn member(self, name: impl Into<String>) -> Expression {
        Expression::Member {
            source: Box::new(self),
            member: name.into(),
        }
    }

    pub fn binary(self, op: BinaryOp, right: impl Into<Expression>) -> Expression {
        Expression::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right.into()),
        }
    }

    pub fn eq(self, right: impl Into<Expression>) -> Expression {
        self.binary(BinaryOp::Eq, right)
    }

    pub fn ne(self, right: impl Into<Expression>) -> Expression {
        self.binary(BinaryOp::Ne, right)
    }

    pub fn gt(self, right: impl Into<Expression>) -> Expression {
        self.binary(BinaryOp::Gt, right)
    }

    pub fn gte(self, right: impl Into<Expression>) -> Expression {
        self.binary(BinaryOp::Gte, right)
    }

    pub fn lt(self, right: impl Into<Expression>) -> Expression {
        self.binary(BinaryOp::Lt, right)
    }

    pub fn lte(self, right: impl Into<Expression>) -> Expression {
        self.binary(BinaryOp::Lte, right)
    }

    pub fn and(self, right: impl Into<Expression>) -> Expression {
        self.binary(BinaryOp::And, right)
    }

    pub fn or(self, right: impl Into<Expression>) -> Expression {
        self.binary(BinaryOp::Or, right)
    }

    pub fn add(self, right: impl Into<Expression>) -> Expression {
        self.binary(BinaryOp::Add, right)
    }

    pub fn sub(self, right: impl Into<Expression>) -> Expression {
        self.binary(BinaryOp::Sub, right)
    }

    pub fn mul(self, right: impl Into<Expression>) -> Expression {
        self.binary(BinaryOp::Mul, right)
    }

    pub fn not(self) -> Expression {
        Expression::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }

    /// A non-operator method call on this expression (`x.Name.ToUpper()`).
    /// Constant-only calls to known pure methods are collapsed by the
    /// partial evaluator.
    pub fn invoke(self, method: impl Into<String>, arguments: Vec<Expression>) -> Expression {
        Expression::Call(MethodCallExpression {
            method: method.into(),
            source: Box::new(self),
            arguments,
        })
    }
}

/// Build an untyped lambda parameter occurrence.
pub fn param(name: impl Into<String>) -> Expression {
    Expression::Parameter(ParameterExpression {
        name: name.into(),
        param_type: None,
    })
}

/// Build a single-parameter lambda.
pub fn lambda(parameter: impl Into<String>, body: Expression) -> LambdaExpression {
    LambdaExpression {
        parameters: vec![ParameterExpression {
            name: parameter.into(),
            param_type: None,
        }],
        body,
    }
}

/// Build a two-parameter lambda (result selectors of Join/GroupJoin/SelectMany).
pub fn lambda2(
    first: impl Into<String>,
    second: impl Into<String>,
    body: Expression,
) -> LambdaExpression {
    LambdaExpression {
        parameters: vec![
            ParameterExpression {
                name: first.into(),
                param_type: None,
            },
            ParameterExpression {
                name: second.into(),
                param_type: None,
            },
        ],
        body,
    }
}

/// Build an anonymous projection expression.
pub fn new_projection(members: Vec<(&str, Expression)>) -> Expression {
    Expression::New {
        members: members
            .into_iter()
            .map(|(n, e)| (n.to_string(), e))
            .collect(),
    }
}

impl From<Value> for Expression {
    fn from(v: Value) -> Self {
        Expression::Constant(v)
    }
}

impl From<bool> for Expression {
    fn from(b: bool) -> Self {
        Expression::Constant(Value::Bool(b))
    }
}

impl From<i32> for Expression {
    fn from(n: i32) -> Self {
        Expression::Constant(Value::Int(n as i64))
    }
}

impl From<i64> for Expression {
    fn from(n: i64) -> Self {
        Expression::Constant(Value::Int(n))
    }
}

impl From<f64> for Expression {
    fn from(n: f64) -> Self {
        Expression::Constant(Value::Float(n))
    }
}

impl From<&str> for Expression {
    fn from(s: &str) -> Self {
        Expression::Constant(Value::String(s.to_string()))
    }
}

impl From<String> for Expression {
    fn from(s: String) -> Self {
        Expression::Constant(Value::String(s))
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Constant(v) => write!(f, "{}", v),
            Expression::Source { element_type, name } => {
                write!(f, "{}<{}>", name, element_type)
            }
            Expression::Parameter(p) => write!(f, "{}", p.name),
            Expression::Member { source, member } => write!(f, "{}.{}", source, member),
            Expression::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.sql_symbol(), right)
            }
            Expression::Unary { op, operand } => match op {
                UnaryOp::Not => write!(f, "NOT ({})", operand),
                UnaryOp::Neg => write!(f, "-({})", operand),
            },
            Expression::Call(call) => {
                write!(f, "{}.{}(", call.source, call.method)?;
                for (i, a) in call.arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            Expression::Lambda(l) => {
                write!(f, "(")?;
                for (i, p) in l.parameters.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p.name)?;
                }
                write!(f, ") => {}", l.body)
            }
            Expression::New { members } => {
                write!(f, "new {{ ")?;
                for (i, (name, e)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", name, e)?;
                }
                write!(f, " }}")
            }
            Expression::Reference(id) => write!(f, "[source #{}]", id.0),
            Expression::SubQuery(_) => write!(f, "[sub-query]"),
        }
    }
}
