//! Lowering of query models into unresolved SQL statements.

use std::collections::HashMap;

use crate::error::{TranslateError, TranslateResult};
use crate::expr::{Expression, UnaryOp, Value};
use crate::idgen::UniqueIdentifierGenerator;
use crate::model::{
    BodyClause, ChoiceKind, ClauseArena, ClauseId, QueryModel, ResultOperator, SelectOrGroup,
    SourceClauseKind,
};
use crate::sql::statement::{
    RowSelection, SelectItem, SelectList, SqlExpr, SqlFunction, SqlOrdering, SqlStatement,
    SqlTable, SqlTableSource, StatementForm, SetStatement,
};

/// Maps a query model onto a statement, handing every from/join clause a
/// generated table alias.
pub struct SqlStatementBuilder<'a> {
    arena: &'a ClauseArena,
    idgen: &'a mut UniqueIdentifierGenerator,
    aliases: HashMap<ClauseId, String>,
}

impl<'a> SqlStatementBuilder<'a> {
    pub fn new(arena: &'a ClauseArena, idgen: &'a mut UniqueIdentifierGenerator) -> Self {
        Self {
            arena,
            idgen,
            aliases: HashMap::new(),
        }
    }

    pub fn build(&mut self, model: &QueryModel) -> TranslateResult<SqlStatement> {
        let mut statement = SqlStatement::new();
        self.add_table(&mut statement, model.main_from)?;

        for clause in &model.body_clauses {
            match clause {
                BodyClause::Where(w) => {
                    let condition = self.lower(&w.predicate)?;
                    statement.and_where(condition);
                }
                BodyClause::AdditionalFrom(id) => self.add_table(&mut statement, *id)?,
                BodyClause::Join(id) => {
                    self.add_table(&mut statement, *id)?;
                    match &self.arena.get(*id).kind {
                        SourceClauseKind::Join {
                            outer_key,
                            inner_key,
                        }
                        | SourceClauseKind::GroupJoin {
                            outer_key,
                            inner_key,
                        } => {
                            let condition =
                                self.lower(outer_key)?.eq(self.lower(inner_key)?);
                            statement.and_where(condition);
                        }
                        _ => {}
                    }
                }
                BodyClause::OrderBy(clause) => {
                    for ordering in &clause.orderings {
                        statement.orderings.push(SqlOrdering {
                            expression: self.lower(&ordering.expression)?,
                            direction: ordering.direction,
                        });
                    }
                }
            }
        }

        match &model.select {
            SelectOrGroup::Select(select) => {
                statement.select = self.lower_select(&select.selector)?;
            }
            SelectOrGroup::Group(group) => {
                let key = self.lower(&group.key_selector)?;
                statement.group_by = Some(key.clone());
                statement.select = SelectList::Items(vec![SelectItem {
                    expression: key,
                    alias: None,
                }]);
            }
        }

        for operator in &model.result_operators {
            statement = self.apply_operator(statement, operator)?;
        }
        Ok(statement)
    }

    fn add_table(&mut self, statement: &mut SqlStatement, id: ClauseId) -> TranslateResult<()> {
        let clause = self.arena.get(id);
        let alias = self.idgen.unique("t");
        self.aliases.insert(id, alias.clone());
        let source = match &clause.source {
            Expression::Source { element_type, .. } => {
                SqlTableSource::Entity(element_type.clone())
            }
            Expression::SubQuery(model) => {
                SqlTableSource::Statement(Box::new(self.build(model)?))
            }
            Expression::Constant(Value::List(values)) => {
                SqlTableSource::Values(values.clone())
            }
            other => SqlTableSource::Collection(self.lower(other)?),
        };
        statement.tables.push(SqlTable {
            alias,
            entity_type: clause.item_type.clone(),
            source,
            joins: Default::default(),
        });
        Ok(())
    }

    fn alias_of(&self, id: ClauseId) -> TranslateResult<String> {
        self.aliases.get(&id).cloned().ok_or_else(|| {
            TranslateError::not_supported(
                "a source reference crosses out of the statement being built",
            )
        })
    }

    fn lower_select(&mut self, selector: &Expression) -> TranslateResult<SelectList> {
        match selector {
            Expression::New { members } => {
                let items = members
                    .iter()
                    .map(|(name, expression)| {
                        Ok(SelectItem {
                            expression: self.lower(expression)?,
                            alias: Some(name.clone()),
                        })
                    })
                    .collect::<TranslateResult<_>>()?;
                Ok(SelectList::Items(items))
            }
            other => Ok(SelectList::Items(vec![SelectItem {
                expression: self.lower(other)?,
                alias: None,
            }])),
        }
    }

    fn lower(&mut self, expression: &Expression) -> TranslateResult<SqlExpr> {
        match expression {
            Expression::Constant(value) => Ok(SqlExpr::Literal(value.clone())),
            Expression::Reference(id) => Ok(SqlExpr::TableRef(self.alias_of(*id)?)),
            Expression::Member { source, member } => Ok(SqlExpr::Member {
                source: Box::new(self.lower(source)?),
                member: member.clone(),
            }),
            Expression::Binary { op, left, right } => Ok(SqlExpr::Binary {
                op: *op,
                left: Box::new(self.lower(left)?),
                right: Box::new(self.lower(right)?),
            }),
            Expression::Unary { op, operand } => Ok(SqlExpr::Unary {
                op: *op,
                operand: Box::new(self.lower(operand)?),
            }),
            Expression::SubQuery(model) => {
                Ok(SqlExpr::Statement(Box::new(self.build(model)?)))
            }
            Expression::New { members } => Ok(SqlExpr::Row(
                members
                    .iter()
                    .map(|(_, e)| self.lower(e))
                    .collect::<TranslateResult<_>>()?,
            )),
            Expression::Call(call) => {
                let function = match call.method.as_str() {
                    "ToUpper" => SqlFunction::Upper,
                    "ToLower" => SqlFunction::Lower,
                    "Trim" => SqlFunction::Trim,
                    "Length" => SqlFunction::Length,
                    other => {
                        return Err(TranslateError::not_supported(format!(
                            "The method '{}' cannot be translated to SQL",
                            other
                        )));
                    }
                };
                let mut arguments = vec![self.lower(&call.source)?];
                for argument in &call.arguments {
                    arguments.push(self.lower(argument)?);
                }
                Ok(SqlExpr::Call {
                    function,
                    arguments,
                })
            }
            Expression::Source { element_type, .. } => Err(TranslateError::not_supported(
                format!(
                    "The source '{}' cannot appear as a value",
                    element_type.name()
                ),
            )),
            Expression::Parameter(p) => Err(TranslateError::not_supported(format!(
                "The parameter '{}' was not substituted before lowering",
                p.name
            ))),
            Expression::Lambda(_) => Err(TranslateError::not_supported(
                "A lambda cannot appear as a value",
            )),
        }
    }

    fn apply_operator(
        &mut self,
        statement: SqlStatement,
        operator: &ResultOperator,
    ) -> TranslateResult<SqlStatement> {
        match operator {
            // Operators apply in append order; a slot that would render
            // before an already-populated one pushes the statement into a
            // derived table first.
            ResultOperator::Distinct => {
                let mut statement = self.rows_only(statement)?;
                if statement.row_selection != RowSelection::default()
                    || !statement.set_operations.is_empty()
                {
                    statement = self.wrap(statement);
                }
                statement.distinct = true;
                Ok(statement)
            }
            ResultOperator::Take(count) => {
                let mut statement = self.rows_only(statement)?;
                if statement.row_selection.top.is_some()
                    || !statement.set_operations.is_empty()
                {
                    statement = self.wrap(statement);
                }
                statement.row_selection.top = Some(self.lower(count)?);
                Ok(statement)
            }
            ResultOperator::Skip(count) => {
                let mut statement = self.rows_only(statement)?;
                if statement.row_selection != RowSelection::default()
                    || !statement.set_operations.is_empty()
                {
                    statement = self.wrap(statement);
                }
                statement.row_selection.offset = Some(self.lower(count)?);
                Ok(statement)
            }
            // Re-typing the element has no SQL footprint.
            ResultOperator::Cast(_) => Ok(statement),
            ResultOperator::Count | ResultOperator::LongCount => {
                let mut statement = self.rows_only(statement)?;
                let needs_wrap = statement.distinct
                    || statement.row_selection != RowSelection::default()
                    || !statement.set_operations.is_empty();
                if needs_wrap {
                    statement = self.wrap(statement);
                }
                statement.select = SelectList::Count {
                    big: matches!(operator, ResultOperator::LongCount),
                };
                statement.orderings.clear();
                Ok(statement)
            }
            ResultOperator::Any { predicate } => {
                let mut statement = self.rows_only(statement)?;
                if let Some(predicate) = predicate {
                    let condition = self.lower(predicate)?;
                    statement.and_where(condition);
                }
                statement.orderings.clear();
                statement.form = StatementForm::Exists { negated: false };
                Ok(statement)
            }
            ResultOperator::All { predicate } => {
                let mut statement = self.rows_only(statement)?;
                let condition = self.lower(predicate)?;
                statement.and_where(SqlExpr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(condition),
                });
                statement.orderings.clear();
                statement.form = StatementForm::Exists { negated: true };
                Ok(statement)
            }
            ResultOperator::Contains { item } => {
                let mut statement = self.rows_only(statement)?;
                let item = self.lower(item)?;
                statement.orderings.clear();
                statement.form = StatementForm::In {
                    item: Box::new(item),
                };
                Ok(statement)
            }
            ResultOperator::SetOperation { op, other } => {
                let mut statement = self.rows_only(statement)?;
                // A row limit belongs to this side alone, not the first arm
                // of the combined text.
                if statement.row_selection != RowSelection::default() {
                    statement = self.wrap(statement);
                }
                let other = self.build(other)?;
                statement.set_operations.push(SetStatement {
                    op: *op,
                    statement: other,
                });
                Ok(statement)
            }
            ResultOperator::Choice { kind, .. } => {
                let mut statement = self.rows_only(statement)?;
                match kind {
                    ChoiceKind::First => {
                        statement.row_selection.top = Some(SqlExpr::Literal(Value::Int(1)));
                    }
                    // Two rows are enough to tell a unique result from an
                    // ambiguous one.
                    ChoiceKind::Single => {
                        statement.row_selection.top = Some(SqlExpr::Literal(Value::Int(2)));
                    }
                    ChoiceKind::Last => {
                        if statement.orderings.is_empty() {
                            return Err(TranslateError::not_supported(
                                "'Last' requires an explicit ordering",
                            ));
                        }
                        for ordering in &mut statement.orderings {
                            ordering.direction = ordering.direction.reversed();
                        }
                        statement.row_selection.top = Some(SqlExpr::Literal(Value::Int(1)));
                    }
                }
                Ok(statement)
            }
        }
    }

    /// Operators compose over row results only; a boolean-shaped statement
    /// cannot take further operators.
    fn rows_only(&self, statement: SqlStatement) -> TranslateResult<SqlStatement> {
        if statement.form == StatementForm::Rows {
            Ok(statement)
        } else {
            Err(TranslateError::not_supported(
                "no further operator can follow an existence or membership test",
            ))
        }
    }

    /// Push the statement down into a derived table of a fresh one.
    fn wrap(&mut self, statement: SqlStatement) -> SqlStatement {
        let alias = self.idgen.unique("q");
        let mut outer = SqlStatement::new();
        outer.select = SelectList::Items(vec![SelectItem {
            expression: SqlExpr::TableRef(alias.clone()),
            alias: None,
        }]);
        outer.tables.push(SqlTable::new(
            alias,
            SqlTableSource::Statement(Box::new(statement)),
        ));
        outer
    }
}
