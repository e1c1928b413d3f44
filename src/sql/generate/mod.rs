//! SQL text generation from resolved statements.
//!
//! Rendering keeps two registers apart: boolean positions (WHERE, ON, CASE
//! conditions) and value positions (select items, operands). A bare column
//! in a boolean position compares against the dialect's true literal; a
//! boolean expression in a value position wraps into a CASE expression.
//! Every literal becomes an ordered parameter, except NULL, booleans, and
//! row-limit counts, which render inline.

pub mod dialect;

pub use dialect::{Dialect, SqlDialect};

use serde::{Deserialize, Serialize};

use crate::error::{TranslateError, TranslateResult};
use crate::expr::{UnaryOp, Value};
use crate::sql::statement::{
    SelectList, SqlExpr, SqlFunction, SqlJoinedTable, SqlStatement, SqlTable, SqlTableSource,
    StatementForm,
};

/// The finished product: parameterized SQL text plus its values in
/// placeholder order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlCommand {
    pub text: String,
    pub parameters: Vec<Value>,
}

/// Collects parameter values in the order their placeholders are issued.
#[derive(Debug, Default)]
pub struct ParamContext {
    values: Vec<Value>,
}

impl ParamContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: Value, dialect: &dyn SqlDialect) -> String {
        self.values.push(value);
        dialect.placeholder(self.values.len())
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Render a resolved statement.
pub fn generate(statement: &SqlStatement, dialect: Dialect) -> TranslateResult<SqlCommand> {
    let dialect = dialect.generator();
    let mut generator = SqlTextGenerator {
        dialect: dialect.as_ref(),
        params: ParamContext::new(),
    };
    let text = generator.render_root(statement)?;
    Ok(SqlCommand {
        text,
        parameters: generator.params.into_values(),
    })
}

struct SqlTextGenerator<'a> {
    dialect: &'a dyn SqlDialect,
    params: ParamContext,
}

impl SqlTextGenerator<'_> {
    fn render_root(&mut self, statement: &SqlStatement) -> TranslateResult<String> {
        match &statement.form {
            StatementForm::Rows => self.render_rows(statement),
            StatementForm::Exists { negated } => Ok(format!(
                "SELECT CASE WHEN {} THEN 1 ELSE 0 END",
                self.exists_fragment(statement, *negated)?
            )),
            StatementForm::In { item } => Ok(format!(
                "SELECT CASE WHEN {} THEN 1 ELSE 0 END",
                self.in_fragment(statement, item)?
            )),
        }
    }

    fn render_rows(&mut self, statement: &SqlStatement) -> TranslateResult<String> {
        let mut sql = String::from("SELECT ");
        if statement.distinct {
            sql.push_str("DISTINCT ");
        }
        if self.dialect.uses_top() && statement.row_selection.offset.is_none() {
            if let Some(top) = &statement.row_selection.top {
                sql.push_str(&format!("TOP({}) ", self.render_count(top)?));
            }
        }
        sql.push_str(&self.render_select_list(&statement.select)?);

        if !statement.tables.is_empty() {
            sql.push_str(" FROM ");
            let tables = statement
                .tables
                .iter()
                .map(|table| self.render_table(table))
                .collect::<TranslateResult<Vec<_>>>()?;
            sql.push_str(&tables.join(", "));
        }

        if let Some(condition) = &statement.where_condition {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render_condition(condition)?);
        }
        if let Some(key) = &statement.group_by {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.render_group_key(key)?);
        }
        if !statement.orderings.is_empty() {
            sql.push_str(" ORDER BY ");
            let orderings = statement
                .orderings
                .iter()
                .map(|ordering| {
                    Ok(format!(
                        "{} {}",
                        self.render_value(&ordering.expression)?,
                        ordering.direction.keyword()
                    ))
                })
                .collect::<TranslateResult<Vec<_>>>()?;
            sql.push_str(&orderings.join(", "));
        }

        if self.dialect.uses_top() {
            if let Some(offset) = &statement.row_selection.offset {
                if statement.orderings.is_empty() {
                    return Err(TranslateError::not_supported(
                        "'Skip' requires an explicit ordering",
                    ));
                }
                sql.push_str(&format!(" OFFSET {} ROWS", self.render_count(offset)?));
                if let Some(top) = &statement.row_selection.top {
                    sql.push_str(&format!(
                        " FETCH NEXT {} ROWS ONLY",
                        self.render_count(top)?
                    ));
                }
            }
        } else {
            if let Some(top) = &statement.row_selection.top {
                sql.push_str(&format!(" LIMIT {}", self.render_count(top)?));
            }
            if let Some(offset) = &statement.row_selection.offset {
                sql.push_str(&format!(" OFFSET {}", self.render_count(offset)?));
            }
        }

        for arm in &statement.set_operations {
            sql.push_str(&format!(
                " {} {}",
                arm.op.keyword(),
                self.render_rows(&arm.statement)?
            ));
        }
        Ok(sql)
    }

    fn render_select_list(&mut self, select: &SelectList) -> TranslateResult<String> {
        match select {
            SelectList::Count { big } => {
                let function = if *big {
                    self.dialect.count_big_function()
                } else {
                    "COUNT"
                };
                Ok(format!("{}(*)", function))
            }
            SelectList::Items(items) => {
                let mut fragments = Vec::new();
                for item in items {
                    match &item.expression {
                        // A whole entity expands to its column list.
                        SqlExpr::Entity(entity) if !entity.columns.is_empty() => {
                            for column in &entity.columns {
                                fragments.push(format!(
                                    "{}.{}",
                                    self.dialect.quote(&entity.alias),
                                    self.dialect.quote(column)
                                ));
                            }
                        }
                        expression => {
                            let mut fragment = self.render_value(expression)?;
                            if let Some(alias) = &item.alias {
                                fragment.push_str(" AS ");
                                fragment.push_str(&self.dialect.quote(alias));
                            }
                            fragments.push(fragment);
                        }
                    }
                }
                if fragments.is_empty() {
                    Ok("*".to_string())
                } else {
                    Ok(fragments.join(", "))
                }
            }
        }
    }

    fn render_group_key(&mut self, key: &SqlExpr) -> TranslateResult<String> {
        match key {
            SqlExpr::Row(items) => {
                let items = items
                    .iter()
                    .map(|item| self.render_value(item))
                    .collect::<TranslateResult<Vec<_>>>()?;
                Ok(items.join(", "))
            }
            other => self.render_value(other),
        }
    }

    fn render_table(&mut self, table: &SqlTable) -> TranslateResult<String> {
        let mut text = match &table.source {
            SqlTableSource::Table(name) => format!(
                "{} AS {}",
                self.dialect.quote(name),
                self.dialect.quote(&table.alias)
            ),
            SqlTableSource::Statement(inner) => format!(
                "({}) AS {}",
                self.render_rows(inner)?,
                self.dialect.quote(&table.alias)
            ),
            SqlTableSource::Values(_) => {
                return Err(TranslateError::not_supported(
                    "a constant list can only appear under a membership test",
                ));
            }
            SqlTableSource::Entity(_) | SqlTableSource::Collection(_) => {
                return Err(TranslateError::not_supported(
                    "an unresolved table source reached SQL generation",
                ));
            }
        };
        self.append_joins(&mut text, &table.joins)?;
        Ok(text)
    }

    fn append_joins(
        &mut self,
        text: &mut String,
        joins: &indexmap::IndexMap<String, SqlJoinedTable>,
    ) -> TranslateResult<()> {
        for joined in joins.values() {
            let kind = if joined.left { "LEFT JOIN" } else { "INNER JOIN" };
            let conditions = joined
                .conditions
                .iter()
                .map(|(target, source)| {
                    format!(
                        "{}.{} = {}.{}",
                        self.dialect.quote(&target.table),
                        self.dialect.quote(&target.column),
                        self.dialect.quote(&source.table),
                        self.dialect.quote(&source.column)
                    )
                })
                .collect::<Vec<_>>()
                .join(" AND ");
            text.push_str(&format!(
                " {} {} AS {} ON {}",
                kind,
                self.dialect.quote(&joined.table_name),
                self.dialect.quote(&joined.alias),
                conditions
            ));
            self.append_joins(text, &joined.joins)?;
        }
        Ok(())
    }

    fn render_condition(&mut self, expression: &SqlExpr) -> TranslateResult<String> {
        match expression {
            SqlExpr::Binary { op, left, right } if op.is_logical() => Ok(format!(
                "({} {} {})",
                self.render_condition(left)?,
                op.sql_symbol(),
                self.render_condition(right)?
            )),
            SqlExpr::Binary { op, left, right } if op.is_comparison() => Ok(format!(
                "{} {} {}",
                self.render_value(left)?,
                op.sql_symbol(),
                self.render_value(right)?
            )),
            SqlExpr::Unary {
                op: UnaryOp::Not,
                operand,
            } => Ok(format!("NOT ({})", self.render_condition(operand)?)),
            SqlExpr::IsNull { operand, negated } => Ok(format!(
                "{} IS {}NULL",
                self.render_value(operand)?,
                if *negated { "NOT " } else { "" }
            )),
            SqlExpr::Statement(inner) => match &inner.form {
                StatementForm::Exists { negated } => self.exists_fragment(inner, *negated),
                StatementForm::In { item } => self.in_fragment(inner, item),
                StatementForm::Rows => Ok(format!(
                    "({}) = {}",
                    self.render_rows(inner)?,
                    self.dialect.bool_literal(true)
                )),
            },
            SqlExpr::Literal(Value::Bool(value)) => Ok(format!(
                "{} = {}",
                self.dialect.bool_literal(*value),
                self.dialect.bool_literal(true)
            )),
            other => Ok(format!(
                "{} = {}",
                self.render_value(other)?,
                self.dialect.bool_literal(true)
            )),
        }
    }

    fn render_value(&mut self, expression: &SqlExpr) -> TranslateResult<String> {
        match expression {
            SqlExpr::Literal(Value::Null) => Ok("NULL".to_string()),
            SqlExpr::Literal(Value::Bool(value)) => {
                Ok(self.dialect.bool_literal(*value).to_string())
            }
            SqlExpr::Literal(Value::Entity { entity_type, .. }) => {
                Err(TranslateError::not_supported(format!(
                    "an unresolved '{}' value reached SQL generation",
                    entity_type
                )))
            }
            SqlExpr::Literal(value) => Ok(self.params.add(value.clone(), self.dialect)),
            SqlExpr::Column(column) => Ok(format!(
                "{}.{}",
                self.dialect.quote(&column.table),
                self.dialect.quote(&column.column)
            )),
            SqlExpr::TableRef(alias) => Ok(format!("{}.*", self.dialect.quote(alias))),
            SqlExpr::Entity(entity) => {
                if entity.columns.is_empty() {
                    Ok(format!("{}.*", self.dialect.quote(&entity.alias)))
                } else {
                    let columns = entity
                        .columns
                        .iter()
                        .map(|column| {
                            format!(
                                "{}.{}",
                                self.dialect.quote(&entity.alias),
                                self.dialect.quote(column)
                            )
                        })
                        .collect::<Vec<_>>();
                    Ok(columns.join(", "))
                }
            }
            SqlExpr::Row(items) => {
                let items = items
                    .iter()
                    .map(|item| self.render_value(item))
                    .collect::<TranslateResult<Vec<_>>>()?;
                Ok(format!("({})", items.join(", ")))
            }
            SqlExpr::Unary {
                op: UnaryOp::Neg,
                operand,
            } => Ok(format!("-({})", self.render_value(operand)?)),
            SqlExpr::Unary {
                op: UnaryOp::Not, ..
            }
            | SqlExpr::IsNull { .. } => Ok(format!(
                "CASE WHEN {} THEN 1 ELSE 0 END",
                self.render_condition(expression)?
            )),
            SqlExpr::Binary { op, left, right } => {
                if op.is_comparison() || op.is_logical() {
                    Ok(format!(
                        "CASE WHEN {} THEN 1 ELSE 0 END",
                        self.render_condition(expression)?
                    ))
                } else {
                    Ok(format!(
                        "({} {} {})",
                        self.render_value(left)?,
                        op.sql_symbol(),
                        self.render_value(right)?
                    ))
                }
            }
            SqlExpr::Call {
                function,
                arguments,
            } => {
                let argument = arguments
                    .first()
                    .map(|argument| self.render_value(argument))
                    .transpose()?
                    .unwrap_or_default();
                Ok(match function {
                    SqlFunction::Upper => format!("UPPER({})", argument),
                    SqlFunction::Lower => format!("LOWER({})", argument),
                    SqlFunction::Trim => format!("TRIM({})", argument),
                    SqlFunction::Length => {
                        format!("{}({})", self.dialect.length_function(), argument)
                    }
                })
            }
            SqlExpr::Statement(inner) => match &inner.form {
                StatementForm::Rows => Ok(format!("({})", self.render_rows(inner)?)),
                _ => Ok(format!(
                    "CASE WHEN {} THEN 1 ELSE 0 END",
                    self.render_condition(expression)?
                )),
            },
            SqlExpr::Member { member, .. } => Err(TranslateError::not_supported(format!(
                "the unresolved member '{}' reached SQL generation",
                member
            ))),
        }
    }

    /// Row-limit counts render inline when constant.
    fn render_count(&mut self, count: &SqlExpr) -> TranslateResult<String> {
        match count {
            SqlExpr::Literal(Value::Int(count)) => Ok(count.to_string()),
            other => self.render_value(other),
        }
    }

    fn exists_fragment(
        &mut self,
        statement: &SqlStatement,
        negated: bool,
    ) -> TranslateResult<String> {
        Ok(format!(
            "{}EXISTS ({})",
            if negated { "NOT " } else { "" },
            self.render_rows(statement)?
        ))
    }

    fn in_fragment(
        &mut self,
        statement: &SqlStatement,
        item: &SqlExpr,
    ) -> TranslateResult<String> {
        let item = self.render_value(item)?;
        // A single constant-list source renders its values inline as
        // parameters instead of a sub-select.
        if let [table] = statement.tables.as_slice() {
            if let SqlTableSource::Values(values) = &table.source {
                let values = values
                    .iter()
                    .map(|value| self.render_value(&SqlExpr::Literal(value.clone())))
                    .collect::<TranslateResult<Vec<_>>>()?;
                return Ok(format!("{} IN ({})", item, values.join(", ")));
            }
        }
        Ok(format!("{} IN ({})", item, self.render_rows(statement)?))
    }
}

/// Joins rendered commands into one batch, separated by the dialect's batch
/// separator. Consecutive separators are never emitted.
pub struct SqlBatchBuilder {
    separator: String,
    text: String,
    parameters: Vec<Value>,
    last_was_separator: bool,
}

impl SqlBatchBuilder {
    pub fn new(dialect: &dyn SqlDialect) -> Self {
        Self {
            separator: dialect.batch_separator().to_string(),
            text: String::new(),
            parameters: Vec::new(),
            last_was_separator: false,
        }
    }

    pub fn push(&mut self, command: SqlCommand) {
        if !self.text.is_empty() {
            self.push_separator();
        }
        if !command.text.is_empty() {
            self.text.push_str(&command.text);
            self.last_was_separator = command.text.trim_end().ends_with(&self.separator);
        }
        self.parameters.extend(command.parameters);
    }

    fn push_separator(&mut self) {
        if !self.text.ends_with('\n') {
            self.text.push('\n');
        }
        if self.last_was_separator {
            return;
        }
        self.text.push_str(&self.separator);
        self.text.push('\n');
        self.last_was_separator = true;
    }

    pub fn finish(self) -> SqlCommand {
        SqlCommand {
            text: self.text,
            parameters: self.parameters,
        }
    }
}
