//! Mapping resolution: entity types to tables, members to columns and joins.
//!
//! Resolution walks a lowered statement against a [`DatabaseInfo`] and
//! replaces every abstract piece with its physical counterpart. Navigation
//! members create joins on the owning table through a de-duplicating
//! accessor, so traversing the same member twice reuses one join. Entity
//! values are split into their identity columns, with different column sets
//! for producing a value and for comparing two.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::error::{TranslateError, TranslateResult};
use crate::expr::{BinaryOp, TypeRef, Value};
use crate::idgen::UniqueIdentifierGenerator;
use crate::schema::{DatabaseInfo, IdentityColumn, MemberMapping, NavigationMapping};
use crate::sql::statement::{
    SelectItem, SelectList, SetStatement, SqlColumn, SqlEntity, SqlExpr, SqlJoinedTable,
    SqlStatement, SqlTable, SqlTableSource, StatementForm,
};

type Scope = HashMap<String, TypeRef>;

/// Why an entity value is being split into columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitPurpose {
    /// The value is produced (projected or passed); every identity column
    /// participates, with explicit nulls for absent positions.
    Produce,
    /// The value is compared; only columns flagged `in_comparison`
    /// participate.
    Compare,
}

/// Split an entity's identity values along its identity columns.
pub fn split_identity(
    identity: &[Value],
    columns: &[IdentityColumn],
    purpose: SplitPurpose,
) -> Vec<SqlExpr> {
    columns
        .iter()
        .enumerate()
        .filter(|(_, column)| purpose == SplitPurpose::Produce || column.in_comparison)
        .map(|(index, _)| {
            SqlExpr::Literal(identity.get(index).cloned().unwrap_or(Value::Null))
        })
        .collect()
}

/// Resolves one statement tree against a schema.
pub struct MappingResolver<'a> {
    schema: &'a dyn DatabaseInfo,
    idgen: &'a mut UniqueIdentifierGenerator,
}

impl<'a> MappingResolver<'a> {
    pub fn new(schema: &'a dyn DatabaseInfo, idgen: &'a mut UniqueIdentifierGenerator) -> Self {
        Self { schema, idgen }
    }

    pub fn resolve(&mut self, statement: SqlStatement) -> TranslateResult<SqlStatement> {
        self.resolve_statement(statement, &Scope::new())
    }

    fn resolve_statement(
        &mut self,
        mut statement: SqlStatement,
        outer: &Scope,
    ) -> TranslateResult<SqlStatement> {
        let mut scope = outer.clone();
        let mut correlations = Vec::new();

        // Sources first, in order, so later sources can enumerate earlier
        // items.
        for index in 0..statement.tables.len() {
            let alias = statement.tables[index].alias.clone();
            let source = statement.tables[index].source.clone();
            let (source, entity_type) = match source {
                SqlTableSource::Entity(entity_type) => {
                    let info = self.schema.resolve_table(&entity_type).ok_or_else(|| {
                        TranslateError::UnmappedTable(entity_type.name().to_string())
                    })?;
                    (SqlTableSource::Table(info.table_name), Some(entity_type))
                }
                SqlTableSource::Table(name) => (
                    SqlTableSource::Table(name),
                    statement.tables[index].entity_type.clone(),
                ),
                SqlTableSource::Collection(expression) => {
                    let (source, entity_type, mut conditions) =
                        self.resolve_collection(expression, &scope, &alias)?;
                    correlations.append(&mut conditions);
                    (source, entity_type)
                }
                SqlTableSource::Statement(inner) => {
                    let inner = self.resolve_statement(*inner, &scope)?;
                    (
                        SqlTableSource::Statement(Box::new(inner)),
                        statement.tables[index].entity_type.clone(),
                    )
                }
                SqlTableSource::Values(values) => (SqlTableSource::Values(values), None),
            };
            statement.tables[index].source = source;
            statement.tables[index].entity_type = entity_type.clone();
            if let Some(entity_type) = entity_type {
                scope.insert(alias, entity_type);
            }
        }

        let mut tables = std::mem::take(&mut statement.tables);

        statement.where_condition = match statement.where_condition.take() {
            Some(condition) => Some(self.resolve_expr(condition, &mut tables, &mut scope)?),
            None => None,
        };
        for condition in correlations {
            statement.and_where(condition);
        }

        statement.select = match statement.select {
            SelectList::Items(items) => SelectList::Items(
                items
                    .into_iter()
                    .map(|item| {
                        Ok(SelectItem {
                            expression: self.resolve_expr(
                                item.expression,
                                &mut tables,
                                &mut scope,
                            )?,
                            alias: item.alias,
                        })
                    })
                    .collect::<TranslateResult<_>>()?,
            ),
            count => count,
        };
        statement.group_by = match statement.group_by.take() {
            Some(key) => Some(self.resolve_expr(key, &mut tables, &mut scope)?),
            None => None,
        };
        for ordering in &mut statement.orderings {
            let expression =
                std::mem::replace(&mut ordering.expression, SqlExpr::Literal(Value::Null));
            ordering.expression = self.resolve_expr(expression, &mut tables, &mut scope)?;
        }
        statement.row_selection.top = match statement.row_selection.top.take() {
            Some(count) => Some(self.resolve_expr(count, &mut tables, &mut scope)?),
            None => None,
        };
        statement.row_selection.offset = match statement.row_selection.offset.take() {
            Some(count) => Some(self.resolve_expr(count, &mut tables, &mut scope)?),
            None => None,
        };
        statement.form = match statement.form {
            StatementForm::In { item } => StatementForm::In {
                item: Box::new(self.resolve_expr(*item, &mut tables, &mut scope)?),
            },
            form => form,
        };
        statement.tables = tables;

        statement.set_operations = statement
            .set_operations
            .into_iter()
            .map(|arm| {
                Ok(SetStatement {
                    op: arm.op,
                    statement: self.resolve_statement(arm.statement, outer)?,
                })
            })
            .collect::<TranslateResult<_>>()?;
        Ok(statement)
    }

    /// Resolve a collection table source. Only collection navigations off an
    /// in-scope item can be enumerated; the navigation becomes the target
    /// table plus correlation conditions on `self_alias`.
    fn resolve_collection(
        &mut self,
        expression: SqlExpr,
        scope: &Scope,
        self_alias: &str,
    ) -> TranslateResult<(SqlTableSource, Option<TypeRef>, Vec<SqlExpr>)> {
        let SqlExpr::Member { source, member } = expression else {
            return Err(TranslateError::not_supported(
                "only a navigation collection can be enumerated as a source",
            ));
        };
        let SqlExpr::TableRef(owner_alias) = *source else {
            return Err(TranslateError::not_supported(format!(
                "the collection '{}' must be reached directly from a query source",
                member
            )));
        };
        let owner_type = scope.get(&owner_alias).ok_or_else(|| {
            TranslateError::not_supported(format!(
                "the owner of collection '{}' is not in scope",
                member
            ))
        })?;
        match self.schema.resolve_member(owner_type, &member) {
            Some(MemberMapping::Navigation(nav)) if nav.many => {
                let info = self.schema.resolve_table(&nav.target_type).ok_or_else(|| {
                    TranslateError::UnmappedTable(nav.target_type.name().to_string())
                })?;
                let conditions = nav
                    .target_columns
                    .iter()
                    .zip(&nav.source_columns)
                    .map(|(target, source)| {
                        SqlExpr::column(self_alias, target.clone())
                            .eq(SqlExpr::column(owner_alias.clone(), source.clone()))
                    })
                    .collect();
                Ok((
                    SqlTableSource::Table(info.table_name),
                    Some(nav.target_type),
                    conditions,
                ))
            }
            Some(MemberMapping::Navigation(_)) => Err(TranslateError::not_supported(format!(
                "the navigation '{}' is not a collection",
                member
            ))),
            Some(MemberMapping::Column(_)) => Err(TranslateError::not_supported(format!(
                "the column member '{}' cannot be enumerated",
                member
            ))),
            None => Err(TranslateError::UnmappedMember {
                member,
                declaring_type: owner_type.name().to_string(),
            }),
        }
    }

    fn resolve_expr(
        &mut self,
        expression: SqlExpr,
        tables: &mut [SqlTable],
        scope: &mut Scope,
    ) -> TranslateResult<SqlExpr> {
        match expression {
            SqlExpr::Literal(Value::Entity {
                entity_type,
                identity,
            }) => {
                let entity_type = TypeRef::new(entity_type);
                let columns = self.schema.identity_columns(&entity_type);
                if columns.is_empty() {
                    return Err(TranslateError::not_supported(format!(
                        "The type '{}' has no identity columns",
                        entity_type.name()
                    )));
                }
                let mut values = split_identity(&identity, &columns, SplitPurpose::Produce);
                Ok(if values.len() == 1 {
                    values.remove(0)
                } else {
                    SqlExpr::Row(values)
                })
            }
            SqlExpr::Literal(value) => Ok(SqlExpr::Literal(value)),
            SqlExpr::Column(column) => Ok(SqlExpr::Column(column)),
            SqlExpr::Entity(entity) => Ok(SqlExpr::Entity(entity)),
            SqlExpr::TableRef(alias) => match scope.get(&alias) {
                Some(entity_type) => {
                    let columns = self
                        .schema
                        .columns_of(entity_type)
                        .into_iter()
                        .map(|c| c.column)
                        .collect();
                    Ok(SqlExpr::Entity(SqlEntity {
                        entity_type: entity_type.clone(),
                        alias,
                        columns,
                    }))
                }
                // A derived table's item; kept abstract for generation.
                None => Ok(SqlExpr::TableRef(alias)),
            },
            SqlExpr::Member { source, member } => {
                let source = self.resolve_expr(*source, tables, scope)?;
                self.resolve_member(source, &member, tables, scope)
            }
            SqlExpr::Row(items) => Ok(SqlExpr::Row(
                items
                    .into_iter()
                    .map(|item| self.resolve_expr(item, tables, scope))
                    .collect::<TranslateResult<_>>()?,
            )),
            SqlExpr::Unary { op, operand } => Ok(SqlExpr::Unary {
                op,
                operand: Box::new(self.resolve_expr(*operand, tables, scope)?),
            }),
            SqlExpr::Binary { op, left, right } => {
                let left = self.resolve_operand(*left, tables, scope)?;
                let right = self.resolve_operand(*right, tables, scope)?;
                if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
                    if let Some(expanded) = self.expand_identity_comparison(op, &left, &right)? {
                        return Ok(expanded);
                    }
                    if matches!(right, SqlExpr::Literal(Value::Null)) {
                        return Ok(SqlExpr::IsNull {
                            operand: Box::new(left),
                            negated: op == BinaryOp::Ne,
                        });
                    }
                    if matches!(left, SqlExpr::Literal(Value::Null)) {
                        return Ok(SqlExpr::IsNull {
                            operand: Box::new(right),
                            negated: op == BinaryOp::Ne,
                        });
                    }
                }
                Ok(SqlExpr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
            SqlExpr::IsNull { operand, negated } => Ok(SqlExpr::IsNull {
                operand: Box::new(self.resolve_expr(*operand, tables, scope)?),
                negated,
            }),
            SqlExpr::Call {
                function,
                arguments,
            } => Ok(SqlExpr::Call {
                function,
                arguments: arguments
                    .into_iter()
                    .map(|argument| self.resolve_expr(argument, tables, scope))
                    .collect::<TranslateResult<_>>()?,
            }),
            SqlExpr::Statement(inner) => Ok(SqlExpr::Statement(Box::new(
                self.resolve_statement(*inner, scope)?,
            ))),
        }
    }

    /// Comparison operands keep literals untouched so an entity constant can
    /// still be split with comparison semantics.
    fn resolve_operand(
        &mut self,
        expression: SqlExpr,
        tables: &mut [SqlTable],
        scope: &mut Scope,
    ) -> TranslateResult<SqlExpr> {
        if matches!(expression, SqlExpr::Literal(_)) {
            Ok(expression)
        } else {
            self.resolve_expr(expression, tables, scope)
        }
    }

    fn resolve_member(
        &mut self,
        source: SqlExpr,
        member: &str,
        tables: &mut [SqlTable],
        scope: &mut Scope,
    ) -> TranslateResult<SqlExpr> {
        match source {
            SqlExpr::Entity(entity) => {
                match self.schema.resolve_member(&entity.entity_type, member) {
                    Some(MemberMapping::Column(column)) => {
                        Ok(SqlExpr::column(entity.alias, column.column))
                    }
                    Some(MemberMapping::Navigation(nav)) if !nav.many => {
                        let alias = self.ensure_join(tables, &entity.alias, member, &nav)?;
                        scope.insert(alias.clone(), nav.target_type.clone());
                        let columns = self
                            .schema
                            .columns_of(&nav.target_type)
                            .into_iter()
                            .map(|c| c.column)
                            .collect();
                        Ok(SqlExpr::Entity(SqlEntity {
                            entity_type: nav.target_type,
                            alias,
                            columns,
                        }))
                    }
                    Some(MemberMapping::Navigation(_)) => {
                        Err(TranslateError::not_supported(format!(
                            "the collection navigation '{}' can only be enumerated in a sub-query",
                            member
                        )))
                    }
                    None => Err(TranslateError::UnmappedMember {
                        member: member.to_string(),
                        declaring_type: entity.entity_type.name().to_string(),
                    }),
                }
            }
            // A member of a derived table's item is one of its output
            // columns.
            SqlExpr::TableRef(alias) => Ok(SqlExpr::column(alias, member)),
            other => Err(TranslateError::not_supported(format!(
                "the member '{}' cannot be resolved on {:?}",
                member, other
            ))),
        }
    }

    /// Find or create the join for `member` on the table with `owner_alias`.
    /// At most one join exists per (owning table, member) pair.
    fn ensure_join(
        &mut self,
        tables: &mut [SqlTable],
        owner_alias: &str,
        member: &str,
        nav: &NavigationMapping,
    ) -> TranslateResult<String> {
        let info = self.schema.resolve_table(&nav.target_type).ok_or_else(|| {
            TranslateError::UnmappedTable(nav.target_type.name().to_string())
        })?;
        let Some(joins) = joins_of_mut(tables, owner_alias) else {
            return Err(TranslateError::not_supported(format!(
                "the navigation '{}' belongs to a source outside this statement",
                member
            )));
        };
        if let Some(existing) = joins.get(member) {
            return Ok(existing.alias.clone());
        }
        let alias = self.idgen.unique("t");
        let conditions = nav
            .target_columns
            .iter()
            .zip(&nav.source_columns)
            .map(|(target, source)| {
                (
                    SqlColumn {
                        table: alias.clone(),
                        column: target.clone(),
                    },
                    SqlColumn {
                        table: owner_alias.to_string(),
                        column: source.clone(),
                    },
                )
            })
            .collect();
        joins.insert(
            member.to_string(),
            SqlJoinedTable {
                alias: alias.clone(),
                entity_type: nav.target_type.clone(),
                table_name: info.table_name,
                conditions,
                left: nav.nullable,
                joins: IndexMap::new(),
            },
        );
        Ok(alias)
    }

    fn expand_identity_comparison(
        &mut self,
        op: BinaryOp,
        left: &SqlExpr,
        right: &SqlExpr,
    ) -> TranslateResult<Option<SqlExpr>> {
        // Entity against NULL tests the first comparison column.
        if let (SqlExpr::Entity(entity), SqlExpr::Literal(Value::Null))
        | (SqlExpr::Literal(Value::Null), SqlExpr::Entity(entity)) = (left, right)
        {
            let mut columns = self.entity_compare_columns(entity)?;
            return Ok(Some(SqlExpr::IsNull {
                operand: Box::new(columns.remove(0)),
                negated: op == BinaryOp::Ne,
            }));
        }

        let left_parts = self.comparison_parts(left)?;
        let right_parts = self.comparison_parts(right)?;
        let (left_parts, right_parts) = match (left_parts, right_parts) {
            (Some(l), Some(r)) => (l, r),
            (None, None) => return Ok(None),
            // One entity side is enough to force the split; the other side
            // must then split too.
            _ => {
                return Err(TranslateError::not_supported(
                    "an entity can only be compared against an entity value",
                ));
            }
        };
        if left_parts.len() != right_parts.len() {
            return Err(TranslateError::not_supported(
                "the compared entity identities have different shapes",
            ));
        }
        let mut pairs = left_parts
            .into_iter()
            .zip(right_parts)
            .map(|(l, r)| l.eq(r));
        let first = match pairs.next() {
            Some(first) => first,
            None => {
                return Err(TranslateError::not_supported(
                    "the compared entities have no comparison columns",
                ));
            }
        };
        let conjunction = pairs.fold(first, |acc, pair| acc.and(pair));
        Ok(Some(if op == BinaryOp::Ne {
            SqlExpr::Unary {
                op: crate::expr::UnaryOp::Not,
                operand: Box::new(conjunction),
            }
        } else {
            conjunction
        }))
    }

    /// The comparison column list of an operand, if it is entity-shaped.
    fn comparison_parts(&self, operand: &SqlExpr) -> TranslateResult<Option<Vec<SqlExpr>>> {
        match operand {
            SqlExpr::Entity(entity) => Ok(Some(self.entity_compare_columns(entity)?)),
            SqlExpr::Literal(Value::Entity {
                entity_type,
                identity,
            }) => {
                let entity_type = TypeRef::new(entity_type.clone());
                let columns = self.schema.identity_columns(&entity_type);
                if columns.is_empty() {
                    return Err(TranslateError::not_supported(format!(
                        "The type '{}' has no identity columns",
                        entity_type.name()
                    )));
                }
                Ok(Some(split_identity(
                    identity,
                    &columns,
                    SplitPurpose::Compare,
                )))
            }
            _ => Ok(None),
        }
    }

    fn entity_compare_columns(&self, entity: &SqlEntity) -> TranslateResult<Vec<SqlExpr>> {
        let columns: Vec<SqlExpr> = self
            .schema
            .identity_columns(&entity.entity_type)
            .into_iter()
            .filter(|column| column.in_comparison)
            .map(|column| SqlExpr::column(entity.alias.clone(), column.column))
            .collect();
        if columns.is_empty() {
            return Err(TranslateError::not_supported(format!(
                "The type '{}' has no comparison columns",
                entity.entity_type.name()
            )));
        }
        Ok(columns)
    }
}

/// Mutable access to the join map of the table with `alias`, searching
/// nested joins too.
fn joins_of_mut<'t>(
    tables: &'t mut [SqlTable],
    alias: &str,
) -> Option<&'t mut IndexMap<String, SqlJoinedTable>> {
    for table in tables {
        if table.alias == alias {
            return Some(&mut table.joins);
        }
        if let Some(found) = joins_of_joined(&mut table.joins, alias) {
            return Some(found);
        }
    }
    None
}

fn joins_of_joined<'t>(
    joins: &'t mut IndexMap<String, SqlJoinedTable>,
    alias: &str,
) -> Option<&'t mut IndexMap<String, SqlJoinedTable>> {
    for joined in joins.values_mut() {
        if joined.alias == alias {
            return Some(&mut joined.joins);
        }
        if let Some(found) = joins_of_joined(&mut joined.joins, alias) {
            return Some(found);
        }
    }
    None
}
