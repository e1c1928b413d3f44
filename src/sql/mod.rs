//! The translation pipeline: query expression in, parameterized SQL out.

pub mod builder;
pub mod generate;
pub mod resolver;
pub mod statement;

#[cfg(test)]
mod tests;

use tracing::debug;

use crate::error::TranslateResult;
use crate::eval::evaluate_independent_subtrees;
use crate::expr::Queryable;
use crate::fmt;
use crate::idgen::UniqueIdentifierGenerator;
use crate::model::builder::QueryModelBuilder;
use crate::model::ClauseArena;
use crate::nodes::{NodeRegistry, ParseContext};
use crate::schema::DatabaseInfo;
use crate::sql::builder::SqlStatementBuilder;
use crate::sql::generate::{Dialect, SqlBatchBuilder, SqlCommand};
use crate::sql::resolver::MappingResolver;

/// Translate one query into a single SQL command.
///
/// # Example
/// ```
/// use relq::prelude::*;
///
/// let schema = SchemaMap::new().entity(
///     "Customer",
///     EntityMap::new("Customers").key("Id").column("Id", "Id").column("Name", "Name"),
/// );
/// let q = Queryable::source("Customer", "c")
///     .select(lambda("x", param("x").member("Name")));
/// let command = translate(&q, &schema, Dialect::SqlServer).unwrap();
/// assert_eq!(command.text, "SELECT [t0].[Name] FROM [Customers] AS [t0]");
/// ```
pub fn translate(
    query: &Queryable,
    schema: &dyn DatabaseInfo,
    dialect: Dialect,
) -> TranslateResult<SqlCommand> {
    let mut idgen = UniqueIdentifierGenerator::new();
    translate_with(query, schema, dialect, &mut idgen)
}

/// Translate a sequence of queries into one batch command, with table
/// aliases unique across the whole batch.
pub fn translate_batch(
    queries: &[Queryable],
    schema: &dyn DatabaseInfo,
    dialect: Dialect,
) -> TranslateResult<SqlCommand> {
    let mut idgen = UniqueIdentifierGenerator::new();
    let generator = dialect.generator();
    let mut batch = SqlBatchBuilder::new(generator.as_ref());
    for query in queries {
        batch.push(translate_with(query, schema, dialect, &mut idgen)?);
    }
    Ok(batch.finish())
}

fn translate_with(
    query: &Queryable,
    schema: &dyn DatabaseInfo,
    dialect: Dialect,
    idgen: &mut UniqueIdentifierGenerator,
) -> TranslateResult<SqlCommand> {
    let evaluated = evaluate_independent_subtrees(query.expression().clone());
    let registry = NodeRegistry::with_defaults();
    let ctx = ParseContext::for_expression(&evaluated);
    let node = registry.parse_chain(&evaluated, &ctx)?;

    let mut arena = ClauseArena::new();
    let model = QueryModelBuilder::new(&mut arena, &registry, &ctx).build(&node)?;
    debug!(model = %fmt::format_model(&model, &arena), "built query model");

    let statement = SqlStatementBuilder::new(&arena, idgen).build(&model)?;
    let statement = MappingResolver::new(schema, idgen).resolve(statement)?;
    let command = generate::generate(&statement, dialect)?;
    debug!(sql = %command.text, parameters = command.parameters.len(), "generated SQL");
    Ok(command)
}
