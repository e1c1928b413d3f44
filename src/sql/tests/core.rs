//! Lowering tests: query models become unresolved statements.

use pretty_assertions::assert_eq;

use crate::error::{TranslateError, TranslateResult};
use crate::eval::evaluate_independent_subtrees;
use crate::expr::{lambda, param, Queryable, Value};
use crate::idgen::UniqueIdentifierGenerator;
use crate::model::builder::QueryModelBuilder;
use crate::model::{ClauseArena, SetOperator};
use crate::nodes::{NodeRegistry, ParseContext};
use crate::sql::builder::SqlStatementBuilder;
use crate::sql::statement::{
    SelectList, SqlExpr, SqlFunction, SqlStatement, SqlTableSource, StatementForm,
};

fn lower(query: &Queryable) -> TranslateResult<SqlStatement> {
    let evaluated = evaluate_independent_subtrees(query.expression().clone());
    let registry = NodeRegistry::with_defaults();
    let ctx = ParseContext::for_expression(&evaluated);
    let node = registry.parse_chain(&evaluated, &ctx)?;
    let mut arena = ClauseArena::new();
    let model = QueryModelBuilder::new(&mut arena, &registry, &ctx).build(&node)?;
    let mut idgen = UniqueIdentifierGenerator::new();
    SqlStatementBuilder::new(&arena, &mut idgen).build(&model)
}

#[test]
fn test_take_and_skip_set_row_selection() {
    let statement = lower(&Queryable::source("T", "t").skip(2).take(3)).unwrap();
    assert_eq!(
        statement.row_selection.offset,
        Some(SqlExpr::Literal(Value::Int(2)))
    );
    assert_eq!(
        statement.row_selection.top,
        Some(SqlExpr::Literal(Value::Int(3)))
    );
}

#[test]
fn test_second_take_wraps_the_first() {
    let statement = lower(&Queryable::source("T", "t").take(3).take(2)).unwrap();
    assert_eq!(
        statement.row_selection.top,
        Some(SqlExpr::Literal(Value::Int(2)))
    );
    let SqlTableSource::Statement(inner) = &statement.tables[0].source else {
        panic!("expected the first limit to be pushed into a derived table");
    };
    assert_eq!(
        inner.row_selection.top,
        Some(SqlExpr::Literal(Value::Int(3)))
    );
}

#[test]
fn test_skip_after_take_wraps_the_limited_rows() {
    let statement = lower(&Queryable::source("T", "t").take(10).skip(20)).unwrap();
    assert_eq!(
        statement.row_selection.offset,
        Some(SqlExpr::Literal(Value::Int(20)))
    );
    assert_eq!(statement.row_selection.top, None);
    let SqlTableSource::Statement(inner) = &statement.tables[0].source else {
        panic!("expected the limited rows to become a derived table");
    };
    assert_eq!(
        inner.row_selection.top,
        Some(SqlExpr::Literal(Value::Int(10)))
    );
}

#[test]
fn test_distinct_after_take_wraps_the_limited_rows() {
    let statement = lower(&Queryable::source("T", "t").take(10).distinct()).unwrap();
    assert!(statement.distinct);
    assert_eq!(statement.row_selection.top, None);
    let SqlTableSource::Statement(inner) = &statement.tables[0].source else {
        panic!("expected the limited rows to become a derived table");
    };
    assert!(!inner.distinct);
    assert_eq!(
        inner.row_selection.top,
        Some(SqlExpr::Literal(Value::Int(10)))
    );
}

#[test]
fn test_take_after_set_operation_limits_the_combined_rows() {
    let q = Queryable::source("T", "t")
        .union(Queryable::source("U", "u"))
        .take(3);
    let statement = lower(&q).unwrap();
    assert_eq!(
        statement.row_selection.top,
        Some(SqlExpr::Literal(Value::Int(3)))
    );
    assert!(statement.set_operations.is_empty());
    let SqlTableSource::Statement(inner) = &statement.tables[0].source else {
        panic!("expected the combined rows to become a derived table");
    };
    assert_eq!(inner.set_operations.len(), 1);
}

#[test]
fn test_set_operation_after_take_keeps_the_limit_inside() {
    let q = Queryable::source("T", "t")
        .take(3)
        .union(Queryable::source("U", "u"));
    let statement = lower(&q).unwrap();
    assert_eq!(statement.row_selection.top, None);
    assert_eq!(statement.set_operations.len(), 1);
    let SqlTableSource::Statement(inner) = &statement.tables[0].source else {
        panic!("expected the limited rows to become a derived table");
    };
    assert_eq!(
        inner.row_selection.top,
        Some(SqlExpr::Literal(Value::Int(3)))
    );
}

#[test]
fn test_count_replaces_select_and_drops_orderings() {
    let q = Queryable::source("T", "t")
        .order_by(lambda("x", param("x").member("Name")))
        .count();
    let statement = lower(&q).unwrap();
    assert_eq!(statement.select, SelectList::Count { big: false });
    assert!(statement.orderings.is_empty());
    assert!(matches!(
        statement.tables[0].source,
        SqlTableSource::Entity(_)
    ));
}

#[test]
fn test_count_over_distinct_wraps() {
    let statement = lower(&Queryable::source("T", "t").distinct().count()).unwrap();
    assert_eq!(statement.select, SelectList::Count { big: false });
    let SqlTableSource::Statement(inner) = &statement.tables[0].source else {
        panic!("expected the distinct rows to become a derived table");
    };
    assert!(inner.distinct);
}

#[test]
fn test_any_sets_exists_form() {
    let statement = lower(&Queryable::source("T", "t").any()).unwrap();
    assert_eq!(statement.form, StatementForm::Exists { negated: false });
    assert!(statement.where_condition.is_none());
}

#[test]
fn test_all_negates_predicate_and_existence() {
    let q = Queryable::source("T", "t").all(lambda("x", param("x").member("Active")));
    let statement = lower(&q).unwrap();
    assert_eq!(statement.form, StatementForm::Exists { negated: true });
    assert!(matches!(
        statement.where_condition,
        Some(SqlExpr::Unary { .. })
    ));
}

#[test]
fn test_contains_sets_in_form() {
    let statement = lower(&Queryable::source("T", "t").contains("x")).unwrap();
    let StatementForm::In { item } = statement.form else {
        panic!("expected a membership form");
    };
    assert_eq!(*item, SqlExpr::Literal(Value::String("x".into())));
}

#[test]
fn test_operator_after_existence_test_is_rejected() {
    let err = lower(&Queryable::source("T", "t").any().count()).unwrap_err();
    assert!(matches!(err, TranslateError::NotSupported(_)));
    assert!(
        err.to_string().contains("existence"),
        "message was: {}",
        err
    );
}

#[test]
fn test_last_reverses_orderings_and_takes_one() {
    let q = Queryable::source("T", "t")
        .order_by(lambda("x", param("x").member("Name")))
        .last();
    let statement = lower(&q).unwrap();
    assert_eq!(
        statement.orderings[0].direction,
        crate::model::OrderingDirection::Desc
    );
    assert_eq!(
        statement.row_selection.top,
        Some(SqlExpr::Literal(Value::Int(1)))
    );
}

#[test]
fn test_last_without_ordering_is_rejected() {
    let err = lower(&Queryable::source("T", "t").last()).unwrap_err();
    assert!(err.to_string().contains("'Last'"), "message was: {}", err);
}

#[test]
fn test_single_takes_two_rows() {
    let statement = lower(&Queryable::source("T", "t").single()).unwrap();
    assert_eq!(
        statement.row_selection.top,
        Some(SqlExpr::Literal(Value::Int(2)))
    );
}

#[test]
fn test_string_method_lowers_to_function() {
    let q = Queryable::source("T", "t")
        .select(lambda("x", param("x").member("Name").invoke("ToUpper", vec![])));
    let statement = lower(&q).unwrap();
    let SelectList::Items(items) = &statement.select else {
        panic!("expected select items");
    };
    let SqlExpr::Call { function, .. } = &items[0].expression else {
        panic!("expected a function call");
    };
    assert_eq!(*function, SqlFunction::Upper);
}

#[test]
fn test_unknown_method_is_rejected() {
    let q = Queryable::source("T", "t")
        .select(lambda("x", param("x").member("Name").invoke("Reverse", vec![])));
    let err = lower(&q).unwrap_err();
    assert_eq!(
        err.to_string(),
        "The method 'Reverse' cannot be translated to SQL"
    );
}

#[test]
fn test_set_operation_becomes_an_arm() {
    let q = Queryable::source("T", "t").union(Queryable::source("U", "u"));
    let statement = lower(&q).unwrap();
    assert_eq!(statement.set_operations.len(), 1);
    assert_eq!(statement.set_operations[0].op, SetOperator::Union);
}

#[test]
fn test_cast_has_no_sql_footprint() {
    let plain = lower(&Queryable::source("T", "t")).unwrap();
    let cast = lower(&Queryable::source("T", "t").cast("U")).unwrap();
    assert_eq!(plain, cast);
}
