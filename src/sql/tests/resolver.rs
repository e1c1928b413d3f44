//! Mapping resolution tests: tables, columns, joins, identity splitting.

use pretty_assertions::assert_eq;

use super::store_schema;
use crate::error::TranslateError;
use crate::expr::{lambda, lambda2, param, Expression, Queryable, Value};
use crate::schema::{EntityMap, IdentityColumn, SchemaMap};
use crate::sql::generate::Dialect;
use crate::sql::resolver::{split_identity, SplitPurpose};
use crate::sql::translate;

fn sql(query: &Queryable) -> String {
    translate(query, &store_schema(), Dialect::SqlServer)
        .unwrap()
        .text
}

#[test]
fn test_entity_source_maps_to_its_table() {
    let q = Queryable::source("Customer", "c");
    assert_eq!(
        sql(&q),
        "SELECT [t0].[Id], [t0].[Name], [t0].[Active] FROM [Customers] AS [t0]"
    );
}

#[test]
fn test_member_maps_to_its_column() {
    let q = Queryable::source("Customer", "c").select(lambda("c", param("c").member("Name")));
    assert_eq!(sql(&q), "SELECT [t0].[Name] FROM [Customers] AS [t0]");
}

#[test]
fn test_unmapped_entity_type_is_reported() {
    let q = Queryable::source("Ghost", "g");
    let err = translate(&q, &store_schema(), Dialect::SqlServer).unwrap_err();
    assert!(matches!(err, TranslateError::UnmappedTable(_)));
    assert_eq!(err.to_string(), "The type 'Ghost' has no table mapping");
}

#[test]
fn test_unmapped_member_names_member_and_type() {
    let q = Queryable::source("Customer", "c")
        .select(lambda("c", param("c").member("Nickname")));
    let err = translate(&q, &store_schema(), Dialect::SqlServer).unwrap_err();
    let TranslateError::UnmappedMember {
        member,
        declaring_type,
    } = err
    else {
        panic!("expected an unmapped member error");
    };
    assert_eq!(member, "Nickname");
    assert_eq!(declaring_type, "Customer");
}

#[test]
fn test_single_navigation_creates_an_inner_join() {
    let q = Queryable::source("Customer", "c")
        .filter(lambda("c", param("c").member("Region").member("Name").eq("West")))
        .select(lambda("c", param("c").member("Name")));
    assert_eq!(
        sql(&q),
        "SELECT [t0].[Name] FROM [Customers] AS [t0] \
         INNER JOIN [Regions] AS [t1] ON [t1].[Id] = [t0].[RegionId] \
         WHERE [t1].[Name] = @p1"
    );
}

#[test]
fn test_nullable_navigation_uses_a_left_join() {
    let q = Queryable::source("Order", "o")
        .select(lambda("o", param("o").member("Customer").member("Name")));
    assert_eq!(
        sql(&q),
        "SELECT [t1].[Name] FROM [Orders] AS [t0] \
         LEFT JOIN [Customers] AS [t1] ON [t1].[Id] = [t0].[CustomerId]"
    );
}

#[test]
fn test_repeated_navigation_member_reuses_one_join() {
    let q = Queryable::source("Customer", "c")
        .filter(lambda("c", param("c").member("Region").member("Name").eq("West")))
        .order_by(lambda("c", param("c").member("Region").member("Id")))
        .select(lambda("c", param("c").member("Name")));
    let text = sql(&q);
    assert_eq!(
        text,
        "SELECT [t0].[Name] FROM [Customers] AS [t0] \
         INNER JOIN [Regions] AS [t1] ON [t1].[Id] = [t0].[RegionId] \
         WHERE [t1].[Name] = @p1 ORDER BY [t1].[Id] ASC"
    );
    assert_eq!(text.matches("JOIN").count(), 1);
}

#[test]
fn test_collection_navigation_enumerates_with_correlation() {
    let q = Queryable::source("Customer", "c")
        .select_many(
            lambda("c", param("c").member("Orders")),
            lambda2("c", "o", param("o")),
        )
        .select(lambda("o", param("o").member("Total")));
    assert_eq!(
        sql(&q),
        "SELECT [t1].[Total] FROM [Customers] AS [t0], [Orders] AS [t1] \
         WHERE [t1].[CustomerId] = [t0].[Id]"
    );
}

#[test]
fn test_select_many_result_selector_is_the_projection() {
    let q = Queryable::source("Customer", "c").select_many(
        lambda("c", param("c").member("Orders")),
        lambda2("c", "o", param("o").member("Total")),
    );
    assert_eq!(
        sql(&q),
        "SELECT [t1].[Total] FROM [Customers] AS [t0], [Orders] AS [t1] \
         WHERE [t1].[CustomerId] = [t0].[Id]"
    );
}

#[test]
fn test_correlated_sub_query_references_the_outer_source() {
    let q = Queryable::source("Customer", "c")
        .filter(lambda(
            "c",
            Queryable::from_expression(param("c").member("Orders"))
                .any()
                .into_expression(),
        ))
        .select(lambda("c", param("c").member("Name")));
    assert_eq!(
        sql(&q),
        "SELECT [t0].[Name] FROM [Customers] AS [t0] \
         WHERE EXISTS (SELECT [t1].[Id], [t1].[CustomerId], [t1].[Total] \
         FROM [Orders] AS [t1] WHERE [t1].[CustomerId] = [t0].[Id])"
    );
}

#[test]
fn test_entity_comparison_expands_to_identity_columns() {
    let customer = Expression::Constant(Value::Entity {
        entity_type: "Customer".into(),
        identity: vec![Value::Int(7)],
    });
    let q = Queryable::source("Order", "o")
        .filter(lambda("o", param("o").member("Customer").eq(customer)))
        .select(lambda("o", param("o").member("Id")));
    let command = translate(&q, &store_schema(), Dialect::SqlServer).unwrap();
    assert_eq!(
        command.text,
        "SELECT [t0].[Id] FROM [Orders] AS [t0] \
         LEFT JOIN [Customers] AS [t1] ON [t1].[Id] = [t0].[CustomerId] \
         WHERE [t1].[Id] = @p1"
    );
    assert_eq!(command.parameters, vec![Value::Int(7)]);
}

#[test]
fn test_entity_against_null_tests_the_first_identity_column() {
    let q = Queryable::source("Order", "o")
        .filter(lambda(
            "o",
            param("o")
                .member("Customer")
                .eq(Expression::Constant(Value::Null)),
        ))
        .select(lambda("o", param("o").member("Id")));
    assert_eq!(
        sql(&q),
        "SELECT [t0].[Id] FROM [Orders] AS [t0] \
         LEFT JOIN [Customers] AS [t1] ON [t1].[Id] = [t0].[CustomerId] \
         WHERE [t1].[Id] IS NULL"
    );
}

#[test]
fn test_split_identity_produce_keeps_every_column() {
    let columns = vec![
        IdentityColumn {
            column: "TenantId".into(),
            column_type: None,
            in_comparison: false,
        },
        IdentityColumn {
            column: "Id".into(),
            column_type: None,
            in_comparison: true,
        },
    ];
    let produced = split_identity(&[Value::Int(1)], &columns, SplitPurpose::Produce);
    assert_eq!(
        produced,
        vec![
            crate::sql::statement::SqlExpr::Literal(Value::Int(1)),
            crate::sql::statement::SqlExpr::Literal(Value::Null),
        ]
    );
    let compared = split_identity(
        &[Value::Int(1), Value::Int(2)],
        &columns,
        SplitPurpose::Compare,
    );
    assert_eq!(
        compared,
        vec![crate::sql::statement::SqlExpr::Literal(Value::Int(2))]
    );
}

#[test]
fn test_comparison_skips_produce_only_identity_columns() {
    let schema = SchemaMap::new().entity(
        "Doc",
        EntityMap::new("Docs")
            .key("Id")
            .column("Id", "Id")
            .column("TenantId", "TenantId")
            .identity_column("TenantId", false)
            .identity_column("Id", true),
    );
    let doc = Expression::Constant(Value::Entity {
        entity_type: "Doc".into(),
        identity: vec![Value::Int(1), Value::Int(2)],
    });
    let q = Queryable::source("Doc", "d")
        .filter(lambda("d", param("d").eq(doc)))
        .select(lambda("d", param("d").member("Id")));
    let command = translate(&q, &schema, Dialect::SqlServer).unwrap();
    assert_eq!(
        command.text,
        "SELECT [t0].[Id] FROM [Docs] AS [t0] WHERE [t0].[Id] = @p1"
    );
    assert_eq!(command.parameters, vec![Value::Int(2)]);
}

#[test]
fn test_mismatched_identity_shapes_are_rejected() {
    let region = Expression::Constant(Value::Entity {
        entity_type: "Region".into(),
        identity: vec![Value::Int(1)],
    });
    let q = Queryable::source("Customer", "c")
        .filter(lambda("c", param("c").member("Name").eq(region)));
    let err = translate(&q, &store_schema(), Dialect::SqlServer).unwrap_err();
    assert!(
        err.to_string().contains("entity"),
        "message was: {}",
        err
    );
}
