use relq::prelude::*;

fn store_schema() -> SchemaMap {
    SchemaMap::new()
        .entity(
            "Customer",
            EntityMap::new("Customers")
                .key("Id")
                .column("Id", "Id")
                .column("Name", "Name")
                .column("Active", "Active")
                .navigation(
                    "Region",
                    NavigationMapping {
                        target_type: "Region".into(),
                        source_columns: vec!["RegionId".into()],
                        target_columns: vec!["Id".into()],
                        nullable: false,
                        many: false,
                    },
                ),
        )
        .entity(
            "Region",
            EntityMap::new("Regions")
                .key("Id")
                .column("Id", "Id")
                .column("Name", "Name"),
        )
}

#[test]
fn test_filter_order_select_end_to_end() {
    let q = Queryable::source("Customer", "c")
        .filter(lambda("c", param("c").member("Active")))
        .order_by(lambda("c", param("c").member("Name")))
        .select(lambda("c", param("c").member("Name")));
    let command = translate(&q, &store_schema(), Dialect::SqlServer).unwrap();
    assert_eq!(
        command.text,
        "SELECT [t0].[Name] FROM [Customers] AS [t0] \
         WHERE [t0].[Active] = 1 ORDER BY [t0].[Name] ASC"
    );
    assert!(command.parameters.is_empty());
}

#[test]
fn test_same_column_can_order_both_ways() {
    let q = Queryable::source("Customer", "c")
        .order_by(lambda("c", param("c").member("Name")))
        .then_by_desc(lambda("c", param("c").member("Name")))
        .select(lambda("c", param("c").member("Id")));
    let command = translate(&q, &store_schema(), Dialect::SqlServer).unwrap();
    assert!(
        command
            .text
            .ends_with("ORDER BY [t0].[Name] ASC, [t0].[Name] DESC"),
        "was: {}",
        command.text
    );
}

#[test]
fn test_raw_ordering_direction_out_of_range_reports_the_value() {
    let q = Queryable::source("Customer", "c")
        .order_by_raw(lambda("c", param("c").member("Name")), 7);
    let err = translate(&q, &store_schema(), Dialect::SqlServer).unwrap_err();
    assert!(err.to_string().contains("7"), "message was: {}", err);
}

#[test]
fn test_first_renders_top_one() {
    let q = Queryable::source("Customer", "c")
        .select(lambda("c", param("c").member("Name")))
        .first();
    let command = translate(&q, &store_schema(), Dialect::SqlServer).unwrap();
    assert_eq!(
        command.text,
        "SELECT TOP(1) [t0].[Name] FROM [Customers] AS [t0]"
    );
}

#[test]
fn test_projection_record_does_not_survive_translation() {
    let q = Queryable::source("Customer", "c")
        .select(lambda(
            "c",
            new_projection(vec![
                ("Key", param("c").member("Id")),
                ("Label", param("c").member("Name")),
            ]),
        ))
        .filter(lambda("x", param("x").member("Label").eq("acme")))
        .select(lambda("x", param("x").member("Key")));
    let command = translate(&q, &store_schema(), Dialect::SqlServer).unwrap();
    assert_eq!(
        command.text,
        "SELECT [t0].[Id] FROM [Customers] AS [t0] WHERE [t0].[Name] = @p1"
    );
    assert_eq!(command.parameters, vec![Value::String("acme".into())]);
}

#[test]
fn test_navigation_through_the_prelude_surface() {
    let q = Queryable::source("Customer", "c")
        .filter(lambda("c", param("c").member("Region").member("Name").eq("West")))
        .select(lambda("c", param("c").member("Name")));
    let command = translate(&q, &store_schema(), Dialect::SqlServer).unwrap();
    assert_eq!(
        command.text,
        "SELECT [t0].[Name] FROM [Customers] AS [t0] \
         INNER JOIN [Regions] AS [t1] ON [t1].[Id] = [t0].[RegionId] \
         WHERE [t1].[Name] = @p1"
    );
}

#[test]
fn test_schema_declared_as_json() {
    let schema = SchemaMap::from_json(
        r#"{
            "entities": {
                "Customer": {
                    "table": "Customers",
                    "primary_key": ["Id"],
                    "columns": {
                        "Id": { "column": "Id" },
                        "Name": { "column": "Name" }
                    }
                }
            }
        }"#,
    )
    .unwrap();
    let q = Queryable::source("Customer", "c").select(lambda("c", param("c").member("Name")));
    let command = translate(&q, &schema, Dialect::SqlServer).unwrap();
    assert_eq!(command.text, "SELECT [t0].[Name] FROM [Customers] AS [t0]");
}

#[test]
fn test_batch_translation_keeps_aliases_unique() {
    let queries = vec![
        Queryable::source("Customer", "c").select(lambda("c", param("c").member("Name"))),
        Queryable::source("Region", "r").select(lambda("r", param("r").member("Name"))),
    ];
    let command = translate_batch(&queries, &store_schema(), Dialect::SqlServer).unwrap();
    assert_eq!(
        command.text,
        "SELECT [t0].[Name] FROM [Customers] AS [t0]\nGO\nSELECT [t1].[Name] FROM [Regions] AS [t1]"
    );
}
