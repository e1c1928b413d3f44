//! Translation test modules.
//!
//! Tests are organized by pipeline stage:
//! - `core`: query models lowered to unresolved statements
//! - `resolver`: schema mapping, navigation joins, identity splitting
//! - `generate`: dialect-specific SQL text, parameters, batches

mod core;
mod resolver;

use crate::schema::{EntityMap, NavigationMapping, SchemaMap};

/// Customers own a single `Region` and a collection of `Orders`; an order
/// points back at its (optional) customer.
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
                )
                .navigation(
                    "Orders",
                    NavigationMapping {
                        target_type: "Order".into(),
                        source_columns: vec!["Id".into()],
                        target_columns: vec!["CustomerId".into()],
                        nullable: false,
                        many: true,
                    },
                ),
        )
        .entity(
            "Order",
            EntityMap::new("Orders")
                .key("Id")
                .column("Id", "Id")
                .column("CustomerId", "CustomerId")
                .column("Total", "Total")
                .navigation(
                    "Customer",
                    NavigationMapping {
                        target_type: "Customer".into(),
                        source_columns: vec!["CustomerId".into()],
                        target_columns: vec!["Id".into()],
                        nullable: true,
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
