//! Entity-to-table mapping information.
//!
//! Translation never inspects entity types themselves; everything it needs
//! comes through the [`DatabaseInfo`] trait. [`SchemaMap`] is the standard
//! implementation, either composed fluently in code or loaded from JSON.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::expr::TypeRef;

/// A member mapped to a single table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub column: String,
    #[serde(default)]
    pub nullable: bool,
}

/// A member mapped to a relationship with another entity.
///
/// The join condition pairs `target_columns[i]` on the target table with
/// `source_columns[i]` on the declaring entity's table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationMapping {
    pub target_type: TypeRef,
    pub source_columns: Vec<String>,
    pub target_columns: Vec<String>,
    /// A nullable relationship joins with LEFT JOIN instead of INNER JOIN.
    #[serde(default)]
    pub nullable: bool,
    /// Collection navigations enumerate many target rows per source row.
    #[serde(default)]
    pub many: bool,
}

/// What a member access on an entity resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberMapping {
    Column(ColumnMapping),
    Navigation(NavigationMapping),
}

/// One column of an entity's identity.
///
/// All identity columns participate when an entity value is produced (a
/// projection or a parameter); only those with `in_comparison` participate
/// when two entity values are compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityColumn {
    pub column: String,
    /// Declared SQL type of the column, for diagnostics.
    #[serde(default)]
    pub column_type: Option<String>,
    #[serde(default = "default_true")]
    pub in_comparison: bool,
}

fn default_true() -> bool {
    true
}

/// Table-level mapping of an entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub table_name: String,
    pub primary_key: Vec<String>,
}

/// Source of mapping information during resolution.
pub trait DatabaseInfo {
    /// The table an entity type maps to, if any.
    fn resolve_table(&self, entity_type: &TypeRef) -> Option<TableInfo>;

    /// What a member of an entity type maps to, if anything.
    fn resolve_member(&self, entity_type: &TypeRef, member: &str) -> Option<MemberMapping>;

    /// The identity columns of an entity type, in declaration order.
    fn identity_columns(&self, entity_type: &TypeRef) -> Vec<IdentityColumn>;

    /// All plain columns of an entity type, in declaration order; used when
    /// a whole entity is projected.
    fn columns_of(&self, entity_type: &TypeRef) -> Vec<ColumnMapping>;
}

/// Mapping of one entity type inside a [`SchemaMap`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityMap {
    pub table: String,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub columns: IndexMap<String, ColumnMapping>,
    #[serde(default)]
    pub navigations: IndexMap<String, NavigationMapping>,
    /// Identity columns; when empty, the primary key columns are the
    /// identity and all of them compare.
    #[serde(default)]
    pub identity: Vec<IdentityColumn>,
}

impl EntityMap {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn key(mut self, column: impl Into<String>) -> Self {
        self.primary_key.push(column.into());
        self
    }

    pub fn column(mut self, member: impl Into<String>, column: impl Into<String>) -> Self {
        self.columns.insert(
            member.into(),
            ColumnMapping {
                column: column.into(),
                nullable: false,
            },
        );
        self
    }

    pub fn nullable_column(
        mut self,
        member: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        self.columns.insert(
            member.into(),
            ColumnMapping {
                column: column.into(),
                nullable: true,
            },
        );
        self
    }

    pub fn navigation(
        mut self,
        member: impl Into<String>,
        navigation: NavigationMapping,
    ) -> Self {
        self.navigations.insert(member.into(), navigation);
        self
    }

    pub fn identity_column(mut self, column: impl Into<String>, in_comparison: bool) -> Self {
        self.identity.push(IdentityColumn {
            column: column.into(),
            column_type: None,
            in_comparison,
        });
        self
    }
}

/// A schema described as data, keyed by entity type name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaMap {
    pub entities: IndexMap<String, EntityMap>,
}

impl SchemaMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, entity_type: impl Into<String>, map: EntityMap) -> Self {
        self.entities.insert(entity_type.into(), map);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl DatabaseInfo for SchemaMap {
    fn resolve_table(&self, entity_type: &TypeRef) -> Option<TableInfo> {
        self.entities.get(entity_type.name()).map(|e| TableInfo {
            table_name: e.table.clone(),
            primary_key: e.primary_key.clone(),
        })
    }

    fn resolve_member(&self, entity_type: &TypeRef, member: &str) -> Option<MemberMapping> {
        let entity = self.entities.get(entity_type.name())?;
        if let Some(column) = entity.columns.get(member) {
            return Some(MemberMapping::Column(column.clone()));
        }
        entity
            .navigations
            .get(member)
            .map(|n| MemberMapping::Navigation(n.clone()))
    }

    fn identity_columns(&self, entity_type: &TypeRef) -> Vec<IdentityColumn> {
        let Some(entity) = self.entities.get(entity_type.name()) else {
            return Vec::new();
        };
        if !entity.identity.is_empty() {
            return entity.identity.clone();
        }
        entity
            .primary_key
            .iter()
            .map(|column| IdentityColumn {
                column: column.clone(),
                column_type: None,
                in_comparison: true,
            })
            .collect()
    }

    fn columns_of(&self, entity_type: &TypeRef) -> Vec<ColumnMapping> {
        self.entities
            .get(entity_type.name())
            .map(|e| e.columns.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SchemaMap {
        SchemaMap::new().entity(
            "Customer",
            EntityMap::new("Customers")
                .key("Id")
                .column("Id", "Id")
                .column("Name", "Name")
                .nullable_column("Region", "Region")
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
    }

    #[test]
    fn test_member_resolution_prefers_columns() {
        let schema = sample();
        let mapping = schema.resolve_member(&"Customer".into(), "Region").unwrap();
        let MemberMapping::Column(column) = mapping else {
            panic!("expected a column mapping");
        };
        assert!(column.nullable);

        let mapping = schema.resolve_member(&"Customer".into(), "Orders").unwrap();
        assert!(matches!(mapping, MemberMapping::Navigation(_)));
        assert!(schema.resolve_member(&"Customer".into(), "Missing").is_none());
    }

    #[test]
    fn test_identity_defaults_to_primary_key() {
        let schema = sample();
        let identity = schema.identity_columns(&"Customer".into());
        assert_eq!(identity.len(), 1);
        assert_eq!(identity[0].column, "Id");
        assert!(identity[0].in_comparison);
    }

    #[test]
    fn test_explicit_identity_keeps_comparison_flags() {
        let schema = SchemaMap::new().entity(
            "Document",
            EntityMap::new("Documents")
                .key("Id")
                .identity_column("Id", true)
                .identity_column("Revision", false),
        );
        let identity = schema.identity_columns(&"Document".into());
        assert_eq!(identity.len(), 2);
        assert!(!identity[1].in_comparison);
    }

    #[test]
    fn test_json_round_trip() {
        let schema = sample();
        let json = schema.to_json().unwrap();
        let loaded = SchemaMap::from_json(&json).unwrap();
        assert_eq!(schema, loaded);
    }
}
