//! # relq: typed query expressions to parameterized SQL
//!
//! relq translates fluent, strongly-typed query chains into SQL for
//! multiple dialects, resolving entity members through a declared
//! schema mapping along the way.
//!
//! ## Quick Example
//!
//! ```rust
//! use relq::prelude::*;
//!
//! let schema = SchemaMap::new().entity(
//!     "Customer",
//!     EntityMap::new("Customers")
//!         .key("Id")
//!         .column("Id", "Id")
//!         .column("Name", "Name")
//!         .column("Active", "Active"),
//! );
//!
//! let query = Queryable::source("Customer", "c")
//!     .filter(lambda("c", param("c").member("Active").eq(true)))
//!     .order_by(lambda("c", param("c").member("Name")))
//!     .select(lambda("c", param("c").member("Name")));
//!
//! let command = translate(&query, &schema, Dialect::SqlServer).unwrap();
//! assert_eq!(
//!     command.text,
//!     "SELECT [t0].[Name] FROM [Customers] AS [t0] \
//!      WHERE [t0].[Active] = 1 ORDER BY [t0].[Name] ASC"
//! );
//! ```
//!
//! ## Pipeline
//!
//! 1. **Partial evaluation**: sub-trees independent of query sources are
//!    folded into constants.
//! 2. **Node parsing**: the method-call chain becomes a linked chain of
//!    query nodes via an extensible parser registry.
//! 3. **Model building**: nodes become a [`model::QueryModel`] with
//!    clause-level structure; projections are inlined so intermediate
//!    shapes never survive.
//! 4. **Statement building**: the model is lowered to an unresolved SQL
//!    statement with member accesses still in entity terms.
//! 5. **Mapping resolution**: entity types and members become tables,
//!    columns, and navigation joins through a [`schema::DatabaseInfo`].
//! 6. **Generation**: dialect-specific text plus ordered parameters.

pub mod error;
pub mod eval;
pub mod expr;
pub mod fmt;
pub mod idgen;
pub mod model;
pub mod nodes;
pub mod schema;
pub mod sql;

pub mod prelude {
    pub use crate::error::{TranslateError, TranslateResult};
    pub use crate::expr::values::Value;
    pub use crate::expr::{lambda, lambda2, new_projection, param, Expression, Queryable};
    pub use crate::schema::{
        DatabaseInfo, EntityMap, IdentityColumn, NavigationMapping, SchemaMap,
    };
    pub use crate::sql::generate::{Dialect, SqlCommand};
    pub use crate::sql::{translate, translate_batch};
}
