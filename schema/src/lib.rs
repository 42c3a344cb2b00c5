//! Duality Schema
//!
//! Tables, columns and foreign key references describing how a JSON
//! document maps onto relational rows. Definitions are built with fluent
//! constructors and are immutable while a request is planned.

mod types;
mod validate;

pub use types::*;
pub use validate::{validate, SchemaError, SchemaResult};
