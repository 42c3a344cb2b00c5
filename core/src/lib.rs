//! Duality Core Types
//!
//! This crate provides the foundational types shared by the read and write
//! paths of a duality view:
//! - SQL statement text with escaped placeholders (`SqlString`, `SqlValue`)
//! - Primary key values (`PrimaryKeyColumnValues`)
//! - The SQL execution port (`SqlSession`) and its error type
//! - Row ownership predicates (`RowOwnership`)

mod error;
mod ownership;
mod pk;
mod session;
mod sql;

pub use error::*;
pub use ownership::*;
pub use pk::*;
pub use session::*;
pub use sql::*;
