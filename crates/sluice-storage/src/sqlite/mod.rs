//! Embedded relational driver on SQLite.

mod store;
mod values;

pub use store::SqliteRelational;
pub use values::{from_sql_value, quote_ident, to_sql_value};
