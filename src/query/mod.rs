//! Structured filter queries.
//!
//! `filter` holds the validated filter model and its JSON form; `dsl`
//! parses the compact `field:value` syntax used on the command line.

pub mod dsl;
pub mod filter;

pub use dsl::parse_filter_expr;
pub use filter::{
    Clause, Constraint, FieldSpec, FieldType, Filter, FilterError, Filterable, Scalar,
};
