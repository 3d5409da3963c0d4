//! # Query Module
//!
//! Filter predicates, field selectors and the pure compiler that turns
//! them into row statements.

pub mod compile;
pub mod filter;

pub use compile::{
    compile_delete, compile_insert, compile_select, compile_select_one, compile_update,
    encode_filter, Statement,
};
pub use filter::{describe_filters, Fields, Filter, FilterOperator};

/// One row as returned by the backend
pub type Row = serde_json::Map<String, serde_json::Value>;
