//! `stockroom`: item, store and sale records behind a pluggable store,
//! queried with validated structured filters, served over HTTP, and
//! migrated with dialect-aware SQL generation.

pub mod cli;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod query;
pub mod server;
pub mod service;
pub mod store;
