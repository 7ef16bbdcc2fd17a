//! Schema synchronization for SQL Server.
//!
//! A folder of T-SQL scripts describes the desired schema; the live
//! database is the actual schema. `dbsync` parses both into the same
//! model, diffs them, plans a dependency-ordered set of DDL operations,
//! writes the result as a reviewable script, and can apply it inside a
//! single transaction.
//!
//! Library callers go through [`api::sync`] (or [`api::sync_blocking`]);
//! the binary in `main.rs` is a thin CLI over the same call.

pub mod api;
pub mod apply;
pub mod cli;
pub mod diff;
pub mod emit;
pub mod filter;
pub mod model;
pub mod mssql;
pub mod parser;
pub mod util;
