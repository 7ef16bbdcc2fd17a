//! SQL Server specifics: connecting, reading the live catalog, and
//! rendering T-SQL.

pub mod connection;
pub mod introspect;
pub mod sqlgen;
