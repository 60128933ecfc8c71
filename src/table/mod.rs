//! Columnar in-memory tables.

pub mod convert;
mod frame;

pub use frame::{range_index, Column, Table};
