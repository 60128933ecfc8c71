//! Stable column identifiers that survive renames and reorders.

mod map;

pub use map::{ColumnIdMap, SheetColumnIds};
