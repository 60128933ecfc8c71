//! Concrete chunk types.
//!
//! Chunks that read columns keep a ColumnId → header map instead of rendered
//! text, so a rename moved in front of them only rewrites the map.

mod columns;
mod imports;
mod statement;
mod tables;

pub use columns::{
    AddColumnChunk, ChangeDtypeChunk, ColumnHeaders, DeleteColumnsChunk, FillNaChunk, FillNaMethod,
    FormulaLine, RenameColumnsChunk, ReorderColumnChunk, SetCellValueChunk, SetFormulaChunk,
};
pub use imports::{CsvFile, SimpleImportChunk};
pub use statement::StatementChunk;
pub use tables::{DeleteRowsChunk, DeleteTableChunk, FilterChunk, RenameTableChunk, SortChunk};
