use crate::codegen::chunk::{imports_for, Code, CodeChunk, Renames, TableSet};
use crate::error::Result;
use std::collections::BTreeSet;

/// Pre-rendered lines for steps the optimizer never rewrites: sorts, filters,
/// merges, pivots and the like.
#[derive(Clone, Debug)]
pub struct StatementChunk {
    pub display_name: &'static str,
    pub description: String,
    pub lines: Vec<String>,
    /// Imports beyond the pandas and numpy ones the lines reveal.
    pub imports: Vec<String>,
    pub modified: TableSet,
    pub created: BTreeSet<usize>,
    pub deleted: BTreeSet<usize>,
    /// Headers the lines mention, for chunks that keep every header of the
    /// table they edit. `None` when unknown.
    pub reads: Option<BTreeSet<String>>,
}

impl StatementChunk {
    /// A chunk that edits one table in place.
    pub fn editing(
        display_name: &'static str,
        description: impl Into<String>,
        table: usize,
        lines: Vec<String>,
    ) -> Self {
        StatementChunk {
            display_name,
            description: description.into(),
            lines,
            imports: Vec::new(),
            modified: TableSet::one(table),
            created: BTreeSet::new(),
            deleted: BTreeSet::new(),
            reads: None,
        }
    }

    /// A chunk that creates one table and leaves the others untouched.
    pub fn creating(
        display_name: &'static str,
        description: impl Into<String>,
        table: usize,
        lines: Vec<String>,
    ) -> Self {
        StatementChunk {
            display_name,
            description: description.into(),
            lines,
            imports: Vec::new(),
            modified: TableSet::none(),
            created: BTreeSet::from([table]),
            deleted: BTreeSet::new(),
            reads: None,
        }
    }

    pub fn with_imports(mut self, imports: Vec<String>) -> Self {
        self.imports = imports;
        self
    }

    /// Declare that the lines leave the headers of the edited table as they
    /// are and mention only `headers`.
    pub fn reading<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reads = Some(headers.into_iter().map(Into::into).collect());
        self
    }
}

impl CodeChunk for StatementChunk {
    fn display_name(&self) -> &'static str {
        self.display_name
    }

    fn description_comment(&self) -> String {
        self.description.clone()
    }

    fn code(&self) -> Result<Code> {
        let mut imports = imports_for(&self.lines);
        imports.extend(self.imports.iter().cloned());
        Ok((self.lines.clone(), imports))
    }

    fn modified_table_indexes(&self) -> TableSet {
        self.modified.clone()
    }

    fn created_table_indexes(&self) -> BTreeSet<usize> {
        self.created.clone()
    }

    fn deleted_table_indexes(&self) -> BTreeSet<usize> {
        self.deleted.clone()
    }

    /// The lines stay valid under a rename of headers they never mention.
    fn with_renamed_columns(&self, table: usize, renames: &Renames) -> Option<Box<dyn CodeChunk>> {
        let reads = self.reads.as_ref()?;
        let untouched = self.modified == TableSet::one(table)
            && self.created.is_empty()
            && self.deleted.is_empty()
            && renames
                .iter()
                .all(|(old, new)| !reads.contains(old) && !reads.contains(new));
        untouched.then(|| self.box_clone())
    }

    chunk_boilerplate!();
}
