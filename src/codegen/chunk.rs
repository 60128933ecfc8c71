//! The generated-code representation of one step.

use crate::error::Result;
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;

/// Tables a chunk touches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableSet {
    Some(BTreeSet<usize>),
    /// The chunk may touch any table.
    All,
}

impl TableSet {
    pub fn none() -> Self {
        TableSet::Some(BTreeSet::new())
    }

    pub fn one(index: usize) -> Self {
        TableSet::Some(BTreeSet::from([index]))
    }

    pub fn contains(&self, index: usize) -> bool {
        match self {
            TableSet::Some(set) => set.contains(&index),
            TableSet::All => true,
        }
    }

    /// Whether this set touches nothing but `index`.
    pub fn is_only(&self, index: usize) -> bool {
        match self {
            TableSet::Some(set) => set.iter().all(|&i| i == index),
            TableSet::All => false,
        }
    }
}

/// Code lines and the imports they need.
pub type Code = (Vec<String>, Vec<String>);

/// Renames as `(old header, new header)` pairs, applied simultaneously.
pub type Renames = [(String, String)];

/// Look up the new header of `header` under `renames`.
pub fn renamed(header: &str, renames: &Renames) -> String {
    renames
        .iter()
        .find(|(old, _)| old == header)
        .map(|(_, new)| new.clone())
        .unwrap_or_else(|| header.to_string())
}

/// The library imports `lines` rely on.
pub fn imports_for(lines: &[String]) -> Vec<String> {
    let mut imports = Vec::new();
    if lines.iter().any(|l| l.contains("pd.")) {
        imports.push("import pandas as pd".to_string());
    }
    if lines.iter().any(|l| l.contains("np.")) {
        imports.push("import numpy as np".to_string());
    }
    imports
}

pub trait CodeChunk: fmt::Debug + Send + Sync {
    fn display_name(&self) -> &'static str;

    /// One line describing the chunk, written as a comment above its code.
    fn description_comment(&self) -> String;

    fn code(&self) -> Result<Code>;

    fn modified_table_indexes(&self) -> TableSet;

    fn created_table_indexes(&self) -> BTreeSet<usize> {
        BTreeSet::new()
    }

    fn deleted_table_indexes(&self) -> BTreeSet<usize> {
        BTreeSet::new()
    }

    /// Fuse with the chunk that follows. `Some(vec![])` means both vanish.
    fn combine_right(&self, _next: &dyn CodeChunk) -> Option<Vec<Box<dyn CodeChunk>>> {
        None
    }

    /// Fuse with the chunk that precedes.
    fn combine_left(&self, _prev: &dyn CodeChunk) -> Option<Vec<Box<dyn CodeChunk>>> {
        None
    }

    /// The same chunk written against renamed headers of `table`, for chunks
    /// that a column rename may be moved in front of.
    fn with_renamed_columns(&self, _table: usize, _renames: &Renames) -> Option<Box<dyn CodeChunk>> {
        None
    }

    /// Headers this chunk introduces in `table`.
    fn created_columns(&self, _table: usize) -> Vec<String> {
        Vec::new()
    }

    fn as_any(&self) -> &dyn Any;

    fn box_clone(&self) -> Box<dyn CodeChunk>;
}

impl Clone for Box<dyn CodeChunk> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Downcast a chunk to a concrete type.
pub fn downcast<T: 'static>(chunk: &dyn CodeChunk) -> Option<&T> {
    chunk.as_any().downcast_ref::<T>()
}
