use crate::codegen::chunk::{downcast, Code, CodeChunk, TableSet};
use crate::error::Result;
use crate::types::python_string;
use std::collections::BTreeSet;

/// One CSV file read by a simple import.
#[derive(Clone, Debug, PartialEq)]
pub struct CsvFile {
    pub path: String,
    pub table_name: String,
    pub delimiter: String,
    pub encoding: String,
}

impl CsvFile {
    fn code(&self) -> String {
        let mut args = vec![python_string(&self.path)];
        if self.delimiter != "," {
            args.push(format!("sep={}", python_string(&self.delimiter)));
        }
        if !self.encoding.eq_ignore_ascii_case("utf-8") {
            args.push(format!("encoding={}", python_string(&self.encoding)));
        }
        format!("{} = pd.read_csv({})", self.table_name, args.join(", "))
    }
}

#[derive(Clone, Debug)]
pub struct SimpleImportChunk {
    pub files: Vec<CsvFile>,
    pub created: BTreeSet<usize>,
}

impl CodeChunk for SimpleImportChunk {
    fn display_name(&self) -> &'static str {
        "Imported"
    }

    fn description_comment(&self) -> String {
        let names: Vec<&str> = self.files.iter().map(|f| f.path.as_str()).collect();
        format!("Imported {}", names.join(", "))
    }

    fn code(&self) -> Result<Code> {
        Ok((
            self.files.iter().map(CsvFile::code).collect(),
            vec!["import pandas as pd".to_string()],
        ))
    }

    fn modified_table_indexes(&self) -> TableSet {
        TableSet::none()
    }

    fn created_table_indexes(&self) -> BTreeSet<usize> {
        self.created.clone()
    }

    fn combine_right(&self, next: &dyn CodeChunk) -> Option<Vec<Box<dyn CodeChunk>>> {
        let next = downcast::<SimpleImportChunk>(next)?;
        let mut files = self.files.clone();
        files.extend(next.files.iter().cloned());
        Some(vec![Box::new(SimpleImportChunk {
            files,
            created: self.created.union(&next.created).copied().collect(),
        })])
    }

    chunk_boilerplate!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import(path: &str, name: &str, index: usize, delimiter: &str) -> SimpleImportChunk {
        SimpleImportChunk {
            files: vec![CsvFile {
                path: path.into(),
                table_name: name.into(),
                delimiter: delimiter.into(),
                encoding: "utf-8".into(),
            }],
            created: BTreeSet::from([index]),
        }
    }

    #[test]
    fn test_imports_merge() {
        let merged = import("a.csv", "a", 0, ",")
            .combine_right(&import("b.csv", "b", 1, ";"))
            .unwrap();
        let (lines, imports) = merged[0].code().unwrap();
        assert_eq!(
            lines,
            vec!["a = pd.read_csv('a.csv')", "b = pd.read_csv('b.csv', sep=';')"]
        );
        assert_eq!(imports, vec!["import pandas as pd"]);
        assert_eq!(merged[0].created_table_indexes(), BTreeSet::from([0, 1]));
    }
}
