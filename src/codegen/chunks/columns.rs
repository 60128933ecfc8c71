//! Chunks for column edits.

use crate::codegen::chunk::{downcast, renamed, Code, CodeChunk, Renames, TableSet};
use crate::error::{Result, SheetError};
use crate::formula::{AppliedTo, Expr};
use crate::types::{python_string, ColumnId, Dtype, IndexLabel, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Headers of one table by column id, as they stood when the chunk's step ran.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnHeaders(pub HashMap<ColumnId, String>);

impl ColumnHeaders {
    pub fn get(&self, table: &str, id: &ColumnId) -> Result<&str> {
        self.0
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| SheetError::no_column(table, id.as_str()))
    }

    fn code(&self, table: &str, id: &ColumnId) -> Result<String> {
        self.get(table, id).map(python_string)
    }

    fn renamed(&self, renames: &Renames) -> ColumnHeaders {
        ColumnHeaders(
            self.0
                .iter()
                .map(|(id, header)| (id.clone(), renamed(header, renames)))
                .collect(),
        )
    }
}

/// A formula written into a column.
#[derive(Clone, Debug, PartialEq)]
pub struct FormulaLine {
    pub target: ColumnId,
    pub expr: Expr,
    pub applied_to: AppliedTo,
}

impl FormulaLine {
    fn code(&self, table: &str, headers: &ColumnHeaders) -> Result<String> {
        let value = self.expr.to_code(table, &headers.0)?;
        let target = headers.code(table, &self.target)?;
        Ok(match &self.applied_to {
            AppliedTo::EntireColumn => format!("{}[{}] = {}", table, target, value),
            AppliedTo::SpecificIndexLabels { index_labels } => {
                let labels: Vec<String> = index_labels.iter().map(IndexLabel::to_code).collect();
                format!("{}.loc[[{}], {}] = {}", table, labels.join(", "), target, value)
            }
        })
    }
}

fn formula_code(
    table: &str,
    lines: &[FormulaLine],
    headers: &ColumnHeaders,
    public_import: &str,
) -> Result<Code> {
    let code = lines
        .iter()
        .map(|line| line.code(table, headers))
        .collect::<Result<Vec<_>>>()?;
    let mut imports = crate::codegen::imports_for(&code);
    if lines.iter().any(|l| l.expr.needs_function_module()) {
        imports.push(public_import.to_string());
    }
    Ok((code, imports))
}

fn string_list(items: &[String]) -> String {
    items
        .iter()
        .map(|s| python_string(s))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `df.insert(position, header, value)`.
#[derive(Clone, Debug)]
pub struct AddColumnChunk {
    pub table: usize,
    pub table_name: String,
    pub id: ColumnId,
    pub position: usize,
    pub headers: ColumnHeaders,
    /// Set when a following formula edit was fused in.
    pub formula: Option<Expr>,
    pub public_import: String,
}

impl AddColumnChunk {
    fn header(&self) -> Result<&str> {
        self.headers.get(&self.table_name, &self.id)
    }
}

impl CodeChunk for AddColumnChunk {
    fn display_name(&self) -> &'static str {
        "Added column"
    }

    fn description_comment(&self) -> String {
        format!(
            "Added column {} to {}",
            self.header().unwrap_or(self.id.as_str()),
            self.table_name
        )
    }

    fn code(&self) -> Result<Code> {
        let value = match &self.formula {
            Some(expr) => expr.to_code(&self.table_name, &self.headers.0)?,
            None => "0".to_string(),
        };
        let line = format!(
            "{}.insert({}, {}, {})",
            self.table_name,
            self.position,
            python_string(self.header()?),
            value
        );
        let mut imports = crate::codegen::imports_for(std::slice::from_ref(&line));
        if self.formula.as_ref().is_some_and(Expr::needs_function_module) {
            imports.push(self.public_import.clone());
        }
        Ok((vec![line], imports))
    }

    fn modified_table_indexes(&self) -> TableSet {
        TableSet::one(self.table)
    }

    fn combine_right(&self, next: &dyn CodeChunk) -> Option<Vec<Box<dyn CodeChunk>>> {
        let header = self.header().ok()?;
        if let Some(delete) = downcast::<DeleteColumnsChunk>(next) {
            if delete.table != self.table || !delete.headers.iter().any(|h| h == header) {
                return None;
            }
            let remaining: Vec<String> = delete.headers.iter().filter(|h| *h != header).cloned().collect();
            if remaining.is_empty() {
                return Some(Vec::new());
            }
            return Some(vec![Box::new(DeleteColumnsChunk {
                headers: remaining,
                ..delete.clone()
            })]);
        }
        if let Some(set) = downcast::<SetFormulaChunk>(next) {
            if self.formula.is_some() || set.table != self.table || set.lines.len() != 1 {
                return None;
            }
            let line = &set.lines[0];
            if line.target != self.id || line.applied_to != AppliedTo::EntireColumn {
                return None;
            }
            return Some(vec![Box::new(AddColumnChunk {
                headers: set.headers.clone(),
                formula: Some(line.expr.clone()),
                public_import: set.public_import.clone(),
                ..self.clone()
            })]);
        }
        None
    }

    fn with_renamed_columns(&self, table: usize, renames: &Renames) -> Option<Box<dyn CodeChunk>> {
        (table == self.table).then(|| {
            Box::new(AddColumnChunk {
                headers: self.headers.renamed(renames),
                ..self.clone()
            }) as Box<dyn CodeChunk>
        })
    }

    fn created_columns(&self, table: usize) -> Vec<String> {
        match self.header() {
            Ok(header) if table == self.table => vec![header.to_string()],
            _ => Vec::new(),
        }
    }

    chunk_boilerplate!();
}

/// `df.drop([...], axis=1, inplace=True)`.
#[derive(Clone, Debug)]
pub struct DeleteColumnsChunk {
    pub table: usize,
    pub table_name: String,
    pub headers: Vec<String>,
}

impl CodeChunk for DeleteColumnsChunk {
    fn display_name(&self) -> &'static str {
        "Deleted columns"
    }

    fn description_comment(&self) -> String {
        format!("Deleted columns {} from {}", self.headers.join(", "), self.table_name)
    }

    fn code(&self) -> Result<Code> {
        Ok((
            vec![format!(
                "{}.drop([{}], axis=1, inplace=True)",
                self.table_name,
                string_list(&self.headers)
            )],
            Vec::new(),
        ))
    }

    fn modified_table_indexes(&self) -> TableSet {
        TableSet::one(self.table)
    }

    fn combine_right(&self, next: &dyn CodeChunk) -> Option<Vec<Box<dyn CodeChunk>>> {
        let next = downcast::<DeleteColumnsChunk>(next)?;
        if next.table != self.table {
            return None;
        }
        let mut headers = self.headers.clone();
        headers.extend(next.headers.iter().filter(|h| !self.headers.contains(h)).cloned());
        Some(vec![Box::new(DeleteColumnsChunk {
            headers,
            ..self.clone()
        })])
    }

    fn combine_left(&self, prev: &dyn CodeChunk) -> Option<Vec<Box<dyn CodeChunk>>> {
        if let Some(rename) = downcast::<RenameColumnsChunk>(prev) {
            if rename.table != self.table {
                return None;
            }
            // Delete under the old headers first, then rename whatever survives.
            let headers: Vec<String> = self
                .headers
                .iter()
                .map(|h| {
                    rename
                        .renames
                        .iter()
                        .find(|(_, new)| new == h)
                        .map(|(old, _)| old.clone())
                        .unwrap_or_else(|| h.clone())
                })
                .collect();
            let remaining: Vec<(String, String)> = rename
                .renames
                .iter()
                .filter(|(_, new)| !self.headers.contains(new))
                .cloned()
                .collect();
            if remaining.len() == rename.renames.len() {
                return None;
            }
            let mut chunks: Vec<Box<dyn CodeChunk>> = vec![Box::new(DeleteColumnsChunk {
                headers,
                ..self.clone()
            })];
            if !remaining.is_empty() {
                chunks.push(Box::new(RenameColumnsChunk {
                    renames: remaining,
                    ..rename.clone()
                }));
            }
            return Some(chunks);
        }
        if let Some(set) = downcast::<SetFormulaChunk>(prev) {
            if set.table != self.table {
                return None;
            }
            let covered = set.lines.iter().all(|line| {
                set.headers
                    .get(&set.table_name, &line.target)
                    .map(|h| self.headers.iter().any(|d| d == h))
                    .unwrap_or(false)
            });
            return covered.then(|| vec![self.box_clone()]);
        }
        None
    }

    /// Refused when a deleted header is the target of a rename, since the
    /// rename would then briefly duplicate it.
    fn with_renamed_columns(&self, table: usize, renames: &Renames) -> Option<Box<dyn CodeChunk>> {
        if table != self.table || renames.iter().any(|(_, new)| self.headers.contains(new)) {
            return None;
        }
        Some(Box::new(DeleteColumnsChunk {
            headers: self.headers.iter().map(|h| renamed(h, renames)).collect(),
            ..self.clone()
        }))
    }

    chunk_boilerplate!();
}

/// `df.rename(columns={...}, inplace=True)`.
#[derive(Clone, Debug)]
pub struct RenameColumnsChunk {
    pub table: usize,
    pub table_name: String,
    pub renames: Vec<(String, String)>,
}

impl CodeChunk for RenameColumnsChunk {
    fn display_name(&self) -> &'static str {
        "Renamed columns"
    }

    fn description_comment(&self) -> String {
        let pairs: Vec<String> = self
            .renames
            .iter()
            .map(|(old, new)| format!("{} to {}", old, new))
            .collect();
        format!("Renamed {} in {}", pairs.join(", "), self.table_name)
    }

    fn code(&self) -> Result<Code> {
        let pairs: Vec<String> = self
            .renames
            .iter()
            .map(|(old, new)| format!("{}: {}", python_string(old), python_string(new)))
            .collect();
        Ok((
            vec![format!(
                "{}.rename(columns={{{}}}, inplace=True)",
                self.table_name,
                pairs.join(", ")
            )],
            Vec::new(),
        ))
    }

    fn modified_table_indexes(&self) -> TableSet {
        TableSet::one(self.table)
    }

    fn combine_right(&self, next: &dyn CodeChunk) -> Option<Vec<Box<dyn CodeChunk>>> {
        let next = downcast::<RenameColumnsChunk>(next)?;
        if next.table != self.table {
            return None;
        }
        let mut renames: Vec<(String, String)> = self
            .renames
            .iter()
            .map(|(old, new)| (old.clone(), renamed(new, &next.renames)))
            .collect();
        for (old, new) in &next.renames {
            if !self.renames.iter().any(|(_, n)| n == old) {
                renames.push((old.clone(), new.clone()));
            }
        }
        renames.retain(|(old, new)| old != new);
        if renames.is_empty() {
            return Some(Vec::new());
        }
        Some(vec![Box::new(RenameColumnsChunk {
            renames,
            ..self.clone()
        })])
    }

    /// Move the rename in front of a chunk that can be rewritten under the new
    /// headers. Renames of columns that chunk creates are folded into it.
    fn combine_left(&self, prev: &dyn CodeChunk) -> Option<Vec<Box<dyn CodeChunk>>> {
        if downcast::<RenameColumnsChunk>(prev).is_some()
            || !prev.modified_table_indexes().is_only(self.table)
            || !prev.created_table_indexes().is_empty()
            || !prev.deleted_table_indexes().is_empty()
        {
            return None;
        }
        let rewritten = prev.with_renamed_columns(self.table, &self.renames)?;
        let created = prev.created_columns(self.table);
        let remaining: Vec<(String, String)> = self
            .renames
            .iter()
            .filter(|(old, _)| !created.contains(old))
            .cloned()
            .collect();
        let mut chunks: Vec<Box<dyn CodeChunk>> = Vec::new();
        if !remaining.is_empty() {
            chunks.push(Box::new(RenameColumnsChunk {
                renames: remaining,
                ..self.clone()
            }));
        }
        chunks.push(rewritten);
        Some(chunks)
    }

    chunk_boilerplate!();
}

/// `df.insert(position, header, df.pop(header))`.
#[derive(Clone, Debug)]
pub struct ReorderColumnChunk {
    pub table: usize,
    pub table_name: String,
    pub id: ColumnId,
    pub position: usize,
    pub headers: ColumnHeaders,
}

impl CodeChunk for ReorderColumnChunk {
    fn display_name(&self) -> &'static str {
        "Reordered column"
    }

    fn description_comment(&self) -> String {
        format!(
            "Moved column {} to position {} in {}",
            self.headers.get(&self.table_name, &self.id).unwrap_or(self.id.as_str()),
            self.position,
            self.table_name
        )
    }

    fn code(&self) -> Result<Code> {
        let header = self.headers.code(&self.table_name, &self.id)?;
        Ok((
            vec![format!(
                "{t}.insert({}, {h}, {t}.pop({h}))",
                self.position,
                t = self.table_name,
                h = header
            )],
            Vec::new(),
        ))
    }

    fn modified_table_indexes(&self) -> TableSet {
        TableSet::one(self.table)
    }

    fn with_renamed_columns(&self, table: usize, renames: &Renames) -> Option<Box<dyn CodeChunk>> {
        (table == self.table).then(|| {
            Box::new(ReorderColumnChunk {
                headers: self.headers.renamed(renames),
                ..self.clone()
            }) as Box<dyn CodeChunk>
        })
    }

    chunk_boilerplate!();
}

/// A formula assignment followed by refreshes of its dependents.
#[derive(Clone, Debug)]
pub struct SetFormulaChunk {
    pub table: usize,
    pub table_name: String,
    /// The edited column first, then dependents in evaluation order.
    pub lines: Vec<FormulaLine>,
    pub headers: ColumnHeaders,
    pub public_import: String,
}

impl CodeChunk for SetFormulaChunk {
    fn display_name(&self) -> &'static str {
        "Set column formula"
    }

    fn description_comment(&self) -> String {
        let target = self
            .lines
            .first()
            .and_then(|line| self.headers.get(&self.table_name, &line.target).ok())
            .unwrap_or("");
        format!("Set formula of {} in {}", target, self.table_name)
    }

    fn code(&self) -> Result<Code> {
        formula_code(&self.table_name, &self.lines, &self.headers, &self.public_import)
    }

    fn modified_table_indexes(&self) -> TableSet {
        TableSet::one(self.table)
    }

    fn with_renamed_columns(&self, table: usize, renames: &Renames) -> Option<Box<dyn CodeChunk>> {
        (table == self.table).then(|| {
            Box::new(SetFormulaChunk {
                headers: self.headers.renamed(renames),
                ..self.clone()
            }) as Box<dyn CodeChunk>
        })
    }

    chunk_boilerplate!();
}

/// A dtype conversion of one column.
#[derive(Clone, Debug)]
pub struct ChangeDtypeChunk {
    pub table: usize,
    pub table_name: String,
    pub id: ColumnId,
    pub old_dtype: Dtype,
    pub new_dtype: Dtype,
    /// Datetime format detected while converting strings.
    pub format: Option<String>,
    pub refresh: Vec<FormulaLine>,
    pub headers: ColumnHeaders,
    pub public_import: String,
}

impl ChangeDtypeChunk {
    fn conversion(&self, column: &str) -> String {
        let from_numeric = self.old_dtype.is_numeric();
        match self.new_dtype {
            Dtype::Bool => format!("{}.fillna(False).astype('bool')", column),
            Dtype::Int if self.old_dtype == Dtype::Datetime => {
                format!("{}.astype('int64') // 10**9", column)
            }
            Dtype::Int => format!("pd.to_numeric({}, errors='coerce').fillna(0).astype('int64')", column),
            Dtype::Float if self.old_dtype == Dtype::Datetime => {
                format!("{}.astype('int64') / 10**9", column)
            }
            Dtype::Float => format!("pd.to_numeric({}, errors='coerce')", column),
            Dtype::String | Dtype::Object => format!("{}.astype('str')", column),
            Dtype::Datetime if from_numeric => {
                format!("pd.to_datetime({}, unit='s', errors='coerce')", column)
            }
            Dtype::Datetime => match &self.format {
                Some(format) => format!(
                    "pd.to_datetime({}, format={}, errors='coerce')",
                    column,
                    python_string(format)
                ),
                None => format!("pd.to_datetime({}, errors='coerce')", column),
            },
            Dtype::Timedelta if from_numeric => {
                format!("pd.to_timedelta({}, unit='s', errors='coerce')", column)
            }
            Dtype::Timedelta => format!("pd.to_timedelta({}, errors='coerce')", column),
        }
    }
}

impl CodeChunk for ChangeDtypeChunk {
    fn display_name(&self) -> &'static str {
        "Changed dtype"
    }

    fn description_comment(&self) -> String {
        format!(
            "Changed {} to dtype {}",
            self.headers.get(&self.table_name, &self.id).unwrap_or(self.id.as_str()),
            self.new_dtype
        )
    }

    fn code(&self) -> Result<Code> {
        let column = format!(
            "{}[{}]",
            self.table_name,
            self.headers.code(&self.table_name, &self.id)?
        );
        let mut lines = vec![format!("{} = {}", column, self.conversion(&column))];
        let (refresh, mut imports) =
            formula_code(&self.table_name, &self.refresh, &self.headers, &self.public_import)?;
        lines.extend(refresh);
        imports.extend(crate::codegen::imports_for(&lines));
        Ok((lines, imports))
    }

    fn modified_table_indexes(&self) -> TableSet {
        TableSet::one(self.table)
    }

    fn with_renamed_columns(&self, table: usize, renames: &Renames) -> Option<Box<dyn CodeChunk>> {
        (table == self.table).then(|| {
            Box::new(ChangeDtypeChunk {
                headers: self.headers.renamed(renames),
                ..self.clone()
            }) as Box<dyn CodeChunk>
        })
    }

    chunk_boilerplate!();
}

/// How missing values are filled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FillNaMethod {
    Value { value: serde_json::Value },
    Ffill,
    Bfill,
    Mean,
    Median,
}

#[derive(Clone, Debug)]
pub struct FillNaChunk {
    pub table: usize,
    pub table_name: String,
    /// `None` fills every column.
    pub ids: Option<Vec<ColumnId>>,
    pub method: FillNaMethod,
    pub refresh: Vec<FormulaLine>,
    pub headers: ColumnHeaders,
    pub public_import: String,
}

impl CodeChunk for FillNaChunk {
    fn display_name(&self) -> &'static str {
        "Filled NaN values"
    }

    fn description_comment(&self) -> String {
        match &self.ids {
            None => format!("Filled NaN values in all columns of {}", self.table_name),
            Some(ids) => {
                let headers: Vec<&str> = ids
                    .iter()
                    .map(|id| self.headers.get(&self.table_name, id).unwrap_or(id.as_str()))
                    .collect();
                format!("Filled NaN values in {} of {}", headers.join(", "), self.table_name)
            }
        }
    }

    fn code(&self) -> Result<Code> {
        let t = &self.table_name;
        let selection = match &self.ids {
            None => None,
            Some(ids) => Some(
                ids.iter()
                    .map(|id| self.headers.code(t, id))
                    .collect::<Result<Vec<_>>>()?,
            ),
        };
        let line = match (&self.method, &selection) {
            (FillNaMethod::Value { value }, None) => {
                format!("{}.fillna({}, inplace=True)", t, Value::from_json(value).to_code())
            }
            (FillNaMethod::Value { value }, Some(cols)) => {
                let literal = Value::from_json(value).to_code();
                let pairs: Vec<String> = cols.iter().map(|c| format!("{}: {}", c, literal)).collect();
                format!("{}.fillna({{{}}}, inplace=True)", t, pairs.join(", "))
            }
            (FillNaMethod::Ffill, None) => format!("{}.ffill(inplace=True)", t),
            (FillNaMethod::Bfill, None) => format!("{}.bfill(inplace=True)", t),
            (FillNaMethod::Mean, None) => {
                format!("{t}.fillna({t}.mean(numeric_only=True), inplace=True)", t = t)
            }
            (FillNaMethod::Median, None) => {
                format!("{t}.fillna({t}.median(numeric_only=True), inplace=True)", t = t)
            }
            (method, Some(cols)) => {
                let sub = format!("{}[[{}]]", t, cols.join(", "));
                let fill = match method {
                    FillNaMethod::Ffill => format!("{}.ffill()", sub),
                    FillNaMethod::Bfill => format!("{}.bfill()", sub),
                    FillNaMethod::Mean => format!("{s}.fillna({s}.mean(numeric_only=True))", s = sub),
                    _ => format!("{s}.fillna({s}.median(numeric_only=True))", s = sub),
                };
                format!("{} = {}", sub, fill)
            }
        };
        let mut lines = vec![line];
        let (refresh, mut imports) = formula_code(t, &self.refresh, &self.headers, &self.public_import)?;
        lines.extend(refresh);
        imports.extend(crate::codegen::imports_for(&lines));
        Ok((lines, imports))
    }

    fn modified_table_indexes(&self) -> TableSet {
        TableSet::one(self.table)
    }

    fn with_renamed_columns(&self, table: usize, renames: &Renames) -> Option<Box<dyn CodeChunk>> {
        (table == self.table).then(|| {
            Box::new(FillNaChunk {
                headers: self.headers.renamed(renames),
                ..self.clone()
            }) as Box<dyn CodeChunk>
        })
    }

    chunk_boilerplate!();
}

/// `df.at[label, header] = value`.
#[derive(Clone, Debug)]
pub struct SetCellValueChunk {
    pub table: usize,
    pub table_name: String,
    pub id: ColumnId,
    pub label: IndexLabel,
    pub value: Value,
    pub refresh: Vec<FormulaLine>,
    pub headers: ColumnHeaders,
    pub public_import: String,
}

impl CodeChunk for SetCellValueChunk {
    fn display_name(&self) -> &'static str {
        "Set cell value"
    }

    fn description_comment(&self) -> String {
        format!(
            "Set {} at {} in {} to {}",
            self.headers.get(&self.table_name, &self.id).unwrap_or(self.id.as_str()),
            self.label,
            self.table_name,
            self.value
        )
    }

    fn code(&self) -> Result<Code> {
        let mut lines = vec![format!(
            "{}.at[{}, {}] = {}",
            self.table_name,
            self.label.to_code(),
            self.headers.code(&self.table_name, &self.id)?,
            self.value.to_code()
        )];
        let (refresh, mut imports) =
            formula_code(&self.table_name, &self.refresh, &self.headers, &self.public_import)?;
        lines.extend(refresh);
        imports.extend(crate::codegen::imports_for(&lines));
        Ok((lines, imports))
    }

    fn modified_table_indexes(&self) -> TableSet {
        TableSet::one(self.table)
    }

    fn with_renamed_columns(&self, table: usize, renames: &Renames) -> Option<Box<dyn CodeChunk>> {
        (table == self.table).then(|| {
            Box::new(SetCellValueChunk {
                headers: self.headers.renamed(renames),
                ..self.clone()
            }) as Box<dyn CodeChunk>
        })
    }

    chunk_boilerplate!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::BinaryOp;

    fn headers(pairs: &[(&str, &str)]) -> ColumnHeaders {
        ColumnHeaders(
            pairs
                .iter()
                .map(|(id, h)| (ColumnId::new(*id), h.to_string()))
                .collect(),
        )
    }

    fn add_b() -> AddColumnChunk {
        AddColumnChunk {
            table: 0,
            table_name: "df".into(),
            id: ColumnId::new("B"),
            position: 1,
            headers: headers(&[("A", "A"), ("B", "B")]),
            formula: None,
            public_import: "from sheetstate.public.v3 import *".into(),
        }
    }

    fn a_plus_one() -> Expr {
        Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(Expr::Column(ColumnId::new("A"))),
            right: Box::new(Expr::Literal(Value::Int(1))),
        }
    }

    #[test]
    fn test_add_then_delete_vanishes() {
        let delete = DeleteColumnsChunk {
            table: 0,
            table_name: "df".into(),
            headers: vec!["B".into()],
        };
        assert_eq!(add_b().combine_right(&delete).unwrap().len(), 0);
    }

    #[test]
    fn test_add_then_formula_becomes_one_insert() {
        let set = SetFormulaChunk {
            table: 0,
            table_name: "df".into(),
            lines: vec![FormulaLine {
                target: ColumnId::new("B"),
                expr: a_plus_one(),
                applied_to: AppliedTo::EntireColumn,
            }],
            headers: headers(&[("A", "A"), ("B", "B")]),
            public_import: "from sheetstate.public.v3 import *".into(),
        };
        let fused = add_b().combine_right(&set).unwrap();
        assert_eq!(fused.len(), 1);
        let (lines, imports) = fused[0].code().unwrap();
        assert_eq!(lines, vec!["df.insert(1, 'B', df['A'] + 1)"]);
        assert!(imports.is_empty());
    }

    #[test]
    fn test_rename_hoists_and_rewrites_formula() {
        let mut add = add_b();
        add.formula = Some(a_plus_one());
        let rename = RenameColumnsChunk {
            table: 0,
            table_name: "df".into(),
            renames: vec![("A".into(), "X".into())],
        };
        let hoisted = rename.combine_left(&add).unwrap();
        assert_eq!(hoisted.len(), 2);
        assert_eq!(
            hoisted[0].code().unwrap().0,
            vec!["df.rename(columns={'A': 'X'}, inplace=True)"]
        );
        assert_eq!(hoisted[1].code().unwrap().0, vec!["df.insert(1, 'B', df['X'] + 1)"]);
    }

    #[test]
    fn test_rename_of_created_column_is_absorbed() {
        let rename = RenameColumnsChunk {
            table: 0,
            table_name: "df".into(),
            renames: vec![("B".into(), "C".into())],
        };
        let hoisted = rename.combine_left(&add_b()).unwrap();
        assert_eq!(hoisted.len(), 1);
        assert_eq!(hoisted[0].code().unwrap().0, vec!["df.insert(1, 'C', 0)"]);
    }

    #[test]
    fn test_rename_chain_composes() {
        let first = RenameColumnsChunk {
            table: 0,
            table_name: "df".into(),
            renames: vec![("A".into(), "B".into())],
        };
        let second = RenameColumnsChunk {
            renames: vec![("B".into(), "C".into())],
            ..first.clone()
        };
        let fused = first.combine_right(&second).unwrap();
        assert_eq!(
            fused[0].code().unwrap().0,
            vec!["df.rename(columns={'A': 'C'}, inplace=True)"]
        );

        let back = RenameColumnsChunk {
            renames: vec![("B".into(), "A".into())],
            ..first.clone()
        };
        assert!(first.combine_right(&back).unwrap().is_empty());
    }

    #[test]
    fn test_delete_after_rename_uses_old_headers() {
        let rename = RenameColumnsChunk {
            table: 0,
            table_name: "df".into(),
            renames: vec![("A".into(), "X".into()), ("B".into(), "Y".into())],
        };
        let delete = DeleteColumnsChunk {
            table: 0,
            table_name: "df".into(),
            headers: vec!["X".into()],
        };
        let fused = delete.combine_left(&rename).unwrap();
        assert_eq!(fused[0].code().unwrap().0, vec!["df.drop(['A'], axis=1, inplace=True)"]);
        assert_eq!(
            fused[1].code().unwrap().0,
            vec!["df.rename(columns={'B': 'Y'}, inplace=True)"]
        );
    }

    #[test]
    fn test_formula_then_delete_requires_covering_dependents() {
        let set = SetFormulaChunk {
            table: 0,
            table_name: "df".into(),
            lines: vec![
                FormulaLine {
                    target: ColumnId::new("B"),
                    expr: a_plus_one(),
                    applied_to: AppliedTo::EntireColumn,
                },
                FormulaLine {
                    target: ColumnId::new("C"),
                    expr: Expr::Column(ColumnId::new("B")),
                    applied_to: AppliedTo::EntireColumn,
                },
            ],
            headers: headers(&[("A", "A"), ("B", "B"), ("C", "C")]),
            public_import: String::new(),
        };
        let only_b = DeleteColumnsChunk {
            table: 0,
            table_name: "df".into(),
            headers: vec!["B".into()],
        };
        assert!(only_b.combine_left(&set).is_none());
        let both = DeleteColumnsChunk {
            headers: vec!["B".into(), "C".into()],
            ..only_b
        };
        assert_eq!(both.combine_left(&set).unwrap().len(), 1);
    }

    #[test]
    fn test_fill_na_code_for_selected_columns() {
        let chunk = FillNaChunk {
            table: 0,
            table_name: "df".into(),
            ids: Some(vec![ColumnId::new("A")]),
            method: FillNaMethod::Value {
                value: serde_json::json!(0),
            },
            refresh: Vec::new(),
            headers: headers(&[("A", "A")]),
            public_import: String::new(),
        };
        assert_eq!(chunk.code().unwrap().0, vec!["df.fillna({'A': 0}, inplace=True)"]);
    }
}
