//! Import steps.
//!
//! Imports are the only steps that touch the outside world. Everything they
//! read happens inside `saturate` or `execute`, and every handle is dropped
//! before those return.

use super::tables::dedupe_headers;
use super::{record, recorded, ExecutionData, TranspileContext, TypedStepPerformer};
use crate::codegen::chunks::{CsvFile, SimpleImportChunk, StatementChunk};
use crate::codegen::{CodeChunk, TableSet};
use crate::error::{Result, SheetError};
use crate::state::State;
use crate::table::convert::parse_bool;
use crate::table::{range_index, Column, Table};
use crate::types::{python_string, TableSource, Value};
use calamine::{open_workbook_auto, Data, DataType, Range, Reader};
use encoding_rs::Encoding;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

const NEW_TABLES: &str = "new_sheet_indexes";

const DELIMITER_CANDIDATES: [&str; 4] = [",", ";", "\t", "|"];

fn created_indexes(ctx: &TranspileContext<'_>) -> Vec<usize> {
    recorded(ctx.execution_data, NEW_TABLES)
}

fn created_names(ctx: &TranspileContext<'_>) -> Result<Vec<String>> {
    created_indexes(ctx)
        .into_iter()
        .map(|i| ctx.post.table_name(i).map(str::to_string))
        .collect()
}

/// Add each table, recording the indexes they land at.
fn add_imported(prev: &State, tables: Vec<(String, Table)>) -> Result<(State, ExecutionData)> {
    let mut post = prev.clone();
    let mut created = Vec::with_capacity(tables.len());
    for (name, table) in tables {
        created.push(post.add_table(table, &name, TableSource::Imported)?);
    }
    let mut data = ExecutionData::new();
    record(&mut data, NEW_TABLES, created)?;
    Ok((post, data))
}

fn creating_chunk(
    display_name: &'static str,
    description: String,
    created: Vec<usize>,
    lines: Vec<String>,
) -> StatementChunk {
    let mut chunk = StatementChunk::creating(display_name, description, 0, lines);
    chunk.created = created.into_iter().collect::<BTreeSet<_>>();
    chunk
}

fn read_bytes(path: &str) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SheetError::FileNotFound(path.into()),
        _ => SheetError::Io(e),
    })
}

fn table_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "df".to_string())
}

/// Type a column of raw text the way pandas' reader would: integers, then
/// floats, then booleans, falling back to the original strings.
fn typed_column(header: String, cells: Vec<Option<String>>) -> Column {
    let present = || cells.iter().flatten();
    let values: Vec<Value> = if present().all(|c| c.trim().parse::<i64>().is_ok()) {
        cells
            .iter()
            .map(|c| match c {
                Some(text) => text.trim().parse().map(Value::Int).unwrap_or(Value::Missing),
                None => Value::Missing,
            })
            .collect()
    } else if present().all(|c| c.trim().parse::<f64>().is_ok()) {
        cells
            .iter()
            .map(|c| match c {
                Some(text) => text.trim().parse().map(Value::float).unwrap_or(Value::Missing),
                None => Value::Missing,
            })
            .collect()
    } else if present().all(|c| matches!(c.trim(), "True" | "False" | "true" | "false" | "TRUE" | "FALSE")) {
        cells
            .iter()
            .map(|c| c.as_deref().and_then(parse_bool).map(Value::Bool).unwrap_or(Value::Missing))
            .collect()
    } else {
        cells
            .into_iter()
            .map(|c| c.map(Value::Str).unwrap_or(Value::Missing))
            .collect()
    };
    Column::new(header, values)
}

/// Build a table from a header row and text rows. Short rows are padded
/// with missing cells; long rows are cut to the header width.
fn table_from_text(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Result<Table> {
    let headers = dedupe_headers(headers);
    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(rows.len()); headers.len()];
    for row in rows {
        for (i, column) in cells.iter_mut().enumerate() {
            column.push(row.get(i).cloned().flatten());
        }
    }
    let columns: Vec<Column> = headers
        .into_iter()
        .zip(cells)
        .map(|(header, column)| typed_column(header, column))
        .collect();
    let num_rows = columns.first().map(Column::len).unwrap_or(0);
    Table::from_parts(range_index(num_rows), columns)
}

// --- simple_import ---

pub struct SimpleImport;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimpleImportParams {
    pub file_names: Vec<String>,
    #[serde(default)]
    pub delimiters: Option<Vec<String>>,
    #[serde(default)]
    pub encodings: Option<Vec<String>>,
}

/// Utf-8 when the bytes decode cleanly, windows-1252 otherwise.
pub fn detect_encoding(bytes: &[u8]) -> &'static str {
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if std::str::from_utf8(body).is_ok() {
        "utf-8"
    } else {
        "windows-1252"
    }
}

/// The most frequent candidate delimiter on the first line.
pub fn detect_delimiter(text: &str) -> &'static str {
    let first = text.lines().next().unwrap_or_default();
    DELIMITER_CANDIDATES
        .iter()
        .copied()
        .map(|d| (d, first.matches(d).count()))
        .filter(|(_, count)| *count > 0)
        .fold(None, |best: Option<(&str, usize)>, (d, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((d, count)),
        })
        .map(|(d, _)| d)
        .unwrap_or(",")
}

fn decode(path: &str, bytes: &[u8], label: &str) -> Result<String> {
    let bad = || SheetError::BadEncoding {
        path: path.into(),
        encoding: label.to_string(),
    };
    let encoding = Encoding::for_label(label.as_bytes()).ok_or_else(bad)?;
    let (text, had_errors) = encoding.decode_with_bom_removal(bytes);
    if had_errors {
        return Err(bad());
    }
    Ok(text.into_owned())
}

/// Read one CSV file into a table.
pub fn read_csv(path: &str, delimiter: &str, encoding: &str) -> Result<Table> {
    let bytes = read_bytes(path)?;
    let text = decode(path, &bytes, encoding)?;
    let delimiter = match delimiter.as_bytes() {
        [byte] => *byte,
        _ => {
            return Err(SheetError::invalid_arg(format!(
                "delimiter must be a single character, got {:?}",
                delimiter
            )))
        }
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|cell| if cell.is_empty() { None } else { Some(cell.to_string()) })
                .collect(),
        );
    }
    debug!(path, rows = rows.len(), columns = headers.len(), "read csv");
    table_from_text(headers, rows)
}

impl TypedStepPerformer for SimpleImport {
    type Params = SimpleImportParams;

    const STEP_TYPE: &'static str = "simple_import";
    const STEP_VERSION: u32 = 2;
    const DISPLAY_NAME: &'static str = "Imported CSV Files";
    const IS_IMPORT: bool = true;

    fn saturate(&self, _prev: &State, mut params: SimpleImportParams) -> Result<SimpleImportParams> {
        if params.delimiters.is_some() && params.encodings.is_some() {
            return Ok(params);
        }
        let mut delimiters = Vec::with_capacity(params.file_names.len());
        let mut encodings = Vec::with_capacity(params.file_names.len());
        for path in &params.file_names {
            let bytes = read_bytes(path)?;
            let encoding = detect_encoding(&bytes);
            let text = decode(path, &bytes, encoding)?;
            delimiters.push(detect_delimiter(&text).to_string());
            encodings.push(encoding.to_string());
        }
        params.delimiters.get_or_insert(delimiters);
        params.encodings.get_or_insert(encodings);
        Ok(params)
    }

    fn execute(&self, prev: &State, params: &SimpleImportParams) -> Result<(State, ExecutionData)> {
        let mut tables = Vec::with_capacity(params.file_names.len());
        for (i, path) in params.file_names.iter().enumerate() {
            let delimiter = params
                .delimiters
                .as_ref()
                .and_then(|d| d.get(i))
                .map(String::as_str)
                .unwrap_or(",");
            let encoding = params
                .encodings
                .as_ref()
                .and_then(|e| e.get(i))
                .map(String::as_str)
                .unwrap_or("utf-8");
            tables.push((table_stem(path), read_csv(path, delimiter, encoding)?));
        }
        add_imported(prev, tables)
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &SimpleImportParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let created = created_indexes(ctx);
        let mut files = Vec::with_capacity(created.len());
        for (i, (path, index)) in params.file_names.iter().zip(&created).enumerate() {
            files.push(CsvFile {
                path: path.clone(),
                table_name: ctx.post.table_name(*index)?.to_string(),
                delimiter: params
                    .delimiters
                    .as_ref()
                    .and_then(|d| d.get(i).cloned())
                    .unwrap_or_else(|| ",".to_string()),
                encoding: params
                    .encodings
                    .as_ref()
                    .and_then(|e| e.get(i).cloned())
                    .unwrap_or_else(|| "utf-8".to_string()),
            });
        }
        Ok(vec![Box::new(SimpleImportChunk {
            files,
            created: created.into_iter().collect(),
        })])
    }

    fn modified_table_indexes(&self, _params: &SimpleImportParams) -> TableSet {
        TableSet::none()
    }

    fn describe(&self, params: &SimpleImportParams) -> String {
        format!("Imported {}", params.file_names.join(", "))
    }
}

// --- excel_import ---

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Missing,
        Data::String(s) if s.is_empty() => Value::Missing,
        Data::String(s) => Value::Str(s.clone()),
        Data::Int(i) => Value::Int(*i),
        Data::Float(f) => Value::float(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(_) | Data::DateTimeIso(_) => cell
            .as_datetime()
            .map(Value::Timestamp)
            .unwrap_or_else(|| Value::Str(cell.to_string())),
        Data::DurationIso(s) => Value::Str(s.clone()),
        Data::Error(_) => Value::Missing,
    }
}

/// Turn a worksheet range into a table. Without headers the columns are
/// named by position.
fn table_from_range(range: &Range<Data>, has_headers: bool, skiprows: usize) -> Result<Table> {
    let mut rows = range.rows().skip(skiprows);
    let width = range.width();
    let headers: Vec<String> = if has_headers {
        match rows.next() {
            Some(row) => (0..width)
                .map(|i| match row.get(i) {
                    Some(Data::Empty) | None => String::new(),
                    Some(Data::Float(f)) if f.fract() == 0.0 => format!("{}", *f as i64),
                    Some(cell) => cell.to_string(),
                })
                .collect(),
            None => Vec::new(),
        }
    } else {
        (0..width).map(|i| i.to_string()).collect()
    };
    let body: Vec<&[Data]> = rows.collect();
    let headers = dedupe_headers(headers);
    let columns = headers
        .into_iter()
        .enumerate()
        .map(|(i, header)| {
            let values = body
                .iter()
                .map(|row| row.get(i).map(cell_value).unwrap_or(Value::Missing))
                .collect();
            Column::new(header, values)
        })
        .collect::<Vec<_>>();
    Table::from_parts(range_index(body.len()), columns)
}

fn check_exists(path: &str) -> Result<()> {
    if Path::new(path).exists() {
        Ok(())
    } else {
        Err(SheetError::FileNotFound(path.into()))
    }
}

pub struct ExcelImport;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExcelImportParams {
    pub file_name: String,
    pub sheet_names: Vec<String>,
    #[serde(default = "default_true")]
    pub has_headers: bool,
    #[serde(default)]
    pub skiprows: usize,
}

fn default_true() -> bool {
    true
}

impl TypedStepPerformer for ExcelImport {
    type Params = ExcelImportParams;

    const STEP_TYPE: &'static str = "excel_import";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Imported Excel File";
    const IS_IMPORT: bool = true;

    fn execute(&self, prev: &State, params: &ExcelImportParams) -> Result<(State, ExecutionData)> {
        check_exists(&params.file_name)?;
        let mut workbook = open_workbook_auto(&params.file_name)?;
        let mut tables = Vec::with_capacity(params.sheet_names.len());
        for sheet in &params.sheet_names {
            let range = workbook.worksheet_range(sheet)?;
            let table = table_from_range(&range, params.has_headers, params.skiprows)?;
            debug!(file = %params.file_name, sheet = %sheet, rows = table.num_rows(), "read worksheet");
            tables.push((sheet.clone(), table));
        }
        drop(workbook);
        add_imported(prev, tables)
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &ExcelImportParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let names = created_names(ctx)?;
        let lines = params
            .sheet_names
            .iter()
            .zip(&names)
            .map(|(sheet, name)| {
                let mut args = vec![
                    python_string(&params.file_name),
                    format!("sheet_name={}", python_string(sheet)),
                ];
                if !params.has_headers {
                    args.push("header=None".to_string());
                }
                if params.skiprows > 0 {
                    args.push(format!("skiprows={}", params.skiprows));
                }
                format!("{} = pd.read_excel({})", name, args.join(", "))
            })
            .collect();
        Ok(vec![Box::new(creating_chunk(
            Self::DISPLAY_NAME,
            format!("Imported {}", params.file_name),
            created_indexes(ctx),
            lines,
        ))])
    }

    fn modified_table_indexes(&self, _params: &ExcelImportParams) -> TableSet {
        TableSet::none()
    }

    fn describe(&self, params: &ExcelImportParams) -> String {
        format!("Imported {} from {}", params.sheet_names.join(", "), params.file_name)
    }
}

// --- excel_range_import ---

static A1_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$?([A-Za-z]+)\$?(\d+):\$?([A-Za-z]+)\$?(\d+)$").expect("valid range regex"));

/// Zero-based column index of spreadsheet column letters.
fn column_index(letters: &str) -> u32 {
    letters
        .chars()
        .fold(0u32, |acc, c| acc * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1))
        - 1
}

/// A parsed `A1:C5` range as zero-based, inclusive corners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellRange {
    pub start: (u32, u32),
    pub end: (u32, u32),
}

impl CellRange {
    pub fn parse(text: &str) -> Result<CellRange> {
        let captures = A1_RANGE
            .captures(text.trim())
            .ok_or_else(|| SheetError::invalid_arg(format!("{} is not a cell range", text)))?;
        let row = |i: usize| -> Result<u32> {
            let n: u32 = captures[i]
                .parse()
                .map_err(|_| SheetError::invalid_arg(format!("bad row in {}", text)))?;
            n.checked_sub(1)
                .ok_or_else(|| SheetError::invalid_arg(format!("rows start at 1 in {}", text)))
        };
        let start = (row(2)?, column_index(&captures[1]));
        let end = (row(4)?, column_index(&captures[3]));
        if end.0 < start.0 || end.1 < start.1 {
            return Err(SheetError::invalid_arg(format!("{} is an inverted range", text)));
        }
        Ok(CellRange { start, end })
    }

    fn columns_code(&self) -> String {
        format!("{}:{}", column_letters(self.start.1), column_letters(self.end.1))
    }
}

fn column_letters(mut index: u32) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().collect()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RangeImport {
    pub range: String,
    pub df_name: String,
}

pub struct ExcelRangeImport;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExcelRangeImportParams {
    pub file_path: String,
    pub sheet_name: String,
    pub range_imports: Vec<RangeImport>,
}

impl TypedStepPerformer for ExcelRangeImport {
    type Params = ExcelRangeImportParams;

    const STEP_TYPE: &'static str = "excel_range_import";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Imported Excel Ranges";
    const IS_IMPORT: bool = true;

    fn execute(&self, prev: &State, params: &ExcelRangeImportParams) -> Result<(State, ExecutionData)> {
        let ranges = params
            .range_imports
            .iter()
            .map(|r| CellRange::parse(&r.range))
            .collect::<Result<Vec<_>>>()?;
        check_exists(&params.file_path)?;
        let mut workbook = open_workbook_auto(&params.file_path)?;
        let sheet = workbook.worksheet_range(&params.sheet_name)?;
        drop(workbook);
        let mut tables = Vec::with_capacity(ranges.len());
        for (range, import) in ranges.iter().zip(&params.range_imports) {
            let sub = sheet.range(range.start, range.end);
            tables.push((import.df_name.clone(), table_from_range(&sub, true, 0)?));
        }
        add_imported(prev, tables)
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &ExcelRangeImportParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let names = created_names(ctx)?;
        let mut lines = Vec::with_capacity(names.len());
        for (import, name) in params.range_imports.iter().zip(&names) {
            let range = CellRange::parse(&import.range)?;
            lines.push(format!(
                "{} = pd.read_excel({}, sheet_name={}, skiprows={}, nrows={}, usecols={})",
                name,
                python_string(&params.file_path),
                python_string(&params.sheet_name),
                range.start.0,
                range.end.0 - range.start.0,
                python_string(&range.columns_code()),
            ));
        }
        Ok(vec![Box::new(creating_chunk(
            Self::DISPLAY_NAME,
            format!("Imported ranges from {}", params.file_path),
            created_indexes(ctx),
            lines,
        ))])
    }

    fn modified_table_indexes(&self, _params: &ExcelRangeImportParams) -> TableSet {
        TableSet::none()
    }

    fn describe(&self, params: &ExcelRangeImportParams) -> String {
        format!(
            "Imported {} ranges from {}",
            params.range_imports.len(),
            params.file_path
        )
    }
}

// --- database_import ---

pub struct DatabaseImport;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseImportParams {
    pub connection: serde_json::Value,
    pub query: String,
    pub table_name: String,
}

impl TypedStepPerformer for DatabaseImport {
    type Params = DatabaseImportParams;

    const STEP_TYPE: &'static str = "database_import";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Imported from Database";
    const IS_IMPORT: bool = true;

    fn execute(&self, prev: &State, params: &DatabaseImportParams) -> Result<(State, ExecutionData)> {
        let runner = prev
            .extensions
            .query_runner
            .as_ref()
            .ok_or_else(|| SheetError::Import("no database connector is configured".into()))?;
        let table = runner.run_query(&params.connection, &params.query)?;
        add_imported(prev, vec![(params.table_name.clone(), table)])
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &DatabaseImportParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let runner = ctx
            .post
            .extensions
            .query_runner
            .as_ref()
            .ok_or_else(|| SheetError::Import("no database connector is configured".into()))?;
        let names = created_names(ctx)?;
        let name = names.first().map(String::as_str).unwrap_or(&params.table_name);
        let (lines, imports) = runner.code(&params.connection, &params.query, name);
        Ok(vec![Box::new(
            creating_chunk(
                Self::DISPLAY_NAME,
                format!("Queried {}", name),
                created_indexes(ctx),
                lines,
            )
            .with_imports(imports),
        )])
    }

    fn modified_table_indexes(&self, _params: &DatabaseImportParams) -> TableSet {
        TableSet::none()
    }

    fn describe(&self, params: &DatabaseImportParams) -> String {
        format!("Imported {} from a database", params.table_name)
    }
}

// --- dataframe_import ---

pub struct DataframeImport;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataframeImportParams {
    pub variable_names: Vec<String>,
}

impl TypedStepPerformer for DataframeImport {
    type Params = DataframeImportParams;

    const STEP_TYPE: &'static str = "dataframe_import";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Imported Dataframes";
    const IS_IMPORT: bool = true;

    fn execute(&self, prev: &State, params: &DataframeImportParams) -> Result<(State, ExecutionData)> {
        let resolver = prev
            .extensions
            .variable_resolver
            .as_ref()
            .ok_or_else(|| SheetError::Import("no variables are available to import".into()))?;
        let tables = params
            .variable_names
            .iter()
            .map(|name| {
                resolver
                    .resolve(name)
                    .map(|table| (name.clone(), table))
                    .ok_or_else(|| SheetError::Import(format!("{} is not a dataframe in scope", name)))
            })
            .collect::<Result<Vec<_>>>()?;
        add_imported(prev, tables)
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &DataframeImportParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let names = created_names(ctx)?;
        let lines = params
            .variable_names
            .iter()
            .zip(&names)
            .map(|(variable, name)| format!("{} = {}.copy(deep=True)", name, variable))
            .collect();
        Ok(vec![Box::new(creating_chunk(
            Self::DISPLAY_NAME,
            format!("Imported {}", params.variable_names.join(", ")),
            created_indexes(ctx),
            lines,
        ))])
    }

    fn modified_table_indexes(&self, _params: &DataframeImportParams) -> TableSet {
        TableSet::none()
    }

    fn describe(&self, params: &DataframeImportParams) -> String {
        format!("Imported {}", params.variable_names.join(", "))
    }
}

// --- user_defined_import ---

pub struct UserDefinedImport;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserDefinedImportParams {
    pub importer: String,
    #[serde(default)]
    pub importer_params: serde_json::Map<String, serde_json::Value>,
}

impl TypedStepPerformer for UserDefinedImport {
    type Params = UserDefinedImportParams;

    const STEP_TYPE: &'static str = "user_defined_import";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "User Defined Import";
    const IS_IMPORT: bool = true;

    fn execute(&self, prev: &State, params: &UserDefinedImportParams) -> Result<(State, ExecutionData)> {
        let importer = prev
            .extensions
            .importer(&params.importer)
            .ok_or_else(|| SheetError::Import(format!("no importer named {}", params.importer)))?;
        let tables = importer.import(&params.importer_params)?;
        if tables.is_empty() {
            return Err(SheetError::Import(format!("{} returned no tables", params.importer)));
        }
        add_imported(prev, tables)
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &UserDefinedImportParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let names = created_names(ctx)?;
        let args: Vec<String> = params
            .importer_params
            .iter()
            .map(|(k, v)| format!("{}={}", k, Value::from_json(v).to_code()))
            .collect();
        let line = format!("{} = {}({})", names.join(", "), params.importer, args.join(", "));
        Ok(vec![Box::new(creating_chunk(
            Self::DISPLAY_NAME,
            format!("Imported with {}", params.importer),
            created_indexes(ctx),
            vec![line],
        ))])
    }

    fn modified_table_indexes(&self, _params: &UserDefinedImportParams) -> TableSet {
        TableSet::none()
    }

    fn describe(&self, params: &UserDefinedImportParams) -> String {
        format!("Imported with {}", params.importer)
    }
}
