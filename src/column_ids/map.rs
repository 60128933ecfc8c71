//! Per-sheet ColumnId ↔ header mapping.

use crate::error::{Result, SheetError};
use crate::types::ColumnId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Column ids of one sheet, in column order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetColumnIds {
    order: Vec<ColumnId>,
    id_to_header: HashMap<ColumnId, String>,
    header_to_id: HashMap<String, ColumnId>,
    /// Every id ever issued for this sheet, so a deleted id is never reissued.
    used: HashSet<ColumnId>,
}

impl SheetColumnIds {
    fn next_id(&self, header: &str) -> ColumnId {
        let base = ColumnId::new(header);
        if !self.used.contains(&base) {
            return base;
        }
        (1..)
            .map(|n| ColumnId::new(format!("{}_{}", header, n)))
            .find(|id| !self.used.contains(id))
            .unwrap_or(base)
    }

    fn insert(&mut self, position: usize, header: &str) -> Result<ColumnId> {
        if self.header_to_id.contains_key(header) {
            return Err(SheetError::DuplicatedColumn {
                table: String::new(),
                header: header.to_string(),
            });
        }
        let id = self.next_id(header);
        self.insert_with_id(position, id.clone(), header);
        Ok(id)
    }

    fn insert_with_id(&mut self, position: usize, id: ColumnId, header: &str) {
        let position = position.min(self.order.len());
        self.order.insert(position, id.clone());
        self.used.insert(id.clone());
        self.header_to_id.insert(header.to_string(), id.clone());
        self.id_to_header.insert(id, header.to_string());
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ids(&self) -> &[ColumnId] {
        &self.order
    }

    pub fn headers(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter_map(|id| self.id_to_header.get(id).map(String::as_str))
            .collect()
    }

    pub fn get_id(&self, header: &str) -> Option<&ColumnId> {
        self.header_to_id.get(header)
    }

    pub fn get_header(&self, id: &ColumnId) -> Option<&str> {
        self.id_to_header.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &ColumnId) -> bool {
        self.id_to_header.contains_key(id)
    }
}

/// ColumnId ↔ header mapping for every sheet of a state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnIdMap {
    sheets: Vec<SheetColumnIds>,
}

impl ColumnIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_sheets(&self) -> usize {
        self.sheets.len()
    }

    fn sheet_mut(&mut self, sheet: usize) -> Result<&mut SheetColumnIds> {
        self.sheets
            .get_mut(sheet)
            .ok_or_else(|| SheetError::NoTable(format!("at index {}", sheet)))
    }

    pub fn sheet(&self, sheet: usize) -> Result<&SheetColumnIds> {
        self.sheets
            .get(sheet)
            .ok_or_else(|| SheetError::NoTable(format!("at index {}", sheet)))
    }

    // --- Sheets ---

    /// Register a new sheet with the given headers; returns its ids in order.
    pub fn add_sheet<S: AsRef<str>>(&mut self, headers: &[S]) -> Result<Vec<ColumnId>> {
        let mut sheet = SheetColumnIds::default();
        let mut ids = Vec::with_capacity(headers.len());
        for header in headers {
            let end = sheet.len();
            ids.push(sheet.insert(end, header.as_ref())?);
        }
        self.sheets.push(sheet);
        Ok(ids)
    }

    /// Register a copy of an existing sheet that keeps the same ids.
    pub fn duplicate_sheet(&mut self, sheet: usize) -> Result<()> {
        let copy = self.sheet(sheet)?.clone();
        self.sheets.push(copy);
        Ok(())
    }

    pub fn remove_sheet(&mut self, sheet: usize) -> Result<SheetColumnIds> {
        if sheet >= self.sheets.len() {
            return Err(SheetError::NoTable(format!("at index {}", sheet)));
        }
        Ok(self.sheets.remove(sheet))
    }

    /// Re-key a sheet whose headers were rebuilt in place.
    ///
    /// Headers that survive keep their ids; the others are retired and fresh
    /// ids are issued for the new headers.
    pub fn reset_sheet<S: AsRef<str>>(&mut self, sheet: usize, headers: &[S]) -> Result<Vec<ColumnId>> {
        let entry = self.sheet_mut(sheet)?;
        let old = std::mem::take(&mut entry.header_to_id);
        entry.order.clear();
        entry.id_to_header.clear();
        let mut ids = Vec::with_capacity(headers.len());
        for header in headers {
            let header = header.as_ref();
            let end = entry.len();
            match old.get(header) {
                Some(id) if !entry.header_to_id.contains_key(header) => {
                    entry.insert_with_id(end, id.clone(), header);
                    ids.push(id.clone());
                }
                _ => ids.push(entry.insert(end, header)?),
            }
        }
        Ok(ids)
    }

    // --- Columns ---

    /// Add a column at the end of the sheet.
    pub fn add(&mut self, sheet: usize, header: &str) -> Result<ColumnId> {
        let entry = self.sheet_mut(sheet)?;
        let end = entry.len();
        entry.insert(end, header)
    }

    /// Add a column at a position.
    pub fn insert(&mut self, sheet: usize, position: usize, header: &str) -> Result<ColumnId> {
        self.sheet_mut(sheet)?.insert(position, header)
    }

    /// Remove a column; its id is retired. Returns the removed header.
    pub fn remove(&mut self, sheet: usize, id: &ColumnId) -> Result<String> {
        let entry = self.sheet_mut(sheet)?;
        let header = entry
            .id_to_header
            .remove(id)
            .ok_or_else(|| SheetError::no_column("", id.as_str()))?;
        entry.header_to_id.remove(&header);
        entry.order.retain(|other| other != id);
        Ok(header)
    }

    /// Change the header of a column; the id is kept.
    pub fn rename(&mut self, sheet: usize, id: &ColumnId, new_header: &str) -> Result<()> {
        let entry = self.sheet_mut(sheet)?;
        let old = entry
            .id_to_header
            .get(id)
            .cloned()
            .ok_or_else(|| SheetError::no_column("", id.as_str()))?;
        if old == new_header {
            return Ok(());
        }
        if entry.header_to_id.contains_key(new_header) {
            return Err(SheetError::DuplicatedColumn {
                table: String::new(),
                header: new_header.to_string(),
            });
        }
        entry.header_to_id.remove(&old);
        entry
            .header_to_id
            .insert(new_header.to_string(), id.clone());
        entry.id_to_header.insert(id.clone(), new_header.to_string());
        Ok(())
    }

    /// Move a column to `new_position` (clamped).
    pub fn reorder(&mut self, sheet: usize, id: &ColumnId, new_position: usize) -> Result<()> {
        let entry = self.sheet_mut(sheet)?;
        let position = entry
            .order
            .iter()
            .position(|other| other == id)
            .ok_or_else(|| SheetError::no_column("", id.as_str()))?;
        let id = entry.order.remove(position);
        let new_position = new_position.min(entry.order.len());
        entry.order.insert(new_position, id);
        Ok(())
    }

    pub fn get_id(&self, sheet: usize, header: &str) -> Option<&ColumnId> {
        self.sheets.get(sheet)?.get_id(header)
    }

    pub fn get_header(&self, sheet: usize, id: &ColumnId) -> Option<&str> {
        self.sheets.get(sheet)?.get_header(id)
    }

    pub fn ids(&self, sheet: usize) -> Vec<ColumnId> {
        self.sheets
            .get(sheet)
            .map(|s| s.ids().to_vec())
            .unwrap_or_default()
    }

    pub fn headers(&self, sheet: usize) -> Vec<String> {
        self.sheets
            .get(sheet)
            .map(|s| s.headers().into_iter().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Id → header lookup for one sheet.
    pub fn header_map(&self, sheet: usize) -> HashMap<ColumnId, String> {
        self.sheets
            .get(sheet)
            .map(|s| s.id_to_header.clone())
            .unwrap_or_default()
    }

    /// `{sheet index: {id: header}}` for the host.
    pub fn to_json(&self) -> serde_json::Value {
        let sheets: Vec<serde_json::Value> = self
            .sheets
            .iter()
            .map(|sheet| {
                let mut map = serde_json::Map::new();
                for id in sheet.ids() {
                    if let Some(header) = sheet.get_header(id) {
                        map.insert(id.to_string(), serde_json::Value::String(header.to_string()));
                    }
                }
                serde_json::Value::Object(map)
            })
            .collect();
        serde_json::Value::Array(sheets)
    }
}
