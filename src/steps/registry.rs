use super::columns::{
    AddColumn, ChangeColumnDtype, ChangeColumnFormat, ColumnHeadersTransform, DeleteColumn, FillNa,
    OneHotEncoding, RenameColumn, ReorderColumn, SetColumnFormula, SplitTextToColumns,
};
use super::export::ExportToFile;
use super::imports::{DataframeImport, DatabaseImport, ExcelImport, ExcelRangeImport, SimpleImport, UserDefinedImport};
use super::merge::Merge;
use super::meta::{BulkOldRename, Initialize};
use super::pivot::Pivot;
use super::rows::{DeleteRow, PromoteRowToHeader, ResetIndex};
use super::tables::{
    Concat, DataframeDelete, DataframeDuplicate, DataframeRename, DropDuplicates, FilterColumn, Melt,
    Replace, SetCellValue, SetDataframeFormat, Sort, Transpose,
};
use super::StepPerformer;
use std::collections::HashMap;
use std::sync::Arc;

/// Every step kind the engine knows, keyed by step type.
pub struct StepRegistry {
    performers: HashMap<&'static str, Arc<dyn StepPerformer>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        let all: Vec<Arc<dyn StepPerformer>> = vec![
            Arc::new(Initialize),
            Arc::new(BulkOldRename),
            Arc::new(AddColumn),
            Arc::new(DeleteColumn),
            Arc::new(RenameColumn),
            Arc::new(ReorderColumn),
            Arc::new(SetColumnFormula),
            Arc::new(ChangeColumnDtype),
            Arc::new(ChangeColumnFormat),
            Arc::new(SplitTextToColumns),
            Arc::new(FillNa),
            Arc::new(OneHotEncoding),
            Arc::new(ColumnHeadersTransform),
            Arc::new(DeleteRow),
            Arc::new(PromoteRowToHeader),
            Arc::new(ResetIndex),
            Arc::new(DataframeDuplicate),
            Arc::new(DataframeDelete),
            Arc::new(DataframeRename),
            Arc::new(Transpose),
            Arc::new(Melt),
            Arc::new(Concat),
            Arc::new(DropDuplicates),
            Arc::new(Sort),
            Arc::new(FilterColumn),
            Arc::new(SetCellValue),
            Arc::new(SetDataframeFormat),
            Arc::new(Replace),
            Arc::new(Merge),
            Arc::new(Pivot),
            Arc::new(SimpleImport),
            Arc::new(ExcelImport),
            Arc::new(ExcelRangeImport),
            Arc::new(DatabaseImport),
            Arc::new(DataframeImport),
            Arc::new(UserDefinedImport),
            Arc::new(ExportToFile),
        ];
        StepRegistry {
            performers: all.into_iter().map(|p| (p.step_type(), p)).collect(),
        }
    }

    pub fn get(&self, step_type: &str) -> Option<Arc<dyn StepPerformer>> {
        self.performers.get(step_type).cloned()
    }

    /// The performer run by an `{step_type}_edit` event.
    pub fn by_event_type(&self, event_type: &str) -> Option<Arc<dyn StepPerformer>> {
        event_type.strip_suffix("_edit").and_then(|step_type| self.get(step_type))
    }

    pub fn step_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.performers.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_is_registered_once() {
        let registry = StepRegistry::new();
        assert_eq!(registry.step_types().len(), 37);
        assert!(registry.get("pivot").is_some());
        assert!(registry.get("change_column_type").is_none());
    }

    #[test]
    fn test_lookup_by_event_type() {
        let registry = StepRegistry::new();
        let performer = registry.by_event_type("set_column_formula_edit").unwrap();
        assert_eq!(performer.step_type(), "set_column_formula");
        assert!(performer.step_event_type().ends_with("_edit"));
        assert!(registry.by_event_type("set_column_formula").is_none());
        assert!(registry.get("simple_import").unwrap().is_import());
    }
}
