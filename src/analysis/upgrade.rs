//! Bring saved steps up to the versions the registry runs.
//!
//! Each upgrader takes one step at a known `(step_type, step_version)` and
//! the steps after it, and returns the steps that replace it. Upgraders are
//! chained until no upgrader matches.

use super::format::StepData;
use crate::error::{Result, SheetError};
use crate::steps::{Params, StepRegistry};
use serde_json::{json, Value as Json};
use tracing::debug;

type Upgrader = fn(StepData, &[StepData]) -> Result<Vec<StepData>>;

const UPGRADERS: &[(&str, u32, Upgrader)] = &[
    ("add_column", 1, add_column_1_to_2),
    ("reorder_column", 1, reorder_column_1_to_2),
    ("change_column_type", 1, change_column_type_to_dtype),
    ("filter_column", 1, filter_column_1_to_2),
    ("set_column_formula", 1, set_column_formula_1_to_2),
    ("merge", 1, merge_1_to_2),
    ("simple_import", 1, simple_import_1_to_2),
];

fn upgrader(step: &StepData) -> Option<Upgrader> {
    UPGRADERS
        .iter()
        .find(|(step_type, version, _)| *step_type == step.step_type && *version == step.step_version)
        .map(|(_, _, f)| *f)
}

fn bad_params(step: &StepData, message: &str) -> SheetError {
    SheetError::InvalidFormat(format!(
        "{} version {}: {}",
        step.step_type, step.step_version, message
    ))
}

fn take(params: &mut Params, step: &StepData, key: &str) -> Result<Json> {
    params
        .remove(key)
        .ok_or_else(|| bad_params(step, &format!("missing {}", key)))
}

/// Upgrade every step and check the result is runnable by `registry`.
pub fn upgrade_steps(steps: Vec<StepData>, registry: &StepRegistry) -> Result<Vec<StepData>> {
    let mut pending: Vec<StepData> = steps;
    pending.reverse();
    let mut upgraded = Vec::with_capacity(pending.len());

    while let Some(step) = pending.pop() {
        match upgrader(&step) {
            Some(f) => {
                debug!(step_type = %step.step_type, from = step.step_version, "upgrading step");
                let later: Vec<StepData> = pending.iter().rev().cloned().collect();
                let replacement = f(step, &later)?;
                pending.extend(replacement.into_iter().rev());
            }
            None => {
                let index = upgraded.len();
                let performer = registry.get(&step.step_type).ok_or_else(|| SheetError::ReplayFailed {
                    step_index: index,
                    step_type: step.step_type.clone(),
                    message: "unknown step type".into(),
                })?;
                if performer.step_version() != step.step_version {
                    return Err(SheetError::ReplayFailed {
                        step_index: index,
                        step_type: step.step_type.clone(),
                        message: format!(
                            "saved at version {}, which cannot be upgraded to {}",
                            step.step_version,
                            performer.step_version()
                        ),
                    });
                }
                upgraded.push(step);
            }
        }
    }
    Ok(upgraded)
}

fn add_column_1_to_2(mut step: StepData, _later: &[StepData]) -> Result<Vec<StepData>> {
    step.params.entry("column_header_index").or_insert(json!(-1));
    step.step_version = 2;
    Ok(vec![step])
}

fn reorder_column_1_to_2(mut step: StepData, _later: &[StepData]) -> Result<Vec<StepData>> {
    let mut params = std::mem::take(&mut step.params);
    let index = take(&mut params, &step, "new_index")?;
    params.insert("new_column_index".into(), index);
    step.params = params;
    step.step_version = 2;
    Ok(vec![step])
}

fn dtype_name(old: &str) -> &'static str {
    match old {
        "bool" => "bool",
        "int" | "int64" => "int",
        "float" | "float64" => "float",
        "datetime" | "datetime64[ns]" => "datetime",
        "timedelta" | "timedelta64[ns]" => "timedelta",
        _ => "string",
    }
}

fn change_column_type_to_dtype(mut step: StepData, _later: &[StepData]) -> Result<Vec<StepData>> {
    let mut params = std::mem::take(&mut step.params);
    let column_id = take(&mut params, &step, "column_id")?;
    let new_type = take(&mut params, &step, "new_column_type")?;
    let new_type = new_type
        .as_str()
        .ok_or_else(|| bad_params(&step, "new_column_type is not a string"))?;
    let mut upgraded = Params::new();
    upgraded.insert("sheet_index".into(), take(&mut params, &step, "sheet_index")?);
    upgraded.insert("column_ids".into(), json!([column_id]));
    upgraded.insert("new_dtype".into(), json!(dtype_name(new_type)));
    Ok(vec![StepData {
        step_version: 1,
        step_type: "change_column_dtype".into(),
        step_id: step.step_id,
        params: upgraded,
    }])
}

fn filter_column_1_to_2(mut step: StepData, _later: &[StepData]) -> Result<Vec<StepData>> {
    step.params.entry("operator").or_insert(json!("and"));
    step.step_version = 2;
    Ok(vec![step])
}

fn set_column_formula_1_to_2(mut step: StepData, _later: &[StepData]) -> Result<Vec<StepData>> {
    step.params
        .entry("index_labels_formula_is_applied_to")
        .or_insert(json!({"type": "entire_column"}));
    step.step_version = 2;
    Ok(vec![step])
}

fn merge_1_to_2(mut step: StepData, _later: &[StepData]) -> Result<Vec<StepData>> {
    let mut params = std::mem::take(&mut step.params);
    let one = take(&mut params, &step, "merge_key_column_id_one")?;
    let two = take(&mut params, &step, "merge_key_column_id_two")?;
    params.insert("merge_key_column_ids".into(), json!([[one, two]]));
    params.entry("how").or_insert(json!("lookup"));
    step.params = params;
    step.step_version = 2;
    Ok(vec![step])
}

/// Version 1 imports cleaned headers as they read them; version 2 keeps
/// headers as written, so the cleanup becomes its own step.
fn simple_import_1_to_2(mut step: StepData, later: &[StepData]) -> Result<Vec<StepData>> {
    step.step_version = 2;
    if later.first().map(|s| s.step_type.as_str()) == Some("bulk_old_rename") {
        return Ok(vec![step]);
    }
    Ok(vec![step, StepData::new("bulk_old_rename", 1, Params::new())])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(step_type: &str, version: u32, params: Json) -> StepData {
        StepData::new(step_type, version, params.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_upgrades_chain_to_current_versions() {
        let registry = StepRegistry::new();
        let steps = vec![
            step("simple_import", 1, json!({"file_names": ["a.csv"]})),
            step("add_column", 1, json!({"sheet_index": 0, "column_header": "B"})),
            step(
                "merge",
                1,
                json!({
                    "sheet_index_one": 0, "sheet_index_two": 1,
                    "merge_key_column_id_one": "K", "merge_key_column_id_two": "K",
                    "selected_column_ids_one": [], "selected_column_ids_two": []
                }),
            ),
            step(
                "change_column_type",
                1,
                json!({"sheet_index": 0, "column_id": "A", "new_column_type": "float64"}),
            ),
        ];
        let upgraded = upgrade_steps(steps, &registry).unwrap();
        let types: Vec<(&str, u32)> = upgraded
            .iter()
            .map(|s| (s.step_type.as_str(), s.step_version))
            .collect();
        assert_eq!(
            types,
            vec![
                ("simple_import", 2),
                ("bulk_old_rename", 1),
                ("add_column", 2),
                ("merge", 2),
                ("change_column_dtype", 1)
            ]
        );
        assert_eq!(upgraded[2].params["column_header_index"], json!(-1));
        assert_eq!(upgraded[3].params["merge_key_column_ids"], json!([["K", "K"]]));
        assert_eq!(upgraded[4].params["new_dtype"], json!("float"));
    }

    #[test]
    fn test_existing_cleanup_is_not_duplicated() {
        let registry = StepRegistry::new();
        let steps = vec![
            step("simple_import", 1, json!({"file_names": ["a.csv"]})),
            step("bulk_old_rename", 1, json!({})),
        ];
        assert_eq!(upgrade_steps(steps, &registry).unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_steps_fail_replay() {
        let registry = StepRegistry::new();
        let err = upgrade_steps(vec![step("graph", 1, json!({}))], &registry).unwrap_err();
        assert!(matches!(err, SheetError::ReplayFailed { .. }));
        let err = upgrade_steps(vec![step("add_column", 9, json!({}))], &registry).unwrap_err();
        assert!(matches!(err, SheetError::ReplayFailed { .. }));
    }
}
