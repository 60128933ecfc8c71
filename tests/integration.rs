//! Integration tests for whole editing sessions.

use serde_json::json;
use sheetstate::{
    EngineConfig, Extensions, ImportUpdate, Params, StepsManager, Value,
};
use std::fs;
use tempfile::TempDir;

fn params(value: serde_json::Value) -> Params {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("params must be an object, got {}", other),
    }
}

fn write_csv(dir: &TempDir, name: &str, body: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    path.to_string_lossy().into_owned()
}

fn session() -> StepsManager {
    StepsManager::new(EngineConfig::default(), Extensions::default()).unwrap()
}

fn import(manager: &mut StepsManager, paths: &[&str]) {
    manager
        .handle_edit("simple_import", None, params(json!({ "file_names": paths })))
        .unwrap();
}

fn edit(manager: &mut StepsManager, step_type: &str, value: serde_json::Value) {
    manager.handle_edit(step_type, None, params(value)).unwrap();
}

fn values(manager: &StepsManager, sheet: usize, header: &str) -> Vec<Value> {
    manager
        .curr_state()
        .table(sheet)
        .unwrap()
        .column(header)
        .unwrap_or_else(|| panic!("no column {}", header))
        .values
        .clone()
}

fn code(manager: &StepsManager) -> Vec<String> {
    manager.generate_code().unwrap().lines()
}

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::Int).collect()
}

// --- Scenarios ---

#[test]
fn test_formula_follows_renamed_column() {
    let dir = TempDir::new().unwrap();
    let t = write_csv(&dir, "t.csv", "A\n1\n2\n3\n");
    let mut manager = session();
    import(&mut manager, &[&t]);

    edit(&mut manager, "add_column", json!({"sheet_index": 0, "column_header": "B"}));
    edit(
        &mut manager,
        "set_column_formula",
        json!({"sheet_index": 0, "column_id": "B", "new_formula": "=A+1"}),
    );
    edit(
        &mut manager,
        "rename_column",
        json!({"sheet_index": 0, "column_id": "A", "new_column_header": "X"}),
    );

    let table = manager.curr_state().table(0).unwrap();
    assert_eq!(table.headers(), vec!["X", "B"]);
    assert_eq!(values(&manager, 0, "X"), ints(&[1, 2, 3]));
    assert_eq!(values(&manager, 0, "B"), ints(&[2, 3, 4]));

    let lines = code(&manager);
    let formula_line = lines
        .iter()
        .find(|line| line.contains("'B'") && line.contains("+ 1"))
        .unwrap_or_else(|| panic!("no formula line in {:#?}", lines));
    assert!(formula_line.contains("['X']"), "{}", formula_line);
    assert!(!formula_line.contains("['A']"), "{}", formula_line);
}

/// The line writing B's formula.
fn formula_line(lines: &[String]) -> &String {
    lines
        .iter()
        .find(|line| line.contains("'B'") && line.contains("+ 1"))
        .unwrap_or_else(|| panic!("no formula line in {:#?}", lines))
}

fn formula_then_rename(manager: &mut StepsManager, dir: &TempDir, between: &[(&str, serde_json::Value)]) {
    let t = write_csv(dir, "t.csv", "A\n3\n1\n2\n");
    import(manager, &[&t]);
    edit(manager, "add_column", json!({"sheet_index": 0, "column_header": "B"}));
    edit(
        manager,
        "set_column_formula",
        json!({"sheet_index": 0, "column_id": "B", "new_formula": "=A+1"}),
    );
    for (step_type, value) in between {
        edit(manager, step_type, value.clone());
    }
    edit(
        manager,
        "rename_column",
        json!({"sheet_index": 0, "column_id": "A", "new_column_header": "X"}),
    );
}

#[test]
fn test_formula_follows_rename_without_optimizer() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig {
        optimize: false,
        ..Default::default()
    };
    let mut manager = StepsManager::new(config, Extensions::default()).unwrap();
    formula_then_rename(&mut manager, &dir, &[]);

    let lines = code(&manager);
    let line = formula_line(&lines);
    assert!(line.contains("['X']"), "{}", line);
    assert!(!line.contains("['A']"), "{}", line);

    let rename_at = lines.iter().position(|l| l.contains(".rename(")).unwrap();
    let formula_at = lines.iter().position(|l| l == line).unwrap();
    assert!(rename_at < formula_at, "{:#?}", lines);
}

#[test]
fn test_formula_follows_rename_across_row_edits() {
    let dir = TempDir::new().unwrap();
    let mut manager = session();
    formula_then_rename(
        &mut manager,
        &dir,
        &[
            (
                "sort",
                json!({"sheet_index": 0, "column_id": "B", "sort_direction": "ascending"}),
            ),
            (
                "filter_column",
                json!({
                    "sheet_index": 0,
                    "column_id": "A",
                    "filters": [{"condition": "not_empty", "value": null}]
                }),
            ),
            (
                "set_cell_value",
                json!({"sheet_index": 0, "column_id": "A", "row_index": 0, "new_value": "10"}),
            ),
        ],
    );
    assert_eq!(values(&manager, 0, "X"), ints(&[1, 2, 10]));
    assert_eq!(values(&manager, 0, "B"), ints(&[2, 3, 11]));

    let lines = code(&manager);
    let line = formula_line(&lines);
    assert!(line.contains("['X']"), "{}", line);
    assert!(!lines.iter().any(|l| l.contains("['A']")), "{:#?}", lines);
    assert!(lines.iter().any(|l| l.contains("sort_values(by='B'")), "{:#?}", lines);
    assert!(lines.iter().any(|l| l.contains("t['X'].notnull()")), "{:#?}", lines);
}

#[test]
fn test_added_then_deleted_column_leaves_no_code() {
    let dir = TempDir::new().unwrap();
    let t = write_csv(&dir, "t.csv", "A\n1\n");
    let mut manager = session();
    import(&mut manager, &[&t]);

    edit(&mut manager, "add_column", json!({"sheet_index": 0, "column_header": "B"}));
    edit(&mut manager, "delete_column", json!({"sheet_index": 0, "column_ids": ["B"]}));

    let generated = manager.generate_code().unwrap();
    let body: Vec<&String> = generated.body.iter().filter(|l| !l.starts_with('#') && !l.is_empty()).collect();
    assert_eq!(body.len(), 1, "{:#?}", generated.body);
    assert!(body[0].contains("pd.read_csv"));
    assert!(!generated.to_string().contains("'B'"));
}

#[test]
fn test_deleted_pivot_leaves_no_code() {
    let dir = TempDir::new().unwrap();
    let t = write_csv(&dir, "t.csv", "A,B\n1,10\n1,20\n2,30\n");
    let mut manager = session();
    import(&mut manager, &[&t]);

    edit(
        &mut manager,
        "pivot",
        json!({
            "sheet_index": 0,
            "pivot_rows_column_ids": ["A"],
            "values_column_ids_map": {"B": ["sum"]}
        }),
    );
    assert_eq!(manager.curr_state().table_names, vec!["t", "t_pivot"]);
    assert_eq!(values(&manager, 1, "A"), ints(&[1, 2]));
    assert_eq!(values(&manager, 1, "B sum"), ints(&[30, 30]));

    edit(&mut manager, "dataframe_delete", json!({"sheet_index": 1}));
    assert_eq!(manager.curr_state().table_names, vec!["t"]);

    let text = manager.generate_code().unwrap().to_string();
    assert!(!text.contains("pivot"), "{}", text);
    assert!(!text.contains("del "), "{}", text);
}

#[test]
fn test_filter_with_missing_values_keeps_labels() {
    let dir = TempDir::new().unwrap();
    let t = write_csv(&dir, "t.csv", "A,C\n1,p\n,q\n3,r\n");
    let mut manager = session();
    import(&mut manager, &[&t]);

    edit(
        &mut manager,
        "filter_column",
        json!({
            "sheet_index": 0,
            "column_id": "A",
            "operator": "and",
            "filters": [{"condition": "not_empty", "value": null}]
        }),
    );
    edit(&mut manager, "add_column", json!({"sheet_index": 0, "column_header": "B"}));
    edit(
        &mut manager,
        "set_column_formula",
        json!({"sheet_index": 0, "column_id": "B", "new_formula": "=A+1"}),
    );

    let table = manager.curr_state().table(0).unwrap();
    assert_eq!(
        table.index(),
        &[sheetstate::IndexLabel::Int(0), sheetstate::IndexLabel::Int(2)]
    );
    assert_eq!(values(&manager, 0, "A"), ints(&[1, 3]));
    assert_eq!(values(&manager, 0, "B"), ints(&[2, 4]));
}

#[test]
fn test_merge_key_mismatch() {
    let dir = TempDir::new().unwrap();
    let left = write_csv(&dir, "L.csv", "K,V\n1,a\n2,b\n3,c\n");
    let right = write_csv(&dir, "R.csv", "K,W\n2,x\n3,y\n4,z\n");
    let mut manager = session();
    import(&mut manager, &[&left, &right]);

    let merge = |how: &str| {
        json!({
            "how": how,
            "sheet_index_one": 0,
            "sheet_index_two": 1,
            "merge_key_column_ids": [["K", "K"]],
            "selected_column_ids_one": ["V"],
            "selected_column_ids_two": ["W"]
        })
    };

    edit(&mut manager, "merge", merge("lookup"));
    assert_eq!(values(&manager, 2, "K"), ints(&[1, 2, 3]));
    assert_eq!(
        values(&manager, 2, "V"),
        vec![Value::str("a"), Value::str("b"), Value::str("c")]
    );
    assert_eq!(
        values(&manager, 2, "W"),
        vec![Value::Missing, Value::str("x"), Value::str("y")]
    );

    manager.undo().unwrap();
    edit(&mut manager, "merge", merge("inner"));
    assert_eq!(values(&manager, 2, "K"), ints(&[2, 3]));
    assert_eq!(values(&manager, 2, "V"), vec![Value::str("b"), Value::str("c")]);
    assert_eq!(values(&manager, 2, "W"), vec![Value::str("x"), Value::str("y")]);
}

#[test]
fn test_undo_across_import_update() {
    let dir = TempDir::new().unwrap();
    let first = write_csv(&dir, "first.csv", "A\n1\n2\n");
    let second = write_csv(&dir, "second.csv", "A\n7\n8\n9\n");
    let mut manager = session();
    import(&mut manager, &[&first]);
    edit(&mut manager, "add_column", json!({"sheet_index": 0, "column_header": "B"}));
    let import_id = manager.step_summaries()[1].step_id.clone();

    manager
        .update_imports(vec![ImportUpdate {
            step_id: import_id,
            params: params(json!({"file_names": [second]})),
        }])
        .unwrap();
    assert_eq!(manager.num_steps(), 3);
    assert_eq!(manager.curr_state().table_names, vec!["second"]);
    assert_eq!(values(&manager, 0, "A"), ints(&[7, 8, 9]));
    assert_eq!(values(&manager, 0, "B"), ints(&[0, 0, 0]));

    manager.undo().unwrap();
    assert_eq!(manager.num_steps(), 3);
    assert_eq!(manager.curr_state().table_names, vec!["first"]);
    assert_eq!(values(&manager, 0, "A"), ints(&[1, 2]));
    assert_eq!(values(&manager, 0, "B"), ints(&[0, 0]));

    manager.redo().unwrap();
    assert_eq!(manager.curr_state().table_names, vec!["second"]);
}

// --- Sessions ---

#[test]
fn test_replayed_analysis_matches_session() {
    let dir = TempDir::new().unwrap();
    let t = write_csv(&dir, "t.csv", "A,B\n3,x\n1,y\n2,z\n");
    let mut manager = session();
    import(&mut manager, &[&t]);
    edit(
        &mut manager,
        "sort",
        json!({"sheet_index": 0, "column_id": "A", "sort_direction": "descending"}),
    );
    edit(&mut manager, "add_column", json!({"sheet_index": 0, "column_header": "C"}));
    edit(
        &mut manager,
        "set_column_formula",
        json!({"sheet_index": 0, "column_id": "C", "new_formula": "=A*2"}),
    );

    let analysis = manager.analysis();
    let json = analysis.to_json().unwrap();
    let mut replayed = session();
    replayed
        .replay(sheetstate::Analysis::from_json(&json).unwrap())
        .unwrap();

    assert_eq!(replayed.num_steps(), manager.num_steps());
    assert_eq!(values(&replayed, 0, "A"), ints(&[3, 2, 1]));
    assert_eq!(values(&replayed, 0, "C"), values(&manager, 0, "C"));
    assert_eq!(code(&replayed), code(&manager));
}

#[test]
fn test_code_as_function() {
    let dir = TempDir::new().unwrap();
    let t = write_csv(&dir, "t.csv", "A\n1\n");
    let mut manager = session();
    import(&mut manager, &[&t]);
    manager.set_code_options(sheetstate::CodeOptions {
        as_function: true,
        function_name: "clean".to_string(),
        function_params: Vec::new(),
    });
    let lines = code(&manager);
    assert!(lines.iter().any(|l| l.starts_with("def clean(")), "{:#?}", lines);
    assert!(lines.iter().any(|l| l.trim_start().starts_with("return")), "{:#?}", lines);
}

#[test]
fn test_subscribers_see_edits_and_history() {
    use sheetstate::{HistoryAction, SheetEvent, SubscriptionConfig};

    let dir = TempDir::new().unwrap();
    let t = write_csv(&dir, "t.csv", "A\n1\n");
    let mut manager = session();
    let handle = manager.subscribe(SubscriptionConfig::default());
    import(&mut manager, &[&t]);
    manager.undo().unwrap();

    let events = handle.drain();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], SheetEvent::StepApplied { step, .. } if step.step_type == "simple_import"));
    assert!(matches!(
        &events[1],
        SheetEvent::HistoryChanged {
            action: HistoryAction::Undo,
            num_steps: 1,
            ..
        }
    ));
}
