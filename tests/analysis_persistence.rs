//! Saved analyses across sessions.

use serde_json::json;
use sheetstate::{
    AnalysisStore, EngineConfig, Extensions, Params, SheetError, SheetEvent, StepsManager, SubscriptionConfig,
    SubscriptionFilter, Value,
};
use std::fs;
use tempfile::TempDir;

fn params(value: serde_json::Value) -> Params {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("params must be an object, got {}", other),
    }
}

fn config(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        analysis_dir: Some(dir.path().join("analyses")),
        ..Default::default()
    }
}

fn write_csv(dir: &TempDir) -> String {
    let path = dir.path().join("sales.csv");
    fs::write(&path, "region,amount\nnorth,10\nsouth,20\nnorth,5\n").unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_saved_analysis_replays_in_new_session() {
    let dir = TempDir::new().unwrap();
    let csv = write_csv(&dir);

    let name = {
        let mut manager = StepsManager::new(config(&dir), Extensions::default()).unwrap();
        let handle = manager.subscribe(SubscriptionConfig {
            filter: SubscriptionFilter {
                include_analysis: true,
                ..Default::default()
            },
            ..Default::default()
        });
        manager
            .handle_edit("simple_import", None, params(json!({"file_names": [csv]})))
            .unwrap();
        manager
            .handle_edit(
                "sort",
                None,
                params(json!({"sheet_index": 0, "column_id": "amount", "sort_direction": "ascending"})),
            )
            .unwrap();
        manager.save_analysis().unwrap();
        assert!(matches!(handle.try_recv(), Ok(SheetEvent::AnalysisSaved { .. })));
        manager.analysis_name().to_string()
    };

    let mut manager = StepsManager::new(config(&dir), Extensions::default()).unwrap();
    let added = manager.replay_saved(&name).unwrap();
    assert_eq!(added, 2);
    let table = manager.curr_state().table(0).unwrap();
    assert_eq!(
        table.column("amount").unwrap().values,
        vec![Value::Int(5), Value::Int(10), Value::Int(20)]
    );
}

#[test]
fn test_replay_event_by_name() {
    let dir = TempDir::new().unwrap();
    let csv = write_csv(&dir);
    let name = {
        let mut manager = StepsManager::new(config(&dir), Extensions::default()).unwrap();
        manager
            .handle_edit("simple_import", None, params(json!({"file_names": [csv]})))
            .unwrap();
        manager.save_analysis().unwrap();
        manager.analysis_name().to_string()
    };

    let mut manager = StepsManager::new(config(&dir), Extensions::default()).unwrap();
    let reply: serde_json::Value = serde_json::from_str(&manager.handle_event(
        &json!({"event": "update_event", "type": "replay_analysis_update", "params": {"analysis_name": name}})
            .to_string(),
    ))
    .unwrap();
    assert_eq!(reply["event"], "response");
    assert_eq!(reply["shared_state"]["sheet_data"][0]["table_name"], "sales");
}

#[test]
fn test_missing_analysis_fails_replay() {
    let dir = TempDir::new().unwrap();
    let mut manager = StepsManager::new(config(&dir), Extensions::default()).unwrap();
    let err = manager.replay_saved("id-missing").unwrap_err();
    assert!(matches!(err, SheetError::ReplayFailed { .. }));
}

#[test]
fn test_directory_is_locked_per_session() {
    let dir = TempDir::new().unwrap();
    let _manager = StepsManager::new(config(&dir), Extensions::default()).unwrap();
    let err = StepsManager::new(config(&dir), Extensions::default()).err().unwrap();
    assert!(matches!(err, SheetError::Locked));
}

#[test]
fn test_legacy_analysis_is_upgraded_on_replay() {
    let dir = TempDir::new().unwrap();
    let csv = write_csv(&dir);
    let legacy = json!({
        "version": "0.1.0",
        "steps": {
            "1": {"step_version": 1, "step_type": "simple_import", "file_names": [csv]},
            "2": {
                "step_version": 1,
                "step_type": "add_column",
                "sheet_index": 0,
                "column_header": "total"
            }
        }
    });

    {
        let store = AnalysisStore::open(dir.path().join("analyses"), 4).unwrap();
        store.import_json("id-legacy", &legacy.to_string()).unwrap();
    }

    let mut manager = StepsManager::new(config(&dir), Extensions::default()).unwrap();
    manager.replay_saved("id-legacy").unwrap();
    let table = manager.curr_state().table(0).unwrap();
    assert_eq!(table.headers(), vec!["region", "amount", "total"]);

    let types: Vec<String> = manager
        .step_summaries()
        .into_iter()
        .map(|s| s.step_type)
        .collect();
    assert_eq!(types, vec!["initialize", "simple_import", "bulk_old_rename", "add_column"]);
}
