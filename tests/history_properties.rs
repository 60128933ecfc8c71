//! Property tests over random edit histories.

use proptest::prelude::*;
use serde_json::json;
use sheetstate::{check_invariants, EngineConfig, Extensions, Params, StepsManager};
use std::collections::HashSet;
use std::fs;
use tempfile::TempDir;

#[derive(Clone, Debug)]
enum Edit {
    Add(String),
    Delete(usize),
    Rename(usize, String),
    Sort(usize, bool),
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    let header = "[a-c]{1,2}";
    prop_oneof![
        header.prop_map(Edit::Add),
        (0usize..6).prop_map(Edit::Delete),
        ((0usize..6), header).prop_map(|(i, h)| Edit::Rename(i, h)),
        ((0usize..6), any::<bool>()).prop_map(|(i, asc)| Edit::Sort(i, asc)),
    ]
}

fn params(value: serde_json::Value) -> Params {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("params must be an object, got {}", other),
    }
}

/// Apply an edit, ignoring edits the engine rejects.
fn apply(manager: &mut StepsManager, edit: &Edit) {
    let ids = manager.curr_state().column_ids.ids(0);
    let id_at = |i: usize| ids.get(i % ids.len().max(1)).map(|id| id.as_str().to_string());
    let (step_type, value) = match edit {
        Edit::Add(header) => ("add_column", json!({"sheet_index": 0, "column_header": header})),
        Edit::Delete(i) => match id_at(*i) {
            Some(id) => ("delete_column", json!({"sheet_index": 0, "column_ids": [id]})),
            None => return,
        },
        Edit::Rename(i, header) => match id_at(*i) {
            Some(id) => (
                "rename_column",
                json!({"sheet_index": 0, "column_id": id, "new_column_header": header}),
            ),
            None => return,
        },
        Edit::Sort(i, ascending) => match id_at(*i) {
            Some(id) => (
                "sort",
                json!({
                    "sheet_index": 0,
                    "column_id": id,
                    "sort_direction": if *ascending { "ascending" } else { "descending" }
                }),
            ),
            None => return,
        },
    };
    let _ = manager.handle_edit(step_type, None, params(value));
}

fn snapshot(manager: &StepsManager) -> (Vec<String>, Vec<Vec<sheetstate::Value>>) {
    let table = manager.curr_state().table(0).unwrap();
    let headers = table.headers().into_iter().map(str::to_string).collect();
    let values = table.columns().iter().map(|c| c.values.clone()).collect();
    (headers, values)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_undo_redo_symmetry(edits in prop::collection::vec(edit_strategy(), 1..12)) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "x,y\n3,b\n1,a\n2,c\n").unwrap();
        let mut manager = StepsManager::new(EngineConfig::default(), Extensions::default()).unwrap();
        manager
            .handle_edit("simple_import", None, params(json!({"file_names": [path.to_string_lossy()]})))
            .unwrap();
        let imported = snapshot(&manager);

        for edit in &edits {
            apply(&mut manager, edit);
            check_invariants(manager.curr_state()).unwrap();
            let headers = snapshot(&manager).0;
            let unique: HashSet<&String> = headers.iter().collect();
            prop_assert_eq!(unique.len(), headers.len());
        }
        let edited = snapshot(&manager);
        let applied = manager.num_steps() - 2;

        for _ in 0..applied {
            manager.undo().unwrap();
        }
        prop_assert_eq!(snapshot(&manager), imported);

        for _ in 0..applied {
            manager.redo().unwrap();
        }
        prop_assert_eq!(snapshot(&manager), edited);
    }

    #[test]
    fn prop_replay_is_deterministic(edits in prop::collection::vec(edit_strategy(), 1..8)) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "x,y\n3,b\n1,a\n2,c\n").unwrap();
        let mut manager = StepsManager::new(EngineConfig::default(), Extensions::default()).unwrap();
        manager
            .handle_edit("simple_import", None, params(json!({"file_names": [path.to_string_lossy()]})))
            .unwrap();
        for edit in &edits {
            apply(&mut manager, edit);
        }

        let mut replayed = StepsManager::new(EngineConfig::default(), Extensions::default()).unwrap();
        replayed.replay(manager.analysis()).unwrap();
        prop_assert_eq!(snapshot(&replayed), snapshot(&manager));
        prop_assert_eq!(
            replayed.generate_code().unwrap().lines(),
            manager.generate_code().unwrap().lines()
        );
    }
}
