//! The steps manager: one per spreadsheet session.
//!
//! It owns the step list, the cursor, undo and redo, and turns the visible
//! steps into a script. Every operation either succeeds completely or leaves
//! the step list, cursor, undo and redo exactly as they were.

mod events;
mod snapshot;

pub use events::{ErrorReply, HostEvent, ImportUpdate, ReplayParams, UpdateEvent};
pub use snapshot::{ColumnData, SharedState, SheetData};

use crate::analysis::{upgrade_steps, Analysis, AnalysisStore, StepData};
use crate::codegen::{hoist_renames, optimize, render, CodeChunk, GeneratedCode};
use crate::config::{CodeOptions, EngineConfig};
use crate::error::{Result, SheetError};
use crate::extensions::Extensions;
use crate::state::{check_invariants, State};
use crate::steps::{Params, Step, StepPerformer, StepRegistry, StepSummary};
use crate::subscriptions::{HistoryAction, SubscriptionConfig, SubscriptionHandle, SubscriptionManager};
use crate::types::{unique_token, PublicInterfaceVersion, StepId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A whole step list to put back with one undo.
struct Rollback {
    action: HistoryAction,
    steps: Vec<Step>,
    curr_step_idx: usize,
    /// Ids of the step list the record was pushed against. The record only
    /// applies while the list still has exactly these steps.
    applies_to: Vec<StepId>,
}

enum Redo {
    Step(Step),
    Restore(Rollback),
}

pub struct StepsManager {
    config: EngineConfig,
    registry: StepRegistry,
    extensions: Arc<Extensions>,
    analysis_name: String,
    steps_including_skipped: Vec<Step>,
    curr_step_idx: usize,
    undone_step_list_store: Vec<Rollback>,
    redo_stack: Vec<Redo>,
    subscriptions: SubscriptionManager,
    analyses: Option<AnalysisStore>,
}

fn step_ids(steps: &[Step]) -> Vec<StepId> {
    steps.iter().map(|s| s.step_id.clone()).collect()
}

impl StepsManager {
    pub fn new(config: EngineConfig, extensions: Extensions) -> Result<Self> {
        let registry = StepRegistry::new();
        let extensions = Arc::new(extensions);
        let analyses = match &config.analysis_dir {
            Some(dir) => Some(AnalysisStore::open(dir, config.analysis_cache_size)?),
            None => None,
        };
        let initial = Self::initial_step(&registry, &extensions, config.public_interface_version)?;
        let analysis_name = format!("id-{}", unique_token(10));
        info!(analysis = %analysis_name, version = config.public_interface_version.as_u32(), "started session");
        Ok(Self {
            config,
            registry,
            extensions,
            analysis_name,
            steps_including_skipped: vec![initial],
            curr_step_idx: 0,
            undone_step_list_store: Vec::new(),
            redo_stack: Vec::new(),
            subscriptions: SubscriptionManager::new(),
            analyses,
        })
    }

    fn initial_step(
        registry: &StepRegistry,
        extensions: &Arc<Extensions>,
        version: PublicInterfaceVersion,
    ) -> Result<Step> {
        let performer = registry
            .get("initialize")
            .ok_or_else(|| SheetError::invalid_arg("initialize is not registered"))?;
        let state = Arc::new(State::new(extensions.clone(), version));
        Step::run(performer, StepId::generate(), state, Params::new())
    }

    // --- Accessors ---

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn analysis_name(&self) -> &str {
        &self.analysis_name
    }

    pub fn curr_step_idx(&self) -> usize {
        self.curr_step_idx
    }

    pub fn num_steps(&self) -> usize {
        self.steps_including_skipped.len()
    }

    /// State after the step at the cursor.
    pub fn curr_state(&self) -> &State {
        &self.steps_including_skipped[self.curr_step_idx].post_state
    }

    fn last_state(&self) -> Arc<State> {
        self.steps_including_skipped
            .last()
            .map(|s| s.post_state.clone())
            .unwrap_or_default()
    }

    /// Every step, including those past the cursor.
    pub fn steps(&self) -> &[Step] {
        &self.steps_including_skipped
    }

    pub fn step_summaries(&self) -> Vec<StepSummary> {
        self.steps_including_skipped.iter().map(Step::summary).collect()
    }

    pub fn can_undo(&self) -> bool {
        self.steps_including_skipped.len() > 1 || self.top_rollback_applies()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        self.subscriptions.subscribe(config)
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    fn at_last_step(&self) -> bool {
        self.curr_step_idx + 1 == self.steps_including_skipped.len()
    }

    fn check(&self, step: &Step) -> Result<()> {
        if self.config.check_invariants {
            check_invariants(&step.post_state)?;
        }
        Ok(())
    }

    fn performer(&self, step_type: &str) -> Result<Arc<dyn StepPerformer>> {
        self.registry
            .get(step_type)
            .ok_or_else(|| SheetError::invalid_arg(format!("unknown step type {}", step_type)))
    }

    fn history_changed(&self, action: HistoryAction) {
        self.subscriptions
            .broadcast_history(action, self.curr_step_idx, self.steps_including_skipped.len());
    }

    // --- Edits ---

    /// Run one edit. When `step_id` names the top step and the step types
    /// match, the top step is replaced and re-run from its own previous state.
    pub fn handle_edit(&mut self, step_type: &str, step_id: Option<StepId>, params: Params) -> Result<StepSummary> {
        if !self.at_last_step() {
            return Err(SheetError::invalid_arg(
                "edits are only possible at the last step; check out the last step first",
            ));
        }
        let performer = self.performer(step_type)?;

        let overwrite = match (&step_id, self.steps_including_skipped.last()) {
            (Some(id), Some(top)) => {
                top.step_id == *id && top.step_type() == step_type && self.steps_including_skipped.len() > 1
            }
            _ => false,
        };

        let step = if overwrite {
            let top = &self.steps_including_skipped[self.steps_including_skipped.len() - 1];
            Step::run(performer, top.step_id.clone(), top.prev_state.clone(), params)?
        } else {
            let id = step_id.unwrap_or_else(StepId::generate);
            Step::run(performer, id, self.last_state(), params)?
        };
        self.check(&step)?;

        let summary = step.summary();
        if overwrite {
            self.steps_including_skipped.pop();
        }
        self.steps_including_skipped.push(step);
        self.curr_step_idx = self.steps_including_skipped.len() - 1;
        self.redo_stack.clear();

        debug!(step_type, step_id = %summary.step_id, overwrite, "applied step");
        self.subscriptions
            .broadcast_step(summary.clone(), self.curr_step_idx, overwrite);
        Ok(summary)
    }

    // --- Undo and redo ---

    fn top_rollback_applies(&self) -> bool {
        self.undone_step_list_store
            .last()
            .map(|r| r.applies_to == step_ids(&self.steps_including_skipped))
            .unwrap_or(false)
    }

    /// Swap in a step list, returning a record that swaps it back.
    fn restore(&mut self, record: Rollback) -> Rollback {
        let steps = std::mem::replace(&mut self.steps_including_skipped, record.steps);
        let curr_step_idx = std::mem::replace(&mut self.curr_step_idx, record.curr_step_idx);
        Rollback {
            action: record.action,
            steps,
            curr_step_idx,
            applies_to: step_ids(&self.steps_including_skipped),
        }
    }

    /// Push a record putting back `steps` once the current list is in place.
    fn push_rollback(&mut self, action: HistoryAction, steps: Vec<Step>, curr_step_idx: usize) {
        self.undone_step_list_store.push(Rollback {
            action,
            steps,
            curr_step_idx,
            applies_to: step_ids(&self.steps_including_skipped),
        });
    }

    pub fn undo(&mut self) -> Result<()> {
        if self.top_rollback_applies() {
            if let Some(record) = self.undone_step_list_store.pop() {
                debug!(action = ?record.action, "undoing with rollback record");
                let inverse = self.restore(record);
                self.redo_stack.push(Redo::Restore(inverse));
                self.history_changed(HistoryAction::Undo);
                return Ok(());
            }
        }
        if self.steps_including_skipped.len() <= 1 {
            return Ok(());
        }
        if let Some(step) = self.steps_including_skipped.pop() {
            debug!(step_type = step.step_type(), "undid step");
            self.redo_stack.push(Redo::Step(step));
        }
        self.curr_step_idx = self.steps_including_skipped.len() - 1;
        self.history_changed(HistoryAction::Undo);
        Ok(())
    }

    pub fn redo(&mut self) -> Result<()> {
        let Some(redo) = self.redo_stack.pop() else {
            return Ok(());
        };
        match redo {
            Redo::Step(step) => {
                let prev = self.last_state();
                let step = if Arc::ptr_eq(&step.prev_state, &prev) {
                    step
                } else {
                    match step.rerun(prev).and_then(|s| self.check(&s).map(|_| s)) {
                        Ok(step) => step,
                        Err(e) => {
                            self.redo_stack.push(Redo::Step(step));
                            return Err(e);
                        }
                    }
                };
                self.steps_including_skipped.push(step);
            }
            Redo::Restore(record) => {
                let inverse = self.restore(record);
                self.undone_step_list_store.push(inverse);
            }
        }
        self.curr_step_idx = self.steps_including_skipped.len() - 1;
        self.history_changed(HistoryAction::Redo);
        Ok(())
    }

    // --- Whole-list updates ---

    /// Re-run `steps` in order from a fresh initial state.
    fn rerun_all(&self, steps: &[Step]) -> Result<Vec<Step>> {
        let mut prev: Arc<State> = Arc::new(State::new(
            self.extensions.clone(),
            self.config.public_interface_version,
        ));
        let mut out = Vec::with_capacity(steps.len());
        for step in steps {
            let rerun = step.rerun(prev)?;
            self.check(&rerun)?;
            prev = rerun.post_state.clone();
            out.push(rerun);
        }
        Ok(out)
    }

    /// Keep only the initial step and imports.
    pub fn clear(&mut self) -> Result<()> {
        let kept: Vec<Step> = self
            .steps_including_skipped
            .iter()
            .filter(|s| s.step_type() == "initialize" || s.is_import())
            .cloned()
            .collect();
        let rerun = self.rerun_all(&kept)?;
        let old = std::mem::replace(&mut self.steps_including_skipped, rerun);
        let old_idx = std::mem::replace(&mut self.curr_step_idx, self.steps_including_skipped.len() - 1);
        self.push_rollback(HistoryAction::Clear, old, old_idx);
        self.redo_stack.clear();
        info!(kept = self.steps_including_skipped.len(), "cleared steps");
        self.history_changed(HistoryAction::Clear);
        Ok(())
    }

    pub fn checkout_step(&mut self, step_idx: usize) -> Result<()> {
        if step_idx >= self.steps_including_skipped.len() {
            return Err(SheetError::invalid_arg(format!(
                "no step {}; there are {} steps",
                step_idx,
                self.steps_including_skipped.len()
            )));
        }
        self.curr_step_idx = step_idx;
        self.history_changed(HistoryAction::Checkout);
        Ok(())
    }

    /// Drop every step after `step_idx`.
    pub fn undo_to_step(&mut self, step_idx: usize) -> Result<()> {
        if step_idx >= self.steps_including_skipped.len() {
            return Err(SheetError::invalid_arg(format!("no step {}", step_idx)));
        }
        let old = self.steps_including_skipped.clone();
        let old_idx = self.curr_step_idx;
        self.steps_including_skipped.truncate(step_idx + 1);
        self.curr_step_idx = step_idx;
        self.push_rollback(HistoryAction::UndoToStep, old, old_idx);
        self.redo_stack.clear();
        self.history_changed(HistoryAction::UndoToStep);
        Ok(())
    }

    /// Run saved steps after the current ones. Steps whose ids are already
    /// present are skipped. Nothing changes unless every step succeeds.
    pub fn replay(&mut self, analysis: Analysis) -> Result<usize> {
        let has_edits = self.steps_including_skipped.len() > 1;
        if has_edits && analysis.public_interface_version != self.config.public_interface_version {
            return Err(SheetError::ReplayFailed {
                step_index: 0,
                step_type: String::new(),
                message: format!(
                    "the analysis uses sheet functions v{} but this session uses v{}",
                    analysis.public_interface_version.as_u32(),
                    self.config.public_interface_version.as_u32()
                ),
            });
        }
        let version = analysis.public_interface_version;
        let upgraded = upgrade_steps(analysis.steps_data, &self.registry)?;

        let mut steps = if has_edits {
            self.steps_including_skipped.clone()
        } else {
            vec![Self::initial_step(&self.registry, &self.extensions, version)?]
        };
        let mut seen: HashSet<StepId> = step_ids(&steps).into_iter().collect();
        let mut added = 0;
        for (index, data) in upgraded.into_iter().enumerate() {
            if data.step_type == "initialize" {
                continue;
            }
            if let Some(id) = &data.step_id {
                if seen.contains(id) {
                    continue;
                }
            }
            let failed = |e: SheetError| SheetError::ReplayFailed {
                step_index: index,
                step_type: data.step_type.clone(),
                message: e.to_string(),
            };
            let performer = self.performer(&data.step_type).map_err(failed)?;
            let prev = steps.last().map(|s| s.post_state.clone()).unwrap_or_default();
            let id = data.step_id.clone().unwrap_or_else(StepId::generate);
            let step = Step::from_saved(performer, id, prev, data.params.clone()).map_err(failed)?;
            self.check(&step).map_err(failed)?;
            seen.insert(step.step_id.clone());
            steps.push(step);
            added += 1;
        }

        let old_idx = self.curr_step_idx;
        let old = std::mem::replace(&mut self.steps_including_skipped, steps);
        self.curr_step_idx = self.steps_including_skipped.len() - 1;
        self.config.public_interface_version = version;
        self.push_rollback(HistoryAction::Replay, old, old_idx);
        self.redo_stack.clear();
        info!(added, "replayed analysis");
        self.history_changed(HistoryAction::Replay);
        Ok(added)
    }

    /// Replay an analysis saved under `analysis_name`.
    pub fn replay_saved(&mut self, analysis_name: &str) -> Result<usize> {
        let analysis = self.analysis_store()?.load(analysis_name)?;
        self.replay(analysis)
    }

    /// Give import steps new params and re-run everything from the first of
    /// them. On failure the previous list is kept.
    pub fn update_imports(&mut self, updates: Vec<ImportUpdate>) -> Result<()> {
        let invalid = |message: String| SheetError::InvalidUpdateImports(message);
        let mut replacements: HashMap<StepId, Params> = HashMap::new();
        let mut earliest = usize::MAX;
        for update in updates {
            let position = self
                .steps_including_skipped
                .iter()
                .position(|s| s.step_id == update.step_id)
                .ok_or_else(|| invalid(format!("no step with id {}", update.step_id)))?;
            if !self.steps_including_skipped[position].is_import() {
                return Err(invalid(format!("step {} is not an import", update.step_id)));
            }
            earliest = earliest.min(position);
            replacements.insert(update.step_id, update.params);
        }
        if replacements.is_empty() {
            return Ok(());
        }

        let mut steps: Vec<Step> = self.steps_including_skipped[..earliest].to_vec();
        for step in &self.steps_including_skipped[earliest..] {
            let prev = steps.last().map(|s| s.post_state.clone()).unwrap_or_default();
            let rerun = match replacements.get(&step.step_id) {
                Some(params) => Step::run(step.performer().clone(), step.step_id.clone(), prev, params.clone()),
                None => step.rerun(prev),
            }
            .and_then(|s| self.check(&s).map(|_| s))
            .map_err(|e| invalid(format!("{} failed: {}", step.display_name(), e)))?;
            steps.push(rerun);
        }

        let old_idx = self.curr_step_idx;
        let old = std::mem::replace(&mut self.steps_including_skipped, steps);
        self.curr_step_idx = self.steps_including_skipped.len() - 1;
        self.push_rollback(HistoryAction::UpdateImports, old, old_idx);
        self.redo_stack.clear();
        info!(updated = replacements.len(), from = earliest, "updated imports");
        self.subscriptions
            .broadcast_imports_updated(replacements.into_keys().collect());
        self.history_changed(HistoryAction::UpdateImports);
        Ok(())
    }

    pub fn set_code_options(&mut self, options: CodeOptions) {
        self.config.code_options = options;
    }

    // --- Code ---

    /// The script for the steps up to the cursor.
    pub fn generate_code(&self) -> Result<GeneratedCode> {
        let visible = &self.steps_including_skipped[..=self.curr_step_idx];
        let mut chunks: Vec<Box<dyn CodeChunk>> = Vec::new();
        for step in visible {
            chunks.extend(step.transpile()?);
        }
        let before = chunks.len();
        chunks = hoist_renames(chunks);
        if self.config.optimize {
            chunks = optimize(chunks);
        }
        debug!(before, after = chunks.len(), "generated code chunks");
        render(&chunks, &self.config.code_options, &self.curr_state().table_names)
    }

    // --- Analyses ---

    /// The steps up to the cursor in their saved form.
    pub fn analysis(&self) -> Analysis {
        let steps_data = self.steps_including_skipped[..=self.curr_step_idx]
            .iter()
            .filter(|s| s.step_type() != "initialize")
            .map(|s| StepData {
                step_version: s.step_version(),
                step_type: s.step_type().to_string(),
                step_id: Some(s.step_id.clone()),
                params: s.params.clone(),
            })
            .collect();
        Analysis::new(self.config.public_interface_version, steps_data)
    }

    fn analysis_store(&self) -> Result<&AnalysisStore> {
        self.analyses
            .as_ref()
            .ok_or_else(|| SheetError::invalid_arg("no analysis directory is configured"))
    }

    pub fn save_analysis(&self) -> Result<()> {
        let store = self.analysis_store()?;
        store.save(&self.analysis_name, &self.analysis())?;
        self.subscriptions.broadcast_analysis_saved(&self.analysis_name);
        Ok(())
    }

    // --- Host protocol ---

    /// Handle one JSON event from the host and return the JSON reply.
    pub fn handle_event(&mut self, event: &str) -> String {
        let result = serde_json::from_str::<HostEvent>(event)
            .map_err(|e| SheetError::invalid_arg(format!("malformed event: {}", e)))
            .and_then(|event| self.dispatch(event));
        let reply = match result.and_then(|_| self.shared_state()) {
            Ok(shared_state) => serde_json::json!({"event": "response", "shared_state": shared_state}),
            Err(e) => {
                warn!(kind = e.kind().as_str(), error = %e, "event failed");
                serde_json::to_value(ErrorReply::from(&e)).unwrap_or_default()
            }
        };
        reply.to_string()
    }

    fn dispatch(&mut self, event: HostEvent) -> Result<()> {
        match event {
            HostEvent::Edit {
                event_type,
                step_id,
                params,
            } => {
                let performer = self
                    .registry
                    .by_event_type(&event_type)
                    .ok_or_else(|| SheetError::invalid_arg(format!("unknown edit {}", event_type)))?;
                self.handle_edit(performer.step_type(), step_id, params).map(|_| ())
            }
            HostEvent::Update(update) => events::apply_update(self, update),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn params(value: serde_json::Value) -> Params {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("params must be an object"),
        }
    }

    fn write_csv(dir: &TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn imported(dir: &TempDir) -> (StepsManager, String) {
        let path = write_csv(dir, "data.csv", "A,B\n3,x\n1,y\n2,z\n");
        let mut manager = StepsManager::new(EngineConfig::default(), Extensions::default()).unwrap();
        manager
            .handle_edit("simple_import", None, params(json!({"file_names": [path.clone()]})))
            .unwrap();
        (manager, path)
    }

    fn add_column(manager: &mut StepsManager, header: &str) -> Result<StepSummary> {
        manager.handle_edit(
            "add_column",
            None,
            params(json!({"sheet_index": 0, "column_header": header})),
        )
    }

    fn headers(manager: &StepsManager) -> Vec<String> {
        manager.curr_state().column_ids.headers(0)
    }

    #[test]
    fn test_new_session_has_initial_step() {
        let manager = StepsManager::new(EngineConfig::default(), Extensions::default()).unwrap();
        assert_eq!(manager.num_steps(), 1);
        assert_eq!(manager.curr_step_idx(), 0);
        assert!(manager.analysis_name().starts_with("id-"));
        assert!(!manager.can_undo());
        assert!(manager.generate_code().unwrap().lines().is_empty());
    }

    #[test]
    fn test_edit_undo_redo() {
        let dir = TempDir::new().unwrap();
        let (mut manager, _) = imported(&dir);
        add_column(&mut manager, "C").unwrap();
        assert_eq!(headers(&manager), vec!["A", "B", "C"]);

        manager.undo().unwrap();
        assert_eq!(headers(&manager), vec!["A", "B"]);
        assert!(manager.can_redo());

        manager.redo().unwrap();
        assert_eq!(headers(&manager), vec!["A", "B", "C"]);
        assert_eq!(manager.num_steps(), 3);
    }

    #[test]
    fn test_failed_edit_leaves_history_alone() {
        let dir = TempDir::new().unwrap();
        let (mut manager, _) = imported(&dir);
        add_column(&mut manager, "C").unwrap();
        manager.undo().unwrap();

        let err = add_column(&mut manager, "A").unwrap_err();
        assert_eq!(err.kind().as_str(), "duplicated-column");
        assert_eq!(manager.num_steps(), 2);
        assert!(manager.can_redo());
    }

    #[test]
    fn test_edit_clears_redo() {
        let dir = TempDir::new().unwrap();
        let (mut manager, _) = imported(&dir);
        add_column(&mut manager, "C").unwrap();
        manager.undo().unwrap();
        add_column(&mut manager, "D").unwrap();
        assert!(!manager.can_redo());
        manager.redo().unwrap();
        assert_eq!(headers(&manager), vec!["A", "B", "D"]);
    }

    #[test]
    fn test_overwrite_top_step() {
        let dir = TempDir::new().unwrap();
        let (mut manager, _) = imported(&dir);
        let summary = add_column(&mut manager, "C").unwrap();
        manager
            .handle_edit(
                "add_column",
                Some(summary.step_id.clone()),
                params(json!({"sheet_index": 0, "column_header": "D"})),
            )
            .unwrap();
        assert_eq!(manager.num_steps(), 3);
        assert_eq!(headers(&manager), vec!["A", "B", "D"]);
        assert_eq!(manager.step_summaries()[2].step_id, summary.step_id);
    }

    #[test]
    fn test_edits_refused_away_from_last_step() {
        let dir = TempDir::new().unwrap();
        let (mut manager, _) = imported(&dir);
        add_column(&mut manager, "C").unwrap();
        manager.checkout_step(1).unwrap();
        assert_eq!(headers(&manager), vec!["A", "B"]);

        let err = add_column(&mut manager, "D").unwrap_err();
        assert_eq!(err.kind().as_str(), "invalid-arg");

        manager.checkout_step(2).unwrap();
        add_column(&mut manager, "D").unwrap();
        assert_eq!(headers(&manager), vec!["A", "B", "C", "D"]);
        assert!(manager.checkout_step(9).is_err());
    }

    #[test]
    fn test_clear_and_undo_clear() {
        let dir = TempDir::new().unwrap();
        let (mut manager, _) = imported(&dir);
        add_column(&mut manager, "C").unwrap();
        manager
            .handle_edit(
                "sort",
                None,
                params(json!({"sheet_index": 0, "column_id": "A", "sort_direction": "ascending"})),
            )
            .unwrap();

        manager.clear().unwrap();
        assert_eq!(manager.num_steps(), 2);
        assert_eq!(headers(&manager), vec!["A", "B"]);
        assert_eq!(
            manager.curr_state().column_values(0, &"A".into()).unwrap(),
            &[Value::Int(3), Value::Int(1), Value::Int(2)]
        );

        manager.undo().unwrap();
        assert_eq!(manager.num_steps(), 4);
        assert_eq!(headers(&manager), vec!["A", "B", "C"]);
        assert_eq!(
            manager.curr_state().column_values(0, &"A".into()).unwrap(),
            &[Value::Int(1), Value::Int(2), Value::Int(3)]
        );

        manager.redo().unwrap();
        assert_eq!(manager.num_steps(), 2);
    }

    #[test]
    fn test_undo_to_step() {
        let dir = TempDir::new().unwrap();
        let (mut manager, _) = imported(&dir);
        add_column(&mut manager, "C").unwrap();
        add_column(&mut manager, "D").unwrap();
        manager.undo_to_step(1).unwrap();
        assert_eq!(manager.num_steps(), 2);
        manager.undo().unwrap();
        assert_eq!(manager.num_steps(), 4);
    }

    #[test]
    fn test_update_imports_is_atomic() {
        let dir = TempDir::new().unwrap();
        let (mut manager, _) = imported(&dir);
        add_column(&mut manager, "C").unwrap();
        let import_id = manager.step_summaries()[1].step_id.clone();

        let other = write_csv(&dir, "other.csv", "A,B\n10,q\n");
        manager
            .update_imports(vec![ImportUpdate {
                step_id: import_id.clone(),
                params: params(json!({"file_names": [other]})),
            }])
            .unwrap();
        assert_eq!(manager.num_steps(), 3);
        assert_eq!(manager.curr_state().table_names, vec!["other"]);
        assert_eq!(headers(&manager), vec!["A", "B", "C"]);

        let missing = dir.path().join("missing.csv").to_string_lossy().into_owned();
        let err = manager
            .update_imports(vec![ImportUpdate {
                step_id: import_id,
                params: params(json!({"file_names": [missing]})),
            }])
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "invalid-update-imports");
        assert_eq!(manager.curr_state().table_names, vec!["other"]);

        manager.undo().unwrap();
        assert_eq!(manager.curr_state().table_names, vec!["data"]);
    }

    #[test]
    fn test_replay_skips_known_ids_and_is_atomic() {
        let dir = TempDir::new().unwrap();
        let (mut manager, _) = imported(&dir);
        add_column(&mut manager, "C").unwrap();
        let analysis = manager.analysis();
        assert_eq!(analysis.steps_data.len(), 2);

        let added = manager.replay(analysis.clone()).unwrap();
        assert_eq!(added, 0);

        let mut fresh = StepsManager::new(EngineConfig::default(), Extensions::default()).unwrap();
        assert_eq!(fresh.replay(analysis.clone()).unwrap(), 2);
        assert_eq!(headers(&fresh), vec!["A", "B", "C"]);

        let mut broken = analysis;
        broken.steps_data.push(StepData::new(
            "delete_column",
            1,
            params(json!({"sheet_index": 0, "column_ids": ["nope"]})),
        ));
        let mut other = StepsManager::new(EngineConfig::default(), Extensions::default()).unwrap();
        let err = other.replay(broken).unwrap_err();
        assert!(matches!(err, SheetError::ReplayFailed { step_index: 2, .. }));
        assert_eq!(other.num_steps(), 1);
    }

    #[test]
    fn test_generated_code_follows_cursor() {
        let dir = TempDir::new().unwrap();
        let (mut manager, _) = imported(&dir);
        manager
            .handle_edit(
                "sort",
                None,
                params(json!({"sheet_index": 0, "column_id": "A", "sort_direction": "descending"})),
            )
            .unwrap();
        let code = manager.generate_code().unwrap().lines().join("\n");
        assert!(code.contains("pd.read_csv"));
        assert!(code.contains("sort_values"));

        manager.checkout_step(1).unwrap();
        let code = manager.generate_code().unwrap().lines().join("\n");
        assert!(!code.contains("sort_values"));
    }

    #[test]
    fn test_handle_event_replies() {
        let dir = TempDir::new().unwrap();
        let (mut manager, _) = imported(&dir);
        let reply: serde_json::Value = serde_json::from_str(&manager.handle_event(
            r#"{"event": "edit_event", "type": "add_column_edit", "step_id": "id-new", "params": {"sheet_index": 0, "column_header": "C"}}"#,
        ))
        .unwrap();
        assert_eq!(reply["event"], "response");
        assert_eq!(reply["shared_state"]["curr_step_idx"], 2);
        assert_eq!(reply["shared_state"]["sheet_data"][0]["columns"][2]["header"], "C");

        let reply: serde_json::Value = serde_json::from_str(&manager.handle_event(
            r#"{"event": "edit_event", "type": "delete_column_edit", "params": {"sheet_index": 0, "column_ids": ["Z"]}}"#,
        ))
        .unwrap();
        assert_eq!(reply["event"], "error");
        assert_eq!(reply["kind"], "no-column");

        let reply: serde_json::Value =
            serde_json::from_str(&manager.handle_event(r#"{"event": "update_event", "type": "undo", "params": {}}"#))
                .unwrap();
        assert_eq!(reply["shared_state"]["curr_step_idx"], 1);
    }
}
