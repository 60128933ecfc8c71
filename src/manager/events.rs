//! JSON events the host sends, and the error reply.
//!
//! Edits look like `{"event": "edit_event", "type": "sort_edit", "step_id": .., "params": {..}}`.
//! Everything else is an update: `{"event": "update_event", "type": "undo", "params": {..}}`.

use super::StepsManager;
use crate::analysis::{Analysis, StepData};
use crate::config::CodeOptions;
use crate::error::{Result, SheetError};
use crate::steps::Params;
use crate::types::{PublicInterfaceVersion, StepId};
use serde::{Deserialize, Serialize};

/// New params for one import step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImportUpdate {
    pub step_id: StepId,
    pub params: Params,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    event: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    step_id: Option<StepId>,
    #[serde(default)]
    params: Params,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "RawEvent")]
pub enum HostEvent {
    Edit {
        event_type: String,
        step_id: Option<StepId>,
        params: Params,
    },
    Update(UpdateEvent),
}

#[derive(Clone, Debug, PartialEq)]
pub enum UpdateEvent {
    Undo,
    Redo,
    Clear,
    CheckoutStep(usize),
    UndoToStep(usize),
    ReplayAnalysis(ReplayParams),
    UpdateImports(Vec<ImportUpdate>),
    CodeOptions(CodeOptions),
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ReplayParams {
    /// Name of an analysis in the analysis directory.
    #[serde(default)]
    pub analysis_name: Option<String>,
    /// Steps sent inline by the host.
    #[serde(default)]
    pub steps_data: Option<Vec<StepData>>,
    #[serde(default)]
    pub public_interface_version: Option<PublicInterfaceVersion>,
}

#[derive(Deserialize)]
struct StepIdx {
    step_idx: usize,
}

#[derive(Deserialize)]
struct ImportUpdates {
    updated_imports: Vec<ImportUpdate>,
}

fn params_as<T: serde::de::DeserializeOwned>(event_type: &str, params: Params) -> std::result::Result<T, String> {
    serde_json::from_value(serde_json::Value::Object(params))
        .map_err(|e| format!("bad params for {}: {}", event_type, e))
}

impl TryFrom<RawEvent> for HostEvent {
    type Error = String;

    fn try_from(raw: RawEvent) -> std::result::Result<Self, Self::Error> {
        match raw.event.as_str() {
            "edit_event" => Ok(HostEvent::Edit {
                event_type: raw.event_type,
                step_id: raw.step_id,
                params: raw.params,
            }),
            "update_event" => {
                let t = raw.event_type.as_str();
                let update = match t {
                    "undo" => UpdateEvent::Undo,
                    "redo" => UpdateEvent::Redo,
                    "clear" => UpdateEvent::Clear,
                    "checkout_step_by_idx_update" => {
                        UpdateEvent::CheckoutStep(params_as::<StepIdx>(t, raw.params)?.step_idx)
                    }
                    "undo_to_step_index_update" => {
                        UpdateEvent::UndoToStep(params_as::<StepIdx>(t, raw.params)?.step_idx)
                    }
                    "replay_analysis_update" => UpdateEvent::ReplayAnalysis(params_as(t, raw.params)?),
                    "update_existing_import_update" => {
                        UpdateEvent::UpdateImports(params_as::<ImportUpdates>(t, raw.params)?.updated_imports)
                    }
                    "code_options_update" => UpdateEvent::CodeOptions(params_as(t, raw.params)?),
                    other => return Err(format!("unknown update {}", other)),
                };
                Ok(HostEvent::Update(update))
            }
            other => Err(format!("unknown event {}", other)),
        }
    }
}

pub(super) fn apply_update(manager: &mut StepsManager, update: UpdateEvent) -> Result<()> {
    match update {
        UpdateEvent::Undo => manager.undo(),
        UpdateEvent::Redo => manager.redo(),
        UpdateEvent::Clear => manager.clear(),
        UpdateEvent::CheckoutStep(idx) => manager.checkout_step(idx),
        UpdateEvent::UndoToStep(idx) => manager.undo_to_step(idx),
        UpdateEvent::ReplayAnalysis(replay) => {
            let added = match (replay.analysis_name, replay.steps_data) {
                (_, Some(steps_data)) => {
                    let version = replay
                        .public_interface_version
                        .unwrap_or(manager.config().public_interface_version);
                    manager.replay(Analysis::new(version, steps_data))?
                }
                (Some(name), None) => manager.replay_saved(&name)?,
                (None, None) => {
                    return Err(SheetError::invalid_arg(
                        "replay needs an analysis_name or steps_data",
                    ))
                }
            };
            tracing::debug!(added, "replay event handled");
            Ok(())
        }
        UpdateEvent::UpdateImports(updates) => manager.update_imports(updates),
        UpdateEvent::CodeOptions(options) => {
            manager.set_code_options(options);
            Ok(())
        }
    }
}

/// Reply sent when an event fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub event: String,
    pub kind: String,
    pub header: String,
    pub to_fix: String,
}

impl From<&SheetError> for ErrorReply {
    fn from(e: &SheetError) -> Self {
        ErrorReply {
            event: "error".to_string(),
            kind: e.kind().as_str().to_string(),
            header: e.title(),
            to_fix: e.to_fix(),
        }
    }
}
