//! Step kinds and the contract each one implements.
//!
//! A step kind is written against [`TypedStepPerformer`] with its own serde
//! params struct. The blanket impl of [`StepPerformer`] turns it into an
//! object-safe performer over JSON params, which is what the
//! [`StepRegistry`] stores and the manager calls.

pub mod columns;
pub mod export;
pub mod imports;
pub mod merge;
pub mod meta;
pub mod pivot;
mod registry;
pub mod rows;
pub mod tables;

pub use registry::StepRegistry;

use crate::codegen::chunks::{ColumnHeaders, FormulaLine};
use crate::codegen::{CodeChunk, TableSet};
use crate::error::{Result, SheetError};
use crate::state::State;
use crate::types::{ColumnId, StepId, TIMESTAMP_FORMAT};
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Parameters of a step as the host sends them.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Facts recorded while executing a step that code generation needs later.
pub type ExecutionData = serde_json::Map<String, serde_json::Value>;

/// What a step's code is generated from.
pub struct TranspileContext<'a> {
    pub prev: &'a State,
    pub post: &'a State,
    pub execution_data: &'a ExecutionData,
}

/// Object-safe step contract over JSON params.
pub trait StepPerformer: Send + Sync {
    fn step_type(&self) -> &'static str;

    fn step_version(&self) -> u32;

    /// Event type the host sends to run this step.
    fn step_event_type(&self) -> String {
        format!("{}_edit", self.step_type())
    }

    fn step_display_name(&self) -> &'static str;

    /// Imports are kept by `clear` and replaced by `update_imports`.
    fn is_import(&self) -> bool;

    fn describe(&self, params: &Params) -> String;

    /// Fill in defaults and snapshots so `execute` is a pure function of
    /// the previous state and the returned params.
    fn saturate(&self, prev: &State, params: Params) -> Result<Params>;

    fn execute(&self, prev: &State, params: &Params) -> Result<(State, ExecutionData)>;

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &Params) -> Result<Vec<Box<dyn CodeChunk>>>;

    fn modified_table_indexes(&self, params: &Params) -> Result<TableSet>;
}

/// A step kind with typed params.
pub trait TypedStepPerformer: Send + Sync + 'static {
    type Params: Serialize + DeserializeOwned;

    const STEP_TYPE: &'static str;
    const STEP_VERSION: u32;
    const DISPLAY_NAME: &'static str;
    const IS_IMPORT: bool = false;

    fn saturate(&self, _prev: &State, params: Self::Params) -> Result<Self::Params> {
        Ok(params)
    }

    fn execute(&self, prev: &State, params: &Self::Params) -> Result<(State, ExecutionData)>;

    fn transpile(
        &self,
        ctx: &TranspileContext<'_>,
        params: &Self::Params,
    ) -> Result<Vec<Box<dyn CodeChunk>>>;

    fn modified_table_indexes(&self, params: &Self::Params) -> TableSet;

    fn describe(&self, params: &Self::Params) -> String;
}

fn decode<P: DeserializeOwned>(step_type: &str, params: &Params) -> Result<P> {
    serde_json::from_value(serde_json::Value::Object(params.clone()))
        .map_err(|e| SheetError::invalid_arg(format!("bad params for {}: {}", step_type, e)))
}

fn encode<P: Serialize>(params: &P) -> Result<Params> {
    match serde_json::to_value(params)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(SheetError::Serialization(format!(
            "step params must serialize to an object, got {}",
            other
        ))),
    }
}

impl<T: TypedStepPerformer> StepPerformer for T {
    fn step_type(&self) -> &'static str {
        T::STEP_TYPE
    }

    fn step_version(&self) -> u32 {
        T::STEP_VERSION
    }

    fn step_display_name(&self) -> &'static str {
        T::DISPLAY_NAME
    }

    fn is_import(&self) -> bool {
        T::IS_IMPORT
    }

    fn describe(&self, params: &Params) -> String {
        match decode::<T::Params>(T::STEP_TYPE, params) {
            Ok(params) => TypedStepPerformer::describe(self, &params),
            Err(_) => T::DISPLAY_NAME.to_string(),
        }
    }

    fn saturate(&self, prev: &State, params: Params) -> Result<Params> {
        let typed = decode::<T::Params>(T::STEP_TYPE, &params)?;
        encode(&TypedStepPerformer::saturate(self, prev, typed)?)
    }

    fn execute(&self, prev: &State, params: &Params) -> Result<(State, ExecutionData)> {
        let typed = decode::<T::Params>(T::STEP_TYPE, params)?;
        TypedStepPerformer::execute(self, prev, &typed)
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &Params) -> Result<Vec<Box<dyn CodeChunk>>> {
        let typed = decode::<T::Params>(T::STEP_TYPE, params)?;
        TypedStepPerformer::transpile(self, ctx, &typed)
    }

    fn modified_table_indexes(&self, params: &Params) -> Result<TableSet> {
        let typed = decode::<T::Params>(T::STEP_TYPE, params)?;
        Ok(TypedStepPerformer::modified_table_indexes(self, &typed))
    }
}

/// One executed step.
#[derive(Clone)]
pub struct Step {
    pub step_id: StepId,
    pub params: Params,
    pub execution_data: ExecutionData,
    pub prev_state: Arc<State>,
    pub post_state: Arc<State>,
    performer: Arc<dyn StepPerformer>,
}

impl Step {
    /// Saturate and execute `params` against `prev_state`.
    pub fn run(
        performer: Arc<dyn StepPerformer>,
        step_id: StepId,
        prev_state: Arc<State>,
        params: Params,
    ) -> Result<Step> {
        let params = performer.saturate(&prev_state, params)?;
        let (post, execution_data) = performer.execute(&prev_state, &params)?;
        Ok(Step {
            step_id,
            params,
            execution_data,
            prev_state,
            post_state: Arc::new(post),
            performer,
        })
    }

    /// Execute params exactly as saved, without saturating them again.
    pub fn from_saved(
        performer: Arc<dyn StepPerformer>,
        step_id: StepId,
        prev_state: Arc<State>,
        params: Params,
    ) -> Result<Step> {
        let (post, execution_data) = performer.execute(&prev_state, &params)?;
        Ok(Step {
            step_id,
            params,
            execution_data,
            prev_state,
            post_state: Arc::new(post),
            performer,
        })
    }

    /// Execute this step's params on a new previous state.
    pub fn rerun(&self, prev_state: Arc<State>) -> Result<Step> {
        let (post, execution_data) = self.performer.execute(&prev_state, &self.params)?;
        Ok(Step {
            step_id: self.step_id.clone(),
            params: self.params.clone(),
            execution_data,
            prev_state,
            post_state: Arc::new(post),
            performer: self.performer.clone(),
        })
    }

    pub fn step_type(&self) -> &'static str {
        self.performer.step_type()
    }

    pub fn step_version(&self) -> u32 {
        self.performer.step_version()
    }

    pub fn display_name(&self) -> &'static str {
        self.performer.step_display_name()
    }

    pub fn is_import(&self) -> bool {
        self.performer.is_import()
    }

    pub fn describe(&self) -> String {
        self.performer.describe(&self.params)
    }

    pub fn performer(&self) -> &Arc<dyn StepPerformer> {
        &self.performer
    }

    pub fn transpile(&self) -> Result<Vec<Box<dyn CodeChunk>>> {
        let ctx = TranspileContext {
            prev: &self.prev_state,
            post: &self.post_state,
            execution_data: &self.execution_data,
        };
        self.performer.transpile(&ctx, &self.params)
    }

    pub fn summary(&self) -> StepSummary {
        StepSummary {
            step_id: self.step_id.clone(),
            step_type: self.step_type().to_string(),
            step_display_name: self.display_name().to_string(),
            step_description: self.describe(),
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("step_id", &self.step_id)
            .field("step_type", &self.step_type())
            .field("params", &self.params)
            .finish()
    }
}

/// What the host shows in the step list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSummary {
    pub step_id: StepId,
    pub step_type: String,
    pub step_display_name: String,
    pub step_description: String,
}

// --- Helpers shared by step kinds ---

pub(crate) fn headers_of(state: &State, sheet: usize) -> ColumnHeaders {
    ColumnHeaders(state.header_map(sheet))
}

/// Formula lines for columns of `sheet` in `state`, in the order given.
pub(crate) fn formula_lines(state: &State, sheet: usize, ids: &[ColumnId]) -> Vec<FormulaLine> {
    ids.iter()
        .filter_map(|id| {
            state.column_formulas.get(sheet)?.get(id).map(|formula| FormulaLine {
                target: id.clone(),
                expr: formula.expr.clone(),
                applied_to: formula.applied_to.clone(),
            })
        })
        .collect()
}

pub(crate) const REFRESHED_COLUMNS: &str = "refreshed_column_ids";

pub(crate) fn record<V: Serialize>(data: &mut ExecutionData, key: &str, value: V) -> Result<()> {
    data.insert(key.to_string(), serde_json::to_value(value)?);
    Ok(())
}

pub(crate) fn recorded<V: DeserializeOwned + Default>(data: &ExecutionData, key: &str) -> V {
    data.get(key)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

pub(crate) fn now_string() -> String {
    chrono::Local::now().naive_local().format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn parse_time(text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map_err(|e| SheetError::invalid_arg(format!("bad evaluation time {}: {}", text, e)))
}

pub(crate) fn check_column(state: &State, sheet: usize, id: &ColumnId) -> Result<String> {
    state.check_table(sheet)?;
    state.column_header(sheet, id)
}
