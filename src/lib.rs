//! # Sheetstate
//!
//! A spreadsheet state engine. Every user edit is a step that turns one
//! immutable snapshot of all tables into the next, so the whole history can
//! be undone, replayed and turned into an equivalent pandas script.
//!
//! ## Core Concepts
//!
//! - **State**: every table, its column ids, formulas, filters and formats
//! - **Steps**: typed edits (imports, column and row edits, pivots, merges) that
//!   execute against a state and transpile into code
//! - **Formulas**: spreadsheet formulas parsed against column ids and
//!   evaluated over whole columns
//! - **Code generation**: chunks fused by an optimizer, then rendered
//! - **Analyses**: the saved form of a step list, upgraded and replayed later
//!
//! ## Example
//!
//! ```ignore
//! use sheetstate::{EngineConfig, Extensions, StepsManager};
//!
//! let mut manager = StepsManager::new(EngineConfig::default(), Extensions::default())?;
//! manager.handle_edit("simple_import", None, params(json!({"file_names": ["data.csv"]})))?;
//! manager.handle_edit("add_column", None, params(json!({"sheet_index": 0, "column_header": "C"})))?;
//! manager.undo()?;
//!
//! for line in manager.generate_code()?.lines() {
//!     println!("{}", line);
//! }
//! ```

pub mod analysis;
pub mod codegen;
pub mod column_ids;
pub mod config;
pub mod error;
pub mod extensions;
pub mod formula;
pub mod manager;
pub mod state;
pub mod steps;
pub mod subscriptions;
pub mod table;
pub mod types;

// Re-exports
pub use analysis::{upgrade_steps, Analysis, AnalysisStore, StepData, ANALYSIS_VERSION};
pub use codegen::{optimize, render, CodeChunk, GeneratedCode};
pub use config::{CodeOptions, EngineConfig};
pub use error::{Result, SheetError};
pub use extensions::{Extensions, QueryRunner, UserFunction, UserImporter, VariableResolver};
pub use manager::{ErrorReply, HostEvent, ImportUpdate, SharedState, SheetData, StepsManager};
pub use state::{check_invariants, State};
pub use steps::{Params, Step, StepPerformer, StepRegistry, StepSummary, TypedStepPerformer};
pub use subscriptions::{
    DropReason, HistoryAction, SheetEvent, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId, SubscriptionManager,
};
pub use table::{Column, Table};
pub use types::*;
