//! In-process notifications of engine activity.
//!
//! A host subscribes with a filter and receives [`SheetEvent`]s over a
//! bounded channel:
//! - steps applied (new or overwritten)
//! - history moves (undo, redo, clear, checkout, replay, import updates)
//! - analyses saved
//!
//! # Example
//!
//! ```ignore
//! let handle = manager.subscribe(SubscriptionConfig {
//!     filter: SubscriptionFilter::edits(),
//!     ..Default::default()
//! });
//!
//! while let Ok(event) = handle.recv() {
//!     match event {
//!         SheetEvent::StepApplied { step, .. } => println!("{}", step.step_description),
//!         SheetEvent::Dropped { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, HistoryAction, SheetEvent, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId,
};
