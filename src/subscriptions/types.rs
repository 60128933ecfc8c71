//! Subscription types for engine notifications.

use crate::steps::StepSummary;
use crate::types::StepId;
use serde::{Deserialize, Serialize};

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 256
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: SubscriptionFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            filter: SubscriptionFilter::all(),
        }
    }
}

/// Which kinds of events a subscriber wants.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionFilter {
    /// Steps appended or overwritten.
    pub include_edits: bool,

    /// Undo, redo, clear, checkout and replay.
    pub include_history: bool,

    /// Analyses saved.
    pub include_analysis: bool,

    /// Only edits of these step types (None = all types).
    pub step_types: Option<Vec<String>>,
}

impl SubscriptionFilter {
    pub fn edits() -> Self {
        Self {
            include_edits: true,
            ..Default::default()
        }
    }

    /// Edits of specific step types.
    pub fn step_types(types: Vec<String>) -> Self {
        Self {
            include_edits: true,
            step_types: Some(types),
            ..Default::default()
        }
    }

    pub fn history() -> Self {
        Self {
            include_history: true,
            ..Default::default()
        }
    }

    pub fn all() -> Self {
        Self {
            include_edits: true,
            include_history: true,
            include_analysis: true,
            step_types: None,
        }
    }
}

/// How the step list moved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Undo,
    Redo,
    Clear,
    Checkout,
    UndoToStep,
    Replay,
    UpdateImports,
}

/// Events emitted to subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SheetEvent {
    /// A step was appended, or the top step was replaced.
    StepApplied {
        step: StepSummary,
        step_index: usize,
        overwrote: bool,
    },

    /// The step list or cursor changed without a new edit.
    HistoryChanged {
        action: HistoryAction,
        curr_step_idx: usize,
        num_steps: usize,
    },

    /// Import steps were given new params.
    ImportsUpdated { step_ids: Vec<StepId> },

    AnalysisSaved { analysis_name: String },

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<SheetEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<SheetEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<SheetEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<SheetEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything buffered so far.
    pub fn drain(&self) -> Vec<SheetEvent> {
        self.receiver.try_iter().collect()
    }
}
