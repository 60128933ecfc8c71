//! Subscription manager for broadcasting engine events.

use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

use super::types::{
    DropReason, HistoryAction, SheetEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};
use crate::steps::StepSummary;
use crate::types::StepId;

/// Internal subscription state.
struct Subscription {
    config: SubscriptionConfig,
    sender: Sender<SheetEvent>,
}

impl Subscription {
    /// Try to send an event. Returns false if buffer is full (subscriber will be dropped).
    fn try_send(&self, event: SheetEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }

    fn matches_edit(&self, step_type: &str) -> bool {
        if !self.config.filter.include_edits {
            return false;
        }
        match &self.config.filter.step_types {
            Some(types) => types.iter().any(|t| t == step_type),
            None => true,
        }
    }

    fn wants_history(&self) -> bool {
        self.config.filter.include_history
    }

    fn wants_analysis(&self) -> bool {
        self.config.filter.include_analysis
    }
}

/// Manages subscriptions and broadcasts events. Sending never blocks: a
/// subscriber whose buffer is full is dropped.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size);
        self.subscriptions.write().insert(id, Subscription { config, sender });
        SubscriptionHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(sub) = self.subscriptions.write().remove(&id) {
            // Best effort.
            let _ = sub.sender.try_send(SheetEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    // --- Broadcasting ---

    pub fn broadcast_step(&self, step: StepSummary, step_index: usize, overwrote: bool) {
        let step_type = step.step_type.clone();
        let event = SheetEvent::StepApplied {
            step,
            step_index,
            overwrote,
        };
        self.broadcast(|sub| sub.matches_edit(&step_type), event);
    }

    pub fn broadcast_history(&self, action: HistoryAction, curr_step_idx: usize, num_steps: usize) {
        let event = SheetEvent::HistoryChanged {
            action,
            curr_step_idx,
            num_steps,
        };
        self.broadcast(Subscription::wants_history, event);
    }

    pub fn broadcast_imports_updated(&self, step_ids: Vec<StepId>) {
        self.broadcast(Subscription::wants_history, SheetEvent::ImportsUpdated { step_ids });
    }

    pub fn broadcast_analysis_saved(&self, analysis_name: &str) {
        let event = SheetEvent::AnalysisSaved {
            analysis_name: analysis_name.to_string(),
        };
        self.broadcast(Subscription::wants_analysis, event);
    }

    /// Internal broadcast helper. Drops subscribers that fail to receive.
    fn broadcast<F>(&self, filter: F, event: SheetEvent)
    where
        F: Fn(&Subscription) -> bool,
    {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if filter(sub) && !sub.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if subs.remove(&id).is_some() {
                    warn!(subscription = id.0, "dropped slow subscriber");
                }
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
