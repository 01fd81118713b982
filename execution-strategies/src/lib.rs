//! Reference `Strategy` implementations for the execution core.
//!
//! Algorithmic indicator logic is a strategy author's concern and
//! deliberately outside the execution core (spec §1 non-goal); what lives
//! here are thin, non-algorithmic adapters that exercise the
//! `execution_core::engine::Strategy` capability trait end to end — useful
//! both as integration-test fixtures and as a starting point for a real
//! strategy crate.

use execution_core::engine::{Strategy, StrategyEvent};
use execution_core::ids::StrategyId;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Records every event it receives, in arrival order. Used by integration
/// tests to assert on what the engine delivered without needing a real
/// trading decision in the loop.
pub struct RecordingStrategy {
    id: StrategyId,
    events: Arc<Mutex<Vec<StrategyEvent>>>,
}

impl RecordingStrategy {
    pub fn new(id: StrategyId) -> Self {
        RecordingStrategy { id, events: Arc::new(Mutex::new(Vec::new())) }
    }

    /// A cloneable read handle into the events recorded so far.
    pub fn events(&self) -> Arc<Mutex<Vec<StrategyEvent>>> {
        self.events.clone()
    }
}

impl Strategy for RecordingStrategy {
    fn strategy_id(&self) -> &StrategyId {
        &self.id
    }

    fn handle_event(&mut self, event: StrategyEvent) {
        self.events.lock().push(event);
    }
}

/// Logs every event at `info` and otherwise does nothing. Useful as a
/// drop-in strategy for a smoke-test deployment where no trading decision
/// should be made.
pub struct LoggingStrategy {
    id: StrategyId,
}

impl LoggingStrategy {
    pub fn new(id: StrategyId) -> Self {
        LoggingStrategy { id }
    }
}

impl Strategy for LoggingStrategy {
    fn strategy_id(&self) -> &StrategyId {
        &self.id
    }

    fn handle_event(&mut self, event: StrategyEvent) {
        match event {
            StrategyEvent::Order(order_event) => {
                info!(strategy = %self.id, order_id = %order_event.order_id, "order event");
            }
            StrategyEvent::Position(position_event) => {
                info!(strategy = %self.id, position_id = %position_event.position_id, kind = ?position_event.kind, "position event");
            }
        }
    }
}
