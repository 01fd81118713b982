//! Engine configuration (ambient stack, §2 table): the small set of knobs
//! the spec's open questions turned into explicit configuration rather than
//! hard-coded behavior. No file or environment loader lives here — wiring
//! `EngineConfig` from a config file or CLI flags is a non-goal (§1).

use crate::bar::BarSpec;
use serde::{Deserialize, Serialize};

/// Runtime knobs for a single [`crate::engine::ExecutionEngine`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default bar construction rules handed to newly-created aggregators
    /// when a strategy does not specify its own.
    pub default_bar_spec: BarSpec,
    /// Whether a `CancelReject` clears `Order::in_flight_cancel`, letting a
    /// strategy retry immediately, rather than leaving it set until the
    /// in-flight attempt resolves some other way (§9 open question; see
    /// DESIGN.md). Defaults to `true`.
    pub clear_in_flight_cancel_on_reject: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig { default_bar_spec: BarSpec::default(), clear_in_flight_cancel_on_reject: true }
    }
}
