//! Callback system for circuit breaker state transitions

use crate::circuit::CircuitState;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

pub type StateHook = Arc<dyn Fn(&str) + Send + Sync>;
pub type TransitionHook = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Callbacks for circuit breaker events
///
/// Hooks run on the caller's task after the breaker lock is released, so a
/// hook may read the breaker it is attached to. They still delay the call
/// that caused the transition and should stay quick. A panicking hook is
/// logged and swallowed; it never changes the caller's result.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_open: Option<StateHook>,
    pub on_close: Option<StateHook>,
    pub on_half_open: Option<StateHook>,
    pub on_state_change: Option<TransitionHook>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the per-state hook for `to`, then the generic transition hook
    pub fn trigger_transition(&self, circuit: &str, from: CircuitState, to: CircuitState) {
        let state_hook = match to {
            CircuitState::Open => &self.on_open,
            CircuitState::Closed => &self.on_close,
            CircuitState::HalfOpen => &self.on_half_open,
        };

        if let Some(callback) = state_hook {
            guarded(circuit, || callback(circuit));
        }
        if let Some(callback) = &self.on_state_change {
            guarded(circuit, || callback(circuit, from, to));
        }
    }
}

fn guarded(circuit: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(circuit, "state transition callback panicked");
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .field("on_state_change", &self.on_state_change.is_some())
            .finish()
    }
}
