//! Replay gate (§4.1 "Replay interlock"): a process-wide flag that pauses the
//! adaptive scheduler's live loops while a replay run owns the pipeline, so a
//! replay and the live scheduler never interleave writes to the same symbol.
//! Grounded on the teacher's `ReplayGuard`-style atomic flag shared between
//! the live trading loop and its backtest runner.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct ReplayGate {
    running: Arc<AtomicBool>,
}

impl ReplayGate {
    pub fn new() -> Self {
        Self { running: Arc::new(AtomicBool::new(false)) }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_not_running() {
        let gate = ReplayGate::new();
        assert!(!gate.is_running());
    }

    #[test]
    fn set_running_is_observable() {
        let gate = ReplayGate::new();
        gate.set_running(true);
        assert!(gate.is_running());
        gate.set_running(false);
        assert!(!gate.is_running());
    }
}
