// Per-mechanism record of the last applied action
//
// A command is only sent to the motors when the requested action differs from
// the latched one. This avoids flooding the bus from stage loops that re-issue
// the same command every iteration.

use std::collections::HashMap;

use super::command::{Action, Mechanism};

#[derive(Debug, Clone)]
pub struct StateLatch {
    states: HashMap<Mechanism, Action>,
}

impl StateLatch {
    /// Every mechanism starts unknown, so the first command always goes out
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
        }
    }

    pub fn current(&self, mechanism: Mechanism) -> Option<Action> {
        self.states.get(&mechanism).copied()
    }

    pub fn differs(&self, mechanism: Mechanism, action: Action) -> bool {
        self.current(mechanism) != Some(action)
    }

    pub fn record(&mut self, mechanism: Mechanism, action: Action) {
        self.states.insert(mechanism, action);
    }

    /// Whether any mechanism is latched to something other than `Stop`
    pub fn any_active(&self) -> bool {
        Mechanism::ALL
            .iter()
            .any(|&m| self.current(m) != Some(Action::Stop))
    }

    pub fn reset_all(&mut self) {
        for mechanism in Mechanism::ALL {
            self.states.insert(mechanism, Action::Stop);
        }
    }
}

impl Default for StateLatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_differs() {
        let mut latch = StateLatch::new();
        assert!(latch.differs(Mechanism::Drive, Action::Stop));

        latch.record(Mechanism::Drive, Action::Forward);
        assert!(!latch.differs(Mechanism::Drive, Action::Forward));
        assert!(latch.differs(Mechanism::Drive, Action::Backward));
        assert_eq!(latch.current(Mechanism::StepFront), None);
    }

    #[test]
    fn test_reset_all() {
        let mut latch = StateLatch::new();
        assert!(latch.any_active());
        latch.reset_all();
        assert!(!latch.any_active());
        latch.record(Mechanism::StepBack, Action::LowerBack);
        assert!(latch.any_active());
    }
}
