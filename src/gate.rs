use std::collections::BTreeSet;
use std::fmt;

/// Advisory navigation permission for the host UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateState {
    #[default]
    Unlocked,
    Locked,
}

impl GateState {
    pub fn is_locked(self) -> bool {
        matches!(self, GateState::Locked)
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateState::Unlocked => f.write_str("unlocked"),
            GateState::Locked => f.write_str("locked"),
        }
    }
}

/// What the gate needs to know about the focused entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Content,
    Interstitial(usize),
}

/// Tracks which interstitials have been viewed and derives the gate from the
/// current focus. Completion never reverts.
#[derive(Debug, Clone, Default)]
pub struct NavigationGate {
    state: GateState,
    focus: Option<Focus>,
    completed: BTreeSet<usize>,
}

impl NavigationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn focus(&self) -> Option<Focus> {
        self.focus
    }

    pub fn is_completed(&self, interstitial: usize) -> bool {
        self.completed.contains(&interstitial)
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn focus_on(&mut self, focus: Focus) -> GateState {
        self.focus = Some(focus);
        self.state = match focus {
            Focus::Content => GateState::Unlocked,
            Focus::Interstitial(idx) if self.completed.contains(&idx) => GateState::Unlocked,
            Focus::Interstitial(_) => GateState::Locked,
        };
        self.state
    }

    /// Records a completed view. Returns `false` when it was already complete.
    pub fn complete(&mut self, interstitial: usize) -> bool {
        if !self.completed.insert(interstitial) {
            return false;
        }
        if self.focus == Some(Focus::Interstitial(interstitial)) {
            self.state = GateState::Unlocked;
        }
        true
    }
}
