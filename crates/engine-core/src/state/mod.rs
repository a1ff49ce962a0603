use serde::Serialize;
use std::fmt;

/// Lifecycle of one job run: `Running -> Succeeded`, or
/// `Running -> Failed -> Notified` once the failure notice went out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Running,
    Succeeded,
    Failed,
    Notified,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
            RunState::Notified => "notified",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Notified)
    }

    /// Whether `self -> next` is a legal step.
    pub fn can_move_to(&self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Running, RunState::Succeeded)
                | (RunState::Running, RunState::Failed)
                | (RunState::Failed, RunState::Notified)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
