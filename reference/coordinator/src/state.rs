//! Coordinator state definitions.

/// Coordinator operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Accepting new operations and notices.
    Running,
    /// Administratively paused: no new operations, notices still counted so
    /// in-flight operations can finish.
    Paused,
    /// Shutting down; notices still counted.
    ShuttingDown,
    /// Stopped.
    Stopped,
}

impl CoordinatorState {
    /// Check if new operations may be started.
    pub fn accepts_operations(&self) -> bool {
        matches!(self, CoordinatorState::Running)
    }

    /// Check if inbound notices are processed.
    pub fn accepts_notices(&self) -> bool {
        !matches!(self, CoordinatorState::Stopped)
    }

    /// Check if the coordinator is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CoordinatorState::Stopped)
    }
}
