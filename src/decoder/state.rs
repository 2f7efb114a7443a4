//! Decoder lifecycle state

use std::time::Instant;

/// Lifecycle of a background decoder
///
/// A decoder is started at most once; `Stopped` is terminal and covers both
/// an explicit `stop` and the producer thread finishing on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Created, producer thread not spawned yet
    Idle,

    /// Producer thread is filling the buffer
    Running {
        /// When the producer thread was spawned
        started_at: Instant,
    },

    /// Producer thread finished or was asked to finish
    Stopped,
}

impl DecoderState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &DecoderState) -> bool {
        use DecoderState::*;

        match (self, target) {
            (Idle, Running { .. }) => true,
            // Stopping a decoder that was never started
            (Idle, Stopped) => true,
            (Running { .. }, Stopped) => true,

            (Stopped, _) => false,
            (a, b) if a == b => true,
            _ => false,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DecoderState::Idle => "Idle",
            DecoderState::Running { .. } => "Running",
            DecoderState::Stopped => "Stopped",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, DecoderState::Running { .. })
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, DecoderState::Stopped)
    }

    /// Time since the producer was spawned (if running)
    pub fn running_duration(&self) -> Option<std::time::Duration> {
        if let DecoderState::Running { started_at } = self {
            Some(started_at.elapsed())
        } else {
            None
        }
    }
}

impl std::fmt::Display for DecoderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let idle = DecoderState::Idle;
        let running = DecoderState::Running {
            started_at: Instant::now(),
        };
        let stopped = DecoderState::Stopped;

        assert!(idle.can_transition_to(&running));
        assert!(idle.can_transition_to(&stopped));
        assert!(running.can_transition_to(&stopped));
        assert!(running.can_transition_to(&running));
    }

    #[test]
    fn test_stopped_is_terminal() {
        let stopped = DecoderState::Stopped;
        assert!(!stopped.can_transition_to(&DecoderState::Idle));
        assert!(!stopped.can_transition_to(&DecoderState::Running {
            started_at: Instant::now(),
        }));
        assert!(!stopped.can_transition_to(&DecoderState::Stopped));
        assert!(!DecoderState::Running {
            started_at: Instant::now()
        }
        .can_transition_to(&DecoderState::Idle));
    }

    #[test]
    fn test_state_checks() {
        let running = DecoderState::Running {
            started_at: Instant::now(),
        };
        assert!(running.is_running());
        assert!(running.running_duration().is_some());
        assert_eq!(running.to_string(), "Running");
        assert!(DecoderState::Stopped.is_stopped());
        assert!(!DecoderState::Idle.is_running());
        assert!(DecoderState::Idle.running_duration().is_none());
    }
}
