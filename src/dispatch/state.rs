//! Dispatcher state machine.

/// Where the dispatcher is in the per-recipient cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchState {
    /// Between recipients.
    Idle,
    /// Rendering the message for the current recipient.
    Personalizing,
    /// Waiting on the provider.
    Sending,
    /// Updating and persisting progress.
    Recording,
    /// Waiting out the inter-send delay.
    Pacing,
    /// Recipient list consumed.
    Exhausted,
    /// Stopped by a shutdown signal.
    Interrupted,
}

impl DispatchState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: DispatchState) -> bool {
        use DispatchState::*;

        if target == Interrupted {
            return !self.is_terminal();
        }

        matches!(
            (self, target),
            (Idle, Personalizing) | (Idle, Exhausted) |
            (Personalizing, Sending) |
            (Sending, Recording) |
            // Last recipient of the batch skips pacing
            (Recording, Pacing) | (Recording, Idle) |
            (Pacing, Idle)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exhausted | Self::Interrupted)
    }
}

impl std::fmt::Display for DispatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Personalizing => "personalizing",
            Self::Sending => "sending",
            Self::Recording => "recording",
            Self::Pacing => "pacing",
            Self::Exhausted => "exhausted",
            Self::Interrupted => "interrupted",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DispatchState::*;

    #[test]
    fn happy_cycle_is_legal() {
        let cycle = [Idle, Personalizing, Sending, Recording, Pacing, Idle];
        for pair in cycle.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn cannot_skip_recording() {
        assert!(!Sending.can_transition_to(Pacing));
        assert!(!Sending.can_transition_to(Idle));
        assert!(!Personalizing.can_transition_to(Recording));
    }

    #[test]
    fn interrupt_from_any_live_state() {
        for state in [Idle, Personalizing, Sending, Recording, Pacing] {
            assert!(state.can_transition_to(Interrupted), "{state}");
        }
        assert!(!Exhausted.can_transition_to(Interrupted));
    }

    #[test]
    fn terminal_states_are_final() {
        for target in [Idle, Personalizing, Sending, Recording, Pacing, Exhausted] {
            assert!(!Exhausted.can_transition_to(target));
            assert!(!Interrupted.can_transition_to(target));
        }
    }

    #[test]
    fn display_is_snake_case() {
        assert_eq!(Personalizing.to_string(), "personalizing");
        assert_eq!(Interrupted.to_string(), "interrupted");
    }
}
