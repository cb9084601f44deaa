//! Transition table for one branch's allocate / execute / evaluate loop.

use super::{
    errors::{StateMachineError, StateMachineResult},
    events::BranchEvent,
    states::{BranchState, TerminationReason},
};

#[derive(Debug, Clone)]
pub struct BranchStateMachine {
    platform: String,
    current: BranchState,
    reason: Option<TerminationReason>,
}

impl BranchStateMachine {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            current: BranchState::Allocating,
            reason: None,
        }
    }

    pub fn current_state(&self) -> BranchState {
        self.current
    }

    /// Set once the branch reaches `Terminated`
    pub fn termination_reason(&self) -> Option<TerminationReason> {
        self.reason
    }

    pub fn transition(&mut self, event: BranchEvent) -> StateMachineResult<BranchState> {
        let target = Self::determine_target_state(self.current, event)?;
        tracing::trace!(
            platform = %self.platform,
            from = %self.current,
            to = %target,
            event = event.event_type(),
            "Branch state transition"
        );
        if target == BranchState::Terminated {
            self.reason = Some(match event {
                BranchEvent::GiveUp(reason) => reason,
                BranchEvent::NoResource => TerminationReason::NoResource,
                _ => TerminationReason::Cancelled,
            });
        }
        self.current = target;
        Ok(target)
    }

    pub fn determine_target_state(
        current: BranchState,
        event: BranchEvent,
    ) -> StateMachineResult<BranchState> {
        if current.is_terminal() {
            return Err(StateMachineError::TerminalState(current.to_string()));
        }

        let target = match (current, event) {
            (_, BranchEvent::Cancelled) => BranchState::Terminated,

            (BranchState::Allocating, BranchEvent::LeaseAcquired)
            | (BranchState::SwitchingResource, BranchEvent::LeaseAcquired) => BranchState::Executing,
            (BranchState::Allocating, BranchEvent::NoResource)
            | (BranchState::SwitchingResource, BranchEvent::NoResource) => BranchState::Terminated,

            (BranchState::Executing, BranchEvent::AttemptSucceeded) => BranchState::Succeeded,
            (BranchState::Executing, BranchEvent::AttemptFailed) => BranchState::EvaluatingFailure,

            (BranchState::EvaluatingFailure, BranchEvent::Retry) => BranchState::Retrying,
            (BranchState::EvaluatingFailure, BranchEvent::Switch) => BranchState::SwitchingResource,
            (BranchState::EvaluatingFailure, BranchEvent::GiveUp(_))
            | (BranchState::SwitchingResource, BranchEvent::GiveUp(_)) => BranchState::Terminated,

            (BranchState::Retrying, BranchEvent::BackoffElapsed) => BranchState::Allocating,

            (from, event) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}
