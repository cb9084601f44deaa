use super::{
    errors::{StateMachineError, StateMachineResult},
    events::TaskEvent,
    states::TaskState,
};
use uuid::Uuid;

/// In-memory view of one task's status lifecycle
#[derive(Debug, Clone)]
pub struct TaskStateMachine {
    task_id: Uuid,
    current: TaskState,
}

impl TaskStateMachine {
    pub fn new(task_id: Uuid, current: TaskState) -> Self {
        Self { task_id, current }
    }

    pub fn current_state(&self) -> TaskState {
        self.current
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Attempt to transition the task state
    pub fn transition(&mut self, event: &TaskEvent) -> StateMachineResult<TaskState> {
        let target = Self::determine_target_state(self.current, event)?;
        tracing::debug!(
            task_id = %self.task_id,
            from = %self.current,
            to = %target,
            event = event.event_type(),
            "Task state transition"
        );
        self.current = target;
        Ok(target)
    }

    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: TaskState,
        event: &TaskEvent,
    ) -> StateMachineResult<TaskState> {
        if current_state.is_terminal() {
            return Err(StateMachineError::TerminalState(current_state.to_string()));
        }

        let target = match (current_state, event) {
            (TaskState::Pending, TaskEvent::Start) => TaskState::Running,

            (TaskState::Running, TaskEvent::Complete) => TaskState::Completed,
            (TaskState::Running, TaskEvent::CompleteWithErrors) => TaskState::CompletedWithErrors,

            // Dispatch can fail before any branch starts
            (TaskState::Pending, TaskEvent::Fail(_)) => TaskState::Failed,
            (TaskState::Running, TaskEvent::Fail(_)) => TaskState::Failed,

            (TaskState::Running, TaskEvent::Timeout) => TaskState::Timeout,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    /// Whether `to` is reachable from `from` by one event
    pub fn can_transition(from: TaskState, to: TaskState) -> bool {
        let events = [
            TaskEvent::Start,
            TaskEvent::Complete,
            TaskEvent::CompleteWithErrors,
            TaskEvent::Fail(String::new()),
            TaskEvent::Timeout,
        ];
        events
            .iter()
            .any(|event| Self::determine_target_state(from, event) == Ok(to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        assert_eq!(
            TaskStateMachine::determine_target_state(TaskState::Pending, &TaskEvent::Start),
            Ok(TaskState::Running)
        );
        assert_eq!(
            TaskStateMachine::determine_target_state(TaskState::Running, &TaskEvent::Complete),
            Ok(TaskState::Completed)
        );
        assert_eq!(
            TaskStateMachine::determine_target_state(
                TaskState::Running,
                &TaskEvent::Fail("all branches failed".to_string())
            ),
            Ok(TaskState::Failed)
        );
        assert_eq!(
            TaskStateMachine::determine_target_state(TaskState::Running, &TaskEvent::Timeout),
            Ok(TaskState::Timeout)
        );
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(matches!(
            TaskStateMachine::determine_target_state(TaskState::Pending, &TaskEvent::Complete),
            Err(StateMachineError::InvalidTransition { .. })
        ));
        assert!(TaskStateMachine::determine_target_state(TaskState::Running, &TaskEvent::Start)
            .is_err());
        assert!(
            TaskStateMachine::determine_target_state(TaskState::Pending, &TaskEvent::Timeout)
                .is_err()
        );
    }

    #[test]
    fn test_terminal_states_are_final() {
        for state in TaskState::ALL.into_iter().filter(|s| s.is_terminal()) {
            for target in TaskState::ALL {
                assert!(!TaskStateMachine::can_transition(state, target));
            }
            assert!(matches!(
                TaskStateMachine::determine_target_state(state, &TaskEvent::Start),
                Err(StateMachineError::TerminalState(_))
            ));
        }
    }

    #[test]
    fn test_machine_tracks_current_state() {
        let mut sm = TaskStateMachine::new(Uuid::new_v4(), TaskState::Pending);
        sm.transition(&TaskEvent::Start).unwrap();
        sm.transition(&TaskEvent::CompleteWithErrors).unwrap();
        assert_eq!(sm.current_state(), TaskState::CompletedWithErrors);
        assert!(sm.transition(&TaskEvent::Timeout).is_err());
        assert_eq!(sm.current_state(), TaskState::CompletedWithErrors);
    }
}
