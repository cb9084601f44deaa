//! # State Machines
//!
//! Pure transition tables for task status and per-branch retry state. Both
//! machines reject transitions out of terminal states.

pub mod branch_state_machine;
pub mod errors;
pub mod events;
pub mod states;
pub mod task_state_machine;

pub use branch_state_machine::BranchStateMachine;
pub use errors::{StateMachineError, StateMachineResult};
pub use events::{BranchEvent, TaskEvent};
pub use states::{BranchState, TaskState, TerminationReason};
pub use task_state_machine::TaskStateMachine;
