//! Scheduling actions
//!
//! An action is one algorithmic phase over an open session. The driver
//! instantiates the configured actions each round, runs them in order, and
//! discards them when the session closes.

use async_trait::async_trait;

use crate::session::Session;
use crate::SchedulerError;

pub mod allocate;
pub mod preempt;

pub use allocate::AllocateAction;
pub use preempt::PreemptAction;

#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    /// Hook called before a round's `execute`.
    fn initialize(&mut self) {}

    async fn execute(&mut self, ssn: &mut Session) -> Result<(), SchedulerError>;

    /// Hook called after a round's `execute`.
    fn un_initialize(&mut self) {}
}

/// Instantiate a configured action by name.
pub fn new_action(name: &str) -> Result<Box<dyn Action>, SchedulerError> {
    match name {
        allocate::ACTION_NAME => Ok(Box::new(AllocateAction::new())),
        preempt::ACTION_NAME => Ok(Box::new(PreemptAction::new())),
        other => Err(SchedulerError::UnknownAction(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_action_resolves_known_names() {
        assert_eq!(new_action("allocate").unwrap().name(), "allocate");
        assert_eq!(new_action("preempt").unwrap().name(), "preempt");
        assert!(matches!(
            new_action("backfill"),
            Err(SchedulerError::UnknownAction(_))
        ));
    }
}
