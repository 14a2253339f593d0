//! Saga lifecycle states, step enums and compensation policies.

use serde::{Deserialize, Serialize};

/// The state of a saga in its lifecycle.
///
/// State transitions:
/// ```text
/// NotStarted ──► Running ──┬──► Completed
///                          ├──► Failed
///                          └──► Compensating ──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    #[default]
    NotStarted,

    /// Forward steps are being executed.
    Running,

    /// A step failed and compensating actions are in progress.
    Compensating,

    /// All steps completed successfully (terminal state).
    Completed,

    /// The saga ended with an error, compensated or not (terminal state).
    Failed,
}

impl SagaState {
    /// Returns true if the saga can begin compensation.
    pub fn can_compensate(&self) -> bool {
        matches!(self, SagaState::Running)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "NotStarted",
            SagaState::Running => "Running",
            SagaState::Compensating => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a saga does with completed steps when a later step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompensationPolicy {
    /// Undo every completed compensatable step, most recent first.
    Compensate,

    /// Leave completed steps in place and report the inconsistency for
    /// operators to reconcile.
    AcceptAndReconcile,
}

impl CompensationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompensationPolicy::Compensate => "compensate",
            CompensationPolicy::AcceptAndReconcile => "accept_and_reconcile",
        }
    }
}

impl std::fmt::Display for CompensationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named step of a saga.
pub trait SagaStep: Copy + Eq + std::fmt::Debug + std::fmt::Display + Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the step leaves an effect that compensation can undo.
    fn compensatable(&self) -> bool;
}

/// Steps of the identity registration saga, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationStep {
    ValidateInput,
    CheckLocalUniqueness,
    CheckRemoteUniqueness,
    CreateRemoteIdentity,
    AssignScopes,
    CreateLocalRecord,
    IssueTokens,
}

impl SagaStep for RegistrationStep {
    fn name(&self) -> &'static str {
        match self {
            RegistrationStep::ValidateInput => "validate_input",
            RegistrationStep::CheckLocalUniqueness => "check_local_uniqueness",
            RegistrationStep::CheckRemoteUniqueness => "check_remote_uniqueness",
            RegistrationStep::CreateRemoteIdentity => "create_remote_identity",
            RegistrationStep::AssignScopes => "assign_scopes",
            RegistrationStep::CreateLocalRecord => "create_local_record",
            RegistrationStep::IssueTokens => "issue_tokens",
        }
    }

    fn compensatable(&self) -> bool {
        matches!(self, RegistrationStep::CreateRemoteIdentity)
    }
}

impl std::fmt::Display for RegistrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Steps of the ticket creation saga, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketStep {
    ValidateInput,
    ResolveCreator,
    CreateRemoteTicket,
    ExtractExternalId,
    CreateLocalRecord,
}

impl SagaStep for TicketStep {
    fn name(&self) -> &'static str {
        match self {
            TicketStep::ValidateInput => "validate_input",
            TicketStep::ResolveCreator => "resolve_creator",
            TicketStep::CreateRemoteTicket => "create_remote_ticket",
            TicketStep::ExtractExternalId => "extract_external_id",
            TicketStep::CreateLocalRecord => "create_local_record",
        }
    }

    // Deleting a remote ticket would destroy work the user believes was saved.
    fn compensatable(&self) -> bool {
        false
    }
}

impl std::fmt::Display for TicketStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_not_started() {
        assert_eq!(SagaState::default(), SagaState::NotStarted);
    }

    #[test]
    fn test_can_compensate() {
        assert!(!SagaState::NotStarted.can_compensate());
        assert!(SagaState::Running.can_compensate());
        assert!(!SagaState::Compensating.can_compensate());
        assert!(!SagaState::Completed.can_compensate());
        assert!(!SagaState::Failed.can_compensate());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SagaState::Running.is_terminal());
        assert!(!SagaState::Compensating.is_terminal());
        assert!(SagaState::Completed.is_terminal());
        assert!(SagaState::Failed.is_terminal());
    }

    #[test]
    fn test_only_remote_identity_is_compensatable() {
        let compensatable: Vec<_> = [
            RegistrationStep::ValidateInput,
            RegistrationStep::CheckLocalUniqueness,
            RegistrationStep::CheckRemoteUniqueness,
            RegistrationStep::CreateRemoteIdentity,
            RegistrationStep::AssignScopes,
            RegistrationStep::CreateLocalRecord,
            RegistrationStep::IssueTokens,
        ]
        .into_iter()
        .filter(|step| step.compensatable())
        .collect();
        assert_eq!(compensatable, vec![RegistrationStep::CreateRemoteIdentity]);
        assert!(!TicketStep::CreateRemoteTicket.compensatable());
    }

    #[test]
    fn test_display() {
        assert_eq!(SagaState::Compensating.to_string(), "Compensating");
        assert_eq!(RegistrationStep::AssignScopes.to_string(), "assign_scopes");
        assert_eq!(TicketStep::CreateLocalRecord.to_string(), "create_local_record");
        assert_eq!(
            CompensationPolicy::AcceptAndReconcile.to_string(),
            "accept_and_reconcile"
        );
    }

    #[test]
    fn test_serialization() {
        let state = SagaState::Running;
        let json = serde_json::to_string(&state).unwrap();
        let deserialized: SagaState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }
}
