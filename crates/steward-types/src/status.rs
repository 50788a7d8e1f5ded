//! Step and plan status state machines

use serde::{Deserialize, Serialize};

/// Status of a single step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not started; may be blocked on dependencies
    Pending,
    /// Worker invocation outstanding
    Running,
    /// Suspended on an approval gate
    AwaitingApproval,
    /// Human approved; completion pending
    Approved,
    /// Human rejected; final
    Rejected,
    /// Result stored; final
    Completed,
    /// Error stored; final
    Failed,
}

impl StepStatus {
    /// Whether `next` is reachable from this status in one transition.
    ///
    /// ```text
    /// Pending → Running → Completed | Failed
    ///                   → AwaitingApproval → Rejected | Failed
    ///                                      → Approved → Completed | Failed
    /// ```
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        use StepStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, AwaitingApproval)
                | (Running, Completed)
                | (Running, Failed)
                | (AwaitingApproval, Approved)
                | (AwaitingApproval, Rejected)
                | (AwaitingApproval, Failed)
                | (Approved, Completed)
                | (Approved, Failed)
        )
    }

    /// No further transitions are possible
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Rejected
        )
    }

    /// Work has started but not settled
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            StepStatus::Running | StepStatus::AwaitingApproval | StepStatus::Approved
        )
    }

    /// Failed or rejected: dependents can never run
    pub fn is_blocking(&self) -> bool {
        matches!(self, StepStatus::Failed | StepStatus::Rejected)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::AwaitingApproval => "awaiting_approval",
            StepStatus::Approved => "approved",
            StepStatus::Rejected => "rejected",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Aggregate status of a plan
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl PlanStatus {
    pub fn can_transition_to(&self, next: PlanStatus) -> bool {
        use PlanStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlanStatus::Completed | PlanStatus::Failed | PlanStatus::Cancelled
        )
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PlanStatus::Pending => "pending",
            PlanStatus::Running => "running",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
            PlanStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: [StepStatus; 7] = [
        StepStatus::Pending,
        StepStatus::Running,
        StepStatus::AwaitingApproval,
        StepStatus::Approved,
        StepStatus::Rejected,
        StepStatus::Completed,
        StepStatus::Failed,
    ];

    /// Position along the lifecycle; transitions must strictly increase it.
    fn rank(status: StepStatus) -> u8 {
        match status {
            StepStatus::Pending => 0,
            StepStatus::Running => 1,
            StepStatus::AwaitingApproval => 2,
            StepStatus::Approved => 3,
            StepStatus::Rejected => 4,
            StepStatus::Completed => 4,
            StepStatus::Failed => 4,
        }
    }

    #[test]
    fn final_states_have_no_exits() {
        for from in ALL.iter().filter(|s| s.is_final()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be illegal");
            }
        }
    }

    #[test]
    fn nothing_reenters_pending() {
        for from in ALL {
            assert!(!from.can_transition_to(StepStatus::Pending));
        }
    }

    #[test]
    fn approval_path_is_reachable() {
        assert!(StepStatus::Running.can_transition_to(StepStatus::AwaitingApproval));
        assert!(StepStatus::AwaitingApproval.can_transition_to(StepStatus::Approved));
        assert!(StepStatus::Approved.can_transition_to(StepStatus::Completed));
        assert!(!StepStatus::AwaitingApproval.can_transition_to(StepStatus::Completed));
    }

    #[test]
    fn plan_terminal_states_are_sticky() {
        for from in [PlanStatus::Completed, PlanStatus::Failed, PlanStatus::Cancelled] {
            assert!(from.is_terminal());
            assert!(!from.can_transition_to(PlanStatus::Running));
        }
    }

    fn status_strategy() -> impl Strategy<Value = StepStatus> {
        proptest::sample::select(ALL.to_vec())
    }

    proptest! {
        #[test]
        fn property_legal_transitions_only_move_forward(
            from in status_strategy(),
            to in status_strategy(),
        ) {
            if from.can_transition_to(to) {
                prop_assert!(rank(to) > rank(from));
            }
        }
    }
}
