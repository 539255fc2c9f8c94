// Orchestrator - role plans per scale level and their sequential execution

use thiserror::Error;

use crate::agent::{
    AgentError, AgentRole, ImplementationResult, RoleContext, RoleFactory, Task, TaskKind,
    TaskOutput, VerificationResult,
};

pub mod classifier;

pub use classifier::{classify, Classification, ScaleLevel};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("{role} aborted the role sequence: {source}")]
    RoleSequenceAborted {
        role: AgentRole,
        #[source]
        source: AgentError,
    },
}

impl OrchestratorError {
    pub fn role(&self) -> AgentRole {
        match self {
            OrchestratorError::RoleSequenceAborted { role, .. } => *role,
        }
    }
}

/// How a role sequence ended
#[derive(Debug, Clone)]
pub enum PlanOutcome {
    Accepted {
        implementation: ImplementationResult,
        verification: VerificationResult,
    },
    /// The verifier judged the implementation and said no
    Rejected {
        implementation: ImplementationResult,
        verification: VerificationResult,
    },
}

impl PlanOutcome {
    pub fn implementation(&self) -> &ImplementationResult {
        match self {
            PlanOutcome::Accepted { implementation, .. }
            | PlanOutcome::Rejected { implementation, .. } => implementation,
        }
    }

    pub fn verification(&self) -> &VerificationResult {
        match self {
            PlanOutcome::Accepted { verification, .. }
            | PlanOutcome::Rejected { verification, .. } => verification,
        }
    }
}

/// Roles that take part at a given level, in invocation order
pub fn agents_for(level: ScaleLevel) -> Vec<AgentRole> {
    use AgentRole::*;
    match level {
        ScaleLevel::BugFix => vec![Implementer],
        ScaleLevel::SmallFeature => vec![Requirements, Implementer],
        ScaleLevel::Product => vec![Requirements, Architect, Implementer, Verifier],
        ScaleLevel::Enterprise => {
            let mut roles = agents_for(ScaleLevel::Product);
            roles.push(ComplianceReviewer);
            roles
        }
        ScaleLevel::EnterprisePlus => {
            let mut roles = agents_for(ScaleLevel::Enterprise);
            roles.push(ReleaseCoordinator);
            roles
        }
    }
}

/// The plan for one story attempt: `agents_for(level)` with a verifier
/// right after the implementer when the level has none
pub fn story_plan(level: ScaleLevel) -> Vec<AgentRole> {
    let mut roles = agents_for(level);
    if !roles.contains(&AgentRole::Verifier) {
        let at = roles
            .iter()
            .position(|r| *r == AgentRole::Implementer)
            .map(|i| i + 1)
            .unwrap_or(roles.len());
        roles.insert(at, AgentRole::Verifier);
    }
    roles
}

/// Run `roles` in order with fresh agents from `factory`.
///
/// Each role sees what earlier roles added to the context. A role error stops
/// the sequence. A negative verdict does not stop it; it makes the outcome a
/// rejection, and review roles after the verifier still see it.
pub async fn run_plan(
    factory: &dyn RoleFactory,
    roles: &[AgentRole],
    mut context: RoleContext,
) -> Result<PlanOutcome, OrchestratorError> {
    for &role in roles {
        let task = match role.task_kind() {
            TaskKind::Implement => Task::Implement,
            TaskKind::Verify => Task::Verify {
                files_changed: context
                    .implementation
                    .as_ref()
                    .map(|i| i.files_changed.clone())
                    .unwrap_or_default(),
            },
            TaskKind::Advise => Task::Advise,
        };

        tracing::info!("{}: {}", context.story.id, role);
        let mut agent = factory.spawn(role);
        let output = agent
            .perform(task, &context)
            .await
            .map_err(|source| OrchestratorError::RoleSequenceAborted { role, source })?;

        match output {
            TaskOutput::Implemented(result) => context.implementation = Some(result),
            TaskOutput::Verified(result) => context.verification = Some(result),
            TaskOutput::Advised(advice) => context.notes.push(advice),
        }
    }

    let implementation = context.implementation.unwrap_or_default();
    match context.verification {
        Some(verification) if verification.passed => Ok(PlanOutcome::Accepted {
            implementation,
            verification,
        }),
        Some(verification) => Ok(PlanOutcome::Rejected {
            implementation,
            verification,
        }),
        None => Err(OrchestratorError::RoleSequenceAborted {
            role: AgentRole::Verifier,
            source: AgentError::Contract {
                role: AgentRole::Verifier,
                reason: "role plan produced no verdict".to_string(),
            },
        }),
    }
}
