// LLM-backed role agents

use async_trait::async_trait;
use std::sync::Arc;

use super::roles::{AgentRole, RoleAgent, RoleContext, RoleFactory, Task, TaskOutput};
use super::{advisor, implementer, verifier};
use super::{Agent, AgentError, AgentOptions, CheckRunner};
use crate::config::Settings;
use crate::llm::InferenceBackend;
use crate::workspace::Workspace;

/// Spawns agents that share one backend, workspace and check runner
pub struct LlmRoleFactory {
    backend: Arc<dyn InferenceBackend>,
    workspace: Arc<Workspace>,
    checks: Arc<CheckRunner>,
    options: AgentOptions,
}

impl LlmRoleFactory {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        workspace: Workspace,
        checks: CheckRunner,
        options: AgentOptions,
    ) -> Self {
        Self {
            backend,
            workspace: Arc::new(workspace),
            checks: Arc::new(checks),
            options,
        }
    }

    pub fn from_settings(backend: Arc<dyn InferenceBackend>, settings: &Settings) -> Self {
        Self::new(
            backend,
            Workspace::new(&settings.project_dir),
            CheckRunner::from_settings(settings),
            AgentOptions::from_settings(settings),
        )
    }
}

impl RoleFactory for LlmRoleFactory {
    fn spawn(&self, role: AgentRole) -> Box<dyn RoleAgent> {
        Box::new(LlmRoleAgent {
            agent: Agent::new(role, self.backend.clone(), self.options),
            workspace: self.workspace.clone(),
            checks: self.checks.clone(),
        })
    }
}

struct LlmRoleAgent {
    agent: Agent,
    workspace: Arc<Workspace>,
    checks: Arc<CheckRunner>,
}

#[async_trait]
impl RoleAgent for LlmRoleAgent {
    fn role(&self) -> AgentRole {
        self.agent.role()
    }

    async fn perform(
        &mut self,
        task: Task,
        context: &RoleContext,
    ) -> Result<TaskOutput, AgentError> {
        match task {
            Task::Implement => {
                implementer::implement(&mut self.agent, &self.workspace, context)
                    .await
                    .map(TaskOutput::Implemented)
            }
            Task::Verify { files_changed } => verifier::verify(
                &mut self.agent,
                &self.workspace,
                &self.checks,
                &context.story,
                &files_changed,
            )
            .await
            .map(TaskOutput::Verified),
            Task::Advise => advisor::advise(&mut self.agent, context)
                .await
                .map(TaskOutput::Advised),
        }
    }
}
