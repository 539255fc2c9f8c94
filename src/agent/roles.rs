// Agent roles, task contracts and the shared role context
//
// One agent type serves every role. A role picks the persona (system message)
// and the task contract the agent fulfils: Implement, Verify or Advise.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::advisor::Advice;
use super::implementer::ImplementationResult;
use super::verifier::VerificationResult;
use super::AgentError;
use crate::backlog::Story;

/// Pipeline participants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Product manager: clarifies requirements before any code is written
    Requirements,
    Architect,
    /// Developer: writes the code
    Implementer,
    /// QA tester: checks the code against acceptance criteria
    Verifier,
    ComplianceReviewer,
    ReleaseCoordinator,
}

/// What a role is asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Implement,
    Verify,
    Advise,
}

impl AgentRole {
    pub fn name(&self) -> &'static str {
        match self {
            AgentRole::Requirements => "Product Manager",
            AgentRole::Architect => "Architect",
            AgentRole::Implementer => "Developer",
            AgentRole::Verifier => "QA Tester",
            AgentRole::ComplianceReviewer => "Compliance Reviewer",
            AgentRole::ReleaseCoordinator => "Release Coordinator",
        }
    }

    pub fn task_kind(&self) -> TaskKind {
        match self {
            AgentRole::Implementer => TaskKind::Implement,
            AgentRole::Verifier => TaskKind::Verify,
            _ => TaskKind::Advise,
        }
    }

    /// System message for this role
    pub fn persona(&self) -> &'static str {
        match self {
            AgentRole::Requirements => REQUIREMENTS_PERSONA,
            AgentRole::Architect => ARCHITECT_PERSONA,
            AgentRole::Implementer => IMPLEMENTER_PERSONA,
            AgentRole::Verifier => VERIFIER_PERSONA,
            AgentRole::ComplianceReviewer => COMPLIANCE_PERSONA,
            AgentRole::ReleaseCoordinator => RELEASE_PERSONA,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const REQUIREMENTS_PERSONA: &str = "You are a Product Manager reviewing a user story before \
development starts. Restate the requirement in concrete terms, list the behaviours the \
acceptance criteria imply, and call out anything ambiguous. Be brief and specific.";

const ARCHITECT_PERSONA: &str = "You are a Software Architect. For the given user story, \
describe which files and modules should hold the change, the main functions or types to add, \
and how they fit existing code. Prefer the simplest design that satisfies the criteria.";

const IMPLEMENTER_PERSONA: &str = "You are a Software Developer implementing code for user \
stories. Follow the existing code style and patterns, include type hints, handle errors \
appropriately, and only implement what the acceptance criteria require. When asked for a \
file, output only its complete contents.";

const VERIFIER_PERSONA: &str = "You are a QA Tester verifying software implementations. \
Focus on the acceptance criteria as written and check functional correctness, not style \
preferences. Give a clear PASS or FAIL verdict with specific evidence from the code.";

const COMPLIANCE_PERSONA: &str = "You are a Compliance Reviewer. Review the implemented \
change for security issues, handling of personal data, licensing concerns and audit \
requirements. List concrete findings, or state that none were found.";

const RELEASE_PERSONA: &str = "You are a Release Coordinator. Summarize the change for \
release notes, and list migration steps, configuration changes and rollback considerations.";

/// Input to a role for one task
#[derive(Debug, Clone)]
pub enum Task {
    Implement,
    Verify { files_changed: Vec<PathBuf> },
    Advise,
}

/// Output of a completed task
#[derive(Debug, Clone)]
pub enum TaskOutput {
    Implemented(ImplementationResult),
    Verified(VerificationResult),
    Advised(Advice),
}

/// Context threaded through a role sequence. Each role reads what earlier
/// roles left here and adds its own output.
#[derive(Debug, Clone)]
pub struct RoleContext {
    pub story: Story,
    pub project_name: String,
    pub project_description: Option<String>,
    /// Files written by stories that already passed, oldest first
    pub completed_files: Vec<PathBuf>,
    pub notes: Vec<Advice>,
    pub implementation: Option<ImplementationResult>,
    pub verification: Option<VerificationResult>,
}

impl RoleContext {
    pub fn new(story: Story) -> Self {
        Self {
            story,
            project_name: String::new(),
            project_description: None,
            completed_files: Vec::new(),
            notes: Vec::new(),
            implementation: None,
            verification: None,
        }
    }

    pub fn with_project(mut self, name: impl Into<String>, description: Option<String>) -> Self {
        self.project_name = name.into();
        self.project_description = description;
        self
    }

    pub fn with_completed_files(mut self, files: Vec<PathBuf>) -> Self {
        self.completed_files = files;
        self
    }

    /// The story formatted for a prompt
    pub fn story_prompt(&self) -> String {
        let story = &self.story;
        let criteria: Vec<String> = story
            .acceptance_criteria
            .iter()
            .map(|c| format!("- {}", c))
            .collect();
        let mut out = format!(
            "User Story: {} - {}\n\nDescription: {}\n\nAcceptance Criteria:\n{}",
            story.id,
            story.title,
            story.description,
            criteria.join("\n")
        );
        if let Some(notes) = story.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            out.push_str(&format!("\n\nNotes: {}", notes));
        }
        out
    }

    /// Advice from earlier roles and reasons earlier attempts failed, for a prompt
    pub fn guidance(&self) -> String {
        let mut sections = Vec::new();

        if !self.project_name.is_empty() {
            let mut project = format!("Project: {}", self.project_name);
            if let Some(desc) = &self.project_description {
                project.push_str(&format!(" - {}", desc));
            }
            sections.push(project);
        }

        for advice in &self.notes {
            sections.push(format!("{} notes:\n{}", advice.role, advice.notes.trim()));
        }

        if !self.story.failure_reasons.is_empty() {
            let reasons: Vec<String> = self
                .story
                .failure_reasons
                .iter()
                .map(|r| format!("- {}", r))
                .collect();
            sections.push(format!(
                "Previous attempts failed:\n{}\nAvoid repeating these problems.",
                reasons.join("\n")
            ));
        }

        sections.join("\n\n")
    }
}

/// A role-scoped agent able to perform its task contract
#[async_trait]
pub trait RoleAgent: Send {
    fn role(&self) -> AgentRole;

    async fn perform(
        &mut self,
        task: Task,
        context: &RoleContext,
    ) -> Result<TaskOutput, AgentError>;
}

/// Creates fresh agents. Called once per role per attempt, so no conversation
/// state leaks between attempts.
pub trait RoleFactory: Send + Sync {
    fn spawn(&self, role: AgentRole) -> Box<dyn RoleAgent>;
}
