// Advise contract - notes from non-coding roles

use super::roles::{AgentRole, RoleContext};
use super::{Agent, AgentError};

/// Notes one role contributes to the shared context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advice {
    pub role: AgentRole,
    pub notes: String,
}

/// Ask the agent's role for its notes on the story.
///
/// Roles that run after verification (compliance, release) also see what was
/// implemented.
pub async fn advise(agent: &mut Agent, context: &RoleContext) -> Result<Advice, AgentError> {
    let role = agent.role();
    let mut prompt = format!(
        "Review this user story from your perspective as {}:\n\n{}",
        role,
        context.story_prompt()
    );

    let guidance = context.guidance();
    if !guidance.is_empty() {
        prompt.push_str(&format!("\n\n{}", guidance));
    }

    if let Some(implementation) = &context.implementation {
        let files: Vec<String> = implementation
            .files_changed
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        prompt.push_str(&format!("\n\nFiles changed: {}", files.join(", ")));
    }
    if let Some(verification) = &context.verification {
        prompt.push_str(&format!("\n\nVerification: {}", verification.summary));
    }

    prompt.push_str("\n\nRespond with short, concrete notes for the rest of the team.");

    let notes = agent.chat(prompt).await?;
    tracing::debug!("{} notes for {}: {} chars", role, context.story.id, notes.len());

    Ok(Advice {
        role,
        notes: notes.trim().to_string(),
    })
}
