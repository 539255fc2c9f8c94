// Implement contract - plan, gather context, write files
//
// The developer agent first asks for a plan (files to create, files to modify,
// approach), reads the files it is about to modify plus a few related ones,
// then generates each planned file in turn. Only planned files are written.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::roles::{AgentRole, RoleContext};
use super::{strip_markdown_fences, Agent, AgentError};
use crate::config::constants::MAX_RELATED_FILES;
use crate::workspace::Workspace;

/// Related files are clipped to this many characters in prompts
const MAX_CONTEXT_FILE_CHARS: usize = 4000;

/// Extensions scanned for related files when the plan names none
const DEFAULT_SOURCE_EXTENSIONS: &[&str] = &["py"];

/// The developer's plan for a story
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImplementationPlan {
    pub files_to_create: Vec<String>,
    pub files_to_modify: Vec<String>,
    pub approach: String,
}

impl ImplementationPlan {
    pub fn is_empty(&self) -> bool {
        self.files_to_create.is_empty() && self.files_to_modify.is_empty()
    }
}

/// What the implementer did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImplementationResult {
    /// Written files, relative to the project root, in write order
    pub files_changed: Vec<PathBuf>,
    pub approach: String,
}

/// Parse a `FILES_TO_CREATE / FILES_TO_MODIFY / APPROACH` reply
pub fn parse_plan(response: &str) -> ImplementationPlan {
    let mut plan = ImplementationPlan::default();

    for line in response.lines() {
        let line = line.trim().trim_start_matches(['-', '*', ' ']);
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().trim_matches('*').to_uppercase();
        match key.as_str() {
            "FILES_TO_CREATE" => plan.files_to_create = parse_file_list(value),
            "FILES_TO_MODIFY" => plan.files_to_modify = parse_file_list(value),
            "APPROACH" => plan.approach = value.trim().to_string(),
            _ => {}
        }
    }

    // A file listed under both is a modification
    plan.files_to_create
        .retain(|f| !plan.files_to_modify.contains(f));
    plan
}

fn parse_file_list(value: &str) -> Vec<String> {
    let value = value.trim().trim_start_matches('[').trim_end_matches(']');
    if value.trim().eq_ignore_ascii_case("none") {
        return Vec::new();
    }

    let mut files: Vec<String> = Vec::new();
    for item in value.split(',') {
        let item = item.trim().trim_matches(|c: char| matches!(c, '`' | '\'' | '"'));
        if item.is_empty() || item.eq_ignore_ascii_case("none") {
            continue;
        }
        if !files.iter().any(|f| f == item) {
            files.push(item.to_string());
        }
    }
    files
}

/// Implement the story in `context` and return the written files
pub async fn implement(
    agent: &mut Agent,
    workspace: &Workspace,
    context: &RoleContext,
) -> Result<ImplementationResult, AgentError> {
    let story_prompt = context.story_prompt();
    let guidance = context.guidance();

    // 1. Plan
    let mut plan_prompt = format!(
        "Analyze this user story and determine what needs to be implemented:\n\n{}",
        story_prompt
    );
    if !guidance.is_empty() {
        plan_prompt.push_str(&format!("\n\n{}", guidance));
    }
    if !context.completed_files.is_empty() {
        let files: Vec<String> = context
            .completed_files
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        plan_prompt.push_str(&format!(
            "\n\nFiles written by earlier stories: {}",
            files.join(", ")
        ));
    }
    plan_prompt.push_str(
        "\n\nRespond in this exact format:\n\
         FILES_TO_CREATE: [comma-separated list of file paths, or 'None']\n\
         FILES_TO_MODIFY: [comma-separated list of file paths, or 'None']\n\
         APPROACH: [1-2 sentences describing the implementation approach]",
    );

    let plan = parse_plan(&agent.chat(plan_prompt).await?);
    if plan.is_empty() {
        return Err(AgentError::Contract {
            role: AgentRole::Implementer,
            reason: "plan named no files to create or modify".to_string(),
        });
    }
    tracing::info!(
        "{} plan: create {:?}, modify {:?}",
        context.story.id,
        plan.files_to_create,
        plan.files_to_modify
    );

    // 2. Context
    let mut existing: BTreeMap<String, String> = BTreeMap::new();
    for path in &plan.files_to_modify {
        existing.insert(path.clone(), workspace.read(path)?.content);
    }
    let related = related_files(workspace, context, &plan)?;
    let context_block = format_context(&related);

    // 3. Generate and write
    let mut files_changed = Vec::new();

    for path in &plan.files_to_create {
        let prompt = format!(
            "Generate the code for file '{}' to implement this user story:\n\n{}\n\n\
             Approach: {}\n\nExisting code context:\n{}\n\n\
             Output ONLY the code, no explanations. Start with the first line of code.",
            path, story_prompt, plan.approach, context_block
        );
        let code = strip_markdown_fences(&agent.chat(prompt).await?);
        files_changed.push(write_generated(workspace, path, &code)?);
    }

    for path in &plan.files_to_modify {
        let current = existing.get(path).map(String::as_str).unwrap_or_default();
        let prompt = format!(
            "Modify the file '{}' to implement this user story:\n\n{}\n\n\
             Approach: {}\n\nCurrent file content:\n```\n{}\n```\n\n\
             Other code context:\n{}\n\n\
             Preserve existing functionality unless it conflicts. \
             Output ONLY the complete modified file, no explanations.",
            path, story_prompt, plan.approach, current, context_block
        );
        let code = strip_markdown_fences(&agent.chat(prompt).await?);
        files_changed.push(write_generated(workspace, path, &code)?);
    }

    Ok(ImplementationResult {
        files_changed,
        approach: plan.approach,
    })
}

fn write_generated(workspace: &Workspace, path: &str, code: &str) -> Result<PathBuf, AgentError> {
    if code.trim().is_empty() {
        return Err(AgentError::Contract {
            role: AgentRole::Implementer,
            reason: format!("generated no code for {}", path),
        });
    }
    let mut content = code.to_string();
    if !content.ends_with('\n') {
        content.push('\n');
    }
    let written = workspace.write(path, &content)?;
    Ok(workspace.relative(&written))
}

/// Up to `MAX_RELATED_FILES` readable files for context: files from earlier
/// stories first, then other sources with the plan's extensions
fn related_files(
    workspace: &Workspace,
    context: &RoleContext,
    plan: &ImplementationPlan,
) -> Result<Vec<(PathBuf, String)>, AgentError> {
    let planned: Vec<PathBuf> = plan
        .files_to_create
        .iter()
        .chain(&plan.files_to_modify)
        .map(PathBuf::from)
        .collect();

    let mut extensions: Vec<String> = planned
        .iter()
        .filter_map(|p| p.extension().and_then(|e| e.to_str()).map(str::to_string))
        .collect();
    extensions.sort();
    extensions.dedup();
    let ext_refs: Vec<&str> = if extensions.is_empty() {
        DEFAULT_SOURCE_EXTENSIONS.to_vec()
    } else {
        extensions.iter().map(String::as_str).collect()
    };

    let candidates = context
        .completed_files
        .iter()
        .rev()
        .cloned()
        .chain(workspace.source_files(&ext_refs, MAX_RELATED_FILES * 4));

    let mut related: Vec<(PathBuf, String)> = Vec::new();
    for path in candidates {
        if related.len() >= MAX_RELATED_FILES {
            break;
        }
        if planned.iter().any(|p| same_file(p, &path)) || related.iter().any(|(p, _)| p == &path)
        {
            continue;
        }
        let read = workspace.read(&path)?;
        if !read.is_empty() {
            related.push((path, clip(&read.content)));
        }
    }
    Ok(related)
}

fn same_file(a: &Path, b: &Path) -> bool {
    a.components().eq(b.components())
}

fn clip(content: &str) -> String {
    if content.len() <= MAX_CONTEXT_FILE_CHARS {
        return content.to_string();
    }
    let mut end = MAX_CONTEXT_FILE_CHARS;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... (truncated)", &content[..end])
}

fn format_context(files: &[(PathBuf, String)]) -> String {
    if files.is_empty() {
        return "No context files loaded.".to_string();
    }
    files
        .iter()
        .map(|(path, content)| format!("--- {} ---\n{}", path.display(), content))
        .collect::<Vec<_>>()
        .join("\n\n")
}
