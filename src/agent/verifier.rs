// Verify contract - judge changed files against acceptance criteria
//
// Each criterion is put to the QA agent on its own together with the changed
// files; configured checks then run against the same files. The verifier reads
// the workspace and never writes to it.

use std::fmt;
use std::path::PathBuf;

use super::checks::{CheckResult, CheckRunner};
use super::{Agent, AgentError};
use crate::backlog::Story;
use crate::workspace::Workspace;

/// Criteria the external checks answer, so the model is not asked about them
const CHECK_ANSWERED_CRITERIA: &[&str] = &["typecheck passes"];

const NAMED_FILE_SUFFIXES: &[&str] = &[".py", ".js", ".ts", ".json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriterionStatus {
    Pass,
    Fail,
    /// Not verifiable from the files at hand
    Skip,
    Error,
}

impl fmt::Display for CriterionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CriterionStatus::Pass => "PASS",
            CriterionStatus::Fail => "FAIL",
            CriterionStatus::Skip => "SKIP",
            CriterionStatus::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriterionResult {
    pub criterion: String,
    pub status: CriterionStatus,
    pub details: String,
    pub evidence: String,
}

impl CriterionResult {
    fn ok(&self) -> bool {
        matches!(self.status, CriterionStatus::Pass | CriterionStatus::Skip)
    }
}

/// The verdict for one story attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub passed: bool,
    pub criteria: Vec<CriterionResult>,
    pub checks: Vec<CheckResult>,
    /// One line naming what failed, recorded as the failure reason
    pub summary: String,
}

impl VerificationResult {
    pub fn from_parts(criteria: Vec<CriterionResult>, checks: Vec<CheckResult>) -> Self {
        let passed = criteria.iter().all(CriterionResult::ok) && checks.iter().all(CheckResult::ok);
        let summary = summarize(&criteria, &checks);
        Self {
            passed,
            criteria,
            checks,
            summary,
        }
    }
}

fn summarize(criteria: &[CriterionResult], checks: &[CheckResult]) -> String {
    let passed = criteria.iter().filter(|c| c.ok()).count();
    let failed: Vec<&CriterionResult> = criteria.iter().filter(|c| !c.ok()).collect();

    let mut summary = format!(
        "Acceptance criteria: {} passed, {} failed",
        passed,
        failed.len()
    );
    if !failed.is_empty() {
        let items: Vec<String> = failed
            .iter()
            .map(|c| {
                if c.details.is_empty() {
                    format!("{} [{}]", c.criterion, c.status)
                } else {
                    format!("{}: {}", c.criterion, c.details)
                }
            })
            .collect();
        summary.push_str(&format!(" ({})", items.join("; ")));
    }

    if !checks.is_empty() {
        let items: Vec<String> = checks.iter().map(CheckResult::describe).collect();
        summary.push_str(&format!(". Checks: {}", items.join(", ")));
    }
    summary
}

/// Parse a `STATUS / DETAILS / EVIDENCE` reply. Anything but a recognised
/// status counts as a failure.
pub fn parse_criterion_response(criterion: &str, response: &str) -> CriterionResult {
    let mut result = CriterionResult {
        criterion: criterion.to_string(),
        status: CriterionStatus::Fail,
        details: String::new(),
        evidence: String::new(),
    };

    for line in response.lines() {
        let line = line.trim().trim_start_matches(['-', '*', ' ']);
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().trim_matches('*').to_uppercase().as_str() {
            "STATUS" => {
                let word = value
                    .trim_matches(|c: char| !c.is_ascii_alphabetic())
                    .to_uppercase();
                result.status = match word.as_str() {
                    "PASS" | "PASSED" => CriterionStatus::Pass,
                    "SKIP" | "SKIPPED" => CriterionStatus::Skip,
                    "ERROR" => CriterionStatus::Error,
                    _ => CriterionStatus::Fail,
                };
            }
            "DETAILS" => result.details = value.to_string(),
            "EVIDENCE" => result.evidence = value.to_string(),
            _ => {}
        }
    }
    result
}

/// File paths mentioned in the criteria text
pub fn files_named_in(criteria: &[String]) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for criterion in criteria {
        for word in criterion.split_whitespace() {
            let word = word
                .trim_start_matches(|c: char| matches!(c, '`' | '\'' | '"' | '('))
                .trim_end_matches(|c: char| matches!(c, '`' | '\'' | '"' | ')' | ',' | '.' | ':'));
            let looks_like_file = word.contains('/')
                || NAMED_FILE_SUFFIXES.iter().any(|s| word.ends_with(s));
            if looks_like_file && !word.contains("://") && !files.iter().any(|f| f == word) {
                files.push(word.to_string());
            }
        }
    }
    files
}

/// Existing files for a named path. A name with `*` is a glob, listed from
/// the directory before its first wildcard component.
fn expand_named(workspace: &Workspace, named: &str) -> Vec<PathBuf> {
    if !named.contains('*') {
        let path = PathBuf::from(named);
        return if workspace.exists(&path) { vec![path] } else { Vec::new() };
    }

    let components: Vec<&str> = named.split('/').collect();
    let split = components
        .iter()
        .position(|c| c.contains('*'))
        .unwrap_or(0);
    let dir = components[..split].join("/");
    let pattern = components[split..].join("/");
    let dir = if dir.is_empty() { ".".to_string() } else { dir };

    match workspace.list(&dir, &pattern) {
        Ok(files) => files,
        Err(e) => {
            tracing::debug!("Ignoring file pattern '{}': {}", named, e);
            Vec::new()
        }
    }
}

fn answered_by_checks(criterion: &str) -> bool {
    let lower = criterion.trim().trim_end_matches('.').to_lowercase();
    CHECK_ANSWERED_CRITERIA.iter().any(|c| lower == *c)
}

/// Verify `story` against the files the implementer changed
pub async fn verify(
    agent: &mut Agent,
    workspace: &Workspace,
    runner: &CheckRunner,
    story: &Story,
    files_changed: &[PathBuf],
) -> Result<VerificationResult, AgentError> {
    let mut paths: Vec<PathBuf> = files_changed.to_vec();
    for named in files_named_in(&story.acceptance_criteria) {
        for path in expand_named(workspace, &named) {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }

    let mut files_block = String::new();
    for path in &paths {
        let read = workspace.read(path)?;
        if let Some(warning) = &read.warning {
            tracing::debug!("{}", warning);
        }
        files_block.push_str(&format!("\n--- {} ---\n{}\n", path.display(), read.content));
    }
    if files_block.is_empty() {
        files_block.push_str("(no files)");
    }

    let mut criteria = Vec::with_capacity(story.acceptance_criteria.len());
    for criterion in &story.acceptance_criteria {
        if answered_by_checks(criterion) {
            criteria.push(CriterionResult {
                criterion: criterion.clone(),
                status: CriterionStatus::Skip,
                details: "answered by external checks".to_string(),
                evidence: String::new(),
            });
            continue;
        }

        // Each criterion is judged on its own
        agent.reset();
        let prompt = format!(
            "Verify if this acceptance criterion is met:\n\n\
             CRITERION: {}\n\nFILES TO CHECK:\n{}\n\n\
             Respond in this exact format:\n\
             STATUS: [PASS/FAIL/SKIP]\n\
             DETAILS: [one line explanation]\n\
             EVIDENCE: [specific code or feature that satisfies/violates the criterion]\n\n\
             Use SKIP only if the criterion cannot be verified from the provided files.",
            criterion, files_block
        );
        let result = parse_criterion_response(criterion, &agent.chat(prompt).await?);
        tracing::debug!("{} criterion '{}': {}", story.id, criterion, result.status);
        criteria.push(result);
    }

    let checks = runner.run_all(&paths).await;
    let verification = VerificationResult::from_parts(criteria, checks);
    tracing::info!(
        "{} verification {}: {}",
        story.id,
        if verification.passed { "passed" } else { "failed" },
        verification.summary
    );
    Ok(verification)
}

#[cfg(test)]
mod tests {
    use super::super::checks::CheckOutcome;
    use super::super::testing::ScriptedBackend;
    use super::super::{AgentOptions, AgentRole};
    use super::*;
    use std::fs;

    // ── parsing ────────────────────────────────────────────────────────────────

    #[test]
    fn test_parse_criterion_pass() {
        let r = parse_criterion_response(
            "add works",
            "STATUS: PASS\nDETAILS: add() returns the sum\nEVIDENCE: return a + b",
        );
        assert_eq!(r.status, CriterionStatus::Pass);
        assert_eq!(r.details, "add() returns the sum");
        assert_eq!(r.evidence, "return a + b");
    }

    #[test]
    fn test_parse_criterion_tolerates_brackets_and_case() {
        let r = parse_criterion_response("x", "**Status**: [skip]");
        assert_eq!(r.status, CriterionStatus::Skip);
    }

    #[test]
    fn test_parse_criterion_unknown_is_fail() {
        assert_eq!(
            parse_criterion_response("x", "STATUS: MAYBE").status,
            CriterionStatus::Fail
        );
        assert_eq!(
            parse_criterion_response("x", "Looks fine to me").status,
            CriterionStatus::Fail
        );
    }

    #[test]
    fn test_files_named_in() {
        let criteria = vec![
            "Create `src/calc.py` with add()".to_string(),
            "config.json is valid, see http://example.com".to_string(),
            "Typecheck passes.".to_string(),
        ];
        assert_eq!(files_named_in(&criteria), vec!["src/calc.py", "config.json"]);
    }

    // ── verdict ────────────────────────────────────────────────────────────────

    fn criterion(status: CriterionStatus, details: &str) -> CriterionResult {
        CriterionResult {
            criterion: "add(2, 3) returns 5".into(),
            status,
            details: details.into(),
            evidence: String::new(),
        }
    }

    #[test]
    fn test_skip_counts_as_pass() {
        let v = VerificationResult::from_parts(
            vec![
                criterion(CriterionStatus::Pass, ""),
                criterion(CriterionStatus::Skip, ""),
            ],
            vec![],
        );
        assert!(v.passed);
        assert_eq!(v.summary, "Acceptance criteria: 2 passed, 0 failed");
    }

    #[test]
    fn test_summary_names_failures() {
        let v = VerificationResult::from_parts(
            vec![criterion(CriterionStatus::Fail, "returns 6")],
            vec![CheckResult {
                name: "typecheck".into(),
                blocking: true,
                outcome: CheckOutcome::Passed,
            }],
        );
        assert!(!v.passed);
        assert_eq!(
            v.summary,
            "Acceptance criteria: 0 passed, 1 failed (add(2, 3) returns 5: returns 6). \
             Checks: typecheck passed"
        );
    }

    #[test]
    fn test_blocking_check_failure_fails_verdict() {
        let v = VerificationResult::from_parts(
            vec![criterion(CriterionStatus::Pass, "")],
            vec![CheckResult {
                name: "typecheck".into(),
                blocking: true,
                outcome: CheckOutcome::Failed {
                    output: "calc.py:1: error: Missing return".into(),
                },
            }],
        );
        assert!(!v.passed);
        assert!(v.summary.contains("typecheck failed: calc.py:1: error"));
    }

    // ── verify ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_verify_asks_per_criterion_and_skips_typecheck() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        fs::write(dir.path().join("calc.py"), "def add(a, b):\n    return a + b\n").unwrap();

        let story = Story::new("US-001", "Add").with_criteria([
            "add(2, 3) returns 5",
            "Typecheck passes",
        ]);
        let backend = ScriptedBackend::texts(["STATUS: PASS\nDETAILS: ok\nEVIDENCE: a + b"]);
        let mut agent = Agent::new(AgentRole::Verifier, backend.clone(), AgentOptions::default());
        let runner = CheckRunner::disabled(dir.path());

        let v = verify(&mut agent, &ws, &runner, &story, &[PathBuf::from("calc.py")])
            .await
            .unwrap();

        assert!(v.passed);
        assert_eq!(backend.request_count(), 1);
        assert_eq!(v.criteria[1].status, CriterionStatus::Skip);
        let prompt = &backend.requests.lock().unwrap()[0][1].content;
        assert!(prompt.contains("--- calc.py ---"));
        assert!(prompt.contains("return a + b"));
    }

    #[test]
    fn test_expand_named_lists_globs() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        fs::create_dir_all(dir.path().join("tests")).unwrap();
        fs::write(dir.path().join("tests/test_a.py"), "").unwrap();
        fs::write(dir.path().join("tests/test_b.py"), "").unwrap();
        fs::write(dir.path().join("tests/notes.md"), "").unwrap();
        fs::write(dir.path().join("calc.py"), "").unwrap();

        assert_eq!(
            expand_named(&ws, "tests/*.py"),
            vec![PathBuf::from("tests/test_a.py"), PathBuf::from("tests/test_b.py")]
        );
        assert_eq!(expand_named(&ws, "*.py"), vec![PathBuf::from("calc.py")]);
        assert_eq!(expand_named(&ws, "calc.py"), vec![PathBuf::from("calc.py")]);
        assert!(expand_named(&ws, "missing.py").is_empty());
        assert!(expand_named(&ws, "../*.py").is_empty());
    }

    #[tokio::test]
    async fn test_verify_reads_files_matched_by_criteria_globs() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        fs::create_dir_all(dir.path().join("tests")).unwrap();
        fs::write(dir.path().join("tests/test_calc.py"), "assert add(1, 1) == 2\n").unwrap();
        fs::write(dir.path().join("calc.py"), "def add(a, b):\n    return a + b\n").unwrap();

        let story = Story::new("US-001", "Add").with_criteria(["tests/*.py cover add()"]);
        let backend = ScriptedBackend::texts(["STATUS: PASS\nDETAILS: covered"]);
        let mut agent = Agent::new(AgentRole::Verifier, backend.clone(), AgentOptions::default());

        verify(
            &mut agent,
            &ws,
            &CheckRunner::disabled(dir.path()),
            &story,
            &[PathBuf::from("calc.py")],
        )
        .await
        .unwrap();

        let prompt = &backend.requests.lock().unwrap()[0][1].content;
        assert!(prompt.contains("--- calc.py ---"));
        assert!(prompt.contains("--- tests/test_calc.py ---"));
        assert!(prompt.contains("assert add(1, 1) == 2"));
    }

    #[tokio::test]
    async fn test_verify_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        fs::write(dir.path().join("calc.py"), "x = 1\n").unwrap();
        let story = Story::new("US-001", "Add").with_criteria(["x is 2"]);
        let backend = ScriptedBackend::texts(["STATUS: FAIL\nDETAILS: x is 1"]);
        let mut agent = Agent::new(AgentRole::Verifier, backend, AgentOptions::default());

        let v = verify(
            &mut agent,
            &ws,
            &CheckRunner::disabled(dir.path()),
            &story,
            &[PathBuf::from("calc.py")],
        )
        .await
        .unwrap();

        assert!(!v.passed);
        assert!(v.summary.contains("x is 2: x is 1"));
        assert_eq!(fs::read_to_string(dir.path().join("calc.py")).unwrap(), "x = 1\n");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
