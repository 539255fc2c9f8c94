// End-to-end build over a mock OpenAI-compatible endpoint
//
// Real client, agents, workspace and git committer; only the HTTP endpoint is
// faked. Replies are routed by the persona in the request body.

use mockito::Matcher;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mat::agent::{AgentOptions, CheckRunner, LlmRoleFactory};
use mat::backlog::{Backlog, BacklogStore, JsonBacklogStore, Story, StoryStatus};
use mat::build::{BuildLoop, RunOutcome};
use mat::git::GitCommitter;
use mat::llm::{InferenceClient, RetryPolicy};
use mat::workspace::Workspace;

const PLAN: &str = "FILES_TO_CREATE: greet.py\nFILES_TO_MODIFY: None\nAPPROACH: print the greeting";

fn chat_body(content: &str) -> String {
    serde_json::json!({
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })
    .to_string()
}

fn sse(deltas: &[&str]) -> String {
    let mut body = String::new();
    for d in deltas {
        let chunk = serde_json::json!({"choices": [{"index": 0, "delta": {"content": d}}]});
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn write_backlog(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("prd.json");
    let story = Story::new("US-001", "Fix typo in greeting")
        .with_description("The greeting has a typo")
        .with_criteria(["greet.py prints hello"]);
    JsonBacklogStore::new(&path)
        .save(&Backlog::new("greeter", vec![story]))
        .unwrap();
    path
}

fn build_for(server_url: &str, dir: &Path, prd: &Path, stream: bool) -> BuildLoop {
    let client = InferenceClient::new(
        server_url,
        "codellama",
        Duration::from_secs(5),
        RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(5)),
    )
    .unwrap();
    let options = AgentOptions {
        stream,
        ..AgentOptions::default()
    };
    let factory = LlmRoleFactory::new(
        Arc::new(client),
        Workspace::new(dir),
        CheckRunner::disabled(dir),
        options,
    );
    BuildLoop::new(
        Arc::new(JsonBacklogStore::new(prd)),
        Arc::new(factory),
        Arc::new(GitCommitter::new(dir)),
        3,
    )
}

#[tokio::test]
async fn test_build_writes_planned_file_and_passes() {
    let dir = tempfile::tempdir().unwrap();
    let prd = write_backlog(dir.path());

    let mut server = mockito::Server::new_async().await;
    // The developer's plan doubles as the generated file content
    let developer = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::Regex("Software Developer".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(chat_body(PLAN))
        .expect(2)
        .create_async()
        .await;
    let qa = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::Regex("QA Tester".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(chat_body("STATUS: PASS\nDETAILS: prints hello\nEVIDENCE: print()"))
        .expect(1)
        .create_async()
        .await;

    let report = build_for(&server.url(), dir.path(), &prd, false)
        .run()
        .await
        .unwrap();

    developer.assert_async().await;
    qa.assert_async().await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.attempts, 1);
    // Temp dir is not a repository
    assert_eq!(report.commits, 0);

    let written = fs::read_to_string(dir.path().join("greet.py")).unwrap();
    assert_eq!(written, format!("{}\n", PLAN));

    let story = &JsonBacklogStore::new(&prd).load().unwrap().stories[0];
    assert_eq!(story.status, StoryStatus::Passed);
    assert_eq!(story.attempt_count, 1);
}

#[tokio::test]
async fn test_streamed_build_rejection_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let prd = write_backlog(dir.path());

    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("Software Developer".into()),
            Matcher::Regex(r#""stream":true"#.into()),
        ]))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse(&["FILES_TO_CREATE: greet.py\n", "FILES_TO_MODIFY: None\n", "APPROACH: x"]))
        .create_async()
        .await;
    server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::Regex("QA Tester".into()))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse(&["STATUS: FAIL\n", "DETAILS: prints nothing"]))
        .create_async()
        .await;

    let report = build_for(&server.url(), dir.path(), &prd, true)
        .run()
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::StalledOut);
    let story = &JsonBacklogStore::new(&prd).load().unwrap().stories[0];
    assert_eq!(story.status, StoryStatus::Failed);
    assert_eq!(story.attempt_count, 3);
    assert_eq!(story.failure_reasons.len(), 3);
    assert!(story.failure_reasons[0]
        .contains("Verification failed: Acceptance criteria: 0 passed, 1 failed"));
    assert!(story.failure_reasons[0].contains("prints nothing"));
}

#[tokio::test]
async fn test_missing_model_fails_attempts_with_available_list() {
    let dir = tempfile::tempdir().unwrap();
    let prd = write_backlog(dir.path());

    let mut server = mockito::Server::new_async().await;
    let chat = server
        .mock("POST", "/v1/chat/completions")
        .with_status(404)
        .with_body(r#"{"error":"model not found"}"#)
        // Not retried: one request per story attempt
        .expect(3)
        .create_async()
        .await;
    server
        .mock("GET", "/v1/models")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"object":"list","data":[{"id":"llama3"}]}"#)
        .create_async()
        .await;

    let report = build_for(&server.url(), dir.path(), &prd, false)
        .run()
        .await
        .unwrap();

    chat.assert_async().await;
    assert_eq!(report.outcome, RunOutcome::StalledOut);
    let story = &JsonBacklogStore::new(&prd).load().unwrap().stories[0];
    assert!(story.failure_reasons[0].starts_with("Implementation failed: "));
    assert!(story.failure_reasons[0].contains("model 'codellama' not found"));
    assert!(story.failure_reasons[0].contains("llama3"));
}
