//! End-to-end tests for shellpilot sessions.
//!
//! These drive a full session from operator directive to transcript: the
//! HTTP gateway against a scripted backend, normalization, approval and the
//! shell executor, plus the tool protocol server over in-memory pipes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use shellpilot_agent::{CallTemplate, Outcome, ReplSession, ScriptedApprover};
use shellpilot_config::{AppConfig, ApprovalMode, ExtraBackend};
use shellpilot_core::context::EntryKind;
use shellpilot_mcp::ToolServer;
use shellpilot_providers::HttpGateway;
use shellpilot_tools::ShellExecutor;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

// ── Scripted backend ────────────────────────────────────────────────────────

/// Request bodies seen by the backend, in arrival order.
type Seen = Arc<Mutex<Vec<Value>>>;

/// First call proposes `echo e2e`; every later call finishes.
async fn responses(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
    let turn = {
        let mut seen = seen.lock().unwrap();
        seen.push(body);
        seen.len()
    };

    if turn == 1 {
        Json(json!({
            "id": "resp_1",
            "object": "response",
            "status": "completed",
            "output": [
                {"type": "message", "content": [{"type": "output_text", "text": "Running it."}]},
                {"type": "local_shell_call", "call_id": "call_1",
                 "action": {"command": ["echo", "e2e"]}}
            ],
            "metadata": {"local_shell_command_sequence_finished": false}
        }))
    } else {
        Json(json!({
            "id": format!("resp_{turn}"),
            "object": "response",
            "status": "completed",
            "output": [{"type": "message", "content": [{"type": "output_text", "text": "Done."}]}],
            "metadata": {"local_shell_command_sequence_finished": "true"}
        }))
    }
}

async fn broken(State(seen): State<Seen>, Json(body): Json<Value>) -> (StatusCode, &'static str) {
    seen.lock().unwrap().push(body);
    (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded")
}

async fn spawn_backend() -> (String, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/v1/responses", post(responses))
        .route("/broken/responses", post(broken))
        .with_state(seen.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), seen)
}

fn config_for(base: &str, approval: ApprovalMode) -> AppConfig {
    let mut config = AppConfig::default();
    config.provider.extra_backends.push(ExtraBackend {
        name: "scripted".into(),
        url_prefix: base.to_string(),
        api_key_env: Some("E2E_API_KEY".into()),
    });
    config.session.approval = approval;
    config.shell.shell = "/bin/sh".into();
    config
}

fn session(config: &AppConfig, endpoint: String, approver: Arc<ScriptedApprover>) -> ReplSession {
    let gateway = HttpGateway::from_config(config)
        .unwrap()
        .with_credentials(|var| (var == "E2E_API_KEY").then(|| "sk-e2e".to_string()));
    let template = CallTemplate::from_config(config, endpoint).unwrap();
    ReplSession::new(
        Arc::new(gateway),
        template,
        ShellExecutor::from_config(&config.shell),
        approver,
    )
    .configured(config)
}

// ── Sessions ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn session_runs_proposed_command_and_finishes() {
    let (base, seen) = spawn_backend().await;
    let config = config_for(&base, ApprovalMode::FullAuto);
    let approver = Arc::new(ScriptedApprover::default());

    let report = session(&config, format!("{base}/v1/responses"), approver.clone())
        .run("print e2e")
        .await;

    assert_eq!(report.outcome, Outcome::Finished);
    assert_eq!(report.iterations, 2);
    assert!(approver.asked().is_empty());

    let kinds: Vec<EntryKind> = report.transcript.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EntryKind::UserMessage,
            EntryKind::AiResponse,
            EntryKind::Command,
            EntryKind::CommandOutput,
            EntryKind::Tokens,
            EntryKind::AiResponse,
        ]
    );
    assert_eq!(report.transcript[1].text, "Running it.");
    assert_eq!(report.transcript[2].text, "echo e2e");
    assert!(report.transcript[3].text.contains("exit 0"));
    assert!(report.transcript[3].text.contains("e2e"));
    assert_eq!(report.transcript[5].text, "Done.");

    let bodies = seen.lock().unwrap().clone();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["input"][0]["content"], "print e2e");
    assert!(bodies[0].get("previous_response_id").is_none());
    assert_eq!(bodies[1]["previous_response_id"], "resp_1");
    let follow_up = bodies[1]["input"][0]["content"].as_str().unwrap();
    assert!(follow_up.starts_with("[User]: print e2e\n[AI]: Running it.\n[Command]: echo e2e\n[Output]: "));
}

#[tokio::test]
async fn declined_command_is_not_executed() {
    let (base, seen) = spawn_backend().await;
    let config = config_for(&base, ApprovalMode::ApproveAll);
    let approver = Arc::new(ScriptedApprover::new(["no"]));

    let report = session(&config, format!("{base}/v1/responses"), approver.clone())
        .run("print e2e")
        .await;

    assert_eq!(report.outcome, Outcome::Finished);
    assert_eq!(approver.asked(), vec!["echo e2e"]);
    assert!(report.transcript.iter().all(|e| e.kind != EntryKind::CommandOutput));
    assert!(
        report
            .transcript
            .iter()
            .any(|e| e.kind == EntryKind::SystemNote && e.text == "Skipped: echo e2e")
    );
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn backend_error_fails_the_session() {
    let (base, seen) = spawn_backend().await;
    let config = config_for(&base, ApprovalMode::FullAuto);

    let report = session(
        &config,
        format!("{base}/broken/responses"),
        Arc::new(ScriptedApprover::default()),
    )
    .run("anything")
    .await;

    match &report.outcome {
        Outcome::Failed(msg) => {
            assert_eq!(msg, "Unexpected response code: 500, body: upstream exploded");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    // transport errors are not retried
    assert_eq!(seen.lock().unwrap().len(), 1);
    let last = report.transcript.last().unwrap();
    assert_eq!(last.kind, EntryKind::SystemNote);
}

#[tokio::test]
async fn missing_credential_fails_before_sending() {
    let (base, seen) = spawn_backend().await;
    let config = config_for(&base, ApprovalMode::FullAuto);
    let gateway = HttpGateway::from_config(&config).unwrap().with_credentials(|_| None);
    let template = CallTemplate::from_config(&config, format!("{base}/v1/responses")).unwrap();

    let report = ReplSession::new(
        Arc::new(gateway),
        template,
        ShellExecutor::from_config(&config.shell),
        Arc::new(ScriptedApprover::default()),
    )
    .run("anything")
    .await;

    assert_eq!(report.outcome, Outcome::Failed("Missing E2E_API_KEY".into()));
    assert!(seen.lock().unwrap().is_empty());
}

// ── Tool protocol ───────────────────────────────────────────────────────────

#[tokio::test]
async fn protocol_server_runs_shell_batches() {
    let config = AppConfig::default();
    let registry = Arc::new(shellpilot_tools::default_registry(&config.shell));

    let (client, server_side) = tokio::io::duplex(65536);
    let server = tokio::spawn(async move {
        let (read, write) = tokio::io::split(server_side);
        ToolServer::new(registry).serve(BufReader::new(read), write).await
    });

    let (read, mut write) = tokio::io::split(client);
    let mut lines = BufReader::new(read).lines();

    let requests = [
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {
            "name": "shell",
            "arguments": {"commands": [
                {"label": "fail", "cmd": "exit 4"},
                {"label": "never", "cmd": "echo unreachable"}
            ]}
        }}),
    ];
    for request in &requests {
        write.write_all(format!("{request}\n").as_bytes()).await.unwrap();
    }
    write.shutdown().await.unwrap();

    let init: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(init["id"], 1);
    assert_eq!(init["result"]["protocolVersion"], "2025-06-18");

    let call: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(call["id"], 2);
    assert_eq!(call["result"]["isError"], true);
    let text = call["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("[fail] exit 4"));
    assert!(!text.contains("unreachable"));

    assert!(lines.next_line().await.unwrap().is_none());
    server.await.unwrap().unwrap();
}
