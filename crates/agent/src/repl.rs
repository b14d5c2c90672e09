//! The REPL control loop.
//!
//! One session turns an operator directive into a sequence of model calls
//! and shell batches:
//!
//! 1. **Prompt** the gateway with the directive (first call) or the rendered
//!    context plus the previous response id (follow-ups)
//! 2. **Record** the model's text and stop if it declared itself finished
//! 3. **Extract** embedded shell commands, dropping ones already seen
//! 4. **Approve** each command against the policy, skipping declined ones
//! 5. **Execute** the approved commands and loop back to step 1
//!
//! The session ends when the model finishes or proposes nothing new, when
//! the wall-clock budget runs out, or when a gateway call fails.

use chrono::Utc;
use shellpilot_config::AppConfig;
use shellpilot_core::call::{CallDescriptor, RequestKind};
use shellpilot_core::context::{ContextEntry, EntryKind};
use shellpilot_core::error::ProviderError;
use shellpilot_core::event::{EventBus, SessionEvent};
use shellpilot_core::gateway::{Gateway, drain_stream};
use shellpilot_core::response::NormalizedResponse;
use shellpilot_core::shell::ShellCommandSpec;
use shellpilot_tools::ShellExecutor;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::approval::{ApprovalPolicy, Approver};
use crate::store::ContextStore;

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Finished,
    TimedOut,
    Failed(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished => f.write_str("finished"),
            Self::TimedOut => f.write_str("timed out"),
            Self::Failed(msg) => write!(f, "failed: {msg}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub outcome: Outcome,
    pub transcript: Vec<ContextEntry>,
    pub iterations: u32,
}

/// The fixed parts of every call a session makes.
#[derive(Debug, Clone)]
pub struct CallTemplate {
    pub model: String,
    pub endpoint: String,
    pub kind: RequestKind,
    pub instructions: String,
    pub streaming: bool,
}

impl CallTemplate {
    /// Take model, kind, instructions and streaming from config; the
    /// endpoint is resolved by the caller.
    pub fn from_config(config: &AppConfig, endpoint: impl Into<String>) -> Result<Self, String> {
        Ok(Self {
            model: config.model.clone(),
            endpoint: endpoint.into(),
            kind: config.request_kind.parse()?,
            instructions: config.instructions.clone(),
            streaming: config.streaming,
        })
    }

    fn build(&self, content: String, previous_response_id: Option<&str>) -> CallDescriptor {
        CallDescriptor::builder(&self.model, &self.endpoint, self.kind)
            .instructions(&self.instructions)
            .content(content)
            .previous_response_id(previous_response_id)
            .streaming(self.streaming)
            .build()
    }
}

/// Hooks for front ends that render a session as it runs.
pub trait SessionObserver: Send + Sync {
    /// A streamed text fragment from the model.
    fn on_delta(&self, _text: &str) {}

    /// Entries appended during the last turn.
    fn on_entries(&self, _entries: &[ContextEntry]) {}
}

struct Silent;

impl SessionObserver for Silent {}

/// Drives sessions against one gateway.
pub struct ReplSession {
    gateway: Arc<dyn Gateway>,
    template: CallTemplate,
    executor: ShellExecutor,
    approver: Arc<dyn Approver>,
    policy: ApprovalPolicy,
    store: Arc<ContextStore>,
    event_bus: Arc<EventBus>,
    observer: Arc<dyn SessionObserver>,
    session_timeout: Duration,
    call_timeout: Duration,
    max_iterations: u32,
    command_timeout_secs: u64,
}

impl ReplSession {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        template: CallTemplate,
        executor: ShellExecutor,
        approver: Arc<dyn Approver>,
    ) -> Self {
        Self {
            gateway,
            template,
            executor,
            approver,
            policy: ApprovalPolicy::default(),
            store: Arc::new(ContextStore::default()),
            event_bus: Arc::new(EventBus::default()),
            observer: Arc::new(Silent),
            session_timeout: Duration::from_secs(3600),
            call_timeout: Duration::from_secs(600),
            max_iterations: 200,
            command_timeout_secs: 30,
        }
    }

    /// Apply the session, context and shell sections of `config`.
    pub fn configured(mut self, config: &AppConfig) -> Self {
        self.policy = ApprovalPolicy::from_config(&config.session);
        self.store = Arc::new(ContextStore::from_config(&config.context));
        self.session_timeout = Duration::from_secs(config.session.timeout_secs);
        self.call_timeout = Duration::from_secs(config.session.call_timeout_secs);
        self.max_iterations = config.session.max_iterations;
        self.command_timeout_secs = config.shell.default_timeout_secs;
        self
    }

    pub fn with_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_store(mut self, store: Arc<ContextStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Deadline after which an outstanding gateway call is retried.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_command_timeout(mut self, secs: u64) -> Self {
        self.command_timeout_secs = secs;
        self
    }

    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    /// Run one session for `directive`.
    ///
    /// Never returns an error: failures end the session with
    /// [`Outcome::Failed`] and a note in the transcript. Concurrent runs
    /// sharing a store are serialized.
    pub async fn run(&self, directive: &str) -> SessionReport {
        let session_id = uuid::Uuid::new_v4().to_string();
        let _lease = self.store.begin_session().await;
        let started = Instant::now();
        let mut seen: HashSet<String> = HashSet::new();
        self.store.add_entry(ContextEntry::user(directive)).await;

        info!(session_id = %session_id, model = %self.template.model, "Session started");
        self.event_bus.publish(SessionEvent::SessionStarted {
            session_id: session_id.clone(),
            directive: directive.to_string(),
            timestamp: Utc::now(),
        });

        let mut previous: Option<NormalizedResponse> = None;
        let mut iterations: u32 = 0;
        let mut mark = 0;

        let outcome = loop {
            if started.elapsed() >= self.session_timeout {
                let secs = self.session_timeout.as_secs();
                warn!(session_id = %session_id, secs, "Session budget exhausted");
                self.note(format!("Session timed out after {secs}s")).await;
                break Outcome::TimedOut;
            }
            if iterations >= self.max_iterations {
                warn!(session_id = %session_id, iterations, "Iteration limit reached");
                let msg = format!("Stopped after {iterations} iterations");
                self.note(msg.clone()).await;
                break Outcome::Failed(msg);
            }
            iterations += 1;

            let call = match &previous {
                None => self.template.build(directive.to_string(), None),
                Some(last) => self
                    .template
                    .build(self.store.build_prompt_context().await, last.response_id()),
            };

            debug!(session_id = %session_id, iteration = iterations, "Calling gateway");
            let response = match self.call_with_retry(&call, &session_id).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Gateway call failed");
                    let msg = e.to_string();
                    self.note(msg.clone()).await;
                    break Outcome::Failed(msg);
                }
            };

            let text = response.output_text().unwrap_or_default().to_string();
            self.store.add_entry(ContextEntry::ai(&text)).await;

            let proposed: Vec<String> = response
                .shell_commands()
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();

            self.event_bus.publish(SessionEvent::ModelResponded {
                session_id: session_id.clone(),
                response_id: response.response_id().map(String::from),
                text,
                command_count: proposed.len(),
                timestamp: Utc::now(),
            });

            if response.is_finished() {
                debug!(session_id = %session_id, "Model declared the sequence finished");
                break Outcome::Finished;
            }
            if proposed.is_empty() {
                break Outcome::Finished;
            }

            let fresh: Vec<String> = proposed
                .into_iter()
                .filter(|c| seen.insert(c.clone()))
                .collect();
            if fresh.is_empty() {
                self.note("No new commands proposed").await;
                break Outcome::Finished;
            }

            for command in &fresh {
                self.store.add_entry(ContextEntry::command(command)).await;
            }

            let mut approved = Vec::with_capacity(fresh.len());
            for command in fresh {
                if self.policy.requires_approval(&command) && !self.approver.confirm(&command).await {
                    info!(session_id = %session_id, command = %command, "Command declined");
                    self.note(format!("Skipped: {command}")).await;
                    self.event_bus.publish(SessionEvent::CommandSkipped {
                        session_id: session_id.clone(),
                        command,
                        timestamp: Utc::now(),
                    });
                    continue;
                }
                approved.push(command);
            }

            self.execute(&approved, &session_id).await;

            let tokens = self.store.context_token_count().await;
            self.store
                .add_entry(ContextEntry::new(EntryKind::Tokens, tokens.to_string()))
                .await;

            mark = self.flush_entries(mark).await;
            previous = Some(response);
        };

        self.flush_entries(mark).await;

        info!(session_id = %session_id, outcome = %outcome, iterations, "Session ended");
        self.event_bus.publish(SessionEvent::SessionEnded {
            session_id,
            outcome: outcome.to_string(),
            iterations,
            timestamp: Utc::now(),
        });

        SessionReport {
            outcome,
            transcript: self.store.entries().await,
            iterations,
        }
    }

    /// Send `call`, retrying for as long as it keeps timing out.
    async fn call_with_retry(&self, call: &CallDescriptor, session_id: &str) -> Result<NormalizedResponse, ProviderError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match tokio::time::timeout(self.call_timeout, self.request(call)).await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) if e.is_timeout() => {
                    warn!(session_id, attempt, error = %e, "Gateway call timed out, retrying");
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(
                        session_id,
                        attempt,
                        timeout_secs = self.call_timeout.as_secs(),
                        "Gateway call exceeded its deadline, retrying"
                    );
                }
            }
            self.event_bus.publish(SessionEvent::CallRetried {
                session_id: session_id.to_string(),
                attempt,
                timestamp: Utc::now(),
            });
        }
    }

    async fn request(&self, call: &CallDescriptor) -> Result<NormalizedResponse, ProviderError> {
        if !call.streaming() {
            return self.gateway.complete_request(call).await;
        }
        let stream = self.gateway.stream_request(call).await?;
        let observer = self.observer.clone();
        drain_stream(stream, move |delta| observer.on_delta(delta)).await
    }

    async fn execute(&self, commands: &[String], session_id: &str) {
        for (i, command) in commands.iter().enumerate() {
            let spec = ShellCommandSpec::new(format!("step-{}", i + 1), command.as_str())
                .with_timeout(self.command_timeout_secs);
            let start = Instant::now();
            let result = self.executor.run_one(&spec).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            self.event_bus.publish(SessionEvent::CommandExecuted {
                session_id: session_id.to_string(),
                command: command.clone(),
                exit_code: result.exit_code,
                success: result.success,
                duration_ms,
                timestamp: Utc::now(),
            });
            self.store.add_entry(ContextEntry::output(result.summary())).await;
        }
    }

    async fn note(&self, text: impl Into<String>) {
        self.store.add_entry(ContextEntry::note(text)).await;
    }

    /// Hand entries added since `mark` to the observer; returns the new mark.
    async fn flush_entries(&self, mark: usize) -> usize {
        let fresh = self.store.new_entries_since(mark).await;
        if !fresh.is_empty() {
            self.observer.on_entries(&fresh);
        }
        self.store.cursor().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ScriptedApprover;
    use async_trait::async_trait;
    use shellpilot_config::ApprovalMode;
    use shellpilot_core::response::keys;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted replies and records every call it receives.
    struct ScriptedGateway {
        replies: Mutex<VecDeque<Result<NormalizedResponse, ProviderError>>>,
        calls: Mutex<Vec<CallDescriptor>>,
        stall_first: bool,
    }

    impl ScriptedGateway {
        fn new(replies: Vec<Result<NormalizedResponse, ProviderError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
                stall_first: false,
            }
        }

        fn calls(&self) -> Vec<CallDescriptor> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Gateway for ScriptedGateway {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete_request(&self, call: &CallDescriptor) -> Result<NormalizedResponse, ProviderError> {
            let first = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(call.clone());
                calls.len() == 1
            };
            if first && self.stall_first {
                std::future::pending::<()>().await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(finished("out of script")))
        }
    }

    fn reply(id: &str, text: &str, commands: &[&str]) -> NormalizedResponse {
        let mut r = NormalizedResponse::new();
        r.insert(keys::ID, id);
        r.insert(keys::OUTPUT_CONTENT, text);
        r.insert(
            keys::LOCALSHELLTOOL_COMMANDS,
            commands.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
        );
        r
    }

    fn finished(text: &str) -> NormalizedResponse {
        let mut r = NormalizedResponse::new();
        r.insert(keys::OUTPUT_CONTENT, text);
        r.insert(keys::LOCALSHELLTOOL_FINISHED, true);
        r
    }

    fn template() -> CallTemplate {
        CallTemplate {
            model: "gpt-4.1".into(),
            endpoint: "https://api.openai.com/v1/responses".into(),
            kind: RequestKind::Responses,
            instructions: "be useful".into(),
            streaming: false,
        }
    }

    fn session(gateway: Arc<ScriptedGateway>, approver: Arc<ScriptedApprover>) -> ReplSession {
        ReplSession::new(gateway, template(), ShellExecutor::new("/bin/sh"), approver)
    }

    fn texts(report: &SessionReport, kind: EntryKind) -> Vec<String> {
        report
            .transcript
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.text.clone())
            .collect()
    }

    #[tokio::test]
    async fn plain_output_finishes_after_one_call() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(reply("resp_1", "Nothing to run", &[]))]));
        let report = session(gateway.clone(), Arc::new(ScriptedApprover::default()))
            .run("say hi")
            .await;

        assert_eq!(report.outcome, Outcome::Finished);
        assert_eq!(report.iterations, 1);
        assert_eq!(texts(&report, EntryKind::UserMessage), vec!["say hi"]);
        assert_eq!(texts(&report, EntryKind::AiResponse), vec!["Nothing to run"]);
        assert_eq!(gateway.calls()[0].content(), "say hi");
    }

    #[tokio::test]
    async fn commands_run_and_follow_up_carries_context() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Ok(reply("resp_1", "listing", &["echo hello"])),
            Ok(finished("all done")),
        ]));
        let report = session(gateway.clone(), Arc::new(ScriptedApprover::default()))
            .run("show greeting")
            .await;

        assert_eq!(report.outcome, Outcome::Finished);
        assert_eq!(report.iterations, 2);
        let outputs = texts(&report, EntryKind::CommandOutput);
        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].contains("hello"));
        assert_eq!(texts(&report, EntryKind::Tokens).len(), 1);

        let calls = gateway.calls();
        assert_eq!(calls[1].previous_response_id(), Some("resp_1"));
        assert!(calls[1].content().starts_with("[User]: show greeting\n[AI]: listing\n[Command]: echo hello\n"));
    }

    #[tokio::test]
    async fn declined_destructive_command_is_skipped() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Ok(reply("resp_1", "cleaning", &["rm -rf /tmp/shellpilot-never", "ls -la"])),
            Ok(finished("ok")),
        ]));
        let approver = Arc::new(ScriptedApprover::new(["no"]));
        let report = session(gateway, approver.clone())
            .with_policy(ApprovalPolicy::new(
                ApprovalMode::ApproveDestructive,
                vec!["rm".into()],
            ))
            .run("clean up")
            .await;

        assert_eq!(approver.asked(), vec!["rm -rf /tmp/shellpilot-never"]);
        assert!(texts(&report, EntryKind::SystemNote).contains(&"Skipped: rm -rf /tmp/shellpilot-never".to_string()));
        assert_eq!(texts(&report, EntryKind::CommandOutput).len(), 1);
    }

    #[tokio::test]
    async fn duplicate_commands_execute_once() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Ok(reply("resp_1", "a", &["echo once", "echo once"])),
            Ok(reply("resp_2", "b", &["echo once"])),
        ]));
        let report = session(gateway, Arc::new(ScriptedApprover::default()))
            .run("repeat")
            .await;

        assert_eq!(report.outcome, Outcome::Finished);
        assert_eq!(texts(&report, EntryKind::Command), vec!["echo once"]);
        assert_eq!(texts(&report, EntryKind::CommandOutput).len(), 1);
    }

    #[tokio::test]
    async fn exhausted_budget_never_calls_gateway() {
        let gateway = Arc::new(ScriptedGateway::new(vec![]));
        let report = session(gateway.clone(), Arc::new(ScriptedApprover::default()))
            .with_session_timeout(Duration::ZERO)
            .run("anything")
            .await;

        assert_eq!(report.outcome, Outcome::TimedOut);
        assert_eq!(report.iterations, 0);
        assert!(gateway.calls().is_empty());
        assert_eq!(
            texts(&report, EntryKind::SystemNote),
            vec!["Session timed out after 0s"]
        );
    }

    #[tokio::test]
    async fn transport_error_ends_session_without_retry() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Err(ProviderError::Transport {
            status_code: 500,
            body: "boom".into(),
        })]));
        let report = session(gateway.clone(), Arc::new(ScriptedApprover::default()))
            .run("go")
            .await;

        let expected = "Unexpected response code: 500, body: boom".to_string();
        assert_eq!(report.outcome, Outcome::Failed(expected.clone()));
        assert_eq!(gateway.calls().len(), 1);
        assert_eq!(texts(&report, EntryKind::SystemNote), vec![expected]);
    }

    #[tokio::test]
    async fn stalled_call_is_retried() {
        let mut gateway = ScriptedGateway::new(vec![Ok(finished("second try"))]);
        gateway.stall_first = true;
        let gateway = Arc::new(gateway);
        let bus = Arc::new(EventBus::default());
        let mut events = bus.subscribe();

        let report = session(gateway.clone(), Arc::new(ScriptedApprover::default()))
            .with_call_timeout(Duration::from_millis(50))
            .with_event_bus(bus)
            .run("be patient")
            .await;

        assert_eq!(report.outcome, Outcome::Finished);
        assert_eq!(gateway.calls().len(), 2);
        let mut retried = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event.as_ref(), SessionEvent::CallRetried { attempt: 1, .. }) {
                retried = true;
            }
        }
        assert!(retried);
    }

    #[tokio::test]
    async fn timeout_error_is_retried() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Err(ProviderError::Timeout("read timed out".into())),
            Ok(finished("done")),
        ]));
        let report = session(gateway.clone(), Arc::new(ScriptedApprover::default()))
            .run("go")
            .await;
        assert_eq!(report.outcome, Outcome::Finished);
        assert_eq!(gateway.calls().len(), 2);
    }

    #[tokio::test]
    async fn iteration_limit_stops_the_loop() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Ok(reply("r1", "", &["echo 1"])),
            Ok(reply("r2", "", &["echo 2"])),
        ]));
        let report = session(gateway, Arc::new(ScriptedApprover::default()))
            .with_max_iterations(1)
            .run("count")
            .await;
        assert_eq!(report.iterations, 1);
        assert!(matches!(report.outcome, Outcome::Failed(_)));
    }

    #[tokio::test]
    async fn new_session_clears_previous_context() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Ok(reply("r1", "first", &[])),
            Ok(reply("r2", "second", &[])),
        ]));
        let repl = session(gateway, Arc::new(ScriptedApprover::default()));
        repl.run("one").await;
        let report = repl.run("two").await;
        assert_eq!(texts(&report, EntryKind::UserMessage), vec!["two"]);
        assert_eq!(report.transcript.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_runs_keep_their_own_transcripts() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Ok(reply("a1", "wait a", &["sleep 0.2"])),
            Ok(finished("a done")),
            Ok(reply("b1", "wait b", &["sleep 0.2"])),
            Ok(finished("b done")),
        ]));
        let repl = session(gateway, Arc::new(ScriptedApprover::default()));

        let (a, b) = tokio::join!(repl.run("directive A"), repl.run("directive B"));

        assert_eq!(a.outcome, Outcome::Finished);
        assert_eq!(b.outcome, Outcome::Finished);
        assert_eq!(texts(&a, EntryKind::UserMessage), vec!["directive A"]);
        assert_eq!(texts(&b, EntryKind::UserMessage), vec!["directive B"]);
        assert_eq!(texts(&a, EntryKind::AiResponse), vec!["wait a", "a done"]);
        assert_eq!(texts(&b, EntryKind::AiResponse), vec!["wait b", "b done"]);
        assert_eq!(texts(&a, EntryKind::CommandOutput).len(), 1);
        assert_eq!(texts(&b, EntryKind::CommandOutput).len(), 1);
    }

    struct Recorder {
        deltas: Mutex<String>,
        entries: Mutex<usize>,
    }

    impl SessionObserver for Recorder {
        fn on_delta(&self, text: &str) {
            self.deltas.lock().unwrap().push_str(text);
        }
        fn on_entries(&self, entries: &[ContextEntry]) {
            *self.entries.lock().unwrap() += entries.len();
        }
    }

    #[tokio::test]
    async fn observer_sees_deltas_and_every_entry() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Ok(reply("r1", "step", &["echo x"])),
            Ok(finished("streamed")),
        ]));
        let recorder = Arc::new(Recorder {
            deltas: Mutex::new(String::new()),
            entries: Mutex::new(0),
        });
        let mut streaming = template();
        streaming.streaming = true;

        let report = ReplSession::new(
            gateway,
            streaming,
            ShellExecutor::new("/bin/sh"),
            Arc::new(ScriptedApprover::default()),
        )
        .with_observer(recorder.clone())
        .run("stream it")
        .await;

        assert_eq!(*recorder.deltas.lock().unwrap(), "stepstreamed");
        assert_eq!(*recorder.entries.lock().unwrap(), report.transcript.len());
    }
}
