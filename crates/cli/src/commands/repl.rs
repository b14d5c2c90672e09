//! `shellpilot repl`: interactive or single-directive sessions.

use shellpilot_agent::{CallTemplate, LineApprover, ReplSession, SessionObserver, SessionReport};
use shellpilot_config::AppConfig;
use shellpilot_core::context::{ContextEntry, EntryKind};
use shellpilot_providers::HttpGateway;
use shellpilot_tools::ShellExecutor;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

/// Prints streamed text and each turn's new entries.
struct Console;

impl SessionObserver for Console {
    fn on_delta(&self, text: &str) {
        print!("{text}");
        let _ = std::io::stdout().flush();
    }

    fn on_entries(&self, entries: &[ContextEntry]) {
        for entry in entries {
            match entry.kind {
                // the user typed it; tokens are shown in the footer
                EntryKind::UserMessage | EntryKind::Tokens => {}
                _ => println!("  {}", entry.render()),
            }
        }
    }
}

pub async fn run(config: AppConfig, message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let gateway = HttpGateway::from_config(&config)?;
    let endpoint = super::resolve_endpoint(&config, gateway.endpoints())?;
    let template = CallTemplate::from_config(&config, endpoint)?;

    let input = Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()));
    let session = ReplSession::new(
        Arc::new(gateway),
        template,
        ShellExecutor::from_config(&config.shell),
        Arc::new(LineApprover::new(input.clone())),
    )
    .configured(&config)
    .with_observer(Arc::new(Console));

    if let Some(directive) = message {
        let report = session.run(&directive).await;
        print_footer(&report);
        return Ok(());
    }

    println!();
    println!("  shellpilot: {} via {}", config.model, config.backend);
    println!("  Approval:   {:?}", config.session.approval);
    println!("  Type a directive and press Enter. 'exit' or 'quit' leaves.");
    println!();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = input.lock().await.next_line().await?;
        let Some(line) = line else { break };
        let directive = line.trim();
        if directive.is_empty() {
            continue;
        }
        if directive.eq_ignore_ascii_case("exit") || directive.eq_ignore_ascii_case("quit") {
            break;
        }

        let report = session.run(directive).await;
        print_footer(&report);
    }

    println!();
    Ok(())
}

fn print_footer(report: &SessionReport) {
    let tokens = report
        .transcript
        .iter()
        .rev()
        .find(|e| e.kind == EntryKind::Tokens)
        .map(|e| e.text.as_str())
        .unwrap_or("0");
    println!();
    println!(
        "  [{}] {} iteration(s), {} entries, ~{} context tokens",
        report.outcome,
        report.iterations,
        report.transcript.len(),
        tokens
    );
    println!();
}
