//! `shellpilot run -- <cmd>...`: an ad-hoc batch through the shell executor.

use shellpilot_config::AppConfig;
use shellpilot_core::shell::ShellCommandSpec;
use shellpilot_tools::ShellExecutor;

pub async fn run(
    config: AppConfig,
    commands: Vec<String>,
    timeout: Option<u64>,
    keep_going: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let specs = batch(commands, timeout.unwrap_or(config.shell.default_timeout_secs), keep_going);
    let executor = ShellExecutor::from_config(&config.shell);
    let results = executor.run(&specs).await;

    println!("{}", serde_json::to_string_pretty(&results)?);

    let failed = results.len() < specs.len() || results.iter().any(|r| !r.success);
    if failed {
        return Err("one or more commands failed".into());
    }
    Ok(())
}

fn batch(commands: Vec<String>, timeout: u64, keep_going: bool) -> Vec<ShellCommandSpec> {
    commands
        .into_iter()
        .enumerate()
        .map(|(i, cmd)| {
            ShellCommandSpec::new(format!("cmd-{}", i + 1), cmd)
                .with_timeout(timeout)
                .continue_on_failure(keep_going)
        })
        .collect()
}
