//! `shellpilot backends`: list the endpoint table.

use shellpilot_config::AppConfig;
use shellpilot_providers::{EndpointTable, Framing};

pub fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let table = EndpointTable::from_config(config);

    println!("Backends");
    println!("========");
    for backend in table.backends() {
        let marker = if backend.name == config.backend { "*" } else { " " };
        let framing = match backend.framing {
            Framing::Json => "json",
            Framing::LocalChat => "local-chat",
        };
        let auth = backend.credential_env.as_deref().unwrap_or("none");
        println!("{marker} {:<12} {:<11} auth: {auth}", backend.name, framing);
        for url in &backend.urls {
            println!("    {url}");
        }
    }
    println!();
    println!("  * selected via `backend` (SHELLPILOT_BACKEND)");
    Ok(())
}
