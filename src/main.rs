use campus_guard::{config::GuardConfig, init_tracing, run};
use std::env;
use std::process;

#[tokio::main]
async fn main() {
    // Get config file path from command line or use default
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/campus-guard.yaml".to_string());

    // Load configuration
    let config = match GuardConfig::from_file(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", config_path, e);
            eprintln!("Usage: campus-guard [config_file]");
            process::exit(1);
        }
    };

    init_tracing(&config.logging);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Campus guard failed");
        process::exit(1);
    }
}
