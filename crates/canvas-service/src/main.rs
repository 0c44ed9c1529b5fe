use canvas_service::{init_tracing, load_config, root_span, run};
use tracing::{error, Instrument};

#[tokio::main]
async fn main() {
    // Tracing is configured from the loaded file, so config errors go to stderr.
    let config = match load_config(None) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(3);
        }
    };

    if let Err(e) = init_tracing(&config.logging, &config.environment) {
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }

    let span = root_span(&config.environment, &config.release);
    if let Err(e) = run(config).instrument(span).await {
        error!(error = %e, "Service failed");
        std::process::exit(e.exit_code());
    }
}
