use canvas_cli::run_cli;

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }
}
