use clap::Parser;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = rideopsctl::Cli::parse();
    if let Err(err) = rideopsctl::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
