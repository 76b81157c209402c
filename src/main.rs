use clap::Parser as _;
use tracing_subscriber::EnvFilter;

// The page tree is single-threaded, so everything runs on one thread.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    jenkins_dark::run(jenkins_dark::CliArgs::parse()).await
}
