use anyhow::Result;
use clap::Parser;
use sheet_patterns::PatternConfig;
use sheet_patterns::cli;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli_args = cli::Cli::parse();
    let config = PatternConfig::from_args(cli_args.settings)?;
    let payload = cli::run_command(&config, cli_args.command).await?;
    cli::output::emit_value(&payload, cli_args.compact)?;
    Ok(())
}
