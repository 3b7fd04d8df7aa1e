use clap::{Parser, Subcommand};

mod commands;

use commands::{RunArgs, ValidateArgs};

#[derive(Parser)]
#[command(name = "trade-etl")]
#[command(about = "Weekly trade aggregation and bronze client ranking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate a trade file and write the table, report and charts
    Run(RunArgs),
    /// Report formatting problems in a trade file
    Validate(ValidateArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => {
            commands::run_aggregate(args).await?;
        }
        Commands::Validate(args) => {
            commands::run_validate(args)?;
        }
    }

    Ok(())
}
