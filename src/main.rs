use aduanas_etl::pipeline::{self, PipelineSummary};
use aduanas_etl::{api, audit, Config};
use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "aduanas",
    about = "Customs export declarations ETL and query API",
    version
)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full ETL pipeline once and print a summary
    Run {
        /// Print the run summary as JSON instead of the console report
        #[arg(long)]
        report_json: bool,
    },
    /// Serve the HTTP query API
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Some(Commands::Run { report_json }) => {
            let config = Config::from_env()?;
            let summary =
                tokio::task::spawn_blocking(move || pipeline::run_pipeline(&config)).await??;
            if report_json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }
        Some(Commands::Serve { bind }) => {
            let mut config = Config::from_env()?;
            if let Some(bind) = bind {
                config.api_bind = bind;
            }
            api::serve(config).await?;
        }
        None => {
            Cli::command().print_help()?;
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_summary(summary: &PipelineSummary) {
    println!("\n{}", "ETL run complete".bold().green());
    for dataset in &summary.datasets {
        println!(
            "  {:<16} accepted {:>8}  rejected {:>6}  repaired {:>6}",
            dataset.dataset,
            dataset.stats.accepted_rows,
            dataset.stats.rejected_rows,
            dataset.stats.repaired_values
        );
    }
    println!(
        "  {} accepted, {} rejected in {} ms",
        summary.total_accepted().to_string().bold(),
        summary.total_rejected().to_string().bold(),
        summary.duration_ms
    );
    print!("{}", audit::render_report(&summary.quality));
}
