use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sample novel-view videos from an input video
    Sample {
        #[clap(flatten)]
        args: cli::sample::SampleArgs,
    },
    /// Print the anchor and dense schedule of a grid without sampling
    Plan {
        #[clap(flatten)]
        args: cli::plan::PlanArgs,
    },
}

fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("sv4d_burn={level}").parse()?)
                .add_directive(format!("sv4d={level}").parse()?),
        )
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Sample { args } => {
            init_tracing(args.verbose)?;
            cli::sample::handle_sample(args)?;
        }
        Commands::Plan { args } => {
            cli::plan::handle_plan(args)?;
        }
    }

    Ok(())
}
