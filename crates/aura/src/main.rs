//! Aura - a foreman for one goal at a time

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{
    apprentices_command, history_list_command, history_show_command, init_command, run_command,
    status_command, RunOptions,
};

/// Aura - give it a goal, it directs the apprentices
#[derive(Parser)]
#[command(name = "aura")]
#[command(about = "◆ A foreman that plans, acts and observes until the goal is met")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one goal to a final answer
    Run {
        /// The goal, in plain words
        #[arg(required = true, num_args = 1..)]
        goal: Vec<String>,
        /// Stop after this many steps
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        max_steps: Option<u64>,
        /// Consecutive unusable oracle replies tolerated
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        retries: Option<u32>,
        /// Do not archive the session report
        #[arg(long)]
        no_archive: bool,
        /// Print the full session report as JSON
        #[arg(long)]
        json: bool,
        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
    /// Initialize config and workspace
    Init,
    /// Show system status
    Status,
    /// List the registered apprentices
    Apprentices,
    /// Browse archived sessions
    History {
        /// How many sessions to list
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        #[command(subcommand)]
        command: Option<HistoryCommands>,
    },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// Show one archived session
    Show { id: String },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(matches!(cli.command, Commands::Run { verbose: true, .. }));

    match cli.command {
        Commands::Run {
            goal,
            max_steps,
            retries,
            no_archive,
            json,
            verbose: _,
        } => {
            let options = RunOptions {
                goal: goal.join(" "),
                max_steps: max_steps.map(|n| n as usize),
                retries,
                archive: !no_archive,
                json,
            };
            match run_command(options).await {
                Ok(true) => {}
                Ok(false) => std::process::exit(2),
                Err(e) => {
                    error!("Run failed: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Init => {
            if let Err(e) = init_command().await {
                error!("Init failed: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Status => {
            if let Err(e) = status_command().await {
                error!("Status failed: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Apprentices => {
            if let Err(e) = apprentices_command().await {
                error!("Apprentices failed: {}", e);
                std::process::exit(1);
            }
        }
        Commands::History { limit, command } => match command {
            None => {
                if let Err(e) = history_list_command(limit).await {
                    error!("History failed: {}", e);
                    std::process::exit(1);
                }
            }
            Some(HistoryCommands::Show { id }) => {
                if let Err(e) = history_show_command(id).await {
                    error!("History show failed: {}", e);
                    std::process::exit(1);
                }
            }
        },
    }
}
