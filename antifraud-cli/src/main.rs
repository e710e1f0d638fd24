//! Antifraud CLI
//!
//! Terminal interface for transaction validation and for running a mesh node.

mod api;
mod commands;
mod logging;
mod output;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "antifraud")]
#[command(version = "0.1.0")]
#[command(
    about = "Wallet antifraud - validate Bitcoin transactions before broadcast",
    long_about = None
)]
#[command(propagate_version = true)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a transaction candidate
    Validate(commands::validate::ValidateArgs),

    /// Serve the validation API and the mesh endpoints
    Serve(commands::serve::ServeArgs),

    /// Generate mesh key material
    Keygen(commands::keygen::KeygenArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_json);

    let exit_code = match cli.command {
        Commands::Validate(args) => commands::validate::run(args).await,
        Commands::Serve(args) => commands::serve::run(args).await,
        Commands::Keygen(args) => commands::keygen::run(args),
    };

    std::process::exit(exit_code);
}
