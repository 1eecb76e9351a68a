//! Wallet CLI - accounts and transfers in your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{account, logs, transfer};

/// wl - a wallet ledger in your terminal
///
/// The signed-in account comes from WALLET_USER, or from `wl account use`.
#[derive(Parser)]
#[command(name = "wl", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open and look up accounts
    Account {
        #[command(subcommand)]
        command: account::AccountCommands,
    },

    /// Send, request and confirm transfers
    Transfer {
        #[command(subcommand)]
        command: transfer::TransferCommands,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("Error: {:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Account { command } => account::run(command),
        Commands::Transfer { command } => transfer::run(command),
        Commands::Logs { command } => logs::run(command),
    }
}
