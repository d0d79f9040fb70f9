//! CLI entry point for the dividend tracker.

use std::path::PathBuf;
use std::process;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use divtrack_tracker::config::Config;
use divtrack_tracker::error::Error;
use divtrack_tracker::execution::{self, BrokerKind};

#[derive(Parser)]
#[command(name = "divtrack")]
#[command(about = "Dividend tracker: E*TRADE and Schwab holdings into an Excel workbook")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch holdings, estimate dividends and update the workbook
    Update {
        /// Compute and print without writing the workbook
        #[arg(long)]
        dry_run: bool,

        /// Do not send the Telegram summary
        #[arg(long)]
        no_alert: bool,
    },

    /// Show current positions per account
    Positions,

    /// Check broker sessions and list accounts
    Status,

    /// Print dividend estimates without touching the workbook
    Dividends,

    /// Trade journal commands
    Trades {
        #[command(subcommand)]
        command: TradesCommand,
    },

    /// List option expiries, or the chain for one expiry (E*TRADE)
    Options {
        symbol: String,

        /// Expiry date, YYYY-MM-DD
        #[arg(long)]
        expiry: Option<NaiveDate>,
    },

    /// Delete the cached token and authorize again
    Reauth {
        #[arg(value_enum)]
        broker: Option<BrokerKind>,
    },

    /// Send a test message to the configured Telegram chat
    Alert { message: String },
}

#[derive(Subcommand)]
enum TradesCommand {
    /// Append trades from a JSON journal to the Trades sheet
    Import { journal: PathBuf },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Update { dry_run, no_alert } => execution::run_update(&config, dry_run, no_alert),
        Command::Positions => execution::show_positions(&config),
        Command::Status => execution::check_status(&config),
        Command::Dividends => execution::show_dividends(&config),
        Command::Trades {
            command: TradesCommand::Import { journal },
        } => execution::import_trades(&config, &journal),
        Command::Options { symbol, expiry } => execution::show_options(&config, &symbol, expiry),
        Command::Reauth { broker } => execution::reauth(&config, broker),
        Command::Alert { message } => execution::send_alert(&config, &message),
    };

    if let Err(e) = result {
        if e.is_workbook_error() {
            eprintln!("\nWorkbook error: {e}");
            process::exit(2);
        }
        if let Error::NoBrokers = e {
            eprintln!("Error: {e}; check credentials with `divtrack status`");
        } else {
            eprintln!("Error: {e}");
        }
        process::exit(1);
    }
}
