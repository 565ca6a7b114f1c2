use std::{error::Error, fs, path::PathBuf, sync::Arc};

use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;
use time::{Date, macros::format_description};

use ledger_archiver::{
    AppState, ArchiveConfig, DEFAULT_EXPORT_BATCH_SIZE, DEFAULT_RETENTION_MONTHS, Job, JobQueue,
    LogMailer, TransferForm, TransferId, UserId, Worker, create_transfer, destroy_transfer,
    get_account_balance, get_artifact, get_money_account_balances, get_user, setup_logging,
    update_transfer,
};

/// Operator commands for archiving transactions and moving money between money accounts.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// File path to the application SQLite database.
    #[arg(long, env = "LEDGER_DB_PATH")]
    db_path: String,

    /// Transactions older than this many months are archived.
    #[arg(long, env = "RETENTION_MONTHS", default_value_t = DEFAULT_RETENTION_MONTHS)]
    retention_months: u32,

    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    #[arg(long, env = "LOCAL_TIMEZONE", default_value = "Etc/UTC")]
    local_timezone: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Schedule this month's reports and run every job until none are left.
    Run,
    /// Write the file of a report to disk.
    Export {
        /// The report to export.
        #[arg(long)]
        report_id: i64,
        /// Where to write the CSV file. Defaults to the report's file name.
        #[arg(long, short)]
        output_path: Option<PathBuf>,
    },
    /// Create, update or delete a transfer.
    #[command(subcommand)]
    Transfer(TransferCommand),
    /// Print the balances of an account's money accounts.
    Balances {
        /// The owner account.
        #[arg(long)]
        account_id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum TransferCommand {
    /// Move money from one money account to another.
    Create(TransferArgs),
    /// Change an existing transfer.
    Update {
        /// The transfer to change.
        #[arg(long)]
        transfer_id: TransferId,
        #[command(flatten)]
        fields: TransferArgs,
    },
    /// Delete both transactions of a transfer.
    Delete {
        /// The user performing the deletion.
        #[arg(long)]
        user_id: UserId,
        /// The transfer to delete.
        #[arg(long)]
        transfer_id: TransferId,
    },
}

#[derive(Args, Debug)]
struct TransferArgs {
    /// The user performing the transfer.
    #[arg(long)]
    user_id: UserId,
    /// The money account the money leaves.
    #[arg(long)]
    from: i64,
    /// The money account the money arrives in.
    #[arg(long)]
    to: i64,
    /// The amount in minor units, e.g. cents.
    #[arg(long)]
    amount: i64,
    /// A description shown on both transactions.
    #[arg(long)]
    description: String,
    /// The date of the transfer as YYYY-MM-DD.
    #[arg(long, value_parser = parse_date)]
    date: Date,
}

impl From<TransferArgs> for TransferForm {
    fn from(args: TransferArgs) -> Self {
        Self {
            description: args.description,
            amount: args.amount,
            from_money_account_id: args.from,
            to_money_account_id: args.to,
            date: args.date,
        }
    }
}

fn parse_date(text: &str) -> Result<Date, String> {
    Date::parse(text, format_description!("[year]-[month]-[day]"))
        .map_err(|error| format!("invalid date \"{text}\": {error}"))
}

fn main() -> Result<(), Box<dyn Error>> {
    setup_logging()?;

    let cli = Cli::parse();

    let config = ArchiveConfig {
        retention_months: cli.retention_months,
        local_timezone: cli.local_timezone,
        export_batch_size: DEFAULT_EXPORT_BATCH_SIZE,
    };
    let state = AppState::new(Connection::open(&cli.db_path)?, config, JobQueue::new())?;

    match cli.command {
        Command::Run => {
            let worker = Worker::new(
                state.job_queue.clone(),
                state.db_connection.clone(),
                Arc::new(LogMailer),
                state.config.clone(),
            );
            worker.resume_unfinished_reports()?;
            state.job_queue.enqueue(Job::ScheduleMonthlyReports)?;
            let summary = worker.run_until_idle()?;
            println!(
                "{} jobs succeeded, {} retried, {} dropped",
                summary.succeeded, summary.retried, summary.dropped
            );
        }
        Command::Export {
            report_id,
            output_path,
        } => {
            let connection = state.db_connection.lock().map_err(|_| "database lock poisoned")?;
            let artifact = get_artifact(report_id, &connection)?;
            let output_path = output_path.unwrap_or_else(|| PathBuf::from(&artifact.filename));
            fs::write(&output_path, &artifact.data)?;
            println!("Wrote report {report_id} to {output_path:#?}");
        }
        Command::Transfer(command) => {
            let connection = state.db_connection.lock().map_err(|_| "database lock poisoned")?;

            match command {
                TransferCommand::Create(fields) => {
                    let actor = get_user(fields.user_id, &connection)?;
                    let outgoing = create_transfer(&actor, &fields.into(), &connection)?;
                    println!(
                        "Created transfer {}",
                        outgoing.transfer_id.unwrap_or_default()
                    );
                }
                TransferCommand::Update {
                    transfer_id,
                    fields,
                } => {
                    let actor = get_user(fields.user_id, &connection)?;
                    update_transfer(&actor, transfer_id, &fields.into(), &connection)?;
                    println!("Updated transfer {transfer_id}");
                }
                TransferCommand::Delete {
                    user_id,
                    transfer_id,
                } => {
                    let actor = get_user(user_id, &connection)?;
                    destroy_transfer(&actor, transfer_id, &connection)?;
                    println!("Deleted transfer {transfer_id}");
                }
            }
        }
        Command::Balances { account_id } => {
            let connection = state.db_connection.lock().map_err(|_| "database lock poisoned")?;
            for balance in get_money_account_balances(account_id, &connection)? {
                println!("{:<24} {:>12}", balance.name, balance.balance);
            }
            println!(
                "{:<24} {:>12}",
                "Total",
                get_account_balance(account_id, &connection)?
            );
        }
    }

    Ok(())
}
