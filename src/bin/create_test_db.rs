use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;
use rusqlite::Connection;
use time::{Duration, OffsetDateTime};

use ledger_archiver::{
    Transaction, TransactionKind, create_account, create_budget, create_money_account,
    create_transaction, create_user, initialize_db,
};

/// A utility for creating a test database for ledger_archiver.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,
}

/// Create and populate a database for manual testing.
///
/// The database has one account with a year of daily expenses, so that the
/// older half is archived by the next run.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let conn = Connection::open(output_path)?;

    initialize_db(&conn)?;

    println!("Creating test account...");

    let account = create_account("Test Household", &conn)?;
    let user = create_user(account.id, "Test User", "test@example.com", &conn)?;
    let cash = create_money_account(account.id, "Cash", &conn)?;
    let bank = create_money_account(account.id, "Bank", &conn)?;
    let groceries = create_budget(account.id, "Groceries", &conn)?;

    println!("Creating test transactions...");

    let today = OffsetDateTime::now_utc().date();
    let start = today - Duration::days(365);

    create_transaction(
        Transaction::build(TransactionKind::Incoming, 500_000, start, bank.id)
            .description("Opening balance")
            .user_id(Some(user.id)),
        &conn,
    )?;

    for day in 0..365 {
        let date = start + Duration::days(day);
        let money_account = if day % 3 == 0 { &cash } else { &bank };

        create_transaction(
            Transaction::build(
                TransactionKind::Expense,
                -(500 + (day % 7) * 125),
                date,
                money_account.id,
            )
            .description("Groceries")
            .user_id(Some(user.id))
            .budget_id(Some(groceries.id)),
            &conn,
        )?;
    }

    println!("Success!");

    Ok(())
}
