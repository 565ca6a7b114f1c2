//! Sets up the application's SQLite database.

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};

use crate::{
    Error,
    account::{create_account_table, create_user_table},
    budget::create_budget_table,
    money_account::create_money_account_table,
    report::{create_report_artifact_table, create_report_table},
    transaction::create_transaction_table,
    transfer::create_transfer_table,
};

/// Create the tables for the domain models if they do not exist.
///
/// Foreign key enforcement is switched on for `connection`, and it must be
/// before any other statement runs on it.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    connection.pragma_update(None, "foreign_keys", true)?;

    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_account_table(&transaction)?;
    create_user_table(&transaction)?;
    create_money_account_table(&transaction)?;
    create_budget_table(&transaction)?;
    create_transfer_table(&transaction)?;
    create_report_table(&transaction)?;
    create_transaction_table(&transaction)?;
    create_report_artifact_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}
