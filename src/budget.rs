//! Budgets that transactions can optionally be filed under.

use rusqlite::Connection;
use serde::Serialize;

use crate::{Error, account::AccountId, database_id::DatabaseId};

/// Database identifier for a budget.
pub type BudgetId = DatabaseId;

/// A named spending budget, e.g. "Groceries".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Budget {
    /// The ID of the budget.
    pub id: BudgetId,
    /// The owner account the budget belongs to.
    pub account_id: AccountId,
    /// The name shown in report files.
    pub name: String,
}

pub fn create_budget_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS budget (
            id INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(account_id) REFERENCES account(id) ON UPDATE CASCADE ON DELETE CASCADE
        )",
        (),
    )?;

    Ok(())
}

/// Create a budget under the owner account `account_id`.
///
/// # Errors
/// Returns [Error::NotFound] if `account_id` does not refer to an account.
pub fn create_budget(account_id: AccountId, name: &str, connection: &Connection) -> Result<Budget, Error> {
    connection
        .prepare(
            "INSERT INTO budget (account_id, name)
             SELECT id, ?2 FROM account WHERE id = ?1
             RETURNING id, account_id, name",
        )?
        .query_row((account_id, name), |row| {
            Ok(Budget {
                id: row.get(0)?,
                account_id: row.get(1)?,
                name: row.get(2)?,
            })
        })
        .map_err(Error::from)
}
