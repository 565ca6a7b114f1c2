//! Defines the core data models and database queries for transactions.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    Connection, Row, ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error,
    account::{AccountId, UserId},
    budget::BudgetId,
    database_id::TransactionId,
    money_account::MoneyAccountId,
    report::ReportId,
    transfer::TransferId,
};

// ============================================================================
// MODELS
// ============================================================================

/// What a transaction records and therefore which sign its amount may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Money spent, amount `<= 0`.
    Expense,
    /// Money earned, amount `>= 0`.
    Incoming,
    /// The source side of a transfer between money accounts, amount `<= 0`.
    OutgoingTransfer,
    /// The destination side of a transfer between money accounts, amount `>= 0`.
    IncomingTransfer,
}

impl TransactionKind {
    /// The name stored in the database and written to reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "Expense",
            Self::Incoming => "Incoming",
            Self::OutgoingTransfer => "OutgoingTransfer",
            Self::IncomingTransfer => "IncomingTransfer",
        }
    }

    /// Whether `amount` has a sign this kind of transaction allows.
    pub fn allows_amount(&self, amount: i64) -> bool {
        match self {
            Self::Expense | Self::OutgoingTransfer => amount <= 0,
            Self::Incoming | Self::IncomingTransfer => amount >= 0,
        }
    }

    /// The kind of a cutoff transaction that carries the net amount `net_amount`.
    pub fn for_net_amount(net_amount: i64) -> Self {
        if net_amount > 0 {
            Self::Incoming
        } else {
            Self::Expense
        }
    }
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Expense" => Ok(Self::Expense),
            "Incoming" => Ok(Self::Incoming),
            "OutgoingTransfer" => Ok(Self::OutgoingTransfer),
            "IncomingTransfer" => Ok(Self::IncomingTransfer),
            other => Err(format!("unknown transaction kind \"{other}\"")),
        }
    }
}

impl ToSql for TransactionKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: String| FromSqlError::Other(error.into()))
    }
}

/// A settled financial fact: money that was spent, earned or moved.
///
/// To create a new `Transaction`, use [Transaction::build].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The owner account, always the owner of `money_account_id`.
    pub account_id: AccountId,
    /// The money account the amount is scoped to.
    pub money_account_id: MoneyAccountId,
    /// The user that registered the transaction, if any.
    pub user_id: Option<UserId>,
    /// The budget the transaction was filed under, if any.
    pub budget_id: Option<BudgetId>,
    /// The transfer this transaction is one side of, if any.
    pub transfer_id: Option<TransferId>,
    /// The report that has archived this transaction and will consolidate it.
    pub report_id: Option<ReportId>,
    /// What the transaction records.
    pub kind: TransactionKind,
    /// The signed amount in minor units, negative for money leaving the money account.
    pub amount: i64,
    /// When the transaction happened.
    pub date: Date,
    /// A text description of what the transaction was for.
    pub description: String,
    /// Whether this is a fixed (recurring) expense or income.
    pub fixed: bool,
    /// Whether this is a synthetic transaction that replaces archived activity.
    pub cutoff: bool,
}

impl Transaction {
    /// Create a new transaction.
    ///
    /// Shortcut for [TransactionBuilder] for discoverability.
    pub fn build(
        kind: TransactionKind,
        amount: i64,
        date: Date,
        money_account_id: MoneyAccountId,
    ) -> TransactionBuilder {
        TransactionBuilder {
            kind,
            amount,
            date,
            money_account_id,
            description: String::new(),
            user_id: None,
            budget_id: None,
            transfer_id: None,
            fixed: false,
            cutoff: false,
        }
    }
}

/// A builder for creating [Transaction] instances.
///
/// # Examples
///
/// ```ignore
/// use time::macros::date;
///
/// let builder = Transaction::build(TransactionKind::Expense, -4_599, date!(2025-01-15), cash.id)
///     .description("Coffee shop purchase")
///     .user_id(Some(user.id));
/// let transaction = create_transaction(builder, &connection)?;
/// ```
#[derive(Debug, PartialEq, Clone)]
pub struct TransactionBuilder {
    /// What the transaction records.
    pub kind: TransactionKind,

    /// The signed amount in minor units (e.g. cents).
    ///
    /// Must have the sign allowed by `kind`, see [TransactionKind::allows_amount].
    pub amount: i64,

    /// The date when the transaction occurred.
    pub date: Date,

    /// The money account the amount belongs to.
    ///
    /// The owner account of the transaction is taken from this money account.
    pub money_account_id: MoneyAccountId,

    /// A human-readable description of the transaction.
    pub description: String,

    /// The user that registered the transaction.
    pub user_id: Option<UserId>,

    /// The budget the transaction is filed under.
    pub budget_id: Option<BudgetId>,

    /// The transfer group shared by both sides of a transfer.
    pub transfer_id: Option<TransferId>,

    /// Whether this is a fixed (recurring) expense or income.
    pub fixed: bool,

    /// Whether this is a synthetic cutoff transaction.
    pub cutoff: bool,
}

impl TransactionBuilder {
    /// Set the description for the transaction.
    pub fn description(mut self, description: &str) -> Self {
        description.clone_into(&mut self.description);
        self
    }

    /// Set the user that registered the transaction.
    pub fn user_id(mut self, user_id: Option<UserId>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Set the budget for the transaction.
    pub fn budget_id(mut self, budget_id: Option<BudgetId>) -> Self {
        self.budget_id = budget_id;
        self
    }

    /// Set the transfer group for the transaction.
    pub fn transfer_id(mut self, transfer_id: Option<TransferId>) -> Self {
        self.transfer_id = transfer_id;
        self
    }

    /// Mark the transaction as fixed.
    pub fn fixed(mut self, fixed: bool) -> Self {
        self.fixed = fixed;
        self
    }

    /// Mark the transaction as a synthetic cutoff transaction.
    pub fn cutoff(mut self, cutoff: bool) -> Self {
        self.cutoff = cutoff;
        self
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// The columns selected by [map_transaction_row], in order.
pub const TRANSACTION_COLUMNS: &str = "id, account_id, money_account_id, user_id, budget_id, \
    transfer_id, report_id, kind, amount, date, description, fixed, cutoff";

/// Create a new transaction in the database from a builder.
///
/// # Errors
/// This function will return a:
/// - [Error::AmountSignMismatch] if the sign of the amount is not allowed for the kind,
/// - or [Error::NotFound] if the money account does not exist,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_transaction(
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    if !builder.kind.allows_amount(builder.amount) {
        return Err(Error::AmountSignMismatch {
            kind: builder.kind,
            amount: builder.amount,
        });
    }

    let transaction = connection
        .prepare(&format!(
            "INSERT INTO \"transaction\" (account_id, money_account_id, user_id, budget_id, \
                transfer_id, kind, amount, date, description, fixed, cutoff)
             SELECT account_id, id, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10
             FROM money_account WHERE id = ?1
             RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row(
            rusqlite::params![
                builder.money_account_id,
                builder.user_id,
                builder.budget_id,
                builder.transfer_id,
                builder.kind,
                builder.amount,
                builder.date,
                builder.description,
                builder.fixed,
                builder.cutoff,
            ],
            map_transaction_row,
        )?;

    Ok(transaction)
}

/// Retrieve a transaction from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid transaction,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_transaction(id: TransactionId, connection: &Connection) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\" WHERE id = :id"
        ))?
        .query_one(&[(":id", &id)], map_transaction_row)?;

    Ok(transaction)
}

/// Get the total number of transactions in the database.
///
/// # Errors
/// This function will return a [Error::SqlError] there is some SQL error.
#[cfg(test)]
pub fn count_transactions(connection: &Connection) -> Result<u32, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM \"transaction\";", [], |row| {
            row.get(0)
        })
        .map_err(|error| error.into())
}

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                money_account_id INTEGER NOT NULL,
                user_id INTEGER,
                budget_id INTEGER,
                transfer_id INTEGER,
                report_id INTEGER,
                kind TEXT NOT NULL,
                amount INTEGER NOT NULL,
                date TEXT NOT NULL,
                description TEXT NOT NULL,
                fixed INTEGER NOT NULL DEFAULT 0,
                cutoff INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY(account_id) REFERENCES account(id) ON UPDATE CASCADE ON DELETE CASCADE,
                FOREIGN KEY(money_account_id) REFERENCES money_account(id) ON UPDATE CASCADE,
                FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE SET NULL,
                FOREIGN KEY(budget_id) REFERENCES budget(id) ON UPDATE CASCADE ON DELETE SET NULL,
                FOREIGN KEY(transfer_id) REFERENCES transfer(id) ON UPDATE CASCADE,
                FOREIGN KEY(report_id) REFERENCES report(id) ON UPDATE CASCADE ON DELETE SET NULL
                )",
        (),
    )?;

    // Ensure the sequence starts at 1
    connection.execute(
        "INSERT OR IGNORE INTO sqlite_sequence (name, seq) VALUES ('transaction', 0)",
        (),
    )?;

    // Report exports read transactions newest first, and selection filters by account and date.
    connection.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_transaction_date_id ON \"transaction\"(date DESC, id DESC);
         CREATE INDEX IF NOT EXISTS idx_transaction_account_date ON \"transaction\"(account_id, date);
         CREATE INDEX IF NOT EXISTS idx_transaction_report ON \"transaction\"(report_id);
         CREATE INDEX IF NOT EXISTS idx_transaction_transfer ON \"transaction\"(transfer_id);",
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
///
/// The row must have the columns in [TRANSACTION_COLUMNS].
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    Ok(Transaction {
        id: row.get(0)?,
        account_id: row.get(1)?,
        money_account_id: row.get(2)?,
        user_id: row.get(3)?,
        budget_id: row.get(4)?,
        transfer_id: row.get(5)?,
        report_id: row.get(6)?,
        kind: row.get(7)?,
        amount: row.get(8)?,
        date: row.get(9)?,
        description: row.get(10)?,
        fixed: row.get(11)?,
        cutoff: row.get(12)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================
