//! Transfers move money between two money accounts of the same owner account.
//!
//! A transfer is stored as a pair of transactions, an outgoing transaction on
//! the source money account and an incoming transaction on the destination,
//! whose amounts are exact negatives of each other. Both rows carry the ID of
//! a row in the `transfer` table, which is how the pair is found again.

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    account::{AccountId, User},
    database_id::DatabaseId,
    money_account::{MoneyAccountId, get_money_account, get_money_account_balance},
    transaction::{
        TRANSACTION_COLUMNS, Transaction, TransactionKind, create_transaction, get_transaction,
        map_transaction_row,
    },
};

/// Database identifier for a transfer, shared by both of its transactions.
pub type TransferId = DatabaseId;

/// The errors that may occur when creating, updating or deleting a transfer.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TransferError {
    /// A field of the transfer is missing or invalid.
    #[error("invalid transfer: {0}")]
    InvalidData(&'static str),

    /// A money account of the transfer does not exist.
    #[error("the money account {0} does not exist")]
    UnknownMoneyAccount(MoneyAccountId),

    /// A money account or the transfer belongs to a different owner account than the actor.
    #[error("money can only be transferred between money accounts of your own account")]
    ForeignAccount,

    /// The source money account does not have enough money for the transfer.
    #[error("insufficient funds: the balance is {balance} but {requested} was requested")]
    InsufficientFunds {
        /// The balance available to the transfer in minor units.
        balance: i64,
        /// The requested amount in minor units.
        requested: i64,
    },

    /// The transfer does not exist.
    #[error("the transfer {0} could not be found")]
    NotFound(TransferId),

    /// Only one of the transfer's two transactions exists.
    #[error("the transfer {0} is missing one of its transactions")]
    MissingCounterpart(TransferId),

    /// A transaction of the transfer has been archived by a report and can no longer change.
    #[error("the transfer {0} has been archived by a report")]
    Archived(TransferId),

    /// The transfer could not be written and nothing was changed.
    #[error("the transfer could not be saved: {0}")]
    Persistence(String),
}

impl From<Error> for TransferError {
    fn from(error: Error) -> Self {
        tracing::error!("transfer failed: {error}");
        TransferError::Persistence(error.to_string())
    }
}

impl From<rusqlite::Error> for TransferError {
    fn from(error: rusqlite::Error) -> Self {
        Error::from(error).into()
    }
}

/// The fields of a transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferForm {
    /// A description shown on both transactions.
    pub description: String,
    /// The amount to move in minor units, must be greater than zero.
    pub amount: i64,
    /// The money account the money leaves.
    pub from_money_account_id: MoneyAccountId,
    /// The money account the money arrives in.
    pub to_money_account_id: MoneyAccountId,
    /// The date of both transactions.
    pub date: Date,
}

impl TransferForm {
    fn validate(&self) -> Result<(), TransferError> {
        if self.description.trim().is_empty() {
            return Err(TransferError::InvalidData("a description is required"));
        }

        if self.amount <= 0 {
            return Err(TransferError::InvalidData(
                "the amount must be greater than zero",
            ));
        }

        if self.from_money_account_id == self.to_money_account_id {
            return Err(TransferError::InvalidData(
                "the source and destination money accounts must differ",
            ));
        }

        Ok(())
    }
}

/// Move `form.amount` from one money account of `actor`'s account to another.
///
/// Returns the outgoing transaction, whose `transfer_id` identifies the transfer.
///
/// # Errors
/// This function will return a:
/// - [TransferError::InvalidData] if a field of `form` is invalid,
/// - [TransferError::UnknownMoneyAccount] if a money account does not exist,
/// - [TransferError::ForeignAccount] if a money account belongs to another account,
/// - [TransferError::InsufficientFunds] if the source balance is less than the amount,
/// - or [TransferError::Persistence] if the transfer could not be written.
///
/// Nothing is written if an error is returned.
pub fn create_transfer(
    actor: &User,
    form: &TransferForm,
    connection: &Connection,
) -> Result<Transaction, TransferError> {
    form.validate()?;

    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Immediate)?;

    check_owner(actor, form, &transaction)?;

    let balance = get_money_account_balance(form.from_money_account_id, &transaction)?;
    if balance < form.amount {
        return Err(TransferError::InsufficientFunds {
            balance,
            requested: form.amount,
        });
    }

    let transfer_id: TransferId = transaction.query_row(
        "INSERT INTO transfer (account_id, created_at) VALUES (?1, ?2) RETURNING id",
        rusqlite::params![actor.account_id, OffsetDateTime::now_utc()],
        |row| row.get(0),
    )?;

    let outgoing = create_transaction(
        Transaction::build(
            TransactionKind::OutgoingTransfer,
            -form.amount,
            form.date,
            form.from_money_account_id,
        )
        .description(&form.description)
        .user_id(Some(actor.id))
        .transfer_id(Some(transfer_id)),
        &transaction,
    )?;

    create_transaction(
        Transaction::build(
            TransactionKind::IncomingTransfer,
            form.amount,
            form.date,
            form.to_money_account_id,
        )
        .description(&form.description)
        .user_id(Some(actor.id))
        .transfer_id(Some(transfer_id)),
        &transaction,
    )?;

    transaction.commit()?;

    tracing::info!(
        "User {} transferred {} from money account {} to {} as transfer {transfer_id}",
        actor.id,
        form.amount,
        form.from_money_account_id,
        form.to_money_account_id
    );

    Ok(outgoing)
}

/// Replace the fields of the transfer `transfer_id` with `form`.
///
/// The funds check ignores the transfer's current transactions, so a
/// transfer can be changed to any amount the source could cover without it.
///
/// Returns the updated outgoing transaction.
///
/// # Errors
/// Returns the same errors as [create_transfer], and a:
/// - [TransferError::NotFound] if the transfer does not exist,
/// - [TransferError::MissingCounterpart] if only one of its transactions exists,
/// - or [TransferError::Archived] if one of its transactions has been archived by a report.
pub fn update_transfer(
    actor: &User,
    transfer_id: TransferId,
    form: &TransferForm,
    connection: &Connection,
) -> Result<Transaction, TransferError> {
    form.validate()?;

    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Immediate)?;

    let (outgoing, incoming) = get_transfer_pair(actor, transfer_id, &transaction)?;
    check_owner(actor, form, &transaction)?;

    let current_effect: i64 = [&outgoing, &incoming]
        .into_iter()
        .filter(|side| side.money_account_id == form.from_money_account_id)
        .map(|side| side.amount)
        .sum();
    let balance = get_money_account_balance(form.from_money_account_id, &transaction)?
        - current_effect;
    if balance < form.amount {
        return Err(TransferError::InsufficientFunds {
            balance,
            requested: form.amount,
        });
    }

    for (id, money_account_id, amount) in [
        (outgoing.id, form.from_money_account_id, -form.amount),
        (incoming.id, form.to_money_account_id, form.amount),
    ] {
        transaction.execute(
            "UPDATE \"transaction\"
             SET money_account_id = ?1, amount = ?2, date = ?3, description = ?4, user_id = ?5
             WHERE id = ?6",
            rusqlite::params![
                money_account_id,
                amount,
                form.date,
                form.description,
                actor.id,
                id
            ],
        )?;
    }

    let updated = get_transaction(outgoing.id, &transaction)?;
    transaction.commit()?;

    tracing::info!("User {} updated transfer {transfer_id}", actor.id);

    Ok(updated)
}

/// Delete both transactions of the transfer `transfer_id`.
///
/// Returns the deleted outgoing transaction.
///
/// # Errors
/// This function will return a:
/// - [TransferError::NotFound] if the transfer does not exist,
/// - [TransferError::ForeignAccount] if the transfer belongs to another account,
/// - [TransferError::MissingCounterpart] if only one of its transactions exists,
/// - [TransferError::Archived] if one of its transactions has been archived by a report,
/// - or [TransferError::Persistence] if the transfer could not be deleted.
pub fn destroy_transfer(
    actor: &User,
    transfer_id: TransferId,
    connection: &Connection,
) -> Result<Transaction, TransferError> {
    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Immediate)?;

    let (outgoing, _) = get_transfer_pair(actor, transfer_id, &transaction)?;

    transaction.execute(
        "DELETE FROM \"transaction\" WHERE transfer_id = ?1",
        [transfer_id],
    )?;
    transaction.execute("DELETE FROM transfer WHERE id = ?1", [transfer_id])?;
    transaction.commit()?;

    tracing::info!("User {} deleted transfer {transfer_id}", actor.id);

    Ok(outgoing)
}

/// Find the outgoing and incoming transactions of `transfer_id`.
fn get_transfer_pair(
    actor: &User,
    transfer_id: TransferId,
    connection: &Connection,
) -> Result<(Transaction, Transaction), TransferError> {
    let account_id: AccountId = connection
        .query_row(
            "SELECT account_id FROM transfer WHERE id = ?1",
            [transfer_id],
            |row| row.get(0),
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => TransferError::NotFound(transfer_id),
            error => error.into(),
        })?;

    if actor.account_id != account_id {
        return Err(TransferError::ForeignAccount);
    }

    let sides = connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\" WHERE transfer_id = ?1"
        ))?
        .query_map([transfer_id], map_transaction_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let outgoing = sides
        .iter()
        .find(|side| side.kind == TransactionKind::OutgoingTransfer);
    let incoming = sides
        .iter()
        .find(|side| side.kind == TransactionKind::IncomingTransfer);

    let (Some(outgoing), Some(incoming)) = (outgoing, incoming) else {
        tracing::error!(
            "Transfer {transfer_id} has {} of its two transactions",
            sides.len()
        );
        return Err(TransferError::MissingCounterpart(transfer_id));
    };

    if outgoing.report_id.is_some() || incoming.report_id.is_some() {
        return Err(TransferError::Archived(transfer_id));
    }

    Ok((outgoing.clone(), incoming.clone()))
}

/// Check that both money accounts of `form` belong to `actor`'s account.
fn check_owner(
    actor: &User,
    form: &TransferForm,
    connection: &Connection,
) -> Result<(), TransferError> {
    for id in [form.from_money_account_id, form.to_money_account_id] {
        let money_account = get_money_account(id, connection).map_err(|error| match error {
            Error::NotFound => TransferError::UnknownMoneyAccount(id),
            error => error.into(),
        })?;

        if money_account.account_id != actor.account_id {
            tracing::warn!(
                "User {} tried to transfer with money account {id} of account {}",
                actor.id,
                money_account.account_id
            );
            return Err(TransferError::ForeignAccount);
        }
    }

    Ok(())
}

pub fn create_transfer_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS transfer (
            id INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(account_id) REFERENCES account(id) ON UPDATE CASCADE ON DELETE CASCADE
        )",
        (),
    )?;

    Ok(())
}
