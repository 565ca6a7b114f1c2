//! Set-based ledger queries used to archive transactions for a report.
//!
//! Tagging, purging and releasing are single statements scoped by report ID so
//! that thousands of rows are handled without per-row round trips.

use rusqlite::Connection;
use time::Date;

use crate::{
    Error,
    account::AccountId,
    database_id::TransactionId,
    money_account::MoneyAccountId,
    report::ReportId,
};

use super::TransactionKind;

/// The archived activity of one money account within a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoneyAccountTotal {
    /// The money account the transactions are scoped to.
    pub money_account_id: MoneyAccountId,
    /// The display name of the money account.
    pub money_account_name: String,
    /// The net signed sum of the tagged transaction amounts.
    pub net_amount: i64,
    /// The number of tagged transactions.
    pub transaction_count: u32,
}

/// A transaction joined with the names that are written to a report file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub id: TransactionId,
    pub date: Date,
    pub description: String,
    pub amount: i64,
    pub account_name: String,
    pub budget_name: Option<String>,
    pub kind: TransactionKind,
    pub registered_by: Option<String>,
    pub fixed: bool,
}

/// The position of the last row of a page of [ExportRow]s.
///
/// Rows are ordered by date then ID, both descending, so the next page starts
/// strictly after this key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportCursor {
    pub date: Date,
    pub id: TransactionId,
}

/// Tag every untagged transaction of `account_id` dated strictly before
/// `cutoff_date` with `report_id`.
///
/// Transactions already tagged by another report are left alone.
///
/// Returns the number of transactions tagged.
pub fn tag_transactions_before(
    report_id: ReportId,
    account_id: AccountId,
    cutoff_date: Date,
    connection: &Connection,
) -> Result<usize, Error> {
    connection
        .execute(
            "UPDATE \"transaction\" SET report_id = ?1
             WHERE account_id = ?2 AND date < ?3 AND report_id IS NULL",
            rusqlite::params![report_id, account_id, cutoff_date],
        )
        .map_err(Error::from)
}

/// The number of transactions tagged with `report_id`.
pub fn count_report_transactions(report_id: ReportId, connection: &Connection) -> Result<u32, Error> {
    connection
        .query_row(
            "SELECT COUNT(id) FROM \"transaction\" WHERE report_id = ?1",
            [report_id],
            |row| row.get(0),
        )
        .map_err(Error::from)
}

/// The net sum of the transactions tagged with `report_id`.
pub fn sum_report_transactions(report_id: ReportId, connection: &Connection) -> Result<i64, Error> {
    connection
        .query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM \"transaction\" WHERE report_id = ?1",
            [report_id],
            |row| row.get(0),
        )
        .map_err(Error::from)
}

/// Group the transactions tagged with `report_id` by money account and total them.
///
/// Groups are ordered by money account ID.
pub fn get_report_totals_by_money_account(
    report_id: ReportId,
    connection: &Connection,
) -> Result<Vec<MoneyAccountTotal>, Error> {
    connection
        .prepare(
            "SELECT money_account.id, money_account.name, SUM(\"transaction\".amount), \
                COUNT(\"transaction\".id)
             FROM \"transaction\"
             INNER JOIN money_account ON money_account.id = \"transaction\".money_account_id
             WHERE \"transaction\".report_id = ?1
             GROUP BY money_account.id
             ORDER BY money_account.id ASC",
        )?
        .query_map([report_id], |row| {
            Ok(MoneyAccountTotal {
                money_account_id: row.get(0)?,
                money_account_name: row.get(1)?,
                net_amount: row.get(2)?,
                transaction_count: row.get(3)?,
            })
        })?
        .map(|maybe_total| maybe_total.map_err(Error::from))
        .collect()
}

/// Read up to `limit` tagged transactions of `report_id` for export, starting after `after`.
///
/// Pass `None` for `after` to read the first page. Rows are ordered by date and
/// then ID, both descending, so that exports are reproducible.
pub fn get_export_page(
    report_id: ReportId,
    after: Option<ExportCursor>,
    limit: u32,
    connection: &Connection,
) -> Result<Vec<ExportRow>, Error> {
    let (after_date, after_id) = match after {
        Some(cursor) => (Some(cursor.date), Some(cursor.id)),
        None => (None, None),
    };

    connection
        .prepare(
            "SELECT \"transaction\".id, \"transaction\".date, \"transaction\".description, \
                \"transaction\".amount, account.name, budget.name, \"transaction\".kind, \
                user.name, \"transaction\".fixed
             FROM \"transaction\"
             INNER JOIN account ON account.id = \"transaction\".account_id
             LEFT JOIN budget ON budget.id = \"transaction\".budget_id
             LEFT JOIN user ON user.id = \"transaction\".user_id
             WHERE \"transaction\".report_id = ?1
               AND (?2 IS NULL
                    OR \"transaction\".date < ?2
                    OR (\"transaction\".date = ?2 AND \"transaction\".id < ?3))
             ORDER BY \"transaction\".date DESC, \"transaction\".id DESC
             LIMIT ?4",
        )?
        .query_map(
            rusqlite::params![report_id, after_date, after_id, limit],
            |row| {
                Ok(ExportRow {
                    id: row.get(0)?,
                    date: row.get(1)?,
                    description: row.get(2)?,
                    amount: row.get(3)?,
                    account_name: row.get(4)?,
                    budget_name: row.get(5)?,
                    kind: row.get(6)?,
                    registered_by: row.get(7)?,
                    fixed: row.get(8)?,
                })
            },
        )?
        .map(|maybe_row| maybe_row.map_err(Error::from))
        .collect()
}

/// Delete the transactions tagged with `report_id`.
///
/// Returns the number of transactions deleted.
pub fn delete_report_transactions(report_id: ReportId, connection: &Connection) -> Result<usize, Error> {
    connection
        .execute("DELETE FROM \"transaction\" WHERE report_id = ?1", [report_id])
        .map_err(Error::from)
}
