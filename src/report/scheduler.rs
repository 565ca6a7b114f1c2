//! Creates the monthly reports for every account.

use rusqlite::Connection;
use time::Date;

use crate::{
    Error,
    account::get_all_accounts,
    report::{ReportId, core::create_report},
};

/// Create one report per account for `cutoff_date`.
///
/// Accounts that already have a report for `cutoff_date` are skipped, so the
/// schedule may fire more than once per period.
///
/// Returns the IDs of the reports that were created, which are the reports
/// that need generating.
///
/// # Errors
/// Returns an [Error::SqlError] if the accounts could not be read or a report
/// could not be created for some other reason than a duplicate.
pub fn schedule_monthly_reports(
    cutoff_date: Date,
    connection: &Connection,
) -> Result<Vec<ReportId>, Error> {
    let mut created = Vec::new();

    for account in get_all_accounts(connection)? {
        match create_report(account.id, cutoff_date, connection) {
            Ok(report) => created.push(report.id),
            Err(Error::DuplicateReport(account_id, cutoff_date)) => {
                tracing::debug!(
                    "Account {account_id} already has a report for {cutoff_date}, skipping"
                );
            }
            Err(error) => return Err(error),
        }
    }

    tracing::info!(
        "Scheduled {} reports with the cutoff date {cutoff_date}",
        created.len()
    );

    Ok(created)
}
