//! Consolidates the transactions archived by a report into one cutoff transaction per
//! money account, then purges the archived transactions.
//!
//! For every money account, the cutoff transaction carries the net amount of
//! the archived transactions, so the balance of each money account is the same
//! before and after consolidation.

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};
use time::Date;

use crate::{
    Error,
    report::{
        ReportId, ReportStatus,
        core::{fail_report, get_report, has_artifact, mark_report_completed},
    },
    transaction::{
        MoneyAccountTotal, Transaction, TransactionKind, create_transaction,
        delete_report_transactions, get_report_totals_by_money_account,
    },
};

/// The failure reason of a report where a money account could not be consolidated.
pub const CUTOFF_FAILED_REASON: &str = "at least one cutoff transaction failed to post";

/// What [consolidate_report] did.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsolidationOutcome {
    /// The report has no file yet, nothing was done.
    NotReady,
    /// The report is no longer in process, nothing was done.
    AlreadyFinished(ReportStatus),
    /// Every money account was consolidated, the report was completed and its
    /// transactions purged.
    Completed {
        /// The cutoff transactions that were created, one per money account with a non-zero net.
        cutoff_transactions: Vec<Transaction>,
        /// The number of archived transactions that were deleted.
        purged_count: usize,
    },
    /// Consolidation failed and the report was marked as failed with `reason`.
    /// No transactions were deleted.
    Failed {
        /// The failure reason stored on the report.
        reason: String,
    },
}

/// Consolidate the transactions archived by the report `report_id`.
///
/// Every money account is attempted even if an earlier one fails. The cutoff
/// transactions, the status change and the purge are committed together only
/// if every money account succeeded. Otherwise none of the cutoff transactions
/// are kept, nothing is purged, and the report is marked as failed.
///
/// Running this again for a report that has completed or failed does nothing.
///
/// # Errors
/// Returns an error only if the report could not be marked as failed after an
/// unexpected error. Every other failure is recorded on the report.
pub fn consolidate_report(
    report_id: ReportId,
    today: Date,
    connection: &Connection,
) -> Result<ConsolidationOutcome, Error> {
    match try_consolidate(report_id, today, connection) {
        Ok(outcome) => Ok(outcome),
        Err(error) => {
            tracing::error!("Consolidation failed for report {report_id}: {error:?}");
            let reason = error.to_string();
            if !fail_report(report_id, &reason, connection)? {
                tracing::warn!("Report {report_id} could not be marked as failed");
            }
            Ok(ConsolidationOutcome::Failed { reason })
        }
    }
}

fn try_consolidate(
    report_id: ReportId,
    today: Date,
    connection: &Connection,
) -> Result<ConsolidationOutcome, Error> {
    let report = get_report(report_id, connection)?;

    if !has_artifact(report.id, connection)? {
        tracing::info!("Report {report_id} has no file yet, skipping consolidation");
        return Ok(ConsolidationOutcome::NotReady);
    }

    if report.status != ReportStatus::InProcess {
        tracing::warn!(
            "Report {report_id} is {:?}, skipping consolidation",
            report.status
        );
        return Ok(ConsolidationOutcome::AlreadyFinished(report.status));
    }

    let mut transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Immediate)?;

    let totals = get_report_totals_by_money_account(report.id, &transaction)?;

    if totals.is_empty() {
        return Err(Error::NoTaggedTransactions(report.id));
    }

    let mut all_posted = true;
    let mut cutoff_transactions = Vec::new();

    for total in &totals {
        match post_cutoff_transaction(total, today, &mut transaction) {
            Ok(Some(cutoff_transaction)) => cutoff_transactions.push(cutoff_transaction),
            Ok(None) => {}
            Err(error) => {
                tracing::error!(
                    "Could not post cutoff transaction for money account {} of report {report_id}: {error}",
                    total.money_account_id
                );
                all_posted = false;
            }
        }
    }

    if !all_posted {
        transaction.rollback()?;
        fail_report(report.id, CUTOFF_FAILED_REASON, connection)?;
        return Ok(ConsolidationOutcome::Failed {
            reason: CUTOFF_FAILED_REASON.to_owned(),
        });
    }

    mark_report_completed(report.id, &transaction)?;
    let purged_count = delete_report_transactions(report.id, &transaction)?;
    transaction.commit()?;

    tracing::info!(
        "Completed report {report_id}: posted {} cutoff transactions and purged {purged_count} transactions",
        cutoff_transactions.len()
    );

    Ok(ConsolidationOutcome::Completed {
        cutoff_transactions,
        purged_count,
    })
}

/// Create the cutoff transaction for one money account.
///
/// Returns `None` if the net amount is zero, in which case there is nothing to carry over.
fn post_cutoff_transaction(
    total: &MoneyAccountTotal,
    today: Date,
    transaction: &mut SqlTransaction,
) -> Result<Option<Transaction>, Error> {
    if total.net_amount == 0 {
        return Ok(None);
    }

    let savepoint = transaction.savepoint()?;

    let cutoff_transaction = create_transaction(
        Transaction::build(
            TransactionKind::for_net_amount(total.net_amount),
            total.net_amount,
            today,
            total.money_account_id,
        )
        .description(&format!("Account cutoff: {}", total.money_account_name))
        .cutoff(true),
        &savepoint,
    )?;

    savepoint.commit()?;

    Ok(Some(cutoff_transaction))
}
