//! Generates the file for a report by archiving the transactions before its cutoff date.

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};

use crate::{
    Error,
    report::{
        Report, ReportEvent, ReportId, ReportStatus,
        artifact::write_report_csv,
        core::{REPORT_CONTENT_TYPE, attach_artifact, fail_report, get_report, has_artifact},
    },
    transaction::tag_transactions_before,
};

/// The failure reason of a report whose account has nothing to archive.
pub const NO_TRANSACTIONS_REASON: &str = "no transactions found for the specified cutoff date";

/// What [generate_report] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The report already has a file, nothing was done.
    AlreadyGenerated,
    /// The report is no longer in process, nothing was done.
    AlreadyFinished(ReportStatus),
    /// No transactions were old enough and the report was marked as failed.
    NoTransactions,
    /// Generation failed and the report was marked as failed with `reason`.
    Failed {
        /// The failure reason stored on the report.
        reason: String,
    },
    /// The transactions were tagged and exported and the file was attached.
    Generated {
        /// The report that was generated.
        report_id: ReportId,
        /// How many transactions were archived by the report.
        transaction_count: usize,
    },
}

impl GenerationOutcome {
    /// The event to dispatch for this outcome, if any.
    pub fn event(&self) -> Option<ReportEvent> {
        match self {
            Self::Generated { report_id, .. } => Some(ReportEvent::ArtifactAttached {
                report_id: *report_id,
            }),
            _ => None,
        }
    }
}

/// Generate the file for the report `report_id`.
///
/// Every untagged transaction of the report's account dated before the cutoff
/// date is tagged with the report, exported to CSV in batches of
/// `batch_size` rows, and the file is attached to the report. Tagging,
/// exporting and attaching happen in one database transaction, so a failure
/// leaves no transaction tagged.
///
/// Running this again for a report that already has a file, or that has
/// failed, does nothing.
///
/// # Errors
/// Returns an error if the report cannot be loaded or cannot be marked as failed.
/// Failures while generating are recorded on the report instead.
pub fn generate_report(
    report_id: ReportId,
    batch_size: u32,
    connection: &Connection,
) -> Result<GenerationOutcome, Error> {
    let report = get_report(report_id, connection)?;

    if has_artifact(report.id, connection)? {
        tracing::info!("Report {report_id} already has a file, skipping generation");
        return Ok(GenerationOutcome::AlreadyGenerated);
    }

    if report.status != ReportStatus::InProcess {
        tracing::warn!(
            "Report {report_id} is {:?}, skipping generation",
            report.status
        );
        return Ok(GenerationOutcome::AlreadyFinished(report.status));
    }

    match tag_and_export(&report, batch_size, connection) {
        Ok(0) => {
            tracing::info!("No transactions found for report {report_id}");
            fail_report(report.id, NO_TRANSACTIONS_REASON, connection)?;
            Ok(GenerationOutcome::NoTransactions)
        }
        Ok(transaction_count) => {
            tracing::info!(
                "Generated report {report_id} for account {} with {transaction_count} transactions",
                report.account_id
            );
            Ok(GenerationOutcome::Generated {
                report_id,
                transaction_count,
            })
        }
        Err(error) => {
            tracing::error!("Failed to generate report {report_id}: {error:?}");
            let reason = error.to_string();
            fail_report(report.id, &reason, connection)?;
            Ok(GenerationOutcome::Failed { reason })
        }
    }
}

/// Returns the number of transactions tagged.
fn tag_and_export(report: &Report, batch_size: u32, connection: &Connection) -> Result<usize, Error> {
    // Immediate so that concurrent runs serialize on the write lock before selecting rows.
    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Immediate)?;

    let tagged = tag_transactions_before(
        report.id,
        report.account_id,
        report.cutoff_date,
        &transaction,
    )?;

    if tagged == 0 {
        return Ok(0);
    }

    let data = write_report_csv(report.id, batch_size, Vec::new(), &transaction)?;
    attach_artifact(
        report.id,
        &report.artifact_filename(),
        REPORT_CONTENT_TYPE,
        &data,
        &transaction,
    )?;

    transaction.commit()?;

    Ok(tagged)
}
