//! Ledger archiver periodically archives the transaction history of a ledger.
//!
//! Aged transactions are exported to a CSV report, the report is mailed to the
//! account's users, and the archived activity of each money account is folded
//! into a single balance-preserving cutoff transaction before the detail rows
//! are purged.
//!
//! This library also provides the transfer service that moves money between
//! the money accounts of an owner account, and a small HTTP API for listing
//! and downloading reports.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use time::Date;
use tokio::signal;

mod account;
mod app_state;
mod budget;
mod config;
mod database_id;
mod db;
mod endpoints;
mod jobs;
mod logging;
mod money_account;
mod report;
mod routing;
mod timezone;
mod transaction;
mod transfer;

#[cfg(test)]
mod test_utils;

pub use account::{
    Account, AccountId, User, UserId, create_account, create_user, get_account_balance, get_user,
};
pub use app_state::AppState;
pub use budget::{Budget, BudgetId, create_budget};
pub use config::{ArchiveConfig, DEFAULT_EXPORT_BATCH_SIZE, DEFAULT_RETENTION_MONTHS, months_before};
pub use database_id::{DatabaseId, TransactionId};
pub use db::initialize as initialize_db;
pub use jobs::{Job, JobQueue, MAX_JOB_ATTEMPTS, WorkSummary, Worker};
pub use logging::setup_logging;
pub use money_account::{
    MoneyAccount, MoneyAccountBalance, MoneyAccountId, create_money_account,
    get_money_account_balance, get_money_account_balances,
};
pub use report::{
    ConsolidationOutcome, GenerationOutcome, LogMailer, Mailer, NotificationOutcome, Report,
    ReportArtifact, ReportEmail, ReportEvent, ReportId, ReportStatus, consolidate_report,
    create_report, generate_report, get_artifact, get_report, schedule_monthly_reports,
    send_report_email,
};
pub use routing::build_router;
pub use transaction::{Transaction, TransactionBuilder, TransactionKind, create_transaction};
pub use transfer::{
    TransferError, TransferForm, TransferId, create_transfer, destroy_transfer, update_transfer,
};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("could not listen for ctrl+c: {error}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                tracing::error!("could not install terminate signal handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// A report already exists for the account and cutoff date.
    ///
    /// The scheduler may fire more than once for the same period, so callers
    /// that create reports should treat this as "already exists, skip".
    #[error("a report for account {0} with the cutoff date {1} already exists")]
    DuplicateReport(AccountId, Date),

    /// The specified account name already exists in the database.
    #[error("the account \"{0}\" already exists in the database")]
    DuplicateAccountName(String),

    /// The sign of a transaction's amount does not match its kind, e.g. an
    /// expense with a positive amount.
    #[error("a {kind} transaction cannot have the amount {amount}")]
    AmountSignMismatch {
        /// The kind of the rejected transaction.
        kind: TransactionKind,
        /// The rejected amount in minor units.
        amount: i64,
    },

    /// A report that has a file has no tagged transactions left to consolidate.
    ///
    /// Generation only attaches a file after tagging at least one transaction,
    /// so this indicates that the tags were lost.
    #[error("report {0} has no tagged transactions to consolidate")]
    NoTaggedTransactions(ReportId),

    /// The report exists but its file has not been generated.
    #[error("the file for report {0} is not available")]
    ArtifactUnavailable(ReportId),

    /// The report file could not be written.
    #[error("could not write the report file: {0}")]
    ExportError(String),

    /// The report email could not be delivered.
    #[error("could not deliver the report email: {0}")]
    MailError(String),

    /// A date could not be constructed or parsed.
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// Could not acquire the job queue lock
    #[error("could not acquire the job queue lock")]
    JobQueueLockError,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl From<csv::Error> for Error {
    fn from(value: csv::Error) -> Self {
        Error::ExportError(value.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::DuplicateReport(..) | Error::ArtifactUnavailable(_) => StatusCode::CONFLICT,
            Error::InvalidDate(_) => StatusCode::BAD_REQUEST,
            Error::InvalidTimezoneError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // Any errors that are not handled above are not intended to be shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "an unexpected error occurred" })),
                )
                    .into_response();
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
