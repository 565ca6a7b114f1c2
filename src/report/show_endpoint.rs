use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, State},
};
use rusqlite::Connection;
use serde::Serialize;

use crate::{
    AppState, Error,
    report::{
        Report, ReportId,
        core::{get_report, has_artifact},
    },
    transaction::{count_report_transactions, sum_report_transactions},
};

/// The state needed to show a report.
#[derive(Debug, Clone)]
pub struct ShowReportState {
    /// The database connection for reading reports.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ShowReportState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A report with a summary of the transactions it currently archives.
#[derive(Debug, Serialize)]
pub struct ReportDetails {
    /// The report record.
    #[serde(flatten)]
    pub report: Report,
    /// Whether the report's file can be downloaded.
    pub has_file: bool,
    /// The number of transactions tagged with the report.
    ///
    /// Zero once the report is completed, since its transactions are purged.
    pub transaction_count: u32,
    /// The sum of the tagged transactions in minor units.
    pub transaction_total: i64,
}

/// A route handler for showing a report.
///
/// Responds with 404 if the report does not exist.
pub async fn show_report_endpoint(
    State(state): State<ShowReportState>,
    Path(report_id): Path<ReportId>,
) -> Result<Json<ReportDetails>, Error> {
    let connection = state.db_connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");
        Error::DatabaseLockError
    })?;

    let report = get_report(report_id, &connection)?;

    Ok(Json(ReportDetails {
        has_file: has_artifact(report.id, &connection)?,
        transaction_count: count_report_transactions(report.id, &connection)?,
        transaction_total: sum_report_transactions(report.id, &connection)?,
        report,
    }))
}
