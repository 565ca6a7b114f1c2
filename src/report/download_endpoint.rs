use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRef, Path, State},
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::IntoResponse,
};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    report::{ReportId, core::get_artifact},
};

/// The state needed to download a report file.
#[derive(Debug, Clone)]
pub struct DownloadReportState {
    /// The database connection for reading report files.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for DownloadReportState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A route handler that responds with the CSV file of a report as an attachment.
///
/// Responds with 404 if the report does not exist, or 409 if its file has not
/// been generated.
pub async fn download_report_endpoint(
    State(state): State<DownloadReportState>,
    Path(report_id): Path<ReportId>,
) -> Result<impl IntoResponse, Error> {
    let artifact = {
        let connection = state.db_connection.lock().map_err(|error| {
            tracing::error!("could not acquire database lock: {error}");
            Error::DatabaseLockError
        })?;

        get_artifact(report_id, &connection)?
    };

    let disposition = format!("attachment; filename=\"{}\"", artifact.filename);

    Ok((
        [
            (CONTENT_TYPE, artifact.content_type),
            (CONTENT_DISPOSITION, disposition),
        ],
        artifact.data,
    ))
}
