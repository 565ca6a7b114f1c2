use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
    http::{StatusCode, header::LOCATION},
    response::IntoResponse,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    AppState, ArchiveConfig, Error, Job, JobQueue,
    account::AccountId,
    endpoints::{self, format_endpoint},
    report::core::create_report,
};

/// The state needed to create a report.
#[derive(Debug, Clone)]
pub struct CreateReportState {
    /// The database connection for storing reports.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The settings used to pick the default cutoff date.
    pub config: ArchiveConfig,
    /// The queue that generation is sent to.
    pub job_queue: JobQueue,
}

impl FromRef<AppState> for CreateReportState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            config: state.config.clone(),
            job_queue: state.job_queue.clone(),
        }
    }
}

/// The request body for creating a report.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateReportRequest {
    /// The account whose transactions to archive.
    pub account_id: AccountId,
    /// Transactions dated before this date are archived.
    ///
    /// Defaults to the configured retention period before today.
    #[serde(default)]
    pub cutoff_date: Option<Date>,
}

/// A route handler for creating a report and queueing its generation.
///
/// Responds with 201, the new report and its location, 404 if the account does not exist,
/// or 409 if the account already has a report for the cutoff date.
pub async fn create_report_endpoint(
    State(state): State<CreateReportState>,
    Json(request): Json<CreateReportRequest>,
) -> Result<impl IntoResponse, Error> {
    let cutoff_date = match request.cutoff_date {
        Some(cutoff_date) => cutoff_date,
        None => state.config.cutoff_date(state.config.today()?)?,
    };

    let report = {
        let connection = state.db_connection.lock().map_err(|error| {
            tracing::error!("could not acquire database lock: {error}");
            Error::DatabaseLockError
        })?;

        create_report(request.account_id, cutoff_date, &connection)?
    };

    state.job_queue.enqueue(Job::GenerateReport(report.id))?;
    tracing::info!(
        "Created report {} for account {} with the cutoff date {cutoff_date}",
        report.id,
        report.account_id
    );

    let location = format_endpoint(endpoints::REPORT, report.id);

    Ok((StatusCode::CREATED, [(LOCATION, location)], Json(report)))
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        http::{StatusCode, header::LOCATION},
        routing::post,
    };
    use axum_test::TestServer;
    use serde_json::{Value, json};
    use time::macros::date;

    use crate::{
        Job, endpoints,
        report::{ReportStatus, core::get_report},
        test_utils::{create_fixture, get_test_state},
    };

    use super::create_report_endpoint;

    #[tokio::test]
    async fn creates_report_and_queues_generation() {
        let state = get_test_state();
        let account_id = create_fixture(&state.db_connection.lock().unwrap()).account.id;
        let queue = state.job_queue.clone();
        let connection = state.db_connection.clone();
        let app = Router::new()
            .route(endpoints::REPORTS, post(create_report_endpoint))
            .with_state(state);
        let server = TestServer::try_new(app).expect("Could not create test server.");

        let response = server
            .post(endpoints::REPORTS)
            .json(&json!({ "account_id": account_id, "cutoff_date": "2026-04-17" }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let body = response.json::<Value>();
        let report_id = body["id"].as_i64().expect("want report id");
        assert_eq!(body["cutoff_date"], "2026-04-17");
        assert_eq!(
            response.header(LOCATION).to_str().unwrap(),
            format!("/reports/{report_id}")
        );
        assert_eq!(queue.pending().unwrap(), vec![Job::GenerateReport(report_id)]);
        let report = get_report(report_id, &connection.lock().unwrap()).unwrap();
        assert_eq!(report.cutoff_date, date!(2026 - 04 - 17));
        assert_eq!(report.status, ReportStatus::InProcess);
    }

    #[tokio::test]
    async fn defaults_cutoff_to_retention_period() {
        let state = get_test_state();
        let account_id = create_fixture(&state.db_connection.lock().unwrap()).account.id;
        let want_cutoff = state
            .config
            .cutoff_date(state.config.today().unwrap())
            .unwrap();
        let app = Router::new()
            .route(endpoints::REPORTS, post(create_report_endpoint))
            .with_state(state);
        let server = TestServer::try_new(app).expect("Could not create test server.");

        let response = server
            .post(endpoints::REPORTS)
            .json(&json!({ "account_id": account_id }))
            .await;

        response.assert_status(StatusCode::CREATED);
        assert_eq!(
            response.json::<Value>()["cutoff_date"],
            want_cutoff.to_string()
        );
    }

    #[tokio::test]
    async fn duplicate_report_is_conflict() {
        let state = get_test_state();
        let account_id = create_fixture(&state.db_connection.lock().unwrap()).account.id;
        let queue = state.job_queue.clone();
        let app = Router::new()
            .route(endpoints::REPORTS, post(create_report_endpoint))
            .with_state(state);
        let server = TestServer::try_new(app).expect("Could not create test server.");
        let body = json!({ "account_id": account_id, "cutoff_date": "2026-04-17" });
        server.post(endpoints::REPORTS).json(&body).await;

        let response = server.post(endpoints::REPORTS).json(&body).await;

        response.assert_status(StatusCode::CONFLICT);
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let state = get_test_state();
        let queue = state.job_queue.clone();
        let app = Router::new()
            .route(endpoints::REPORTS, post(create_report_endpoint))
            .with_state(state);
        let server = TestServer::try_new(app).expect("Could not create test server.");

        let response = server
            .post(endpoints::REPORTS)
            .json(&json!({ "account_id": 42, "cutoff_date": "2026-04-17" }))
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
        assert!(queue.is_empty().unwrap());
    }
}
