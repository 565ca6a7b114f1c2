use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Query, State},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    account::{AccountId, get_account},
    report::{Report, core::get_account_reports},
};

/// The state needed to list reports.
#[derive(Debug, Clone)]
pub struct ListReportsState {
    /// The database connection for reading reports.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ListReportsState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The query string for listing reports.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListReportsQuery {
    /// The account whose reports to list.
    pub account_id: AccountId,
}

/// A route handler that lists the reports of an account, newest first.
///
/// Responds with 404 if the account does not exist.
pub async fn list_reports_endpoint(
    State(state): State<ListReportsState>,
    Query(query): Query<ListReportsQuery>,
) -> Result<Json<Vec<Report>>, Error> {
    let connection = state.db_connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");
        Error::DatabaseLockError
    })?;

    let account = get_account(query.account_id, &connection)?;
    let reports = get_account_reports(account.id, &connection)?;

    Ok(Json(reports))
}
