//! Application router configuration.

use axum::{
    Router,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{
    AppState, Error,
    account::get_balances_endpoint,
    endpoints,
    report::{
        create_report_endpoint, download_report_endpoint, list_reports_endpoint,
        show_report_endpoint,
    },
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            endpoints::REPORTS,
            get(list_reports_endpoint).post(create_report_endpoint),
        )
        .route(endpoints::REPORT, get(show_report_endpoint))
        .route(endpoints::REPORT_DOWNLOAD, get(download_report_endpoint))
        .route(endpoints::ACCOUNT_BALANCES, get(get_balances_endpoint))
        .fallback(get_404_not_found)
        .with_state(state)
}

async fn get_404_not_found() -> Response {
    Error::NotFound.into_response()
}
