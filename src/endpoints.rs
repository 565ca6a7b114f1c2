//! The API endpoints URIs.
//!
//! For endpoints that take a parameter, e.g., '/reports/{report_id}', use [format_endpoint].

/// The route for listing and creating reports.
pub const REPORTS: &str = "/reports";
/// The route for a single report.
pub const REPORT: &str = "/reports/{report_id}";
/// The route for downloading the file of a report.
pub const REPORT_DOWNLOAD: &str = "/reports/{report_id}/download";
/// The route for the money account balances of an account.
pub const ACCOUNT_BALANCES: &str = "/accounts/{account_id}/balances";

/// Replace the parameter in `endpoint_path` with `id`.
///
/// A parameter is a string that starts with a left brace and ends with a
/// right brace. For example, in the endpoint path '/reports/{report_id}',
/// '{report_id}' is the parameter.
///
/// Only the first parameter is replaced. If no parameter is found in
/// `endpoint_path`, the function returns the original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, id: i64) -> String {
    let Some(param_start) = endpoint_path.find('{') else {
        return endpoint_path.to_owned();
    };

    let param_end = endpoint_path[param_start..]
        .find('}')
        .map(|offset| param_start + offset + 1)
        .unwrap_or(endpoint_path.len());

    format!(
        "{}{id}{}",
        &endpoint_path[..param_start],
        &endpoint_path[param_end..]
    )
}
