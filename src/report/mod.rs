//! Reports archive the old transactions of an account.
//!
//! A report moves through these steps, each of which is safe to run again:
//! - The scheduler creates one report per account and period
//! - The generator tags the transactions before the cutoff date and attaches a CSV file
//! - The notifier emails the file to the account's users
//! - The consolidator replaces the tagged transactions with one cutoff
//!   transaction per money account and purges them
//!
//! The endpoints list, create, show and download reports.

mod artifact;
mod consolidator;
mod core;
mod create_endpoint;
mod download_endpoint;
mod generator;
mod list_endpoint;
mod notifier;
mod scheduler;
mod show_endpoint;

pub use consolidator::{ConsolidationOutcome, consolidate_report};
pub use core::{
    Report, ReportArtifact, ReportEvent, ReportId, ReportStatus, UnfinishedReport, create_report,
    create_report_artifact_table, create_report_table, get_artifact, get_report,
    get_unfinished_reports,
};
pub use create_endpoint::create_report_endpoint;
pub use download_endpoint::download_report_endpoint;
pub use generator::{GenerationOutcome, generate_report};
pub use list_endpoint::list_reports_endpoint;
pub use notifier::{LogMailer, Mailer, NotificationOutcome, ReportEmail, send_report_email};
pub use scheduler::schedule_monthly_reports;
pub use show_endpoint::show_report_endpoint;

#[cfg(test)]
pub use core::get_account_reports;
