//! Emails a report's file to the users of its account.

use rusqlite::Connection;
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    account::get_account_users,
    report::{
        ReportId,
        core::{get_artifact, get_report, mark_email_sent},
    },
};

/// A report email ready to be handed to a mail transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportEmail {
    /// The report being sent.
    pub report_id: ReportId,
    /// The addresses of the account's users.
    pub recipients: Vec<String>,
    /// The subject line, e.g. "Your Transactions Summary for April 2026".
    pub subject: String,
    /// The file name of the attachment.
    pub attachment_name: String,
    /// The MIME type of the attachment.
    pub attachment_content_type: String,
    /// The attachment contents.
    pub attachment: Vec<u8>,
}

/// Delivers report emails.
pub trait Mailer: Send + Sync {
    /// Deliver `email` to all of its recipients.
    ///
    /// # Errors
    /// Returns [Error::MailError] if the email could not be delivered.
    fn deliver(&self, email: &ReportEmail) -> Result<(), Error>;
}

/// A [Mailer] that only logs the emails it is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn deliver(&self, email: &ReportEmail) -> Result<(), Error> {
        tracing::info!(
            report_id = email.report_id,
            recipients = ?email.recipients,
            attachment = %email.attachment_name,
            bytes = email.attachment.len(),
            "Delivering \"{}\"",
            email.subject
        );

        Ok(())
    }
}

/// What [send_report_email] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// The email was sent before, nothing was done.
    AlreadySent,
    /// The account has no users to send the email to, nothing was done.
    NoRecipients,
    /// The email was delivered.
    Sent {
        /// The addresses the email was delivered to.
        recipients: Vec<String>,
    },
}

/// The subject line for a report with the cutoff date `cutoff_date`.
pub fn report_subject(cutoff_date: Date) -> String {
    format!(
        "Your Transactions Summary for {} {}",
        cutoff_date.month(),
        cutoff_date.year()
    )
}

/// Email the file of report `report_id` to the users of its account.
///
/// The report is re-read so that the email reflects its current state. Once
/// the email is delivered the report's `email_sent` flag is set, and later
/// calls do nothing.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the report does not exist,
/// - [Error::ArtifactUnavailable] if the report has no file,
/// - [Error::MailError] if `mailer` could not deliver the email, in which case
///   the flag is left unset so the email can be retried,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn send_report_email(
    report_id: ReportId,
    mailer: &dyn Mailer,
    connection: &Connection,
) -> Result<NotificationOutcome, Error> {
    let report = get_report(report_id, connection)?;

    if report.email_sent {
        tracing::warn!("Report {report_id} was already emailed, skipping");
        return Ok(NotificationOutcome::AlreadySent);
    }

    let artifact = get_artifact(report.id, connection)?;

    let recipients: Vec<String> = get_account_users(report.account_id, connection)?
        .into_iter()
        .map(|user| user.email)
        .collect();

    if recipients.is_empty() {
        tracing::warn!(
            "Account {} has no users to email report {report_id} to",
            report.account_id
        );
        return Ok(NotificationOutcome::NoRecipients);
    }

    let email = ReportEmail {
        report_id: report.id,
        recipients,
        subject: report_subject(report.cutoff_date),
        attachment_name: artifact.filename,
        attachment_content_type: artifact.content_type,
        attachment: artifact.data,
    };

    mailer.deliver(&email)?;
    mark_email_sent(report.id, OffsetDateTime::now_utc(), connection)?;

    tracing::info!(
        "Emailed report {report_id} to {} recipients",
        email.recipients.len()
    );

    Ok(NotificationOutcome::Sent {
        recipients: email.recipients,
    })
}
