//! The report record: a persisted state machine tracking one archival run.

use rusqlite::{
    Connection, Row, ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::Serialize;
use time::{Date, OffsetDateTime};

use crate::{Error, account::AccountId, database_id::DatabaseId};

// ============================================================================
// MODELS
// ============================================================================

/// Database identifier for a report.
pub type ReportId = DatabaseId;

/// The MIME type of report files.
pub const REPORT_CONTENT_TYPE: &str = "text/csv";

/// Where a report is in its lifecycle.
///
/// Reports start in [ReportStatus::InProcess]. [ReportStatus::Completed] and
/// [ReportStatus::Failed] are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// The report is being generated or consolidated.
    InProcess,
    /// The transactions were exported, consolidated and purged.
    Completed,
    /// A step failed, see the report's failure reason.
    Failed,
}

impl ReportStatus {
    fn code(&self) -> i64 {
        match self {
            Self::InProcess => 0,
            Self::Completed => 1,
            Self::Failed => 2,
        }
    }
}

impl ToSql for ReportStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for ReportStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_i64()? {
            0 => Ok(Self::InProcess),
            1 => Ok(Self::Completed),
            2 => Ok(Self::Failed),
            other => Err(FromSqlError::OutOfRange(other)),
        }
    }
}

/// One archival run for one owner account and one cutoff date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// The ID of the report.
    pub id: ReportId,
    /// The owner account whose transactions are archived.
    pub account_id: AccountId,
    /// Transactions dated strictly before this date are archived.
    pub cutoff_date: Date,
    /// Where the report is in its lifecycle.
    pub status: ReportStatus,
    /// Why the report failed, if it did.
    pub failure_reason: Option<String>,
    /// Whether the report email has been delivered.
    pub email_sent: bool,
    /// When the report email was delivered.
    pub email_sent_at: Option<OffsetDateTime>,
    /// When the report was created.
    pub created_at: OffsetDateTime,
}

impl Report {
    /// The file name of the report's CSV file.
    pub fn artifact_filename(&self) -> String {
        format!("transactions_report_{}_{}.csv", self.id, self.cutoff_date)
    }
}

/// The durable file produced for a report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportArtifact {
    /// The report the file belongs to.
    pub report_id: ReportId,
    /// The file name offered when downloading or attaching the file.
    pub filename: String,
    /// The MIME type of `data`.
    pub content_type: String,
    /// The file contents.
    pub data: Vec<u8>,
}

/// A report whose lifecycle has not finished, see [get_unfinished_reports].
#[derive(Debug, Clone, PartialEq)]
pub struct UnfinishedReport {
    /// The report.
    pub report: Report,
    /// Whether the report's file has been attached.
    pub has_artifact: bool,
}

/// Something that happened to a report that other components react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportEvent {
    /// The report's file was just attached, so it can be sent and its
    /// transactions consolidated.
    ArtifactAttached {
        /// The report the file was attached to.
        report_id: ReportId,
    },
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

const REPORT_COLUMNS: &str =
    "id, account_id, cutoff_date, status, failure_reason, email_sent, email_sent_at, created_at";

pub fn create_report_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS report (
            id INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL,
            cutoff_date TEXT NOT NULL,
            status INTEGER NOT NULL DEFAULT 0,
            failure_reason TEXT,
            email_sent INTEGER NOT NULL DEFAULT 0,
            email_sent_at TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(account_id) REFERENCES account(id) ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_report_account_cutoff
            ON report(account_id, cutoff_date);",
    )?;

    Ok(())
}

pub fn create_report_artifact_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS report_artifact (
            report_id INTEGER PRIMARY KEY,
            filename TEXT NOT NULL,
            content_type TEXT NOT NULL,
            data BLOB NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(report_id) REFERENCES report(id) ON UPDATE CASCADE ON DELETE CASCADE
        )",
        (),
    )?;

    Ok(())
}

/// Create a report for `account_id` and `cutoff_date` in [ReportStatus::InProcess].
///
/// # Errors
/// This function will return a:
/// - [Error::DuplicateReport] if the account already has a report for `cutoff_date`,
/// - or [Error::NotFound] if `account_id` does not refer to an account,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_report(
    account_id: AccountId,
    cutoff_date: Date,
    connection: &Connection,
) -> Result<Report, Error> {
    connection
        .prepare(&format!(
            "INSERT INTO report (account_id, cutoff_date, status, created_at)
             SELECT id, ?2, ?3, ?4 FROM account WHERE id = ?1
             RETURNING {REPORT_COLUMNS}"
        ))?
        .query_row(
            rusqlite::params![
                account_id,
                cutoff_date,
                ReportStatus::InProcess,
                OffsetDateTime::now_utc()
            ],
            map_report_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
                },
                _,
            ) => Error::DuplicateReport(account_id, cutoff_date),
            error => error.into(),
        })
}

/// Retrieve a report by its `id`.
///
/// # Errors
/// Returns [Error::NotFound] if `id` does not refer to a report.
pub fn get_report(id: ReportId, connection: &Connection) -> Result<Report, Error> {
    connection
        .prepare(&format!("SELECT {REPORT_COLUMNS} FROM report WHERE id = :id"))?
        .query_one(&[(":id", &id)], map_report_row)
        .map_err(Error::from)
}

/// Retrieve the reports of `account_id`, newest first.
pub fn get_account_reports(
    account_id: AccountId,
    connection: &Connection,
) -> Result<Vec<Report>, Error> {
    connection
        .prepare(&format!(
            "SELECT {REPORT_COLUMNS} FROM report WHERE account_id = :account_id
             ORDER BY cutoff_date DESC, id DESC"
        ))?
        .query_map(&[(":account_id", &account_id)], map_report_row)?
        .map(|maybe_report| maybe_report.map_err(Error::from))
        .collect()
}

/// Retrieve the reports that still have work left, oldest first.
///
/// These are the reports in [ReportStatus::InProcess], and the completed
/// reports whose email has not been delivered.
pub fn get_unfinished_reports(connection: &Connection) -> Result<Vec<UnfinishedReport>, Error> {
    connection
        .prepare(&format!(
            "SELECT {REPORT_COLUMNS},
                EXISTS(SELECT 1 FROM report_artifact WHERE report_artifact.report_id = report.id)
             FROM report
             WHERE status = ?1 OR (status = ?2 AND email_sent = 0)
             ORDER BY id ASC"
        ))?
        .query_map(
            rusqlite::params![ReportStatus::InProcess, ReportStatus::Completed],
            |row| {
                Ok(UnfinishedReport {
                    report: map_report_row(row)?,
                    has_artifact: row.get(8)?,
                })
            },
        )?
        .map(|maybe_report| maybe_report.map_err(Error::from))
        .collect()
}

/// Move the report `id` from [ReportStatus::InProcess] to [ReportStatus::Completed].
///
/// Returns `false` if the report was not in process, in which case nothing changes.
pub fn mark_report_completed(id: ReportId, connection: &Connection) -> Result<bool, Error> {
    let rows_affected = connection.execute(
        "UPDATE report SET status = ?1, failure_reason = NULL WHERE id = ?2 AND status = ?3",
        rusqlite::params![ReportStatus::Completed, id, ReportStatus::InProcess],
    )?;

    Ok(rows_affected != 0)
}

/// Move the report `id` from [ReportStatus::InProcess] to [ReportStatus::Failed]
/// with `reason`.
///
/// Transactions tagged with the report stay tagged. They have been exported in
/// the report's file, so no later report exports them again.
///
/// Returns `false` if the report was not in process, in which case nothing changes.
pub fn fail_report(id: ReportId, reason: &str, connection: &Connection) -> Result<bool, Error> {
    let rows_affected = connection.execute(
        "UPDATE report SET status = ?1, failure_reason = ?2 WHERE id = ?3 AND status = ?4",
        rusqlite::params![ReportStatus::Failed, reason, id, ReportStatus::InProcess],
    )?;

    Ok(rows_affected != 0)
}

/// Store the file for the report `report_id`.
///
/// # Errors
/// Returns [Error::SqlError] if the report already has a file or there is some other SQL error.
pub fn attach_artifact(
    report_id: ReportId,
    filename: &str,
    content_type: &str,
    data: &[u8],
    connection: &Connection,
) -> Result<(), Error> {
    connection.execute(
        "INSERT INTO report_artifact (report_id, filename, content_type, data, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            report_id,
            filename,
            content_type,
            data,
            OffsetDateTime::now_utc()
        ],
    )?;

    Ok(())
}

/// Whether the report `report_id` has a file.
pub fn has_artifact(report_id: ReportId, connection: &Connection) -> Result<bool, Error> {
    connection
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM report_artifact WHERE report_id = ?1)",
            [report_id],
            |row| row.get(0),
        )
        .map_err(Error::from)
}

/// Retrieve the file for the report `report_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `report_id` does not refer to a report,
/// - or [Error::ArtifactUnavailable] if the report exists but has no file yet.
pub fn get_artifact(report_id: ReportId, connection: &Connection) -> Result<ReportArtifact, Error> {
    let artifact = connection
        .prepare(
            "SELECT report_id, filename, content_type, data FROM report_artifact
             WHERE report_id = :report_id",
        )?
        .query_one(&[(":report_id", &report_id)], |row| {
            Ok(ReportArtifact {
                report_id: row.get(0)?,
                filename: row.get(1)?,
                content_type: row.get(2)?,
                data: row.get(3)?,
            })
        });

    match artifact {
        Ok(artifact) => Ok(artifact),
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            // Distinguish a missing report from a report without a file.
            get_report(report_id, connection)?;
            Err(Error::ArtifactUnavailable(report_id))
        }
        Err(error) => Err(error.into()),
    }
}

/// Record that the report email was delivered at `sent_at`.
///
/// Only the email columns are written, the report's status is not touched.
pub fn mark_email_sent(
    report_id: ReportId,
    sent_at: OffsetDateTime,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE report SET email_sent = 1, email_sent_at = ?1 WHERE id = ?2",
        rusqlite::params![sent_at, report_id],
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

fn map_report_row(row: &Row) -> Result<Report, rusqlite::Error> {
    Ok(Report {
        id: row.get(0)?,
        account_id: row.get(1)?,
        cutoff_date: row.get(2)?,
        status: row.get(3)?,
        failure_reason: row.get(4)?,
        email_sent: row.get(5)?,
        email_sent_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use time::{OffsetDateTime, macros::date};

    use crate::{
        Error,
        test_utils::{create_fixture, get_test_connection, insert_transaction},
        transaction::{TransactionKind, count_report_transactions, tag_transactions_before},
    };

    use super::{
        ReportStatus, attach_artifact, create_report, fail_report, get_account_reports,
        get_artifact, get_report, get_unfinished_reports, has_artifact, mark_email_sent,
        mark_report_completed,
    };

    #[test]
    fn create_report_starts_in_process() {
        let connection = get_test_connection();
        let fixture = create_fixture(&connection);

        let report = create_report(fixture.account.id, date!(2026 - 04 - 17), &connection)
            .expect("Could not create report");

        assert_eq!(report.status, ReportStatus::InProcess);
        assert_eq!(report.cutoff_date, date!(2026 - 04 - 17));
        assert_eq!(report.failure_reason, None);
        assert!(!report.email_sent);
        assert_eq!(get_report(report.id, &connection), Ok(report));
    }

    #[test]
    fn create_report_rejects_duplicate_account_and_cutoff_date() {
        let connection = get_test_connection();
        let fixture = create_fixture(&connection);
        let cutoff_date = date!(2026 - 04 - 17);
        create_report(fixture.account.id, cutoff_date, &connection).unwrap();

        let result = create_report(fixture.account.id, cutoff_date, &connection);

        assert_eq!(result, Err(Error::DuplicateReport(fixture.account.id, cutoff_date)));
        assert_eq!(get_account_reports(fixture.account.id, &connection).unwrap().len(), 1);
    }

    #[test]
    fn create_report_for_missing_account_returns_not_found() {
        let connection = get_test_connection();

        assert_eq!(
            create_report(99, date!(2026 - 04 - 17), &connection),
            Err(Error::NotFound)
        );
    }

    #[test]
    fn terminal_states_are_final() {
        let connection = get_test_connection();
        let fixture = create_fixture(&connection);
        let report = create_report(fixture.account.id, date!(2026 - 04 - 17), &connection).unwrap();

        assert_eq!(mark_report_completed(report.id, &connection), Ok(true));
        assert_eq!(fail_report(report.id, "too late", &connection), Ok(false));
        assert_eq!(mark_report_completed(report.id, &connection), Ok(false));

        let report = get_report(report.id, &connection).unwrap();
        assert_eq!(report.status, ReportStatus::Completed);
        assert_eq!(report.failure_reason, None);
    }

    #[test]
    fn fail_report_records_reason_and_keeps_transactions_tagged() {
        let connection = get_test_connection();
        let fixture = create_fixture(&connection);
        insert_transaction(
            &fixture.cash,
            TransactionKind::Expense,
            -100,
            date!(2025 - 01 - 01),
            &connection,
        );
        let report = create_report(fixture.account.id, date!(2026 - 04 - 17), &connection).unwrap();
        tag_transactions_before(report.id, fixture.account.id, report.cutoff_date, &connection)
            .unwrap();

        assert_eq!(fail_report(report.id, "disk full", &connection), Ok(true));

        let report = get_report(report.id, &connection).unwrap();
        assert_eq!(report.status, ReportStatus::Failed);
        assert_eq!(report.failure_reason.as_deref(), Some("disk full"));
        assert_eq!(count_report_transactions(report.id, &connection), Ok(1));
        assert_eq!(mark_report_completed(report.id, &connection), Ok(false));
    }

    #[test]
    fn artifact_round_trip() {
        let connection = get_test_connection();
        let fixture = create_fixture(&connection);
        let report = create_report(fixture.account.id, date!(2026 - 04 - 17), &connection).unwrap();

        assert_eq!(has_artifact(report.id, &connection), Ok(false));
        assert_eq!(
            get_artifact(report.id, &connection),
            Err(Error::ArtifactUnavailable(report.id))
        );

        attach_artifact(
            report.id,
            &report.artifact_filename(),
            "text/csv",
            b"ID\n",
            &connection,
        )
        .unwrap();

        assert_eq!(has_artifact(report.id, &connection), Ok(true));
        let artifact = get_artifact(report.id, &connection).unwrap();
        assert_eq!(
            artifact.filename,
            format!("transactions_report_{}_2026-04-17.csv", report.id)
        );
        assert_eq!(artifact.data, b"ID\n");
    }

    #[test]
    fn get_artifact_for_missing_report_returns_not_found() {
        let connection = get_test_connection();

        assert_eq!(get_artifact(7, &connection), Err(Error::NotFound));
    }

    #[test]
    fn mark_email_sent_leaves_status_alone() {
        let connection = get_test_connection();
        let fixture = create_fixture(&connection);
        let report = create_report(fixture.account.id, date!(2026 - 04 - 17), &connection).unwrap();
        let sent_at = OffsetDateTime::now_utc();

        mark_email_sent(report.id, sent_at, &connection).unwrap();

        let report = get_report(report.id, &connection).unwrap();
        assert!(report.email_sent);
        assert!(report.email_sent_at.is_some());
        assert_eq!(report.status, ReportStatus::InProcess);
    }

    #[test]
    fn account_reports_are_newest_first() {
        let connection = get_test_connection();
        let fixture = create_fixture(&connection);
        let older = create_report(fixture.account.id, date!(2026 - 03 - 17), &connection).unwrap();
        let newer = create_report(fixture.account.id, date!(2026 - 04 - 17), &connection).unwrap();

        let reports = get_account_reports(fixture.account.id, &connection).unwrap();

        assert_eq!(reports, vec![newer, older]);
    }

    #[test]
    fn unfinished_reports_are_in_process_or_unsent() {
        let connection = get_test_connection();
        let fixture = create_fixture(&connection);
        let pending = create_report(fixture.account.id, date!(2026 - 01 - 17), &connection).unwrap();
        let exported = create_report(fixture.account.id, date!(2026 - 02 - 17), &connection).unwrap();
        attach_artifact(exported.id, "exported.csv", "text/csv", b"ID\n", &connection).unwrap();
        let unsent = create_report(fixture.account.id, date!(2026 - 03 - 17), &connection).unwrap();
        attach_artifact(unsent.id, "unsent.csv", "text/csv", b"ID\n", &connection).unwrap();
        mark_report_completed(unsent.id, &connection).unwrap();
        let done = create_report(fixture.account.id, date!(2026 - 04 - 17), &connection).unwrap();
        attach_artifact(done.id, "done.csv", "text/csv", b"ID\n", &connection).unwrap();
        mark_report_completed(done.id, &connection).unwrap();
        mark_email_sent(done.id, OffsetDateTime::now_utc(), &connection).unwrap();
        let failed = create_report(fixture.account.id, date!(2026 - 05 - 17), &connection).unwrap();
        fail_report(failed.id, "disk full", &connection).unwrap();

        let unfinished: Vec<_> = get_unfinished_reports(&connection)
            .unwrap()
            .into_iter()
            .map(|unfinished| (unfinished.report.id, unfinished.has_artifact))
            .collect();

        assert_eq!(
            unfinished,
            vec![(pending.id, false), (exported.id, true), (unsent.id, true)]
        );
    }
}
