//! Writes the CSV file for a report.

use std::io::Write;

use rusqlite::Connection;

use crate::{
    Error,
    report::ReportId,
    transaction::{ExportCursor, ExportRow, get_export_page},
};

/// The header row of every report file.
pub const REPORT_HEADERS: [&str; 9] = [
    "ID",
    "Date",
    "Description",
    "Amount",
    "Account",
    "Budget",
    "Type",
    "Registered By",
    "Fixed",
];

/// Write the transactions tagged with `report_id` as CSV to `writer`.
///
/// Transactions are read `batch_size` rows at a time, newest first. The header
/// row is always written, so a report without transactions produces a file
/// with just the header.
///
/// Returns the writer once all rows have been flushed to it.
///
/// # Errors
/// This function will return a:
/// - [Error::ExportError] if a row could not be written,
/// - or [Error::SqlError] if the transactions could not be read.
pub fn write_report_csv<W: Write>(
    report_id: ReportId,
    batch_size: u32,
    writer: W,
    connection: &Connection,
) -> Result<W, Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(REPORT_HEADERS)?;

    let mut cursor = None;

    loop {
        let page = get_export_page(report_id, cursor, batch_size.max(1), connection)?;

        let Some(last) = page.last() else {
            break;
        };
        cursor = Some(ExportCursor {
            date: last.date,
            id: last.id,
        });

        for row in &page {
            csv_writer.write_record(to_record(row))?;
        }

        if page.len() < batch_size as usize {
            break;
        }
    }

    csv_writer
        .into_inner()
        .map_err(|error| Error::ExportError(error.to_string()))
}

/// Format an amount in minor units as a decimal string with two places, e.g. `-30.00`.
pub fn format_amount(minor_units: i64) -> String {
    let sign = if minor_units < 0 { "-" } else { "" };
    let absolute = minor_units.unsigned_abs();

    format!("{sign}{}.{:02}", absolute / 100, absolute % 100)
}

fn to_record(row: &ExportRow) -> [String; 9] {
    [
        row.id.to_string(),
        row.date.to_string(),
        row.description.clone(),
        format_amount(row.amount),
        row.account_name.clone(),
        row.budget_name.clone().unwrap_or_default(),
        row.kind.to_string(),
        row.registered_by.clone().unwrap_or_default(),
        row.fixed.to_string(),
    ]
}
