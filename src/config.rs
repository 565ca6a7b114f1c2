//! Settings that control how and when transactions are archived.

use time::{Date, Month};

use crate::{Error, timezone::local_today};

/// How many months of transactions are kept in full detail by default.
pub const DEFAULT_RETENTION_MONTHS: u32 = 6;

/// How many transactions are read from the database at a time when writing a report file.
pub const DEFAULT_EXPORT_BATCH_SIZE: u32 = 1000;

/// The settings for the archiver.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveConfig {
    /// Transactions older than this many months are archived.
    pub retention_months: u32,

    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    ///
    /// Used to decide what "today" is when computing cutoff dates and dating
    /// cutoff transactions.
    pub local_timezone: String,

    /// The number of rows read per query when exporting a report.
    pub export_batch_size: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            retention_months: DEFAULT_RETENTION_MONTHS,
            local_timezone: "Etc/UTC".to_owned(),
            export_batch_size: DEFAULT_EXPORT_BATCH_SIZE,
        }
    }
}

impl ArchiveConfig {
    /// Today's date in the configured timezone.
    ///
    /// # Errors
    /// Returns [Error::InvalidTimezoneError] if the configured timezone is not valid.
    pub fn today(&self) -> Result<Date, Error> {
        local_today(&self.local_timezone)
    }

    /// The cutoff date for reports generated on `today`.
    ///
    /// Transactions dated strictly before the cutoff date are archived.
    pub fn cutoff_date(&self, today: Date) -> Result<Date, Error> {
        months_before(today, self.retention_months)
    }
}

/// The date `months` calendar months before `date`.
///
/// The day of the month is clamped to the length of the target month, so
/// six months before 2025-08-31 is 2025-02-28.
///
/// # Errors
/// Returns [Error::InvalidDate] if the resulting date is out of range.
pub fn months_before(date: Date, months: u32) -> Result<Date, Error> {
    let month_index = date.year() * 12 + (date.month() as i32 - 1) - months as i32;
    let year = month_index.div_euclid(12);
    let month = Month::try_from((month_index.rem_euclid(12) + 1) as u8)
        .map_err(|error| Error::InvalidDate(error.to_string()))?;
    let day = date.day().min(month.length(year));

    Date::from_calendar_date(year, month, day).map_err(|error| Error::InvalidDate(error.to_string()))
}
