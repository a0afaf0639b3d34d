//! Filename date extraction and destination layout.
//!
//! Files are classified by a `yyyyMMdd` prefix in their name. Some devices put
//! a fixed token in front of the date, so those camera prefixes are stripped
//! before the prefix is read.

use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

/// Tokens some cameras prepend to the capture date, matched case-insensitively.
pub const CAMERA_PREFIXES: &[&str] = &["IMG_", "SNOW_"];

/// Length of the `yyyyMMdd` prefix.
pub const DATE_PREFIX_LEN: usize = 8;

/// Why no date could be read from a filename.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    /// Name has fewer characters than a date prefix
    #[error("'{0}' does not start with yyyyMMdd")]
    TooShort(String),

    /// Prefix is not a real `yyyyMMdd` date
    #[error("'{0}' has an invalid date format")]
    InvalidFormat(String),
}

/// Return the eight characters a date should be read from.
///
/// Leading camera prefixes are stripped first, stacked ones included. A name shorter than eight characters
/// is `TooShort`; a stripped remainder shorter than eight characters is
/// `InvalidFormat`.
pub fn date_prefix(file_name: &str) -> Result<String, DateError> {
    if file_name.chars().count() < DATE_PREFIX_LEN {
        return Err(DateError::TooShort(file_name.to_string()));
    }

    let rest = strip_camera_prefixes(file_name);
    let prefix: String = rest.chars().take(DATE_PREFIX_LEN).collect();
    if prefix.chars().count() < DATE_PREFIX_LEN {
        return Err(DateError::InvalidFormat(file_name.to_string()));
    }

    Ok(prefix)
}

/// Parse the capture date encoded at the start of `file_name`.
pub fn extract_date(file_name: &str) -> Result<NaiveDate, DateError> {
    let prefix = date_prefix(file_name)?;
    parse_date_prefix(&prefix).ok_or_else(|| DateError::InvalidFormat(file_name.to_string()))
}

fn strip_camera_prefixes(file_name: &str) -> &str {
    let mut rest = file_name;
    while let Some(stripped) = CAMERA_PREFIXES
        .iter()
        .find_map(|camera| strip_prefix_ignore_case(rest, camera))
    {
        rest = stripped;
    }
    rest
}

fn strip_prefix_ignore_case<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let head = name.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        name.get(prefix.len()..)
    } else {
        None
    }
}

/// Parse exactly eight ASCII digits as a `yyyyMMdd` date.
///
/// Year 0000, months outside 1-12 and days outside 1-31 are rejected. A day
/// past the end of its month resolves to that month's last day, so
/// `20230230` reads as 2023-02-28.
pub fn parse_date_prefix(prefix: &str) -> Option<NaiveDate> {
    if prefix.len() != DATE_PREFIX_LEN || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let year: i32 = prefix[0..4].parse().ok()?;
    let month: u32 = prefix[4..6].parse().ok()?;
    let day: u32 = prefix[6..8].parse().ok()?;
    if year == 0 || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    (1..=day).rev().find_map(|d| NaiveDate::from_ymd_opt(year, month, d))
}

/// `yyyy/yyyy_MM` relative folder for a date.
pub fn dated_folder(date: NaiveDate) -> PathBuf {
    let year = format!("{:04}", date.year());
    let month = format!("{}_{:02}", year, date.month());
    PathBuf::from(year).join(month)
}

/// `base/yyyy/yyyy_MM`.
pub fn dated_dir(base: &Path, date: NaiveDate) -> PathBuf {
    base.join(dated_folder(date))
}

/// `yyyy/MM` label used in progress messages.
pub fn date_label(date: NaiveDate) -> String {
    format!("{:04}/{:02}", date.year(), date.month())
}
