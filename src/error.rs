use chrono::NaiveDate;
use thiserror::Error;

use crate::layout::MIN_SHEET_ROWS;

/// Reasons a single sheet cannot be turned into facts. None of these abort a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SheetError {
    #[error("sheet has {rows} rows, at least {} are required", MIN_SHEET_ROWS)]
    TooFewRows { rows: usize },
    #[error("no student rows found below the due-date row")]
    NoStudentRows,
    #[error("sheet could not be read: {0}")]
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("window start {start} is after cutoff {cutoff}")]
    WindowAfterCutoff { start: NaiveDate, cutoff: NaiveDate },
    #[error("window end {end} is after cutoff {cutoff}")]
    EndAfterCutoff { end: NaiveDate, cutoff: NaiveDate },
    #[error("window start {start} is after window end {end}")]
    EmptyWindow { start: NaiveDate, end: NaiveDate },
    #[error("unknown band table '{0}' (expected legacy-2024 or revised-2025)")]
    UnknownBandTable(String),
    #[error("unknown sheet name order '{0}' (expected auto, grade-first or section-first)")]
    UnknownSheetOrder(String),
}
