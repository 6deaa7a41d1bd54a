//! Raw sheet grids and the structural column locator.
//!
//! Exports follow a fixed physical convention: row 1 holds assessment titles,
//! row 2 categories, row 3 due dates, and student rows start at row 4. The
//! columns, however, move around between export batches, so the name column
//! and the first assessment column are located from the header text.

use chrono::NaiveDate;

use crate::error::SheetError;

pub const MIN_SHEET_ROWS: usize = 4;
pub const TITLE_ROW: usize = 0;
pub const CATEGORY_ROW: usize = 1;
pub const DUE_DATE_ROW: usize = 2;
pub const FIRST_STUDENT_ROW: usize = 3;

/// Assessments start at column H unless an aggregate column sits later.
pub const DEFAULT_ASSESSMENT_START: usize = 7;

const STUDENT_MARKERS: &[&str] = &["student", "اسم"];
const AGGREGATE_MARKERS: &[&str] = &["overall", "إجمالي", "المجموع"];
const ADMIN_MARKERS: &[&str] = &["notes", "ملاحظات", "unnamed"];

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    /// A formula error such as `#N/A`, kept as written.
    Error(String),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => crate::normalize::is_blank(s),
            Cell::Number(_) | Cell::Date(_) | Cell::Error(_) => false,
        }
    }

    /// Display form used for titles, names and the raw value kept in cell detail.
    pub fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
            Cell::Date(d) => d.to_string(),
            Cell::Error(e) => e.clone(),
        }
    }
}

/// A sheet as read from disk: rows of cells, ragged rows allowed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    rows: Vec<Vec<Cell>>,
}

impl Grid {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// Builds a grid from plain strings; blank strings become `Cell::Empty`.
    pub fn from_text_rows<R, S>(rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|s| {
                        let s = s.as_ref();
                        if s.trim().is_empty() {
                            Cell::Empty
                        } else {
                            Cell::text(s)
                        }
                    })
                    .collect()
            })
            .collect();
        Self { rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        static EMPTY: Cell = Cell::Empty;
        self.rows.get(row).and_then(|r| r.get(col)).unwrap_or(&EMPTY)
    }

    pub fn header(&self, col: usize) -> String {
        self.cell(TITLE_ROW, col).display()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub student_column: usize,
    pub assessment_start: usize,
}

fn contains_marker(header: &str, markers: &[&str]) -> bool {
    let lowered = header.to_lowercase();
    markers.iter().any(|m| lowered.contains(m))
}

pub fn is_student_label(header: &str) -> bool {
    contains_marker(header, STUDENT_MARKERS)
}

fn is_aggregate_column(header: &str) -> bool {
    contains_marker(header, AGGREGATE_MARKERS)
}

/// Columns that never count as assessments, wherever they appear.
pub fn is_excluded_column(header: &str) -> bool {
    let trimmed = header.trim();
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("nan")
        || is_aggregate_column(trimmed)
        || contains_marker(trimmed, ADMIN_MARKERS)
}

pub fn find_student_column(grid: &Grid) -> usize {
    (0..grid.column_count())
        .find(|&col| is_student_label(&grid.header(col)))
        .unwrap_or(0)
}

pub fn find_assessment_start(grid: &Grid) -> usize {
    (0..DEFAULT_ASSESSMENT_START.min(grid.column_count()))
        .filter(|&col| is_aggregate_column(&grid.header(col)))
        .map(|col| col + 1)
        .fold(DEFAULT_ASSESSMENT_START, usize::max)
}

pub fn locate_columns(grid: &Grid) -> Result<ColumnLayout, SheetError> {
    if grid.row_count() < MIN_SHEET_ROWS {
        return Err(SheetError::TooFewRows {
            rows: grid.row_count(),
        });
    }
    Ok(ColumnLayout {
        student_column: find_student_column(grid),
        assessment_start: find_assessment_start(grid),
    })
}

/// Columns from the assessment start onward that are not administrative.
pub fn assessment_column_indices(grid: &Grid, layout: &ColumnLayout) -> Vec<usize> {
    (layout.assessment_start..grid.column_count())
        .filter(|&col| col != layout.student_column && !is_excluded_column(&grid.header(col)))
        .collect()
}
