//! Per-cell eligibility and completion, and per-sheet fact building.

use chrono::NaiveDate;

use crate::config::AnalysisConfig;
use crate::error::SheetError;
use crate::layout::{
    self, Cell, ColumnLayout, Grid, CATEGORY_ROW, DUE_DATE_ROW, FIRST_STUDENT_ROW,
};
use crate::models::{
    AssessmentColumn, Batch, CellDetail, CellStatus, SheetFacts, StudentAssessmentRecord,
};
use crate::normalize::{self, DateOptions};
use crate::sheet_name::{self, GradeSectionStrategy};

/// Eligible and due, but nothing handed in.
pub const MISSING_TOKEN: &str = "M";
/// Incomplete, absent, exempt: the assessment does not count for this student.
pub const EXCLUDED_TOKENS: &[&str] = &["I", "AB", "X"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityWindow {
    pub start: Option<NaiveDate>,
    pub cutoff: NaiveDate,
}

impl EligibilityWindow {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            start: config.window_start,
            cutoff: config.cutoff,
        }
    }

    pub fn contains(&self, due: NaiveDate) -> bool {
        due <= self.cutoff && self.start.map_or(true, |start| due >= start)
    }
}

pub fn due_date_of(cell: &Cell, opts: &DateOptions) -> Option<NaiveDate> {
    match cell {
        Cell::Date(d) => Some(*d),
        Cell::Text(s) => normalize::parse_due_date(s, opts),
        Cell::Number(n) => normalize::date_from_serial(*n),
        Cell::Empty | Cell::Error(_) => None,
    }
}

/// Status of a value in an eligible column. Anything that is not blank, a
/// sentinel or a formula error counts as a submission, numeric or not.
pub fn classify_value(cell: &Cell) -> CellStatus {
    let text = match cell {
        Cell::Empty => return CellStatus::NotSubmitted,
        Cell::Error(_) => return CellStatus::Excluded,
        Cell::Number(_) | Cell::Date(_) => return CellStatus::Completed,
        Cell::Text(_) if cell.is_blank() => return CellStatus::NotSubmitted,
        Cell::Text(text) => text,
    };
    let token = text.trim().to_uppercase();
    if token == MISSING_TOKEN {
        CellStatus::NotSubmitted
    } else if EXCLUDED_TOKENS.contains(&token.as_str()) {
        CellStatus::Excluded
    } else {
        CellStatus::Completed
    }
}

/// `None` when the column does not count in this pass at all.
pub fn classify_cell(
    due: Option<NaiveDate>,
    window: &EligibilityWindow,
    cell: &Cell,
) -> Option<CellStatus> {
    let due = due?;
    if !window.contains(due) {
        return None;
    }
    Some(classify_value(cell))
}

pub fn round_rate(rate: f64) -> f64 {
    (rate * 100.0).round() / 100.0
}

pub fn completion_rate(completed: usize, total_due: usize) -> Option<f64> {
    if total_due == 0 {
        None
    } else {
        Some(round_rate(100.0 * completed as f64 / total_due as f64))
    }
}

impl StudentAssessmentRecord {
    /// Counts are derived from the cells; excluded cells never enter `total_due`.
    pub fn from_cells(student_name: String, row: usize, cells: Vec<CellDetail>) -> Self {
        let count = |status: CellStatus| cells.iter().filter(|c| c.status == status).count();
        let completed = count(CellStatus::Completed);
        let not_submitted = count(CellStatus::NotSubmitted);
        let excluded = count(CellStatus::Excluded);
        let total_due = completed + not_submitted;

        Self {
            student_name,
            row,
            total_due,
            completed,
            not_submitted,
            excluded,
            has_due: total_due > 0,
            completion_rate: completion_rate(completed, total_due),
            cells,
        }
    }

    /// Recomputes the record for a narrower date range using the kept cell detail.
    pub fn within_window(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        let cells = self
            .cells
            .iter()
            .filter(|c| start.map_or(true, |s| c.due_date >= s))
            .filter(|c| end.map_or(true, |e| c.due_date <= e))
            .cloned()
            .collect();
        Self::from_cells(self.student_name.clone(), self.row, cells)
    }
}

impl SheetFacts {
    pub fn within_window(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self {
            students: self
                .students
                .iter()
                .map(|s| s.within_window(start, end))
                .collect(),
            ..self.clone()
        }
    }
}

impl Batch {
    pub fn within_window(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self {
            sheets: self
                .sheets
                .iter()
                .map(|s| s.within_window(start, end))
                .collect(),
            ..self.clone()
        }
    }
}

pub fn read_assessment_columns(
    grid: &Grid,
    layout: &ColumnLayout,
    opts: &DateOptions,
) -> Vec<AssessmentColumn> {
    layout::assessment_column_indices(grid, layout)
        .into_iter()
        .map(|col| {
            let category = grid.cell(CATEGORY_ROW, col).display();
            AssessmentColumn {
                column: col,
                title: grid.header(col),
                category: (!category.is_empty()).then_some(category),
                due_date: due_date_of(grid.cell(DUE_DATE_ROW, col), opts),
            }
        })
        .collect()
}

pub fn build_student_record(
    grid: &Grid,
    row: usize,
    student_name: String,
    columns: &[AssessmentColumn],
    window: &EligibilityWindow,
) -> StudentAssessmentRecord {
    let cells = columns
        .iter()
        .filter_map(|column| {
            let cell = grid.cell(row, column.column);
            let status = classify_cell(column.due_date, window, cell)?;
            Some(CellDetail {
                title: column.title.clone(),
                due_date: column.due_date?,
                raw_value: cell.display(),
                status,
            })
        })
        .collect();
    StudentAssessmentRecord::from_cells(student_name, row, cells)
}

/// A repeated label row ("Students") under the due dates is not a student.
fn is_label_row(name: &str, header: &str) -> bool {
    name.eq_ignore_ascii_case(header.trim())
        || ["students", "student", "اسم الطالب"]
            .iter()
            .any(|label| name.eq_ignore_ascii_case(label))
}

/// Narrows a batch parsed against the cutoff down to the configured window end.
pub fn apply_window_end(batch: Batch, config: &AnalysisConfig) -> Batch {
    match config.window_end {
        Some(end) if end < config.cutoff => batch.within_window(config.window_start, Some(end)),
        _ => batch,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSheet {
    pub facts: SheetFacts,
    pub warnings: Vec<String>,
}

pub struct SheetSource<'a> {
    pub file: &'a str,
    pub sheet_name: &'a str,
    pub week: &'a str,
}

pub fn parse_sheet(
    grid: &Grid,
    source: &SheetSource<'_>,
    config: &AnalysisConfig,
    strategy: &dyn GradeSectionStrategy,
) -> Result<ParsedSheet, SheetError> {
    let layout = layout::locate_columns(grid)?;
    let columns = read_assessment_columns(grid, &layout, &config.date_options());
    let window = EligibilityWindow::from_config(config);
    let name_header = grid.header(layout.student_column);

    let students: Vec<StudentAssessmentRecord> = (FIRST_STUDENT_ROW..grid.row_count())
        .filter_map(|row| {
            let name = normalize::normalize_name(&grid.cell(row, layout.student_column).display());
            if name.is_empty() || is_label_row(&name, &name_header) {
                return None;
            }
            Some(build_student_record(grid, row, name, &columns, &window))
        })
        .collect();

    if students.is_empty() {
        return Err(SheetError::NoStudentRows);
    }

    let mut warnings = Vec::new();
    let parsed_name = sheet_name::parse_sheet_name(source.sheet_name, strategy);
    if let Some(ambiguity) = parsed_name.ambiguity {
        warnings.push(ambiguity);
    }
    if columns.is_empty() {
        warnings.push("no assessment columns found".to_string());
    } else {
        let undated = columns.iter().filter(|c| c.due_date.is_none()).count();
        if undated > 0 {
            warnings.push(format!(
                "{undated} of {} assessment columns have no readable due date and were skipped",
                columns.len()
            ));
        }
    }

    Ok(ParsedSheet {
        facts: SheetFacts {
            file: source.file.to_string(),
            sheet_name: source.sheet_name.to_string(),
            identity: parsed_name.identity,
            week: source.week.to_string(),
            assessments: columns,
            students,
        },
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet_name::LeadingZeroStrategy;

    const CUTOFF: (i32, u32, u32) = (2025, 10, 22);

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig::for_cutoff(date(CUTOFF.0, CUTOFF.1, CUTOFF.2))
    }

    /// Seven administrative columns, then one column per (title, due date).
    fn sheet(assessments: &[(&str, &str)], students: &[(&str, &[&str])]) -> Grid {
        let admin = ["Students", "M", "I", "AB", "X", "Overall", "-"];
        let mut titles: Vec<String> = admin.iter().map(|s| s.to_string()).collect();
        let mut categories = vec![String::new(); admin.len()];
        let mut dues = vec![String::new(); admin.len()];
        for (title, due) in assessments {
            titles.push(title.to_string());
            categories.push("Homework".to_string());
            dues.push(due.to_string());
        }
        let mut rows = vec![titles, categories, dues];
        for (name, values) in students {
            let mut row = vec![name.to_string()];
            row.extend(std::iter::repeat(String::new()).take(admin.len() - 1));
            row.extend(values.iter().map(|v| v.to_string()));
            rows.push(row);
        }
        Grid::from_text_rows(rows)
    }

    fn parse(grid: &Grid) -> ParsedSheet {
        let source = SheetSource {
            file: "week1.xlsx",
            sheet_name: "Math 03 1",
            week: "week1",
        };
        parse_sheet(grid, &source, &config(), &LeadingZeroStrategy).unwrap()
    }

    #[test]
    fn future_assessments_do_not_count() {
        let grid = sheet(
            &[("Quiz 1", "2025-10-21"), ("Quiz 2", "2025-10-23")],
            &[("Avery Lee", &["80", "90"])],
        );
        let record = &parse(&grid).facts.students[0];
        assert_eq!(record.total_due, 1);
        assert_eq!(record.completed, 1);
        assert_eq!(record.not_submitted, 0);
        assert_eq!(record.completion_rate, Some(100.0));
        assert!(record.has_due);
    }

    #[test]
    fn excluded_token_leaves_the_denominator() {
        let grid = sheet(
            &[("Quiz 1", "2025-10-21"), ("Quiz 2", "2025-10-21")],
            &[("Avery Lee", &["M", "I"])],
        );
        let record = &parse(&grid).facts.students[0];
        assert_eq!(record.total_due, 1);
        assert_eq!(record.completed, 0);
        assert_eq!(record.not_submitted, 1);
        assert_eq!(record.excluded, 1);
        assert_eq!(record.completion_rate, Some(0.0));
        assert_eq!(record.cells[1].status, CellStatus::Excluded);
    }

    #[test]
    fn nothing_due_yields_absent_rate() {
        let grid = sheet(
            &[("Quiz 1", "2025-11-01"), ("Quiz 2", "2025-12-01")],
            &[("Avery Lee", &["80", "90"])],
        );
        let record = &parse(&grid).facts.students[0];
        assert!(!record.has_due);
        assert_eq!(record.total_due, 0);
        assert_eq!(record.completion_rate, None);
    }

    #[test]
    fn exclusion_is_decided_per_student_not_per_column() {
        let grid = sheet(
            &[("Quiz 1", "2025-10-01")],
            &[("Avery Lee", &["ab"]), ("Jules Moreno", &[""])],
        );
        let facts = parse(&grid).facts;
        assert_eq!(facts.students[0].total_due, 0);
        assert_eq!(facts.students[1].total_due, 1);
        assert_eq!(facts.students[1].not_submitted, 1);
    }

    #[test]
    fn counts_always_add_up_when_something_is_due() {
        let grid = sheet(
            &[
                ("Quiz 1", "2025-10-01"),
                ("Quiz 2", "Oct 5"),
                ("Quiz 3", "سبتمبر 30"),
                ("Quiz 4", "not a date"),
            ],
            &[
                ("A", &["10", "M", "X", "5"]),
                ("B", &["done", "", "-", "5"]),
                ("C", &["I", "AB", "x", "5"]),
            ],
        );
        let parsed = parse(&grid);
        for record in &parsed.facts.students {
            if record.has_due {
                assert_eq!(record.completed + record.not_submitted, record.total_due);
            } else {
                assert_eq!(record.completion_rate, None);
            }
        }
        assert_eq!(parsed.facts.students[1].completed, 1);
        assert_eq!(parsed.facts.students[1].total_due, 3);
        assert_eq!(parsed.facts.students[1].completion_rate, Some(33.33));
        assert!(parsed
            .warnings
            .iter()
            .any(|w| w.contains("no readable due date")));
    }

    #[test]
    fn window_start_drops_earlier_assessments() {
        let grid = sheet(
            &[("Quiz 1", "2025-09-01"), ("Quiz 2", "2025-10-15")],
            &[("Avery Lee", &["", "90"])],
        );
        let mut cfg = config();
        cfg.window_start = Some(date(2025, 10, 1));
        let source = SheetSource {
            file: "f.xlsx",
            sheet_name: "Math 03 1",
            week: "w",
        };
        let parsed = parse_sheet(&grid, &source, &cfg, &LeadingZeroStrategy).unwrap();
        let record = &parsed.facts.students[0];
        assert_eq!(record.total_due, 1);
        assert_eq!(record.completion_rate, Some(100.0));
    }

    #[test]
    fn narrowing_the_window_recomputes_from_cells() {
        let grid = sheet(
            &[("Quiz 1", "2025-09-01"), ("Quiz 2", "2025-10-15")],
            &[("Avery Lee", &["", "90"])],
        );
        let record = parse(&grid).facts.students[0].clone();
        assert_eq!(record.completion_rate, Some(50.0));

        let october = record.within_window(Some(date(2025, 10, 1)), None);
        assert_eq!(october.total_due, 1);
        assert_eq!(october.completion_rate, Some(100.0));

        let empty = record.within_window(None, Some(date(2025, 8, 1)));
        assert!(!empty.has_due);
        assert_eq!(empty.completion_rate, None);
    }

    #[test]
    fn window_end_narrows_a_parsed_batch() {
        let grid = sheet(
            &[("Quiz 1", "2025-09-01"), ("Quiz 2", "2025-10-15")],
            &[("Avery Lee", &["", "90"]), ("Jules Moreno", &["7", "I"])],
        );
        let batch = Batch {
            sheets: vec![parse(&grid).facts],
            ..Batch::default()
        };

        let mut cfg = config();
        cfg.window_end = Some(date(2025, 9, 30));
        let september = apply_window_end(batch.clone(), &cfg);
        let avery = &september.sheets[0].students[0];
        assert_eq!(avery.total_due, 1);
        assert_eq!(avery.completion_rate, Some(0.0));
        let jules = &september.sheets[0].students[1];
        assert_eq!(jules.excluded, 0);
        assert_eq!(jules.completion_rate, Some(100.0));

        cfg.window_end = None;
        assert_eq!(apply_window_end(batch.clone(), &cfg), batch);
    }

    #[test]
    fn label_rows_and_blank_names_are_skipped() {
        let grid = sheet(
            &[("Quiz 1", "2025-10-01")],
            &[("Students", &["Score"]), ("   ", &["1"]), ("Avery   Lee", &["1"])],
        );
        let facts = parse(&grid).facts;
        assert_eq!(facts.students.len(), 1);
        assert_eq!(facts.students[0].student_name, "Avery Lee");
        assert_eq!(facts.identity.grade.as_deref(), Some("3"));
        assert_eq!(facts.assessments[0].category.as_deref(), Some("Homework"));
    }

    #[test]
    fn sheet_without_students_is_a_structural_error() {
        let grid = sheet(&[("Quiz 1", "2025-10-01")], &[("", &["1"])]);
        let source = SheetSource {
            file: "f.xlsx",
            sheet_name: "Math",
            week: "w",
        };
        assert_eq!(
            parse_sheet(&grid, &source, &config(), &LeadingZeroStrategy),
            Err(SheetError::NoStudentRows)
        );
    }

    #[test]
    fn numeric_and_date_cells_count_as_submissions() {
        assert_eq!(classify_value(&Cell::Number(0.0)), CellStatus::Completed);
        assert_eq!(
            classify_value(&Cell::Date(date(2025, 1, 1))),
            CellStatus::Completed
        );
        assert_eq!(classify_value(&Cell::Empty), CellStatus::NotSubmitted);
        assert_eq!(classify_value(&Cell::text(" m ")), CellStatus::NotSubmitted);
        assert_eq!(classify_value(&Cell::text("Ab")), CellStatus::Excluded);
    }

    #[test]
    fn formula_errors_are_excluded_not_missing() {
        let error = Cell::Error("#DIV/0!".to_string());
        assert_eq!(classify_value(&error), CellStatus::Excluded);
        assert_eq!(due_date_of(&error, &config().date_options()), None);
    }

    #[test]
    fn unformatted_serial_due_dates_are_read() {
        let opts = config().date_options();
        assert_eq!(due_date_of(&Cell::Number(45931.0), &opts), Some(date(2025, 10, 1)));
        // Max marks in the due-date row are not dates.
        assert_eq!(due_date_of(&Cell::Number(20.0), &opts), None);
    }
}
