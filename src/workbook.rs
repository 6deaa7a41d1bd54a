use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use calamine::{open_workbook_auto, Data, Range, Reader};

use crate::config::AnalysisConfig;
use crate::eligibility::{self, SheetSource};
use crate::error::SheetError;
use crate::layout::{Cell, Grid};
use crate::models::{Batch, FileFailure, SheetWarning};
use crate::normalize;

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

pub type SheetRead = (String, Result<Grid, SheetError>);

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| file_label(path))
}

pub fn read_file(path: &Path) -> anyhow::Result<Vec<SheetRead>> {
    let ext = extension(path);
    if ext == "csv" {
        let grid = read_csv(path)?;
        return Ok(vec![(file_stem(path), Ok(grid))]);
    }
    if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        return read_workbook(path);
    }
    bail!("unsupported file type '.{ext}' (expected .csv, .xlsx, .xlsm, .xlsb, .xls or .ods)")
}

/// One CSV file is one sheet, named after the file.
pub fn read_csv(path: &Path) -> anyhow::Result<Grid> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("failed to read {}", path.display()))?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }
    Ok(Grid::from_text_rows(rows))
}

pub fn read_workbook(path: &Path) -> anyhow::Result<Vec<SheetRead>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.display()))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let grid = workbook
            .worksheet_range(&name)
            .map(|range| range_to_grid(&range))
            .map_err(|e| SheetError::Unreadable(e.to_string()));
        sheets.push((name, grid));
    }
    Ok(sheets)
}

/// calamine ranges start at the first used cell; pad so row 0 is sheet row 1.
fn range_to_grid(range: &Range<Data>) -> Grid {
    let (row_offset, col_offset) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); row_offset];
    for row in range.rows() {
        let mut cells = vec![Cell::Empty; col_offset];
        cells.extend(row.iter().map(data_to_cell));
        rows.push(cells);
    }
    Grid::new(rows)
}

fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Error(e) => Cell::Error(e.to_string()),
        Data::String(s) if s.trim().is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => normalize::date_from_serial(dt.as_f64())
            .map(Cell::Date)
            .unwrap_or(Cell::Empty),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

/// Parses every sheet of every file. Unreadable files and broken sheets are
/// recorded on the batch and never stop the remaining work.
pub fn ingest_files(paths: &[PathBuf], config: &AnalysisConfig) -> Batch {
    let mut batch = Batch::default();
    for path in paths {
        let file = file_label(path);
        match read_file(path) {
            Ok(sheets) => {
                log::info!("read {} sheets from {}", sheets.len(), file);
                ingest_sheets(&mut batch, &file, &file_stem(path), sheets, config);
            }
            Err(e) => {
                log::warn!("skipping {}: {:#}", file, e);
                batch.failures.push(FileFailure {
                    file,
                    message: format!("{e:#}"),
                });
            }
        }
    }
    batch
}

fn push_warning(batch: &mut Batch, file: &str, sheet: &str, message: String) {
    batch.warnings.push(SheetWarning {
        file: file.to_string(),
        sheet: Some(sheet.to_string()),
        message,
    });
}

pub fn ingest_sheets(
    batch: &mut Batch,
    file: &str,
    week: &str,
    sheets: Vec<SheetRead>,
    config: &AnalysisConfig,
) {
    let strategy = config.sheet_name_order.strategy();

    for (sheet_name, grid) in sheets {
        let source = SheetSource {
            file,
            sheet_name: &sheet_name,
            week,
        };
        let parsed =
            grid.and_then(|g| eligibility::parse_sheet(&g, &source, config, strategy.as_ref()));
        match parsed {
            Ok(parsed) => {
                log::debug!(
                    "{} / {}: {} students, {} assessment columns",
                    file,
                    sheet_name,
                    parsed.facts.students.len(),
                    parsed.facts.assessments.len()
                );
                for message in parsed.warnings {
                    push_warning(batch, file, &sheet_name, message);
                }
                batch.sheets.push(parsed.facts);
            }
            Err(e) => {
                log::warn!("skipping sheet '{}' in {}: {}", sheet_name, file, e);
                push_warning(batch, file, &sheet_name, e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::CellErrorType;
    use chrono::NaiveDate;
    use std::io::Write;

    fn config() -> AnalysisConfig {
        AnalysisConfig::for_cutoff(NaiveDate::from_ymd_opt(2025, 10, 22).unwrap())
    }

    fn write_csv(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    const SHEET: &str = "\
Students,M,I,AB,X,Overall,-,Quiz 1,Quiz 2,Notes
,,,,,,,Homework,Homework,
,,,,,,,2025-10-01,2025-11-01,
Avery Lee,,,,,,,80,90,late
Jules Moreno,,,,,,,M,,
";

    #[test]
    fn csv_file_becomes_one_sheet_named_after_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "Math 03 1.csv", SHEET);

        let batch = ingest_files(&[path], &config());
        assert!(batch.failures.is_empty());
        assert_eq!(batch.sheets.len(), 1);
        let sheet = &batch.sheets[0];
        assert_eq!(sheet.sheet_name, "Math 03 1");
        assert_eq!(sheet.identity.subject, "Math");
        assert_eq!(sheet.assessments.len(), 2);
        assert_eq!(sheet.students[0].completion_rate, Some(100.0));
        assert_eq!(sheet.students[1].completion_rate, Some(0.0));
    }

    #[test]
    fn bad_files_and_sheets_do_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_csv(dir.path(), "Science 04 2.csv", SHEET);
        let short = write_csv(dir.path(), "Short 03 1.csv", "Students\n,\n");
        let unsupported = write_csv(dir.path(), "notes.txt", "hello");
        let missing = dir.path().join("missing.xlsx");

        let batch = ingest_files(&[unsupported, good, short, missing], &config());
        assert_eq!(batch.sheets.len(), 1);
        assert_eq!(batch.failures.len(), 2);
        assert!(batch
            .warnings
            .iter()
            .any(|w| w.sheet.as_deref() == Some("Short 03 1") && w.message.contains("rows")));
    }

    #[test]
    fn unreadable_sheet_is_reported_per_sheet() {
        let mut batch = Batch::default();
        ingest_sheets(
            &mut batch,
            "week1.xlsx",
            "week1",
            vec![(
                "Broken".to_string(),
                Err(SheetError::Unreadable("corrupt".to_string())),
            )],
            &config(),
        );
        assert!(batch.sheets.is_empty());
        assert_eq!(batch.warnings.len(), 1);
        assert!(batch.warnings[0].message.contains("corrupt"));
    }

    #[test]
    fn formula_errors_stay_distinct_from_blanks() {
        assert_eq!(
            data_to_cell(&Data::Error(CellErrorType::NA)),
            Cell::Error("#N/A".to_string())
        );
        assert_eq!(
            data_to_cell(&Data::Error(CellErrorType::Div0)).display(),
            "#DIV/0!"
        );
        assert_eq!(data_to_cell(&Data::String("  ".to_string())), Cell::Empty);
    }

    #[test]
    fn error_score_leaves_the_denominator() {
        let mut range: Range<Data> = Range::new((0, 0), (4, 8));
        range.set_value((0, 0), Data::String("Students".to_string()));
        range.set_value((0, 7), Data::String("Quiz 1".to_string()));
        range.set_value((0, 8), Data::String("Quiz 2".to_string()));
        range.set_value((2, 7), Data::String("2025-10-01".to_string()));
        range.set_value((2, 8), Data::Float(45935.0));
        range.set_value((3, 0), Data::String("Avery Lee".to_string()));
        range.set_value((3, 7), Data::Error(CellErrorType::NA));
        range.set_value((3, 8), Data::Int(7));
        range.set_value((4, 0), Data::String("Jules Moreno".to_string()));

        let mut batch = Batch::default();
        ingest_sheets(
            &mut batch,
            "week6.xlsx",
            "week6",
            vec![("Math 03 1".to_string(), Ok(range_to_grid(&range)))],
            &config(),
        );
        let students = &batch.sheets[0].students;
        assert_eq!(students[0].total_due, 1);
        assert_eq!(students[0].excluded, 1);
        assert_eq!(students[0].completion_rate, Some(100.0));
        assert_eq!(students[1].total_due, 2);
        assert_eq!(students[1].completion_rate, Some(0.0));
    }

    #[test]
    fn range_offsets_are_preserved() {
        let mut range: Range<Data> = Range::new((1, 2), (1, 3));
        range.set_value((1, 2), Data::String("Quiz".to_string()));
        range.set_value((1, 3), Data::Float(5.0));
        let grid = range_to_grid(&range);
        assert_eq!(grid.row_count(), 2);
        assert_eq!(grid.cell(1, 2), &Cell::Text("Quiz".to_string()));
        assert_eq!(grid.cell(1, 3), &Cell::Number(5.0));
        assert_eq!(grid.cell(0, 0), &Cell::Empty);
    }
}
