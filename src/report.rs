use std::fmt::Write;

use crate::band::{Band, BandDistribution, BandTable, BandTableId};
use crate::config::AnalysisConfig;
use crate::models::{Batch, ClassStats, CohortReport, SubjectAverage};
use crate::rollup;

fn table_label(id: BandTableId) -> &'static str {
    match id {
        BandTableId::Legacy2024 => "legacy 2024",
        BandTableId::Revised2025 => "revised 2025",
    }
}

fn class_label(stats: &ClassStats) -> String {
    if stats.identity.class_code.is_empty() {
        stats.identity.subject.clone()
    } else {
        format!("{} {}", stats.identity.subject, stats.identity.class_code)
    }
}

fn write_distribution(output: &mut String, distribution: &BandDistribution) {
    if distribution.total() == 0 {
        let _ = writeln!(output, "No students with eligible assessments.");
        return;
    }
    for (band, count) in distribution.iter() {
        let _ = writeln!(
            output,
            "- {} ({}): {} ({:.1}%)",
            band.label(),
            band.arabic_label(),
            count,
            distribution.share(band)
        );
    }
}

fn write_subjects(output: &mut String, subjects: &[SubjectAverage]) {
    if subjects.is_empty() {
        let _ = writeln!(output, "No classes with eligible assessments.");
        return;
    }
    for subject in subjects {
        let _ = writeln!(
            output,
            "- {} {} ({}): {:.2}% across {} students",
            subject.subject,
            subject.class_code,
            subject.sheet_name,
            subject.mean_completion,
            subject.eligible_students
        );
    }
}

pub fn build_report(config: &AnalysisConfig, batch: &Batch) -> String {
    let table = BandTable::for_id(config.band_table);
    let kpis = rollup::school_kpis(batch, &table);
    let mut output = String::new();

    let _ = writeln!(output, "# Assessment Completion Report");
    let end = config.window_end.unwrap_or(config.cutoff);
    match config.window_start {
        Some(start) => {
            let _ = writeln!(
                output,
                "Assessments due {} to {} ({} bands)",
                start,
                end,
                table_label(config.band_table)
            );
        }
        None => {
            let _ = writeln!(
                output,
                "Assessments due on or before {} ({} bands)",
                end,
                table_label(config.band_table)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## School Overview");
    let _ = writeln!(output, "- Sheets analysed: {}", kpis.sheet_count);
    let _ = writeln!(
        output,
        "- Students with eligible work: {} ({} with nothing due)",
        kpis.total_students, kpis.unassessed_students
    );
    let _ = writeln!(
        output,
        "- Assessments completed: {} of {}",
        kpis.total_completed, kpis.total_eligible_assessments
    );
    let _ = writeln!(output, "- Mean student completion: {:.2}%", kpis.mean_completion);
    let _ = writeln!(output, "- Weighted completion: {:.2}%", kpis.weighted_completion);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Band Distribution");
    write_distribution(&mut output, &kpis.band_distribution);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Strongest Classes");
    write_subjects(&mut output, &kpis.best_subjects);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Weakest Classes");
    write_subjects(&mut output, &kpis.worst_subjects);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Grades");
    let grades = rollup::grade_summaries(batch);
    if grades.is_empty() {
        let _ = writeln!(output, "No graded classes found.");
    }
    for grade in grades {
        let _ = writeln!(
            output,
            "- Grade {}: {:.2}% mean over {} records ({} of {} completed)",
            grade.key, grade.mean_completion, grade.records, grade.completed, grade.total_due
        );
    }

    for sheet in &batch.sheets {
        let stats = rollup::class_stats(sheet, &table);
        let _ = writeln!(output);
        let _ = writeln!(output, "## {}", class_label(&stats));
        let _ = writeln!(
            output,
            "{} of {} students had work due, mean completion {:.2}%",
            stats.eligible_students, stats.total_students, stats.mean_completion
        );
        let platinum = stats.band_distribution.count(Band::Platinum);
        if platinum > 0 {
            let _ = writeln!(output, "{} students in the Platinum band.", platinum);
        }

        if stats.needs_attention.is_empty() {
            let _ = writeln!(output, "Nobody below {:.0}%.", rollup::NEEDS_ATTENTION_BELOW);
        } else {
            let _ = writeln!(output, "Needs attention:");
            for student in &stats.needs_attention {
                let _ = writeln!(
                    output,
                    "- {} {:.2}% ({})",
                    student.student_name,
                    student.completion_rate,
                    student.band.label()
                );
            }
        }
    }

    if !batch.warnings.is_empty() || !batch.failures.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Warnings");
        for failure in &batch.failures {
            let _ = writeln!(output, "- {}: {}", failure.file, failure.message);
        }
        for warning in &batch.warnings {
            match &warning.sheet {
                Some(sheet) => {
                    let _ = writeln!(output, "- {} / {}: {}", warning.file, sheet, warning.message);
                }
                None => {
                    let _ = writeln!(output, "- {}: {}", warning.file, warning.message);
                }
            }
        }
    }

    output
}

/// Appended to the digest when the run was narrowed to a set of classes.
pub fn build_cohort_section(cohort: &CohortReport) -> String {
    let mut output = String::new();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Selected Classes");

    if cohort.sheets.is_empty() {
        let _ = writeln!(output, "No sheets matched the selection.");
        return output;
    }

    let classes: Vec<String> = cohort
        .sheets
        .iter()
        .map(|identity| format!("{} {}", identity.subject, identity.class_code).trim().to_string())
        .collect();
    let _ = writeln!(output, "Classes: {}", classes.join(", "));
    let _ = writeln!(
        output,
        "{} students, {} of {} assessments completed ({:.2}%)",
        cohort.total_students, cohort.total_completed, cohort.total_due, cohort.weighted_completion
    );
    for (band, names) in &cohort.students_by_band {
        if names.is_empty() {
            continue;
        }
        let _ = writeln!(output, "- {}: {}", band.label(), names.join(", "));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Grid;
    use crate::models::SheetWarning;
    use crate::workbook;
    use chrono::NaiveDate;

    fn batch() -> (AnalysisConfig, Batch) {
        let config = AnalysisConfig::for_cutoff(NaiveDate::from_ymd_opt(2025, 10, 22).unwrap());
        let grid = Grid::from_text_rows(vec![
            vec!["Students", "", "", "", "", "", "", "Quiz 1", "Quiz 2"],
            vec!["", "", "", "", "", "", "", "Homework", "Classwork"],
            vec!["", "", "", "", "", "", "", "2025-10-01", "2025-10-08"],
            vec!["Avery Lee", "", "", "", "", "", "", "9", "8"],
            vec!["Jules Moreno", "", "", "", "", "", "", "M", ""],
        ]);
        let mut batch = Batch::default();
        workbook::ingest_sheets(
            &mut batch,
            "week6.xlsx",
            "week6",
            vec![("Math 03 1".to_string(), Ok(grid))],
            &config,
        );
        batch.warnings.push(SheetWarning {
            file: "week6.xlsx".to_string(),
            sheet: Some("Notes".to_string()),
            message: "sheet has 1 rows, at least 4 are required".to_string(),
        });
        (config, batch)
    }

    #[test]
    fn report_covers_overview_classes_and_warnings() {
        let (config, batch) = batch();
        let report = build_report(&config, &batch);

        assert!(report.starts_with("# Assessment Completion Report"));
        assert!(report.contains("on or before 2025-10-22 (revised 2025 bands)"));
        assert!(report.contains("- Assessments completed: 2 of 4"));
        assert!(report.contains("- Weighted completion: 50.00%"));
        assert!(report.contains("## Math 03/1"));
        assert!(report.contains("- Jules Moreno 0.00% (Non-participant)"));
        assert!(report.contains("- week6.xlsx / Notes: sheet has 1 rows"));
    }

    #[test]
    fn header_shows_the_narrowed_window_end() {
        let (mut config, batch) = batch();
        config.window_start = NaiveDate::from_ymd_opt(2025, 9, 1);
        config.window_end = NaiveDate::from_ymd_opt(2025, 10, 5);
        let batch = crate::eligibility::apply_window_end(batch, &config);
        let report = build_report(&config, &batch);

        assert!(report.contains("Assessments due 2025-09-01 to 2025-10-05 (revised 2025 bands)"));
        assert!(report.contains("- Assessments completed: 1 of 2"));
    }

    #[test]
    fn empty_batch_still_renders() {
        let config = AnalysisConfig::for_cutoff(NaiveDate::from_ymd_opt(2025, 10, 22).unwrap());
        let report = build_report(&config, &Batch::default());
        assert!(report.contains("No students with eligible assessments."));
        assert!(!report.contains("## Warnings"));
    }

    #[test]
    fn cohort_section_lists_students_by_band() {
        let (config, batch) = batch();
        let table = BandTable::for_id(config.band_table);
        let selection = batch.find_sheets(&["math".to_string()], &[]);
        let cohort = rollup::cohort_report(&batch, &selection, &table);
        let section = build_cohort_section(&cohort);

        assert!(section.contains("Classes: Math 03/1"));
        assert!(section.contains("2 students, 2 of 4 assessments completed (50.00%)"));
        assert!(section.contains("- Platinum: Avery Lee"));
        assert!(section.contains("- Non-participant: Jules Moreno"));
        assert!(!section.contains("- Gold"));
    }

    #[test]
    fn empty_cohort_says_so() {
        let (config, batch) = batch();
        let table = BandTable::for_id(config.band_table);
        let cohort = rollup::cohort_report(&batch, &[], &table);
        assert!(build_cohort_section(&cohort).contains("No sheets matched the selection."));
    }
}
