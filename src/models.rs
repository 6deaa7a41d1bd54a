use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::band::{Band, BandDistribution, Classification};
use crate::sheet_name::SheetIdentity;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentColumn {
    pub column: usize,
    pub title: String,
    pub category: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CellStatus {
    Completed,
    NotSubmitted,
    Excluded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellDetail {
    pub title: String,
    pub due_date: NaiveDate,
    pub raw_value: String,
    pub status: CellStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAssessmentRecord {
    pub student_name: String,
    /// Zero-based grid row, used to break ranking ties in sheet order.
    pub row: usize,
    pub total_due: usize,
    pub completed: usize,
    pub not_submitted: usize,
    pub excluded: usize,
    pub has_due: bool,
    /// `None` when nothing was due.
    pub completion_rate: Option<f64>,
    pub cells: Vec<CellDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetFacts {
    pub file: String,
    pub sheet_name: String,
    pub identity: SheetIdentity,
    pub week: String,
    pub assessments: Vec<AssessmentColumn>,
    pub students: Vec<StudentAssessmentRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetWarning {
    pub file: String,
    pub sheet: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub file: String,
    pub message: String,
}

/// Every sheet parsed from one set of uploaded files.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Batch {
    pub sheets: Vec<SheetFacts>,
    pub warnings: Vec<SheetWarning>,
    pub failures: Vec<FileFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectBreakdown {
    pub sheet_name: String,
    pub subject: String,
    pub class_code: String,
    pub total_due: usize,
    pub completed: usize,
    pub completion_rate: f64,
    pub band: Band,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentOverallFacts {
    pub student_name: String,
    pub total_due: usize,
    pub total_completed: usize,
    pub overall_completion_rate: f64,
    pub overall_band: Band,
    pub subjects: Vec<SubjectBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedStudent {
    pub student_name: String,
    pub completion_rate: f64,
    pub band: Band,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassStats {
    pub sheet_name: String,
    pub identity: SheetIdentity,
    pub total_students: usize,
    pub eligible_students: usize,
    pub mean_completion: f64,
    pub band_distribution: BandDistribution,
    pub top_performers: Vec<RankedStudent>,
    pub needs_attention: Vec<RankedStudent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectAverage {
    pub sheet_name: String,
    pub subject: String,
    pub class_code: String,
    pub eligible_students: usize,
    pub mean_completion: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchoolKpis {
    pub sheet_count: usize,
    /// Students with at least one eligible assessment.
    pub total_students: usize,
    pub unassessed_students: usize,
    pub total_eligible_assessments: usize,
    pub total_completed: usize,
    /// Mean of per-student overall rates.
    pub mean_completion: f64,
    /// Completed over due, pooled across every eligible record.
    pub weighted_completion: f64,
    pub band_distribution: BandDistribution,
    pub best_subjects: Vec<SubjectAverage>,
    pub worst_subjects: Vec<SubjectAverage>,
}

/// Record-level summary for one grade or one subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub key: String,
    pub records: usize,
    pub total_due: usize,
    pub completed: usize,
    pub mean_completion: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortStudent {
    pub student_name: String,
    pub subject: String,
    pub class_code: String,
    pub total_due: usize,
    pub completed: usize,
    pub not_submitted: usize,
    pub completion_rate: f64,
    pub classification: Classification,
}

/// Aggregate over a chosen subset of sheets, e.g. one instructor's classes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortReport {
    pub sheets: Vec<SheetIdentity>,
    pub records: Vec<CohortStudent>,
    pub total_students: usize,
    pub total_due: usize,
    pub total_completed: usize,
    pub weighted_completion: f64,
    pub band_distribution: BandDistribution,
    pub students_by_band: BTreeMap<Band, Vec<String>>,
}
