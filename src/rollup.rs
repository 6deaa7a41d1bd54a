//! Per-class, per-student and school-wide rollups.
//!
//! Who counts is decided once: a student-subject record participates only when
//! something was due (`has_due`). Everything that talks about students as
//! people (head-counts, band distributions beyond a single class) goes through
//! `student_overall`, so a student taking five subjects is counted once.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::band::{Band, BandDistribution, BandTable, Classification};
use crate::eligibility::{completion_rate, round_rate};
use crate::models::{
    Batch, ClassStats, CohortReport, CohortStudent, GroupSummary, RankedStudent, SchoolKpis,
    SheetFacts, StudentAssessmentRecord, StudentOverallFacts, SubjectAverage, SubjectBreakdown,
};

pub const TOP_LIST_LIMIT: usize = 10;
pub const NEEDS_ATTENTION_BELOW: f64 = 60.0;
pub const SUBJECT_LIST_LIMIT: usize = 5;

/// Records that count, paired with their (present) rate.
fn eligible(
    students: &[StudentAssessmentRecord],
) -> impl Iterator<Item = (&StudentAssessmentRecord, f64)> {
    students
        .iter()
        .filter(|s| s.has_due)
        .filter_map(|s| s.completion_rate.map(|rate| (s, rate)))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        round_rate(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn by_rate_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

pub fn class_stats(sheet: &SheetFacts, table: &BandTable) -> ClassStats {
    let mut ranked: Vec<(&StudentAssessmentRecord, f64)> = eligible(&sheet.students).collect();
    let rates: Vec<f64> = ranked.iter().map(|(_, rate)| *rate).collect();
    let band_distribution =
        BandDistribution::from_classifications(rates.iter().map(|r| table.classify(Some(*r))));

    let to_ranked = |(record, rate): &(&StudentAssessmentRecord, f64)| RankedStudent {
        student_name: record.student_name.clone(),
        completion_rate: *rate,
        band: table.band_for(*rate),
    };

    ranked.sort_by(|(a, ra), (b, rb)| by_rate_desc(*ra, *rb).then(a.row.cmp(&b.row)));
    let top_performers = ranked.iter().take(TOP_LIST_LIMIT).map(to_ranked).collect();

    let mut low: Vec<_> = ranked
        .iter()
        .filter(|(_, rate)| *rate < NEEDS_ATTENTION_BELOW)
        .copied()
        .collect();
    low.sort_by(|(a, ra), (b, rb)| by_rate_desc(*rb, *ra).then(a.row.cmp(&b.row)));
    let needs_attention = low.iter().take(TOP_LIST_LIMIT).map(to_ranked).collect();

    ClassStats {
        sheet_name: sheet.sheet_name.clone(),
        identity: sheet.identity.clone(),
        total_students: sheet.students.len(),
        eligible_students: rates.len(),
        mean_completion: mean(&rates),
        band_distribution,
        top_performers,
        needs_attention,
    }
}

#[derive(Default)]
struct OverallAccumulator {
    total_due: usize,
    total_completed: usize,
    subjects: Vec<SubjectBreakdown>,
}

pub fn student_overall(batch: &Batch, table: &BandTable) -> BTreeMap<String, StudentOverallFacts> {
    let mut acc: BTreeMap<String, OverallAccumulator> = BTreeMap::new();

    for sheet in &batch.sheets {
        for (record, rate) in eligible(&sheet.students) {
            let entry = acc.entry(record.student_name.clone()).or_default();
            entry.total_due += record.total_due;
            entry.total_completed += record.completed;
            entry.subjects.push(SubjectBreakdown {
                sheet_name: sheet.sheet_name.clone(),
                subject: sheet.identity.subject.clone(),
                class_code: sheet.identity.class_code.clone(),
                total_due: record.total_due,
                completed: record.completed,
                completion_rate: rate,
                band: table.band_for(rate),
            });
        }
    }

    acc.into_iter()
        .filter_map(|(name, a)| {
            let rate = completion_rate(a.total_completed, a.total_due)?;
            Some((
                name.clone(),
                StudentOverallFacts {
                    student_name: name,
                    total_due: a.total_due,
                    total_completed: a.total_completed,
                    overall_completion_rate: rate,
                    overall_band: table.band_for(rate),
                    subjects: a.subjects,
                },
            ))
        })
        .collect()
}

/// Names present somewhere in the batch with nothing due anywhere.
pub fn unassessed_students(batch: &Batch) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut assessed = BTreeSet::new();
    for record in batch.sheets.iter().flat_map(|s| s.students.iter()) {
        seen.insert(record.student_name.as_str());
        if record.has_due {
            assessed.insert(record.student_name.as_str());
        }
    }
    seen.difference(&assessed).map(|s| s.to_string()).collect()
}

pub fn school_kpis(batch: &Batch, table: &BandTable) -> SchoolKpis {
    let overall = student_overall(batch, table);
    let overall_rates: Vec<f64> = overall.values().map(|s| s.overall_completion_rate).collect();
    let band_distribution = BandDistribution::from_classifications(
        overall_rates.iter().map(|r| table.classify(Some(*r))),
    );

    let total_eligible_assessments: usize = overall.values().map(|s| s.total_due).sum();
    let total_completed: usize = overall.values().map(|s| s.total_completed).sum();

    let mut subjects: Vec<SubjectAverage> = batch
        .sheets
        .iter()
        .map(|sheet| class_stats(sheet, table))
        .filter(|stats| stats.eligible_students > 0)
        .map(|stats| SubjectAverage {
            sheet_name: stats.sheet_name,
            subject: stats.identity.subject,
            class_code: stats.identity.class_code,
            eligible_students: stats.eligible_students,
            mean_completion: stats.mean_completion,
        })
        .collect();

    subjects.sort_by(|a, b| by_rate_desc(a.mean_completion, b.mean_completion));
    let best_subjects = subjects.iter().take(SUBJECT_LIST_LIMIT).cloned().collect();
    subjects.sort_by(|a, b| by_rate_desc(b.mean_completion, a.mean_completion));
    let worst_subjects = subjects.iter().take(SUBJECT_LIST_LIMIT).cloned().collect();

    SchoolKpis {
        sheet_count: batch.sheets.len(),
        total_students: overall.len(),
        unassessed_students: unassessed_students(batch).len(),
        total_eligible_assessments,
        total_completed,
        mean_completion: mean(&overall_rates),
        weighted_completion: completion_rate(total_completed, total_eligible_assessments)
            .unwrap_or(0.0),
        band_distribution,
        best_subjects,
        worst_subjects,
    }
}

#[derive(Default)]
struct GroupAccumulator {
    records: usize,
    total_due: usize,
    completed: usize,
    rates: Vec<f64>,
}

fn summarize_by<F>(batch: &Batch, key_of: F) -> Vec<GroupSummary>
where
    F: Fn(&SheetFacts) -> String,
{
    let mut groups: BTreeMap<String, GroupAccumulator> = BTreeMap::new();
    for sheet in &batch.sheets {
        let key = key_of(sheet);
        for (record, rate) in eligible(&sheet.students) {
            let group = groups.entry(key.clone()).or_default();
            group.records += 1;
            group.total_due += record.total_due;
            group.completed += record.completed;
            group.rates.push(rate);
        }
    }
    groups
        .into_iter()
        .map(|(key, g)| GroupSummary {
            key,
            records: g.records,
            total_due: g.total_due,
            completed: g.completed,
            mean_completion: mean(&g.rates),
        })
        .collect()
}

/// Student-subject records grouped by grade, grades in numeric order.
pub fn grade_summaries(batch: &Batch) -> Vec<GroupSummary> {
    let mut summaries = summarize_by(batch, |sheet| {
        sheet
            .identity
            .grade
            .clone()
            .unwrap_or_else(|| "unknown".to_string())
    });
    summaries.sort_by_key(|g| (g.key.parse::<u32>().unwrap_or(u32::MAX), g.key.clone()));
    summaries
}

pub fn subject_summaries(batch: &Batch) -> Vec<GroupSummary> {
    summarize_by(batch, |sheet| sheet.identity.subject.clone())
}

impl Batch {
    /// Sheets at the given positions, in the given order; unknown positions are ignored.
    pub fn select(&self, indices: &[usize]) -> Batch {
        let sheets: Vec<SheetFacts> = indices
            .iter()
            .filter_map(|i| self.sheets.get(*i).cloned())
            .collect();
        let warnings = self
            .warnings
            .iter()
            .filter(|w| {
                sheets
                    .iter()
                    .any(|s| s.file == w.file && w.sheet.as_deref() == Some(s.sheet_name.as_str()))
            })
            .cloned()
            .collect();
        Batch {
            sheets,
            warnings,
            failures: Vec::new(),
        }
    }

    /// Positions of sheets whose subject contains any of `subjects` or whose
    /// name is one of `sheet_names`, case-insensitive. No filters selects everything.
    pub fn find_sheets(&self, subjects: &[String], sheet_names: &[String]) -> Vec<usize> {
        if subjects.is_empty() && sheet_names.is_empty() {
            return (0..self.sheets.len()).collect();
        }
        self.sheets
            .iter()
            .enumerate()
            .filter(|(_, sheet)| {
                let subject = sheet.identity.subject.to_lowercase();
                subjects
                    .iter()
                    .any(|wanted| subject.contains(&wanted.to_lowercase()))
                    || sheet_names
                        .iter()
                        .any(|wanted| wanted.trim().eq_ignore_ascii_case(sheet.sheet_name.trim()))
            })
            .map(|(i, _)| i)
            .collect()
    }
}

pub fn cohort_report(batch: &Batch, selection: &[usize], table: &BandTable) -> CohortReport {
    let subset = batch.select(selection);
    let overall = student_overall(&subset, table);

    let records: Vec<CohortStudent> = subset
        .sheets
        .iter()
        .flat_map(|sheet| {
            eligible(&sheet.students).map(move |(record, rate)| CohortStudent {
                student_name: record.student_name.clone(),
                subject: sheet.identity.subject.clone(),
                class_code: sheet.identity.class_code.clone(),
                total_due: record.total_due,
                completed: record.completed,
                not_submitted: record.not_submitted,
                completion_rate: rate,
                classification: table.classify(Some(rate)),
            })
        })
        .collect();

    let total_due: usize = records.iter().map(|r| r.total_due).sum();
    let total_completed: usize = records.iter().map(|r| r.completed).sum();

    let mut students_by_band: BTreeMap<Band, Vec<String>> =
        Band::ALL.iter().map(|b| (*b, Vec::new())).collect();
    for facts in overall.values() {
        if let Some(names) = students_by_band.get_mut(&facts.overall_band) {
            names.push(facts.student_name.clone());
        }
    }

    CohortReport {
        sheets: subset.sheets.iter().map(|s| s.identity.clone()).collect(),
        total_students: overall.len(),
        total_due,
        total_completed,
        weighted_completion: completion_rate(total_completed, total_due).unwrap_or(0.0),
        band_distribution: BandDistribution::from_classifications(
            overall
                .values()
                .map(|s| Classification::Rated(s.overall_band)),
        ),
        students_by_band,
        records,
    }
}
