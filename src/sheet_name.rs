//! Subject, grade and section from a sheet's display name.
//!
//! Sheet names are built differently per exporting term: "Arabic 03 1",
//! "03 Arabic 1", "Islamic 1 03" or "03/1 Arabic". When two bare numbers are
//! present, which one is the grade is decided by a `GradeSectionStrategy`, so
//! a deployment can pin the order for a data source it knows.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::normalize::normalize_name;

lazy_static! {
    static ref CLASS_CODE: Regex = Regex::new(r"^(\d+)\s*[/-]\s*(\d+)$").unwrap();
    static ref NUMBER: Regex = Regex::new(r"^\d+$").unwrap();
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct SheetIdentity {
    pub subject: String,
    /// Grade with leading zeros removed ("03" becomes "3").
    pub grade: Option<String>,
    pub section: Option<String>,
    /// Grade and section as written, joined with '/'.
    pub class_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSheetName {
    pub identity: SheetIdentity,
    /// Set when the grade/section order had to be guessed.
    pub ambiguity: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeSide {
    First,
    Second,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub grade: GradeSide,
    pub ambiguous: bool,
}

/// Decides which of two numeric tokens (in reading order) is the grade.
pub trait GradeSectionStrategy {
    fn resolve(&self, first: &str, second: &str) -> Resolution;
}

/// Grades are written with a leading zero ("03") or as two digits ("10");
/// sections are single digits.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeadingZeroStrategy;

fn looks_like_grade(token: &str) -> bool {
    token.starts_with('0') || token.len() >= 2
}

impl GradeSectionStrategy for LeadingZeroStrategy {
    fn resolve(&self, first: &str, second: &str) -> Resolution {
        match (looks_like_grade(first), looks_like_grade(second)) {
            (true, false) => Resolution {
                grade: GradeSide::First,
                ambiguous: false,
            },
            (false, true) => Resolution {
                grade: GradeSide::Second,
                ambiguous: false,
            },
            _ => Resolution {
                grade: GradeSide::First,
                ambiguous: true,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedOrderStrategy(pub GradeSide);

impl GradeSectionStrategy for FixedOrderStrategy {
    fn resolve(&self, _first: &str, _second: &str) -> Resolution {
        Resolution {
            grade: self.0,
            ambiguous: false,
        }
    }
}

/// Configuration-level choice of strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SheetNameOrder {
    #[default]
    Auto,
    GradeFirst,
    SectionFirst,
}

impl SheetNameOrder {
    pub fn strategy(self) -> Box<dyn GradeSectionStrategy> {
        match self {
            SheetNameOrder::Auto => Box::new(LeadingZeroStrategy),
            SheetNameOrder::GradeFirst => Box::new(FixedOrderStrategy(GradeSide::First)),
            SheetNameOrder::SectionFirst => Box::new(FixedOrderStrategy(GradeSide::Second)),
        }
    }
}

fn strip_zeros(token: &str) -> String {
    let stripped = token.trim_start_matches('0');
    if stripped.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    }
}

pub fn parse_sheet_name(name: &str, strategy: &dyn GradeSectionStrategy) -> ParsedSheetName {
    let normalized = normalize_name(name);
    let mut subject_words = Vec::new();
    let mut numbers: Vec<&str> = Vec::new();
    let mut joined_code: Option<(String, String)> = None;

    for token in normalized.split(' ') {
        if let Some(caps) = CLASS_CODE.captures(token) {
            if joined_code.is_none() {
                joined_code = Some((caps[1].to_string(), caps[2].to_string()));
                continue;
            }
        }
        if NUMBER.is_match(token) {
            numbers.push(token);
        } else if !token.is_empty() {
            subject_words.push(token);
        }
    }

    let mut ambiguity = None;
    let (grade_raw, section) = if let Some((grade, section)) = joined_code {
        // Bare numbers next to a joined class code belong to the subject.
        subject_words.extend(numbers.iter().copied());
        (Some(grade), Some(section))
    } else {
        match numbers.as_slice() {
            [] => (None, None),
            [only] => (Some(only.to_string()), None),
            [first, second] => {
                let resolution = strategy.resolve(first, second);
                if resolution.ambiguous {
                    ambiguity = Some(format!(
                        "cannot tell grade from section in '{normalized}', read '{first}' as the grade"
                    ));
                }
                match resolution.grade {
                    GradeSide::First => (Some(first.to_string()), Some(second.to_string())),
                    GradeSide::Second => (Some(second.to_string()), Some(first.to_string())),
                }
            }
            [.., first, second] => {
                let leading = numbers.len() - 2;
                subject_words.extend(numbers[..leading].iter().copied());
                let resolution = strategy.resolve(first, second);
                ambiguity = Some(format!(
                    "more than two numbers in '{normalized}', used the last two"
                ));
                match resolution.grade {
                    GradeSide::First => (Some(first.to_string()), Some(second.to_string())),
                    GradeSide::Second => (Some(second.to_string()), Some(first.to_string())),
                }
            }
        }
    };

    let class_code = match (&grade_raw, &section) {
        (Some(g), Some(s)) => format!("{g}/{s}"),
        (Some(g), None) => g.clone(),
        _ => String::new(),
    };
    let subject = if subject_words.is_empty() {
        normalized.clone()
    } else {
        subject_words.join(" ")
    };

    ParsedSheetName {
        identity: SheetIdentity {
            subject,
            grade: grade_raw.as_deref().map(strip_zeros),
            section: section.as_deref().map(strip_zeros),
            class_code,
        },
        ambiguity,
    }
}
