use std::str::FromStr;

use chrono::{Datelike, Local, NaiveDate};
use serde::Serialize;

use crate::band::BandTableId;
use crate::error::ConfigError;
use crate::normalize::DateOptions;
use crate::sheet_name::SheetNameOrder;

/// Everything the core needs to turn a batch of grids into facts.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisConfig {
    pub cutoff: NaiveDate,
    pub window_start: Option<NaiveDate>,
    /// Earlier end than the cutoff, applied after parsing. The cutoff still
    /// decides the year of year-less due dates.
    pub window_end: Option<NaiveDate>,
    pub day_first: bool,
    pub band_table: BandTableId,
    pub sheet_name_order: SheetNameOrder,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::for_cutoff(today())
    }
}

impl AnalysisConfig {
    pub fn for_cutoff(cutoff: NaiveDate) -> Self {
        Self {
            cutoff,
            window_start: None,
            window_end: None,
            day_first: true,
            band_table: BandTableId::default(),
            sheet_name_order: SheetNameOrder::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(start) = self.window_start {
            if start > self.cutoff {
                return Err(ConfigError::WindowAfterCutoff {
                    start,
                    cutoff: self.cutoff,
                });
            }
        }
        if let Some(end) = self.window_end {
            if end > self.cutoff {
                return Err(ConfigError::EndAfterCutoff {
                    end,
                    cutoff: self.cutoff,
                });
            }
            if let Some(start) = self.window_start.filter(|start| *start > end) {
                return Err(ConfigError::EmptyWindow { start, end });
            }
        }
        Ok(())
    }

    /// Year-less due dates ("Oct 31") are read in the cutoff's year.
    pub fn date_options(&self) -> DateOptions {
        DateOptions {
            day_first: self.day_first,
            default_year: self.cutoff.year(),
        }
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

impl FromStr for BandTableId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy-2024" | "legacy" => Ok(BandTableId::Legacy2024),
            "revised-2025" | "revised" => Ok(BandTableId::Revised2025),
            other => Err(ConfigError::UnknownBandTable(other.to_string())),
        }
    }
}

impl FromStr for SheetNameOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SheetNameOrder::Auto),
            "grade-first" => Ok(SheetNameOrder::GradeFirst),
            "section-first" => Ok(SheetNameOrder::SectionFirst),
            other => Err(ConfigError::UnknownSheetOrder(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn defaults_are_day_first_and_revised_table() {
        let config = AnalysisConfig::for_cutoff(date(2025, 10, 22));
        assert!(config.day_first);
        assert_eq!(config.band_table, BandTableId::Revised2025);
        assert_eq!(config.sheet_name_order, SheetNameOrder::Auto);
        assert_eq!(config.date_options().default_year, 2025);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_window_starting_after_cutoff() {
        let mut config = AnalysisConfig::for_cutoff(date(2025, 10, 22));
        config.window_start = Some(date(2025, 11, 1));
        assert_eq!(
            config.validate(),
            Err(ConfigError::WindowAfterCutoff {
                start: date(2025, 11, 1),
                cutoff: date(2025, 10, 22),
            })
        );
    }

    #[test]
    fn window_end_must_sit_between_start_and_cutoff() {
        let mut config = AnalysisConfig::for_cutoff(date(2025, 10, 22));
        config.window_end = Some(date(2025, 10, 15));
        assert!(config.validate().is_ok());

        config.window_start = Some(date(2025, 10, 16));
        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyWindow {
                start: date(2025, 10, 16),
                end: date(2025, 10, 15),
            })
        );

        config.window_start = None;
        config.window_end = Some(date(2025, 10, 23));
        assert_eq!(
            config.validate(),
            Err(ConfigError::EndAfterCutoff {
                end: date(2025, 10, 23),
                cutoff: date(2025, 10, 22),
            })
        );
    }

    #[test]
    fn parses_table_and_order_identifiers() {
        assert_eq!("legacy-2024".parse::<BandTableId>(), Ok(BandTableId::Legacy2024));
        assert_eq!("Revised".parse::<BandTableId>(), Ok(BandTableId::Revised2025));
        assert!("gold-only".parse::<BandTableId>().is_err());
        assert_eq!(
            "section-first".parse::<SheetNameOrder>(),
            Ok(SheetNameOrder::SectionFirst)
        );
    }
}
