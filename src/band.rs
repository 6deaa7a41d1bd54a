//! Ordinal completion bands.
//!
//! Two threshold tables have been used in production. A deployment picks one
//! `BandTableId` and every classification (per subject and overall) goes
//! through the resulting `BandTable`, so no call site carries its own default.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Band {
    Platinum,
    Gold,
    Silver,
    Bronze,
    NeedsImprovement,
    NonParticipant,
}

impl Band {
    /// Highest to lowest.
    pub const ALL: [Band; 6] = [
        Band::Platinum,
        Band::Gold,
        Band::Silver,
        Band::Bronze,
        Band::NeedsImprovement,
        Band::NonParticipant,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Band::Platinum => "Platinum",
            Band::Gold => "Gold",
            Band::Silver => "Silver",
            Band::Bronze => "Bronze",
            Band::NeedsImprovement => "Needs Improvement",
            Band::NonParticipant => "Non-participant",
        }
    }

    pub fn arabic_label(self) -> &'static str {
        match self {
            Band::Platinum => "البلاتينية",
            Band::Gold => "الذهبية",
            Band::Silver => "الفضية",
            Band::Bronze => "البرونزية",
            Band::NeedsImprovement => "يحتاج إلى تطوير",
            Band::NonParticipant => "لا يستفيد من النظام",
        }
    }
}

/// Result of classifying a rate that may be absent.
///
/// `NotApplicable` marks "no eligible assessments" and is never one of the six
/// real bands; distributions skip it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Rated(Band),
    NotApplicable,
}

impl Serialize for Classification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Classification::Rated(band) => band.serialize(serializer),
            Classification::NotApplicable => serializer.serialize_str("not-applicable"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BandTableId {
    /// 90 / 80 / 70 / 50.
    Legacy2024,
    /// 90 / 75 / 60 / 40.
    #[default]
    Revised2025,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandTable {
    pub id: BandTableId,
    pub platinum: f64,
    pub gold: f64,
    pub silver: f64,
    pub bronze: f64,
}

impl BandTable {
    pub fn for_id(id: BandTableId) -> Self {
        match id {
            BandTableId::Legacy2024 => BandTable {
                id,
                platinum: 90.0,
                gold: 80.0,
                silver: 70.0,
                bronze: 50.0,
            },
            BandTableId::Revised2025 => BandTable {
                id,
                platinum: 90.0,
                gold: 75.0,
                silver: 60.0,
                bronze: 40.0,
            },
        }
    }

    /// Lower bounds are inclusive; the first matching band from the top wins.
    /// Anything above zero but under bronze needs improvement; exactly zero
    /// is a non-participant in every table.
    pub fn band_for(&self, rate: f64) -> Band {
        if rate >= self.platinum {
            Band::Platinum
        } else if rate >= self.gold {
            Band::Gold
        } else if rate >= self.silver {
            Band::Silver
        } else if rate >= self.bronze {
            Band::Bronze
        } else if rate > 0.0 {
            Band::NeedsImprovement
        } else {
            Band::NonParticipant
        }
    }

    pub fn classify(&self, rate: Option<f64>) -> Classification {
        match rate {
            Some(r) if !r.is_nan() => Classification::Rated(self.band_for(r)),
            _ => Classification::NotApplicable,
        }
    }
}

impl Default for BandTable {
    fn default() -> Self {
        Self::for_id(BandTableId::default())
    }
}

/// Head-count per band. Every band is always present, zero or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BandDistribution {
    counts: BTreeMap<Band, usize>,
}

impl Default for BandDistribution {
    fn default() -> Self {
        Self {
            counts: Band::ALL.iter().map(|b| (*b, 0)).collect(),
        }
    }
}

impl BandDistribution {
    pub fn from_classifications<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Classification>,
    {
        let mut dist = Self::default();
        for c in items {
            dist.record(c);
        }
        dist
    }

    /// Not-applicable classifications are not counted.
    pub fn record(&mut self, classification: Classification) {
        if let Classification::Rated(band) = classification {
            *self.counts.entry(band).or_insert(0) += 1;
        }
    }

    pub fn count(&self, band: Band) -> usize {
        self.counts.get(&band).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn share(&self, band: Band) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            100.0 * self.count(band) as f64 / total as f64
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Band, usize)> + '_ {
        Band::ALL.iter().map(move |b| (*b, self.count(*b)))
    }
}
