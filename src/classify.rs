use std::fmt;

use serde::{Deserialize, Serialize};

/// At or below this ratio a market counts as affordable.
pub const AFFORDABILITY_THRESHOLD: f64 = 3.0;

/// Upper (closed) bounds of the four lower bands. Anything above the last is
/// impossibly unaffordable.
pub const BAND_UPPER: [f64; 4] = [3.0, 4.0, 5.0, 8.9];

pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Affordability {
    Affordable,
    ModeratelyUnaffordable,
    SeriouslyUnaffordable,
    SeverelyUnaffordable,
    ImpossiblyUnaffordable,
}

impl Affordability {
    pub const ALL: [Affordability; 5] = [
        Affordability::Affordable,
        Affordability::ModeratelyUnaffordable,
        Affordability::SeriouslyUnaffordable,
        Affordability::SeverelyUnaffordable,
        Affordability::ImpossiblyUnaffordable,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Affordability::Affordable => "Affordable",
            Affordability::ModeratelyUnaffordable => "Moderately Unaffordable",
            Affordability::SeriouslyUnaffordable => "Seriously Unaffordable",
            Affordability::SeverelyUnaffordable => "Severely Unaffordable",
            Affordability::ImpossiblyUnaffordable => "Impossibly Unaffordable",
        }
    }

    /// Chart colour used for the band.
    pub fn color(&self) -> &'static str {
        match self {
            Affordability::Affordable => "#4CAF50",
            Affordability::ModeratelyUnaffordable => "#FFC107",
            Affordability::SeriouslyUnaffordable => "#FF9800",
            Affordability::SeverelyUnaffordable => "#E57373",
            Affordability::ImpossiblyUnaffordable => "#B71C1C",
        }
    }

    /// Half-open `(lower, upper]` bounds; `None` means unbounded.
    pub fn bounds(&self) -> (Option<f64>, Option<f64>) {
        let i = *self as usize;
        let lower = if i == 0 { None } else { Some(BAND_UPPER[i - 1]) };
        (lower, BAND_UPPER.get(i).copied())
    }
}

impl fmt::Display for Affordability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn classify(ratio: f64) -> Option<Affordability> {
    if ratio.is_nan() {
        return None;
    }
    let i = BAND_UPPER.iter().position(|upper| ratio <= *upper).unwrap_or(BAND_UPPER.len());
    Some(Affordability::ALL[i])
}

pub fn label(band: Option<Affordability>) -> &'static str {
    band.map(|b| b.label()).unwrap_or(NOT_AVAILABLE)
}

pub fn is_affordable(ratio: f64) -> bool {
    ratio <= AFFORDABILITY_THRESHOLD
}
