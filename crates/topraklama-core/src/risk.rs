//! Risk Classification
//!
//! Maps an upstream risk score and anomaly flag to a discrete tier and the
//! colour every renderer uses for it. Both dashboards share this one
//! classifier, including the faulty override.
//!
//! | Tier    | Condition                          | Colour      |
//! |---------|------------------------------------|-------------|
//! | unknown | no score, score 0 or non-finite    | neutral gray|
//! | faulty  | anomaly flagged and score >= 80    | dark red    |
//! | high    | score >= 70                        | red         |
//! | medium  | score >= 40                        | orange      |
//! | low     | otherwise                          | green       |

use serde::{Deserialize, Serialize};

use crate::model::TransformerRecord;

/// Lower bound of the high tier
pub const HIGH_THRESHOLD: f64 = 70.0;

/// Lower bound of the medium tier
pub const MEDIUM_THRESHOLD: f64 = 40.0;

/// Minimum score at which an anomaly flag escalates to faulty
pub const FAULTY_THRESHOLD: f64 = 80.0;

/// Discrete risk tier, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Unknown,
    Low,
    Medium,
    High,
    Faulty,
}

impl RiskTier {
    /// All tiers in severity order
    pub const ALL: [RiskTier; 5] = [
        RiskTier::Unknown,
        RiskTier::Low,
        RiskTier::Medium,
        RiskTier::High,
        RiskTier::Faulty,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RiskTier::Unknown => "unknown",
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
            RiskTier::Faulty => "faulty",
        }
    }

    pub fn color(&self) -> ColorToken {
        match self {
            RiskTier::Unknown => ColorToken::NeutralGray,
            RiskTier::Low => ColorToken::Green,
            RiskTier::Medium => ColorToken::Orange,
            RiskTier::High => ColorToken::Red,
            RiskTier::Faulty => ColorToken::DarkRed,
        }
    }
}

/// Display colour token for a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorToken {
    NeutralGray,
    Green,
    Orange,
    Red,
    DarkRed,
}

impl ColorToken {
    /// CSS hex value
    pub fn hex(&self) -> &'static str {
        match self {
            ColorToken::NeutralGray => "#6b7280",
            ColorToken::Green => "#10b981",
            ColorToken::Orange => "#f59e0b",
            ColorToken::Red => "#ef4444",
            ColorToken::DarkRed => "#7f1d1d",
        }
    }
}

/// Result of classifying one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
    pub tier: RiskTier,
    pub color: ColorToken,
}

impl From<RiskTier> for Classification {
    fn from(tier: RiskTier) -> Self {
        Self {
            tier,
            color: tier.color(),
        }
    }
}

/// Classify a risk score and anomaly flag.
///
/// Total over every input: a missing, zero or non-finite score is
/// `Unknown`; negative scores fall into `Low`.
pub fn classify(risk_score: Option<f64>, is_anomaly_flagged: bool) -> Classification {
    let tier = match risk_score {
        None => RiskTier::Unknown,
        Some(score) if !score.is_finite() => RiskTier::Unknown,
        Some(score) if score == 0.0 && !is_anomaly_flagged => RiskTier::Unknown,
        Some(score) if is_anomaly_flagged && score >= FAULTY_THRESHOLD => RiskTier::Faulty,
        Some(score) if score >= HIGH_THRESHOLD => RiskTier::High,
        Some(score) if score >= MEDIUM_THRESHOLD => RiskTier::Medium,
        Some(_) => RiskTier::Low,
    };
    Classification::from(tier)
}

/// Classify a record's latest score and flag
pub fn classify_record(record: &TransformerRecord) -> Classification {
    classify(record.risk_score, record.is_anomaly_flagged)
}

/// Number of records per tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub unknown: usize,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub faulty: usize,
}

impl TierCounts {
    pub fn tally(classifications: impl IntoIterator<Item = Classification>) -> Self {
        let mut counts = TierCounts::default();
        for c in classifications {
            match c.tier {
                RiskTier::Unknown => counts.unknown += 1,
                RiskTier::Low => counts.low += 1,
                RiskTier::Medium => counts.medium += 1,
                RiskTier::High => counts.high += 1,
                RiskTier::Faulty => counts.faulty += 1,
            }
        }
        counts
    }

    pub fn get(&self, tier: RiskTier) -> usize {
        match tier {
            RiskTier::Unknown => self.unknown,
            RiskTier::Low => self.low,
            RiskTier::Medium => self.medium,
            RiskTier::High => self.high,
            RiskTier::Faulty => self.faulty,
        }
    }

    pub fn total(&self) -> usize {
        self.unknown + self.low + self.medium + self.high + self.faulty
    }

    /// High and faulty together
    pub fn at_risk(&self) -> usize {
        self.high + self.faulty
    }
}
