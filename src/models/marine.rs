//! Marine suitability, ratings and recommendations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Headline rating derived from the suitability scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallRating {
    /// Mean score >= 8
    Excellent,
    /// Mean score >= 6
    Good,
    /// Mean score >= 4
    Fair,
    /// Anything lower
    Poor,
}

impl OverallRating {
    /// Bucket a 0-10 score
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 8.0 => OverallRating::Excellent,
            s if s >= 6.0 => OverallRating::Good,
            s if s >= 4.0 => OverallRating::Fair,
            _ => OverallRating::Poor,
        }
    }

    /// Rate a suitability map by the mean of its scores
    #[must_use]
    pub fn from_suitability(suitability: &BTreeMap<String, f64>) -> Self {
        if suitability.is_empty() {
            return OverallRating::Poor;
        }
        let mean = suitability.values().sum::<f64>() / suitability.len() as f64;
        Self::from_score(mean)
    }
}

impl fmt::Display for OverallRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallRating::Excellent => write!(f, "Excellent"),
            OverallRating::Good => write!(f, "Good"),
            OverallRating::Fair => write!(f, "Fair"),
            OverallRating::Poor => write!(f, "Poor"),
        }
    }
}

/// Scored conditions for all tracked activities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarineConditions {
    pub overall_rating: OverallRating,
    /// Activity name to score in [0, 10]
    pub suitability: BTreeMap<String, f64>,
    pub warnings: Vec<String>,
}

/// Suggested activity and timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub best_activity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_time: Option<DateTime<Utc>>,
    pub tips: Vec<String>,
}
