//! Marine condition scoring
//!
//! Fuses the tide state with the current weather into a 0-10 score per
//! configured activity, an overall rating and a list of safety warnings.
//! Every adjustment is recorded as a [`ScoreFactor`] so the recommendation
//! engine can explain what held a score back.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::{ActivityProfile, ScoringConfig, TidePreference};
use crate::models::{MarineConditions, OverallRating, TideState, TideType, WeatherSnapshot};

/// One adjustment applied to an activity's base score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreFactor {
    pub description: String,
    /// Signed contribution to the score
    pub impact: f64,
}

impl fmt::Display for ScoreFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:+.1})", self.description, self.impact)
    }
}

/// Score and reasoning for a single activity
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityScore {
    pub name: String,
    /// Clamped to [0, 10], one decimal
    pub score: f64,
    pub tide_preference: TidePreference,
    pub factors: Vec<ScoreFactor>,
}

impl ActivityScore {
    /// Factors that lowered the score, worst first
    #[must_use]
    pub fn limiting_factors(&self) -> Vec<&ScoreFactor> {
        let mut limiting: Vec<&ScoreFactor> =
            self.factors.iter().filter(|f| f.impact < 0.0).collect();
        limiting.sort_by(|a, b| a.impact.total_cmp(&b.impact));
        limiting
    }
}

/// Serialized conditions plus the per-activity breakdown behind them
#[derive(Debug, Clone, PartialEq)]
pub struct MarineAssessment {
    pub conditions: MarineConditions,
    /// In configuration order
    pub activities: Vec<ActivityScore>,
}

/// Score every configured activity and collect warnings
#[must_use]
pub fn assess(config: &ScoringConfig, weather: &WeatherSnapshot, tide: &TideState) -> MarineAssessment {
    let activities: Vec<ActivityScore> = config
        .activities
        .iter()
        .map(|profile| score_activity(profile, weather, tide))
        .collect();

    let suitability: BTreeMap<String, f64> = activities
        .iter()
        .map(|a| (a.name.clone(), a.score))
        .collect();

    MarineAssessment {
        conditions: MarineConditions {
            overall_rating: OverallRating::from_suitability(&suitability),
            suitability,
            warnings: warnings(config, weather, tide),
        },
        activities,
    }
}

/// Apply one activity profile to the current conditions
#[must_use]
pub fn score_activity(
    profile: &ActivityProfile,
    weather: &WeatherSnapshot,
    tide: &TideState,
) -> ActivityScore {
    let mut factors = Vec::new();
    let wind = weather.wind_speed;

    if (profile.ideal_wind_min..=profile.ideal_wind_max).contains(&wind)
        && profile.ideal_wind_bonus != 0.0
    {
        factors.push(ScoreFactor {
            description: format!(
                "wind {wind:.1} m/s within the ideal {:.0}-{:.0} m/s band",
                profile.ideal_wind_min, profile.ideal_wind_max
            ),
            impact: profile.ideal_wind_bonus,
        });
    }

    if wind > profile.wind_limit && profile.wind_penalty_per_ms > 0.0 {
        factors.push(ScoreFactor {
            description: format!(
                "wind {wind:.1} m/s is above the {:.0} m/s limit",
                profile.wind_limit
            ),
            impact: -(wind - profile.wind_limit) * profile.wind_penalty_per_ms,
        });
    }

    if let (Some(min), Some(visibility)) = (profile.min_visibility_km, weather.visibility) {
        if visibility < min && profile.visibility_penalty > 0.0 {
            factors.push(ScoreFactor {
                description: format!("visibility {visibility:.1} km is below {min:.0} km"),
                impact: -profile.visibility_penalty,
            });
        }
    }

    if let Some((alignment, description)) = tide_alignment(profile.tide_preference, tide) {
        let impact = alignment * profile.tide_weight;
        if impact.abs() >= 0.05 {
            factors.push(ScoreFactor {
                description,
                impact,
            });
        }
    }

    if profile.precipitation_penalty > 0.0 && weather.has_precipitation() {
        factors.push(ScoreFactor {
            description: format!("{} reported", weather.condition.to_lowercase()),
            impact: -profile.precipitation_penalty,
        });
    }

    if let Some(min) = profile.min_temperature {
        if weather.temperature < min && profile.cold_penalty > 0.0 {
            factors.push(ScoreFactor {
                description: format!(
                    "air temperature {:.1} °C is below {min:.0} °C",
                    weather.temperature
                ),
                impact: -profile.cold_penalty,
            });
        }
    }

    let raw = profile.base + factors.iter().map(|f| f.impact).sum::<f64>();

    ActivityScore {
        name: profile.name.clone(),
        score: (raw.clamp(0.0, 10.0) * 10.0).round() / 10.0,
        tide_preference: profile.tide_preference,
        factors,
    }
}

/// How well the tide matches a preference, in [-1, 1], with a description.
///
/// Uses the water's position in the tidal range when known, otherwise only
/// the type of the next extremum.
fn tide_alignment(preference: TidePreference, tide: &TideState) -> Option<(f64, String)> {
    if preference == TidePreference::Any {
        return None;
    }

    if let Some(fill) = tide.fill_fraction() {
        let (alignment, favourable, unfavourable) = match preference {
            TidePreference::High => (2.0 * fill - 1.0, "tide is near high water", "tide is far from high water"),
            TidePreference::Low => (1.0 - 2.0 * fill, "tide is near low water", "tide is far from low water"),
            TidePreference::Mid => (
                1.0 - 2.0 * (2.0 * fill - 1.0).abs(),
                "tide is mid-cycle",
                "tide is near slack water",
            ),
            TidePreference::Any => return None,
        };
        let description = if alignment >= 0.0 { favourable } else { unfavourable };
        return Some((alignment, description.to_string()));
    }

    let next = tide.next?;
    let approaching = match next.kind {
        TideType::High => "high tide is approaching",
        TideType::Low => "low tide is approaching",
    };
    let alignment = match (preference, next.kind) {
        (TidePreference::High, TideType::High) | (TidePreference::Low, TideType::Low) => 0.5,
        (TidePreference::High, TideType::Low) | (TidePreference::Low, TideType::High) => -0.5,
        _ => 0.0,
    };
    Some((alignment, approaching.to_string()))
}

/// Safety warnings in fixed order: wind, visibility, tide range, cold, thunderstorms
#[must_use]
pub fn warnings(config: &ScoringConfig, weather: &WeatherSnapshot, tide: &TideState) -> Vec<String> {
    let mut warnings = Vec::new();

    if weather.wind_speed > config.high_wind_threshold {
        warnings.push(format!(
            "Strong winds ({:.1} m/s) - exercise caution",
            weather.wind_speed
        ));
    }

    if let Some(visibility) = weather.visibility {
        if visibility < config.low_visibility_km {
            warnings.push(format!("Low visibility conditions ({visibility:.1} km)"));
        }
    }

    if let Some(height) = tide.reference_height() {
        if height < config.safe_tide_min || height > config.safe_tide_max {
            warnings.push(format!(
                "Tide height {height:.2} m is outside the safe range ({:.1} to {:.1} m)",
                config.safe_tide_min, config.safe_tide_max
            ));
        }
    }

    if weather.temperature < config.cold_temperature {
        warnings.push("Cold temperature - consider thermal protection".to_string());
    }

    if weather.has_thunderstorm() {
        warnings.push("Thunderstorms in the area - stay off the water".to_string());
    }

    warnings
}
