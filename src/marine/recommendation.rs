//! Picks the best activity, when to go, and practical tips

use super::conditions::ActivityScore;
use crate::config::TidePreference;
use crate::models::{Recommendation, TideEvent, TideType, WeatherSnapshot};

/// Activities scoring below this get their limiting factors listed
const TIP_THRESHOLD: f64 = 6.0;

/// Suggested when there is no weather to score against
pub const FALLBACK_ACTIVITY: &str = "beach walking";

/// Build the recommendation from scored activities.
///
/// `upcoming` holds future tide events, nearest first.
#[must_use]
pub fn recommend(
    activities: &[ActivityScore],
    weather: Option<&WeatherSnapshot>,
    upcoming: &[TideEvent],
) -> Recommendation {
    let Some(weather) = weather else {
        return without_weather(upcoming);
    };

    let Some(best) = best_activity(activities) else {
        return without_weather(upcoming);
    };

    let best_time = next_matching(upcoming, best.tide_preference).map(|e| e.time);

    let mut sorted: Vec<&ActivityScore> = activities.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut tips = Vec::new();
    for activity in sorted.iter().filter(|a| a.score < TIP_THRESHOLD) {
        let limiting = activity.limiting_factors();
        if limiting.is_empty() {
            tips.push(format!(
                "{}: conditions are only fair ({:.1}/10)",
                capitalize(&activity.name),
                activity.score
            ));
        }
        for factor in limiting {
            tips.push(format!("{}: {}", capitalize(&activity.name), factor.description));
        }
    }

    tips.extend(favourable_tips(weather, upcoming));

    Recommendation {
        best_activity: best.name.clone(),
        best_time,
        tips,
    }
}

/// Highest score; ties go to the alphabetically first name
fn best_activity(activities: &[ActivityScore]) -> Option<&ActivityScore> {
    activities.iter().reduce(|best, candidate| {
        if candidate.score > best.score
            || (candidate.score == best.score && candidate.name < best.name)
        {
            candidate
        } else {
            best
        }
    })
}

fn next_matching(upcoming: &[TideEvent], preference: TidePreference) -> Option<&TideEvent> {
    match preference {
        TidePreference::High => upcoming.iter().find(|e| e.kind == TideType::High),
        TidePreference::Low => upcoming.iter().find(|e| e.kind == TideType::Low),
        TidePreference::Mid | TidePreference::Any => upcoming.first(),
    }
}

fn favourable_tips(weather: &WeatherSnapshot, upcoming: &[TideEvent]) -> Vec<String> {
    let mut tips = Vec::new();

    if weather.wind_speed < 5.0 {
        tips.push("Calm winds - ideal for water activities".to_string());
    }
    if weather.temperature > 25.0 {
        tips.push("Warm conditions - stay hydrated and use sun protection".to_string());
    }
    match upcoming.first().map(|e| e.kind) {
        Some(TideType::Low) => {
            tips.push("Low tide approaching - great time for exploring tide pools".to_string());
        }
        Some(TideType::High) => {
            tips.push("High tide approaching - good water depth for launching".to_string());
        }
        None => {}
    }

    tips
}

fn without_weather(upcoming: &[TideEvent]) -> Recommendation {
    let low = next_matching(upcoming, TidePreference::Low);
    let mut tips =
        vec!["Weather data is unavailable - check local conditions before heading out".to_string()];
    if low.is_some() {
        tips.push("Low tide is the best time for beach walks and tide pools".to_string());
    }
    Recommendation {
        best_activity: FALLBACK_ACTIVITY.to_string(),
        best_time: low.map(|e| e.time).or_else(|| upcoming.first().map(|e| e.time)),
        tips,
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
