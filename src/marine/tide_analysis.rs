//! Turns raw tide extrema into classified events, a tide state and a daily summary

use chrono::{DateTime, NaiveDate, Utc};
use std::f64::consts::PI;

use crate::models::{
    DailyTideSummary, LocalZone, RawExtremum, TideEvent, TideState, TideTrend, TideType,
    UpcomingTide,
};

/// Everything derived from one batch of extrema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TideAnalysis {
    /// All classified events, ascending
    pub events: Vec<TideEvent>,
    /// Nearest future events for display
    pub upcoming: Vec<UpcomingTide>,
    pub summary: Option<DailyTideSummary>,
    pub state: TideState,
    pub analyzed_at: DateTime<Utc>,
}

impl TideAnalysis {
    /// Future events, nearest first, without the display cap
    pub fn future_events(&self) -> impl Iterator<Item = &TideEvent> {
        let now = self.analyzed_at;
        self.events.iter().filter(move |e| e.time >= now)
    }
}

/// Sort extrema and assign High/Low where the provider left it open.
///
/// An unlabelled extremum is compared with the mean height of its
/// neighbours; endpoints have a single neighbour and a lone extremum is
/// compared with the datum.
#[must_use]
pub fn classify(mut extrema: Vec<RawExtremum>) -> Vec<TideEvent> {
    extrema.sort_by_key(|e| e.time);

    (0..extrema.len())
        .map(|i| {
            let current = &extrema[i];
            let kind = current.kind.unwrap_or_else(|| {
                let neighbours: Vec<f64> = [i.checked_sub(1), Some(i + 1)]
                    .into_iter()
                    .flatten()
                    .filter_map(|j| extrema.get(j))
                    .map(|e| e.height)
                    .collect();
                let reference = if neighbours.is_empty() {
                    0.0
                } else {
                    neighbours.iter().sum::<f64>() / neighbours.len() as f64
                };
                if current.height > reference {
                    TideType::High
                } else {
                    TideType::Low
                }
            });
            TideEvent {
                time: current.time,
                kind,
                height: current.height,
            }
        })
        .collect()
}

/// Compact time-until label: "45m", "2h 15m", "1d 3h", or "Past"
#[must_use]
pub fn relative_time(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = target - now;
    if delta < chrono::Duration::zero() {
        return "Past".to_string();
    }
    let minutes = delta.num_minutes();
    let (days, hours, mins) = (minutes / 1440, (minutes % 1440) / 60, minutes % 60);
    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins}m")
    }
}

/// Nearest `limit` events at or after `now`, annotated with relative times
#[must_use]
pub fn upcoming(events: &[TideEvent], now: DateTime<Utc>, limit: usize) -> Vec<UpcomingTide> {
    events
        .iter()
        .filter(|e| e.time >= now)
        .take(limit)
        .map(|e| UpcomingTide {
            event: *e,
            relative_time: relative_time(e.time, now),
        })
        .collect()
}

/// Counts and height range over events falling on `day` in `zone`
#[must_use]
pub fn daily_summary(
    events: &[TideEvent],
    day: NaiveDate,
    zone: &LocalZone,
) -> Option<DailyTideSummary> {
    let mut summary: Option<DailyTideSummary> = None;

    for event in events.iter().filter(|e| zone.local_date(e.time) == day) {
        let s = summary.get_or_insert(DailyTideSummary {
            high_tides_count: 0,
            low_tides_count: 0,
            max_height: event.height,
            min_height: event.height,
        });
        match event.kind {
            TideType::High => s.high_tides_count += 1,
            TideType::Low => s.low_tides_count += 1,
        }
        s.max_height = s.max_height.max(event.height);
        s.min_height = s.min_height.min(event.height);
    }

    summary
}

/// Surrounding extrema, trend and an interpolated current height
#[must_use]
pub fn tide_state(events: &[TideEvent], now: DateTime<Utc>) -> TideState {
    let split = events.partition_point(|e| e.time < now);
    let previous = split.checked_sub(1).and_then(|i| events.get(i)).copied();
    let next = events.get(split).copied();
    let following = events.get(split + 1).copied();

    let current_height = match (previous, next) {
        (Some(prev), Some(next)) => {
            let span = (next.time - prev.time).num_seconds() as f64;
            if span <= 0.0 {
                Some(next.height)
            } else {
                let t = ((now - prev.time).num_seconds() as f64 / span).clamp(0.0, 1.0);
                // Half-cosine between extrema approximates the tidal curve
                Some(prev.height + (next.height - prev.height) * (1.0 - (PI * t).cos()) / 2.0)
            }
        }
        _ => None,
    };

    let trend = match (previous, next) {
        (Some(prev), Some(next)) if next.height > prev.height => Some(TideTrend::Rising),
        (Some(_), Some(_)) => Some(TideTrend::Falling),
        (None, Some(next)) => Some(match next.kind {
            TideType::High => TideTrend::Rising,
            TideType::Low => TideTrend::Falling,
        }),
        _ => None,
    };

    TideState {
        previous,
        next,
        following,
        current_height,
        trend,
    }
}

/// Run the full derivation for extrema fetched at `now`
#[must_use]
pub fn analyze(
    extrema: Vec<RawExtremum>,
    now: DateTime<Utc>,
    zone: &LocalZone,
    display_count: usize,
) -> TideAnalysis {
    let events = classify(extrema);
    let today = zone.local_date(now);
    TideAnalysis {
        upcoming: upcoming(&events, now, display_count),
        summary: daily_summary(&events, today, zone),
        state: tide_state(&events, now),
        events,
        analyzed_at: now,
    }
}
