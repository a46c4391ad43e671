//! Goal progress engine.
//!
//! Pure functions over already-fetched entries and an optional goal. Nothing
//! here reads the clock or touches storage: the caller passes `today`, and
//! every view is recomputed from scratch on each call.
//!
//! Weights are kilograms throughout. Gram figures are kilogram values times
//! 1000 and are never rounded here; rounding is a display concern.

use anyhow::{Context, Result};
use chrono::{Datelike, Days, Months, NaiveDate};
use serde::Serialize;

use crate::models::{
    NewWeightGoal, WeightEntry, WeightGoal, invalid, validate_goal, validate_weight,
};

/// Daily deltas below this (kg) count as a strong loss.
pub const STRONG_LOSS_KG: f64 = -0.3;
/// Daily deltas above this (kg) count as a notable gain.
pub const NOTABLE_GAIN_KG: f64 = 0.3;
pub const DAYS_PER_WEEK: f64 = 7.0;
pub const DAYS_PER_MONTH: f64 = 30.0;
pub const GOAL_TRACK_LEN: usize = 7;
pub const TIMELINE_LEN: usize = 10;
pub const CHART_MONTHS: u32 = 6;

// --- Ordering helpers ---

/// Entries sorted by date, newest first. Ties keep input order.
fn newest_first(entries: &[WeightEntry]) -> Vec<&WeightEntry> {
    let mut sorted: Vec<&WeightEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| b.date.cmp(&a.date));
    sorted
}

/// Entries sorted by date, oldest first. Ties keep input order.
fn oldest_first(entries: &[WeightEntry]) -> Vec<&WeightEntry> {
    let mut sorted: Vec<&WeightEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.date.cmp(&b.date));
    sorted
}

/// First entry (in input order) recorded on `date`.
#[must_use]
pub fn entry_on(entries: &[WeightEntry], date: NaiveDate) -> Option<&WeightEntry> {
    entries.iter().find(|e| e.date == date)
}

// --- Core metrics ---

/// Today's entry if there is one, otherwise the most recent entry by date.
#[must_use]
pub fn current_weight(entries: &[WeightEntry], today: NaiveDate) -> Option<&WeightEntry> {
    entry_on(entries, today).or_else(|| newest_first(entries).first().copied())
}

/// `today - yesterday` when both days have an entry, otherwise the difference
/// between the two most recent entries. Negative means weight was lost.
#[must_use]
pub fn delta_vs_previous(entries: &[WeightEntry], today: NaiveDate) -> Option<f64> {
    let today_entry = entry_on(entries, today);
    let yesterday_entry = today.pred_opt().and_then(|y| entry_on(entries, y));
    if let (Some(t), Some(y)) = (today_entry, yesterday_entry) {
        return Some(t.weight_kg - y.weight_kg);
    }

    match newest_first(entries).as_slice() {
        [latest, previous, ..] => Some(latest.weight_kg - previous.weight_kg),
        _ => None,
    }
}

/// Current weight minus the earliest recorded weight; `0.0` with no history.
#[must_use]
pub fn total_change(entries: &[WeightEntry], today: NaiveDate) -> f64 {
    let earliest = oldest_first(entries).first().copied();
    match (current_weight(entries, today), earliest) {
        (Some(current), Some(first)) => current.weight_kg - first.weight_kg,
        _ => 0.0,
    }
}

/// Entries dated within `[start, end]`, oldest first.
#[must_use]
pub fn period_entries(
    entries: &[WeightEntry],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<&WeightEntry> {
    let mut within: Vec<&WeightEntry> = entries
        .iter()
        .filter(|e| e.date >= start && e.date <= end)
        .collect();
    within.sort_by(|a, b| a.date.cmp(&b.date));
    within
}

/// Latest minus earliest weight inside `[start, end]`. Needs two entries.
#[must_use]
pub fn period_delta(entries: &[WeightEntry], start: NaiveDate, end: NaiveDate) -> Option<f64> {
    match period_entries(entries, start, end).as_slice() {
        [first, .., last] => Some(last.weight_kg - first.weight_kg),
        _ => None,
    }
}

// --- Goal projection ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GoalProjection {
    pub weight_to_lose_kg: f64,
    pub days_remaining: i64,
    pub daily_pace_g: f64,
    pub weekly_pace_kg: f64,
    pub monthly_pace_kg: f64,
}

/// Pace required to reach the goal's target by its deadline.
///
/// `None` unless the goal has a target date strictly after `today` and the
/// current weight is above the target.
#[must_use]
pub fn goal_projection(
    current_weight_kg: Option<f64>,
    goal: Option<&WeightGoal>,
    today: NaiveDate,
) -> Option<GoalProjection> {
    let goal = goal?;
    project(current_weight_kg?, goal.target_weight_kg, goal.target_date?, today)
}

/// [`goal_projection`] for a target that has not been stored yet.
#[must_use]
pub fn project(
    current_kg: f64,
    target_weight_kg: f64,
    target_date: NaiveDate,
    today: NaiveDate,
) -> Option<GoalProjection> {
    let weight_to_lose_kg = current_kg - target_weight_kg;
    if weight_to_lose_kg <= 0.0 {
        return None;
    }

    let days_remaining = (target_date - today).num_days();
    if days_remaining <= 0 {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let days = days_remaining as f64;
    Some(GoalProjection {
        weight_to_lose_kg,
        days_remaining,
        daily_pace_g: weight_to_lose_kg / days * 1000.0,
        weekly_pace_kg: weight_to_lose_kg / (days / DAYS_PER_WEEK),
        monthly_pace_kg: weight_to_lose_kg / (days / DAYS_PER_MONTH),
    })
}

/// Share of a period goal achieved, capped at 100.
///
/// Uses the magnitude of `delta`, so a gain also yields a percentage; pair it
/// with [`Trend`] to tell the two apart.
#[must_use]
pub fn progress_percent(delta: Option<f64>, period_goal: Option<f64>) -> Option<f64> {
    let delta = delta?;
    let goal = period_goal?;
    if goal > 0.0 {
        Some((delta.abs() / goal * 100.0).min(100.0))
    } else {
        None
    }
}

// --- Insight classification ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsightCategory {
    NoEntryToday,
    NoBaseline,
    StrongLoss,
    MildLoss,
    Stable,
    MildGain,
    NotableGain,
}

impl InsightCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoEntryToday => "no-entry-today",
            Self::NoBaseline => "no-baseline",
            Self::StrongLoss => "strong-loss",
            Self::MildLoss => "mild-loss",
            Self::Stable => "stable",
            Self::MildGain => "mild-gain",
            Self::NotableGain => "notable-gain",
        }
    }
}

/// Classify a daily delta (kg). `None` means there is nothing to compare with.
#[must_use]
pub fn classify_delta(delta: Option<f64>) -> InsightCategory {
    let Some(d) = delta else {
        return InsightCategory::NoBaseline;
    };
    if d < STRONG_LOSS_KG {
        InsightCategory::StrongLoss
    } else if d < 0.0 {
        InsightCategory::MildLoss
    } else if d > NOTABLE_GAIN_KG {
        InsightCategory::NotableGain
    } else if d > 0.0 {
        InsightCategory::MildGain
    } else {
        InsightCategory::Stable
    }
}

#[must_use]
pub fn insight_category(entries: &[WeightEntry], today: NaiveDate) -> InsightCategory {
    if entry_on(entries, today).is_none() {
        return InsightCategory::NoEntryToday;
    }
    classify_delta(delta_vs_previous(entries, today))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Loss,
    Stable,
    Gain,
}

impl Trend {
    #[must_use]
    pub fn from_delta(delta: f64) -> Self {
        if delta < 0.0 {
            Self::Loss
        } else if delta > 0.0 {
            Self::Gain
        } else {
            Self::Stable
        }
    }
}

// --- Calendar periods ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Monday through Sunday of the week containing `day`.
#[must_use]
pub fn week_bounds(day: NaiveDate) -> Period {
    let offset = u64::from(day.weekday().num_days_from_monday());
    let start = day.checked_sub_days(Days::new(offset)).unwrap_or(NaiveDate::MIN);
    let end = start.checked_add_days(Days::new(6)).unwrap_or(NaiveDate::MAX);
    Period { start, end }
}

#[must_use]
pub fn month_bounds(day: NaiveDate) -> Period {
    let start = day.with_day(1).unwrap_or(day);
    let end = start
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())
        .unwrap_or(NaiveDate::MAX);
    Period { start, end }
}

#[must_use]
pub fn previous_week(day: NaiveDate) -> Period {
    week_bounds(day.checked_sub_days(Days::new(7)).unwrap_or(NaiveDate::MIN))
}

#[must_use]
pub fn previous_month(day: NaiveDate) -> Period {
    let start = month_bounds(day).start;
    month_bounds(start.pred_opt().unwrap_or(NaiveDate::MIN))
}

// --- Pace resolution ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaceSource {
    /// Recomputed from the target weight and date for `today`.
    Live,
    /// Values saved with the goal.
    Stored,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pace {
    pub daily_g: Option<f64>,
    pub weekly_kg: Option<f64>,
    pub monthly_kg: Option<f64>,
    pub source: PaceSource,
}

/// Live projection when it can be computed, the goal's stored figures otherwise.
#[must_use]
pub fn effective_pace(projection: Option<&GoalProjection>, goal: Option<&WeightGoal>) -> Option<Pace> {
    if let Some(p) = projection {
        return Some(Pace {
            daily_g: Some(p.daily_pace_g),
            weekly_kg: Some(p.weekly_pace_kg),
            monthly_kg: Some(p.monthly_pace_kg),
            source: PaceSource::Live,
        });
    }
    let goal = goal?;
    if goal.daily_goal_g.is_none() && goal.weekly_goal_kg.is_none() && goal.monthly_goal_kg.is_none()
    {
        return None;
    }
    Some(Pace {
        daily_g: goal.daily_goal_g,
        weekly_kg: goal.weekly_goal_kg,
        monthly_kg: goal.monthly_goal_kg,
        source: PaceSource::Stored,
    })
}

// --- View model ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSummary {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub entry_count: usize,
    pub earliest_kg: Option<f64>,
    pub latest_kg: Option<f64>,
    pub delta_kg: Option<f64>,
    pub trend: Option<Trend>,
    pub previous_latest_kg: Option<f64>,
    pub vs_previous_kg: Option<f64>,
    pub min_kg: Option<f64>,
    pub max_kg: Option<f64>,
    pub average_kg: Option<f64>,
    pub goal_kg: Option<f64>,
    pub goal_progress_pct: Option<f64>,
}

fn summarize_period(
    entries: &[WeightEntry],
    period: Period,
    previous: Period,
    goal_kg: Option<f64>,
) -> PeriodSummary {
    let within = period_entries(entries, period.start, period.end);
    let weights: Vec<f64> = within.iter().map(|e| e.weight_kg).collect();
    let delta_kg = period_delta(entries, period.start, period.end);
    let latest_kg = weights.last().copied();
    let previous_latest_kg = period_entries(entries, previous.start, previous.end)
        .last()
        .map(|e| e.weight_kg);

    #[allow(clippy::cast_precision_loss)]
    let average_kg = (!weights.is_empty())
        .then(|| weights.iter().sum::<f64>() / weights.len() as f64);

    PeriodSummary {
        start: period.start,
        end: period.end,
        entry_count: within.len(),
        earliest_kg: weights.first().copied(),
        latest_kg,
        delta_kg,
        trend: delta_kg.map(Trend::from_delta),
        previous_latest_kg,
        vs_previous_kg: latest_kg.zip(previous_latest_kg).map(|(cur, prev)| cur - prev),
        min_kg: weights.iter().copied().reduce(f64::min),
        max_kg: weights.iter().copied().reduce(f64::max),
        average_kg,
        goal_kg,
        goal_progress_pct: progress_percent(delta_kg, goal_kg),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalTrackPoint {
    pub date: NaiveDate,
    pub weight_kg: f64,
    /// Weight expected on this date had the daily pace been met since the first point.
    pub expected_kg: Option<f64>,
    pub met_goal: Option<bool>,
}

/// The last [`GOAL_TRACK_LEN`] entries, oldest first, against the daily pace.
#[must_use]
pub fn daily_goal_track(entries: &[WeightEntry], daily_goal_g: Option<f64>) -> Vec<GoalTrackPoint> {
    let mut recent: Vec<&WeightEntry> = newest_first(entries)
        .into_iter()
        .take(GOAL_TRACK_LEN)
        .collect();
    recent.reverse();

    let Some(first) = recent.first().map(|e| e.weight_kg) else {
        return Vec::new();
    };
    let daily_kg = daily_goal_g.filter(|g| *g > 0.0).map(|g| g / 1000.0);

    recent
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            #[allow(clippy::cast_precision_loss)]
            let expected_kg = daily_kg.map(|kg| first - kg * index as f64);
            GoalTrackPoint {
                date: entry.date,
                weight_kg: entry.weight_kg,
                expected_kg,
                met_goal: expected_kg.map(|expected| entry.weight_kg <= expected),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyProgress {
    pub delta_kg: Option<f64>,
    pub trend: Option<Trend>,
    pub goal_g: Option<f64>,
    pub goal_progress_pct: Option<f64>,
    pub track: Vec<GoalTrackPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelinePoint {
    pub id: i64,
    pub date: NaiveDate,
    pub weight_kg: f64,
    /// Change from the entry recorded before this one.
    pub variation_kg: Option<f64>,
}

#[must_use]
pub fn timeline(entries: &[WeightEntry], limit: usize) -> Vec<TimelinePoint> {
    let sorted = newest_first(entries);
    sorted
        .iter()
        .enumerate()
        .take(limit)
        .map(|(i, entry)| TimelinePoint {
            id: entry.id,
            date: entry.date,
            weight_kg: entry.weight_kg,
            variation_kg: sorted.get(i + 1).map(|prev| entry.weight_kg - prev.weight_kg),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthPoint {
    /// `YYYY-MM`
    pub month: String,
    pub latest_kg: f64,
    pub entry_count: usize,
}

/// Latest weight per month for the last [`CHART_MONTHS`] months, oldest first.
/// Months without entries are skipped.
#[must_use]
pub fn monthly_chart(entries: &[WeightEntry], today: NaiveDate) -> Vec<MonthPoint> {
    let this_month = month_bounds(today).start;
    (0..CHART_MONTHS)
        .rev()
        .filter_map(|back| this_month.checked_sub_months(Months::new(back)))
        .filter_map(|month_start| {
            let bounds = month_bounds(month_start);
            let within = period_entries(entries, bounds.start, bounds.end);
            within.last().map(|latest| MonthPoint {
                month: month_start.format("%Y-%m").to_string(),
                latest_kg: latest.weight_kg,
                entry_count: within.len(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalStatus {
    pub target_weight_kg: f64,
    pub target_date: Option<NaiveDate>,
    pub starting_weight_kg: Option<f64>,
    /// Current weight minus target; negative once the target is passed.
    pub remaining_kg: Option<f64>,
    /// How much of the planned loss has happened, 0 to 100.
    pub percent_complete: Option<f64>,
    pub reached: bool,
}

fn goal_status(
    goal: &WeightGoal,
    current_kg: Option<f64>,
    earliest_kg: Option<f64>,
) -> GoalStatus {
    let starting_weight_kg = goal.initial_weight_kg.or(earliest_kg);
    let remaining_kg = current_kg.map(|c| c - goal.target_weight_kg);
    let percent_complete = match (starting_weight_kg, current_kg) {
        (Some(start), Some(current)) if start > goal.target_weight_kg => {
            let planned = start - goal.target_weight_kg;
            Some(((start - current) / planned * 100.0).clamp(0.0, 100.0))
        }
        _ => None,
    };
    GoalStatus {
        target_weight_kg: goal.target_weight_kg,
        target_date: goal.target_date,
        starting_weight_kg,
        remaining_kg,
        percent_complete,
        reached: remaining_kg.is_some_and(|r| r <= 0.0),
    }
}

/// Everything a dashboard needs, derived from one snapshot of entries and goal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressView {
    pub today: NaiveDate,
    pub entry_count: usize,
    pub current_weight_kg: Option<f64>,
    pub has_entry_today: bool,
    pub delta_vs_previous_kg: Option<f64>,
    pub total_change_kg: f64,
    pub insight: InsightCategory,
    pub goal: Option<GoalStatus>,
    pub projection: Option<GoalProjection>,
    pub pace: Option<Pace>,
    pub daily: DailyProgress,
    pub weekly: PeriodSummary,
    pub monthly: PeriodSummary,
    pub monthly_chart: Vec<MonthPoint>,
    pub timeline: Vec<TimelinePoint>,
}

impl ProgressView {
    #[must_use]
    pub fn build(entries: &[WeightEntry], goal: Option<&WeightGoal>, today: NaiveDate) -> Self {
        let current_weight_kg = current_weight(entries, today).map(|e| e.weight_kg);
        let earliest_kg = oldest_first(entries).first().map(|e| e.weight_kg);
        let delta = delta_vs_previous(entries, today);

        let projection = goal_projection(current_weight_kg, goal, today);
        let pace = effective_pace(projection.as_ref(), goal);
        let daily_g = pace.and_then(|p| p.daily_g);

        let daily = DailyProgress {
            delta_kg: delta,
            trend: delta.map(Trend::from_delta),
            goal_g: daily_g,
            goal_progress_pct: progress_percent(delta.map(|d| d * 1000.0), daily_g),
            track: daily_goal_track(entries, daily_g),
        };

        Self {
            today,
            entry_count: entries.len(),
            current_weight_kg,
            has_entry_today: entry_on(entries, today).is_some(),
            delta_vs_previous_kg: delta,
            total_change_kg: total_change(entries, today),
            insight: insight_category(entries, today),
            goal: goal.map(|g| goal_status(g, current_weight_kg, earliest_kg)),
            projection,
            pace,
            daily,
            weekly: summarize_period(
                entries,
                week_bounds(today),
                previous_week(today),
                pace.and_then(|p| p.weekly_kg),
            ),
            monthly: summarize_period(
                entries,
                month_bounds(today),
                previous_month(today),
                pace.and_then(|p| p.monthly_kg),
            ),
            monthly_chart: monthly_chart(entries, today),
            timeline: timeline(entries, TIMELINE_LEN),
        }
    }
}

/// A loss goal must sit below at least one recorded weight. An empty
/// history accepts any target.
pub fn check_goal_target(
    target_weight_kg: f64,
    weights: impl IntoIterator<Item = f64>,
) -> Result<()> {
    let mut weights = weights.into_iter().peekable();
    if weights.peek().is_some() && weights.all(|kg| target_weight_kg >= kg) {
        return Err(invalid(format!(
            "Target weight {target_weight_kg:.1} kg is not below any recorded weight"
        )));
    }
    Ok(())
}

/// Reject inputs the engine must never be handed: non-finite or
/// non-positive weights, malformed goal figures, and a goal target that is
/// not below any recorded weight.
pub fn check_inputs(entries: &[WeightEntry], goal: Option<&WeightGoal>) -> Result<()> {
    for entry in entries {
        validate_weight(entry.weight_kg)
            .with_context(|| format!("Weight entry {} on {}", entry.id, entry.date))?;
    }
    if let Some(goal) = goal {
        validate_goal(&NewWeightGoal::from(goal)).context("Weight goal")?;
        check_goal_target(goal.target_weight_kg, entries.iter().map(|e| e.weight_kg))
            .context("Weight goal")?;
    }
    Ok(())
}
