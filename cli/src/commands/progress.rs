use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use weighin_core::models::User;
use weighin_core::progress::{InsightCategory, PaceSource, PeriodSummary, ProgressView};
use weighin_core::service::WeighinService;

use super::helpers::{format_delta, format_kg, format_pct, parse_date};

pub(crate) fn insight_message(category: InsightCategory) -> &'static str {
    match category {
        InsightCategory::NoEntryToday => "No weigh-in yet today. Log one to see how the day went.",
        InsightCategory::NoBaseline => "First weigh-in recorded. Come back tomorrow to compare.",
        InsightCategory::StrongLoss => "Great result! A solid drop since the last weigh-in.",
        InsightCategory::MildLoss => "Nice, you are trending down.",
        InsightCategory::Stable => "Holding steady. Consistency pays off.",
        InsightCategory::MildGain => "A small bump. Day-to-day swings are normal.",
        InsightCategory::NotableGain => "Up noticeably since last time. Worth keeping an eye on.",
    }
}

fn print_period(label: &str, p: &PeriodSummary) {
    println!(
        "{label} ({} to {}): {} entries, change {} kg, vs previous {} kg, goal {}",
        p.start.format("%Y-%m-%d"),
        p.end.format("%Y-%m-%d"),
        p.entry_count,
        format_delta(p.delta_kg),
        format_delta(p.vs_previous_kg),
        format_pct(p.goal_progress_pct),
    );
}

fn print_view(view: &ProgressView) {
    println!("Progress for {}", view.today.format("%Y-%m-%d"));
    println!();
    println!("Current weight:  {} kg", format_kg(view.current_weight_kg));
    println!(
        "Since last:      {} kg",
        format_delta(view.delta_vs_previous_kg)
    );
    println!(
        "Total change:    {} kg",
        format_delta(Some(view.total_change_kg))
    );
    println!("{}", insight_message(view.insight));

    if let Some(goal) = &view.goal {
        println!();
        print!("Goal:            {:.1} kg", goal.target_weight_kg);
        if let Some(date) = goal.target_date {
            print!(" by {}", date.format("%Y-%m-%d"));
        }
        println!();
        if goal.reached {
            println!("Target reached!");
        } else {
            println!("Remaining:       {} kg", format_kg(goal.remaining_kg));
        }
        println!("Complete:        {}", format_pct(goal.percent_complete));
    }

    if let Some(p) = &view.projection {
        println!(
            "To get there:    {:.0} g/day, {:.2} kg/week, {:.2} kg/month ({} days left)",
            p.daily_pace_g, p.weekly_pace_kg, p.monthly_pace_kg, p.days_remaining
        );
    } else if let Some(pace) = view.pace.filter(|p| p.source == PaceSource::Stored) {
        println!(
            "Saved pace:      {} g/day, {} kg/week, {} kg/month",
            pace.daily_g.map_or("-".into(), |g| format!("{g:.0}")),
            format_kg(pace.weekly_kg),
            format_kg(pace.monthly_kg),
        );
    }
    if view.daily.goal_progress_pct.is_some() {
        println!(
            "Today vs daily:  {}",
            format_pct(view.daily.goal_progress_pct)
        );
    }

    println!();
    print_period("This week", &view.weekly);
    print_period("This month", &view.monthly);

    if !view.daily.track.is_empty() && view.daily.goal_g.is_some() {
        #[derive(Tabled)]
        struct TrackRow {
            #[tabled(rename = "Date")]
            date: String,
            #[tabled(rename = "Weight")]
            weight: String,
            #[tabled(rename = "Expected")]
            expected: String,
            #[tabled(rename = "On track")]
            met: String,
        }
        let rows: Vec<TrackRow> = view
            .daily
            .track
            .iter()
            .map(|t| TrackRow {
                date: t.date.format("%Y-%m-%d").to_string(),
                weight: format_kg(Some(t.weight_kg)),
                expected: format_kg(t.expected_kg),
                met: match t.met_goal {
                    Some(true) => "yes".into(),
                    Some(false) => "no".into(),
                    None => "-".into(),
                },
            })
            .collect();
        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(1..3)).with(Alignment::right()))
            .to_string();
        println!();
        println!("{table}");
    }

    if !view.monthly_chart.is_empty() {
        println!();
        println!("Monthly (latest weight):");
        for m in &view.monthly_chart {
            println!("  {}  {:>6.1} kg", m.month, m.latest_kg);
        }
    }

    if !view.timeline.is_empty() {
        #[derive(Tabled)]
        struct TimelineRow {
            #[tabled(rename = "ID")]
            id: i64,
            #[tabled(rename = "Date")]
            date: String,
            #[tabled(rename = "Weight (kg)")]
            weight: String,
            #[tabled(rename = "Change")]
            change: String,
        }
        let rows: Vec<TimelineRow> = view
            .timeline
            .iter()
            .map(|t| TimelineRow {
                id: t.id,
                date: t.date.format("%Y-%m-%d").to_string(),
                weight: format_kg(Some(t.weight_kg)),
                change: format_delta(t.variation_kg),
            })
            .collect();
        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
            .to_string();
        println!();
        println!("{table}");
    }
}

pub(crate) fn cmd_progress(
    svc: &WeighinService,
    user: &User,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let today = parse_date(date)?;
    let view = svc.progress(user.id, today)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_view(&view);
    }
    Ok(())
}
