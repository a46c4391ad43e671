use anyhow::Result;
use chrono::Local;

use weighin_core::models::{GoalRequest, User, WeightGoal};
use weighin_core::service::WeighinService;

use super::helpers::{LBS_PER_KG, format_kg, parse_date, to_kg};

fn print_goal(goal: &WeightGoal) {
    println!(
        "Target:   {:.1} kg ({:.1} lbs)",
        goal.target_weight_kg,
        goal.target_weight_kg * LBS_PER_KG
    );
    if let Some(date) = goal.target_date {
        println!("By:       {}", date.format("%Y-%m-%d"));
    }
    if let Some(initial) = goal.initial_weight_kg {
        println!("Started:  {initial:.1} kg");
    }
    if let Some(g) = goal.daily_goal_g {
        println!("Daily:    {g:.0} g/day");
    }
    if goal.weekly_goal_kg.is_some() {
        println!("Weekly:   {} kg/week", format_kg(goal.weekly_goal_kg));
    }
    if goal.monthly_goal_kg.is_some() {
        println!("Monthly:  {} kg/month", format_kg(goal.monthly_goal_kg));
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_goal_set(
    svc: &WeighinService,
    user: &User,
    target: f64,
    unit: &str,
    by: Option<String>,
    daily_g: Option<f64>,
    weekly_kg: Option<f64>,
    monthly_kg: Option<f64>,
    json: bool,
) -> Result<()> {
    let request = GoalRequest {
        target_weight_kg: to_kg(target, unit)?,
        target_date: by.map(|d| parse_date(Some(d))).transpose()?,
        daily_goal_g: daily_g,
        weekly_goal_kg: weekly_kg,
        monthly_goal_kg: monthly_kg,
    };
    let goal = svc.save_goal(user.id, &request, Local::now().date_naive())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&goal)?);
    } else {
        println!("Goal saved.");
        print_goal(&goal);
    }
    Ok(())
}

pub(crate) fn cmd_goal_show(svc: &WeighinService, user: &User, json: bool) -> Result<()> {
    let goal = svc.goal(user.id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&goal)?);
    } else if let Some(goal) = goal {
        print_goal(&goal);
    } else {
        eprintln!("No goal set. Use `weighin goal set <TARGET>` to set one.");
    }
    Ok(())
}

pub(crate) fn cmd_goal_clear(svc: &WeighinService, user: &User, json: bool) -> Result<()> {
    let cleared = svc.clear_goal(user.id)?;
    if json {
        println!("{}", serde_json::json!({ "cleared": cleared }));
    } else if cleared {
        println!("Goal cleared");
    } else {
        println!("No goal was set");
    }
    Ok(())
}
