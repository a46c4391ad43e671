use anyhow::{Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use weighin_core::models::{NewWeightEntry, UpdateWeightEntry, User, WeightEntry};
use weighin_core::service::WeighinService;

use super::helpers::{LBS_PER_KG, parse_date, to_kg};

fn print_entry(verb: &str, entry: &WeightEntry) {
    println!(
        "{verb} {:.1} kg ({:.1} lbs) for {} [#{}]",
        entry.weight_kg,
        entry.weight_kg * LBS_PER_KG,
        entry.date.format("%Y-%m-%d"),
        entry.id
    );
    if let Some(ref n) = entry.notes {
        println!("  Notes: {n}");
    }
}

pub(crate) fn cmd_weight_log(
    svc: &WeighinService,
    user: &User,
    value: f64,
    unit: &str,
    date: Option<String>,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    let weight_kg = to_kg(value, unit)?;
    let date = parse_date(date)?;
    let result = svc.log_weight(
        user.id,
        &NewWeightEntry {
            date,
            weight_kg,
            notes,
        },
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_entry("Logged", &result);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_weight_update(
    svc: &WeighinService,
    user: &User,
    id: i64,
    value: Option<f64>,
    unit: &str,
    date: Option<String>,
    notes: Option<String>,
    clear_notes: bool,
    json: bool,
) -> Result<()> {
    if notes.is_some() && clear_notes {
        bail!("Use either --notes or --clear-notes, not both");
    }
    let update = UpdateWeightEntry {
        date: date.map(|d| parse_date(Some(d))).transpose()?,
        weight_kg: value.map(|v| to_kg(v, unit)).transpose()?,
        notes: if clear_notes { Some(None) } else { notes.map(Some) },
    };
    if update.is_empty() {
        bail!("Nothing to update. Pass a new weight, --date, --notes or --clear-notes");
    }

    let Some(result) = svc.update_weight(user.id, id, &update)? else {
        bail!("Weight entry {id} not found");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_entry("Updated to", &result);
    }
    Ok(())
}

pub(crate) fn cmd_weight_history(
    svc: &WeighinService,
    user: &User,
    limit: Option<u32>,
    start: Option<String>,
    end: Option<String>,
    json: bool,
) -> Result<()> {
    let mut entries = if start.is_some() || end.is_some() {
        let start = match start {
            Some(s) => parse_date(Some(s))?,
            None => chrono::NaiveDate::MIN,
        };
        let end = parse_date(end)?;
        svc.entries_between(user.id, start, end)?
    } else {
        svc.entries(user.id, None)?
    };
    if let Some(n) = limit {
        entries.truncate(n as usize);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        eprintln!("No weight entries found. Use `weighin weight log` to record your weight.");
    } else {
        #[derive(Tabled)]
        struct WeightRow {
            #[tabled(rename = "ID")]
            id: i64,
            #[tabled(rename = "Date")]
            date: String,
            #[tabled(rename = "Weight (kg)")]
            kg: String,
            #[tabled(rename = "Weight (lbs)")]
            lbs: String,
            #[tabled(rename = "Notes")]
            notes: String,
        }

        let rows: Vec<WeightRow> = entries
            .iter()
            .map(|e| WeightRow {
                id: e.id,
                date: e.date.format("%Y-%m-%d").to_string(),
                kg: format!("{:.1}", e.weight_kg),
                lbs: format!("{:.1}", e.weight_kg * LBS_PER_KG),
                notes: e.notes.clone().unwrap_or_default(),
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }
    Ok(())
}

pub(crate) fn cmd_weight_delete(
    svc: &WeighinService,
    user: &User,
    id: i64,
    json: bool,
) -> Result<()> {
    if !svc.delete_weight(user.id, id)? {
        bail!("Weight entry {id} not found");
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted weight entry {id}");
    }
    Ok(())
}
