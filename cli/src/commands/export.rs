use std::path::Path;

use anyhow::{Context, Result};

use weighin_core::models::{ExportData, User};
use weighin_core::service::WeighinService;

pub(crate) fn cmd_export(svc: &WeighinService, user: &User, output: Option<&Path>) -> Result<()> {
    let data = svc.export(user.id)?;
    let json = serde_json::to_string_pretty(&data)?;

    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "Exported {} weight entries{} to {}",
                data.weight_entries.len(),
                if data.goal.is_some() { " and goal" } else { "" },
                path.display()
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

pub(crate) fn cmd_import(svc: &WeighinService, user: &User, path: &Path, json: bool) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    let data: ExportData = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid export file: {}", path.display()))?;

    let summary = svc.import(user.id, &data)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Import complete.\n");
        println!("  Entries imported: {}", summary.weight_entries_imported);
        println!("  Entries skipped:  {}", summary.weight_entries_skipped);
        println!(
            "  Goal:             {}",
            if summary.goal_imported {
                "replaced"
            } else {
                "unchanged"
            }
        );
    }
    Ok(())
}
