use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};

use weighin_core::models::User;
use weighin_core::service::WeighinService;

pub(crate) const LBS_PER_KG: f64 = 2.20462;
const KG_PER_LB: f64 = 0.453_592;

/// Resolve a date argument relative to the local calendar. `None` is today.
pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    let today = Local::now().date_naive();
    let Some(raw) = date_str else {
        return Ok(today);
    };
    let offset = match raw.trim().to_lowercase().as_str() {
        "today" => 0,
        "yesterday" => -1,
        "tomorrow" => 1,
        _ => {
            return NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").with_context(|| {
                format!("Date '{raw}' is not YYYY-MM-DD, today, yesterday or tomorrow")
            });
        }
    };
    Ok(today + chrono::Duration::days(offset))
}

/// Convert a value in `unit` (kg or lbs) to kilograms.
pub(crate) fn to_kg(value: f64, unit: &str) -> Result<f64> {
    if !(value.is_finite() && value > 0.0) {
        bail!("Weight must be a positive number, got {value}");
    }
    match unit.to_lowercase().as_str() {
        "kg" => Ok(value),
        "lbs" | "lb" => {
            let kg = value * KG_PER_LB;
            eprintln!("{value:.1} lbs = {kg:.2} kg");
            Ok(kg)
        }
        other => bail!("Unknown unit '{other}'; expected kg or lbs"),
    }
}

/// Look up the user named by `--user` / `WEIGHIN_USER`.
pub(crate) fn resolve_user(svc: &WeighinService, username: Option<&str>) -> Result<User> {
    let Some(username) = username.map(str::trim).filter(|u| !u.is_empty()) else {
        bail!("No user selected. Pass --user <NAME> or set WEIGHIN_USER");
    };
    svc.find_user(username)?.with_context(|| {
        format!("Unknown user '{username}'. Create it with `weighin user add {username}`")
    })
}

/// Ask for a new password on the terminal without echoing it, twice.
pub(crate) fn prompt_new_password() -> Result<String> {
    let first = rpassword::prompt_password("Password: ").context("Failed to read password")?;
    let second =
        rpassword::prompt_password("Repeat password: ").context("Failed to read password")?;
    confirm_password(first, second)
}

pub(crate) fn confirm_password(first: String, second: String) -> Result<String> {
    if first != second {
        bail!("Passwords do not match");
    }
    Ok(first)
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn format_kg(kg: Option<f64>) -> String {
    kg.map_or("-".into(), |v| format!("{:.1}", no_neg_zero(v)))
}

/// Signed kilograms, e.g. `-0.5` or `+1.2`.
pub(crate) fn format_delta(kg: Option<f64>) -> String {
    match kg {
        Some(v) => {
            let v = no_neg_zero((v * 10.0).round() / 10.0);
            if v > 0.0 {
                format!("+{v:.1}")
            } else {
                format!("{v:.1}")
            }
        }
        None => "-".into(),
    }
}

pub(crate) fn format_pct(pct: Option<f64>) -> String {
    pct.map_or("-".into(), |p| format!("{p:.0}%"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_relative_words() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(None).unwrap(), today);
        assert_eq!(parse_date(Some(" Today ".into())).unwrap(), today);
        assert_eq!(
            parse_date(Some("yesterday".into())).unwrap().succ_opt(),
            Some(today)
        );
        assert_eq!(
            parse_date(Some("tomorrow".into())).unwrap().pred_opt(),
            Some(today)
        );
    }

    #[test]
    fn test_parse_date_weigh_in_day() {
        assert_eq!(
            parse_date(Some("2024-02-29".into())).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(parse_date(Some("2023-02-29".into())).is_err());
        assert!(parse_date(Some("29/02/2024".into())).is_err());
    }

    #[test]
    fn test_to_kg() {
        assert!((to_kg(80.0, "kg").unwrap() - 80.0).abs() < f64::EPSILON);
        assert!((to_kg(100.0, "LBS").unwrap() - 45.3592).abs() < 1e-9);
        assert!(to_kg(80.0, "stone").is_err());
        assert!(to_kg(0.0, "kg").is_err());
        assert!(to_kg(f64::NAN, "kg").is_err());
    }

    #[test]
    fn test_resolve_user() {
        let svc = WeighinService::new_in_memory().unwrap();
        svc.register("maria", "password123", None).unwrap();
        assert_eq!(resolve_user(&svc, Some("maria")).unwrap().username, "maria");
        assert!(resolve_user(&svc, None).is_err());
        assert!(resolve_user(&svc, Some("  ")).is_err());
        assert!(resolve_user(&svc, Some("joao")).is_err());
    }

    #[test]
    fn test_confirm_password() {
        assert_eq!(
            confirm_password("password123".into(), "password123".into()).unwrap(),
            "password123"
        );
        let err = confirm_password("password123".into(), "password124".into()).unwrap_err();
        assert_eq!(err.to_string(), "Passwords do not match");
    }

    #[test]
    fn test_weight_formatting() {
        assert_eq!(format_delta(Some(-0.5)), "-0.5");
        assert_eq!(format_delta(Some(1.24)), "+1.2");
        assert_eq!(format_delta(Some(-0.01)), "0.0");
        assert_eq!(format_delta(None), "-");
        assert_eq!(format_kg(Some(-0.0)), "0.0");
        assert_eq!(format_kg(Some(79.96)), "80.0");
        assert_eq!(format_kg(None), "-");
    }
}
