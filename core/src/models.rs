use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const MIN_USERNAME_LEN: usize = 2;
pub const MIN_PASSWORD_LEN: usize = 8;

// --- Users ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: String,
}

/// Stored user row, including the password hash. Never serialized.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub user: User,
    pub expires_at: String,
}

// --- Weight entries ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightEntry {
    pub id: i64,
    pub uuid: String,
    pub user_id: i64,
    pub date: NaiveDate,
    pub weight_kg: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewWeightEntry {
    pub date: NaiveDate,
    pub weight_kg: f64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
#[allow(clippy::option_option)]
pub struct UpdateWeightEntry {
    pub date: Option<NaiveDate>,
    pub weight_kg: Option<f64>,
    pub notes: Option<Option<String>>,
}

impl UpdateWeightEntry {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.weight_kg.is_none() && self.notes.is_none()
    }
}

// --- Goals ---

/// A user's single active goal.
///
/// `daily_goal_g` is in grams per day; `weekly_goal_kg` and `monthly_goal_kg`
/// are kilograms per week and per 30-day month. All three are snapshots taken
/// when the goal was saved and are not refreshed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightGoal {
    pub id: i64,
    pub user_id: i64,
    pub target_weight_kg: f64,
    pub target_date: Option<NaiveDate>,
    pub initial_weight_kg: Option<f64>,
    pub daily_goal_g: Option<f64>,
    pub weekly_goal_kg: Option<f64>,
    pub monthly_goal_kg: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewWeightGoal {
    pub target_weight_kg: f64,
    pub target_date: Option<NaiveDate>,
    pub initial_weight_kg: Option<f64>,
    pub daily_goal_g: Option<f64>,
    pub weekly_goal_kg: Option<f64>,
    pub monthly_goal_kg: Option<f64>,
}

impl From<&WeightGoal> for NewWeightGoal {
    fn from(goal: &WeightGoal) -> Self {
        Self {
            target_weight_kg: goal.target_weight_kg,
            target_date: goal.target_date,
            initial_weight_kg: goal.initial_weight_kg,
            daily_goal_g: goal.daily_goal_g,
            weekly_goal_kg: goal.weekly_goal_kg,
            monthly_goal_kg: goal.monthly_goal_kg,
        }
    }
}

/// What a user asks for when saving a goal. Pace fields left empty are
/// derived from the current weight and target date at save time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoalRequest {
    pub target_weight_kg: f64,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    #[serde(default)]
    pub daily_goal_g: Option<f64>,
    #[serde(default)]
    pub weekly_goal_kg: Option<f64>,
    #[serde(default)]
    pub monthly_goal_kg: Option<f64>,
}

// --- Export / Import ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportWeightEntry {
    pub uuid: String,
    pub date: String,
    #[serde(alias = "weight")]
    pub weight_kg: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportGoal {
    pub target_weight_kg: f64,
    #[serde(default)]
    pub target_date: Option<String>,
    #[serde(default)]
    pub initial_weight_kg: Option<f64>,
    #[serde(default)]
    pub daily_goal_g: Option<f64>,
    #[serde(default)]
    pub weekly_goal_kg: Option<f64>,
    #[serde(default)]
    pub monthly_goal_kg: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportData {
    pub version: i64,
    pub exported_at: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub weight_entries: Vec<ExportWeightEntry>,
    #[serde(default)]
    pub goal: Option<ExportGoal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub weight_entries_imported: i64,
    pub weight_entries_skipped: i64,
    pub goal_imported: bool,
}

pub const EXPORT_VERSION: i64 = 1;

// --- Validation ---

/// A request refused because of what the caller sent, as opposed to a
/// storage or internal failure. Front ends report these back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Conflict(String),
}

pub(crate) fn invalid(msg: impl Into<String>) -> anyhow::Error {
    Rejection::Invalid(msg.into()).into()
}

pub fn validate_weight(weight_kg: f64) -> Result<()> {
    if !weight_kg.is_finite() {
        return Err(invalid("Weight must be a finite number"));
    }
    if weight_kg <= 0.0 {
        return Err(invalid("Weight must be greater than 0"));
    }
    Ok(())
}

/// Trim and check a username, returning the normalized form.
pub fn validate_username(username: &str) -> Result<String> {
    let name = username.trim();
    if name.chars().count() < MIN_USERNAME_LEN {
        return Err(invalid(format!(
            "Username must be at least {MIN_USERNAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(invalid(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_pace(label: &str, value: Option<f64>) -> Result<()> {
    if let Some(v) = value {
        if !v.is_finite() || v < 0.0 {
            return Err(invalid(format!("{label} must be a non-negative number")));
        }
    }
    Ok(())
}

/// Validate a goal row before it is stored: positive target, sane paces.
pub fn validate_goal(goal: &NewWeightGoal) -> Result<()> {
    if !goal.target_weight_kg.is_finite() || goal.target_weight_kg <= 0.0 {
        return Err(invalid("Target weight must be greater than 0"));
    }
    if let Some(initial) = goal.initial_weight_kg {
        validate_weight(initial)?;
    }
    validate_pace("daily_goal_g", goal.daily_goal_g)?;
    validate_pace("weekly_goal_kg", goal.weekly_goal_kg)?;
    validate_pace("monthly_goal_kg", goal.monthly_goal_kg)?;
    Ok(())
}

/// Validate an imported weight entry: weight > 0, valid date.
pub fn validate_export_entry(entry: &ExportWeightEntry) -> Result<()> {
    validate_weight(entry.weight_kg)?;
    NaiveDate::parse_from_str(&entry.date, "%Y-%m-%d").map_err(|_| {
        invalid(format!(
            "Invalid weight entry date '{}'. Must be YYYY-MM-DD",
            entry.date
        ))
    })?;
    Ok(())
}

/// Validate an imported goal and convert it to a storable row.
pub fn validate_export_goal(goal: &ExportGoal) -> Result<NewWeightGoal> {
    let target_date = goal
        .target_date
        .as_deref()
        .map(|d| {
            NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map_err(|_| invalid(format!("Invalid goal target_date '{d}'. Must be YYYY-MM-DD")))
        })
        .transpose()?;
    let new_goal = NewWeightGoal {
        target_weight_kg: goal.target_weight_kg,
        target_date,
        initial_weight_kg: goal.initial_weight_kg,
        daily_goal_g: goal.daily_goal_g,
        weekly_goal_kg: goal.weekly_goal_kg,
        monthly_goal_kg: goal.monthly_goal_kg,
    };
    validate_goal(&new_goal)?;
    Ok(new_goal)
}
