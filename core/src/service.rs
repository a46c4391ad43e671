use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use tracing::debug;

use crate::auth;
use crate::db::Database;
use crate::models::{
    ExportData, GoalRequest, ImportSummary, NewWeightEntry, NewWeightGoal, Rejection, Session,
    UpdateWeightEntry, User, UserRecord, WeightEntry, WeightGoal, invalid, validate_goal,
    validate_password, validate_username, validate_weight,
};
use crate::progress::{self, ProgressView};

pub const SESSION_DAYS: i64 = 30;

/// Entry point shared by the CLI and the HTTP server.
///
/// Every data operation names the user it acts for; there is no ambient
/// "current user".
pub struct WeighinService {
    db: Database,
}

fn clean_text(text: Option<&str>) -> Option<String> {
    text
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

impl WeighinService {
    pub fn new(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    // --- Users and sessions ---

    pub fn register(&self, username: &str, password: &str, name: Option<&str>) -> Result<User> {
        let username = self.check_registration(username, password)?;
        let hash = auth::hash_password(password)?;
        self.create_user(&username, name, &hash)
    }

    /// Validate a registration and make sure the username is free, returning
    /// the normalized username. The password is not hashed here, so callers
    /// on an async runtime can hash off the request thread.
    pub fn check_registration(&self, username: &str, password: &str) -> Result<String> {
        let username = validate_username(username)?;
        validate_password(password)?;
        self.ensure_username_free(&username)?;
        Ok(username)
    }

    /// Store a user whose password has already been hashed.
    pub fn create_user(
        &self,
        username: &str,
        name: Option<&str>,
        password_hash: &str,
    ) -> Result<User> {
        let username = validate_username(username)?;
        self.ensure_username_free(&username)?;
        let name = clean_text(name);
        let user = self.db.create_user(&username, name.as_deref(), password_hash)?;
        debug!(user_id = user.id, "registered user");
        Ok(user)
    }

    fn ensure_username_free(&self, username: &str) -> Result<()> {
        if self.db.find_user_record(username)?.is_some() {
            return Err(Rejection::Conflict(format!("Username '{username}' is already taken")).into());
        }
        Ok(())
    }

    /// `Ok(None)` for an unknown user or a wrong password; callers must not
    /// reveal which.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Option<User>> {
        let Some(record) = self.credentials(username)? else {
            return Ok(None);
        };
        if auth::verify_password(password, &record.password_hash)? {
            Ok(Some(record.user))
        } else {
            Ok(None)
        }
    }

    /// The stored user row with its password hash, for callers that verify
    /// the password themselves.
    pub fn credentials(&self, username: &str) -> Result<Option<UserRecord>> {
        self.db.find_user_record(username.trim())
    }

    pub fn open_session(&self, user: &User, now: DateTime<Utc>) -> Result<Session> {
        self.db.purge_expired_sessions(now)?;
        let token = auth::generate_session_token();
        let expires_at = now + Duration::days(SESSION_DAYS);
        self.db
            .create_session(&auth::token_digest(&token), user.id, expires_at)?;
        debug!(user_id = user.id, "opened session");
        Ok(Session {
            token,
            user: user.clone(),
            expires_at: expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }

    pub fn resolve_session(&self, token: &str, now: DateTime<Utc>) -> Result<Option<User>> {
        self.db.session_user(&auth::token_digest(token), now)
    }

    pub fn close_session(&self, token: &str) -> Result<bool> {
        self.db.delete_session(&auth::token_digest(token))
    }

    pub fn find_user(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .db
            .find_user_record(username.trim())?
            .map(|record| record.user))
    }

    pub fn user(&self, id: i64) -> Result<Option<User>> {
        self.db.get_user(id)
    }

    // --- Weight entries ---

    pub fn log_weight(&self, user_id: i64, entry: &NewWeightEntry) -> Result<WeightEntry> {
        validate_weight(entry.weight_kg)?;
        let entry = NewWeightEntry {
            notes: clean_text(entry.notes.as_deref()),
            ..entry.clone()
        };
        let stored = self.db.insert_weight(user_id, &entry)?;
        debug!(user_id, entry_id = stored.id, date = %stored.date, "logged weight");
        Ok(stored)
    }

    pub fn update_weight(
        &self,
        user_id: i64,
        id: i64,
        update: &UpdateWeightEntry,
    ) -> Result<Option<WeightEntry>> {
        if update.is_empty() {
            return Err(invalid("Nothing to update"));
        }
        if let Some(weight_kg) = update.weight_kg {
            validate_weight(weight_kg)?;
        }
        let update = UpdateWeightEntry {
            notes: update.notes.as_ref().map(|n| clean_text(n.as_deref())),
            ..update.clone()
        };
        let updated = self.db.update_weight(user_id, id, &update)?;
        if updated.is_some() {
            debug!(user_id, entry_id = id, "updated weight");
        }
        Ok(updated)
    }

    pub fn delete_weight(&self, user_id: i64, id: i64) -> Result<bool> {
        let deleted = self.db.delete_weight(user_id, id)?;
        if deleted {
            debug!(user_id, entry_id = id, "deleted weight");
        }
        Ok(deleted)
    }

    pub fn weight_entry(&self, user_id: i64, id: i64) -> Result<Option<WeightEntry>> {
        self.db.get_weight_entry(user_id, id)
    }

    /// Newest first.
    pub fn entries(&self, user_id: i64, limit: Option<i64>) -> Result<Vec<WeightEntry>> {
        self.db.list_weights(user_id, limit)
    }

    pub fn entries_between(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<WeightEntry>> {
        if start > end {
            return Err(invalid(format!("Start date {start} is after end date {end}")));
        }
        self.db.list_weights_between(user_id, start, end)
    }

    // --- Goal ---

    pub fn goal(&self, user_id: i64) -> Result<Option<WeightGoal>> {
        self.db.get_goal(user_id)
    }

    /// Save the user's goal, replacing any previous one.
    ///
    /// The current weight is recorded as the starting weight, and pace fields
    /// the request leaves empty are filled from the projection for `today`.
    pub fn save_goal(
        &self,
        user_id: i64,
        request: &GoalRequest,
        today: NaiveDate,
    ) -> Result<WeightGoal> {
        let mut goal = NewWeightGoal {
            target_weight_kg: request.target_weight_kg,
            target_date: request.target_date,
            daily_goal_g: request.daily_goal_g,
            weekly_goal_kg: request.weekly_goal_kg,
            monthly_goal_kg: request.monthly_goal_kg,
            ..NewWeightGoal::default()
        };
        validate_goal(&goal)?;

        if let Some(target_date) = goal.target_date {
            if target_date <= today {
                return Err(invalid(format!(
                    "Target date {target_date} must be after {today}"
                )));
            }
        }

        let entries = self.db.list_weights(user_id, None)?;
        progress::check_goal_target(goal.target_weight_kg, entries.iter().map(|e| e.weight_kg))?;

        let current = progress::current_weight(&entries, today).map(|e| e.weight_kg);
        goal.initial_weight_kg = current;

        let projection = current
            .zip(goal.target_date)
            .and_then(|(kg, date)| progress::project(kg, goal.target_weight_kg, date, today));
        if let Some(p) = projection {
            goal.daily_goal_g = goal.daily_goal_g.or(Some(p.daily_pace_g));
            goal.weekly_goal_kg = goal.weekly_goal_kg.or(Some(p.weekly_pace_kg));
            goal.monthly_goal_kg = goal.monthly_goal_kg.or(Some(p.monthly_pace_kg));
        }

        let saved = self.db.upsert_goal(user_id, &goal)?;
        debug!(user_id, target_kg = saved.target_weight_kg, "saved goal");
        Ok(saved)
    }

    pub fn clear_goal(&self, user_id: i64) -> Result<bool> {
        let cleared = self.db.delete_goal(user_id)?;
        if cleared {
            debug!(user_id, "cleared goal");
        }
        Ok(cleared)
    }

    // --- Progress ---

    pub fn progress(&self, user_id: i64, today: NaiveDate) -> Result<ProgressView> {
        let entries = self.db.list_weights(user_id, None)?;
        let goal = self.db.get_goal(user_id)?;
        progress::check_inputs(&entries, goal.as_ref())
            .context("Stored data cannot be used for progress")?;
        Ok(ProgressView::build(&entries, goal.as_ref(), today))
    }

    // --- Export / Import ---

    pub fn export(&self, user_id: i64) -> Result<ExportData> {
        self.db.export_user(user_id)
    }

    pub fn import(&self, user_id: i64, data: &ExportData) -> Result<ImportSummary> {
        let summary = self.db.import_user(user_id, data)?;
        debug!(
            user_id,
            imported = summary.weight_entries_imported,
            skipped = summary.weight_entries_skipped,
            "imported data"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{InsightCategory, PaceSource};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn svc_with_user() -> (WeighinService, User) {
        let svc = WeighinService::new_in_memory().unwrap();
        let user = svc.register("maria", "password123", Some("Maria")).unwrap();
        (svc, user)
    }

    fn log(svc: &WeighinService, user_id: i64, d: &str, kg: f64) -> WeightEntry {
        svc.log_weight(
            user_id,
            &NewWeightEntry {
                date: date(d),
                weight_kg: kg,
                notes: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_register_and_authenticate() {
        let (svc, user) = svc_with_user();
        assert_eq!(user.name.as_deref(), Some("Maria"));

        let found = svc.authenticate("maria", "password123").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(svc.authenticate("maria", "wrong-password").unwrap().is_none());
        assert!(svc.authenticate("nobody", "password123").unwrap().is_none());
    }

    #[test]
    fn test_register_duplicate_is_conflict() {
        let (svc, _) = svc_with_user();
        let err = svc.register(" Maria ", "password456", None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Rejection>(),
            Some(Rejection::Conflict(_))
        ));
    }

    #[test]
    fn test_registration_in_steps() {
        let svc = WeighinService::new_in_memory().unwrap();
        let username = svc.check_registration("  maria ", "password123").unwrap();
        assert_eq!(username, "maria");
        assert!(svc.check_registration("maria", "short").is_err());

        let hash = auth::hash_password("password123").unwrap();
        let user = svc.create_user(&username, Some(" Maria "), &hash).unwrap();
        assert_eq!(user.name.as_deref(), Some("Maria"));

        let err = svc.check_registration("MARIA", "password123").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Rejection>(),
            Some(Rejection::Conflict(_))
        ));
        assert!(svc.create_user("maria", None, &hash).is_err());

        let record = svc.credentials(" Maria").unwrap().unwrap();
        assert_eq!(record.user, user);
        assert!(auth::verify_password("password123", &record.password_hash).unwrap());
        assert!(svc.credentials("joao").unwrap().is_none());
    }

    #[test]
    fn test_register_validates_input() {
        let svc = WeighinService::new_in_memory().unwrap();
        let short = svc.register("maria", "1234", None).unwrap_err();
        assert!(matches!(
            short.downcast_ref::<Rejection>(),
            Some(Rejection::Invalid(_))
        ));
        assert!(svc.register("m", "password123", None).is_err());
    }

    #[test]
    fn test_session_roundtrip() {
        let (svc, user) = svc_with_user();
        let now = Utc::now();
        let session = svc.open_session(&user, now).unwrap();
        assert_eq!(session.token.len(), 64);

        let resolved = svc.resolve_session(&session.token, now).unwrap().unwrap();
        assert_eq!(resolved.id, user.id);
        assert!(svc.resolve_session("not-a-token", now).unwrap().is_none());

        let later = now + Duration::days(SESSION_DAYS + 1);
        assert!(svc.resolve_session(&session.token, later).unwrap().is_none());

        assert!(svc.close_session(&session.token).unwrap());
        assert!(svc.resolve_session(&session.token, now).unwrap().is_none());
    }

    #[test]
    fn test_log_weight_rejects_invalid() {
        let (svc, user) = svc_with_user();
        for kg in [0.0, -3.0, f64::NAN] {
            let entry = NewWeightEntry {
                date: date("2024-01-01"),
                weight_kg: kg,
                notes: None,
            };
            assert!(svc.log_weight(user.id, &entry).is_err());
        }
        assert!(svc.entries(user.id, None).unwrap().is_empty());
    }

    #[test]
    fn test_log_weight_trims_notes() {
        let (svc, user) = svc_with_user();
        let entry = svc
            .log_weight(
                user.id,
                &NewWeightEntry {
                    date: date("2024-01-01"),
                    weight_kg: 80.0,
                    notes: Some("   ".to_string()),
                },
            )
            .unwrap();
        assert!(entry.notes.is_none());
    }

    #[test]
    fn test_update_weight_requires_changes() {
        let (svc, user) = svc_with_user();
        let entry = log(&svc, user.id, "2024-01-01", 80.0);
        assert!(
            svc.update_weight(user.id, entry.id, &UpdateWeightEntry::default())
                .is_err()
        );
        let bad = UpdateWeightEntry {
            weight_kg: Some(-1.0),
            ..UpdateWeightEntry::default()
        };
        assert!(svc.update_weight(user.id, entry.id, &bad).is_err());

        let good = UpdateWeightEntry {
            weight_kg: Some(79.0),
            ..UpdateWeightEntry::default()
        };
        let updated = svc.update_weight(user.id, entry.id, &good).unwrap().unwrap();
        assert_eq!(updated.uuid, entry.uuid);
        assert_eq!(updated.weight_kg, 79.0);
    }

    #[test]
    fn test_entries_between_rejects_reversed_range() {
        let (svc, user) = svc_with_user();
        assert!(
            svc.entries_between(user.id, date("2024-02-01"), date("2024-01-01"))
                .is_err()
        );
    }

    #[test]
    fn test_save_goal_derives_paces() {
        let (svc, user) = svc_with_user();
        log(&svc, user.id, "2024-01-02", 80.0);
        let goal = svc
            .save_goal(
                user.id,
                &GoalRequest {
                    target_weight_kg: 70.0,
                    target_date: Some(date("2024-02-01")),
                    ..GoalRequest::default()
                },
                date("2024-01-02"),
            )
            .unwrap();
        assert_eq!(goal.initial_weight_kg, Some(80.0));
        assert!((goal.daily_goal_g.unwrap() - 333.333).abs() < 0.001);
        assert!((goal.monthly_goal_kg.unwrap() - 10.0).abs() < 1e-9);
        assert!(goal.weekly_goal_kg.is_some());
    }

    #[test]
    fn test_save_goal_keeps_explicit_paces() {
        let (svc, user) = svc_with_user();
        log(&svc, user.id, "2024-01-02", 80.0);
        let goal = svc
            .save_goal(
                user.id,
                &GoalRequest {
                    target_weight_kg: 70.0,
                    target_date: Some(date("2024-02-01")),
                    daily_goal_g: Some(100.0),
                    ..GoalRequest::default()
                },
                date("2024-01-02"),
            )
            .unwrap();
        assert_eq!(goal.daily_goal_g, Some(100.0));
        assert!((goal.monthly_goal_kg.unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_save_goal_without_entries_or_date() {
        let (svc, user) = svc_with_user();
        let goal = svc
            .save_goal(
                user.id,
                &GoalRequest {
                    target_weight_kg: 70.0,
                    ..GoalRequest::default()
                },
                date("2024-01-02"),
            )
            .unwrap();
        assert!(goal.initial_weight_kg.is_none());
        assert!(goal.daily_goal_g.is_none());
    }

    #[test]
    fn test_save_goal_rejects_unreachable_target() {
        let (svc, user) = svc_with_user();
        log(&svc, user.id, "2024-01-01", 80.0);
        log(&svc, user.id, "2024-01-02", 79.0);
        let req = GoalRequest {
            target_weight_kg: 80.0,
            ..GoalRequest::default()
        };
        let err = svc.save_goal(user.id, &req, date("2024-01-02")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Rejection>(),
            Some(Rejection::Invalid(_))
        ));
        // Below the earlier weight but above today's is allowed.
        let req = GoalRequest {
            target_weight_kg: 79.5,
            ..GoalRequest::default()
        };
        assert!(svc.save_goal(user.id, &req, date("2024-01-02")).is_ok());
    }

    #[test]
    fn test_save_goal_rejects_past_target_date() {
        let (svc, user) = svc_with_user();
        let req = GoalRequest {
            target_weight_kg: 70.0,
            target_date: Some(date("2024-01-02")),
            ..GoalRequest::default()
        };
        assert!(svc.save_goal(user.id, &req, date("2024-01-02")).is_err());
        assert!(svc.goal(user.id).unwrap().is_none());
    }

    #[test]
    fn test_clear_goal() {
        let (svc, user) = svc_with_user();
        let req = GoalRequest {
            target_weight_kg: 70.0,
            ..GoalRequest::default()
        };
        svc.save_goal(user.id, &req, date("2024-01-02")).unwrap();
        assert!(svc.clear_goal(user.id).unwrap());
        assert!(!svc.clear_goal(user.id).unwrap());
    }

    #[test]
    fn test_progress_matches_engine() {
        let (svc, user) = svc_with_user();
        log(&svc, user.id, "2024-01-01", 80.0);
        log(&svc, user.id, "2024-01-02", 79.5);
        svc.save_goal(
            user.id,
            &GoalRequest {
                target_weight_kg: 70.0,
                target_date: Some(date("2024-02-01")),
                ..GoalRequest::default()
            },
            date("2024-01-01"),
        )
        .unwrap();

        let view = svc.progress(user.id, date("2024-01-02")).unwrap();
        assert_eq!(view.current_weight_kg, Some(79.5));
        assert!((view.delta_vs_previous_kg.unwrap() + 0.5).abs() < 1e-9);
        assert_eq!(view.insight, InsightCategory::StrongLoss);
        assert_eq!(view.pace.unwrap().source, PaceSource::Live);
        assert_eq!(view.projection.unwrap().days_remaining, 30);
    }

    #[test]
    fn test_progress_refuses_goal_above_every_weight() {
        let (svc, user) = svc_with_user();
        log(&svc, user.id, "2024-01-02", 80.0);
        svc.db
            .upsert_goal(
                user.id,
                &NewWeightGoal {
                    target_weight_kg: 90.0,
                    target_date: Some(date("2024-02-01")),
                    ..NewWeightGoal::default()
                },
            )
            .unwrap();

        let err = svc.progress(user.id, date("2024-01-02")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Rejection>(),
            Some(Rejection::Invalid(_))
        ));
    }

    #[test]
    fn test_progress_is_per_user() {
        let (svc, maria) = svc_with_user();
        let joao = svc.register("joao", "password123", None).unwrap();
        log(&svc, maria.id, "2024-01-02", 80.0);
        let view = svc.progress(joao.id, date("2024-01-02")).unwrap();
        assert_eq!(view.entry_count, 0);
        assert!(view.current_weight_kg.is_none());
    }

    #[test]
    fn test_export_import_between_databases() {
        let (svc, user) = svc_with_user();
        log(&svc, user.id, "2024-01-01", 80.0);
        let data = svc.export(user.id).unwrap();

        let (other, other_user) = svc_with_user();
        let summary = other.import(other_user.id, &data).unwrap();
        assert_eq!(summary.weight_entries_imported, 1);
        let again = other.import(other_user.id, &data).unwrap();
        assert_eq!(again.weight_entries_skipped, 1);
    }
}
