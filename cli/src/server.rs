use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use axum::{
    Extension, Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Local, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use weighin_core::auth;
use weighin_core::models::{
    ExportData, GoalRequest, ImportSummary, NewWeightEntry, Rejection, Session,
    UpdateWeightEntry, User, UserRecord, WeightEntry, WeightGoal,
};
use weighin_core::progress::ProgressView;
use weighin_core::service::WeighinService;

const BODY_LIMIT: usize = 50 * 1024 * 1024; // 50 MB

#[derive(Clone)]
struct AppState {
    svc: Arc<Mutex<WeighinService>>,
}

impl AppState {
    fn svc(&self) -> MutexGuard<'_, WeighinService> {
        self.svc
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// The user a request's session token belongs to.
#[derive(Clone)]
struct CurrentUser(User);

// --- Request / Response types ---

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    password: String,
    name: Option<String>,
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct CreateWeightRequest {
    date: String,
    #[serde(alias = "weight")]
    weight_kg: f64,
    notes: Option<String>,
}

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
#[allow(clippy::option_option)]
struct UpdateWeightRequest {
    date: Option<String>,
    #[serde(alias = "weight")]
    weight_kg: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_some")]
    notes: Option<Option<String>>,
}

#[derive(Deserialize)]
struct EntriesQuery {
    start: Option<String>,
    end: Option<String>,
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct SetGoalRequest {
    target_weight_kg: f64,
    target_date: Option<String>,
    daily_goal_g: Option<f64>,
    weekly_goal_kg: Option<f64>,
    monthly_goal_kg: Option<f64>,
}

#[derive(Deserialize)]
struct ProgressQuery {
    date: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<Rejection>() {
            Some(Rejection::Invalid(msg)) => Self::BadRequest(msg.clone()),
            Some(Rejection::Conflict(msg)) => Self::Conflict(msg.clone()),
            None => Self::Internal(err),
        }
    }
}

fn parse_date(value: &str, field: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        ApiError::BadRequest(format!("Invalid {field} '{value}'. Use YYYY-MM-DD"))
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// --- Middleware ---

async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = bearer_token(request.headers()).map(str::to_string);
    let resolved = match token {
        Some(token) => state.svc().resolve_session(&token, Utc::now()),
        None => Ok(None),
    };

    match resolved {
        Ok(Some(user)) => {
            request.extensions_mut().insert(CurrentUser(user));
            next.run(request).await
        }
        Ok(None) => {
            ApiError::Unauthorized("Invalid or missing session token".to_string()).into_response()
        }
        Err(err) => ApiError::Internal(err).into_response(),
    }
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Public handlers ---

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// Password hashing and verification run on the blocking pool with the
// service lock released.

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let username = state
        .svc()
        .check_registration(&req.username, &req.password)?;
    let password = req.password;
    let hash = tokio::task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .context("password hashing task failed")??;
    let user = state
        .svc()
        .create_user(&username, req.name.as_deref(), &hash)?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Session>, ApiError> {
    let unauthorized = || ApiError::Unauthorized("Invalid username or password".to_string());

    let record = state
        .svc()
        .credentials(&req.username)
        .context("failed to look up user")?;
    let Some(UserRecord {
        user,
        password_hash,
    }) = record
    else {
        return Err(unauthorized());
    };

    let password = req.password;
    let verified =
        tokio::task::spawn_blocking(move || auth::verify_password(&password, &password_hash))
            .await
            .context("password verification task failed")??;
    if !verified {
        return Err(unauthorized());
    }

    let session = state
        .svc()
        .open_session(&user, Utc::now())
        .context("failed to open session")?;
    Ok(Json(session))
}

// --- Session handlers ---

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode, ApiError> {
    if let Some(token) = bearer_token(&headers) {
        state
            .svc()
            .close_session(token)
            .context("failed to close session")?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<User> {
    Json(user)
}

// --- Weight entry handlers ---

async fn list_entries(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(params): Query<EntriesQuery>,
) -> Result<Json<Vec<WeightEntry>>, ApiError> {
    let start = params
        .start
        .as_deref()
        .map(|s| parse_date(s, "start date"))
        .transpose()?;
    let end = params
        .end
        .as_deref()
        .map(|e| parse_date(e, "end date"))
        .transpose()?;
    if params.limit.is_some_and(|n| n < 1) {
        return Err(ApiError::BadRequest("limit must be at least 1".to_string()));
    }

    let svc = state.svc();
    let mut entries = if start.is_some() || end.is_some() {
        svc.entries_between(
            user.id,
            start.unwrap_or(NaiveDate::MIN),
            end.unwrap_or(NaiveDate::MAX),
        )?
    } else {
        svc.entries(user.id, None).context("database error")?
    };
    if let Some(limit) = params.limit {
        entries.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }
    Ok(Json(entries))
}

async fn create_entry(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<CreateWeightRequest>,
) -> Result<(StatusCode, Json<WeightEntry>), ApiError> {
    let entry = NewWeightEntry {
        date: parse_date(&req.date, "date")?,
        weight_kg: req.weight_kg,
        notes: req.notes,
    };
    let created = state.svc().log_weight(user.id, &entry)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_entry(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateWeightRequest>,
) -> Result<Json<WeightEntry>, ApiError> {
    let update = UpdateWeightEntry {
        date: req
            .date
            .as_deref()
            .map(|d| parse_date(d, "date"))
            .transpose()?,
        weight_kg: req.weight_kg,
        notes: req.notes,
    };
    let updated = state
        .svc()
        .update_weight(user.id, id, &update)?
        .ok_or_else(|| ApiError::NotFound(format!("Weight entry {id} not found")))?;
    Ok(Json(updated))
}

async fn delete_entry(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .svc()
        .delete_weight(user.id, id)
        .context("failed to delete weight entry")?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Weight entry {id} not found")))
    }
}

// --- Goal handlers ---

async fn get_goal(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<WeightGoal>, ApiError> {
    let goal = state
        .svc()
        .goal(user.id)
        .context("database error")?
        .ok_or_else(|| ApiError::NotFound("No goal set".to_string()))?;
    Ok(Json(goal))
}

async fn set_goal(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<SetGoalRequest>,
) -> Result<Json<WeightGoal>, ApiError> {
    let request = GoalRequest {
        target_weight_kg: req.target_weight_kg,
        target_date: req
            .target_date
            .as_deref()
            .map(|d| parse_date(d, "target_date"))
            .transpose()?,
        daily_goal_g: req.daily_goal_g,
        weekly_goal_kg: req.weekly_goal_kg,
        monthly_goal_kg: req.monthly_goal_kg,
    };
    let goal = state
        .svc()
        .save_goal(user.id, &request, Local::now().date_naive())?;
    Ok(Json(goal))
}

async fn delete_goal(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<StatusCode, ApiError> {
    let cleared = state
        .svc()
        .clear_goal(user.id)
        .context("failed to clear goal")?;
    if cleared {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("No goal set".to_string()))
    }
}

// --- Progress ---

async fn get_progress(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(params): Query<ProgressQuery>,
) -> Result<Json<ProgressView>, ApiError> {
    let today = match params.date.as_deref() {
        Some(d) => parse_date(d, "date")?,
        None => Local::now().date_naive(),
    };
    let view = state
        .svc()
        .progress(user.id, today)
        .context("failed to compute progress")?;
    Ok(Json(view))
}

// --- Export / Import handlers ---

async fn export_data(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<ExportData>, ApiError> {
    let data = state
        .svc()
        .export(user.id)
        .context("failed to export data")?;
    Ok(Json(data))
}

async fn import_data(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(data): Json<ExportData>,
) -> Result<Json<ImportSummary>, ApiError> {
    let summary = state.svc().import(user.id, &data)?;
    Ok(Json(summary))
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/health", get(health))
        .route("/api/users/register", post(register))
        .route("/api/users/login", post(login));

    let protected = Router::new()
        .route("/api/users/logout", post(logout))
        .route("/api/me", get(me))
        .route("/api/entries", get(list_entries).post(create_entry))
        .route(
            "/api/entries/{id}",
            axum::routing::put(update_entry).delete(delete_entry),
        )
        .route(
            "/api/goal",
            get(get_goal).put(set_goal).delete(delete_goal),
        )
        .route("/api/progress", get(get_progress))
        .route("/api/export", get(export_data))
        .route("/api/import", post(import_data))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(svc: WeighinService, port: u16, bind: &str) -> anyhow::Result<()> {
    let state = AppState {
        svc: Arc::new(Mutex::new(svc)),
    };
    let app = build_router(state);

    if bind != "127.0.0.1" && bind != "localhost" {
        warn!("Listening on {bind}: the API is reachable from other machines on your network");
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
