use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use shala_core::model::*;
use shala_core::{ledger, registry};
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/sessions", get(list_sessions).post(create_session))
        .route("/api/v1/sessions/{id}", get(get_session))
        .route("/api/v1/sessions/{id}/classes", get(list_classes))
        .route("/api/v1/classes", post(create_class))
        .route(
            "/api/v1/classes/{id}",
            get(get_class).put(update_class).delete(delete_class),
        )
        .route("/api/v1/classes/{id}/dates", get(class_dates))
        .route("/api/v1/classes/{id}/roster", get(roster))
        .route("/api/v1/classes/{id}/registrations", post(register))
        .route(
            "/api/v1/classes/{id}/registrations/{student_id}",
            delete(unregister),
        )
        .route("/api/v1/registrations", get(list_registrations))
}

// -- Request/Response types --

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ClassListParams {
    pub order: Option<String>,
}

/// Partial class update; absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateClassRequest {
    pub session_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub teacher_id: Option<String>,
    pub weekday: Option<Weekday>,
    pub start_time: Option<NaiveTime>,
    pub duration_minutes: Option<u32>,
    pub capacity: Option<u32>,
    pub drop_in_only: Option<bool>,
}

impl UpdateClassRequest {
    fn apply(self, class: &mut Class) {
        if let Some(v) = self.session_id {
            class.session_id = v;
        }
        if let Some(v) = self.title {
            class.title = v.trim().to_string();
        }
        if let Some(v) = self.description {
            class.description = v;
        }
        if let Some(v) = self.teacher_id {
            // Empty string clears the assignment.
            class.teacher_id = Some(v.trim().to_string()).filter(|t| !t.is_empty());
        }
        if let Some(v) = self.weekday {
            class.weekday = v;
        }
        if let Some(v) = self.start_time {
            class.start_time = v;
        }
        if let Some(v) = self.duration_minutes {
            class.duration_minutes = v;
        }
        if let Some(v) = self.capacity {
            class.capacity = v;
        }
        if let Some(v) = self.drop_in_only {
            class.drop_in_only = v;
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub student: StudentInfo,
    #[serde(default = "default_kind")]
    pub kind: RegistrationKind,
}

fn default_kind() -> RegistrationKind {
    RegistrationKind::Session
}

#[derive(Debug, Deserialize)]
pub struct RegistrationLookupParams {
    pub student_id: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RosterResponse {
    pub class_id: Uuid,
    pub capacity: u32,
    pub occupancy: usize,
    pub registrations: Vec<Registration>,
}

// -- Sessions --

async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let session =
        registry::create_session(&state.storage, &input.name, input.starts_at, input.ends_at)
            .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Session>>, ApiError> {
    let sessions = registry::list_active_sessions(&state.storage, Utc::now()).await?;
    Ok(Json(sessions))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(registry::get_session(&state.storage, id).await?))
}

async fn list_classes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<ClassListParams>,
) -> Result<Json<Vec<Class>>, ApiError> {
    let order: ClassOrder = match params.order.as_deref() {
        Some(s) => s.parse().map_err(ApiError::bad_request)?,
        None => ClassOrder::default(),
    };
    registry::get_session(&state.storage, id).await?;
    let classes = registry::list_classes_in_session(&state.storage, id, order).await?;
    Ok(Json(classes))
}

// -- Classes --

async fn create_class(
    State(state): State<Arc<AppState>>,
    Json(input): Json<NewClass>,
) -> Result<(StatusCode, Json<Class>), ApiError> {
    let class = registry::add_class(&state.storage, input).await?;
    Ok((StatusCode::CREATED, Json(class)))
}

async fn get_class(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Class>, ApiError> {
    Ok(Json(registry::get_class(&state.storage, id).await?))
}

async fn update_class(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateClassRequest>,
) -> Result<Json<Class>, ApiError> {
    let mut class = registry::get_class(&state.storage, id).await?;
    input.apply(&mut class);
    registry::update_class(&state.storage, &class).await?;
    Ok(Json(class))
}

async fn delete_class(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    registry::delete_class(&state.storage, id, Utc::now()).await?;
    Ok(Json(serde_json::json!({ "deleted": id.to_string() })))
}

async fn class_dates(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DateTime<Utc>>>, ApiError> {
    let dates = registry::upcoming_dates(&state.storage, id, Utc::now()).await?;
    Ok(Json(dates))
}

// -- Registrations --

async fn roster(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RosterResponse>, ApiError> {
    let class = registry::get_class(&state.storage, id).await?;
    let registrations = ledger::list_active(&state.storage, id, Utc::now()).await?;
    Ok(Json(RosterResponse {
        class_id: id,
        capacity: class.capacity,
        occupancy: registrations.len(),
        registrations,
    }))
}

async fn register(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    let admission = ledger::register(
        &state.storage,
        &state.retry_policy(),
        &input.student,
        id,
        input.kind,
        Utc::now(),
    )
    .await?;

    let status = if admission.is_new() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(admission)).into_response())
}

async fn unregister(
    State(state): State<Arc<AppState>>,
    Path((id, student_id)): Path<(Uuid, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ledger::unregister(&state.storage, id, &student_id).await?;
    Ok(Json(serde_json::json!({
        "class_id": id.to_string(),
        "unregistered": student_id,
    })))
}

async fn list_registrations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RegistrationLookupParams>,
) -> Result<Json<Vec<Registration>>, ApiError> {
    let registrations = match (params.student_id, params.email) {
        (Some(student_id), None) => ledger::list_by_student(&state.storage, &student_id).await?,
        (None, Some(email)) => ledger::list_by_email(&state.storage, &email).await?,
        _ => {
            return Err(ApiError::bad_request(
                "pass exactly one of student_id or email",
            ))
        }
    };
    Ok(Json(registrations))
}
