use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::notification::{self, NotificationKind};
use crate::error::AppResult;
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub ride_id: Option<Uuid>,
    pub request_id: Option<Uuid>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// List the logged-in user's notifications, newest first
pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<NotificationResponse>>> {
    let notifications = notification::Entity::find()
        .filter(notification::Column::UserId.eq(claims.sub))
        .order_by_desc(notification::Column::CreatedAt)
        .all(&state.db)
        .await?;

    let responses: Vec<NotificationResponse> = notifications
        .into_iter()
        .map(|n| NotificationResponse {
            id: n.id,
            kind: n.kind,
            title: n.title,
            body: n.body,
            ride_id: n.ride_id,
            request_id: n.request_id,
            read: n.read,
            created_at: n.created_at.with_timezone(&Utc),
        })
        .collect();

    Ok(Json(responses))
}
