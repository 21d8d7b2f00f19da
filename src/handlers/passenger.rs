use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::ride::{self, RequiredGender, RideStatus};
use crate::entities::ride_request::{self, RequestStatus};
use crate::entities::user;
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RideSummary {
    pub id: Uuid,
    pub driver_name: String,
    pub origin_address: String,
    pub destination_address: String,
    /// None once the departure has passed and the ride awaits expiry
    pub next_departure: Option<DateTime<Utc>>,
    pub recurrence: Option<String>,
    pub available_seats: i32,
    pub required_gender: RequiredGender,
    pub no_smoking: bool,
    pub no_children: bool,
    pub no_music: bool,
}

fn summarize(r: &ride::Model, drivers: &[user::Model], now: DateTime<Utc>) -> RideSummary {
    let driver = drivers.iter().find(|u| u.id == r.driver_id);

    RideSummary {
        id: r.id,
        driver_name: driver.map(|u| u.name.clone()).unwrap_or_default(),
        origin_address: r.origin_address.clone(),
        destination_address: r.destination_address.clone(),
        next_departure: r.next_occurrence(now),
        recurrence: r.recurrence.clone(),
        available_seats: r.available_seats,
        required_gender: r.required_gender,
        no_smoking: r.no_smoking,
        no_children: r.no_children,
        no_music: r.no_music,
    }
}

/// List rides still open for booking
pub async fn list_rides(State(state): State<AppState>) -> AppResult<Json<Vec<RideSummary>>> {
    let now = Utc::now();
    let rides = ride::Entity::find()
        .filter(ride::Column::Status.eq(RideStatus::Pending))
        .all(&state.db)
        .await?;
    let users = user::Entity::find().all(&state.db).await?;

    // Rides with no upcoming departure are waiting for the expiry sweep
    let responses: Vec<RideSummary> = rides
        .iter()
        .map(|r| summarize(r, &users, now))
        .filter(|s| s.next_departure.is_some())
        .collect();

    Ok(Json(responses))
}

/// Get ride details
pub async fn get_ride(
    State(state): State<AppState>,
    Path(ride_id): Path<Uuid>,
) -> AppResult<Json<RideSummary>> {
    let ride = ride::Entity::find_by_id(ride_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Ride not found".to_string()))?;

    let users = user::Entity::find().all(&state.db).await?;

    Ok(Json(summarize(&ride, &users, Utc::now())))
}

// ============ Booking Requests ============

#[derive(Debug, Deserialize)]
pub struct BookRequest {
    pub ride_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub request_id: Uuid,
    pub ride_id: Uuid,
    pub status: RequestStatus,
}

/// Request a seat on a ride
pub async fn book(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<BookRequest>,
) -> AppResult<Json<BookingResponse>> {
    let request = state.lifecycle.book(payload.ride_id, claims.sub).await?;

    Ok(Json(BookingResponse {
        request_id: request.id,
        ride_id: request.ride_id,
        status: request.status,
    }))
}

#[derive(Debug, Serialize)]
pub struct MyRequestResponse {
    pub request_id: Uuid,
    pub ride_id: Uuid,
    pub origin_address: String,
    pub destination_address: String,
    pub next_departure: Option<DateTime<Utc>>,
    pub status: RequestStatus,
    pub rating: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// List the logged-in user's booking requests
pub async fn my_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<MyRequestResponse>>> {
    let now = Utc::now();
    let requests = ride_request::Entity::find()
        .filter(ride_request::Column::UserId.eq(claims.sub))
        .all(&state.db)
        .await?;

    let rides = ride::Entity::find().all(&state.db).await?;

    let responses: Vec<MyRequestResponse> = requests
        .into_iter()
        .filter_map(|r| {
            let ride = rides.iter().find(|x| x.id == r.ride_id)?;
            Some(MyRequestResponse {
                request_id: r.id,
                ride_id: ride.id,
                origin_address: ride.origin_address.clone(),
                destination_address: ride.destination_address.clone(),
                next_departure: ride.next_occurrence(now),
                status: r.status,
                rating: r.rating,
                created_at: r.created_at.with_timezone(&Utc),
            })
        })
        .collect();

    Ok(Json(responses))
}

#[derive(Debug, Serialize)]
pub struct RequestStateResponse {
    pub request_id: Uuid,
    pub status: RequestStatus,
}

/// Take the seat: passenger is on board
pub async fn check_in(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<RequestStateResponse>> {
    let request = state.lifecycle.check_in(request_id, claims.sub).await?;

    Ok(Json(RequestStateResponse {
        request_id: request.id,
        status: request.status,
    }))
}

#[derive(Debug, Serialize)]
pub struct CheckOutResponse {
    pub request_id: Uuid,
    pub status: RequestStatus,
    /// The ride is done for this passenger; the client should offer the
    /// rating dialog.
    pub rate_prompt: bool,
}

/// Leave the ride and unlock rating
pub async fn check_out(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<CheckOutResponse>> {
    let request = state.lifecycle.check_out(request_id, claims.sub).await?;

    Ok(Json(CheckOutResponse {
        request_id: request.id,
        status: request.status,
        rate_prompt: true,
    }))
}

/// Withdraw a booking request
pub async fn cancel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<RequestStateResponse>> {
    let request = state.lifecycle.cancel(request_id, claims.sub).await?;

    Ok(Json(RequestStateResponse {
        request_id: request.id,
        status: request.status,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub rating: i32,
}

#[derive(Debug, Serialize)]
pub struct RatingResponse {
    pub request_id: Uuid,
    pub rating: i32,
}

/// Rate the driver after checking out
pub async fn rate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<RatingRequest>,
) -> AppResult<Json<RatingResponse>> {
    let request = state
        .lifecycle
        .rate(request_id, claims.sub, payload.rating)
        .await?;

    Ok(Json(RatingResponse {
        request_id: request.id,
        rating: request.rating.unwrap_or(payload.rating),
    }))
}
