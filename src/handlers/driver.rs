use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc, Weekday};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::ride::{self, RequiredGender, RideStatus};
use crate::entities::ride_request::{self, RequestStatus};
use crate::entities::user::{self, Gender};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PublishRideRequest {
    pub origin_address: String,
    pub origin_lat: Option<f64>,
    pub origin_lng: Option<f64>,
    pub destination_address: String,
    pub destination_lat: Option<f64>,
    pub destination_lng: Option<f64>,
    pub scheduled_at: DateTime<Utc>,
    /// Weekday names for a recurring ride, e.g. ["mon", "wed"]
    pub recurrence: Option<Vec<String>>,
    pub available_seats: i32,
    pub required_gender: RequiredGender,
    #[serde(default)]
    pub no_smoking: bool,
    #[serde(default)]
    pub no_children: bool,
    #[serde(default)]
    pub no_music: bool,
}

#[derive(Debug, Serialize)]
pub struct RideResponse {
    pub id: Uuid,
    pub origin_address: String,
    pub destination_address: String,
    pub scheduled_at: DateTime<Utc>,
    pub recurrence: Option<String>,
    pub available_seats: i32,
    pub required_gender: RequiredGender,
    pub status: RideStatus,
}

impl RideResponse {
    fn from_model(r: ride::Model) -> Self {
        Self {
            id: r.id,
            origin_address: r.origin_address,
            destination_address: r.destination_address,
            scheduled_at: r.scheduled_at.with_timezone(&Utc),
            recurrence: r.recurrence,
            available_seats: r.available_seats,
            required_gender: r.required_gender,
            status: r.status,
        }
    }
}

/// Publish a new ride offer
pub async fn publish_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<PublishRideRequest>,
) -> AppResult<Json<RideResponse>> {
    if payload.available_seats < 1 {
        return Err(AppError::BadRequest(
            "A ride must offer at least 1 seat".to_string(),
        ));
    }

    let recurrence = match &payload.recurrence {
        Some(days) if !days.is_empty() => {
            // Reject labels we would silently skip later
            for day in days {
                day.trim().parse::<Weekday>().map_err(|_| {
                    AppError::BadRequest(format!("Unknown weekday: {}", day))
                })?;
            }
            Some(days.join(","))
        }
        _ => {
            if payload.scheduled_at < Utc::now() {
                return Err(AppError::BadRequest(
                    "Cannot publish a ride in the past".to_string(),
                ));
            }
            None
        }
    };

    let new_ride = ride::ActiveModel {
        id: Set(Uuid::new_v4()),
        driver_id: Set(claims.sub),
        origin_address: Set(payload.origin_address.clone()),
        origin_lat: Set(payload.origin_lat),
        origin_lng: Set(payload.origin_lng),
        destination_address: Set(payload.destination_address.clone()),
        destination_lat: Set(payload.destination_lat),
        destination_lng: Set(payload.destination_lng),
        scheduled_at: Set(payload.scheduled_at.into()),
        recurrence: Set(recurrence),
        available_seats: Set(payload.available_seats),
        required_gender: Set(payload.required_gender),
        no_smoking: Set(payload.no_smoking),
        no_children: Set(payload.no_children),
        no_music: Set(payload.no_music),
        status: Set(RideStatus::Pending),
        ..Default::default()
    };

    let ride = new_ride.insert(&state.db).await?;

    Ok(Json(RideResponse::from_model(ride)))
}

#[derive(Debug, Serialize)]
pub struct DriverRideResponse {
    #[serde(flatten)]
    pub ride: RideResponse,
    pub waiting_requests: u64,
}

/// List rides published by the logged-in driver
pub async fn my_rides(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<DriverRideResponse>>> {
    let rides = ride::Entity::find()
        .filter(ride::Column::DriverId.eq(claims.sub))
        .all(&state.db)
        .await?;

    let mut responses = Vec::new();
    for r in rides {
        let waiting = ride_request::Entity::find()
            .filter(ride_request::Column::RideId.eq(r.id))
            .filter(ride_request::Column::Status.eq(RequestStatus::Waiting))
            .count(&state.db)
            .await?;

        responses.push(DriverRideResponse {
            ride: RideResponse::from_model(r),
            waiting_requests: waiting,
        });
    }

    Ok(Json(responses))
}

#[derive(Debug, Serialize)]
pub struct RideRequestInfo {
    pub request_id: Uuid,
    pub passenger_name: String,
    pub passenger_gender: Gender,
    pub status: RequestStatus,
    pub rating: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RideRequestsResponse {
    pub ride_id: Uuid,
    pub available_seats: i32,
    pub requests: Vec<RideRequestInfo>,
}

/// Get booking requests for a specific ride
pub async fn ride_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<Uuid>,
) -> AppResult<Json<RideRequestsResponse>> {
    // Verify the ride belongs to this driver
    let ride = ride::Entity::find_by_id(ride_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Ride not found".to_string()))?;

    if ride.driver_id != claims.sub {
        return Err(AppError::Forbidden(
            "You can only view requests on your own rides".to_string(),
        ));
    }

    let requests = ride_request::Entity::find()
        .filter(ride_request::Column::RideId.eq(ride_id))
        .all(&state.db)
        .await?;

    let users = user::Entity::find().all(&state.db).await?;

    let requests: Vec<RideRequestInfo> = requests
        .into_iter()
        .filter_map(|r| {
            let passenger = users.iter().find(|u| u.id == r.user_id)?;
            Some(RideRequestInfo {
                request_id: r.id,
                passenger_name: passenger.name.clone(),
                passenger_gender: passenger.gender,
                status: r.status,
                rating: r.rating,
                created_at: r.created_at.with_timezone(&Utc),
            })
        })
        .collect();

    Ok(Json(RideRequestsResponse {
        ride_id: ride.id,
        available_seats: ride.available_seats,
        requests,
    }))
}

#[derive(Debug, Serialize)]
pub struct RequestDecisionResponse {
    pub request_id: Uuid,
    pub status: RequestStatus,
}

/// Accept a waiting booking request on one of my rides
pub async fn accept_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<RequestDecisionResponse>> {
    let request = state.lifecycle.accept(request_id, claims.sub).await?;

    Ok(Json(RequestDecisionResponse {
        request_id: request.id,
        status: request.status,
    }))
}

/// Reject a waiting booking request on one of my rides
pub async fn reject_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<RequestDecisionResponse>> {
    let request = state.lifecycle.reject(request_id, claims.sub).await?;

    Ok(Json(RequestDecisionResponse {
        request_id: request.id,
        status: request.status,
    }))
}
