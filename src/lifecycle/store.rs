//! Focused reads and conditional writes for the lifecycle core. Status
//! updates are compare-and-set: every write is conditioned on the state the
//! caller just read, and reports via the affected-row count whether the
//! precondition still held.

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

use crate::entities::ride::{self, RideStatus};
use crate::entities::ride_request::{self, RequestStatus};
use crate::entities::user;
use crate::error::{AppError, AppResult};
use crate::lifecycle::state_machine::ACTIVE_STATUSES;
use crate::utils::retry::with_retry;

pub async fn ride_by_id(db: &DatabaseConnection, id: Uuid) -> AppResult<ride::Model> {
    with_retry("load ride", || ride::Entity::find_by_id(id).one(db))
        .await?
        .ok_or_else(|| AppError::NotFound("Ride not found".to_string()))
}

pub async fn request_by_id(db: &DatabaseConnection, id: Uuid) -> AppResult<ride_request::Model> {
    with_retry("load ride request", || {
        ride_request::Entity::find_by_id(id).one(db)
    })
    .await?
    .ok_or_else(|| AppError::NotFound("Ride request not found".to_string()))
}

pub async fn user_by_id(db: &DatabaseConnection, id: Uuid) -> AppResult<user::Model> {
    with_retry("load user", || user::Entity::find_by_id(id).one(db))
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// Whether the user already holds a live (waiting/accepted/checked-in)
/// request on this ride.
pub async fn has_active_request(
    db: &DatabaseConnection,
    ride_id: Uuid,
    user_id: Uuid,
) -> AppResult<bool> {
    let existing = with_retry("check active request", || {
        ride_request::Entity::find()
            .filter(ride_request::Column::RideId.eq(ride_id))
            .filter(ride_request::Column::UserId.eq(user_id))
            .filter(ride_request::Column::Status.is_in(ACTIVE_STATUSES))
            .one(db)
    })
    .await?;

    Ok(existing.is_some())
}

/// Moves a request from `from` to `to` iff it is still in `from`.
/// Returns the number of rows that matched (0 = a concurrent transition
/// won).
pub async fn cas_request_status<C: ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
    from: RequestStatus,
    to: RequestStatus,
) -> Result<u64, DbErr> {
    let update = ride_request::ActiveModel {
        status: Set(to),
        updated_at: Set(Utc::now().into()),
        ..Default::default()
    };

    let result = ride_request::Entity::update_many()
        .set(update)
        .filter(ride_request::Column::Id.eq(request_id))
        .filter(ride_request::Column::Status.eq(from))
        .exec(conn)
        .await?;

    Ok(result.rows_affected)
}

/// Stores (or clears) the handle of the passenger's scheduled reminder.
pub async fn set_reminder_ref(
    db: &DatabaseConnection,
    request_id: Uuid,
    reminder: Option<Uuid>,
) -> Result<(), DbErr> {
    let update = ride_request::ActiveModel {
        notification_id: Set(reminder),
        updated_at: Set(Utc::now().into()),
        ..Default::default()
    };

    ride_request::Entity::update_many()
        .set(update)
        .filter(ride_request::Column::Id.eq(request_id))
        .exec(db)
        .await?;

    Ok(())
}

/// Attaches a rating, conditioned on the request still being unrated and
/// checked out. Zero affected rows means someone rated it first.
pub async fn set_rating(
    db: &DatabaseConnection,
    request_id: Uuid,
    rating: i32,
) -> Result<u64, DbErr> {
    let update = ride_request::ActiveModel {
        rating: Set(Some(rating)),
        updated_at: Set(Utc::now().into()),
        ..Default::default()
    };

    let result = ride_request::Entity::update_many()
        .set(update)
        .filter(ride_request::Column::Id.eq(request_id))
        .filter(ride_request::Column::Status.eq(RequestStatus::CheckedOut))
        .filter(ride_request::Column::Rating.is_null())
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

/// One-off pending rides whose departure has passed.
pub async fn past_due_pending_rides(
    db: &DatabaseConnection,
    now: DateTime<Utc>,
) -> Result<Vec<ride::Model>, DbErr> {
    ride::Entity::find()
        .filter(ride::Column::Status.eq(RideStatus::Pending))
        .filter(ride::Column::ScheduledAt.lt(now))
        .filter(ride::Column::Recurrence.is_null())
        .all(db)
        .await
}

/// Ends a ride iff it is still pending, making the sweep idempotent.
pub async fn cas_ride_ended(db: &DatabaseConnection, ride_id: Uuid) -> Result<u64, DbErr> {
    let update = ride::ActiveModel {
        status: Set(RideStatus::Ended),
        ..Default::default()
    };

    let result = ride::Entity::update_many()
        .set(update)
        .filter(ride::Column::Id.eq(ride_id))
        .filter(ride::Column::Status.eq(RideStatus::Pending))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}
