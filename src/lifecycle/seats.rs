use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::entities::ride;
use crate::error::{AppError, AppResult};

/// Takes one seat, conditionally at the storage layer: the decrement only
/// applies while the counter is positive, so two check-ins racing on the
/// last seat resolve to one winner and one `SeatsUnavailable`.
pub async fn reserve<C: ConnectionTrait>(conn: &C, ride_id: Uuid) -> AppResult<()> {
    let result = ride::Entity::update_many()
        .col_expr(
            ride::Column::AvailableSeats,
            Expr::col(ride::Column::AvailableSeats).sub(1),
        )
        .filter(ride::Column::Id.eq(ride_id))
        .filter(ride::Column::AvailableSeats.gt(0))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::SeatsUnavailable);
    }

    Ok(())
}

/// Puts one seat back after a cancellation that had taken one.
pub async fn release<C: ConnectionTrait>(conn: &C, ride_id: Uuid) -> AppResult<()> {
    ride::Entity::update_many()
        .col_expr(
            ride::Column::AvailableSeats,
            Expr::col(ride::Column::AvailableSeats).add(1),
        )
        .filter(ride::Column::Id.eq(ride_id))
        .exec(conn)
        .await?;

    Ok(())
}
