use sea_orm_migration::{prelude::*, schema::*, sea_orm::sea_query::extension::postgres::Type};

use super::m20260801_000001_create_users::User;
use super::m20260801_000002_create_rides::Ride;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(RequestStatus::Enum)
                    .values([
                        RequestStatus::Waiting,
                        RequestStatus::Accepted,
                        RequestStatus::Rejected,
                        RequestStatus::CheckedIn,
                        RequestStatus::CheckedOut,
                        RequestStatus::Cancelled,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RideRequest::Table)
                    .if_not_exists()
                    .col(uuid(RideRequest::Id).primary_key())
                    .col(uuid(RideRequest::RideId).not_null())
                    .col(uuid(RideRequest::UserId).not_null())
                    .col(uuid(RideRequest::DriverId).not_null())
                    .col(
                        ColumnDef::new(RideRequest::Status)
                            .custom(RequestStatus::Enum)
                            .not_null(),
                    )
                    .col(integer_null(RideRequest::Rating))
                    .col(uuid_null(RideRequest::NotificationId))
                    .col(
                        timestamp_with_time_zone(RideRequest::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(RideRequest::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_request_ride")
                            .from(RideRequest::Table, RideRequest::RideId)
                            .to(Ride::Table, Ride::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_request_user")
                            .from(RideRequest::Table, RideRequest::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .check(
                        Expr::col(RideRequest::Rating)
                            .is_null()
                            .or(Expr::col(RideRequest::Rating)
                                .between(1, 5)),
                    )
                    .to_owned(),
            )
            .await?;

        // Duplicate-active-request checks look up by (ride, user)
        manager
            .create_index(
                Index::create()
                    .name("idx_ride_request_ride_user")
                    .table(RideRequest::Table)
                    .col(RideRequest::RideId)
                    .col(RideRequest::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RideRequest::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(RequestStatus::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum RideRequest {
    Table,
    Id,
    RideId,
    UserId,
    DriverId,
    Status,
    Rating,
    NotificationId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum RequestStatus {
    #[sea_orm(iden = "request_status")]
    Enum,
    #[sea_orm(iden = "waiting")]
    Waiting,
    #[sea_orm(iden = "accepted")]
    Accepted,
    #[sea_orm(iden = "rejected")]
    Rejected,
    #[sea_orm(iden = "checked_in")]
    CheckedIn,
    #[sea_orm(iden = "checked_out")]
    CheckedOut,
    #[sea_orm(iden = "cancelled")]
    Cancelled,
}
