use sea_orm_migration::{prelude::*, schema::*, sea_orm::sea_query::extension::postgres::Type};

use super::m20260801_000001_create_users::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(RequiredGender::Enum)
                    .values([
                        RequiredGender::Male,
                        RequiredGender::Female,
                        RequiredGender::Either,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_type(
                Type::create()
                    .as_enum(RideStatus::Enum)
                    .values([RideStatus::Pending, RideStatus::Ended])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Ride::Table)
                    .if_not_exists()
                    .col(uuid(Ride::Id).primary_key())
                    .col(uuid(Ride::DriverId).not_null())
                    .col(string_len(Ride::OriginAddress, 255).not_null())
                    .col(double_null(Ride::OriginLat))
                    .col(double_null(Ride::OriginLng))
                    .col(string_len(Ride::DestinationAddress, 255).not_null())
                    .col(double_null(Ride::DestinationLat))
                    .col(double_null(Ride::DestinationLng))
                    .col(timestamp_with_time_zone(Ride::ScheduledAt).not_null())
                    .col(string_null(Ride::Recurrence))
                    .col(integer(Ride::AvailableSeats).not_null())
                    .col(
                        ColumnDef::new(Ride::RequiredGender)
                            .custom(RequiredGender::Enum)
                            .not_null(),
                    )
                    .col(boolean(Ride::NoSmoking).not_null().default(false))
                    .col(boolean(Ride::NoChildren).not_null().default(false))
                    .col(boolean(Ride::NoMusic).not_null().default(false))
                    .col(
                        ColumnDef::new(Ride::Status)
                            .custom(RideStatus::Enum)
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(Ride::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_driver")
                            .from(Ride::Table, Ride::DriverId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .check(Expr::col(Ride::AvailableSeats).gte(0))
                    .to_owned(),
            )
            .await?;

        // The expiry sweep scans pending rides by departure time
        manager
            .create_index(
                Index::create()
                    .name("idx_ride_status_scheduled_at")
                    .table(Ride::Table)
                    .col(Ride::Status)
                    .col(Ride::ScheduledAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Ride::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(RideStatus::Enum).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(RequiredGender::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Ride {
    Table,
    Id,
    DriverId,
    OriginAddress,
    OriginLat,
    OriginLng,
    DestinationAddress,
    DestinationLat,
    DestinationLng,
    ScheduledAt,
    Recurrence,
    AvailableSeats,
    RequiredGender,
    NoSmoking,
    NoChildren,
    NoMusic,
    Status,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum RequiredGender {
    #[sea_orm(iden = "required_gender")]
    Enum,
    #[sea_orm(iden = "male")]
    Male,
    #[sea_orm(iden = "female")]
    Female,
    #[sea_orm(iden = "either")]
    Either,
}

#[derive(DeriveIden)]
pub enum RideStatus {
    #[sea_orm(iden = "ride_status")]
    Enum,
    #[sea_orm(iden = "pending")]
    Pending,
    #[sea_orm(iden = "ended")]
    Ended,
}
