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
                    .as_enum(NotificationKind::Enum)
                    .values([
                        NotificationKind::RideRequest,
                        NotificationKind::RequestAccepted,
                        NotificationKind::RequestRejected,
                        NotificationKind::PassengerCheckedIn,
                        NotificationKind::PassengerCheckedOut,
                        NotificationKind::RequestCancelled,
                        NotificationKind::RideReminder,
                        NotificationKind::DriverRated,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Notification::Table)
                    .if_not_exists()
                    .col(uuid(Notification::Id).primary_key())
                    .col(uuid(Notification::UserId).not_null())
                    .col(uuid_null(Notification::RideId))
                    .col(uuid_null(Notification::RequestId))
                    .col(
                        ColumnDef::new(Notification::Kind)
                            .custom(NotificationKind::Enum)
                            .not_null(),
                    )
                    .col(string_len(Notification::Title, 255).not_null())
                    .col(string_len(Notification::Body, 1024).not_null())
                    .col(boolean(Notification::Read).not_null().default(false))
                    .col(
                        timestamp_with_time_zone(Notification::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_notification_user")
                            .from(Notification::Table, Notification::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Inbox listing and mark-read both filter by user
        manager
            .create_index(
                Index::create()
                    .name("idx_notification_user_created_at")
                    .table(Notification::Table)
                    .col(Notification::UserId)
                    .col(Notification::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Notification::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(NotificationKind::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Notification {
    Table,
    Id,
    UserId,
    RideId,
    RequestId,
    Kind,
    Title,
    Body,
    Read,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum NotificationKind {
    #[sea_orm(iden = "notification_kind")]
    Enum,
    #[sea_orm(iden = "ride_request")]
    RideRequest,
    #[sea_orm(iden = "request_accepted")]
    RequestAccepted,
    #[sea_orm(iden = "request_rejected")]
    RequestRejected,
    #[sea_orm(iden = "passenger_checked_in")]
    PassengerCheckedIn,
    #[sea_orm(iden = "passenger_checked_out")]
    PassengerCheckedOut,
    #[sea_orm(iden = "request_cancelled")]
    RequestCancelled,
    #[sea_orm(iden = "ride_reminder")]
    RideReminder,
    #[sea_orm(iden = "driver_rated")]
    DriverRated,
}
