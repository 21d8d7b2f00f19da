use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "notification_kind")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    #[sea_orm(string_value = "ride_request")]
    RideRequest,
    #[sea_orm(string_value = "request_accepted")]
    RequestAccepted,
    #[sea_orm(string_value = "request_rejected")]
    RequestRejected,
    #[sea_orm(string_value = "passenger_checked_in")]
    PassengerCheckedIn,
    #[sea_orm(string_value = "passenger_checked_out")]
    PassengerCheckedOut,
    #[sea_orm(string_value = "request_cancelled")]
    RequestCancelled,
    #[sea_orm(string_value = "ride_reminder")]
    RideReminder,
    #[sea_orm(string_value = "driver_rated")]
    DriverRated,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub ride_id: Option<Uuid>,
    pub request_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
