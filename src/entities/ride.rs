use chrono::{DateTime, Datelike, Days, Utc, Weekday};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "required_gender")]
#[serde(rename_all = "lowercase")]
pub enum RequiredGender {
    #[sea_orm(string_value = "male")]
    Male,
    #[sea_orm(string_value = "female")]
    Female,
    #[sea_orm(string_value = "either")]
    Either,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "ride_status")]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "ended")]
    Ended,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ride")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub driver_id: Uuid,
    pub origin_address: String,
    pub origin_lat: Option<f64>,
    pub origin_lng: Option<f64>,
    pub destination_address: String,
    pub destination_lat: Option<f64>,
    pub destination_lng: Option<f64>,
    pub scheduled_at: DateTimeWithTimeZone,
    /// Comma-separated weekday names ("mon,wed,fri"); None for one-off rides.
    pub recurrence: Option<String>,
    pub available_seats: i32,
    pub required_gender: RequiredGender,
    pub no_smoking: bool,
    pub no_children: bool,
    pub no_music: bool,
    pub status: RideStatus,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::DriverId",
        to = "super::user::Column::Id"
    )]
    Driver,
    #[sea_orm(has_many = "super::ride_request::Entity")]
    RideRequests,
}

impl Related<super::ride_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RideRequests.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Driver.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Weekdays this ride repeats on. Unparseable labels are skipped.
    pub fn recurrence_days(&self) -> Vec<Weekday> {
        self.recurrence
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .filter_map(|d| d.trim().parse().ok())
            .collect()
    }

    pub fn is_recurring(&self) -> bool {
        !self.recurrence_days().is_empty()
    }

    /// Next departure strictly after `now`: the scheduled instant for a
    /// one-off ride, or the next matching weekday at the scheduled
    /// time-of-day (UTC) for a recurring one.
    pub fn next_occurrence(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let scheduled = self.scheduled_at.with_timezone(&Utc);
        let days = self.recurrence_days();
        if days.is_empty() {
            return (scheduled > now).then_some(scheduled);
        }

        (0..=13).find_map(|offset| {
            let candidate = now
                .date_naive()
                .checked_add_days(Days::new(offset))?
                .and_time(scheduled.time())
                .and_utc();
            (candidate > now && days.contains(&candidate.weekday())).then_some(candidate)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    fn ride(scheduled_at: DateTime<Utc>, recurrence: Option<&str>) -> Model {
        Model {
            id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            origin_address: "Campus North Gate".to_string(),
            origin_lat: None,
            origin_lng: None,
            destination_address: "Downtown".to_string(),
            destination_lat: None,
            destination_lng: None,
            scheduled_at: scheduled_at.into(),
            recurrence: recurrence.map(str::to_string),
            available_seats: 3,
            required_gender: RequiredGender::Either,
            no_smoking: false,
            no_children: false,
            no_music: false,
            status: RideStatus::Pending,
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn recurrence_days_parses_names_and_skips_garbage() {
        let r = ride(Utc::now(), Some("mon, Wednesday,fri,notaday"));
        assert_eq!(
            r.recurrence_days(),
            vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]
        );
        assert!(r.is_recurring());
        assert!(!ride(Utc::now(), None).is_recurring());
    }

    #[test]
    fn one_off_occurrence_is_the_scheduled_instant_or_nothing() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let future = now + chrono::Duration::hours(5);
        assert_eq!(ride(future, None).next_occurrence(now), Some(future));
        let past = now - chrono::Duration::hours(5);
        assert_eq!(ride(past, None).next_occurrence(now), None);
    }

    #[test]
    fn recurring_occurrence_lands_on_the_next_listed_weekday() {
        // 2026-03-02 is a Monday
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let scheduled = Utc.with_ymd_and_hms(2026, 1, 1, 8, 30, 0).unwrap();

        let next = ride(scheduled, Some("wed"))
            .next_occurrence(now)
            .unwrap();
        assert_eq!(next.weekday(), Weekday::Wed);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 4, 8, 30, 0).unwrap());

        // Same weekday, but the departure time already passed today
        let next = ride(scheduled, Some("mon"))
            .next_occurrence(now)
            .unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 9, 8, 30, 0).unwrap());
    }
}
