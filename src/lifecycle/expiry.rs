use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use tokio::time::MissedTickBehavior;

use crate::entities::ride::{self, RideStatus};
use crate::lifecycle::store;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub ended: usize,
    pub failed: usize,
}

/// A ride is due for expiry once its departure has passed. Recurring rides
/// never expire: the same row keeps serving every listed weekday.
pub fn is_past_due(ride: &ride::Model, now: DateTime<Utc>) -> bool {
    ride.status == RideStatus::Pending
        && !ride.is_recurring()
        && ride.scheduled_at.with_timezone(&Utc) < now
}

/// Ends every past-due pending ride. Each ride is handled on its own: one
/// failed update is logged and counted, the rest of the batch still goes
/// through. Safe to re-run, the per-ride update only matches `pending`.
pub async fn sweep(db: &DatabaseConnection, now: DateTime<Utc>) -> SweepReport {
    let rides = match store::past_due_pending_rides(db, now).await {
        Ok(rides) => rides,
        Err(e) => {
            tracing::warn!(error = %e, "expiry scan failed");
            return SweepReport::default();
        }
    };

    let mut report = SweepReport::default();
    for ride in rides.iter().filter(|r| is_past_due(r, now)) {
        match store::cas_ride_ended(db, ride.id).await {
            // Already ended by a concurrent sweep
            Ok(0) => {}
            Ok(_) => {
                report.ended += 1;
                tracing::info!(ride_id = %ride.id, "ride ended");
            }
            Err(e) => {
                report.failed += 1;
                tracing::warn!(ride_id = %ride.id, error = %e, "failed to end ride");
            }
        }
    }

    report
}

/// Background loop driving [`sweep`] on a fixed interval.
pub async fn run(db: DatabaseConnection, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let report = sweep(&db, Utc::now()).await;
        if report != SweepReport::default() {
            tracing::info!(ended = report.ended, failed = report.failed, "expiry sweep");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ride::RequiredGender;
    use chrono::Duration;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use uuid::Uuid;

    fn ride(status: RideStatus, scheduled_at: DateTime<Utc>, recurrence: Option<&str>) -> ride::Model {
        ride::Model {
            id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            origin_address: "Campus".to_string(),
            origin_lat: None,
            origin_lng: None,
            destination_address: "Airport".to_string(),
            destination_lat: None,
            destination_lng: None,
            scheduled_at: scheduled_at.into(),
            recurrence: recurrence.map(str::to_string),
            available_seats: 2,
            required_gender: RequiredGender::Either,
            no_smoking: false,
            no_children: false,
            no_music: false,
            status,
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn only_pending_one_off_past_rides_are_due() {
        let now = Utc::now();
        let past = now - Duration::hours(1);
        let future = now + Duration::hours(1);

        assert!(is_past_due(&ride(RideStatus::Pending, past, None), now));
        assert!(!is_past_due(&ride(RideStatus::Pending, future, None), now));
        assert!(!is_past_due(&ride(RideStatus::Ended, past, None), now));
        assert!(!is_past_due(&ride(RideStatus::Pending, past, Some("mon,fri")), now));
    }

    #[tokio::test]
    async fn sweep_isolates_per_ride_failures() {
        let now = Utc::now();
        let past = now - Duration::hours(2);
        let first = ride(RideStatus::Pending, past, None);
        let second = ride(RideStatus::Pending, past, None);
        let third = ride(RideStatus::Pending, past, None);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![first, second, third]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .append_exec_errors([sea_orm::DbErr::Custom("update failed".to_string())])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let report = sweep(&db, now).await;
        assert_eq!(report, SweepReport { ended: 2, failed: 1 });
    }

    #[tokio::test]
    async fn sweep_skips_rides_already_ended_by_a_racing_sweep() {
        let now = Utc::now();
        let past = now - Duration::hours(2);
        let due = ride(RideStatus::Pending, past, None);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![due]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();

        let report = sweep(&db, now).await;
        assert_eq!(report, SweepReport::default());
    }
}
