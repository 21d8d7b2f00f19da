use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveEnum, ActiveModelTrait, DatabaseConnection, EntityTrait, Set, TransactionError,
    TransactionTrait,
};
use uuid::Uuid;

use crate::entities::notification::NotificationKind;
use crate::entities::ride::{self, RideStatus};
use crate::entities::ride_request::{self, RequestStatus};
use crate::error::{AppError, AppResult};
use crate::lifecycle::state_machine::{self, RequestAction};
use crate::lifecycle::{seats, store};
use crate::notify::{NotificationGateway, PushMessage};
use crate::utils::retry::with_retry;

/// Orchestrates every booking action: loads fresh state, validates against
/// the state machine, persists through conditional writes (in one
/// transaction wherever a seat moves with a status), and only then fires
/// notifications. Notification failures never undo a committed transition.
#[derive(Clone)]
pub struct RideLifecycle {
    db: DatabaseConnection,
    notifier: Arc<dyn NotificationGateway>,
    reminder_lead: Duration,
}

impl RideLifecycle {
    pub fn new(
        db: DatabaseConnection,
        notifier: Arc<dyn NotificationGateway>,
        reminder_lead_minutes: i64,
    ) -> Self {
        Self {
            db,
            notifier,
            reminder_lead: Duration::minutes(reminder_lead_minutes),
        }
    }

    /// Passenger books a seat on a ride; the request starts out `waiting`.
    pub async fn book(&self, ride_id: Uuid, user_id: Uuid) -> AppResult<ride_request::Model> {
        let ride = store::ride_by_id(&self.db, ride_id).await?;

        if ride.status != RideStatus::Pending {
            return Err(AppError::BadRequest(
                "This ride has already ended".to_string(),
            ));
        }
        if ride.driver_id == user_id {
            return Err(AppError::SelfBookingForbidden);
        }

        let passenger = store::user_by_id(&self.db, user_id).await?;
        if !state_machine::gender_eligible(ride.required_gender, passenger.gender) {
            return Err(AppError::GenderMismatch {
                required: ride.required_gender.to_value(),
            });
        }

        if store::has_active_request(&self.db, ride_id, user_id).await? {
            return Err(AppError::Conflict(
                "You already have an open request for this ride".to_string(),
            ));
        }

        let now = Utc::now();
        let new_request = ride_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            ride_id: Set(ride.id),
            user_id: Set(user_id),
            driver_id: Set(ride.driver_id),
            status: Set(RequestStatus::Waiting),
            rating: Set(None),
            notification_id: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        let request =
            with_retry("create ride request", || new_request.clone().insert(&self.db)).await?;

        self.notify(
            ride.driver_id,
            PushMessage {
                kind: NotificationKind::RideRequest,
                title: "New ride request".to_string(),
                body: format!(
                    "{} wants to join your ride to {}",
                    passenger.name, ride.destination_address
                ),
                ride_id: Some(ride.id),
                request_id: Some(request.id),
            },
        )
        .await;

        Ok(request)
    }

    /// Driver lets a waiting passenger on; schedules departure reminders
    /// for both parties.
    pub async fn accept(
        &self,
        request_id: Uuid,
        acting_user_id: Uuid,
    ) -> AppResult<ride_request::Model> {
        let mut request = store::request_by_id(&self.db, request_id).await?;
        let ride = store::ride_by_id(&self.db, request.ride_id).await?;

        if ride.driver_id != acting_user_id {
            return Err(AppError::Forbidden(
                "Only the ride's driver can accept requests".to_string(),
            ));
        }

        let next = state_machine::apply(RequestAction::Accept, request.status)?;
        self.cas_or_current_state(request_id, request.status, next, "accept")
            .await?;
        request.status = next;

        request.notification_id = self.schedule_reminders(&ride, &request).await;

        // The driver has acted on it, so their inbox entry is dealt with
        if let Err(e) = self
            .notifier
            .mark_read(ride.driver_id, request_id, NotificationKind::RideRequest)
            .await
        {
            tracing::warn!(request_id = %request_id, error = %e, "failed to mark request notifications read");
        }

        self.notify(
            request.user_id,
            PushMessage {
                kind: NotificationKind::RequestAccepted,
                title: "Request accepted".to_string(),
                body: format!(
                    "Your seat on the ride to {} is confirmed",
                    ride.destination_address
                ),
                ride_id: Some(ride.id),
                request_id: Some(request.id),
            },
        )
        .await;

        Ok(request)
    }

    /// Driver turns a waiting passenger down.
    pub async fn reject(
        &self,
        request_id: Uuid,
        acting_user_id: Uuid,
    ) -> AppResult<ride_request::Model> {
        let mut request = store::request_by_id(&self.db, request_id).await?;
        let ride = store::ride_by_id(&self.db, request.ride_id).await?;

        if ride.driver_id != acting_user_id {
            return Err(AppError::Forbidden(
                "Only the ride's driver can reject requests".to_string(),
            ));
        }

        let next = state_machine::apply(RequestAction::Reject, request.status)?;
        self.cas_or_current_state(request_id, request.status, next, "reject")
            .await?;
        request.status = next;

        self.notify(
            request.user_id,
            PushMessage {
                kind: NotificationKind::RequestRejected,
                title: "Request declined".to_string(),
                body: format!(
                    "The driver declined your request for the ride to {}",
                    ride.destination_address
                ),
                ride_id: Some(ride.id),
                request_id: Some(request.id),
            },
        )
        .await;

        Ok(request)
    }

    /// Passenger takes their seat. The status move and the seat decrement
    /// commit together or not at all.
    pub async fn check_in(
        &self,
        request_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<ride_request::Model> {
        let mut request = store::request_by_id(&self.db, request_id).await?;

        if request.user_id != user_id {
            return Err(AppError::Forbidden(
                "You can only check in your own request".to_string(),
            ));
        }

        let from = request.status;
        let next = state_machine::apply(RequestAction::CheckIn, from)?;
        let ride_id = request.ride_id;

        self.db
            .transaction::<_, (), AppError>(move |txn| {
                Box::pin(async move {
                    if store::cas_request_status(txn, request_id, from, next).await? == 0 {
                        return Err(current_state_error(txn, request_id, "check in").await);
                    }
                    seats::reserve(txn, ride_id).await
                })
            })
            .await
            .map_err(flatten_txn)?;
        request.status = next;

        self.notify(
            request.driver_id,
            PushMessage {
                kind: NotificationKind::PassengerCheckedIn,
                title: "Passenger checked in".to_string(),
                body: "A passenger has taken their seat".to_string(),
                ride_id: Some(ride_id),
                request_id: Some(request.id),
            },
        )
        .await;

        Ok(request)
    }

    /// Passenger wraps up their segment; any pending reminder is dropped
    /// and the caller may now rate the driver.
    pub async fn check_out(
        &self,
        request_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<ride_request::Model> {
        let mut request = store::request_by_id(&self.db, request_id).await?;

        if request.user_id != user_id {
            return Err(AppError::Forbidden(
                "You can only check out your own request".to_string(),
            ));
        }

        let next = state_machine::apply(RequestAction::CheckOut, request.status)?;
        self.cas_or_current_state(request_id, request.status, next, "check out")
            .await?;
        request.status = next;

        self.drop_reminder(&mut request).await;

        self.notify(
            request.driver_id,
            PushMessage {
                kind: NotificationKind::PassengerCheckedOut,
                title: "Passenger checked out".to_string(),
                body: "A passenger has completed the ride".to_string(),
                ride_id: Some(request.ride_id),
                request_id: Some(request.id),
            },
        )
        .await;

        Ok(request)
    }

    /// Passenger withdraws. A seat goes back only when one was actually
    /// taken (checked-in); reminders are dropped either way.
    pub async fn cancel(
        &self,
        request_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<ride_request::Model> {
        let mut request = store::request_by_id(&self.db, request_id).await?;

        if request.user_id != user_id {
            return Err(AppError::Forbidden(
                "You can only cancel your own request".to_string(),
            ));
        }

        let from = request.status;
        let next = state_machine::apply(RequestAction::Cancel, from)?;
        let ride_id = request.ride_id;

        if state_machine::frees_seat_on_cancel(from) {
            self.db
                .transaction::<_, (), AppError>(move |txn| {
                    Box::pin(async move {
                        if store::cas_request_status(txn, request_id, from, next).await? == 0 {
                            return Err(current_state_error(txn, request_id, "cancel").await);
                        }
                        seats::release(txn, ride_id).await
                    })
                })
                .await
                .map_err(flatten_txn)?;
        } else {
            self.cas_or_current_state(request_id, from, next, "cancel")
                .await?;
        }
        request.status = next;

        self.drop_reminder(&mut request).await;

        self.notify(
            request.driver_id,
            PushMessage {
                kind: NotificationKind::RequestCancelled,
                title: "Request cancelled".to_string(),
                body: "A passenger has withdrawn from your ride".to_string(),
                ride_id: Some(ride_id),
                request_id: Some(request.id),
            },
        )
        .await;

        Ok(request)
    }

    /// Passenger rates the driver once the ride is behind them. Write-once.
    pub async fn rate(
        &self,
        request_id: Uuid,
        user_id: Uuid,
        rating: i32,
    ) -> AppResult<ride_request::Model> {
        if !(1..=5).contains(&rating) {
            return Err(AppError::BadRequest(
                "Rating must be between 1 and 5".to_string(),
            ));
        }

        let mut request = store::request_by_id(&self.db, request_id).await?;

        if request.user_id != user_id {
            return Err(AppError::Forbidden(
                "You can only rate your own ride".to_string(),
            ));
        }

        state_machine::apply(RequestAction::Rate, request.status)?;
        if request.rating.is_some() {
            return Err(AppError::Conflict(
                "You already rated this ride".to_string(),
            ));
        }

        let rows = with_retry("store rating", || {
            store::set_rating(&self.db, request_id, rating)
        })
        .await?;
        if rows == 0 {
            return Err(AppError::Conflict(
                "You already rated this ride".to_string(),
            ));
        }
        request.rating = Some(rating);

        self.notify(
            request.driver_id,
            PushMessage {
                kind: NotificationKind::DriverRated,
                title: "New rating".to_string(),
                body: format!("A passenger rated their ride {rating}/5"),
                ride_id: Some(request.ride_id),
                request_id: Some(request.id),
            },
        )
        .await;

        Ok(request)
    }

    /// Single-statement status CAS; the losing side of a race gets the
    /// request's actual current state back.
    async fn cas_or_current_state(
        &self,
        request_id: Uuid,
        from: RequestStatus,
        to: RequestStatus,
        action: &'static str,
    ) -> AppResult<()> {
        let rows = with_retry("update request status", || {
            store::cas_request_status(&self.db, request_id, from, to)
        })
        .await?;

        if rows == 0 {
            let current = store::request_by_id(&self.db, request_id).await?;
            return Err(AppError::InvalidTransition {
                action,
                from: current.status.to_value(),
            });
        }

        Ok(())
    }

    /// Books departure reminders for passenger and driver; the passenger's
    /// handle is persisted on the request so later actions can cancel it.
    /// Returns that handle. Scheduling problems are logged, never fatal.
    async fn schedule_reminders(
        &self,
        ride: &ride::Model,
        request: &ride_request::Model,
    ) -> Option<Uuid> {
        let now = Utc::now();
        let occurrence = ride.next_occurrence(now)?;
        let remind_at = occurrence - self.reminder_lead;
        if remind_at <= now {
            return None;
        }

        let msg = reminder_message(ride, request, occurrence);

        if let Err(e) = self
            .notifier
            .schedule_at(ride.driver_id, remind_at, msg.clone())
            .await
        {
            tracing::warn!(ride_id = %ride.id, error = %e, "failed to schedule driver reminder");
        }

        match self
            .notifier
            .schedule_at(request.user_id, remind_at, msg)
            .await
        {
            Ok(handle) => {
                if let Err(e) = store::set_reminder_ref(&self.db, request.id, Some(handle)).await {
                    tracing::warn!(request_id = %request.id, error = %e, "failed to store reminder handle");
                }
                Some(handle)
            }
            Err(e) => {
                tracing::warn!(request_id = %request.id, error = %e, "failed to schedule passenger reminder");
                None
            }
        }
    }

    /// Cancels the passenger's pending reminder, if one is still booked.
    async fn drop_reminder(&self, request: &mut ride_request::Model) {
        let Some(reminder) = request.notification_id.take() else {
            return;
        };

        self.notifier.cancel(reminder).await;
        if let Err(e) = store::set_reminder_ref(&self.db, request.id, None).await {
            tracing::warn!(request_id = %request.id, error = %e, "failed to clear reminder handle");
        }
    }

    async fn notify(&self, user_id: Uuid, msg: PushMessage) {
        if let Err(e) = self.notifier.send_immediate(user_id, msg).await {
            tracing::warn!(%user_id, error = %e, "notification delivery failed");
        }
    }
}

fn reminder_message(
    ride: &ride::Model,
    request: &ride_request::Model,
    occurrence: DateTime<Utc>,
) -> PushMessage {
    PushMessage {
        kind: NotificationKind::RideReminder,
        title: "Upcoming ride".to_string(),
        body: format!(
            "Ride from {} to {} departs at {}",
            ride.origin_address,
            ride.destination_address,
            occurrence.format("%Y-%m-%d %H:%M UTC")
        ),
        ride_id: Some(ride.id),
        request_id: Some(request.id),
    }
}

/// Reads the request's present status inside the failed attempt so the
/// caller's error reflects reality, not the stale precondition.
async fn current_state_error<C: sea_orm::ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
    action: &'static str,
) -> AppError {
    match ride_request::Entity::find_by_id(request_id).one(conn).await {
        Ok(Some(current)) => AppError::InvalidTransition {
            action,
            from: current.status.to_value(),
        },
        Ok(None) => AppError::NotFound("Ride request not found".to_string()),
        Err(e) => AppError::Database(e),
    }
}

fn flatten_txn(err: TransactionError<AppError>) -> AppError {
    match err {
        TransactionError::Connection(e) => AppError::from(e),
        TransactionError::Transaction(e) => e,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Duration;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    use super::*;
    use crate::entities::ride::RequiredGender;
    use crate::entities::user::{self, Gender};
    use crate::notify::NotifyError;

    #[derive(Default)]
    struct RecordingGateway {
        sent: Mutex<Vec<(Uuid, PushMessage)>>,
        scheduled: Mutex<Vec<(Uuid, DateTime<Utc>, PushMessage)>>,
        cancelled: Mutex<Vec<Uuid>>,
        marked_read: Mutex<Vec<(Uuid, Uuid, NotificationKind)>>,
    }

    #[async_trait]
    impl NotificationGateway for RecordingGateway {
        async fn send_immediate(&self, user_id: Uuid, msg: PushMessage) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push((user_id, msg));
            Ok(())
        }

        async fn schedule_at(
            &self,
            user_id: Uuid,
            at: DateTime<Utc>,
            msg: PushMessage,
        ) -> Result<Uuid, NotifyError> {
            self.scheduled.lock().unwrap().push((user_id, at, msg));
            Ok(Uuid::new_v4())
        }

        async fn cancel(&self, notification_id: Uuid) {
            self.cancelled.lock().unwrap().push(notification_id);
        }

        async fn mark_read(
            &self,
            user_id: Uuid,
            request_id: Uuid,
            kind: NotificationKind,
        ) -> Result<(), NotifyError> {
            self.marked_read
                .lock()
                .unwrap()
                .push((user_id, request_id, kind));
            Ok(())
        }
    }

    fn lifecycle(
        db: MockDatabase,
    ) -> (RideLifecycle, Arc<RecordingGateway>) {
        let gateway = Arc::new(RecordingGateway::default());
        let lifecycle = RideLifecycle::new(db.into_connection(), gateway.clone(), 60);
        (lifecycle, gateway)
    }

    fn mock() -> MockDatabase {
        MockDatabase::new(DatabaseBackend::Postgres)
    }

    fn ride_model(driver_id: Uuid, seats: i32, required: RequiredGender) -> ride::Model {
        ride::Model {
            id: Uuid::new_v4(),
            driver_id,
            origin_address: "Campus".to_string(),
            origin_lat: None,
            origin_lng: None,
            destination_address: "Airport".to_string(),
            destination_lat: None,
            destination_lng: None,
            scheduled_at: (Utc::now() + Duration::days(2)).into(),
            recurrence: None,
            available_seats: seats,
            required_gender: required,
            no_smoking: true,
            no_children: false,
            no_music: false,
            status: RideStatus::Pending,
            created_at: Utc::now().into(),
        }
    }

    fn user_model(id: Uuid, gender: Gender) -> user::Model {
        user::Model {
            id,
            email: "rider@example.com".to_string(),
            password_hash: "hash".to_string(),
            name: "Rider".to_string(),
            gender,
            created_at: Utc::now().into(),
        }
    }

    fn request_model(
        ride: &ride::Model,
        user_id: Uuid,
        status: RequestStatus,
    ) -> ride_request::Model {
        ride_request::Model {
            id: Uuid::new_v4(),
            ride_id: ride.id,
            user_id,
            driver_id: ride.driver_id,
            status,
            rating: None,
            notification_id: None,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    fn exec_rows(rows: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: rows,
        }
    }

    #[tokio::test]
    async fn booking_your_own_ride_is_refused() {
        let driver = Uuid::new_v4();
        let ride = ride_model(driver, 3, RequiredGender::Either);
        let db = mock().append_query_results([vec![ride.clone()]]);
        let (lifecycle, gateway) = lifecycle(db);

        let err = lifecycle.book(ride.id, driver).await.unwrap_err();
        assert!(matches!(err, AppError::SelfBookingForbidden));
        assert!(gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn booking_against_the_gender_restriction_creates_nothing() {
        let passenger = Uuid::new_v4();
        let ride = ride_model(Uuid::new_v4(), 3, RequiredGender::Female);
        let db = mock()
            .append_query_results([vec![ride.clone()]])
            .append_query_results([vec![user_model(passenger, Gender::Male)]]);
        let (lifecycle, gateway) = lifecycle(db);

        let err = lifecycle.book(ride.id, passenger).await.unwrap_err();
        assert!(matches!(err, AppError::GenderMismatch { .. }));
        assert!(gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn booking_twice_on_the_same_ride_conflicts() {
        let passenger = Uuid::new_v4();
        let ride = ride_model(Uuid::new_v4(), 3, RequiredGender::Either);
        let existing = request_model(&ride, passenger, RequestStatus::Waiting);
        let db = mock()
            .append_query_results([vec![ride.clone()]])
            .append_query_results([vec![user_model(passenger, Gender::Female)]])
            .append_query_results([vec![existing]]);
        let (lifecycle, gateway) = lifecycle(db);

        let err = lifecycle.book(ride.id, passenger).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn booking_notifies_the_driver() {
        let passenger = Uuid::new_v4();
        let driver = Uuid::new_v4();
        let ride = ride_model(driver, 3, RequiredGender::Either);
        let created = request_model(&ride, passenger, RequestStatus::Waiting);
        let db = mock()
            .append_query_results([vec![ride.clone()]])
            .append_query_results([vec![user_model(passenger, Gender::Female)]])
            .append_query_results([Vec::<ride_request::Model>::new()])
            .append_query_results([vec![created]]);
        let (lifecycle, gateway) = lifecycle(db);

        let request = lifecycle.book(ride.id, passenger).await.unwrap();
        assert_eq!(request.status, RequestStatus::Waiting);

        let sent = gateway.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, driver);
        assert_eq!(sent[0].1.kind, NotificationKind::RideRequest);
    }

    #[tokio::test]
    async fn accepting_someone_elses_ride_is_forbidden() {
        let stranger = Uuid::new_v4();
        let ride = ride_model(Uuid::new_v4(), 3, RequiredGender::Either);
        let request = request_model(&ride, Uuid::new_v4(), RequestStatus::Waiting);
        let db = mock()
            .append_query_results([vec![request.clone()]])
            .append_query_results([vec![ride]]);
        let (lifecycle, gateway) = lifecycle(db);

        let err = lifecycle.accept(request.id, stranger).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(gateway.sent.lock().unwrap().is_empty());
        assert!(gateway.scheduled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn accepting_a_cancelled_request_is_an_invalid_transition() {
        let ride = ride_model(Uuid::new_v4(), 3, RequiredGender::Either);
        let request = request_model(&ride, Uuid::new_v4(), RequestStatus::Cancelled);
        let db = mock()
            .append_query_results([vec![request.clone()]])
            .append_query_results([vec![ride.clone()]]);
        let (lifecycle, gateway) = lifecycle(db);

        let err = lifecycle
            .accept(request.id, ride.driver_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert!(gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn accepting_schedules_reminders_and_notifies_the_passenger() {
        let passenger = Uuid::new_v4();
        let ride = ride_model(Uuid::new_v4(), 3, RequiredGender::Either);
        let request = request_model(&ride, passenger, RequestStatus::Waiting);
        let db = mock()
            .append_query_results([vec![request.clone()]])
            .append_query_results([vec![ride.clone()]])
            .append_exec_results([exec_rows(1), exec_rows(1)]);
        let (lifecycle, gateway) = lifecycle(db);

        let updated = lifecycle.accept(request.id, ride.driver_id).await.unwrap();
        assert_eq!(updated.status, RequestStatus::Accepted);
        assert!(updated.notification_id.is_some());

        let scheduled = gateway.scheduled.lock().unwrap();
        assert_eq!(scheduled.len(), 2);
        assert!(scheduled.iter().any(|(to, _, _)| *to == ride.driver_id));
        assert!(scheduled.iter().any(|(to, _, _)| *to == passenger));

        let marked = gateway.marked_read.lock().unwrap();
        assert_eq!(
            marked.as_slice(),
            &[(ride.driver_id, request.id, NotificationKind::RideRequest)]
        );

        let sent = gateway.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, passenger);
        assert_eq!(sent[0].1.kind, NotificationKind::RequestAccepted);
    }

    #[tokio::test]
    async fn check_in_on_a_full_ride_fails_with_seats_unavailable() {
        let passenger = Uuid::new_v4();
        let ride = ride_model(Uuid::new_v4(), 0, RequiredGender::Either);
        let request = request_model(&ride, passenger, RequestStatus::Accepted);
        let db = mock()
            .append_query_results([vec![request.clone()]])
            // status CAS matches, the conditional seat decrement does not
            .append_exec_results([exec_rows(1), exec_rows(0)]);
        let (lifecycle, gateway) = lifecycle(db);

        let err = lifecycle.check_in(request.id, passenger).await.unwrap_err();
        assert!(matches!(err, AppError::SeatsUnavailable));
        assert!(gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelling_a_waiting_request_returns_no_seat() {
        let passenger = Uuid::new_v4();
        let ride = ride_model(Uuid::new_v4(), 3, RequiredGender::Either);
        let request = request_model(&ride, passenger, RequestStatus::Waiting);
        // a single exec result: the status CAS; any seat release would
        // exhaust the mock and fail the call
        let db = mock()
            .append_query_results([vec![request.clone()]])
            .append_exec_results([exec_rows(1)]);
        let (lifecycle, gateway) = lifecycle(db);

        let updated = lifecycle.cancel(request.id, passenger).await.unwrap();
        assert_eq!(updated.status, RequestStatus::Cancelled);
        assert!(gateway.cancelled.lock().unwrap().is_empty());

        let sent = gateway.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ride.driver_id);
        assert_eq!(sent[0].1.kind, NotificationKind::RequestCancelled);
    }

    #[tokio::test]
    async fn cancelling_a_checked_in_request_frees_the_seat_and_reminder() {
        let passenger = Uuid::new_v4();
        let reminder = Uuid::new_v4();
        let ride = ride_model(Uuid::new_v4(), 2, RequiredGender::Either);
        let mut request = request_model(&ride, passenger, RequestStatus::CheckedIn);
        request.notification_id = Some(reminder);
        let db = mock()
            .append_query_results([vec![request.clone()]])
            // status CAS + seat release + reminder handle cleared
            .append_exec_results([exec_rows(1), exec_rows(1), exec_rows(1)]);
        let (lifecycle, gateway) = lifecycle(db);

        let updated = lifecycle.cancel(request.id, passenger).await.unwrap();
        assert_eq!(updated.status, RequestStatus::Cancelled);
        assert_eq!(updated.notification_id, None);
        assert_eq!(gateway.cancelled.lock().unwrap().as_slice(), &[reminder]);
    }

    #[tokio::test]
    async fn ratings_outside_the_range_never_reach_storage() {
        let (lifecycle, gateway) = lifecycle(mock());

        let err = lifecycle
            .rate(Uuid::new_v4(), Uuid::new_v4(), 9)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rating_requires_a_checked_out_request() {
        let passenger = Uuid::new_v4();
        let ride = ride_model(Uuid::new_v4(), 3, RequiredGender::Either);
        let request = request_model(&ride, passenger, RequestStatus::Accepted);
        let db = mock().append_query_results([vec![request.clone()]]);
        let (lifecycle, _) = lifecycle(db);

        let err = lifecycle.rate(request.id, passenger, 4).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn rating_twice_conflicts() {
        let passenger = Uuid::new_v4();
        let ride = ride_model(Uuid::new_v4(), 3, RequiredGender::Either);
        let mut request = request_model(&ride, passenger, RequestStatus::CheckedOut);
        request.rating = Some(5);
        let db = mock().append_query_results([vec![request.clone()]]);
        let (lifecycle, _) = lifecycle(db);

        let err = lifecycle.rate(request.id, passenger, 4).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn check_out_drops_the_reminder_and_notifies_the_driver() {
        let passenger = Uuid::new_v4();
        let reminder = Uuid::new_v4();
        let ride = ride_model(Uuid::new_v4(), 3, RequiredGender::Either);
        let mut request = request_model(&ride, passenger, RequestStatus::CheckedIn);
        request.notification_id = Some(reminder);
        let db = mock()
            .append_query_results([vec![request.clone()]])
            // status CAS + reminder handle cleared
            .append_exec_results([exec_rows(1), exec_rows(1)]);
        let (lifecycle, gateway) = lifecycle(db);

        let updated = lifecycle.check_out(request.id, passenger).await.unwrap();
        assert_eq!(updated.status, RequestStatus::CheckedOut);
        assert_eq!(gateway.cancelled.lock().unwrap().as_slice(), &[reminder]);

        let sent = gateway.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ride.driver_id);
        assert_eq!(sent[0].1.kind, NotificationKind::PassengerCheckedOut);
    }
}
