use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::entities::notification::{self, NotificationKind};

const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub ride_id: Option<Uuid>,
    pub request_id: Option<Uuid>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("failed to store notification: {0}")]
    Store(#[from] sea_orm::DbErr),
    #[error("push delivery failed: {0}")]
    Delivery(#[from] reqwest::Error),
}

/// Dispatches notifications to a user by id and manages time-delayed
/// reminders. Delivery is best-effort; callers decide whether a failure
/// matters.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send_immediate(&self, user_id: Uuid, msg: PushMessage) -> Result<(), NotifyError>;

    /// Schedules `msg` for delivery at `at` and returns a handle usable
    /// with [`cancel`](Self::cancel).
    async fn schedule_at(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
        msg: PushMessage,
    ) -> Result<Uuid, NotifyError>;

    /// No-op when the reminder already fired or never existed.
    async fn cancel(&self, notification_id: Uuid);

    /// Marks this user's unread inbox entries of `kind` for one request
    /// as read.
    async fn mark_read(
        &self,
        user_id: Uuid,
        request_id: Uuid,
        kind: NotificationKind,
    ) -> Result<(), NotifyError>;
}

/// Production gateway: every notification lands in the persisted inbox,
/// and is relayed to the configured push endpoint when one is set.
/// Reminders are tokio timers held by id so they can be aborted.
pub struct PushNotifier {
    inner: Arc<Inner>,
}

struct Inner {
    db: DatabaseConnection,
    http: reqwest::Client,
    push_url: Option<String>,
    timers: Mutex<HashMap<Uuid, AbortHandle>>,
}

impl PushNotifier {
    pub fn new(db: DatabaseConnection, push_url: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(PUSH_TIMEOUT)
            .build()
            .expect("failed to build push http client");

        Self {
            inner: Arc::new(Inner {
                db,
                http,
                push_url,
                timers: Mutex::new(HashMap::new()),
            }),
        }
    }
}

async fn deliver(inner: &Inner, user_id: Uuid, msg: &PushMessage) -> Result<(), NotifyError> {
    let row = notification::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        ride_id: Set(msg.ride_id),
        request_id: Set(msg.request_id),
        kind: Set(msg.kind),
        title: Set(msg.title.clone()),
        body: Set(msg.body.clone()),
        read: Set(false),
        ..Default::default()
    };
    row.insert(&inner.db).await?;

    if let Some(url) = &inner.push_url {
        inner
            .http
            .post(url)
            .json(&serde_json::json!({
                "to": user_id,
                "title": msg.title,
                "body": msg.body,
                "data": msg,
            }))
            .send()
            .await?
            .error_for_status()?;
    } else {
        tracing::debug!(%user_id, kind = ?msg.kind, "no push gateway configured, inbox only");
    }

    Ok(())
}

#[async_trait]
impl NotificationGateway for PushNotifier {
    async fn send_immediate(&self, user_id: Uuid, msg: PushMessage) -> Result<(), NotifyError> {
        deliver(&self.inner, user_id, &msg).await
    }

    async fn schedule_at(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
        msg: PushMessage,
    ) -> Result<Uuid, NotifyError> {
        let id = Uuid::new_v4();
        let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let inner = Arc::clone(&self.inner);

        // Holding the lock across the spawn keeps the fired task from
        // removing its map entry before it exists.
        let mut timers = self.inner.timers.lock().await;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.timers.lock().await.remove(&id);
            if let Err(e) = deliver(&inner, user_id, &msg).await {
                tracing::warn!(%user_id, notification_id = %id, error = %e, "scheduled notification failed");
            }
        });
        timers.insert(id, handle.abort_handle());

        Ok(id)
    }

    async fn cancel(&self, notification_id: Uuid) {
        if let Some(handle) = self.inner.timers.lock().await.remove(&notification_id) {
            handle.abort();
        }
    }

    async fn mark_read(
        &self,
        user_id: Uuid,
        request_id: Uuid,
        kind: NotificationKind,
    ) -> Result<(), NotifyError> {
        notification::Entity::update_many()
            .col_expr(notification::Column::Read, Expr::value(true))
            .filter(notification::Column::UserId.eq(user_id))
            .filter(notification::Column::RequestId.eq(Some(request_id)))
            .filter(notification::Column::Kind.eq(kind))
            .filter(notification::Column::Read.eq(false))
            .exec(&self.inner.db)
            .await?;
        Ok(())
    }
}
