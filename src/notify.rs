//! Transient operator notifications that expire on their own.
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

pub type NotificationId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Success => "success",
            NotificationKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub message: String,
    pub expires_after: Duration,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    next_id: NotificationId,
    items: Vec<Notification>,
    timers: HashMap<NotificationId, AbortHandle>,
}

/// Insertion-ordered notifications. Each push schedules its own removal
/// task; dismissing cancels that task. Removing an id that is already gone
/// is a no-op.
#[derive(Clone)]
pub struct NotificationQueue {
    inner: Arc<Mutex<Inner>>,
    ttl: Duration,
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl NotificationQueue {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn success(&self, message: impl Into<String>) -> NotificationId {
        self.push(NotificationKind::Success, message)
    }

    pub fn error(&self, message: impl Into<String>) -> NotificationId {
        self.push(NotificationKind::Error, message)
    }

    /// Ids increase monotonically for the lifetime of the queue. Expiry needs
    /// a tokio runtime; outside one the notification stays until dismissed.
    pub fn push(&self, kind: NotificationKind, message: impl Into<String>) -> NotificationId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.items.push(Notification {
            id,
            kind,
            message: message.into(),
            expires_after: self.ttl,
            created_at: Utc::now(),
        });

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let queue = self.clone();
            let ttl = self.ttl;
            let task = runtime.spawn(async move {
                tokio::time::sleep(ttl).await;
                queue.expire(id);
            });
            inner.timers.insert(id, task.abort_handle());
        }
        debug!(id, kind = kind.as_str(), "notification pushed");
        id
    }

    /// Returns whether the notification was still present.
    pub fn dismiss(&self, id: NotificationId) -> bool {
        let mut inner = self.lock();
        if let Some(timer) = inner.timers.remove(&id) {
            timer.abort();
        }
        remove_item(&mut inner, id)
    }

    fn expire(&self, id: NotificationId) {
        let mut inner = self.lock();
        inner.timers.remove(&id);
        if remove_item(&mut inner, id) {
            debug!(id, "notification expired");
        }
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.lock().items.clone()
    }

    /// Remove and return everything, cancelling pending timers.
    pub fn drain(&self) -> Vec<Notification> {
        let mut inner = self.lock();
        for (_, timer) in inner.timers.drain() {
            timer.abort();
        }
        std::mem::take(&mut inner.items)
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}

fn remove_item(inner: &mut Inner, id: NotificationId) -> bool {
    let before = inner.items.len();
    inner.items.retain(|n| n.id != id);
    inner.items.len() != before
}
