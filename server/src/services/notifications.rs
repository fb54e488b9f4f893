// server/src/services/notifications.rs

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::errors::Result;
use crate::models::{NewNotification, Notification};
use crate::store::MarketplaceStore;

pub const DEDUP_WINDOW: Duration = Duration::from_secs(60);

type DedupKey = (Uuid, String, String);

/// Writes in-app notifications, dropping a repeat of the same
/// (user, title, message) seen within the dedup window.
pub struct NotificationService {
  store: Arc<dyn MarketplaceStore>,
  window: Duration,
  recent: Mutex<HashMap<DedupKey, Instant>>,
}

impl NotificationService {
  pub fn new(store: Arc<dyn MarketplaceStore>, window: Duration) -> Self {
    Self {
      store,
      window,
      recent: Mutex::new(HashMap::new()),
    }
  }

  /// Returns `None` when the notification was a duplicate.
  #[instrument(name = "notifications::notify", skip(self, notification), fields(user_id = %notification.user_id, title = %notification.title))]
  pub async fn notify(&self, notification: NewNotification) -> Result<Option<Notification>> {
    let key = (
      notification.user_id,
      notification.title.clone(),
      notification.message.clone(),
    );
    {
      let now = Instant::now();
      let mut recent = self.recent.lock();
      recent.retain(|_, seen| now.duration_since(*seen) < self.window);
      if recent.contains_key(&key) {
        debug!("Duplicate notification suppressed.");
        return Ok(None);
      }
      recent.insert(key.clone(), now);
    }

    match self.store.insert_notification(&notification).await {
      Ok(saved) => Ok(Some(saved)),
      Err(e) => {
        // Let a later retry through.
        self.recent.lock().remove(&key);
        Err(e)
      }
    }
  }
}
