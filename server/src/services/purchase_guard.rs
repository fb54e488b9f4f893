// server/src/services/purchase_guard.rs

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How long a buyer is blocked from starting a second checkout for the same book.
pub const PURCHASE_WINDOW: Duration = Duration::from_secs(5 * 60);

/// In-process guard against double submission of a purchase.
///
/// Only covers one server process; the order checks in the payment flow cover
/// the rest.
pub struct PurchaseGuard {
  window: Duration,
  in_flight: Mutex<HashMap<(Uuid, Uuid), Instant>>,
}

impl PurchaseGuard {
  pub fn new(window: Duration) -> Self {
    Self {
      window,
      in_flight: Mutex::new(HashMap::new()),
    }
  }

  /// Claims `(user, book)` if no unexpired claim exists.
  pub fn try_acquire(&self, user_id: Uuid, book_id: Uuid) -> bool {
    let now = Instant::now();
    let mut in_flight = self.in_flight.lock();
    in_flight.retain(|_, started| now.duration_since(*started) < self.window);
    if in_flight.contains_key(&(user_id, book_id)) {
      return false;
    }
    in_flight.insert((user_id, book_id), now);
    true
  }

  pub fn release(&self, user_id: Uuid, book_id: Uuid) {
    self.in_flight.lock().remove(&(user_id, book_id));
  }
}

impl Default for PurchaseGuard {
  fn default() -> Self {
    Self::new(PURCHASE_WINDOW)
  }
}
