//! Connectivity state and online/offline transition listeners.
//!
//! The monitor does not probe anything itself: the host feeds the platform
//! signal through [`NetworkMonitor::set_online`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

type Handler = Arc<dyn Fn() + Send + Sync>;

/// Direction of a connectivity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
  Online,
  Offline,
}

/// Handle returned by listener registration, used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener {
  id: ListenerId,
  on: Transition,
  handler: Handler,
}

pub struct NetworkMonitor {
  online: AtomicBool,
  next_id: AtomicU64,
  listeners: Mutex<Vec<Listener>>,
}

impl NetworkMonitor {
  pub fn new(initially_online: bool) -> Self {
    Self {
      online: AtomicBool::new(initially_online),
      next_id: AtomicU64::new(0),
      listeners: Mutex::new(Vec::new()),
    }
  }

  pub fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }

  /// Register a handler run on every offline -> online transition.
  pub fn on_online<F>(&self, handler: F) -> ListenerId
  where
    F: Fn() + Send + Sync + 'static,
  {
    self.register(Transition::Online, Arc::new(handler))
  }

  /// Register a handler run on every online -> offline transition.
  pub fn on_offline<F>(&self, handler: F) -> ListenerId
  where
    F: Fn() + Send + Sync + 'static,
  {
    self.register(Transition::Offline, Arc::new(handler))
  }

  /// Drop a previously registered handler. Unknown ids are ignored.
  pub fn remove_listener(&self, id: ListenerId) {
    if let Ok(mut listeners) = self.listeners.lock() {
      listeners.retain(|l| l.id != id);
    }
  }

  pub fn listener_count(&self) -> usize {
    self.listeners.lock().map(|l| l.len()).unwrap_or(0)
  }

  fn register(&self, on: Transition, handler: Handler) -> ListenerId {
    let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
    if let Ok(mut listeners) = self.listeners.lock() {
      listeners.push(Listener { id, on, handler });
    }
    id
  }

  /// Feed the platform connectivity signal.
  ///
  /// Returns the transition if the state changed; repeated identical signals
  /// fire nothing.
  pub fn set_online(&self, online: bool) -> Option<Transition> {
    if self.online.swap(online, Ordering::SeqCst) == online {
      return None;
    }

    let transition = if online {
      Transition::Online
    } else {
      Transition::Offline
    };
    info!(?transition, "connectivity changed");

    // Clone handlers out so they can register listeners without deadlocking
    let handlers: Vec<Handler> = match self.listeners.lock() {
      Ok(listeners) => listeners
        .iter()
        .filter(|l| l.on == transition)
        .map(|l| Arc::clone(&l.handler))
        .collect(),
      Err(_) => Vec::new(),
    };
    for handler in handlers {
      handler();
    }

    Some(transition)
  }
}

impl Default for NetworkMonitor {
  fn default() -> Self {
    Self::new(true)
  }
}

impl std::fmt::Debug for NetworkMonitor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("NetworkMonitor")
      .field("online", &self.is_online())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;

  fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    (count, move || {
      c.fetch_add(1, Ordering::SeqCst);
    })
  }

  #[test]
  fn test_handlers_fire_once_per_transition() {
    let monitor = NetworkMonitor::new(true);
    let (online_calls, on_online) = counter();
    let (offline_calls, on_offline) = counter();
    monitor.on_online(on_online);
    monitor.on_offline(on_offline);

    // Same state: nothing fires
    assert_eq!(monitor.set_online(true), None);

    assert_eq!(monitor.set_online(false), Some(Transition::Offline));
    assert_eq!(monitor.set_online(false), None);
    assert!(!monitor.is_online());

    assert_eq!(monitor.set_online(true), Some(Transition::Online));

    assert_eq!(online_calls.load(Ordering::SeqCst), 1);
    assert_eq!(offline_calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_handler_may_register_more_handlers() {
    let monitor = Arc::new(NetworkMonitor::new(false));
    let inner = monitor.clone();
    monitor.on_online(move || {
      inner.on_offline(|| {});
    });

    monitor.set_online(true);
    assert!(monitor.is_online());
    assert_eq!(monitor.listener_count(), 2);
  }

  #[test]
  fn test_removed_listener_no_longer_fires() {
    let monitor = NetworkMonitor::new(false);
    let (kept_calls, kept) = counter();
    let (removed_calls, removed) = counter();
    monitor.on_online(kept);
    let id = monitor.on_online(removed);

    monitor.remove_listener(id);
    // Second removal is a no-op
    monitor.remove_listener(id);
    assert_eq!(monitor.listener_count(), 1);

    monitor.set_online(true);
    assert_eq!(kept_calls.load(Ordering::SeqCst), 1);
    assert_eq!(removed_calls.load(Ordering::SeqCst), 0);
  }
}
